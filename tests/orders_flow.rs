use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use agrolink_api::{
    db::{create_orm_conn, run_migrations},
    dto::cart::AddToCartRequest,
    dto::orders::{CancelOrderRequest, PlaceOrderRequest, UpdateOrderStatusRequest},
    entity::{
        carts::{Column as CartCol, Entity as Carts},
        order_status_history::{Column as HistoryCol, Entity as History},
        orders::{Column as OrderCol, Entity as Orders, OrderStatus, PaymentStatus},
        products::{self, ActiveModel as ProductActive, Entity as Products, ProductStatus},
        users::{ActiveModel as UserActive, UserRole, UserStatus},
    },
    error::{AppError, AppResult, StockIssueKind},
    middleware::auth::AuthUser,
    models,
    notify::LogNotifier,
    response::ApiResponse,
    routes::params::LowStockQuery,
    services::{admin_service, cart_service, order_service},
    shipping::ShippingTable,
    state::AppState,
};

static MIGRATIONS: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

// Each test seeds its own users and products with unique identifiers, so
// the tests can run in parallel against one database without clearing it.
async fn test_state() -> anyhow::Result<Option<AppState>> {
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(None);
            }
        };

    let orm = create_orm_conn(&database_url, 5).await?;
    MIGRATIONS
        .get_or_try_init(|| async { run_migrations(&orm).await })
        .await?;

    Ok(Some(AppState {
        orm,
        shipping: Arc::new(ShippingTable::default()),
        notifier: Arc::new(LogNotifier),
    }))
}

async fn seed_user(state: &AppState, role: UserRole) -> anyhow::Result<AuthUser> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    UserActive {
        id: Set(id),
        email: Set(format!("user-{id}@test.agrolink.ga")),
        password_hash: Set("not-a-real-hash".into()),
        first_name: Set("Test".into()),
        last_name: Set("User".into()),
        phone: Set(None),
        role: Set(role),
        status: Set(UserStatus::Active),
        city: Set(Some("Libreville".into())),
        country: Set("Gabon".into()),
        business_name: Set(None),
        province: Set(None),
        production_types: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser { user_id: id, role })
}

async fn seed_category(state: &AppState) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    agrolink_api::entity::categories::ActiveModel {
        id: Set(id),
        name: Set("Produits locaux".into()),
        slug: Set(format!("produits-{id}")),
        description: Set(None),
        parent_id: Set(None),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;
    Ok(id)
}

#[allow(clippy::too_many_arguments)]
async fn seed_product(
    state: &AppState,
    producer_id: Uuid,
    category_id: Uuid,
    name: &str,
    price: Decimal,
    discount_price: Option<Decimal>,
    shipping_cost: Option<Decimal>,
    stock: i32,
) -> anyhow::Result<products::Model> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let product = ProductActive {
        id: Set(id),
        producer_id: Set(producer_id),
        category_id: Set(category_id),
        name: Set(name.to_string()),
        description: Set(None),
        price: Set(price),
        discount_price: Set(discount_price),
        unit: Set(Some("kg".into())),
        stock: Set(stock),
        min_order_quantity: Set(None),
        shipping_cost: Set(shipping_cost),
        sku: Set(Some(format!("TST-{id}"))),
        image: Set(None),
        status: Set(ProductStatus::Active),
        sales_count: Set(0),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;
    Ok(product)
}

fn order_payload() -> PlaceOrderRequest {
    PlaceOrderRequest {
        shipping_address: "Quartier Louis, Rue de la Mairie".into(),
        shipping_city: "Libreville".into(),
        shipping_postal_code: None,
        shipping_country: "Gabon".into(),
        phone: "+24107123456".into(),
        delivery_instructions: None,
        payment_method: "cash_on_delivery".into(),
    }
}

async fn reload_product(state: &AppState, id: Uuid) -> anyhow::Result<products::Model> {
    Ok(Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .expect("product row"))
}

async fn advance(
    state: &AppState,
    admin: &AuthUser,
    order_id: Uuid,
    to: &str,
) -> AppResult<ApiResponse<models::Order>> {
    admin_service::update_order_status(
        state,
        admin,
        order_id,
        UpdateOrderStatusRequest {
            status: to.into(),
            reason: None,
        },
    )
    .await
}

#[tokio::test]
async fn checkout_snapshots_prices_and_takes_stock() -> anyhow::Result<()> {
    let Some(state) = test_state().await? else {
        return Ok(());
    };

    let consumer = seed_user(&state, UserRole::Consumer).await?;
    let producer = seed_user(&state, UserRole::Producer).await?;
    let category = seed_category(&state).await?;

    // Discounted product: effective unit price is 1200, not 1500.
    let product = seed_product(
        &state,
        producer.user_id,
        category,
        "Régime de bananes",
        dec!(1500),
        Some(dec!(1200)),
        None,
        10,
    )
    .await?;

    cart_service::add_to_cart(
        &state,
        &consumer,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await?;

    let count = cart_service::count(&state, &consumer).await?;
    assert_eq!(count.data.unwrap().count, 2);

    let resp = order_service::place_order(
        &state,
        &consumer,
        order_payload(),
        Default::default(),
    )
    .await?;
    assert_eq!(resp.currency, Some("FCFA"));
    let checkout = resp.data.unwrap();

    // 2 x 1200 plus the Libreville base rate.
    assert_eq!(checkout.order.subtotal, dec!(2400));
    assert_eq!(checkout.order.shipping_cost, dec!(2000));
    assert_eq!(checkout.order.total_amount, dec!(4400));
    assert!(checkout.order.order_number.starts_with("CMD-"));
    assert_eq!(checkout.order.status, OrderStatus::Pending);
    assert_eq!(checkout.order.payment_status, PaymentStatus::Pending);
    assert!(checkout.estimated_delivery.is_some());
    assert_eq!(checkout.items_count, 1);
    assert_eq!(checkout.items[0].price, dec!(1200));
    assert_eq!(checkout.items[0].product_name, "Régime de bananes");

    // Cash on delivery needs no payment step.
    assert!(!checkout.payment.required);
    assert!(checkout.payment.payment_url.is_none());

    // Stock moved and the sale was counted.
    let live = reload_product(&state, product.id).await?;
    assert_eq!(live.stock, 8);
    assert_eq!(live.sales_count, 2);

    // The cart survives as an empty shell pointing at the order.
    let cart_view = cart_service::view_cart(&state, &consumer).await?.data.unwrap();
    assert!(cart_view.items.is_empty());
    assert_eq!(cart_view.total_items, 0);
    let cart_row = Carts::find()
        .filter(CartCol::UserId.eq(consumer.user_id))
        .one(&state.orm)
        .await?
        .expect("cart row");
    assert_eq!(cart_row.converted_to_order_id, Some(checkout.order.id));
    assert!(cart_row.converted_at.is_some());

    // Creation is recorded in the history.
    let history = History::find()
        .filter(HistoryCol::OrderId.eq(checkout.order.id))
        .all(&state.orm)
        .await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_status, None);
    assert_eq!(history[0].new_status, OrderStatus::Pending);

    // Raising the price later must not touch the snapshot.
    let mut reprice: ProductActive = live.into();
    reprice.price = Set(dec!(9999));
    reprice.discount_price = Set(None);
    reprice.update(&state.orm).await?;

    let fetched = order_service::get_order(&state, &consumer, checkout.order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(fetched.items[0].price, dec!(1200));
    assert_eq!(fetched.order.total_amount, dec!(4400));

    Ok(())
}

#[tokio::test]
async fn checkout_with_nothing_in_the_cart_is_rejected() -> anyhow::Result<()> {
    let Some(state) = test_state().await? else {
        return Ok(());
    };

    let consumer = seed_user(&state, UserRole::Consumer).await?;

    let err = order_service::place_order(&state, &consumer, order_payload(), Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::EmptyCart));

    Ok(())
}

#[tokio::test]
async fn checkout_reports_every_stock_shortage_at_once() -> anyhow::Result<()> {
    let Some(state) = test_state().await? else {
        return Ok(());
    };

    let consumer = seed_user(&state, UserRole::Consumer).await?;
    let producer = seed_user(&state, UserRole::Producer).await?;
    let category = seed_category(&state).await?;

    let first = seed_product(
        &state,
        producer.user_id,
        category,
        "Manioc",
        dec!(1500),
        None,
        None,
        3,
    )
    .await?;
    let second = seed_product(
        &state,
        producer.user_id,
        category,
        "Piment",
        dec!(1000),
        None,
        None,
        5,
    )
    .await?;

    for (product, quantity) in [(&first, 3), (&second, 5)] {
        cart_service::add_to_cart(
            &state,
            &consumer,
            AddToCartRequest {
                product_id: product.id,
                quantity,
            },
        )
        .await?;
    }

    // Stock shrinks between carting and checkout.
    for (product, remaining) in [(&first, 1), (&second, 2)] {
        let mut shrink: ProductActive = reload_product(&state, product.id).await?.into();
        shrink.stock = Set(remaining);
        shrink.update(&state.orm).await?;
    }

    let availability = cart_service::check_availability(&state, &consumer)
        .await?
        .data
        .unwrap();
    assert!(!availability.available);
    assert_eq!(availability.issues.len(), 2);

    let err = order_service::place_order(&state, &consumer, order_payload(), Default::default())
        .await
        .unwrap_err();
    match err {
        AppError::StockCheck(issues) => {
            assert_eq!(issues.len(), 2);
            assert!(issues.iter().all(|i| i.kind == StockIssueKind::Insufficient));
            let manioc = issues.iter().find(|i| i.product_id == first.id).unwrap();
            assert_eq!(manioc.requested, 3);
            assert_eq!(manioc.available, 1);
        }
        other => panic!("expected StockCheck, got {other:?}"),
    }

    // Nothing was written: no order, stock untouched.
    let orders = Orders::find()
        .filter(OrderCol::UserId.eq(consumer.user_id))
        .all(&state.orm)
        .await?;
    assert!(orders.is_empty());
    assert_eq!(reload_product(&state, first.id).await?.stock, 1);
    assert_eq!(reload_product(&state, second.id).await?.stock, 2);

    Ok(())
}

#[tokio::test]
async fn guarded_decrement_never_oversells() -> anyhow::Result<()> {
    let Some(state) = test_state().await? else {
        return Ok(());
    };

    let producer = seed_user(&state, UserRole::Producer).await?;
    let category = seed_category(&state).await?;
    let product = seed_product(
        &state,
        producer.user_id,
        category,
        "Poisson fumé",
        dec!(6000),
        None,
        None,
        5,
    )
    .await?;

    assert!(order_service::decrement_stock_guarded(&state.orm, product.id, 3).await?);
    let live = reload_product(&state, product.id).await?;
    assert_eq!(live.stock, 2);
    assert_eq!(live.sales_count, 3);

    // Asking for more than is left is a clean no-op.
    assert!(!order_service::decrement_stock_guarded(&state.orm, product.id, 3).await?);
    let live = reload_product(&state, product.id).await?;
    assert_eq!(live.stock, 2);
    assert_eq!(live.sales_count, 3);

    Ok(())
}

#[tokio::test]
async fn re_adding_a_product_merges_the_line() -> anyhow::Result<()> {
    let Some(state) = test_state().await? else {
        return Ok(());
    };

    let consumer = seed_user(&state, UserRole::Consumer).await?;
    let producer = seed_user(&state, UserRole::Producer).await?;
    let category = seed_category(&state).await?;
    let product = seed_product(
        &state,
        producer.user_id,
        category,
        "Taro",
        dec!(2000),
        None,
        None,
        10,
    )
    .await?;

    for _ in 0..2 {
        cart_service::add_to_cart(
            &state,
            &consumer,
            AddToCartRequest {
                product_id: product.id,
                quantity: 3,
            },
        )
        .await?;
    }

    let view = cart_service::view_cart(&state, &consumer).await?.data.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 6);
    assert_eq!(view.subtotal, dec!(12000));

    // A third add would push the line past the stock of 10.
    let err = cart_service::add_to_cart(
        &state,
        &consumer,
        AddToCartRequest {
            product_id: product.id,
            quantity: 5,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));

    Ok(())
}

#[tokio::test]
async fn cancelling_restores_stock_and_is_final() -> anyhow::Result<()> {
    let Some(state) = test_state().await? else {
        return Ok(());
    };

    let consumer = seed_user(&state, UserRole::Consumer).await?;
    let producer = seed_user(&state, UserRole::Producer).await?;
    let category = seed_category(&state).await?;
    let product = seed_product(
        &state,
        producer.user_id,
        category,
        "Atanga",
        dec!(2500),
        None,
        None,
        10,
    )
    .await?;

    cart_service::add_to_cart(
        &state,
        &consumer,
        AddToCartRequest {
            product_id: product.id,
            quantity: 4,
        },
    )
    .await?;
    let order = order_service::place_order(&state, &consumer, order_payload(), Default::default())
        .await?
        .data
        .unwrap()
        .order;
    assert_eq!(reload_product(&state, product.id).await?.stock, 6);

    let cancelled = order_service::cancel_order(
        &state,
        &consumer,
        order.id,
        CancelOrderRequest::default(),
    )
    .await?
    .data
    .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(
        cancelled.cancellation_reason.as_deref(),
        Some("Cancelled by customer")
    );
    assert!(cancelled.cancelled_at.is_some());
    // Payment state is untouched by cancellation.
    assert_eq!(cancelled.payment_status, PaymentStatus::Pending);

    let live = reload_product(&state, product.id).await?;
    assert_eq!(live.stock, 10);
    assert_eq!(live.sales_count, 0);

    let history = History::find()
        .filter(HistoryCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?;
    assert_eq!(history.len(), 2);
    assert!(
        history
            .iter()
            .any(|h| h.old_status == Some(OrderStatus::Pending)
                && h.new_status == OrderStatus::Cancelled)
    );

    // A cancelled order cannot be cancelled again.
    let err = order_service::cancel_order(
        &state,
        &consumer,
        order.id,
        CancelOrderRequest::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));

    Ok(())
}

#[tokio::test]
async fn fulfilment_walks_one_step_at_a_time() -> anyhow::Result<()> {
    let Some(state) = test_state().await? else {
        return Ok(());
    };

    let consumer = seed_user(&state, UserRole::Consumer).await?;
    let producer = seed_user(&state, UserRole::Producer).await?;
    let admin = seed_user(&state, UserRole::Admin).await?;
    let category = seed_category(&state).await?;
    let product = seed_product(
        &state,
        producer.user_id,
        category,
        "Concombre",
        dec!(800),
        None,
        None,
        20,
    )
    .await?;

    cart_service::add_to_cart(
        &state,
        &consumer,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await?;
    let order = order_service::place_order(&state, &consumer, order_payload(), Default::default())
        .await?
        .data
        .unwrap()
        .order;

    // Jumping straight to shipped is refused.
    let err = advance(&state, &admin, order.id, "shipped").await.unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));

    // Unknown status names are a client error.
    let err = advance(&state, &admin, order.id, "teleported").await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let confirmed = advance(&state, &admin, order.id, "confirmed").await?.data.unwrap();
    assert!(confirmed.confirmed_at.is_some());
    let processing = advance(&state, &admin, order.id, "processing").await?.data.unwrap();
    assert!(processing.processing_at.is_some());

    // Delivery cannot be confirmed before shipment.
    let err = order_service::confirm_delivery(&state, &consumer, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));

    let shipped = advance(&state, &admin, order.id, "shipped").await?.data.unwrap();
    assert!(shipped.shipped_at.is_some());

    // No going back once shipped.
    let err = advance(&state, &admin, order.id, "processing").await.unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));

    // Cancellation window has closed too.
    let err = order_service::cancel_order(
        &state,
        &consumer,
        order.id,
        CancelOrderRequest::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));

    // The customer confirms receipt.
    let delivered = order_service::confirm_delivery(&state, &consumer, order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert!(delivered.delivered_at.is_some());

    // Confirming twice does not work; the order is final.
    let err = order_service::confirm_delivery(&state, &consumer, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));

    // The tracking timeline shows the whole journey as completed.
    let tracking = order_service::track_order(&state, &consumer, &order.order_number)
        .await?
        .data
        .unwrap();
    assert_eq!(tracking.timeline.len(), 5);
    assert!(tracking.timeline.iter().all(|stage| stage.completed));
    assert!(tracking.timeline.iter().all(|stage| stage.date.is_some()));

    // Every transition left a history row: creation plus four moves.
    let history = History::find()
        .filter(HistoryCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?;
    assert_eq!(history.len(), 5);

    Ok(())
}

#[tokio::test]
async fn admin_cancellation_also_restores_stock() -> anyhow::Result<()> {
    let Some(state) = test_state().await? else {
        return Ok(());
    };

    let consumer = seed_user(&state, UserRole::Consumer).await?;
    let producer = seed_user(&state, UserRole::Producer).await?;
    let admin = seed_user(&state, UserRole::Admin).await?;
    let category = seed_category(&state).await?;
    let product = seed_product(
        &state,
        producer.user_id,
        category,
        "Aubergine",
        dec!(1200),
        None,
        None,
        15,
    )
    .await?;

    cart_service::add_to_cart(
        &state,
        &consumer,
        AddToCartRequest {
            product_id: product.id,
            quantity: 5,
        },
    )
    .await?;
    let order = order_service::place_order(&state, &consumer, order_payload(), Default::default())
        .await?
        .data
        .unwrap()
        .order;
    assert_eq!(reload_product(&state, product.id).await?.stock, 10);

    let cancelled = admin_service::update_order_status(
        &state,
        &admin,
        order.id,
        UpdateOrderStatusRequest {
            status: "cancelled".into(),
            reason: Some("Producer ran out".into()),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Producer ran out"));
    assert_eq!(reload_product(&state, product.id).await?.stock, 15);

    Ok(())
}

#[tokio::test]
async fn ordinary_users_cannot_reach_admin_surfaces() -> anyhow::Result<()> {
    let Some(state) = test_state().await? else {
        return Ok(());
    };

    let consumer = seed_user(&state, UserRole::Consumer).await?;
    let err = admin_service::update_order_status(
        &state,
        &consumer,
        Uuid::new_v4(),
        UpdateOrderStatusRequest {
            status: "confirmed".into(),
            reason: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    Ok(())
}

#[tokio::test]
async fn low_stock_report_flags_running_out_products() -> anyhow::Result<()> {
    let Some(state) = test_state().await? else {
        return Ok(());
    };

    let producer = seed_user(&state, UserRole::Producer).await?;
    let admin = seed_user(&state, UserRole::Admin).await?;
    let category = seed_category(&state).await?;

    let scarce = seed_product(
        &state,
        producer.user_id,
        category,
        "Gombo",
        dec!(900),
        None,
        None,
        3,
    )
    .await?;
    let plentiful = seed_product(
        &state,
        producer.user_id,
        category,
        "Igname",
        dec!(1800),
        None,
        None,
        50,
    )
    .await?;

    let report = admin_service::low_stock(&state, &admin, LowStockQuery { threshold: Some(5) })
        .await?
        .data
        .unwrap();

    assert!(report.items.iter().any(|p| p.id == scarce.id));
    assert!(report.items.iter().all(|p| p.id != plentiful.id));

    Ok(())
}
