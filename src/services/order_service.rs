use std::str::FromStr;

use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::sea_query::{Expr, LockType};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit::log_audit,
    dto::orders::{
        CancelOrderRequest, CheckoutResponse, OrderList, OrderWithItems, PaymentDirective,
        PlaceOrderRequest, TrackingResponse, TrackingStage,
    },
    entity::{
        cart_items::{Column as CartItemCol, Entity as CartItems},
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts},
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        order_status_history::ActiveModel as HistoryActive,
        orders::{
            self, ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, OrderStatus,
            PaymentMethod, PaymentStatus,
        },
        products::{Column as ProdCol, Entity as Products},
        users::Entity as Users,
    },
    error::{AppError, AppResult, StockIssue, ValidationFailures},
    middleware::auth::AuthUser,
    models::{Order, OrderItem},
    notify::{OrderCancelled, OrderPlaced},
    pricing::{self, PricedLine},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

/// Client details captured alongside the order.
#[derive(Debug, Default, Clone)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status = OrderStatus::from_str(status)
            .map_err(|_| AppError::BadRequest(format!("Unknown status filter: {status}")))?;
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)).with_currency())
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::Id.eq(id))
                .add(OrderCol::UserId.eq(user.user_id)),
        )
        .one(&state.orm)
        .await?;
    let order = match order {
        Some(order) => order,
        None => return Err(AppError::NotFound("Order")),
    };

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect();

    Ok(ApiResponse::success(
        "Order",
        OrderWithItems {
            order: order.into(),
            items,
        },
        None,
    )
    .with_currency())
}

/// Convert the user's cart into an order.
///
/// Everything from the order insert to the cart clear runs in one
/// transaction; any failure before commit leaves no trace. Stock is taken
/// with a guarded decrement, so two buyers racing for the last units cannot
/// both win.
pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    payload: PlaceOrderRequest,
    meta: RequestMeta,
) -> AppResult<ApiResponse<CheckoutResponse>> {
    let mut failures = match payload.validate() {
        Ok(()) => ValidationFailures::default(),
        Err(errors) => errors.into(),
    };
    if !state.shipping.is_serviced(&payload.shipping_city) {
        failures.push(
            "shipping_city",
            format!(
                "Delivery is not available in {}. Serviced cities: {}",
                payload.shipping_city,
                state.shipping.serviced_cities().join(", ")
            ),
        );
    }
    if !failures.is_empty() {
        return Err(AppError::Validation(failures));
    }

    // Cannot fail after the validator above; kept as an error path anyway.
    let payment_method = PaymentMethod::from_str(&payload.payment_method)
        .map_err(|_| AppError::BadRequest("Unknown payment method".into()))?;

    let buyer = Users::find_by_id(user.user_id).one(&state.orm).await?;
    let buyer = match buyer {
        Some(buyer) => buyer,
        None => return Err(AppError::NotFound("User")),
    };

    let txn = state.orm.begin().await?;

    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .one(&txn)
        .await?;
    let cart = match cart {
        Some(cart) => cart,
        None => return Err(AppError::EmptyCart),
    };

    let lines = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .find_also_related(Products)
        .all(&txn)
        .await?;
    if lines.is_empty() {
        return Err(AppError::EmptyCart);
    }

    // All-or-nothing: collect every violation before failing.
    let mut issues = Vec::new();
    for (item, product) in &lines {
        match product {
            None => issues.push(StockIssue::missing(item.product_id, item.quantity)),
            Some(product) if product.stock < item.quantity => issues.push(
                StockIssue::insufficient(product.id, product.name.clone(), item.quantity, product.stock),
            ),
            Some(_) => {}
        }
    }
    if !issues.is_empty() {
        return Err(AppError::StockCheck(issues));
    }

    let lines: Vec<_> = lines
        .into_iter()
        .filter_map(|(item, product)| product.map(|product| (item, product)))
        .collect();

    let priced: Vec<PricedLine> = lines
        .iter()
        .map(|(item, product)| PricedLine {
            quantity: item.quantity,
            unit_price: pricing::effective_price(product.price, product.discount_price),
            shipping_cost: product.shipping_cost,
        })
        .collect();
    let totals =
        pricing::checkout_totals(&priced, state.shipping.base_cost(&payload.shipping_city));

    let now = Utc::now();
    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        order_number: Set(build_order_number()),
        user_id: Set(user.user_id),
        status: Set(OrderStatus::Pending),
        subtotal: Set(totals.subtotal),
        shipping_cost: Set(totals.shipping_cost),
        total_amount: Set(totals.total_amount),
        payment_method: Set(payment_method),
        payment_status: Set(PaymentStatus::Pending),
        shipping_address: Set(payload.shipping_address),
        shipping_city: Set(payload.shipping_city.clone()),
        shipping_postal_code: Set(payload.shipping_postal_code),
        shipping_country: Set(payload.shipping_country),
        phone: Set(payload.phone),
        delivery_instructions: Set(payload.delivery_instructions),
        estimated_delivery_date: Set(Some(
            state.shipping.estimated_delivery(&payload.shipping_city),
        )),
        ip_address: Set(meta.ip_address),
        user_agent: Set(meta.user_agent),
        confirmed_at: Set(None),
        processing_at: Set(None),
        shipped_at: Set(None),
        delivered_at: Set(None),
        cancelled_at: Set(None),
        cancellation_reason: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::with_capacity(lines.len());
    for (line, product) in &lines {
        let unit_price = pricing::effective_price(product.price, product.discount_price);
        let line_subtotal = pricing::round_money(Decimal::from(line.quantity) * unit_price);

        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(product.id),
            product_name: Set(product.name.clone()),
            product_sku: Set(product.sku.clone()),
            product_image: Set(product.image.clone()),
            quantity: Set(line.quantity),
            price: Set(unit_price),
            subtotal: Set(line_subtotal),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;
        items.push(item.into());

        // The stock check above was advisory; this is the authoritative take.
        if !decrement_stock_guarded(&txn, product.id, line.quantity).await? {
            let available = Products::find_by_id(product.id)
                .one(&txn)
                .await?
                .map(|p| p.stock)
                .unwrap_or(0);
            return Err(AppError::StockRace(Box::new(StockIssue::insufficient(
                product.id,
                product.name.clone(),
                line.quantity,
                available,
            ))));
        }
    }

    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&txn)
        .await?;
    let mut cart_active: CartActive = cart.into();
    cart_active.converted_to_order_id = Set(Some(order.id));
    cart_active.converted_at = Set(Some(now.into()));
    cart_active.updated_at = Set(now.into());
    cart_active.update(&txn).await?;

    record_transition(&txn, order.id, None, OrderStatus::Pending, None, Some(user.user_id))
        .await?;

    txn.commit().await?;

    let placed = OrderPlaced {
        order_id: order.id,
        order_number: order.order_number.clone(),
        user_id: user.user_id,
        user_email: buyer.email.clone(),
        total_amount: order.total_amount.to_string(),
        items_count: items.len(),
    };
    if let Err(err) = state.notifier.order_confirmation(&placed).await {
        tracing::warn!(error = %err, order_id = %order.id, "order confirmation failed");
    }
    if let Err(err) = state.notifier.admin_order_alert(&placed).await {
        tracing::warn!(error = %err, order_id = %order.id, "admin order alert failed");
    }
    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "checkout",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": order.id,
            "order_number": order.order_number,
            "total_amount": order.total_amount.to_string(),
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let estimated_delivery = order.estimated_delivery_date;
    let payment = payment_directive(payment_method, order.id);
    let items_count = items.len();
    let response = CheckoutResponse {
        order: order.into(),
        items,
        items_count,
        estimated_delivery,
        payment,
    };

    Ok(ApiResponse::success("Order placed", response, None).with_currency())
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: CancelOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    payload
        .validate()
        .map_err(|errors| AppError::Validation(errors.into()))?;

    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::Id.eq(id))
                .add(OrderCol::UserId.eq(user.user_id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let order = match order {
        Some(order) => order,
        None => return Err(AppError::NotFound("Order")),
    };

    if !order.status.cancellable() {
        return Err(AppError::Unprocessable(
            "This order can no longer be cancelled".into(),
        ));
    }

    // Put the stock back for products that still exist; deleted products
    // are skipped by the id filter matching nothing.
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&txn)
        .await?;
    for item in &items {
        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(item.quantity))
            .col_expr(
                ProdCol::SalesCount,
                Expr::col(ProdCol::SalesCount).sub(item.quantity),
            )
            .filter(ProdCol::Id.eq(item.product_id))
            .exec(&txn)
            .await?;
    }

    let reason = payload
        .reason
        .clone()
        .unwrap_or_else(|| "Cancelled by customer".to_string());
    let now = Utc::now();
    let old_status = order.status;
    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Cancelled);
    active.cancelled_at = Set(Some(now.into()));
    active.cancellation_reason = Set(Some(reason.clone()));
    active.updated_at = Set(now.into());
    let order = active.update(&txn).await?;

    record_transition(
        &txn,
        order.id,
        Some(old_status),
        OrderStatus::Cancelled,
        Some(reason.clone()),
        Some(user.user_id),
    )
    .await?;

    txn.commit().await?;

    let cancelled = OrderCancelled {
        order_id: order.id,
        order_number: order.order_number.clone(),
        user_id: user.user_id,
        reason,
    };
    if let Err(err) = state.notifier.order_cancelled(&cancelled).await {
        tracing::warn!(error = %err, order_id = %order.id, "cancellation notification failed");
    }
    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "order_cancel",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Order cancelled", order.into(), None))
}

pub async fn confirm_delivery(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::Id.eq(id))
                .add(OrderCol::UserId.eq(user.user_id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let order = match order {
        Some(order) => order,
        None => return Err(AppError::NotFound("Order")),
    };

    if order.status != OrderStatus::Shipped {
        return Err(AppError::Unprocessable(
            "Order has not been shipped yet".into(),
        ));
    }

    let now = Utc::now();
    let old_status = order.status;
    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Delivered);
    active.delivered_at = Set(Some(now.into()));
    active.updated_at = Set(now.into());
    let order = active.update(&txn).await?;

    record_transition(
        &txn,
        order.id,
        Some(old_status),
        OrderStatus::Delivered,
        None,
        Some(user.user_id),
    )
    .await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "order_delivered",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Delivery confirmed", order.into(), None))
}

pub async fn track_order(
    state: &AppState,
    user: &AuthUser,
    order_number: &str,
) -> AppResult<ApiResponse<TrackingResponse>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::OrderNumber.eq(order_number))
                .add(OrderCol::UserId.eq(user.user_id)),
        )
        .one(&state.orm)
        .await?;
    let order = match order {
        Some(order) => order,
        None => return Err(AppError::NotFound("Order")),
    };

    let timeline = build_timeline(&order);
    let estimated_delivery = order.estimated_delivery_date;
    Ok(ApiResponse::success(
        "Order tracking",
        TrackingResponse {
            order: order.into(),
            timeline,
            estimated_delivery,
        },
        None,
    ))
}

/// Take `quantity` units of stock if, and only if, enough are left.
/// Returns false without touching the row when stock is short.
pub async fn decrement_stock_guarded<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> AppResult<bool> {
    let result = Products::update_many()
        .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(quantity))
        .col_expr(
            ProdCol::SalesCount,
            Expr::col(ProdCol::SalesCount).add(quantity),
        )
        .filter(ProdCol::Id.eq(product_id))
        .filter(ProdCol::Stock.gte(quantity))
        .exec(conn)
        .await?;
    Ok(result.rows_affected > 0)
}

pub(crate) async fn record_transition<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    old_status: Option<OrderStatus>,
    new_status: OrderStatus,
    reason: Option<String>,
    changed_by: Option<Uuid>,
) -> AppResult<()> {
    HistoryActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        old_status: Set(old_status),
        new_status: Set(new_status),
        reason: Set(reason),
        changed_by: Set(changed_by),
        created_at: Set(Utc::now().into()),
    }
    .insert(conn)
    .await?;
    Ok(())
}

fn build_timeline(order: &orders::Model) -> Vec<TrackingStage> {
    let reached = order.status.rank();
    let stage = |status: OrderStatus, date: Option<sea_orm::prelude::DateTimeWithTimeZone>| {
        let completed = match (status.rank(), reached) {
            // The first stage is always done: the order exists.
            (Some(0), _) => true,
            (Some(s), Some(r)) => r >= s,
            _ => false,
        };
        TrackingStage {
            status,
            label: stage_label(status),
            completed,
            date: date.map(|dt| dt.with_timezone(&Utc)),
        }
    };

    vec![
        stage(OrderStatus::Pending, Some(order.created_at)),
        stage(OrderStatus::Confirmed, order.confirmed_at),
        stage(OrderStatus::Processing, order.processing_at),
        stage(OrderStatus::Shipped, order.shipped_at),
        stage(OrderStatus::Delivered, order.delivered_at),
    ]
}

fn stage_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Order received",
        OrderStatus::Confirmed => "Order confirmed",
        OrderStatus::Processing => "Being prepared",
        OrderStatus::Shipped => "Shipped",
        OrderStatus::Delivered => "Delivered",
        OrderStatus::Cancelled => "Cancelled",
    }
}

fn payment_directive(method: PaymentMethod, order_id: Uuid) -> PaymentDirective {
    match method {
        PaymentMethod::CashOnDelivery => PaymentDirective {
            required: false,
            payment_url: None,
            instructions: "Order confirmed. Payment is collected on delivery.".into(),
        },
        _ => PaymentDirective {
            required: true,
            payment_url: Some(format!("/api/orders/{order_id}/payment")),
            instructions: "Proceed to payment to confirm the order.".into(),
        },
    }
}

fn build_order_number() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("CMD-{}", token.to_uppercase())
}
