use std::sync::Arc;

use chrono::Utc;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

use agrolink_api::{
    db::{create_orm_conn, run_migrations},
    dto::categories::{CreateCategoryRequest, UpdateCategoryRequest},
    dto::products::{CreateProductRequest, UpdateProductRequest},
    entity::users::{ActiveModel as UserActive, UserRole, UserStatus},
    error::AppError,
    middleware::auth::AuthUser,
    notify::LogNotifier,
    routes::params::ProductQuery,
    services::{category_service, product_service},
    shipping::ShippingTable,
    state::AppState,
};

static MIGRATIONS: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

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

async fn seed_category_via_admin(state: &AppState, admin: &AuthUser) -> anyhow::Result<Uuid> {
    let category = category_service::create_category(
        state,
        admin,
        CreateCategoryRequest {
            name: format!("Catalogue {}", Uuid::new_v4()),
            slug: None,
            description: None,
            parent_id: None,
            is_active: None,
        },
    )
    .await?
    .data
    .unwrap();
    Ok(category.id)
}

fn product_payload(category_id: Uuid, name: &str) -> CreateProductRequest {
    CreateProductRequest {
        name: name.to_string(),
        description: Some("Cultivé sans intrants chimiques".into()),
        category_id,
        price: dec!(3500),
        discount_price: None,
        unit: Some("kg".into()),
        stock: 25,
        min_order_quantity: None,
        shipping_cost: None,
        sku: None,
        image: None,
    }
}

fn empty_update() -> UpdateProductRequest {
    UpdateProductRequest {
        name: None,
        description: None,
        category_id: None,
        price: None,
        discount_price: None,
        unit: None,
        stock: None,
        min_order_quantity: None,
        shipping_cost: None,
        sku: None,
        image: None,
        status: None,
    }
}

#[tokio::test]
async fn producer_manages_a_listing_end_to_end() -> anyhow::Result<()> {
    let Some(state) = test_state().await? else {
        return Ok(());
    };

    let producer = seed_user(&state, UserRole::Producer).await?;
    let consumer = seed_user(&state, UserRole::Consumer).await?;
    let admin = seed_user(&state, UserRole::Admin).await?;
    let category = seed_category_via_admin(&state, &admin).await?;

    // Consumers cannot list products for sale.
    let err = product_service::create_product(
        &state,
        &consumer,
        product_payload(category, "Bananes plantain"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let name = format!("Bananes plantain {}", Uuid::new_v4());
    let created = product_service::create_product(&state, &producer, product_payload(category, &name))
        .await?
        .data
        .unwrap();
    assert_eq!(created.producer_id, producer.user_id);
    assert_eq!(created.effective_price, dec!(3500));
    assert_eq!(created.sales_count, 0);

    // The public catalog finds it by name.
    let listed = product_service::list_products(
        &state,
        ProductQuery {
            q: Some(name.clone()),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(listed.currency, Some("FCFA"));
    assert!(listed.data.unwrap().items.iter().any(|p| p.id == created.id));

    // Another producer cannot touch the listing.
    let stranger = seed_user(&state, UserRole::Producer).await?;
    let err = product_service::update_product(
        &state,
        &stranger,
        created.id,
        UpdateProductRequest {
            price: Some(dec!(1)),
            ..empty_update()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // A discount at or above the price is rejected with the field named.
    let err = product_service::update_product(
        &state,
        &producer,
        created.id,
        UpdateProductRequest {
            discount_price: Some(dec!(3500)),
            ..empty_update()
        },
    )
    .await
    .unwrap_err();
    match err {
        AppError::Validation(failures) => {
            assert!(failures.0.contains_key("discount_price"));
        }
        other => panic!("expected Validation, got {other:?}"),
    }

    // A valid discount lowers the effective price.
    let updated = product_service::update_product(
        &state,
        &producer,
        created.id,
        UpdateProductRequest {
            discount_price: Some(dec!(3000)),
            ..empty_update()
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(updated.effective_price, dec!(3000));

    // Deactivating hides it from the default catalog but keeps it fetchable.
    product_service::update_product(
        &state,
        &producer,
        created.id,
        UpdateProductRequest {
            status: Some("inactive".into()),
            ..empty_update()
        },
    )
    .await?;
    let listed = product_service::list_products(
        &state,
        ProductQuery {
            q: Some(name.clone()),
            ..Default::default()
        },
    )
    .await?
    .data
    .unwrap();
    assert!(listed.items.iter().all(|p| p.id != created.id));
    let fetched = product_service::get_product(&state, created.id).await?.data.unwrap();
    assert_eq!(fetched.id, created.id);

    // Admins may delete any listing.
    product_service::delete_product(&state, &admin, created.id).await?;
    let err = product_service::get_product(&state, created.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    Ok(())
}

#[tokio::test]
async fn unknown_status_filter_is_a_client_error() -> anyhow::Result<()> {
    let Some(state) = test_state().await? else {
        return Ok(());
    };

    let err = product_service::list_products(
        &state,
        ProductQuery {
            status: Some("vaporware".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    Ok(())
}

#[tokio::test]
async fn category_tree_nests_and_guards_deletion() -> anyhow::Result<()> {
    let Some(state) = test_state().await? else {
        return Ok(());
    };

    let admin = seed_user(&state, UserRole::Admin).await?;
    let consumer = seed_user(&state, UserRole::Consumer).await?;

    // Category management is an admin surface.
    let err = category_service::create_category(
        &state,
        &consumer,
        CreateCategoryRequest {
            name: "Fruits".into(),
            slug: None,
            description: None,
            parent_id: None,
            is_active: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let suffix = Uuid::new_v4().simple().to_string();
    let parent = category_service::create_category(
        &state,
        &admin,
        CreateCategoryRequest {
            name: format!("Fruits {suffix}"),
            slug: None,
            description: None,
            parent_id: None,
            is_active: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(parent.slug, format!("fruits-{suffix}"));

    // Slugs are unique.
    let err = category_service::create_category(
        &state,
        &admin,
        CreateCategoryRequest {
            name: format!("Fruits {suffix}"),
            slug: None,
            description: None,
            parent_id: None,
            is_active: None,
        },
    )
    .await
    .unwrap_err();
    match err {
        AppError::Validation(failures) => assert!(failures.0.contains_key("slug")),
        other => panic!("expected Validation, got {other:?}"),
    }

    let child = category_service::create_category(
        &state,
        &admin,
        CreateCategoryRequest {
            name: format!("Agrumes {suffix}"),
            slug: None,
            description: None,
            parent_id: Some(parent.id),
            is_active: None,
        },
    )
    .await?
    .data
    .unwrap();

    // A category cannot become its own parent.
    let err = category_service::update_category(
        &state,
        &admin,
        parent.id,
        UpdateCategoryRequest {
            name: None,
            slug: None,
            description: None,
            parent_id: Some(parent.id),
            is_active: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));

    // The tree nests the child under the parent.
    let tree = category_service::category_tree(&state).await?.data.unwrap();
    let parent_node = tree
        .roots
        .iter()
        .find(|node| node.category.id == parent.id)
        .expect("parent in tree");
    assert!(parent_node.children.iter().any(|n| n.category.id == child.id));

    // The parent cannot go while the child exists.
    let err = category_service::delete_category(&state, &admin, parent.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));

    category_service::delete_category(&state, &admin, child.id).await?;
    category_service::delete_category(&state, &admin, parent.id).await?;
    let err = category_service::get_category(&state, parent.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    Ok(())
}
