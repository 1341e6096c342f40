use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit::log_audit,
    dto::products::{CreateProductRequest, ProductList, UpdateProductRequest},
    entity::{
        categories::Entity as Categories,
        products::{ActiveModel, Column, Entity as Products, ProductStatus},
        users::UserRole,
    },
    error::{AppError, AppResult, ValidationFailures},
    middleware::auth::{AuthUser, ensure_producer},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(category_id) = query.category_id {
        condition = condition.add(Column::CategoryId.eq(category_id));
    }

    if let Some(producer_id) = query.producer_id {
        condition = condition.add(Column::ProducerId.eq(producer_id));
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    // The public catalog hides inactive listings unless a status is asked
    // for explicitly.
    match query.status.as_ref().filter(|s| !s.is_empty()) {
        Some(status) => {
            let status = ProductStatus::from_str(status)
                .map_err(|_| AppError::BadRequest(format!("Unknown product status: {status}")))?;
            condition = condition.add(Column::Status.eq(status));
        }
        None => condition = condition.add(Column::Status.eq(ProductStatus::Active)),
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
        ProductSortBy::SalesCount => Column::SalesCount,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    let data = ProductList { items };
    Ok(ApiResponse::success("Products", data, Some(meta)).with_currency())
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Product>> {
    let result = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .map(Product::from);
    let result = match result {
        Some(product) => product,
        None => return Err(AppError::NotFound("Product")),
    };
    Ok(ApiResponse::success("Product", result, None).with_currency())
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_producer(user)?;

    let mut failures = match payload.validate() {
        Ok(()) => ValidationFailures::default(),
        Err(errors) => errors.into(),
    };
    check_discount(payload.price, payload.discount_price, &mut failures);
    if !failures.is_empty() {
        return Err(AppError::Validation(failures));
    }

    if Categories::find_by_id(payload.category_id)
        .one(&state.orm)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound("Category"));
    }

    let now = Utc::now();
    let active = ActiveModel {
        id: Set(Uuid::new_v4()),
        producer_id: Set(user.user_id),
        category_id: Set(payload.category_id),
        name: Set(payload.name),
        description: Set(payload.description),
        price: Set(payload.price),
        discount_price: Set(payload.discount_price),
        unit: Set(payload.unit),
        stock: Set(payload.stock),
        min_order_quantity: Set(payload.min_order_quantity),
        shipping_cost: Set(payload.shipping_cost),
        sku: Set(payload.sku),
        image: Set(payload.image),
        status: Set(ProductStatus::Active),
        sales_count: Set(0),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    let product = active.insert(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "product_create",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Product created",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    let existing = Products::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(product) => product,
        None => return Err(AppError::NotFound("Product")),
    };
    ensure_owner_or_admin(user, existing.producer_id)?;

    let mut failures = match payload.validate() {
        Ok(()) => ValidationFailures::default(),
        Err(errors) => errors.into(),
    };
    // Check the pair the row will hold after the update, mixing new and
    // existing values.
    let next_price = payload.price.unwrap_or(existing.price);
    let next_discount = payload.discount_price.or(existing.discount_price);
    check_discount(next_price, next_discount, &mut failures);
    if !failures.is_empty() {
        return Err(AppError::Validation(failures));
    }

    let status = match payload.status.as_deref() {
        Some(status) => Some(
            ProductStatus::from_str(status)
                .map_err(|_| AppError::BadRequest(format!("Unknown product status: {status}")))?,
        ),
        None => None,
    };

    if let Some(category_id) = payload.category_id {
        if Categories::find_by_id(category_id)
            .one(&state.orm)
            .await?
            .is_none()
        {
            return Err(AppError::NotFound("Category"));
        }
    }

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(category_id) = payload.category_id {
        active.category_id = Set(category_id);
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(discount_price) = payload.discount_price {
        active.discount_price = Set(Some(discount_price));
    }
    if let Some(unit) = payload.unit {
        active.unit = Set(Some(unit));
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(stock);
    }
    if let Some(min_order_quantity) = payload.min_order_quantity {
        active.min_order_quantity = Set(Some(min_order_quantity));
    }
    if let Some(shipping_cost) = payload.shipping_cost {
        active.shipping_cost = Set(Some(shipping_cost));
    }
    if let Some(sku) = payload.sku {
        active.sku = Set(Some(sku));
    }
    if let Some(image) = payload.image {
        active.image = Set(Some(image));
    }
    if let Some(status) = status {
        active.status = Set(status);
    }
    active.updated_at = Set(Utc::now().into());

    let product = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "product_update",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Product updated",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing = Products::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(product) => product,
        None => return Err(AppError::NotFound("Product")),
    };
    ensure_owner_or_admin(user, existing.producer_id)?;

    Products::delete_by_id(id).exec(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "product_delete",
        Some("products"),
        Some(serde_json::json!({ "product_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Product deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

fn ensure_owner_or_admin(user: &AuthUser, producer_id: Uuid) -> AppResult<()> {
    if user.role == UserRole::Admin || user.user_id == producer_id {
        return Ok(());
    }
    Err(AppError::Forbidden)
}

fn check_discount(price: Decimal, discount: Option<Decimal>, failures: &mut ValidationFailures) {
    if let Some(discount) = discount {
        if discount >= price {
            failures.push(
                "discount_price",
                "Discount price must be below the regular price",
            );
        }
    }
}
