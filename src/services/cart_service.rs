use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit::log_audit,
    dto::cart::{AddToCartRequest, CartAvailability, CartCount, CartLine, CartView, UpdateCartItemRequest},
    entity::{
        cart_items::{self, ActiveModel as CartItemActive, Column as CartItemCol, Entity as CartItems},
        carts::{self, ActiveModel as CartActive, Column as CartCol, Entity as Carts},
        products::{self, Entity as Products, ProductStatus},
    },
    error::{AppError, AppResult, StockIssue, StockIssueKind},
    middleware::auth::AuthUser,
    pricing,
    response::ApiResponse,
    state::AppState,
};

pub async fn view_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let view = load_view(state, user.user_id).await?;
    Ok(ApiResponse::success("Cart", view, None))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartView>> {
    payload
        .validate()
        .map_err(|errors| AppError::Validation(errors.into()))?;

    let product = Products::find_by_id(payload.product_id).one(&state.orm).await?;
    let product = match product {
        Some(product) => product,
        None => return Err(AppError::NotFound("Product")),
    };
    if product.status != ProductStatus::Active {
        return Err(AppError::Unprocessable("Product is not available".into()));
    }

    let cart = find_or_create_cart(&state.orm, user.user_id).await?;

    let existing = CartItems::find()
        .filter(
            Condition::all()
                .add(CartItemCol::CartId.eq(cart.id))
                .add(CartItemCol::ProductId.eq(product.id)),
        )
        .one(&state.orm)
        .await?;

    // Re-adding a product grows the existing line instead of duplicating it.
    let quantity = existing.as_ref().map(|item| item.quantity).unwrap_or(0) + payload.quantity;
    check_line(&product, quantity)?;

    let now = Utc::now();
    match existing {
        Some(item) => {
            let mut active: CartItemActive = item.into();
            active.quantity = Set(quantity);
            active.updated_at = Set(now.into());
            active.update(&state.orm).await?;
        }
        None => {
            CartItemActive {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(product.id),
                quantity: Set(quantity),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            }
            .insert(&state.orm)
            .await?;
        }
    }

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "cart_add",
        Some("cart"),
        Some(serde_json::json!({ "product_id": product.id, "quantity": quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let view = load_view(state, user.user_id).await?;
    Ok(ApiResponse::success("Added to cart", view, None))
}

pub async fn update_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartView>> {
    payload
        .validate()
        .map_err(|errors| AppError::Validation(errors.into()))?;

    let item = owned_item(state, user.user_id, item_id).await?;

    let product = Products::find_by_id(item.product_id).one(&state.orm).await?;
    let product = match product {
        Some(product) => product,
        None => return Err(AppError::NotFound("Product")),
    };
    if product.status != ProductStatus::Active {
        return Err(AppError::Unprocessable("Product is not available".into()));
    }
    check_line(&product, payload.quantity)?;

    let mut active: CartItemActive = item.into();
    active.quantity = Set(payload.quantity);
    active.updated_at = Set(Utc::now().into());
    active.update(&state.orm).await?;

    let view = load_view(state, user.user_id).await?;
    Ok(ApiResponse::success("Cart updated", view, None))
}

pub async fn remove_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<CartView>> {
    let item = owned_item(state, user.user_id, item_id).await?;

    CartItems::delete_by_id(item.id).exec(&state.orm).await?;

    let view = load_view(state, user.user_id).await?;
    Ok(ApiResponse::success("Item removed", view, None))
}

pub async fn clear_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    if let Some(cart) = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?
    {
        CartItems::delete_many()
            .filter(CartItemCol::CartId.eq(cart.id))
            .exec(&state.orm)
            .await?;
    }

    let view = load_view(state, user.user_id).await?;
    Ok(ApiResponse::success("Cart cleared", view, None))
}

pub async fn count(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartCount>> {
    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?;

    let count = match cart {
        Some(cart) => CartItems::find()
            .filter(CartItemCol::CartId.eq(cart.id))
            .all(&state.orm)
            .await?
            .iter()
            .map(|item| i64::from(item.quantity))
            .sum(),
        None => 0,
    };

    Ok(ApiResponse::success("Cart count", CartCount { count }, None))
}

/// Dry-run the checkout stock check without touching anything.
pub async fn check_availability(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<CartAvailability>> {
    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?;
    let cart = match cart {
        Some(cart) => cart,
        None => return Err(AppError::EmptyCart),
    };

    let lines = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .find_also_related(Products)
        .all(&state.orm)
        .await?;
    if lines.is_empty() {
        return Err(AppError::EmptyCart);
    }

    let mut issues = Vec::new();
    for (item, product) in &lines {
        match product {
            None => issues.push(StockIssue::missing(item.product_id, item.quantity)),
            // A deactivated product cannot be bought, whatever its stock says.
            Some(product) if product.status != ProductStatus::Active => issues.push(StockIssue {
                product_id: product.id,
                product_name: Some(product.name.clone()),
                requested: item.quantity,
                available: 0,
                kind: StockIssueKind::Missing,
            }),
            Some(product) if product.stock < item.quantity => issues.push(StockIssue::insufficient(
                product.id,
                product.name.clone(),
                item.quantity,
                product.stock,
            )),
            Some(_) => {}
        }
    }

    let available = issues.is_empty();
    Ok(ApiResponse::success(
        "Availability checked",
        CartAvailability { available, issues },
        None,
    ))
}

async fn find_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> AppResult<carts::Model> {
    if let Some(cart) = Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .one(conn)
        .await?
    {
        return Ok(cart);
    }

    let now = Utc::now();
    let cart = CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        converted_to_order_id: Set(None),
        converted_at: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(conn)
    .await?;
    Ok(cart)
}

async fn owned_item(
    state: &AppState,
    user_id: Uuid,
    item_id: Uuid,
) -> AppResult<cart_items::Model> {
    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .one(&state.orm)
        .await?;
    let cart = match cart {
        Some(cart) => cart,
        None => return Err(AppError::NotFound("Cart item")),
    };

    let item = CartItems::find()
        .filter(
            Condition::all()
                .add(CartItemCol::Id.eq(item_id))
                .add(CartItemCol::CartId.eq(cart.id)),
        )
        .one(&state.orm)
        .await?;
    match item {
        Some(item) => Ok(item),
        None => Err(AppError::NotFound("Cart item")),
    }
}

fn check_line(product: &products::Model, quantity: i32) -> AppResult<()> {
    if let Some(moq) = product.min_order_quantity {
        if quantity < moq {
            return Err(AppError::Unprocessable(format!(
                "Minimum order quantity for {} is {}",
                product.name, moq
            )));
        }
    }
    if quantity > product.stock {
        return Err(AppError::Unprocessable(format!(
            "Insufficient stock for {}: {} available",
            product.name, product.stock
        )));
    }
    Ok(())
}

async fn load_view(state: &AppState, user_id: Uuid) -> AppResult<CartView> {
    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .one(&state.orm)
        .await?;
    let cart = match cart {
        Some(cart) => cart,
        None => {
            return Ok(CartView {
                id: None,
                items: Vec::new(),
                total_items: 0,
                subtotal: Decimal::ZERO,
            });
        }
    };

    let rows = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .find_also_related(Products)
        .all(&state.orm)
        .await?;

    let mut items = Vec::with_capacity(rows.len());
    let mut total_items: i64 = 0;
    let mut subtotal = Decimal::ZERO;
    for (item, product) in rows {
        // Lines whose product was deleted stay in the table but are not
        // shown; checkout reports them explicitly.
        let product = match product {
            Some(product) => product,
            None => continue,
        };
        let unit_price = pricing::effective_price(product.price, product.discount_price);
        let line_total = pricing::round_money(Decimal::from(item.quantity) * unit_price);
        total_items += i64::from(item.quantity);
        subtotal += line_total;
        items.push(CartLine {
            id: item.id,
            product: product.into(),
            quantity: item.quantity,
            unit_price,
            line_total,
        });
    }

    Ok(CartView {
        id: Some(cart.id),
        items,
        total_items,
        subtotal: pricing::round_money(subtotal),
    })
}
