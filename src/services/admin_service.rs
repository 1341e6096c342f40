use std::str::FromStr;

use chrono::Utc;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit::log_audit,
    dto::orders::{OrderList, OrderWithItems, UpdateOrderStatusRequest},
    dto::products::ProductList,
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, OrderStatus},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderItem, Product},
    notify::OrderCancelled,
    response::{ApiResponse, Meta},
    routes::params::{AdminOrderQuery, LowStockQuery, SortOrder},
    services::order_service::record_transition,
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: AdminOrderQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;

    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status = OrderStatus::from_str(status)
            .map_err(|_| AppError::BadRequest(format!("Unknown status filter: {status}")))?;
        condition = condition.add(OrderCol::Status.eq(status));
    }
    if let Some(user_id) = query.user_id {
        condition = condition.add(OrderCol::UserId.eq(user_id));
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

pub async fn get_any_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;

    let order = Orders::find_by_id(id).one(&state.orm).await?;
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

/// Move an order one step along the fulfilment chain, or cancel it.
///
/// The state machine only ever moves forward one step at a time, so a
/// shipped order cannot jump back to confirmed, and a delivered or
/// cancelled order is final.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    payload
        .validate()
        .map_err(|errors| AppError::Validation(errors.into()))?;

    let next = OrderStatus::from_str(&payload.status)
        .map_err(|_| AppError::BadRequest(format!("Unknown status: {}", payload.status)))?;

    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let order = match order {
        Some(order) => order,
        None => return Err(AppError::NotFound("Order")),
    };

    let current = order.status;
    if !current.can_transition_to(next) {
        return Err(AppError::Unprocessable(format!(
            "Cannot change status from {current} to {next}"
        )));
    }

    // An admin cancellation returns the reserved stock, the same as a
    // customer cancellation would.
    if next == OrderStatus::Cancelled {
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
    }

    let reason = match next {
        OrderStatus::Cancelled => Some(
            payload
                .reason
                .clone()
                .unwrap_or_else(|| "Cancelled by administrator".to_string()),
        ),
        _ => payload.reason.clone(),
    };

    let now = Utc::now();
    let mut active: OrderActive = order.into();
    active.status = Set(next);
    match next {
        OrderStatus::Confirmed => active.confirmed_at = Set(Some(now.into())),
        OrderStatus::Processing => active.processing_at = Set(Some(now.into())),
        OrderStatus::Shipped => active.shipped_at = Set(Some(now.into())),
        OrderStatus::Delivered => active.delivered_at = Set(Some(now.into())),
        OrderStatus::Cancelled => {
            active.cancelled_at = Set(Some(now.into()));
            active.cancellation_reason = Set(reason.clone());
        }
        OrderStatus::Pending => {}
    }
    active.updated_at = Set(now.into());
    let order = active.update(&txn).await?;

    record_transition(&txn, order.id, Some(current), next, reason.clone(), Some(user.user_id))
        .await?;

    txn.commit().await?;

    if next == OrderStatus::Cancelled {
        let cancelled = OrderCancelled {
            order_id: order.id,
            order_number: order.order_number.clone(),
            user_id: order.user_id,
            reason: reason.unwrap_or_default(),
        };
        if let Err(err) = state.notifier.order_cancelled(&cancelled).await {
            tracing::warn!(error = %err, order_id = %order.id, "cancellation notification failed");
        }
    }

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "order_status_update",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": order.id,
            "from": current.to_string(),
            "to": next.to_string(),
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Order status updated", order.into(), None))
}

/// Products running out, for the restock dashboard.
pub async fn low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<ProductList>> {
    ensure_admin(user)?;

    let threshold = query.threshold.unwrap_or(10);
    let items = Products::find()
        .filter(ProdCol::Stock.lte(threshold))
        .order_by_asc(ProdCol::Stock)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    Ok(ApiResponse::success("Low stock products", ProductList { items }, None).with_currency())
}
