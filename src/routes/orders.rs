use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::orders::{
        CancelOrderRequest, CheckoutResponse, OrderList, OrderWithItems, PlaceOrderRequest,
        TrackingResponse,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::Order,
    response::ApiResponse,
    routes::params::OrderListQuery,
    services::order_service::{self, RequestMeta},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(checkout))
        .route("/track/{order_number}", get(track_order))
        .route("/{id}", get(get_order))
        .route("/{id}/cancel", post(cancel_order))
        .route("/{id}/confirm-delivery", post(confirm_delivery))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by order status"),
        ("sort_order" = Option<String>, Query, description = "asc | desc, default desc"),
    ),
    responses(
        (status = 200, description = "The caller's orders", body = ApiResponse<OrderList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_orders(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order placed from the cart", body = ApiResponse<CheckoutResponse>),
        (status = 422, description = "Validation, empty cart, or stock failure"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<PlaceOrderRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<CheckoutResponse>>)> {
    let meta = request_meta(&headers);
    let resp = order_service::place_order(&state, &user, payload, meta).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Order with its items", body = ApiResponse<OrderWithItems>),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::get_order(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders/{id}/cancel",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order cancelled, stock restored", body = ApiResponse<Order>),
        (status = 404, description = "Order not found"),
        (status = 422, description = "Order is past the point of cancellation"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelOrderRequest>>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let resp = order_service::cancel_order(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders/{id}/confirm-delivery",
    params(
        ("id" = Uuid, Path, description = "Order ID")
    ),
    responses(
        (status = 200, description = "Delivery confirmed by the customer", body = ApiResponse<Order>),
        (status = 404, description = "Order not found"),
        (status = 422, description = "Order has not been shipped"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn confirm_delivery(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = order_service::confirm_delivery(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/orders/track/{order_number}",
    params(
        ("order_number" = String, Path, description = "Order number, e.g. CMD-8F2K1A9CQ7XZ")
    ),
    responses(
        (status = 200, description = "Fulfilment timeline", body = ApiResponse<TrackingResponse>),
        (status = 404, description = "Order not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn track_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_number): Path<String>,
) -> AppResult<Json<ApiResponse<TrackingResponse>>> {
    let resp = order_service::track_order(&state, &user, &order_number).await?;
    Ok(Json(resp))
}

fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string());
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());
    RequestMeta {
        ip_address,
        user_agent,
    }
}
