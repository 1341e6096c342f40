use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::error::StockIssue;
use crate::models::Product;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

/// One cart line with the product as it stands right now; price drift
/// between adding and checking out shows up here, not silently at checkout.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartLine {
    pub id: Uuid,
    pub product: Product,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub id: Option<Uuid>,
    pub items: Vec<CartLine>,
    pub total_items: i64,
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartCount {
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartAvailability {
    pub available: bool,
    pub issues: Vec<StockIssue>,
}
