use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::validate::{non_negative_amount, positive_amount};
use crate::models::Product;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 150, message = "Product name is required"))]
    pub name: String,
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
    pub category_id: Uuid,
    #[validate(custom = "positive_amount")]
    pub price: Decimal,
    /// When present, must stay below `price`; checked in the service.
    #[validate(custom = "positive_amount")]
    pub discount_price: Option<Decimal>,
    #[validate(length(max = 20, message = "Unit must be at most 20 characters"))]
    pub unit: Option<String>,
    #[validate(range(min = 0, message = "Stock must not be negative"))]
    pub stock: i32,
    #[validate(range(min = 1, message = "Minimum order quantity must be at least 1"))]
    pub min_order_quantity: Option<i32>,
    #[validate(custom = "non_negative_amount")]
    pub shipping_cost: Option<Decimal>,
    #[validate(length(max = 50, message = "SKU must be at most 50 characters"))]
    pub sku: Option<String>,
    #[validate(length(max = 255, message = "Image path must be at most 255 characters"))]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 150, message = "Product name must not be empty"))]
    pub name: Option<String>,
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    #[validate(custom = "positive_amount")]
    pub price: Option<Decimal>,
    #[validate(custom = "positive_amount")]
    pub discount_price: Option<Decimal>,
    #[validate(length(max = 20, message = "Unit must be at most 20 characters"))]
    pub unit: Option<String>,
    #[validate(range(min = 0, message = "Stock must not be negative"))]
    pub stock: Option<i32>,
    #[validate(range(min = 1, message = "Minimum order quantity must be at least 1"))]
    pub min_order_quantity: Option<i32>,
    #[validate(custom = "non_negative_amount")]
    pub shipping_cost: Option<Decimal>,
    #[validate(length(max = 50, message = "SKU must be at most 50 characters"))]
    pub sku: Option<String>,
    #[validate(length(max = 255, message = "Image path must be at most 255 characters"))]
    pub image: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}
