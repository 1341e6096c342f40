use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{
    order_items, orders,
    orders::{OrderStatus, PaymentMethod, PaymentStatus},
    products,
    products::ProductStatus,
    users,
    users::{UserRole, UserStatus},
};
use crate::pricing;

/// Public view of a user account. The password hash never leaves the
/// entity layer.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    pub city: Option<String>,
    pub country: String,
    pub business_name: Option<String>,
    pub province: Option<String>,
    pub production_types: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        User {
            id: model.id,
            email: model.email,
            first_name: model.first_name,
            last_name: model.last_name,
            phone: model.phone,
            role: model.role,
            status: model.status,
            city: model.city,
            country: model.country,
            business_name: model.business_name,
            province: model.province,
            production_types: model.production_types,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub producer_id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
    /// What a buyer pays right now: the discount price when one is set,
    /// the regular price otherwise.
    pub effective_price: Decimal,
    pub unit: Option<String>,
    pub stock: i32,
    pub min_order_quantity: Option<i32>,
    pub shipping_cost: Option<Decimal>,
    pub sku: Option<String>,
    pub image: Option<String>,
    pub status: ProductStatus,
    pub sales_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<products::Model> for Product {
    fn from(model: products::Model) -> Self {
        let effective_price = pricing::effective_price(model.price, model.discount_price);
        Product {
            id: model.id,
            producer_id: model.producer_id,
            category_id: model.category_id,
            name: model.name,
            description: model.description,
            price: model.price,
            discount_price: model.discount_price,
            effective_price,
            unit: model.unit,
            stock: model.stock,
            min_order_quantity: model.min_order_quantity,
            shipping_cost: model.shipping_cost,
            sku: model.sku,
            image: model.image,
            status: model.status,
            sales_count: model.sales_count,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<crate::entity::categories::Model> for Category {
    fn from(model: crate::entity::categories::Model) -> Self {
        Category {
            id: model.id,
            name: model.name,
            slug: model.slug,
            description: model.description,
            parent_id: model.parent_id,
            is_active: model.is_active,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_postal_code: Option<String>,
    pub shipping_country: String,
    pub phone: String,
    pub delivery_instructions: Option<String>,
    pub estimated_delivery_date: Option<NaiveDate>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub processing_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<orders::Model> for Order {
    fn from(model: orders::Model) -> Self {
        Order {
            id: model.id,
            order_number: model.order_number,
            user_id: model.user_id,
            status: model.status,
            subtotal: model.subtotal,
            shipping_cost: model.shipping_cost,
            total_amount: model.total_amount,
            payment_method: model.payment_method,
            payment_status: model.payment_status,
            shipping_address: model.shipping_address,
            shipping_city: model.shipping_city,
            shipping_postal_code: model.shipping_postal_code,
            shipping_country: model.shipping_country,
            phone: model.phone,
            delivery_instructions: model.delivery_instructions,
            estimated_delivery_date: model.estimated_delivery_date,
            confirmed_at: model.confirmed_at.map(|dt| dt.with_timezone(&Utc)),
            processing_at: model.processing_at.map(|dt| dt.with_timezone(&Utc)),
            shipped_at: model.shipped_at.map(|dt| dt.with_timezone(&Utc)),
            delivered_at: model.delivered_at.map(|dt| dt.with_timezone(&Utc)),
            cancelled_at: model.cancelled_at.map(|dt| dt.with_timezone(&Utc)),
            cancellation_reason: model.cancellation_reason,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_sku: Option<String>,
    pub product_image: Option<String>,
    pub quantity: i32,
    pub price: Decimal,
    pub subtotal: Decimal,
}

impl From<order_items::Model> for OrderItem {
    fn from(model: order_items::Model) -> Self {
        OrderItem {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            product_name: model.product_name,
            product_sku: model.product_sku,
            product_image: model.product_image,
            quantity: model.quantity,
            price: model.price,
            subtotal: model.subtotal,
        }
    }
}

