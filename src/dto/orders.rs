use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::validate::{gabon_phone, payment_method};
use crate::entity::orders::OrderStatus;
use crate::models::{Order, OrderItem};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PlaceOrderRequest {
    #[validate(length(min = 1, max = 255, message = "Shipping address is required"))]
    pub shipping_address: String,
    /// Must be one of the serviced cities; checked against the shipping table.
    #[validate(length(min = 1, max = 100, message = "Shipping city is required"))]
    pub shipping_city: String,
    #[validate(length(max = 10, message = "Postal code must be at most 10 characters"))]
    pub shipping_postal_code: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Shipping country is required"))]
    pub shipping_country: String,
    #[validate(custom = "gabon_phone")]
    pub phone: String,
    #[validate(length(max = 500, message = "Delivery instructions must be at most 500 characters"))]
    pub delivery_instructions: Option<String>,
    #[validate(custom = "payment_method")]
    pub payment_method: String,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct CancelOrderRequest {
    #[validate(length(max = 255, message = "Reason must be at most 255 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}

/// What the buyer should do next about payment. Cash on delivery needs
/// nothing; every other method points at the payment page for the order.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentDirective {
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
    pub instructions: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub items_count: usize,
    pub estimated_delivery: Option<NaiveDate>,
    pub payment: PaymentDirective,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TrackingStage {
    pub status: OrderStatus,
    pub label: &'static str,
    pub completed: bool,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TrackingResponse {
    pub order: Order,
    pub timeline: Vec<TrackingStage>,
    pub estimated_delivery: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    /// Target status name, e.g. "confirmed".
    #[validate(length(min = 1, message = "Status is required"))]
    pub status: String,
    #[validate(length(max = 255, message = "Reason must be at most 255 characters"))]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_payload() -> serde_json::Value {
        serde_json::json!({
            "shipping_address": "Quartier Louis, Rue de la Mairie",
            "shipping_city": "Libreville",
            "shipping_country": "Gabon",
            "phone": "+24107123456",
            "payment_method": "cash_on_delivery",
        })
    }

    #[test]
    fn well_formed_order_request_passes() {
        let request: PlaceOrderRequest = serde_json::from_value(valid_payload()).unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn bad_phone_and_method_are_reported_per_field() {
        let mut payload = valid_payload();
        payload["phone"] = "123".into();
        payload["payment_method"] = "paypal".into();
        let request: PlaceOrderRequest = serde_json::from_value(payload).unwrap();

        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("phone"));
        assert!(fields.contains_key("payment_method"));
        assert!(!fields.contains_key("shipping_address"));
    }

    #[test]
    fn empty_address_is_rejected() {
        let mut payload = valid_payload();
        payload["shipping_address"] = "".into();
        let request: PlaceOrderRequest = serde_json::from_value(payload).unwrap();
        assert!(request.validate().is_err());
    }
}
