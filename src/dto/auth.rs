use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use super::validate::gabon_phone;
use crate::models::User;

/// Registration is tagged by `role`. Producer accounts supply their
/// business details up front; the role never changes afterwards.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum RegisterRequest {
    Consumer(ConsumerRegister),
    Producer(ProducerRegister),
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            RegisterRequest::Consumer(request) => request.validate(),
            RegisterRequest::Producer(request) => request.validate(),
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConsumerRegister {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,
    #[validate(custom = "gabon_phone")]
    pub phone: Option<String>,
    #[validate(length(max = 100, message = "City must be at most 100 characters"))]
    pub city: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ProducerRegister {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,
    #[validate(custom = "gabon_phone")]
    pub phone: Option<String>,
    #[validate(length(max = 100, message = "City must be at most 100 characters"))]
    pub city: Option<String>,
    #[validate(length(min = 1, max = 150, message = "Business name is required"))]
    pub business_name: String,
    #[validate(length(max = 100, message = "Province must be at most 100 characters"))]
    pub province: Option<String>,
    pub production_types: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}
