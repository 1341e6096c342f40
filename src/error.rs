use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Per-field validation messages, keyed by field name.
#[derive(Debug, Default, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ValidationFailures(pub BTreeMap<String, Vec<String>>);

impl ValidationFailures {
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<validator::ValidationErrors> for ValidationFailures {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut failures = ValidationFailures::default();
        for (field, field_errors) in errors.field_errors() {
            for error in field_errors {
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{field} is invalid"));
                failures.push(field.to_string(), message);
            }
        }
        failures
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StockIssueKind {
    /// The cart references a product that no longer resolves.
    Missing,
    /// Requested quantity exceeds the available stock.
    Insufficient,
}

/// One unfulfillable cart line, reported with the quantities involved.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockIssue {
    pub product_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    pub requested: i32,
    pub available: i32,
    pub kind: StockIssueKind,
}

impl StockIssue {
    pub fn missing(product_id: Uuid, requested: i32) -> Self {
        Self {
            product_id,
            product_name: None,
            requested,
            available: 0,
            kind: StockIssueKind::Missing,
        }
    }

    pub fn insufficient(
        product_id: Uuid,
        product_name: impl Into<String>,
        requested: i32,
        available: i32,
    ) -> Self {
        Self {
            product_id,
            product_name: Some(product_name.into()),
            requested,
            available,
            kind: StockIssueKind::Insufficient,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(ValidationFailures),

    #[error("Your cart is empty")]
    EmptyCart,

    #[error("Insufficient stock for some products")]
    StockCheck(Vec<StockIssue>),

    #[error("Stock changed while placing the order")]
    StockRace(Box<StockIssue>),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Forbidden")]
    Forbidden,

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Database error")]
    Db(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::EmptyCart
            | AppError::StockCheck(_)
            | AppError::StockRace(_)
            | AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Db(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Unexpected failures keep a generic message; details go to the log.
            AppError::Db(err) => {
                tracing::error!(error = %err, "database error");
                "An unexpected error occurred. Please retry.".to_string()
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                "An unexpected error occurred. Please retry.".to_string()
            }
            other => other.to_string(),
        };

        let errors = match &self {
            AppError::Validation(failures) => serde_json::to_value(failures).ok(),
            AppError::StockCheck(issues) => serde_json::to_value(issues).ok(),
            AppError::StockRace(issue) => serde_json::to_value(std::slice::from_ref(&**issue)).ok(),
            _ => None,
        };

        let body = ErrorBody {
            success: false,
            message,
            errors,
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
