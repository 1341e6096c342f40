use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::Category;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 100, message = "Category name is required"))]
    pub name: String,
    /// Derived from the name when omitted.
    #[validate(length(max = 120, message = "Slug must be at most 120 characters"))]
    pub slug: Option<String>,
    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCategoryRequest {
    #[validate(length(min = 1, max = 100, message = "Category name must not be empty"))]
    pub name: Option<String>,
    #[validate(length(max = 120, message = "Slug must be at most 120 characters"))]
    pub slug: Option<String>,
    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryList {
    pub items: Vec<Category>,
}

/// A category with its children, nested to arbitrary depth.
#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryNode {
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryTree {
    pub roots: Vec<CategoryNode>,
}
