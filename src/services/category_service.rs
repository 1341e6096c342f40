use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit::log_audit,
    dto::categories::{
        CategoryList, CategoryNode, CategoryTree, CreateCategoryRequest, UpdateCategoryRequest,
    },
    entity::{
        categories::{ActiveModel, Column, Entity as Categories},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult, ValidationFailures},
    middleware::auth::{AuthUser, ensure_admin},
    models::Category,
    response::ApiResponse,
    routes::params::CategoryQuery,
    state::AppState,
};

pub async fn list_categories(
    state: &AppState,
    query: CategoryQuery,
) -> AppResult<ApiResponse<CategoryList>> {
    let mut condition = Condition::all();
    if !query.include_inactive.unwrap_or(false) {
        condition = condition.add(Column::IsActive.eq(true));
    }

    let items = Categories::find()
        .filter(condition)
        .order_by_asc(Column::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Category::from)
        .collect();

    Ok(ApiResponse::success("Categories", CategoryList { items }, None))
}

/// Active categories nested under their parents.
pub async fn category_tree(state: &AppState) -> AppResult<ApiResponse<CategoryTree>> {
    let flat: Vec<Category> = Categories::find()
        .filter(Column::IsActive.eq(true))
        .order_by_asc(Column::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Category::from)
        .collect();

    let roots = build_tree(flat);
    Ok(ApiResponse::success("Category tree", CategoryTree { roots }, None))
}

pub async fn get_category(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Category>> {
    let category = Categories::find_by_id(id)
        .one(&state.orm)
        .await?
        .map(Category::from);
    match category {
        Some(category) => Ok(ApiResponse::success("Category", category, None)),
        None => Err(AppError::NotFound("Category")),
    }
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    payload
        .validate()
        .map_err(|errors| AppError::Validation(errors.into()))?;

    let slug = match payload.slug {
        Some(slug) => slug,
        None => slugify(&payload.name),
    };
    ensure_slug_free(state, &slug, None).await?;

    if let Some(parent_id) = payload.parent_id {
        if Categories::find_by_id(parent_id)
            .one(&state.orm)
            .await?
            .is_none()
        {
            return Err(AppError::NotFound("Category"));
        }
    }

    let now = Utc::now();
    let category = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        slug: Set(slug),
        description: Set(payload.description),
        parent_id: Set(payload.parent_id),
        is_active: Set(payload.is_active.unwrap_or(true)),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "category_create",
        Some("categories"),
        Some(serde_json::json!({ "category_id": category.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Category created",
        category.into(),
        None,
    ))
}

pub async fn update_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    payload
        .validate()
        .map_err(|errors| AppError::Validation(errors.into()))?;

    let existing = Categories::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(category) => category,
        None => return Err(AppError::NotFound("Category")),
    };

    if let Some(slug) = payload.slug.as_deref() {
        ensure_slug_free(state, slug, Some(id)).await?;
    }

    if let Some(parent_id) = payload.parent_id {
        if parent_id == id {
            return Err(AppError::Unprocessable(
                "A category cannot be its own parent".into(),
            ));
        }
        if Categories::find_by_id(parent_id)
            .one(&state.orm)
            .await?
            .is_none()
        {
            return Err(AppError::NotFound("Category"));
        }
    }

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(slug) = payload.slug {
        active.slug = Set(slug);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(parent_id) = payload.parent_id {
        active.parent_id = Set(Some(parent_id));
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    active.updated_at = Set(Utc::now().into());

    let category = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "category_update",
        Some("categories"),
        Some(serde_json::json!({ "category_id": category.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Category updated",
        category.into(),
        None,
    ))
}

pub async fn delete_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    if Categories::find_by_id(id).one(&state.orm).await?.is_none() {
        return Err(AppError::NotFound("Category"));
    }

    let products = Products::find()
        .filter(ProdCol::CategoryId.eq(id))
        .count(&state.orm)
        .await?;
    if products > 0 {
        return Err(AppError::Unprocessable(
            "Category still has products".into(),
        ));
    }

    let children = Categories::find()
        .filter(Column::ParentId.eq(id))
        .count(&state.orm)
        .await?;
    if children > 0 {
        return Err(AppError::Unprocessable(
            "Category still has subcategories".into(),
        ));
    }

    Categories::delete_by_id(id).exec(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "category_delete",
        Some("categories"),
        Some(serde_json::json!({ "category_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Category deleted",
        serde_json::json!({}),
        None,
    ))
}

async fn ensure_slug_free(state: &AppState, slug: &str, own_id: Option<Uuid>) -> AppResult<()> {
    let mut condition = Condition::all().add(Column::Slug.eq(slug));
    if let Some(own_id) = own_id {
        condition = condition.add(Column::Id.ne(own_id));
    }
    let taken = Categories::find()
        .filter(condition)
        .one(&state.orm)
        .await?
        .is_some();
    if taken {
        let mut failures = ValidationFailures::default();
        failures.push("slug", "Slug is already in use");
        return Err(AppError::Validation(failures));
    }
    Ok(())
}

/// Lowercase the name and squeeze everything that is not alphanumeric into
/// single hyphens.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

fn build_tree(categories: Vec<Category>) -> Vec<CategoryNode> {
    let ids: BTreeSet<Uuid> = categories.iter().map(|c| c.id).collect();

    let mut by_parent: BTreeMap<Option<Uuid>, Vec<Category>> = BTreeMap::new();
    for category in categories {
        // A parent that is missing from the listing (deleted or inactive)
        // promotes its children to roots instead of hiding them.
        let key = category.parent_id.filter(|parent| ids.contains(parent));
        by_parent.entry(key).or_default().push(category);
    }

    attach(&mut by_parent, None)
}

fn attach(
    by_parent: &mut BTreeMap<Option<Uuid>, Vec<Category>>,
    parent: Option<Uuid>,
) -> Vec<CategoryNode> {
    by_parent
        .remove(&parent)
        .unwrap_or_default()
        .into_iter()
        .map(|category| {
            let id = category.id;
            CategoryNode {
                children: attach(by_parent, Some(id)),
                category,
            }
        })
        .collect()
}
