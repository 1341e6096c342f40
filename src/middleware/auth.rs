use std::str::FromStr;

use axum::{extract::FromRequestParts, http::header};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use crate::{dto::auth::Claims, entity::users::UserRole, error::AppError};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: UserRole,
}

pub fn ensure_role(user: &AuthUser, role: UserRole) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, UserRole::Admin)
}

/// Producer-only surface; admins pass as well.
pub fn ensure_producer(user: &AuthUser) -> Result<(), AppError> {
    if user.role == UserRole::Admin {
        return Ok(());
    }
    ensure_role(user, UserRole::Producer)
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;
    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::BadRequest("Missing Authorization header".into()))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::BadRequest("Invalid Authorization header".into()))?;

        if !auth_str.starts_with("Bearer ") {
            return Err(AppError::BadRequest("Invalid Authorization scheme".into()));
        }
        let token = auth_str.trim_start_matches("Bearer ").trim();

        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| AppError::Internal(anyhow::anyhow!("JWT_SECRET is not set")))?;

        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::BadRequest("Invalid or expired token".into()))?;

        let user_id = Uuid::parse_str(&decoded.claims.sub)
            .map_err(|_| AppError::BadRequest("Invalid user id in token".into()))?;

        let role = UserRole::from_str(&decoded.claims.role)
            .map_err(|_| AppError::BadRequest("Invalid role in token".into()))?;

        Ok(AuthUser { user_id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn admin_gate() {
        assert!(ensure_admin(&user(UserRole::Admin)).is_ok());
        assert!(ensure_admin(&user(UserRole::Producer)).is_err());
        assert!(ensure_admin(&user(UserRole::Consumer)).is_err());
    }

    #[test]
    fn producer_gate_admits_admins() {
        assert!(ensure_producer(&user(UserRole::Producer)).is_ok());
        assert!(ensure_producer(&user(UserRole::Admin)).is_ok());
        assert!(ensure_producer(&user(UserRole::Consumer)).is_err());
    }
}
