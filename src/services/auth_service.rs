use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit::log_audit,
    dto::auth::{AuthResponse, Claims, LoginRequest, RegisterRequest},
    entity::users::{
        ActiveModel as UserActive, Column as UserCol, Entity as Users, UserRole, UserStatus,
    },
    error::{AppError, AppResult, ValidationFailures},
    middleware::auth::AuthUser,
    models::User,
    response::ApiResponse,
    state::AppState,
};

pub async fn register(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<AuthResponse>> {
    payload
        .validate()
        .map_err(|errors| AppError::Validation(errors.into()))?;

    let (email, password, first_name, last_name, phone, city, role, business) = match payload {
        RegisterRequest::Consumer(request) => (
            request.email,
            request.password,
            request.first_name,
            request.last_name,
            request.phone,
            request.city,
            UserRole::Consumer,
            None,
        ),
        RegisterRequest::Producer(request) => (
            request.email,
            request.password,
            request.first_name,
            request.last_name,
            request.phone,
            request.city,
            UserRole::Producer,
            Some((
                request.business_name,
                request.province,
                request.production_types,
            )),
        ),
    };

    let taken = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    if taken.is_some() {
        let mut failures = ValidationFailures::default();
        failures.push("email", "Email is already registered");
        return Err(AppError::Validation(failures));
    }

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();

    let (business_name, province, production_types) = match business {
        Some((name, province, types)) => (
            Some(name),
            province,
            types.map(|t| serde_json::json!(t)),
        ),
        None => (None, None, None),
    };

    let now = Utc::now();
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        password_hash: Set(password_hash),
        first_name: Set(first_name),
        last_name: Set(last_name),
        phone: Set(phone),
        role: Set(role),
        status: Set(UserStatus::Active),
        city: Set(city),
        country: Set("Gabon".to_string()),
        business_name: Set(business_name),
        province: Set(province),
        production_types: Set(production_types),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    let token = issue_token(&user.id, user.role)?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.id),
        "user_register",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.id, "role": user.role.to_string() })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Account created",
        AuthResponse {
            token,
            user: user.into(),
        },
        None,
    ))
}

pub async fn login(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<AuthResponse>> {
    payload
        .validate()
        .map_err(|errors| AppError::Validation(errors.into()))?;

    let user = Users::find()
        .filter(UserCol::Email.eq(payload.email.as_str()))
        .one(&state.orm)
        .await?;
    let user = match user {
        Some(u) => u,
        None => return Err(AppError::BadRequest("Invalid email or password".into())),
    };

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;

    let argon2 = Argon2::default();
    if argon2
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(AppError::BadRequest("Invalid email or password".into()));
    }

    if user.status == UserStatus::Suspended {
        return Err(AppError::Unprocessable("This account is suspended".into()));
    }

    let token = issue_token(&user.id, user.role)?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.id),
        "user_login",
        Some("users"),
        None,
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Logged in",
        AuthResponse {
            token,
            user: user.into(),
        },
        None,
    ))
}

pub async fn me(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let account = Users::find_by_id(user.user_id).one(&state.orm).await?;
    let account = match account {
        Some(account) => account,
        None => return Err(AppError::NotFound("User")),
    };
    Ok(ApiResponse::success("Profile", account.into(), None))
}

fn issue_token(user_id: &Uuid, role: UserRole) -> AppResult<String> {
    let secret = std::env::var("JWT_SECRET")
        .map_err(|_| AppError::Internal(anyhow::anyhow!("JWT_SECRET is not set")))?;

    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(24))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}
