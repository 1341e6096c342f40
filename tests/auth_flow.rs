use std::sync::Arc;

use jsonwebtoken::{DecodingKey, Validation, decode};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use uuid::Uuid;

use agrolink_api::{
    db::{create_orm_conn, run_migrations},
    dto::auth::{Claims, ConsumerRegister, LoginRequest, ProducerRegister, RegisterRequest},
    entity::users::{ActiveModel as UserActive, Entity as Users, UserRole, UserStatus},
    error::AppError,
    middleware::auth::AuthUser,
    notify::LogNotifier,
    services::auth_service,
    shipping::ShippingTable,
    state::AppState,
};

const TEST_SECRET: &str = "integration-test-secret";

static MIGRATIONS: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

async fn test_state() -> anyhow::Result<Option<AppState>> {
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(None);
            }
        };

    // Every test writes the same value, so concurrent writes are benign.
    unsafe { std::env::set_var("JWT_SECRET", TEST_SECRET) };

    let orm = create_orm_conn(&database_url, 5).await?;
    MIGRATIONS
        .get_or_try_init(|| async { run_migrations(&orm).await })
        .await?;

    Ok(Some(AppState {
        orm,
        shipping: Arc::new(ShippingTable::default()),
        notifier: Arc::new(LogNotifier),
    }))
}

fn consumer_payload(email: &str) -> RegisterRequest {
    RegisterRequest::Consumer(ConsumerRegister {
        email: email.to_string(),
        password: "secret-password".into(),
        first_name: "Jean".into(),
        last_name: "Obame".into(),
        phone: Some("+24107123456".into()),
        city: Some("Libreville".into()),
    })
}

#[tokio::test]
async fn register_login_and_profile_roundtrip() -> anyhow::Result<()> {
    let Some(state) = test_state().await? else {
        return Ok(());
    };

    let email = format!("consumer-{}@test.agrolink.ga", Uuid::new_v4());
    let registered = auth_service::register(&state, consumer_payload(&email))
        .await?
        .data
        .unwrap();
    assert_eq!(registered.user.email, email);
    assert_eq!(registered.user.role, UserRole::Consumer);
    assert_eq!(registered.user.country, "Gabon");

    // The token carries the user id and role.
    let claims = decode::<Claims>(
        &registered.token,
        &DecodingKey::from_secret(TEST_SECRET.as_bytes()),
        &Validation::default(),
    )?
    .claims;
    assert_eq!(claims.sub, registered.user.id.to_string());
    assert_eq!(claims.role, "consumer");

    let logged_in = auth_service::login(
        &state,
        LoginRequest {
            email: email.clone(),
            password: "secret-password".into(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(logged_in.user.id, registered.user.id);
    assert!(!logged_in.token.is_empty());

    let auth_user = AuthUser {
        user_id: registered.user.id,
        role: UserRole::Consumer,
    };
    let profile = auth_service::me(&state, &auth_user).await?.data.unwrap();
    assert_eq!(profile.email, email);

    Ok(())
}

#[tokio::test]
async fn producer_registration_keeps_business_details() -> anyhow::Result<()> {
    let Some(state) = test_state().await? else {
        return Ok(());
    };

    let email = format!("producer-{}@test.agrolink.ga", Uuid::new_v4());
    let registered = auth_service::register(
        &state,
        RegisterRequest::Producer(ProducerRegister {
            email: email.clone(),
            password: "secret-password".into(),
            first_name: "Marie".into(),
            last_name: "Ndong".into(),
            phone: None,
            city: Some("Ntoum".into()),
            business_name: "Ferme Nkok".into(),
            province: Some("Estuaire".into()),
            production_types: Some(vec!["bananes".into(), "manioc".into()]),
        }),
    )
    .await?
    .data
    .unwrap();

    assert_eq!(registered.user.role, UserRole::Producer);
    assert_eq!(registered.user.business_name.as_deref(), Some("Ferme Nkok"));
    assert_eq!(registered.user.province.as_deref(), Some("Estuaire"));
    assert!(registered.user.production_types.is_some());

    Ok(())
}

#[tokio::test]
async fn duplicate_email_is_a_field_error() -> anyhow::Result<()> {
    let Some(state) = test_state().await? else {
        return Ok(());
    };

    let email = format!("dup-{}@test.agrolink.ga", Uuid::new_v4());
    auth_service::register(&state, consumer_payload(&email)).await?;

    let err = auth_service::register(&state, consumer_payload(&email))
        .await
        .unwrap_err();
    match err {
        AppError::Validation(failures) => {
            assert!(failures.0.contains_key("email"));
        }
        other => panic!("expected Validation, got {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn wrong_password_is_rejected_without_detail() -> anyhow::Result<()> {
    let Some(state) = test_state().await? else {
        return Ok(());
    };

    let email = format!("wrongpw-{}@test.agrolink.ga", Uuid::new_v4());
    auth_service::register(&state, consumer_payload(&email)).await?;

    let err = auth_service::login(
        &state,
        LoginRequest {
            email,
            password: "not-the-password".into(),
        },
    )
    .await
    .unwrap_err();
    // Same message whether the email or the password was wrong.
    assert!(matches!(err, AppError::BadRequest(message) if message == "Invalid email or password"));

    Ok(())
}

#[tokio::test]
async fn suspended_accounts_cannot_log_in() -> anyhow::Result<()> {
    let Some(state) = test_state().await? else {
        return Ok(());
    };

    let email = format!("suspended-{}@test.agrolink.ga", Uuid::new_v4());
    let registered = auth_service::register(&state, consumer_payload(&email))
        .await?
        .data
        .unwrap();

    let user = Users::find_by_id(registered.user.id)
        .one(&state.orm)
        .await?
        .expect("user row");
    let mut suspend: UserActive = user.into();
    suspend.status = Set(UserStatus::Suspended);
    suspend.update(&state.orm).await?;

    let err = auth_service::login(
        &state,
        LoginRequest {
            email,
            password: "secret-password".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Unprocessable(_)));

    Ok(())
}
