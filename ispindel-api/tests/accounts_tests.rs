/// Integration tests for the account lifecycle
///
/// Run with: cargo test --test accounts_tests -- --test-threads=1

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{encode, TestContext, TEST_PASSWORD};
use ispindel_shared::accounts::{self, AccountError, ExternalProfile, RegisterInput};
use ispindel_shared::models::{ExternalId, Fermentation, Ispindel, User};
use uuid::Uuid;

fn registration(email: &str) -> RegisterInput {
    RegisterInput {
        name: "New Brewer".to_string(),
        email: email.to_string(),
        password: TEST_PASSWORD.to_string(),
        password_confirm: TEST_PASSWORD.to_string(),
        ip: Some("192.0.2.10".to_string()),
    }
}

async fn fail_logins(ctx: &TestContext, email: &str, times: usize) {
    for _ in 0..times {
        let result = accounts::login(&ctx.db, email, "wrong-password", Utc::now()).await;
        assert!(matches!(result, Err(AccountError::InvalidCredentials)));
    }
}

#[tokio::test]
async fn test_activation_flow() {
    let mut ctx = TestContext::new().await.unwrap();
    let email = TestContext::email("activate");
    let (user, token) = accounts::register(&ctx.db, registration(&email)).await.unwrap();
    ctx.track_email(&email).await.unwrap();

    assert!(!user.is_active);
    assert!(matches!(
        accounts::activate(&ctx.db, "not-a-real-token").await,
        Err(AccountError::InvalidActivationToken)
    ));

    accounts::activate(&ctx.db, &token).await.unwrap();
    let activated = User::find_by_id(&ctx.db, user.id).await.unwrap().unwrap();
    assert!(activated.is_active);
    assert!(activated.activation_completed);

    // The token is cleared once used
    assert!(matches!(
        accounts::activate(&ctx.db, &token).await,
        Err(AccountError::InvalidActivationToken | AccountError::AlreadyActivated)
    ));

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_expired_activation_token() {
    let mut ctx = TestContext::new().await.unwrap();
    let email = TestContext::email("expired");
    let (user, token) = accounts::register(&ctx.db, registration(&email)).await.unwrap();
    ctx.track_email(&email).await.unwrap();

    sqlx::query("UPDATE users SET activation_expires_at = $2 WHERE id = $1")
        .bind(user.id)
        .bind(Utc::now() - Duration::hours(1))
        .execute(&ctx.db)
        .await
        .unwrap();

    assert!(matches!(
        accounts::activate(&ctx.db, &token).await,
        Err(AccountError::ActivationExpired)
    ));

    let (status, _, body) = ctx
        .get(&format!("/auth/activate?token={}", encode(&token)), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("expired"));

    // A fresh link works
    let (_, fresh) = accounts::resend_activation(&ctx.db, &email).await.unwrap();
    accounts::activate(&ctx.db, &fresh).await.unwrap();

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_unknown_activation_link_page() {
    let ctx = TestContext::new().await.unwrap();

    let (status, _, body) = ctx.get("/auth/activate?token=bogus", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Invalid activation token"));
}

#[tokio::test]
async fn test_lock_expires_after_fifteen_minutes() {
    let mut ctx = TestContext::new().await.unwrap();
    let email = TestContext::email("lock-expiry");
    ctx.create_user(&email).await.unwrap();

    fail_logins(&ctx, &email, 5).await;
    assert!(matches!(
        accounts::login(&ctx.db, &email, TEST_PASSWORD, Utc::now() + Duration::minutes(14)).await,
        Err(AccountError::Locked)
    ));

    let user = accounts::login(&ctx.db, &email, TEST_PASSWORD, Utc::now() + Duration::minutes(16))
        .await
        .unwrap();

    let refreshed = User::find_by_id(&ctx.db, user.id).await.unwrap().unwrap();
    assert_eq!(refreshed.failed_logins, 0);
    assert!(refreshed.last_login_at.is_some());

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_password_reset_lifts_lock() {
    let mut ctx = TestContext::new().await.unwrap();
    let email = TestContext::email("reset");
    ctx.create_user(&email).await.unwrap();

    fail_logins(&ctx, &email, 5).await;
    let locked = User::find_by_email(&ctx.db, &email).await.unwrap().unwrap();
    assert_eq!(locked.failed_logins, 5);
    assert!(locked.is_locked(Utc::now()));

    let (_, token) = accounts::request_password_reset(&ctx.db, &email)
        .await
        .unwrap()
        .unwrap();
    accounts::reset_password(&ctx.db, &token, "fresh-new-password", "fresh-new-password")
        .await
        .unwrap();

    let reset = User::find_by_email(&ctx.db, &email).await.unwrap().unwrap();
    assert_eq!(reset.failed_logins, 0);
    assert!(reset.locked_until.is_none());
    assert!(reset.password_reset_token_hash.is_none());

    accounts::login(&ctx.db, &email, "fresh-new-password", Utc::now())
        .await
        .unwrap();

    // The link only works once
    assert!(matches!(
        accounts::reset_password(&ctx.db, &token, "another-password", "another-password").await,
        Err(AccountError::InvalidResetToken)
    ));

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_external_sign_in_matching_order() {
    let mut ctx = TestContext::new().await.unwrap();

    let google_id = format!("g-{}", Uuid::new_v4());
    let piwo_id = (Uuid::new_v4().as_u128() % 1_000_000_000) as i64;

    // No match: a new active account
    let google_email = TestContext::email("google");
    let created = accounts::upsert_external(
        &ctx.db,
        ExternalProfile {
            external_id: ExternalId::Google(google_id.clone()),
            email: google_email.clone(),
            name: "Google Brewer".to_string(),
            picture: None,
        },
    )
    .await
    .unwrap();
    ctx.track_email(&google_email).await.unwrap();

    assert!(created.is_active);
    assert!(created.password_hash.is_none());
    assert_eq!(created.google_id.as_deref(), Some(google_id.as_str()));

    // Provider id wins over a changed email
    let again = accounts::upsert_external(
        &ctx.db,
        ExternalProfile {
            external_id: ExternalId::Google(google_id.clone()),
            email: TestContext::email("renamed"),
            name: "Google Brewer".to_string(),
            picture: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(again.id, created.id);

    // Email match links the provider to an existing password account
    let email = TestContext::email("linked");
    let existing = ctx.create_user(&email).await.unwrap();
    let linked = accounts::upsert_external(
        &ctx.db,
        ExternalProfile {
            external_id: ExternalId::Piwo(piwo_id),
            email: email.to_uppercase(),
            name: "Piwo Brewer".to_string(),
            picture: Some("https://example.com/avatar.png".to_string()),
        },
    )
    .await
    .unwrap();

    assert_eq!(linked.id, existing.id);
    assert_eq!(linked.piwo_id, Some(piwo_id));
    assert_eq!(linked.picture.as_deref(), Some("https://example.com/avatar.png"));
    assert!(linked.password_hash.is_some());

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_delete_account_removes_everything() {
    let mut ctx = TestContext::new().await.unwrap();
    let user = ctx.create_user(&TestContext::email("goodbye")).await.unwrap();
    let device = ctx.create_device(&user, "Last Spindle").await.unwrap();
    let fermentation = ctx.create_fermentation(&user, &device, "").await.unwrap();
    ctx.insert_reading(&device, 1.050, 19.0, Utc::now()).await.unwrap();

    assert!(matches!(
        accounts::delete_account(&ctx.db, &user, Some("wrong-password")).await,
        Err(AccountError::WrongCurrentPassword)
    ));
    assert!(matches!(
        accounts::delete_account(&ctx.db, &user, Some("")).await,
        Err(AccountError::PasswordRequired)
    ));

    accounts::delete_account(&ctx.db, &user, Some(TEST_PASSWORD)).await.unwrap();

    assert!(User::find_by_id(&ctx.db, user.id).await.unwrap().is_none());
    assert!(Ispindel::find_by_id(&ctx.db, device.id).await.unwrap().is_none());
    assert!(Fermentation::find_for_user(&ctx.db, fermentation.id, user.id)
        .await
        .unwrap()
        .is_none());

    let readings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM measurements WHERE ispindel_id = $1")
        .bind(device.id)
        .fetch_one(&ctx.db)
        .await
        .unwrap();
    assert_eq!(readings, 0);

    let devices: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ispindels WHERE user_id = $1")
        .bind(user.id)
        .fetch_one(&ctx.db)
        .await
        .unwrap();
    assert_eq!(devices, 0);

    ctx.cleanup().await.unwrap();
}
