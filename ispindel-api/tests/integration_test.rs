/// Integration tests for the web application
///
/// These drive the full router against a real database:
/// - Registration, activation mail and duplicate detection
/// - Password login, session cookie and lockout
/// - Access control for signed-in and admin pages
/// - Device deletion ending running fermentations

mod common;

use axum::http::{header, StatusCode};
use common::{encode, location, TestContext, TEST_PASSWORD};
use ispindel_shared::devices::{self, DeletedBy};
use ispindel_shared::models::Fermentation;

fn register_form(email: &str, password: &str, confirm: &str) -> String {
    format!(
        "name=Brewer&email={}&password={}&password_confirm={}",
        encode(email),
        encode(password),
        encode(confirm)
    )
}

fn login_form(email: &str, password: &str) -> String {
    format!("email={}&password={}", encode(email), encode(password))
}

#[tokio::test]
async fn test_health_check() {
    let ctx = TestContext::new().await.unwrap();

    let (status, _, body) = ctx.get("/health", None).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["database"], "connected");
}

#[tokio::test]
async fn test_health_check_without_database() {
    let ctx = TestContext::new().await.unwrap();
    ctx.db.close().await;

    let (status, _, body) = ctx.get("/health", None).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["database"], "disconnected");
}

#[tokio::test]
async fn test_register_sends_activation_mail() {
    let mut ctx = TestContext::new().await.unwrap();
    let email = TestContext::email("register");

    let (status, headers, _) = ctx
        .post_form("/auth/register", &register_form(&email, TEST_PASSWORD, TEST_PASSWORD), None)
        .await;
    ctx.track_email(&email).await.unwrap();

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/auth/login?registered=true");
    assert_eq!(ctx.sent_mail_count(), 1);

    // Not activated yet
    let (_, _, body) = ctx.post_form("/auth/login", &login_form(&email, TEST_PASSWORD), None).await;
    assert!(body.contains("has not been activated"));

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_register_rejects_duplicate_email_ignoring_case() {
    let mut ctx = TestContext::new().await.unwrap();
    let email = TestContext::email("dup");
    ctx.create_user(&email).await.unwrap();

    let (status, _, body) = ctx
        .post_form(
            "/auth/register",
            &register_form(&email.to_uppercase(), TEST_PASSWORD, TEST_PASSWORD),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("already exists"));
    assert_eq!(ctx.sent_mail_count(), 0);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_register_rejects_short_password() {
    let ctx = TestContext::new().await.unwrap();
    let email = TestContext::email("short");

    let (status, _, body) = ctx
        .post_form("/auth/register", &register_form(&email, "short", "short"), None)
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("at least 8 characters"));
    assert!(ispindel_shared::models::User::find_by_email(&ctx.db, &email)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_login_sets_session_cookie() {
    let mut ctx = TestContext::new().await.unwrap();
    let email = TestContext::email("login");
    ctx.create_user(&email).await.unwrap();

    let (status, headers, _) = ctx.post_form("/auth/login", &login_form(&email, TEST_PASSWORD), None).await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/");

    let set_cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.starts_with("token="));
    assert!(set_cookie.contains("HttpOnly"));

    let cookie = set_cookie.split(';').next().unwrap();
    let (status, _, body) = ctx.get("/dashboard", Some(cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Dashboard"));

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_login_locks_account_after_five_failures() {
    let mut ctx = TestContext::new().await.unwrap();
    let email = TestContext::email("lockout");
    ctx.create_user(&email).await.unwrap();

    for _ in 0..5 {
        let (status, _, body) = ctx.post_form("/auth/login", &login_form(&email, "wrong-password"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Invalid email or password"));
    }

    // Even the right password is refused while locked
    let (status, headers, body) = ctx.post_form("/auth/login", &login_form(&email, TEST_PASSWORD), None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(headers.get(header::SET_COOKIE).is_none());
    assert!(body.contains("temporarily locked"));

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_protected_page_redirects_to_login() {
    let ctx = TestContext::new().await.unwrap();

    let (status, headers, _) = ctx.get("/ispindels", None).await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/auth/login");
}

#[tokio::test]
async fn test_invalid_session_cookie_is_anonymous() {
    let ctx = TestContext::new().await.unwrap();

    let (status, headers, _) = ctx.get("/dashboard", Some("token=not-a-jwt")).await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/auth/login");
}

#[tokio::test]
async fn test_admin_panel_access() {
    let mut ctx = TestContext::new().await.unwrap();
    let user = ctx.create_user(&TestContext::email("regular")).await.unwrap();
    let admin = ctx.create_admin().await.unwrap();

    let (status, headers, _) = ctx.get("/admin", None).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/auth/login");

    let (status, _, _) = ctx.get("/admin", Some(&ctx.cookie_for(&user))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, body) = ctx.get("/admin/users", Some(&ctx.cookie_for(&admin))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(&user.email));

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_admin_cannot_delete_itself() {
    let mut ctx = TestContext::new().await.unwrap();
    let admin = ctx.create_admin().await.unwrap();

    let (status, _, _) = ctx
        .post_form(&format!("/admin/users/{}/delete", admin.id), "", Some(&ctx.cookie_for(&admin)))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_device_limit_enforced() {
    let mut ctx = TestContext::new().await.unwrap();
    let user = ctx.create_user(&TestContext::email("limit")).await.unwrap();
    for i in 0..4 {
        ctx.create_device(&user, &format!("Spindle {}", i)).await.unwrap();
    }

    let (status, _, body) = ctx
        .post_form("/ispindels/new", "name=Fifth&description=", Some(&ctx.cookie_for(&user)))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("at most 4"));

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_deleting_device_ends_fermentation() {
    let mut ctx = TestContext::new().await.unwrap();
    let user = ctx.create_user(&TestContext::email("device")).await.unwrap();
    let device = ctx.create_device(&user, "Primary").await.unwrap();

    let fermentation = ctx.create_fermentation(&user, &device, "Lagering in the cellar").await.unwrap();

    let (status, _, body) = ctx
        .post_form(&format!("/ispindels/{}/delete", device.id), "", Some(&ctx.cookie_for(&user)))
        .await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["fermentations_ended"], 1);

    let ended = Fermentation::find_for_user(&ctx.db, fermentation.id, user.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!ended.is_active);
    assert!(ended.ended_at.is_some());
    assert_eq!(ended.ispindel_id, None);
    assert_eq!(
        ended.description,
        "Lagering in the cellar\n\nEnded - measuring device was deleted"
    );

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_cannot_delete_other_users_device() {
    let mut ctx = TestContext::new().await.unwrap();
    let owner = ctx.create_user(&TestContext::email("owner")).await.unwrap();
    let other = ctx.create_user(&TestContext::email("other")).await.unwrap();
    let device = ctx.create_device(&owner, "Mine").await.unwrap();

    let (status, _, _) = ctx
        .post_form(&format!("/ispindels/{}/delete", device.id), "", Some(&ctx.cookie_for(&other)))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_admin_device_deletion_notes_the_administrator() {
    let mut ctx = TestContext::new().await.unwrap();
    let user = ctx.create_user(&TestContext::email("admin-delete")).await.unwrap();
    let device = ctx.create_device(&user, "Secondary").await.unwrap();
    let fermentation = ctx.create_fermentation(&user, &device, "").await.unwrap();

    let ended = devices::delete_device(&ctx.db, device.id, DeletedBy::Admin).await.unwrap();
    assert_eq!(ended, 1);

    let fermentation = Fermentation::find_for_user(&ctx.db, fermentation.id, user.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        fermentation.description,
        "Ended - measuring device was deleted by the administrator"
    );

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_new_fermentation_form_lists_busy_devices() {
    let mut ctx = TestContext::new().await.unwrap();
    let user = ctx.create_user(&TestContext::email("busy")).await.unwrap();
    let busy = ctx.create_device(&user, "Busy Spindle").await.unwrap();
    ctx.create_device(&user, "Free Spindle").await.unwrap();
    ctx.create_fermentation(&user, &busy, "").await.unwrap();

    let (status, _, body) = ctx.get("/fermentations/new", Some(&ctx.cookie_for(&user))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Free Spindle"));
    assert!(body.contains("Busy Spindle (in use)"));

    ctx.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_change_password_mismatch_is_rejected() {
    let mut ctx = TestContext::new().await.unwrap();
    let user = ctx.create_user(&TestContext::email("settings")).await.unwrap();

    let form = format!(
        "current_password={}&new_password=brand-new-pass&confirm_password=other-new-pass",
        encode(TEST_PASSWORD)
    );
    let (status, _, body) = ctx
        .post_form("/settings/change-password", &form, Some(&ctx.cookie_for(&user)))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Passwords do not match"));

    ctx.cleanup().await.unwrap();
}
