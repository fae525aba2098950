/// Authentication primitives
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and the minimum length rule
/// - [`jwt`]: 24 hour session tokens
/// - [`tokens`]: device API keys and emailed activation/reset tokens
/// - [`cookie`]: `Set-Cookie` construction and `Cookie` header parsing
///
/// # Example
///
/// ```no_run
/// use ispindel_shared::auth::{cookie, jwt, password};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = password::hash_password("user_password")?;
/// assert!(password::verify_password("user_password", &hash)?);
///
/// let token = jwt::create_token(&jwt::Claims::new(Uuid::new_v4()), "secret-key")?;
/// let set_cookie = cookie::session_cookie(
///     cookie::SESSION_COOKIE,
///     &token,
///     cookie::SESSION_MAX_AGE_SECS,
///     false,
/// );
/// # Ok(())
/// # }
/// ```

pub mod cookie;
pub mod jwt;
pub mod password;
pub mod tokens;
