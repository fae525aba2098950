/// Middleware modules for the web server
///
/// - `auth`: session cookie resolution and user extractors
/// - `security`: security response headers

pub mod auth;
pub mod security;
