/// Database layer
///
/// - `pool`: PostgreSQL connection pool with health checks
/// - `migrations`: embedded sqlx migrations
///
/// Row types and their queries live in [`crate::models`].

pub mod migrations;
pub mod pool;
