//! # iSpindel Shared Library
//!
//! Domain types, persistence and business rules used by the iSpindel web
//! server and its integration tests.
//!
//! ## Module Organization
//!
//! - `auth`: password hashing, session tokens, API keys and cookies
//! - `db`: connection pool and migrations
//! - `models`: database rows and their queries
//! - `accounts`: registration, login, password reset, OAuth sign-in
//! - `devices`: device registry and the deletion cascade
//! - `telemetry`: parsing and storing device readings
//! - `brewing`: fermentation rules and chart helpers
//! - `styles`: BJCP beer style catalog

pub mod accounts;
pub mod auth;
pub mod brewing;
pub mod db;
pub mod devices;
pub mod models;
pub mod styles;
pub mod telemetry;

/// Current version of the iSpindel shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
