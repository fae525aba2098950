//! # iSpindel Brew Log web server library
//!
//! Server-rendered web app for home brewers: iSpindel telemetry ingestion,
//! device and fermentation management, charts, accounts and an admin panel.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `mailer`: Outgoing email
//! - `middleware`: Session extractors and security headers
//! - `oauth`: Google and piwo.org sign-in
//! - `routes`: Route handlers
//! - `views`: Askama page templates

pub mod app;
pub mod config;
pub mod error;
pub mod mailer;
pub mod middleware;
pub mod oauth;
pub mod routes;
pub mod views;
