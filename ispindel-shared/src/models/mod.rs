/// Database models
///
/// Flat relational rows with their queries:
///
/// - `user`: accounts, login lockout state, activation and reset tokens
/// - `ispindel`: registered devices (soft-deleted)
/// - `measurement`: telemetry readings
/// - `fermentation`: brewing batches (soft-deleted)

pub mod fermentation;
pub mod ispindel;
pub mod measurement;
pub mod user;

pub use fermentation::{CreateFermentation, Fermentation, FermentationWithOwner};
pub use ispindel::{CreateIspindel, Ispindel, IspindelWithOwner};
pub use measurement::{Measurement, NewMeasurement};
pub use user::{CreateExternalUser, CreateUser, ExternalId, User};
