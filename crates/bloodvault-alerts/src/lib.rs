//! Donor alerts for BloodVault.
//!
//! Picks donors from the registry (eligible donors for an emergency,
//! donors close to eligibility for a reminder), renders the message and
//! fans it out over a pluggable [`MessageSender`], one thread per recipient.
//! Delivery is best-effort and never touches inventory or requests.

pub mod fanout;
pub mod phone;
pub mod targeting;
pub mod templates;

pub use fanout::*;
pub use phone::*;
pub use targeting::*;
pub use templates::*;

use thiserror::Error;

/// Alert errors.
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Database error: {0}")]
    Database(#[from] bloodvault_core::db::DbError),

    #[error("Invalid phone number: {0:?}")]
    InvalidPhone(String),
}

pub type AlertResult<T> = Result<T, AlertError>;
