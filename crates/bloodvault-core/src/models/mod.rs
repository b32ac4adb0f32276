//! Domain models for the blood bank.

mod allocation;
mod donor;
mod inventory;
mod request;

pub use allocation::*;
pub use donor::*;
pub use inventory::*;
pub use request::*;

use thiserror::Error;

/// Validation and parsing errors for domain values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Unknown blood group: {0}")]
    UnknownBloodGroup(String),

    #[error("Unknown product type: {0}")]
    UnknownComponent(String),

    #[error("Unknown urgency: {0}")]
    UnknownUrgency(String),

    #[error("Unknown gender: {0}")]
    UnknownGender(String),

    #[error("Volume must be a positive number of millilitres, got {0}")]
    InvalidVolume(i64),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}
