use super::types::{BloodType, TimeStamp};
use chrono::Utc;

/// Error taxonomy for every core operation. Service methods return
/// `anyhow::Result`, so callers match on this with `downcast_ref`.
#[derive(thiserror::Error, Debug)]
pub enum BankError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("donor is not eligible until {next_eligible}")]
    IneligibleDonor { next_eligible: TimeStamp<Utc> },
    #[error("invalid state transition: {0}")]
    InvalidState(String),
    #[error("insufficient {blood_type} stock: requested {requested}, available {available}")]
    InsufficientStock {
        blood_type: BloodType,
        requested: u32,
        available: u32,
    },
}
