//! Error types for the ledger store

use crate::types::{DealId, Rail};
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// No deal stored under this id
    #[error("Deal not found: {0}")]
    DealNotFound(DealId),

    /// Crediting a balance would overflow
    #[error("Balance overflow on {rail} rail")]
    BalanceOverflow {
        /// Rail whose balance overflowed
        rail: Rail,
    },

    /// Debiting a balance would take it below zero
    #[error("Balance underflow on {rail} rail: have {available}, need {required}")]
    BalanceUnderflow {
        /// Rail whose balance underflowed
        rail: Rail,
        /// Current balance
        available: u128,
        /// Requested debit
        required: u128,
    },

    /// Structural storage error (out-of-order insert, transaction misuse)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}
