//! Error types for the deal engine

use escrow_ledger::{Amount, DealId, Identity, Rail};
use thiserror::Error;

use crate::rails::RailError;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
///
/// Every failure aborts the whole operation with full rollback; amounts are
/// carried as fields, not formatted text.
#[derive(Error, Debug)]
pub enum Error {
    /// Product cost of zero
    #[error("Invalid amount: product cost must be positive")]
    InvalidAmount,

    /// Payment method tag outside the defined set
    #[error("Invalid payment method tag: {0}")]
    InvalidPaymentMethod(u8),

    /// Tendered native value differs from what the operation requires
    #[error("Payment mismatch: expected {expected}, tendered {tendered}")]
    PaymentMismatch {
        /// Required value
        expected: Amount,
        /// Value sent with the call
        tendered: Amount,
    },

    /// Token allowance granted to the engine is too small
    #[error("Insufficient allowance: need {required}, approved {available}")]
    InsufficientAllowance {
        /// Amount the engine must pull
        required: Amount,
        /// Allowance currently approved
        available: Amount,
    },

    /// Native value sent with a token-rail payment
    #[error("Unexpected native value: {0}")]
    UnexpectedNativeValue(Amount),

    /// No deal under this id
    #[error("Deal not found: {0}")]
    DealNotFound(DealId),

    /// Deal already funded
    #[error("Deal {0} already paid")]
    AlreadyPaid(DealId),

    /// Deal already released
    #[error("Deal {0} already released")]
    AlreadyReleased(DealId),

    /// Deal not funded yet
    #[error("Deal {0} not paid")]
    NotPaid(DealId),

    /// Caller lacks the role the operation requires
    #[error("Unauthorized caller: {caller}")]
    Unauthorized {
        /// Rejected caller
        caller: Identity,
    },

    /// Outward or pull transfer failed on a rail
    #[error("Transfer of {amount} failed on {rail} rail: {source}")]
    TransferFailed {
        /// Rail the transfer ran on
        rail: Rail,
        /// Amount that failed to move
        amount: Amount,
        /// Rail-reported cause
        #[source]
        source: RailError,
    },

    /// Commission pool is empty
    #[error("No commission balance on {0} rail")]
    NoBalance(Rail),

    /// Zero/unset identity where a real one is required
    #[error("Invalid identity")]
    InvalidIdentity,

    /// Commission rate above 100%
    #[error("Commission rate {rate_bps} bps exceeds 10000")]
    RateTooHigh {
        /// Rejected rate
        rate_bps: u16,
    },

    /// Checked arithmetic failed
    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    /// Ledger store error
    #[error("Ledger error: {0}")]
    Ledger(escrow_ledger::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<escrow_ledger::Error> for Error {
    fn from(err: escrow_ledger::Error) -> Self {
        match err {
            escrow_ledger::Error::DealNotFound(id) => Error::DealNotFound(id),
            escrow_ledger::Error::BalanceOverflow { .. } => Error::ArithmeticOverflow,
            other => Error::Ledger(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_errors_map_to_engine_kinds() {
        let err: Error = escrow_ledger::Error::DealNotFound(DealId(3)).into();
        assert!(matches!(err, Error::DealNotFound(DealId(3))));

        let err: Error = escrow_ledger::Error::BalanceOverflow { rail: Rail::Native }.into();
        assert!(matches!(err, Error::ArithmeticOverflow));

        let err: Error = escrow_ledger::Error::Storage("boom".to_string()).into();
        assert!(matches!(err, Error::Ledger(_)));
    }

    #[test]
    fn test_payment_mismatch_message() {
        let err = Error::PaymentMismatch {
            expected: 1012,
            tendered: 1000,
        };
        assert_eq!(err.to_string(), "Payment mismatch: expected 1012, tendered 1000");
    }
}
