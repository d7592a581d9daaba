//! Escrow Ledger
//!
//! Structured storage for escrow deals: the deal table, per-party deal
//! indexes, commission pools and native custody, plus the ordered
//! notification log consumed by off-engine observers.
//!
//! # Architecture
//!
//! - **Arena + Index**: Deals live in one dense table keyed by id; seller and
//!   buyer indexes map identity → ordered ids and are append-only
//! - **Single Writer**: The deal engine is the only mutator
//! - **Journaled Transactions**: Every mutation inside a transaction is
//!   undoable, giving callers all-or-nothing commits
//!
//! # Invariants
//!
//! - Deal ids are dense, start at 0 and are never reused
//! - Index entries are never removed outside a rollback
//! - Pool and custody balances never go below zero or wrap

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod error;
pub mod events;
pub mod store;
pub mod types;

// Re-exports
pub use error::{Error, Result};
pub use events::{EscrowEvent, EventLog, EventRecord};
pub use store::LedgerStore;
pub use types::{
    Amount, CommissionBalances, Deal, DealId, DealTerms, Identity, PaymentMethod, Rail,
};
