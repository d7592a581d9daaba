//! Escrow Engine
//!
//! Two-party escrow for product sales. A seller lists a deal, a buyer funds
//! it, and the escrowed product cost is released to the seller once the
//! buyer confirms. Both sides pay half of a percentage commission that
//! accrues in per-rail pools withdrawable by the commission wallet.
//!
//! # Architecture
//!
//! - **Single Writer**: [`DealEngine`] is the only mutator of the ledger;
//!   concurrent callers go through [`EscrowHandle`]
//! - **All-or-Nothing**: Every operation commits fully or leaves no trace,
//!   including transfers rejected by a rail
//! - **Dual Rail**: Native value (push) and an external token (pull with
//!   allowance, push to pay out)
//!
//! # Lifecycle
//!
//! ```text
//! Created ──pay_deal──► Paid ──release_payment──► Released
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod commission;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod rails;

// Re-exports
pub use actor::{spawn_escrow_actor, EscrowHandle};
pub use commission::CommissionQuote;
pub use config::Config;
pub use engine::{CallContext, DealEngine, PartyDealIds};
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use rails::{MemoryNativeRail, MemoryTokenRail, NativeRail, RailError, TokenRail};
