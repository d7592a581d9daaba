//! Metrics collection for observability
//!
//! Prometheus metrics for the deal engine, registered in a private registry.
//!
//! # Metrics
//!
//! - `escrow_deals_created_total` - Deals created
//! - `escrow_deals_paid_total` - Deals funded
//! - `escrow_payments_released_total` - Deals released to the seller
//! - `escrow_commission_collected_total{rail}` - Commission credited to pools
//! - `escrow_commission_withdrawn_total{rail}` - Commission paid out
//! - `escrow_rollbacks_total` - Operations aborted and rolled back

use escrow_ledger::{Amount, Rail};
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::fmt;
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Deals created
    pub deals_created: IntCounter,

    /// Deals funded
    pub deals_paid: IntCounter,

    /// Deals released
    pub payments_released: IntCounter,

    /// Commission credited, per rail
    pub commission_collected: IntCounterVec,

    /// Commission withdrawn, per rail
    pub commission_withdrawn: IntCounterVec,

    /// Rolled back operations
    pub rollbacks: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let deals_created = IntCounter::new("escrow_deals_created_total", "Deals created")?;
        registry.register(Box::new(deals_created.clone()))?;

        let deals_paid = IntCounter::new("escrow_deals_paid_total", "Deals funded by a buyer")?;
        registry.register(Box::new(deals_paid.clone()))?;

        let payments_released = IntCounter::new(
            "escrow_payments_released_total",
            "Deals released to the seller",
        )?;
        registry.register(Box::new(payments_released.clone()))?;

        let commission_collected = IntCounterVec::new(
            Opts::new(
                "escrow_commission_collected_total",
                "Commission credited to the pools",
            ),
            &["rail"],
        )?;
        registry.register(Box::new(commission_collected.clone()))?;

        let commission_withdrawn = IntCounterVec::new(
            Opts::new(
                "escrow_commission_withdrawn_total",
                "Commission paid out to the commission wallet",
            ),
            &["rail"],
        )?;
        registry.register(Box::new(commission_withdrawn.clone()))?;

        let rollbacks = IntCounter::new(
            "escrow_rollbacks_total",
            "Operations aborted and rolled back",
        )?;
        registry.register(Box::new(rollbacks.clone()))?;

        Ok(Self {
            deals_created,
            deals_paid,
            payments_released,
            commission_collected,
            commission_withdrawn,
            rollbacks,
            registry,
        })
    }

    /// Record deal creation and the seller's commission half
    pub fn record_deal_created(&self, rail: Rail, fee: Amount) {
        self.deals_created.inc();
        self.commission_collected
            .with_label_values(&[rail.label()])
            .inc_by(clamp(fee));
    }

    /// Record funding and the buyer's commission half
    pub fn record_deal_paid(&self, rail: Rail, fee: Amount) {
        self.deals_paid.inc();
        self.commission_collected
            .with_label_values(&[rail.label()])
            .inc_by(clamp(fee));
    }

    /// Record release
    pub fn record_payment_released(&self) {
        self.payments_released.inc();
    }

    /// Record commission withdrawal
    pub fn record_withdrawal(&self, rail: Rail, amount: Amount) {
        self.commission_withdrawn
            .with_label_values(&[rail.label()])
            .inc_by(clamp(amount));
    }

    /// Record rollback
    pub fn record_rollback(&self) {
        self.rollbacks.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("deals_created", &self.deals_created.get())
            .field("deals_paid", &self.deals_paid.get())
            .field("payments_released", &self.payments_released.get())
            .field("rollbacks", &self.rollbacks.get())
            .finish_non_exhaustive()
    }
}

// Counters are u64; amounts beyond that saturate
fn clamp(amount: Amount) -> u64 {
    u64::try_from(amount).unwrap_or(u64::MAX)
}
