//! Deal engine
//!
//! Drives every deal through create → pay → release, computes commission,
//! moves funds on the deal's rail and is the only writer of the ledger store.
//!
//! # Atomicity
//!
//! Each public mutating operation runs inside `atomically`: a store
//! transaction is opened, the operation runs, and the transaction commits on
//! success or rolls back on any error. Notifications are staged and only
//! published after commit, so an aborted call leaves no trace.
//!
//! Any state change that authorizes an outward transfer (`is_released`,
//! pool zeroing) is written before the transfer is attempted. All checked
//! arithmetic of create/pay happens before the pull, so nothing can fail
//! once funds have moved in.
//!
//! # Example
//!
//! ```
//! use escrow_engine::{CallContext, Config, DealEngine, MemoryNativeRail, MemoryTokenRail};
//! use escrow_ledger::{Identity, PaymentMethod};
//!
//! # fn main() -> escrow_engine::Result<()> {
//! let config = Config::default();
//! let token = MemoryTokenRail::new(config.engine_identity.clone());
//! let mut engine = DealEngine::new(&config, MemoryNativeRail::new(), token)?;
//!
//! let seller = CallContext::new(Identity::new("seller")).with_value(12);
//! let id = engine.create_deal(&seller, 1000, PaymentMethod::NativeValue)?;
//!
//! let buyer = CallContext::new(Identity::new("buyer")).with_value(1012);
//! engine.pay_deal(&buyer, id)?;
//! engine.release_payment(&CallContext::new(Identity::new("buyer")), id)?;
//!
//! assert!(engine.get_deal(id)?.is_released);
//! # Ok(())
//! # }
//! ```

use escrow_ledger::{
    Amount, CommissionBalances, Deal, DealId, DealTerms, EscrowEvent, EventLog, EventRecord,
    Identity, LedgerStore, PaymentMethod, Rail,
};
use tokio::sync::broadcast;

use crate::{
    commission::{self, CommissionQuote, MAX_RATE_BPS},
    config::{CommissionConfig, Config},
    metrics::Metrics,
    rails::{NativeRail, TokenRail},
    Error, Result,
};

/// Authenticated caller and the native value tendered with the call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Caller identity, supplied by the environment
    pub caller: Identity,

    /// Native value sent with the call
    pub value: Amount,
}

impl CallContext {
    /// Call without tendered value
    pub fn new(caller: Identity) -> Self {
        Self { caller, value: 0 }
    }

    /// Attach tendered native value
    pub fn with_value(mut self, value: Amount) -> Self {
        self.value = value;
        self
    }
}

/// Deal ids a party created and funded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartyDealIds {
    /// Deals the party created, in creation order
    pub created: Vec<DealId>,

    /// Deals the party funded, in funding order
    pub paid: Vec<DealId>,
}

/// Escrow deal engine
#[derive(Debug)]
pub struct DealEngine<N, T> {
    /// Account custody is held under
    identity: Identity,

    /// Owner, commission wallet and rate
    commission: CommissionConfig,

    /// Deals, indexes and balances
    store: LedgerStore,

    /// Published notifications
    events: EventLog,

    /// Notifications of the running operation
    staged: Vec<EscrowEvent>,

    /// Native value rail
    native: N,

    /// External token rail
    token: T,

    /// Metrics
    metrics: Metrics,
}

impl<N: NativeRail, T: TokenRail> DealEngine<N, T> {
    /// Create engine with an empty ledger
    pub fn new(config: &Config, native: N, token: T) -> Result<Self> {
        config.validate()?;

        tracing::info!(
            engine = %config.engine_identity,
            owner = %config.commission.owner,
            wallet = %config.commission.wallet,
            rate_bps = config.commission.rate_bps,
            "Deal engine initialized"
        );

        Ok(Self {
            identity: config.engine_identity.clone(),
            commission: config.commission.clone(),
            store: LedgerStore::new(),
            events: EventLog::new(config.events.broadcast_capacity),
            staged: Vec::new(),
            native,
            token,
            metrics: Metrics::new()?,
        })
    }

    /// Run `operation` all-or-nothing
    fn atomically<R, F>(&mut self, name: &'static str, operation: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        self.store.begin()?;

        match operation(self) {
            Ok(value) => {
                self.store.commit();
                for event in self.staged.drain(..) {
                    self.events.publish(event);
                }
                Ok(value)
            }
            Err(err) => {
                self.store.rollback();
                self.staged.clear();
                self.metrics.record_rollback();

                if matches!(err, Error::TransferFailed { .. }) {
                    tracing::warn!(operation = name, error = %err, "Transfer failed, rolled back");
                } else {
                    tracing::debug!(operation = name, error = %err, "Operation rejected");
                }
                Err(err)
            }
        }
    }

    // Lifecycle

    /// List a deal; the caller pays their commission half up front
    pub fn create_deal(
        &mut self,
        ctx: &CallContext,
        product_cost: Amount,
        payment_method: PaymentMethod,
    ) -> Result<DealId> {
        self.atomically("create_deal", |engine| {
            engine.open_deal(ctx, product_cost, payment_method)
        })
    }

    /// `create_deal` with a raw method tag
    pub fn create_deal_with_tag(
        &mut self,
        ctx: &CallContext,
        product_cost: Amount,
        method_tag: u8,
    ) -> Result<DealId> {
        self.atomically("create_deal", |engine| {
            if product_cost == 0 {
                return Err(Error::InvalidAmount);
            }
            let method =
                PaymentMethod::try_from(method_tag).map_err(Error::InvalidPaymentMethod)?;
            engine.open_deal(ctx, product_cost, method)
        })
    }

    fn open_deal(
        &mut self,
        ctx: &CallContext,
        product_cost: Amount,
        payment_method: PaymentMethod,
    ) -> Result<DealId> {
        if product_cost == 0 {
            return Err(Error::InvalidAmount);
        }

        let quote = CommissionQuote::quote(product_cost, self.commission.rate_bps)?;
        let fee = quote.individual_fee;

        match payment_method {
            PaymentMethod::NativeValue => {
                if ctx.value != fee {
                    return Err(Error::PaymentMismatch {
                        expected: fee,
                        tendered: ctx.value,
                    });
                }
                self.store.credit_custody(ctx.value)?;
                self.store.credit_commission(Rail::Native, fee)?;
            }
            PaymentMethod::ExternalToken => {
                // Native value sent alongside is kept but belongs to no deal or pool
                self.store.credit_custody(ctx.value)?;
                self.store.credit_commission(Rail::External, fee)?;
                self.pull_tokens(&ctx.caller, fee)?;
            }
        }

        let id = self.store.allocate();
        self.store.insert(Deal::new(
            id,
            ctx.caller.clone(),
            product_cost,
            quote.commission_amount,
            fee,
            payment_method,
        ))?;
        self.store.append_to_seller_index(&ctx.caller, id);

        self.staged.push(EscrowEvent::DealCreated {
            deal_id: id,
            seller: ctx.caller.clone(),
            product_cost,
            commission_amount: quote.commission_amount,
            individual_commission_amount: fee,
            payment_method,
        });
        self.metrics.record_deal_created(payment_method.rail(), fee);

        tracing::info!(
            deal_id = %id,
            seller = %ctx.caller,
            product_cost = %product_cost,
            commission = %quote.commission_amount,
            fee = %fee,
            method = %payment_method,
            "Deal created"
        );

        Ok(id)
    }

    /// Fund a deal: product cost plus the buyer's commission half
    pub fn pay_deal(&mut self, ctx: &CallContext, id: DealId) -> Result<()> {
        self.atomically("pay_deal", |engine| {
            let deal = engine.store.get(id)?.clone();
            if deal.seller.is_unset() {
                return Err(Error::DealNotFound(id));
            }
            if deal.is_paid {
                return Err(Error::AlreadyPaid(id));
            }

            let fee = deal.individual_commission_amount;
            let total_payment = commission::total_payment(deal.product_cost, fee)?;

            match deal.payment_method {
                PaymentMethod::NativeValue => {
                    if ctx.value != total_payment {
                        return Err(Error::PaymentMismatch {
                            expected: total_payment,
                            tendered: ctx.value,
                        });
                    }
                    engine.store.credit_custody(ctx.value)?;
                    engine.store.credit_commission(Rail::Native, fee)?;
                }
                PaymentMethod::ExternalToken => {
                    if ctx.value != 0 {
                        return Err(Error::UnexpectedNativeValue(ctx.value));
                    }
                    engine.store.credit_commission(Rail::External, fee)?;
                    engine.pull_tokens(&ctx.caller, total_payment)?;
                }
            }

            let buyer = ctx.caller.clone();
            engine.store.update(id, |deal| {
                deal.buyer = Some(buyer);
                deal.is_paid = true;
            })?;
            engine.store.append_to_buyer_index(&ctx.caller, id);

            engine.staged.push(EscrowEvent::DealPaid {
                deal_id: id,
                buyer: ctx.caller.clone(),
                total_payment,
                payment_method: deal.payment_method,
            });
            engine.metrics.record_deal_paid(deal.payment_method.rail(), fee);

            tracing::info!(
                deal_id = %id,
                buyer = %ctx.caller,
                total_payment = %total_payment,
                method = %deal.payment_method,
                "Deal paid"
            );

            Ok(())
        })
    }

    /// Buyer confirms; escrowed product cost goes to the seller
    pub fn release_payment(&mut self, ctx: &CallContext, id: DealId) -> Result<()> {
        self.atomically("release_payment", |engine| {
            // An unknown id reads as a never-funded deal
            let deal = match engine.store.get(id) {
                Ok(deal) => deal.clone(),
                Err(escrow_ledger::Error::DealNotFound(_)) => return Err(Error::NotPaid(id)),
                Err(err) => return Err(err.into()),
            };

            if !deal.is_paid {
                return Err(Error::NotPaid(id));
            }
            if deal.is_released {
                return Err(Error::AlreadyReleased(id));
            }
            if deal.buyer.as_ref() != Some(&ctx.caller) {
                return Err(Error::Unauthorized {
                    caller: ctx.caller.clone(),
                });
            }

            // Committed before the transfer; undone by rollback if it fails
            engine.store.update(id, |deal| deal.is_released = true)?;

            let amount = deal.product_cost;
            match deal.payment_method {
                PaymentMethod::NativeValue => {
                    engine.store.debit_custody(amount)?;
                    engine
                        .native
                        .send(&deal.seller, amount)
                        .map_err(|source| Error::TransferFailed {
                            rail: Rail::Native,
                            amount,
                            source,
                        })?;
                }
                PaymentMethod::ExternalToken => {
                    engine
                        .token
                        .push(&deal.seller, amount)
                        .map_err(|source| Error::TransferFailed {
                            rail: Rail::External,
                            amount,
                            source,
                        })?;
                }
            }

            engine.staged.push(EscrowEvent::PaymentReleased {
                deal_id: id,
                seller: deal.seller.clone(),
                buyer: ctx.caller.clone(),
                amount,
                payment_method: deal.payment_method,
            });
            engine.metrics.record_payment_released();

            tracing::info!(
                deal_id = %id,
                seller = %deal.seller,
                buyer = %ctx.caller,
                amount = %amount,
                "Payment released"
            );

            Ok(())
        })
    }

    fn pull_tokens(&mut self, from: &Identity, amount: Amount) -> Result<()> {
        let available = self.token.allowance(from, &self.identity);
        if available < amount {
            return Err(Error::InsufficientAllowance {
                required: amount,
                available,
            });
        }

        self.token
            .pull(from, &self.identity, amount)
            .map_err(|source| Error::TransferFailed {
                rail: Rail::External,
                amount,
                source,
            })
    }

    // Queries

    /// Deal by id
    pub fn get_deal(&self, id: DealId) -> Result<&Deal> {
        Ok(self.store.get(id)?)
    }

    /// Deals the caller created
    pub fn my_created_deals(&self, caller: &Identity) -> Vec<Deal> {
        self.collect(self.store.list_by_seller(caller))
    }

    /// Deals the caller funded
    pub fn my_paid_deals(&self, caller: &Identity) -> Vec<Deal> {
        self.collect(self.store.list_by_buyer(caller))
    }

    /// Ids of deals the caller created and funded
    pub fn my_deal_ids(&self, caller: &Identity) -> PartyDealIds {
        PartyDealIds {
            created: self.store.list_by_seller(caller).to_vec(),
            paid: self.store.list_by_buyer(caller).to_vec(),
        }
    }

    /// Every deal ever created, in id order
    pub fn all_deals(&self) -> &[Deal] {
        self.store.all_deals()
    }

    /// Payment method, cost and commission of a deal
    pub fn deal_terms(&self, id: DealId) -> Result<DealTerms> {
        Ok(self.store.get(id)?.terms())
    }

    /// Native value currently held by the engine
    pub fn native_custody_balance(&self) -> Amount {
        self.store.native_custody()
    }

    /// Commission accrued on both rails
    pub fn commission_balances(&self) -> CommissionBalances {
        self.store.commission_balances()
    }

    fn collect(&self, ids: &[DealId]) -> Vec<Deal> {
        ids.iter()
            .filter_map(|id| self.store.get(*id).ok())
            .cloned()
            .collect()
    }

    // Administration

    /// Change the identity entitled to withdraw commission (owner only)
    pub fn update_commission_wallet(&mut self, ctx: &CallContext, wallet: Identity) -> Result<()> {
        self.atomically("update_commission_wallet", |engine| {
            engine.ensure_owner(&ctx.caller)?;
            if wallet.is_unset() {
                return Err(Error::InvalidIdentity);
            }

            let previous = std::mem::replace(&mut engine.commission.wallet, wallet.clone());
            tracing::info!(previous = %previous, current = %wallet, "Commission wallet updated");

            engine.staged.push(EscrowEvent::CommissionWalletUpdated {
                previous,
                current: wallet,
            });
            Ok(())
        })
    }

    /// Change the commission rate for future deals (owner only)
    pub fn update_commission_rate(&mut self, ctx: &CallContext, rate_bps: u16) -> Result<()> {
        self.atomically("update_commission_rate", |engine| {
            engine.ensure_owner(&ctx.caller)?;
            if rate_bps > MAX_RATE_BPS {
                return Err(Error::RateTooHigh { rate_bps });
            }

            let previous_bps = std::mem::replace(&mut engine.commission.rate_bps, rate_bps);
            tracing::info!(previous_bps, current_bps = rate_bps, "Commission rate updated");

            engine.staged.push(EscrowEvent::CommissionRateUpdated {
                previous_bps,
                current_bps: rate_bps,
            });
            Ok(())
        })
    }

    /// Hand administration to another identity (owner only)
    pub fn transfer_ownership(&mut self, ctx: &CallContext, new_owner: Identity) -> Result<()> {
        self.atomically("transfer_ownership", |engine| {
            engine.ensure_owner(&ctx.caller)?;
            if new_owner.is_unset() {
                return Err(Error::InvalidIdentity);
            }

            let previous = std::mem::replace(&mut engine.commission.owner, new_owner.clone());
            tracing::info!(previous = %previous, current = %new_owner, "Ownership transferred");

            engine.staged.push(EscrowEvent::OwnershipTransferred {
                previous,
                current: new_owner,
            });
            Ok(())
        })
    }

    /// Pay out the native commission pool (commission wallet only)
    pub fn withdraw_native_commission(&mut self, ctx: &CallContext) -> Result<Amount> {
        self.atomically("withdraw_native_commission", |engine| {
            let amount = engine.drain_pool(&ctx.caller, Rail::Native)?;
            engine.store.debit_custody(amount)?;
            engine
                .native
                .send(&ctx.caller, amount)
                .map_err(|source| Error::TransferFailed {
                    rail: Rail::Native,
                    amount,
                    source,
                })?;

            engine.finish_withdrawal(&ctx.caller, Rail::Native, amount);
            Ok(amount)
        })
    }

    /// Pay out the token commission pool (commission wallet only)
    pub fn withdraw_external_commission(&mut self, ctx: &CallContext) -> Result<Amount> {
        self.atomically("withdraw_external_commission", |engine| {
            let amount = engine.drain_pool(&ctx.caller, Rail::External)?;
            engine
                .token
                .push(&ctx.caller, amount)
                .map_err(|source| Error::TransferFailed {
                    rail: Rail::External,
                    amount,
                    source,
                })?;

            engine.finish_withdrawal(&ctx.caller, Rail::External, amount);
            Ok(amount)
        })
    }

    /// Zero a pool ahead of paying it out
    fn drain_pool(&mut self, caller: &Identity, rail: Rail) -> Result<Amount> {
        if *caller != self.commission.wallet {
            return Err(Error::Unauthorized {
                caller: caller.clone(),
            });
        }
        if self.store.commission_balance(rail) == 0 {
            return Err(Error::NoBalance(rail));
        }
        Ok(self.store.zero_commission(rail))
    }

    fn finish_withdrawal(&mut self, wallet: &Identity, rail: Rail, amount: Amount) {
        self.staged.push(EscrowEvent::CommissionWithdrawn {
            rail,
            wallet: wallet.clone(),
            amount,
        });
        self.metrics.record_withdrawal(rail, amount);

        tracing::info!(rail = %rail, wallet = %wallet, amount = %amount, "Commission withdrawn");
    }

    fn ensure_owner(&self, caller: &Identity) -> Result<()> {
        if *caller != self.commission.owner {
            return Err(Error::Unauthorized {
                caller: caller.clone(),
            });
        }
        Ok(())
    }

    // Accessors

    /// Account custody is held under
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Administrative owner
    pub fn owner(&self) -> &Identity {
        &self.commission.owner
    }

    /// Identity entitled to withdraw commission
    pub fn commission_wallet(&self) -> &Identity {
        &self.commission.wallet
    }

    /// Rate applied to new deals (basis points)
    pub fn commission_rate_bps(&self) -> u16 {
        self.commission.rate_bps
    }

    /// Owner, wallet and rate as currently set
    pub fn commission_config(&self) -> &CommissionConfig {
        &self.commission
    }

    /// Published notifications
    pub fn events(&self) -> &[EventRecord] {
        self.events.records()
    }

    /// Notifications with `sequence >= from`
    pub fn events_since(&self, from: u64) -> &[EventRecord] {
        self.events.since(from)
    }

    /// Receive notifications as they are published
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events.subscribe()
    }

    /// Encoded durable ledger state
    pub fn export_state(&self) -> Result<Vec<u8>> {
        Ok(self.store.encode()?)
    }

    /// Native rail handle
    pub fn native_rail(&self) -> &N {
        &self.native
    }

    /// Token rail handle
    pub fn token_rail(&self) -> &T {
        &self.token
    }

    /// Metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
