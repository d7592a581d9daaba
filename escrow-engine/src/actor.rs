//! Actor front for the deal engine
//!
//! The engine is a single writer. Concurrent callers reach it through a
//! clonable [`EscrowHandle`] that posts messages into a bounded mailbox; one
//! task owns the engine and applies them strictly in arrival order, so every
//! operation sees the state left by the previous one.
//!
//! ```text
//!   EscrowHandle (Clone) ──┐
//!   EscrowHandle (Clone) ──┼── mpsc::channel (bounded) ──► EscrowActor ──► DealEngine
//!   EscrowHandle (Clone) ──┘                                  │
//!                                                             └─ oneshot reply per call
//! ```

use escrow_ledger::{
    Amount, CommissionBalances, Deal, DealId, DealTerms, EventRecord, Identity, Rail,
};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::CommissionConfig;
use crate::engine::{CallContext, DealEngine, PartyDealIds};
use crate::rails::{NativeRail, TokenRail};
use crate::{Error, Result};

/// Message sent to the escrow actor
#[derive(Debug)]
pub enum EscrowMessage {
    /// List a deal; the method tag is decoded by the engine
    CreateDeal {
        ctx: CallContext,
        product_cost: Amount,
        method_tag: u8,
        response: oneshot::Sender<Result<DealId>>,
    },

    /// Fund a deal
    PayDeal {
        ctx: CallContext,
        deal_id: DealId,
        response: oneshot::Sender<Result<()>>,
    },

    /// Release escrow to the seller
    ReleasePayment {
        ctx: CallContext,
        deal_id: DealId,
        response: oneshot::Sender<Result<()>>,
    },

    /// Change commission wallet
    UpdateCommissionWallet {
        ctx: CallContext,
        wallet: Identity,
        response: oneshot::Sender<Result<()>>,
    },

    /// Change commission rate
    UpdateCommissionRate {
        ctx: CallContext,
        rate_bps: u16,
        response: oneshot::Sender<Result<()>>,
    },

    /// Hand over administration
    TransferOwnership {
        ctx: CallContext,
        new_owner: Identity,
        response: oneshot::Sender<Result<()>>,
    },

    /// Pay out one commission pool
    WithdrawCommission {
        ctx: CallContext,
        rail: Rail,
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Deal by id
    GetDeal {
        deal_id: DealId,
        response: oneshot::Sender<Result<Deal>>,
    },

    /// Payment method, cost and commission of a deal
    GetDealTerms {
        deal_id: DealId,
        response: oneshot::Sender<Result<DealTerms>>,
    },

    /// Deals a party created
    CreatedDeals {
        party: Identity,
        response: oneshot::Sender<Vec<Deal>>,
    },

    /// Deals a party funded
    PaidDeals {
        party: Identity,
        response: oneshot::Sender<Vec<Deal>>,
    },

    /// Ids a party created and funded
    DealIds {
        party: Identity,
        response: oneshot::Sender<PartyDealIds>,
    },

    /// Every deal
    AllDeals {
        response: oneshot::Sender<Vec<Deal>>,
    },

    /// Native value held by the engine
    NativeCustody {
        response: oneshot::Sender<Amount>,
    },

    /// Both commission pools
    CommissionBalances {
        response: oneshot::Sender<CommissionBalances>,
    },

    /// Engine identity and current commission settings
    Settings {
        response: oneshot::Sender<(Identity, CommissionConfig)>,
    },

    /// Published notifications from a sequence number
    Events {
        from: u64,
        response: oneshot::Sender<Vec<EventRecord>>,
    },

    /// Live notification feed
    Subscribe {
        response: oneshot::Sender<broadcast::Receiver<EventRecord>>,
    },

    /// Encoded durable state
    ExportState {
        response: oneshot::Sender<Result<Vec<u8>>>,
    },

    /// Stop the actor
    Shutdown,
}

/// Task owning the engine
#[derive(Debug)]
pub struct EscrowActor<N, T> {
    /// The single writer
    engine: DealEngine<N, T>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<EscrowMessage>,
}

impl<N: NativeRail, T: TokenRail> EscrowActor<N, T> {
    /// Create new actor
    pub fn new(engine: DealEngine<N, T>, mailbox: mpsc::Receiver<EscrowMessage>) -> Self {
        Self { engine, mailbox }
    }

    /// Run until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if let EscrowMessage::Shutdown = msg {
                tracing::info!("Escrow actor shutting down");
                break;
            }
            self.handle_message(msg);
        }
    }

    /// Apply one message; callers that gave up on the reply are ignored
    fn handle_message(&mut self, msg: EscrowMessage) {
        let engine = &mut self.engine;

        match msg {
            EscrowMessage::CreateDeal {
                ctx,
                product_cost,
                method_tag,
                response,
            } => {
                let _ = response.send(engine.create_deal_with_tag(&ctx, product_cost, method_tag));
            }

            EscrowMessage::PayDeal {
                ctx,
                deal_id,
                response,
            } => {
                let _ = response.send(engine.pay_deal(&ctx, deal_id));
            }

            EscrowMessage::ReleasePayment {
                ctx,
                deal_id,
                response,
            } => {
                let _ = response.send(engine.release_payment(&ctx, deal_id));
            }

            EscrowMessage::UpdateCommissionWallet {
                ctx,
                wallet,
                response,
            } => {
                let _ = response.send(engine.update_commission_wallet(&ctx, wallet));
            }

            EscrowMessage::UpdateCommissionRate {
                ctx,
                rate_bps,
                response,
            } => {
                let _ = response.send(engine.update_commission_rate(&ctx, rate_bps));
            }

            EscrowMessage::TransferOwnership {
                ctx,
                new_owner,
                response,
            } => {
                let _ = response.send(engine.transfer_ownership(&ctx, new_owner));
            }

            EscrowMessage::WithdrawCommission {
                ctx,
                rail,
                response,
            } => {
                let result = match rail {
                    Rail::Native => engine.withdraw_native_commission(&ctx),
                    Rail::External => engine.withdraw_external_commission(&ctx),
                };
                let _ = response.send(result);
            }

            EscrowMessage::GetDeal { deal_id, response } => {
                let _ = response.send(engine.get_deal(deal_id).cloned());
            }

            EscrowMessage::GetDealTerms { deal_id, response } => {
                let _ = response.send(engine.deal_terms(deal_id));
            }

            EscrowMessage::CreatedDeals { party, response } => {
                let _ = response.send(engine.my_created_deals(&party));
            }

            EscrowMessage::PaidDeals { party, response } => {
                let _ = response.send(engine.my_paid_deals(&party));
            }

            EscrowMessage::DealIds { party, response } => {
                let _ = response.send(engine.my_deal_ids(&party));
            }

            EscrowMessage::AllDeals { response } => {
                let _ = response.send(engine.all_deals().to_vec());
            }

            EscrowMessage::NativeCustody { response } => {
                let _ = response.send(engine.native_custody_balance());
            }

            EscrowMessage::CommissionBalances { response } => {
                let _ = response.send(engine.commission_balances());
            }

            EscrowMessage::Settings { response } => {
                let _ = response.send((
                    engine.identity().clone(),
                    engine.commission_config().clone(),
                ));
            }

            EscrowMessage::Events { from, response } => {
                let _ = response.send(engine.events_since(from).to_vec());
            }

            EscrowMessage::Subscribe { response } => {
                let _ = response.send(engine.subscribe());
            }

            EscrowMessage::ExportState { response } => {
                let _ = response.send(engine.export_state());
            }

            EscrowMessage::Shutdown => {
                // Handled in run loop
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct EscrowHandle {
    sender: mpsc::Sender<EscrowMessage>,
}

impl EscrowHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<EscrowMessage>) -> Self {
        Self { sender }
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> EscrowMessage,
    ) -> Result<R> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// List a deal; `method_tag` is 0 for native value, 1 for the token
    pub async fn create_deal(
        &self,
        ctx: CallContext,
        product_cost: Amount,
        method_tag: u8,
    ) -> Result<DealId> {
        self.request(|response| EscrowMessage::CreateDeal {
            ctx,
            product_cost,
            method_tag,
            response,
        })
        .await?
    }

    /// Fund a deal
    pub async fn pay_deal(&self, ctx: CallContext, deal_id: DealId) -> Result<()> {
        self.request(|response| EscrowMessage::PayDeal {
            ctx,
            deal_id,
            response,
        })
        .await?
    }

    /// Release escrow to the seller
    pub async fn release_payment(&self, ctx: CallContext, deal_id: DealId) -> Result<()> {
        self.request(|response| EscrowMessage::ReleasePayment {
            ctx,
            deal_id,
            response,
        })
        .await?
    }

    /// Change commission wallet
    pub async fn update_commission_wallet(&self, ctx: CallContext, wallet: Identity) -> Result<()> {
        self.request(|response| EscrowMessage::UpdateCommissionWallet {
            ctx,
            wallet,
            response,
        })
        .await?
    }

    /// Change commission rate
    pub async fn update_commission_rate(&self, ctx: CallContext, rate_bps: u16) -> Result<()> {
        self.request(|response| EscrowMessage::UpdateCommissionRate {
            ctx,
            rate_bps,
            response,
        })
        .await?
    }

    /// Hand over administration
    pub async fn transfer_ownership(&self, ctx: CallContext, new_owner: Identity) -> Result<()> {
        self.request(|response| EscrowMessage::TransferOwnership {
            ctx,
            new_owner,
            response,
        })
        .await?
    }

    /// Pay out the native commission pool
    pub async fn withdraw_native_commission(&self, ctx: CallContext) -> Result<Amount> {
        self.withdraw(ctx, Rail::Native).await
    }

    /// Pay out the token commission pool
    pub async fn withdraw_external_commission(&self, ctx: CallContext) -> Result<Amount> {
        self.withdraw(ctx, Rail::External).await
    }

    async fn withdraw(&self, ctx: CallContext, rail: Rail) -> Result<Amount> {
        self.request(|response| EscrowMessage::WithdrawCommission {
            ctx,
            rail,
            response,
        })
        .await?
    }

    /// Deal by id
    pub async fn get_deal(&self, deal_id: DealId) -> Result<Deal> {
        self.request(|response| EscrowMessage::GetDeal { deal_id, response })
            .await?
    }

    /// Payment method, cost and commission of a deal
    pub async fn deal_terms(&self, deal_id: DealId) -> Result<DealTerms> {
        self.request(|response| EscrowMessage::GetDealTerms { deal_id, response })
            .await?
    }

    /// Deals `party` created
    pub async fn my_created_deals(&self, party: Identity) -> Result<Vec<Deal>> {
        self.request(|response| EscrowMessage::CreatedDeals { party, response })
            .await
    }

    /// Deals `party` funded
    pub async fn my_paid_deals(&self, party: Identity) -> Result<Vec<Deal>> {
        self.request(|response| EscrowMessage::PaidDeals { party, response })
            .await
    }

    /// Ids `party` created and funded
    pub async fn my_deal_ids(&self, party: Identity) -> Result<PartyDealIds> {
        self.request(|response| EscrowMessage::DealIds { party, response })
            .await
    }

    /// Every deal
    pub async fn all_deals(&self) -> Result<Vec<Deal>> {
        self.request(|response| EscrowMessage::AllDeals { response })
            .await
    }

    /// Native value held by the engine
    pub async fn native_custody_balance(&self) -> Result<Amount> {
        self.request(|response| EscrowMessage::NativeCustody { response })
            .await
    }

    /// Both commission pools
    pub async fn commission_balances(&self) -> Result<CommissionBalances> {
        self.request(|response| EscrowMessage::CommissionBalances { response })
            .await
    }

    /// Engine identity and current owner, wallet and rate
    pub async fn settings(&self) -> Result<(Identity, CommissionConfig)> {
        self.request(|response| EscrowMessage::Settings { response })
            .await
    }

    /// Notifications with `sequence >= from`
    pub async fn events_since(&self, from: u64) -> Result<Vec<EventRecord>> {
        self.request(|response| EscrowMessage::Events { from, response })
            .await
    }

    /// Live notification feed
    pub async fn subscribe(&self) -> Result<broadcast::Receiver<EventRecord>> {
        self.request(|response| EscrowMessage::Subscribe { response })
            .await
    }

    /// Encoded durable state
    pub async fn export_state(&self) -> Result<Vec<u8>> {
        self.request(|response| EscrowMessage::ExportState { response })
            .await?
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(EscrowMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the escrow actor
pub fn spawn_escrow_actor<N, T>(engine: DealEngine<N, T>, mailbox_capacity: usize) -> EscrowHandle
where
    N: NativeRail + Send + 'static,
    T: TokenRail + Send + 'static,
{
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = EscrowActor::new(engine, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    EscrowHandle::new(tx)
}
