//! Escrow simulator binary
//!
//! Runs one native-value deal and one token deal end to end against the
//! in-memory rails, withdraws the collected commission and prints the
//! notification log as a JSON array.
//!
//! Usage: `escrow-sim [config.toml]` (falls back to `ESCROW_*` env vars)

use anyhow::Context;
use escrow_engine::{
    spawn_escrow_actor, CallContext, CommissionQuote, Config, DealEngine, MemoryNativeRail,
    MemoryTokenRail,
};
use escrow_ledger::{Identity, PaymentMethod};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => Config::from_env().context("loading config from environment")?,
    };

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        "Starting escrow simulator"
    );

    let native = MemoryNativeRail::new();
    let token = MemoryTokenRail::new(config.engine_identity.clone());
    let engine = DealEngine::new(&config, native.clone(), token.clone())?;
    let handle = spawn_escrow_actor(engine, config.actor.mailbox_capacity);

    let seller = Identity::new("seller");
    let buyer = Identity::new("buyer");
    let engine_id = config.engine_identity.clone();
    let product_cost = 1_000_000;

    let quote = CommissionQuote::quote(product_cost, config.commission.rate_bps)?;
    let total_payment = quote.total_payment()?;

    // Native value deal
    let native_deal = handle
        .create_deal(
            CallContext::new(seller.clone()).with_value(quote.individual_fee),
            product_cost,
            PaymentMethod::NativeValue.tag(),
        )
        .await?;
    handle
        .pay_deal(
            CallContext::new(buyer.clone()).with_value(total_payment),
            native_deal,
        )
        .await?;
    handle
        .release_payment(CallContext::new(buyer.clone()), native_deal)
        .await?;

    // Token deal
    token.mint(&seller, quote.individual_fee);
    token.approve(&seller, &engine_id, quote.individual_fee);
    token.mint(&buyer, total_payment);
    token.approve(&buyer, &engine_id, total_payment);

    let token_deal = handle
        .create_deal(
            CallContext::new(seller.clone()),
            product_cost,
            PaymentMethod::ExternalToken.tag(),
        )
        .await?;
    handle
        .pay_deal(CallContext::new(buyer.clone()), token_deal)
        .await?;
    handle
        .release_payment(CallContext::new(buyer.clone()), token_deal)
        .await?;

    // Commission payout; an empty pool cannot be withdrawn
    let wallet = CallContext::new(config.commission.wallet.clone());
    let (native_commission, token_commission) = if quote.individual_fee > 0 {
        (
            handle.withdraw_native_commission(wallet.clone()).await?,
            handle.withdraw_external_commission(wallet).await?,
        )
    } else {
        (0, 0)
    };

    tracing::info!(
        native = %native_commission,
        external = %token_commission,
        seller_native = %native.balance_of(&seller),
        seller_tokens = %token.balance_of(&seller),
        "Simulation complete"
    );

    let records = handle.events_since(0).await?;
    println!("{}", serde_json::to_string_pretty(&records)?);

    handle.shutdown().await?;
    Ok(())
}
