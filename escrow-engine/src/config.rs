//! Configuration for the deal engine

use escrow_ledger::Identity;
use serde::{Deserialize, Serialize};

use crate::commission::MAX_RATE_BPS;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Account the engine holds custody under (spender of token pulls)
    pub engine_identity: Identity,

    /// Commission configuration
    pub commission: CommissionConfig,

    /// Actor configuration
    pub actor: ActorConfig,

    /// Notification log configuration
    pub events: EventConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "escrow-engine".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            engine_identity: Identity::new("escrow-engine"),
            commission: CommissionConfig::default(),
            actor: ActorConfig::default(),
            events: EventConfig::default(),
        }
    }
}

/// Commission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionConfig {
    /// Identity allowed to change rate, wallet and ownership
    pub owner: Identity,

    /// Identity allowed to withdraw pooled commission
    pub wallet: Identity,

    /// Commission rate in basis points (0 - 10000)
    pub rate_bps: u16,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            owner: Identity::new("owner"),
            wallet: Identity::new("commission-wallet"),
            rate_bps: 250, // 2.5%
        }
    }
}

/// Actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Bounded mailbox size (backpressure)
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
        }
    }
}

/// Notification log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Records buffered per subscriber before it lags
    pub broadcast_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 1024,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(identity) = std::env::var("ESCROW_ENGINE_IDENTITY") {
            config.engine_identity = Identity::new(identity);
        }

        if let Ok(owner) = std::env::var("ESCROW_OWNER") {
            config.commission.owner = Identity::new(owner);
        }

        if let Ok(wallet) = std::env::var("ESCROW_COMMISSION_WALLET") {
            config.commission.wallet = Identity::new(wallet);
        }

        if let Ok(rate) = std::env::var("ESCROW_COMMISSION_RATE_BPS") {
            config.commission.rate_bps = rate.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid ESCROW_COMMISSION_RATE_BPS: {}", e))
            })?;
        }

        if let Ok(capacity) = std::env::var("ESCROW_MAILBOX_CAPACITY") {
            config.actor.mailbox_capacity = capacity.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid ESCROW_MAILBOX_CAPACITY: {}", e))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check values the engine relies on
    pub fn validate(&self) -> crate::Result<()> {
        if self.commission.rate_bps > MAX_RATE_BPS {
            return Err(crate::Error::Config(format!(
                "Commission rate {} bps exceeds {}",
                self.commission.rate_bps, MAX_RATE_BPS
            )));
        }

        if self.engine_identity.is_unset()
            || self.commission.owner.is_unset()
            || self.commission.wallet.is_unset()
        {
            return Err(crate::Error::Config(
                "Engine identity, owner and commission wallet must be set".to_string(),
            ));
        }

        if self.actor.mailbox_capacity == 0 || self.events.broadcast_capacity == 0 {
            return Err(crate::Error::Config(
                "Channel capacities must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
