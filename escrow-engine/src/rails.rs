//! Payment rails
//!
//! The engine moves funds on two rails it does not own:
//!
//! - **Native**: value arrives bundled with the call (`CallContext::value`)
//!   and leaves by synchronous push transfer.
//! - **External token**: pull-based. The payer approves an allowance for the
//!   engine, the engine pulls, and pays out by push transfer from its own
//!   balance.
//!
//! The `Memory*` rails are in-process reference implementations. They are
//! cheap clonable handles over shared state, so a test or the simulator can
//! keep one handle while the engine owns another.

use escrow_ledger::{Amount, Identity};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Rail-reported transfer failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RailError {
    /// Recipient refused the transfer
    #[error("recipient {to} rejected the transfer")]
    Rejected {
        /// Refusing recipient
        to: Identity,
    },

    /// Payer balance too small
    #[error("insufficient funds: have {available}, need {required}")]
    InsufficientFunds {
        /// Payer balance
        available: Amount,
        /// Transfer amount
        required: Amount,
    },

    /// Approved allowance too small
    #[error("insufficient allowance: approved {available}, need {required}")]
    InsufficientAllowance {
        /// Approved allowance
        available: Amount,
        /// Transfer amount
        required: Amount,
    },
}

/// Native value push transfers out of engine custody
pub trait NativeRail {
    /// Send `amount` to `to`
    fn send(&mut self, to: &Identity, amount: Amount) -> Result<(), RailError>;
}

/// External token rail
pub trait TokenRail {
    /// Amount `owner` has approved `spender` to pull
    fn allowance(&self, owner: &Identity, spender: &Identity) -> Amount;

    /// Pull `amount` from `from` into `to`, consuming allowance
    fn pull(&mut self, from: &Identity, to: &Identity, amount: Amount) -> Result<(), RailError>;

    /// Push `amount` from the engine's own balance to `to`
    fn push(&mut self, to: &Identity, amount: Amount) -> Result<(), RailError>;
}

#[derive(Debug, Default)]
struct NativeState {
    balances: HashMap<Identity, Amount>,
    rejecting: HashSet<Identity>,
}

/// In-memory native rail recording what each recipient received
#[derive(Debug, Clone, Default)]
pub struct MemoryNativeRail {
    state: Arc<RwLock<NativeState>>,
}

impl MemoryNativeRail {
    /// Create empty rail
    pub fn new() -> Self {
        Self::default()
    }

    /// Total native value received by `account`
    pub fn balance_of(&self, account: &Identity) -> Amount {
        self.state.read().balances.get(account).copied().unwrap_or(0)
    }

    /// Make every transfer to `account` fail
    pub fn reject(&self, account: &Identity) {
        self.state.write().rejecting.insert(account.clone());
    }

    /// Undo `reject`
    pub fn accept(&self, account: &Identity) {
        self.state.write().rejecting.remove(account);
    }
}

impl NativeRail for MemoryNativeRail {
    fn send(&mut self, to: &Identity, amount: Amount) -> Result<(), RailError> {
        let mut state = self.state.write();
        if state.rejecting.contains(to) {
            return Err(RailError::Rejected { to: to.clone() });
        }

        let balance = state.balances.entry(to.clone()).or_default();
        *balance = balance.saturating_add(amount);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TokenState {
    balances: HashMap<Identity, Amount>,
    allowances: HashMap<(Identity, Identity), Amount>,
    rejecting: HashSet<Identity>,
}

impl TokenState {
    fn balance(&self, account: &Identity) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn transfer(&mut self, from: &Identity, to: &Identity, amount: Amount) -> Result<(), RailError> {
        if self.rejecting.contains(to) {
            return Err(RailError::Rejected { to: to.clone() });
        }

        let available = self.balance(from);
        let remaining = available
            .checked_sub(amount)
            .ok_or(RailError::InsufficientFunds {
                available,
                required: amount,
            })?;

        self.balances.insert(from.clone(), remaining);
        let credited = self.balance(to).saturating_add(amount);
        self.balances.insert(to.clone(), credited);
        Ok(())
    }
}

/// In-memory token ledger with allowances
#[derive(Debug, Clone)]
pub struct MemoryTokenRail {
    custodian: Identity,
    state: Arc<RwLock<TokenState>>,
}

impl MemoryTokenRail {
    /// Create token whose pushes are paid from `custodian`'s balance
    pub fn new(custodian: Identity) -> Self {
        Self {
            custodian,
            state: Arc::new(RwLock::new(TokenState::default())),
        }
    }

    /// Account pushes are paid from
    pub fn custodian(&self) -> &Identity {
        &self.custodian
    }

    /// Create tokens out of thin air
    pub fn mint(&self, to: &Identity, amount: Amount) {
        let mut state = self.state.write();
        let credited = state.balance(to).saturating_add(amount);
        state.balances.insert(to.clone(), credited);
    }

    /// Set the allowance `owner` grants `spender`
    pub fn approve(&self, owner: &Identity, spender: &Identity, amount: Amount) {
        self.state
            .write()
            .allowances
            .insert((owner.clone(), spender.clone()), amount);
    }

    /// Token balance of `account`
    pub fn balance_of(&self, account: &Identity) -> Amount {
        self.state.read().balance(account)
    }

    /// Make every transfer to `account` fail
    pub fn reject(&self, account: &Identity) {
        self.state.write().rejecting.insert(account.clone());
    }

    /// Undo `reject`
    pub fn accept(&self, account: &Identity) {
        self.state.write().rejecting.remove(account);
    }
}

impl TokenRail for MemoryTokenRail {
    fn allowance(&self, owner: &Identity, spender: &Identity) -> Amount {
        self.state
            .read()
            .allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0)
    }

    fn pull(&mut self, from: &Identity, to: &Identity, amount: Amount) -> Result<(), RailError> {
        let mut state = self.state.write();
        let key = (from.clone(), self.custodian.clone());
        let approved = state.allowances.get(&key).copied().unwrap_or(0);
        if approved < amount {
            return Err(RailError::InsufficientAllowance {
                available: approved,
                required: amount,
            });
        }

        state.transfer(from, to, amount)?;
        state.allowances.insert(key, approved - amount);
        Ok(())
    }

    fn push(&mut self, to: &Identity, amount: Amount) -> Result<(), RailError> {
        let custodian = self.custodian.clone();
        self.state.write().transfer(&custodian, to, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Identity {
        Identity::new(name)
    }

    #[test]
    fn test_native_send_and_reject() {
        let mut rail = MemoryNativeRail::new();
        rail.send(&id("alice"), 100).unwrap();
        assert_eq!(rail.balance_of(&id("alice")), 100);

        rail.reject(&id("alice"));
        assert_eq!(
            rail.send(&id("alice"), 1),
            Err(RailError::Rejected { to: id("alice") })
        );
        assert_eq!(rail.balance_of(&id("alice")), 100);

        rail.accept(&id("alice"));
        assert!(rail.send(&id("alice"), 1).is_ok());
    }

    #[test]
    fn test_clones_share_state() {
        let rail = MemoryNativeRail::new();
        let mut engine_side = rail.clone();
        engine_side.send(&id("bob"), 7).unwrap();
        assert_eq!(rail.balance_of(&id("bob")), 7);
    }

    #[test]
    fn test_token_pull_consumes_allowance() {
        let mut token = MemoryTokenRail::new(id("engine"));
        token.mint(&id("buyer"), 1000);
        token.approve(&id("buyer"), &id("engine"), 600);

        token.pull(&id("buyer"), &id("engine"), 400).unwrap();
        assert_eq!(token.allowance(&id("buyer"), &id("engine")), 200);
        assert_eq!(token.balance_of(&id("buyer")), 600);
        assert_eq!(token.balance_of(&id("engine")), 400);

        assert_eq!(
            token.pull(&id("buyer"), &id("engine"), 300),
            Err(RailError::InsufficientAllowance {
                available: 200,
                required: 300
            })
        );
    }

    #[test]
    fn test_token_pull_needs_balance() {
        let mut token = MemoryTokenRail::new(id("engine"));
        token.mint(&id("buyer"), 10);
        token.approve(&id("buyer"), &id("engine"), 100);

        assert_eq!(
            token.pull(&id("buyer"), &id("engine"), 50),
            Err(RailError::InsufficientFunds {
                available: 10,
                required: 50
            })
        );
        assert_eq!(token.allowance(&id("buyer"), &id("engine")), 100);
    }

    #[test]
    fn test_token_push_from_custodian() {
        let mut token = MemoryTokenRail::new(id("engine"));
        token.mint(&id("engine"), 500);

        token.push(&id("seller"), 300).unwrap();
        assert_eq!(token.balance_of(&id("seller")), 300);
        assert_eq!(token.balance_of(&id("engine")), 200);

        token.reject(&id("seller"));
        assert!(token.push(&id("seller"), 100).is_err());
        assert_eq!(token.balance_of(&id("engine")), 200);
    }
}
