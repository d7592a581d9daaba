//! Core types for the escrow ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (unsigned integer smallest units, no floats)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Amount in the smallest unit of either rail
pub type Amount = u128;

/// Party identity, supplied by the caller-identity source
///
/// The empty identity is the zero/unset sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Create new identity
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The zero/unset identity
    pub fn unset() -> Self {
        Self(String::new())
    }

    /// True for the zero/unset identity
    pub fn is_unset(&self) -> bool {
        self.0.is_empty()
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unset() {
            write!(f, "<unset>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Deal identifier, dense and assigned from 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealId(pub u64);

impl DealId {
    /// Position of the deal in the dense deal table
    ///
    /// `None` when the id does not fit the platform's address space.
    pub fn index(self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }
}

impl fmt::Display for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a deal is paid for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PaymentMethod {
    /// Value tendered natively with the call
    NativeValue = 0,
    /// Pull-based transfer on the external token rail
    ExternalToken = 1,
}

impl PaymentMethod {
    /// Rail the method settles on
    pub fn rail(self) -> Rail {
        match self {
            PaymentMethod::NativeValue => Rail::Native,
            PaymentMethod::ExternalToken => Rail::External,
        }
    }

    /// Wire tag
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PaymentMethod {
    /// The unrecognized tag
    type Error = u8;

    fn try_from(tag: u8) -> std::result::Result<Self, u8> {
        match tag {
            0 => Ok(PaymentMethod::NativeValue),
            1 => Ok(PaymentMethod::ExternalToken),
            other => Err(other),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::NativeValue => write!(f, "native"),
            PaymentMethod::ExternalToken => write!(f, "token"),
        }
    }
}

/// Fund movement mechanism, one commission pool each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rail {
    /// Native value transfers
    Native,
    /// External token pull/push transfers
    External,
}

impl Rail {
    /// Label used in logs and metrics
    pub fn label(self) -> &'static str {
        match self {
            Rail::Native => "native",
            Rail::External => "external",
        }
    }
}

impl fmt::Display for Rail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One escrow transaction between a seller and (eventually) a buyer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    /// Deal ID
    pub id: DealId,

    /// Identity that created the deal
    pub seller: Identity,

    /// Price excluding commission
    pub product_cost: Amount,

    /// Total commission at the rate in force at creation
    pub commission_amount: Amount,

    /// Half the commission, paid once by each side
    pub individual_commission_amount: Amount,

    /// Set exactly once, when the deal is funded
    pub buyer: Option<Identity>,

    /// Funded by a buyer
    pub is_paid: bool,

    /// Escrowed funds released to the seller
    pub is_released: bool,

    /// Rail the deal settles on
    pub payment_method: PaymentMethod,
}

impl Deal {
    /// Freshly created, unfunded deal
    pub fn new(
        id: DealId,
        seller: Identity,
        product_cost: Amount,
        commission_amount: Amount,
        individual_commission_amount: Amount,
        payment_method: PaymentMethod,
    ) -> Self {
        Self {
            id,
            seller,
            product_cost,
            commission_amount,
            individual_commission_amount,
            buyer: None,
            is_paid: false,
            is_released: false,
            payment_method,
        }
    }

    /// Payment method, cost and commission
    pub fn terms(&self) -> DealTerms {
        DealTerms {
            payment_method: self.payment_method,
            product_cost: self.product_cost,
            commission_amount: self.commission_amount,
        }
    }

    /// True once funded and released
    pub fn is_settled(&self) -> bool {
        self.is_paid && self.is_released
    }
}

/// Payment-info tuple of a deal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealTerms {
    /// Rail the deal settles on
    pub payment_method: PaymentMethod,
    /// Price excluding commission
    pub product_cost: Amount,
    /// Total commission
    pub commission_amount: Amount,
}

/// Accrued commission per rail
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionBalances {
    /// Native rail pool
    pub native: Amount,
    /// External token rail pool
    pub external: Amount,
}

impl CommissionBalances {
    /// Balance of one rail
    pub fn get(&self, rail: Rail) -> Amount {
        match rail {
            Rail::Native => self.native,
            Rail::External => self.external,
        }
    }

    pub(crate) fn slot_mut(&mut self, rail: Rail) -> &mut Amount {
        match rail {
            Rail::Native => &mut self.native,
            Rail::External => &mut self.external,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_unset() {
        assert!(Identity::unset().is_unset());
        assert!(Identity::default().is_unset());
        assert!(!Identity::new("seller-1").is_unset());
        assert_eq!(Identity::unset().to_string(), "<unset>");
    }

    #[test]
    fn test_payment_method_from_tag() {
        assert_eq!(PaymentMethod::try_from(0), Ok(PaymentMethod::NativeValue));
        assert_eq!(PaymentMethod::try_from(1), Ok(PaymentMethod::ExternalToken));
        assert_eq!(PaymentMethod::try_from(2), Err(2));
        assert_eq!(PaymentMethod::ExternalToken.tag(), 1);
    }

    #[test]
    fn test_payment_method_rail() {
        assert_eq!(PaymentMethod::NativeValue.rail(), Rail::Native);
        assert_eq!(PaymentMethod::ExternalToken.rail(), Rail::External);
    }

    #[test]
    fn test_deal_id_index() {
        assert_eq!(DealId(7).index(), Some(7));
        assert_eq!(DealId(u64::from(u32::MAX)).index(), usize::try_from(u32::MAX).ok());
    }

    #[test]
    fn test_new_deal_is_unfunded() {
        let deal = Deal::new(
            DealId(0),
            Identity::new("seller"),
            1000,
            25,
            12,
            PaymentMethod::NativeValue,
        );

        assert!(deal.buyer.is_none());
        assert!(!deal.is_paid);
        assert!(!deal.is_released);
        assert!(!deal.is_settled());
        assert_eq!(deal.terms().commission_amount, 25);
    }
}
