//! Commission math
//!
//! `commission = product_cost * rate_bps / 10000`, truncating, and each side
//! pays `commission / 2`, truncating. When the commission is odd the lost
//! unit is collected from nobody: rate 250 on a cost of 1000 gives a
//! commission of 25 but only 12 + 12 = 24 is ever collected.

use escrow_ledger::Amount;

use crate::{Error, Result};

/// Basis points in 100%
pub const BASIS_POINTS: Amount = 10_000;

/// Highest accepted commission rate (100%)
pub const MAX_RATE_BPS: u16 = 10_000;

/// Commission figures for one deal, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionQuote {
    /// Price excluding commission
    pub product_cost: Amount,
    /// Total commission
    pub commission_amount: Amount,
    /// Half the commission, paid by each side
    pub individual_fee: Amount,
}

impl CommissionQuote {
    /// Quote a deal at `rate_bps`
    pub fn quote(product_cost: Amount, rate_bps: u16) -> Result<Self> {
        let commission_amount = product_cost
            .checked_mul(Amount::from(rate_bps))
            .ok_or(Error::ArithmeticOverflow)?
            / BASIS_POINTS;

        Ok(Self {
            product_cost,
            commission_amount,
            individual_fee: commission_amount / 2,
        })
    }

    /// What the buyer tenders: product cost plus their commission half
    pub fn total_payment(&self) -> Result<Amount> {
        total_payment(self.product_cost, self.individual_fee)
    }
}

/// Product cost plus one commission half, checked
pub fn total_payment(product_cost: Amount, individual_fee: Amount) -> Result<Amount> {
    product_cost
        .checked_add(individual_fee)
        .ok_or(Error::ArithmeticOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation_loses_one_unit() {
        let quote = CommissionQuote::quote(1000, 250).unwrap();
        assert_eq!(quote.commission_amount, 25);
        assert_eq!(quote.individual_fee, 12);
        assert_eq!(quote.total_payment().unwrap(), 1012);
        assert_eq!(quote.individual_fee * 2, 24);
    }

    #[test]
    fn test_zero_rate() {
        let quote = CommissionQuote::quote(5000, 0).unwrap();
        assert_eq!(quote.commission_amount, 0);
        assert_eq!(quote.individual_fee, 0);
        assert_eq!(quote.total_payment().unwrap(), 5000);
    }

    #[test]
    fn test_full_rate() {
        let quote = CommissionQuote::quote(1000, MAX_RATE_BPS).unwrap();
        assert_eq!(quote.commission_amount, 1000);
        assert_eq!(quote.individual_fee, 500);
    }

    #[test]
    fn test_small_cost_rounds_to_zero() {
        let quote = CommissionQuote::quote(39, 250).unwrap();
        assert_eq!(quote.commission_amount, 0);
        assert_eq!(quote.individual_fee, 0);
    }

    #[test]
    fn test_overflow_fails() {
        assert!(matches!(
            CommissionQuote::quote(Amount::MAX, 2),
            Err(Error::ArithmeticOverflow)
        ));
        assert!(matches!(
            total_payment(Amount::MAX, 1),
            Err(Error::ArithmeticOverflow)
        ));
    }
}
