//! In-memory ledger store
//!
//! # Layout
//!
//! - `deals` - Dense deal table (index: deal id)
//! - `sellers` - Seller identity → created deal ids, in creation order
//! - `buyers` - Buyer identity → funded deal ids, in funding order
//! - `commission` - Accrued commission per rail
//! - `native_custody` - Native value held by the engine
//!
//! The store carries no business rules. Its only intelligence is index
//! maintenance and the undo journal backing `begin`/`commit`/`rollback`.

use crate::{
    error::{Error, Result},
    types::{Amount, CommissionBalances, Deal, DealId, Identity, Rail},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Inverse of one store mutation
#[derive(Debug)]
enum Undo {
    Allocate { previous: u64 },
    Insert,
    Update { previous: Box<Deal> },
    SellerIndex { identity: Identity },
    BuyerIndex { identity: Identity },
    Commission { rail: Rail, previous: Amount },
    Custody { previous: Amount },
}

/// Deal table, party indexes and balances
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LedgerStore {
    deals: Vec<Deal>,
    sellers: HashMap<Identity, Vec<DealId>>,
    buyers: HashMap<Identity, Vec<DealId>>,
    next_id: u64,
    commission: CommissionBalances,
    native_custody: Amount,

    /// Open transaction, if any
    #[serde(skip)]
    journal: Option<Vec<Undo>>,
}

impl LedgerStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    // Transactions

    /// Open a transaction; every mutation until `commit`/`rollback` is undoable
    pub fn begin(&mut self) -> Result<()> {
        if self.journal.is_some() {
            return Err(Error::Storage("Transaction already open".to_string()));
        }
        self.journal = Some(Vec::new());
        Ok(())
    }

    /// Keep all mutations of the open transaction
    pub fn commit(&mut self) {
        if let Some(journal) = self.journal.take() {
            tracing::debug!(mutations = journal.len(), "Store transaction committed");
        }
    }

    /// Undo all mutations of the open transaction, newest first
    pub fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };

        tracing::debug!(mutations = journal.len(), "Store transaction rolled back");

        for undo in journal.into_iter().rev() {
            match undo {
                Undo::Allocate { previous } => self.next_id = previous,
                Undo::Insert => {
                    self.deals.pop();
                }
                Undo::Update { previous } => {
                    if let Some(slot) = previous.id.index().and_then(|i| self.deals.get_mut(i)) {
                        *slot = *previous;
                    }
                }
                Undo::SellerIndex { identity } => Self::pop_index(&mut self.sellers, &identity),
                Undo::BuyerIndex { identity } => Self::pop_index(&mut self.buyers, &identity),
                Undo::Commission { rail, previous } => {
                    *self.commission.slot_mut(rail) = previous;
                }
                Undo::Custody { previous } => self.native_custody = previous,
            }
        }
    }

    /// True while a transaction is open
    pub fn in_transaction(&self) -> bool {
        self.journal.is_some()
    }

    fn record(&mut self, undo: Undo) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(undo);
        }
    }

    fn pop_index(index: &mut HashMap<Identity, Vec<DealId>>, identity: &Identity) {
        if let Some(ids) = index.get_mut(identity) {
            ids.pop();
            if ids.is_empty() {
                index.remove(identity);
            }
        }
    }

    // Deal operations

    /// Reserve the next unused deal id
    pub fn allocate(&mut self) -> DealId {
        let id = DealId(self.next_id);
        self.record(Undo::Allocate {
            previous: self.next_id,
        });
        self.next_id += 1;
        id
    }

    /// Store a deal under its allocated id
    ///
    /// Ids are dense, so the deal must fill the next slot of the table.
    pub fn insert(&mut self, deal: Deal) -> Result<()> {
        if deal.id.index() != Some(self.deals.len()) || deal.id.0 >= self.next_id {
            return Err(Error::Storage(format!(
                "Deal {} does not fill the next slot (table holds {}, next id {})",
                deal.id,
                self.deals.len(),
                self.next_id
            )));
        }

        tracing::debug!(deal_id = %deal.id, seller = %deal.seller, "Deal inserted");

        self.deals.push(deal);
        self.record(Undo::Insert);
        Ok(())
    }

    /// Get deal by ID
    pub fn get(&self, id: DealId) -> Result<&Deal> {
        id.index()
            .and_then(|index| self.deals.get(index))
            .ok_or(Error::DealNotFound(id))
    }

    /// Apply an in-place field change to a deal
    pub fn update<F>(&mut self, id: DealId, mutate: F) -> Result<&Deal>
    where
        F: FnOnce(&mut Deal),
    {
        let (index, previous) = id
            .index()
            .and_then(|index| self.deals.get(index).map(|deal| (index, deal.clone())))
            .ok_or(Error::DealNotFound(id))?;

        self.record(Undo::Update {
            previous: Box::new(previous),
        });

        mutate(&mut self.deals[index]);
        Ok(&self.deals[index])
    }

    /// Every deal ever created, in id order
    pub fn all_deals(&self) -> &[Deal] {
        &self.deals
    }

    /// Number of stored deals
    pub fn len(&self) -> usize {
        self.deals.len()
    }

    /// True before the first deal
    pub fn is_empty(&self) -> bool {
        self.deals.is_empty()
    }

    /// Id the next `allocate` will return
    pub fn next_id(&self) -> DealId {
        DealId(self.next_id)
    }

    // Index operations

    /// Record a deal created by `seller`
    pub fn append_to_seller_index(&mut self, seller: &Identity, id: DealId) {
        self.sellers.entry(seller.clone()).or_default().push(id);
        self.record(Undo::SellerIndex {
            identity: seller.clone(),
        });
    }

    /// Record a deal funded by `buyer`
    pub fn append_to_buyer_index(&mut self, buyer: &Identity, id: DealId) {
        self.buyers.entry(buyer.clone()).or_default().push(id);
        self.record(Undo::BuyerIndex {
            identity: buyer.clone(),
        });
    }

    /// Ids created by `seller`, in creation order
    pub fn list_by_seller(&self, seller: &Identity) -> &[DealId] {
        self.sellers.get(seller).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ids funded by `buyer`, in funding order
    pub fn list_by_buyer(&self, buyer: &Identity) -> &[DealId] {
        self.buyers.get(buyer).map(Vec::as_slice).unwrap_or(&[])
    }

    // Balance operations

    /// Commission accrued on one rail
    pub fn commission_balance(&self, rail: Rail) -> Amount {
        self.commission.get(rail)
    }

    /// Commission accrued on both rails
    pub fn commission_balances(&self) -> CommissionBalances {
        self.commission
    }

    /// Add to a commission pool, returning the new balance
    pub fn credit_commission(&mut self, rail: Rail, amount: Amount) -> Result<Amount> {
        let previous = self.commission.get(rail);
        let updated = previous
            .checked_add(amount)
            .ok_or(Error::BalanceOverflow { rail })?;

        *self.commission.slot_mut(rail) = updated;
        self.record(Undo::Commission { rail, previous });
        Ok(updated)
    }

    /// Empty a commission pool, returning what it held
    pub fn zero_commission(&mut self, rail: Rail) -> Amount {
        let previous = self.commission.get(rail);
        *self.commission.slot_mut(rail) = 0;
        self.record(Undo::Commission { rail, previous });
        previous
    }

    /// Native value held by the engine
    pub fn native_custody(&self) -> Amount {
        self.native_custody
    }

    /// Add tendered native value to custody
    pub fn credit_custody(&mut self, amount: Amount) -> Result<Amount> {
        let previous = self.native_custody;
        self.native_custody = previous
            .checked_add(amount)
            .ok_or(Error::BalanceOverflow { rail: Rail::Native })?;
        self.record(Undo::Custody { previous });
        Ok(self.native_custody)
    }

    /// Remove native value leaving custody
    pub fn debit_custody(&mut self, amount: Amount) -> Result<Amount> {
        let previous = self.native_custody;
        self.native_custody = previous.checked_sub(amount).ok_or(Error::BalanceUnderflow {
            rail: Rail::Native,
            available: previous,
            required: amount,
        })?;
        self.record(Undo::Custody { previous });
        Ok(self.native_custody)
    }

    // Snapshots

    /// Serialize the durable state
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.in_transaction() {
            return Err(Error::Storage(
                "Cannot snapshot with an open transaction".to_string(),
            ));
        }
        Ok(bincode::serialize(self)?)
    }

    /// Restore from `encode` output
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let store: LedgerStore = bincode::deserialize(bytes)?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentMethod;

    fn test_deal(store: &mut LedgerStore, seller: &str) -> DealId {
        let id = store.allocate();
        let deal = Deal::new(
            id,
            Identity::new(seller),
            1000,
            25,
            12,
            PaymentMethod::NativeValue,
        );
        store.insert(deal).unwrap();
        store.append_to_seller_index(&Identity::new(seller), id);
        id
    }

    #[test]
    fn test_allocate_is_dense() {
        let mut store = LedgerStore::new();
        assert_eq!(store.allocate(), DealId(0));
        assert_eq!(store.allocate(), DealId(1));
        assert_eq!(store.next_id(), DealId(2));
    }

    #[test]
    fn test_insert_and_get() {
        let mut store = LedgerStore::new();
        let id = test_deal(&mut store, "alice");

        let deal = store.get(id).unwrap();
        assert_eq!(deal.seller, Identity::new("alice"));
        assert_eq!(store.len(), 1);
        assert!(matches!(
            store.get(DealId(9)),
            Err(Error::DealNotFound(DealId(9)))
        ));
    }

    #[test]
    fn test_far_ids_not_found() {
        let mut store = LedgerStore::new();
        test_deal(&mut store, "alice");

        let far = DealId(u64::MAX);
        assert!(matches!(store.get(far), Err(Error::DealNotFound(_))));
        assert!(matches!(
            store.update(far, |deal| deal.is_paid = true),
            Err(Error::DealNotFound(_))
        ));
        assert!(!store.get(DealId(0)).unwrap().is_paid);
    }

    #[test]
    fn test_insert_out_of_order_rejected() {
        let mut store = LedgerStore::new();
        store.allocate();
        let id = store.allocate();
        let deal = Deal::new(id, Identity::new("alice"), 10, 0, 0, PaymentMethod::NativeValue);

        assert!(matches!(store.insert(deal), Err(Error::Storage(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_indexes_preserve_order() {
        let mut store = LedgerStore::new();
        let first = test_deal(&mut store, "alice");
        test_deal(&mut store, "bob");
        let third = test_deal(&mut store, "alice");

        assert_eq!(store.list_by_seller(&Identity::new("alice")), &[first, third]);
        assert!(store.list_by_seller(&Identity::new("carol")).is_empty());

        store.append_to_buyer_index(&Identity::new("carol"), third);
        store.append_to_buyer_index(&Identity::new("carol"), first);
        assert_eq!(store.list_by_buyer(&Identity::new("carol")), &[third, first]);
    }

    #[test]
    fn test_update_in_place() {
        let mut store = LedgerStore::new();
        let id = test_deal(&mut store, "alice");

        let deal = store
            .update(id, |deal| {
                deal.buyer = Some(Identity::new("bob"));
                deal.is_paid = true;
            })
            .unwrap();
        assert!(deal.is_paid);
        assert_eq!(store.get(id).unwrap().buyer, Some(Identity::new("bob")));
    }

    #[test]
    fn test_commission_credit_and_zero() {
        let mut store = LedgerStore::new();
        assert_eq!(store.credit_commission(Rail::Native, 12).unwrap(), 12);
        assert_eq!(store.credit_commission(Rail::Native, 12).unwrap(), 24);
        assert_eq!(store.credit_commission(Rail::External, 5).unwrap(), 5);

        assert_eq!(store.zero_commission(Rail::Native), 24);
        assert_eq!(
            store.commission_balances(),
            CommissionBalances {
                native: 0,
                external: 5
            }
        );
    }

    #[test]
    fn test_commission_overflow() {
        let mut store = LedgerStore::new();
        store.credit_commission(Rail::External, Amount::MAX).unwrap();
        assert!(matches!(
            store.credit_commission(Rail::External, 1),
            Err(Error::BalanceOverflow {
                rail: Rail::External
            })
        ));
        assert_eq!(store.commission_balance(Rail::External), Amount::MAX);
    }

    #[test]
    fn test_custody_underflow() {
        let mut store = LedgerStore::new();
        store.credit_custody(100).unwrap();
        assert_eq!(store.debit_custody(40).unwrap(), 60);
        assert!(matches!(
            store.debit_custody(61),
            Err(Error::BalanceUnderflow { available: 60, .. })
        ));
    }

    #[test]
    fn test_rollback_restores_everything() {
        let mut store = LedgerStore::new();
        let kept = test_deal(&mut store, "alice");
        store.credit_commission(Rail::Native, 12).unwrap();
        store.credit_custody(12).unwrap();

        store.begin().unwrap();
        let dropped = test_deal(&mut store, "alice");
        store.update(kept, |deal| deal.is_paid = true).unwrap();
        store.append_to_buyer_index(&Identity::new("bob"), kept);
        store.credit_commission(Rail::Native, 12).unwrap();
        store.zero_commission(Rail::Native);
        store.credit_custody(1012).unwrap();
        store.rollback();

        assert!(!store.in_transaction());
        assert_eq!(store.len(), 1);
        assert_eq!(store.next_id(), dropped);
        assert!(!store.get(kept).unwrap().is_paid);
        assert_eq!(store.list_by_seller(&Identity::new("alice")), &[kept]);
        assert!(store.list_by_buyer(&Identity::new("bob")).is_empty());
        assert_eq!(store.commission_balance(Rail::Native), 12);
        assert_eq!(store.native_custody(), 12);
    }

    #[test]
    fn test_commit_keeps_mutations() {
        let mut store = LedgerStore::new();
        store.begin().unwrap();
        let id = test_deal(&mut store, "alice");
        store.commit();
        store.rollback();

        assert!(store.get(id).is_ok());
    }

    #[test]
    fn test_nested_begin_rejected() {
        let mut store = LedgerStore::new();
        store.begin().unwrap();
        assert!(matches!(store.begin(), Err(Error::Storage(_))));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut store = LedgerStore::new();
        let id = test_deal(&mut store, "alice");
        store.credit_commission(Rail::External, 7).unwrap();

        let bytes = store.encode().unwrap();
        let restored = LedgerStore::decode(&bytes).unwrap();

        assert_eq!(restored.get(id).unwrap(), store.get(id).unwrap());
        assert_eq!(restored.list_by_seller(&Identity::new("alice")), &[id]);
        assert_eq!(restored.commission_balance(Rail::External), 7);
        assert_eq!(restored.next_id(), DealId(1));
    }

    #[test]
    fn test_snapshot_refused_mid_transaction() {
        let mut store = LedgerStore::new();
        store.begin().unwrap();
        assert!(store.encode().is_err());
    }
}
