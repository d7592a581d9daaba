//! Property-based tests for store invariants
//!
//! - Rollback: any mutation sequence inside a transaction is fully undone
//! - Dense ids: committed deals occupy ids 0..n with no gaps
//! - Snapshot: a decoded snapshot answers every query like the original

use escrow_ledger::{Amount, Deal, DealId, Identity, LedgerStore, PaymentMethod, Rail};
use proptest::prelude::*;

const PARTIES: [&str; 3] = ["alice", "bob", "carol"];

/// One store mutation
#[derive(Debug, Clone)]
enum Mutation {
    Create { seller: usize, cost: Amount },
    Fund { deal: usize, buyer: usize },
    Release { deal: usize },
    Credit { rail: Rail, amount: Amount },
    Zero { rail: Rail },
}

fn rail_strategy() -> impl Strategy<Value = Rail> {
    prop_oneof![Just(Rail::Native), Just(Rail::External)]
}

fn mutation_strategy() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        (0..PARTIES.len(), 1u64..1_000_000)
            .prop_map(|(seller, cost)| Mutation::Create { seller, cost: Amount::from(cost) }),
        (0usize..10, 0..PARTIES.len()).prop_map(|(deal, buyer)| Mutation::Fund { deal, buyer }),
        (0usize..10).prop_map(|deal| Mutation::Release { deal }),
        (rail_strategy(), 0u64..10_000)
            .prop_map(|(rail, amount)| Mutation::Credit { rail, amount: Amount::from(amount) }),
        rail_strategy().prop_map(|rail| Mutation::Zero { rail }),
    ]
}

fn apply(store: &mut LedgerStore, mutation: &Mutation) {
    match *mutation {
        Mutation::Create { seller, cost } => {
            let seller = Identity::new(PARTIES[seller]);
            let id = store.allocate();
            let deal = Deal::new(id, seller.clone(), cost, cost / 40, cost / 80, PaymentMethod::NativeValue);
            store.insert(deal).unwrap();
            store.append_to_seller_index(&seller, id);
            store.credit_custody(cost / 80).unwrap();
        }
        Mutation::Fund { deal, buyer } => {
            let id = DealId(deal as u64);
            if matches!(store.get(id), Ok(d) if !d.is_paid) {
                let buyer = Identity::new(PARTIES[buyer]);
                let who = buyer.clone();
                store
                    .update(id, |d| {
                        d.buyer = Some(who);
                        d.is_paid = true;
                    })
                    .unwrap();
                store.append_to_buyer_index(&buyer, id);
            }
        }
        Mutation::Release { deal } => {
            let id = DealId(deal as u64);
            if matches!(store.get(id), Ok(d) if d.is_paid && !d.is_released) {
                store.update(id, |d| d.is_released = true).unwrap();
            }
        }
        Mutation::Credit { rail, amount } => {
            store.credit_commission(rail, amount).unwrap();
        }
        Mutation::Zero { rail } => {
            store.zero_commission(rail);
        }
    }
}

/// Everything a reader can observe
fn observe(store: &LedgerStore) -> (Vec<Deal>, Amount, Amount, Amount, Vec<Vec<DealId>>, DealId) {
    let indexes = PARTIES
        .iter()
        .flat_map(|name| {
            let who = Identity::new(*name);
            [store.list_by_seller(&who).to_vec(), store.list_by_buyer(&who).to_vec()]
        })
        .collect();
    (
        store.all_deals().to_vec(),
        store.commission_balance(Rail::Native),
        store.commission_balance(Rail::External),
        store.native_custody(),
        indexes,
        store.next_id(),
    )
}

proptest! {
    /// Property: rollback restores the exact pre-transaction state
    #[test]
    fn prop_rollback_restores_state(
        committed in prop::collection::vec(mutation_strategy(), 0..20),
        aborted in prop::collection::vec(mutation_strategy(), 1..20),
    ) {
        let mut store = LedgerStore::new();
        store.begin().unwrap();
        for mutation in &committed {
            apply(&mut store, mutation);
        }
        store.commit();

        let before = observe(&store);

        store.begin().unwrap();
        for mutation in &aborted {
            apply(&mut store, mutation);
        }
        store.rollback();

        prop_assert!(!store.in_transaction());
        prop_assert_eq!(observe(&store), before);
    }

    /// Property: ids are dense and every deal sits at its own index
    #[test]
    fn prop_ids_dense(mutations in prop::collection::vec(mutation_strategy(), 0..40)) {
        let mut store = LedgerStore::new();
        for mutation in &mutations {
            apply(&mut store, mutation);
        }

        for (index, deal) in store.all_deals().iter().enumerate() {
            prop_assert_eq!(deal.id, DealId(index as u64));
            prop_assert!(!deal.is_released || deal.is_paid);
        }
        prop_assert_eq!(store.next_id(), DealId(store.len() as u64));
    }

    /// Property: a decoded snapshot is indistinguishable from its source
    #[test]
    fn prop_snapshot_preserves_queries(mutations in prop::collection::vec(mutation_strategy(), 0..30)) {
        let mut store = LedgerStore::new();
        for mutation in &mutations {
            apply(&mut store, mutation);
        }

        let restored = LedgerStore::decode(&store.encode().unwrap()).unwrap();
        prop_assert_eq!(observe(&restored), observe(&store));
    }
}
