//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify:
//! - Non-negativity: no sequence of operations drives a balance below zero
//! - Conservation: transfers never create or destroy money
//! - Atomicity: a rejected operation leaves every balance unchanged

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use wallet_ledger::{LockKey, MemoryStore, Pocket, WalletId, WalletLedger};

/// Strategy for generating amounts (positive, two decimal places)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1u64..50_000u64).prop_map(|cents| Decimal::new(cents as i64, 2))
}

fn pocket_strategy() -> impl Strategy<Value = Pocket> {
    prop_oneof![Just(Pocket::Online), Just(Pocket::Offline)]
}

#[derive(Debug, Clone)]
enum Op {
    Debit(usize, Pocket, Decimal),
    Credit(usize, Pocket, Decimal),
    Transfer(usize, Pocket, usize, Pocket, Decimal),
    Convert(usize, Decimal),
}

fn op_strategy(wallets: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..wallets, pocket_strategy(), amount_strategy()).prop_map(|(w, p, a)| Op::Debit(w, p, a)),
        (0..wallets, pocket_strategy(), amount_strategy()).prop_map(|(w, p, a)| Op::Credit(w, p, a)),
        (
            0..wallets,
            pocket_strategy(),
            0..wallets,
            pocket_strategy(),
            amount_strategy()
        )
            .prop_map(|(f, fp, t, tp, a)| Op::Transfer(f, fp, t, tp, a)),
        (0..wallets, amount_strategy()).prop_map(|(w, a)| Op::Convert(w, a)),
    ]
}

fn setup(count: usize) -> (WalletLedger, Vec<WalletId>) {
    let ledger = WalletLedger::new(Arc::new(MemoryStore::new()));
    let ids: Vec<WalletId> = (0..count).map(|_| WalletId::generate()).collect();
    for id in &ids {
        let id = *id;
        ledger
            .atomically([LockKey::Wallet(id)], |txn| txn.create_wallet(id))
            .unwrap();
    }
    (ledger, ids)
}

fn total(ledger: &WalletLedger, ids: &[WalletId]) -> Decimal {
    ids.iter()
        .map(|id| ledger.balance(*id).unwrap().total())
        .sum()
}

proptest! {
    #[test]
    fn prop_balances_never_negative(ops in prop::collection::vec(op_strategy(3), 1..60)) {
        let (ledger, ids) = setup(3);

        for op in ops {
            let _ = match op {
                Op::Debit(w, p, a) => ledger.debit(ids[w], p, a).map(|_| ()),
                Op::Credit(w, p, a) => ledger.credit(ids[w], p, a).map(|_| ()),
                Op::Transfer(f, fp, t, tp, a) => ledger.transfer(ids[f], fp, ids[t], tp, a),
                Op::Convert(w, a) => ledger.convert_to_offline(ids[w], a).map(|_| ()),
            };

            for id in &ids {
                let balance = ledger.balance(*id).unwrap();
                prop_assert!(balance.online >= Decimal::ZERO);
                prop_assert!(balance.offline >= Decimal::ZERO);
            }
        }
    }

    #[test]
    fn prop_transfers_conserve_money(
        seed in prop::collection::vec(amount_strategy(), 3),
        ops in prop::collection::vec(op_strategy(3), 1..60),
    ) {
        let (ledger, ids) = setup(3);
        for (id, amount) in ids.iter().zip(&seed) {
            ledger.credit(*id, Pocket::Online, *amount).unwrap();
        }
        let before = total(&ledger, &ids);

        for op in ops {
            let _ = match op {
                Op::Transfer(f, fp, t, tp, a) => ledger.transfer(ids[f], fp, ids[t], tp, a),
                Op::Convert(w, a) => ledger.convert_to_offline(ids[w], a).map(|_| ()),
                Op::Debit(..) | Op::Credit(..) => Ok(()),
            };
        }

        prop_assert_eq!(total(&ledger, &ids), before);
    }

    #[test]
    fn prop_rejected_debit_changes_nothing(
        funded in amount_strategy(),
        extra in amount_strategy(),
    ) {
        let (ledger, ids) = setup(2);
        ledger.credit(ids[0], Pocket::Online, funded).unwrap();

        let result = ledger.transfer(ids[0], Pocket::Online, ids[1], Pocket::Online, funded + extra);
        prop_assert!(result.is_err());
        prop_assert_eq!(ledger.balance(ids[0]).unwrap().online, funded);
        prop_assert_eq!(ledger.balance(ids[1]).unwrap().total(), Decimal::ZERO);
    }
}
