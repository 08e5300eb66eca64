//! Balance netting and debt reduction
//!
//! A settlement pass runs in two steps:
//!
//! 1. [`SettlementEngine::compute_balances`] credits each payer with the full
//!    amount and debits every beneficiary an equal share.
//! 2. [`SettlementEngine::reduce`] pairs debtors with creditors and emits one
//!    transfer per pairing until one side runs out.
//!
//! Balances within [`EPSILON`] of zero count as settled. Parties are paired
//! in ascending user-id order, not by balance magnitude, so the transfer set
//! is deterministic but not necessarily the smallest possible one. It never
//! exceeds `debtors + creditors - 1` transfers.

use crate::core::{EPSILON, UserId};
use crate::ledger::debt::Debt;
use crate::ledger::expense::Expense;
use std::collections::BTreeMap;

/// Signed per-user totals: positive means the user is owed money.
pub type Balances = BTreeMap<UserId, f64>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transfer {
    pub debtor: UserId,
    pub creditor: UserId,
    pub amount: f64,
}

/// Debts created by one pass and the number of expenses it consumed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettlementOutcome {
    pub debts: Vec<Debt>,
    pub processed: usize,
}

impl SettlementOutcome {
    pub fn is_empty(&self) -> bool {
        self.processed == 0
    }
}

pub struct SettlementEngine;

impl SettlementEngine {
    /// Net balances over `expenses`. Expenses without beneficiaries add nothing.
    pub fn compute_balances<'a, I>(expenses: I) -> Balances
    where
        I: IntoIterator<Item = &'a Expense>,
    {
        let mut balances = Balances::new();
        for expense in expenses {
            let Some(share) = expense.share() else {
                continue;
            };
            *balances.entry(expense.payer()).or_insert(0.0) += expense.amount();
            for beneficiary in expense.beneficiaries() {
                *balances.entry(*beneficiary).or_insert(0.0) -= share;
            }
        }
        balances
    }

    /// Pair debtors with creditors until either list is exhausted.
    pub fn reduce(balances: &Balances) -> Vec<Transfer> {
        // Both lists hold positive magnitudes.
        let mut debtors: Vec<(UserId, f64)> = balances
            .iter()
            .filter(|(_, balance)| **balance < -EPSILON)
            .map(|(user, balance)| (*user, -*balance))
            .collect();
        let mut creditors: Vec<(UserId, f64)> = balances
            .iter()
            .filter(|(_, balance)| **balance > EPSILON)
            .map(|(user, balance)| (*user, *balance))
            .collect();

        let mut transfers = Vec::new();
        let (mut d, mut c) = (0, 0);
        while d < debtors.len() && c < creditors.len() {
            let (debtor, owed) = &mut debtors[d];
            let (creditor, credit) = &mut creditors[c];

            let amount = owed.min(*credit);
            transfers.push(Transfer {
                debtor: *debtor,
                creditor: *creditor,
                amount,
            });
            *owed -= amount;
            *credit -= amount;

            if *owed <= EPSILON {
                d += 1;
            }
            if *credit <= EPSILON {
                c += 1;
            }
        }
        transfers
    }
}
