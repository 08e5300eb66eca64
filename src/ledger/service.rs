use crate::core::{DebtId, Entity, ExpenseId, Result, StoreError, UserId};
use crate::ledger::debt::{Debt, PaymentOutcome};
use crate::ledger::expense::Expense;
use crate::ledger::settlement::{SettlementEngine, SettlementOutcome};
use crate::storage::{EntityPartition, PartitionRegistry};
use log::{debug, info};
use std::sync::{Arc, Mutex};

pub const EXPENSES_PARTITION: &str = "expenses";
pub const DEBTS_PARTITION: &str = "debts";

/// Shared-expense operations over the `expenses` and `debts` partitions.
///
/// Every successful mutation marks its partition dirty; the registry's
/// autosave worker writes it out. Failed operations leave state untouched.
pub struct Ledger {
    registry: Arc<PartitionRegistry>,
    expenses: Arc<EntityPartition<Expense>>,
    debts: Arc<EntityPartition<Debt>>,
    settle_lock: Mutex<()>,
}

impl Ledger {
    /// Declare the ledger's partitions. Call before the registry is initialized.
    pub fn register(registry: &PartitionRegistry) -> Result<()> {
        registry.register(
            EXPENSES_PARTITION,
            "expenses.json",
            EntityPartition::<Expense>::new,
        )?;
        registry.register(DEBTS_PARTITION, "debts.json", EntityPartition::<Debt>::new)
    }

    /// Bind to the partitions of an initialized registry.
    pub fn attach(registry: Arc<PartitionRegistry>) -> Result<Self> {
        let expenses = registry.get::<EntityPartition<Expense>>(EXPENSES_PARTITION)?;
        let debts = registry.get::<EntityPartition<Debt>>(DEBTS_PARTITION)?;
        Ok(Self {
            registry,
            expenses,
            debts,
            settle_lock: Mutex::new(()),
        })
    }

    // ------------------------------------------------------------------
    // Expenses
    // ------------------------------------------------------------------

    pub fn create_expense<I>(
        &self,
        name: &str,
        amount: f64,
        payer: UserId,
        beneficiaries: I,
    ) -> Result<Expense>
    where
        I: IntoIterator<Item = UserId>,
    {
        let mut expense = Expense::new(name, amount, payer, beneficiaries)?;
        let id = self.expenses.insert_with(|_| expense.clone())?;
        expense.attach_id(id);
        self.registry.mark_dirty(EXPENSES_PARTITION);

        debug!("expense #{} created: '{}' {:.2} by {}", id, expense.name(), amount, payer);
        Ok(expense)
    }

    pub fn expense(&self, id: ExpenseId) -> Result<Expense> {
        self.expenses
            .get(id)?
            .ok_or(StoreError::ExpenseNotFound(id))
    }

    pub fn expenses(&self) -> Result<Vec<Expense>> {
        Ok(self.expenses.read()?.values().cloned().collect())
    }

    pub fn unsettled_expenses(&self) -> Result<Vec<Expense>> {
        Ok(self
            .expenses
            .read()?
            .values()
            .filter(|expense| !expense.is_settled())
            .cloned()
            .collect())
    }

    pub fn rename_expense(&self, id: ExpenseId, name: &str) -> Result<Expense> {
        self.edit_expense(id, |expense| {
            let changed = expense.name() != name.trim();
            expense.rename(name);
            Ok((expense.clone(), changed))
        })
    }

    pub fn set_amount(&self, id: ExpenseId, amount: f64) -> Result<Expense> {
        self.edit_expense(id, |expense| {
            let changed = expense.amount() != amount;
            expense.set_amount(amount)?;
            Ok((expense.clone(), changed))
        })
    }

    /// Returns false when the user was already a beneficiary.
    pub fn add_beneficiary(&self, id: ExpenseId, user: UserId) -> Result<bool> {
        self.edit_expense(id, |expense| {
            let added = expense.add_beneficiary(user);
            Ok((added, added))
        })
    }

    /// Returns false when the user was not a beneficiary.
    pub fn remove_beneficiary(&self, id: ExpenseId, user: UserId) -> Result<bool> {
        self.edit_expense(id, |expense| {
            let removed = expense.remove_beneficiary(user)?;
            Ok((removed, removed))
        })
    }

    pub fn delete_expense(&self, id: ExpenseId) -> Result<Expense> {
        let removed = {
            let mut expenses = self.expenses.write()?;
            let settled = expenses
                .get(&id)
                .map(Expense::is_settled)
                .ok_or(StoreError::ExpenseNotFound(id))?;
            if settled {
                return Err(StoreError::ExpenseSettled(id));
            }
            expenses
                .remove(&id)
                .ok_or(StoreError::ExpenseNotFound(id))?
        };
        self.registry.mark_dirty(EXPENSES_PARTITION);
        debug!("expense #{} deleted", id);
        Ok(removed)
    }

    /// Apply `edit` to an unsettled expense. The closure reports whether it
    /// changed anything; only a change marks the partition dirty.
    fn edit_expense<R, F>(&self, id: ExpenseId, edit: F) -> Result<R>
    where
        F: FnOnce(&mut Expense) -> Result<(R, bool)>,
    {
        let (result, changed) = {
            let mut expenses = self.expenses.write()?;
            let expense = expenses
                .get_mut(&id)
                .ok_or(StoreError::ExpenseNotFound(id))?;
            if expense.is_settled() {
                return Err(StoreError::ExpenseSettled(id));
            }
            edit(expense)?
        };
        if changed {
            self.registry.mark_dirty(EXPENSES_PARTITION);
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Debts
    // ------------------------------------------------------------------

    pub fn debt(&self, id: DebtId) -> Result<Option<Debt>> {
        self.debts.get(id)
    }

    pub fn debts(&self) -> Result<Vec<Debt>> {
        Ok(self.debts.read()?.values().cloned().collect())
    }

    /// Unpaid debts in which `user` is either side.
    pub fn debts_for(&self, user: UserId) -> Result<Vec<Debt>> {
        Ok(self
            .debts
            .read()?
            .values()
            .filter(|debt| !debt.is_paid() && debt.involves(user))
            .cloned()
            .collect())
    }

    /// Only the creditor of record may mark a debt paid.
    pub fn mark_debt_paid(&self, id: DebtId, caller: UserId) -> Result<PaymentOutcome> {
        let outcome = self
            .debts
            .update(id, |debt| {
                if debt.creditor() != caller {
                    PaymentOutcome::NotCreditor {
                        debt_id: id,
                        creditor: debt.creditor(),
                    }
                } else if debt.is_paid() {
                    PaymentOutcome::AlreadyPaid(debt.clone())
                } else {
                    debt.mark_paid();
                    PaymentOutcome::Paid(debt.clone())
                }
            })?
            .unwrap_or(PaymentOutcome::NotFound(id));

        if outcome.is_paid() {
            self.registry.mark_dirty(DEBTS_PARTITION);
            info!("debt #{} marked paid by {}", id, caller);
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Settlement
    // ------------------------------------------------------------------

    /// Turn every unsettled expense into pairwise debts and consume them.
    ///
    /// Works on a snapshot of the unsettled expenses; edits racing with the
    /// pass may or may not be reflected. Two passes never overlap.
    pub fn calculate_settlement(&self) -> Result<SettlementOutcome> {
        let _guard = self.settle_lock.lock()?;

        let selected = self.unsettled_expenses()?;
        if selected.is_empty() {
            return Ok(SettlementOutcome::default());
        }

        let balances = SettlementEngine::compute_balances(&selected);
        let transfers = SettlementEngine::reduce(&balances);

        let mut debts = Vec::with_capacity(transfers.len());
        for transfer in transfers {
            let mut debt = Debt::new(transfer.debtor, transfer.creditor, transfer.amount);
            let id = self.debts.insert_with(|_| debt.clone())?;
            debt.attach_id(id);
            debts.push(debt);
        }

        {
            let mut expenses = self.expenses.write()?;
            for expense in &selected {
                if let Some(stored) = expenses.get_mut(&expense.id()) {
                    stored.mark_settled();
                }
            }
        }

        if !debts.is_empty() {
            self.registry.mark_dirty(DEBTS_PARTITION);
        }
        self.registry.mark_dirty(EXPENSES_PARTITION);

        info!(
            "settlement consumed {} expense(s) and created {} debt(s)",
            selected.len(),
            debts.len()
        );
        Ok(SettlementOutcome {
            debts,
            processed: selected.len(),
        })
    }
}
