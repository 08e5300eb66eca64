use crate::core::{Entity, EntityId, ExpenseId, Result, StoreError, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A shared expense: one payer, split equally over its beneficiaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    #[serde(skip)]
    id: ExpenseId,
    name: String,
    amount: f64,
    payer: UserId,
    beneficiaries: BTreeSet<UserId>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    settled: bool,
}

pub(crate) fn validate_amount(amount: f64) -> Result<f64> {
    if amount.is_finite() && amount > 0.0 {
        Ok(amount)
    } else {
        Err(StoreError::InvalidAmount(amount))
    }
}

impl Expense {
    /// The payer always joins the beneficiaries; it can be removed later.
    pub fn new<I>(name: &str, amount: f64, payer: UserId, beneficiaries: I) -> Result<Self>
    where
        I: IntoIterator<Item = UserId>,
    {
        let amount = validate_amount(amount)?;
        let mut beneficiaries: BTreeSet<UserId> = beneficiaries.into_iter().collect();
        beneficiaries.insert(payer);

        Ok(Self {
            id: EntityId::UNASSIGNED,
            name: name.trim().to_string(),
            amount,
            payer,
            beneficiaries,
            created_at: Utc::now(),
            settled: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn payer(&self) -> UserId {
        self.payer
    }

    pub fn beneficiaries(&self) -> &BTreeSet<UserId> {
        &self.beneficiaries
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Equal share per beneficiary, `None` when nobody benefits.
    pub fn share(&self) -> Option<f64> {
        if self.beneficiaries.is_empty() {
            None
        } else {
            Some(self.amount / self.beneficiaries.len() as f64)
        }
    }

    pub(crate) fn rename(&mut self, name: &str) {
        self.name = name.trim().to_string();
    }

    pub(crate) fn set_amount(&mut self, amount: f64) -> Result<()> {
        self.amount = validate_amount(amount)?;
        Ok(())
    }

    pub(crate) fn add_beneficiary(&mut self, user: UserId) -> bool {
        self.beneficiaries.insert(user)
    }

    pub(crate) fn remove_beneficiary(&mut self, user: UserId) -> Result<bool> {
        if !self.beneficiaries.contains(&user) {
            return Ok(false);
        }
        if self.beneficiaries.len() == 1 {
            return Err(StoreError::LastBeneficiary(self.id));
        }
        Ok(self.beneficiaries.remove(&user))
    }

    pub(crate) fn mark_settled(&mut self) {
        self.settled = true;
    }
}

impl Entity for Expense {
    fn id(&self) -> EntityId {
        self.id
    }

    fn attach_id(&mut self, id: EntityId) {
        self.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payer_joins_beneficiaries() {
        let expense = Expense::new("pizza", 30.0, UserId(1), [UserId(2), UserId(3)]).unwrap();
        assert_eq!(expense.beneficiaries().len(), 3);
        assert!(expense.beneficiaries().contains(&UserId(1)));
        assert_eq!(expense.share(), Some(10.0));
        assert!(!expense.is_settled());
    }

    #[test]
    fn test_duplicate_beneficiaries_collapse() {
        let expense = Expense::new("taxi", 12.0, UserId(1), [UserId(2), UserId(2)]).unwrap();
        assert_eq!(expense.beneficiaries().len(), 2);
    }

    #[test]
    fn test_rejects_bad_amounts() {
        for amount in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let result = Expense::new("bad", amount, UserId(1), []);
            assert!(matches!(result, Err(StoreError::InvalidAmount(_))));
        }
    }

    #[test]
    fn test_last_beneficiary_cannot_be_removed() {
        let mut expense = Expense::new("solo", 5.0, UserId(1), []).unwrap();
        assert!(matches!(
            expense.remove_beneficiary(UserId(1)),
            Err(StoreError::LastBeneficiary(_))
        ));
        assert!(!expense.remove_beneficiary(UserId(9)).unwrap());
    }

    #[test]
    fn test_payer_can_be_removed() {
        let mut expense = Expense::new("gift", 20.0, UserId(1), [UserId(2)]).unwrap();
        assert!(expense.remove_beneficiary(UserId(1)).unwrap());
        assert_eq!(expense.share(), Some(20.0));
    }

    #[test]
    fn test_identity_not_serialized() {
        let mut expense = Expense::new("rent", 900.0, UserId(1), [UserId(2)]).unwrap();
        expense.attach_id(EntityId(4));
        let json = serde_json::to_value(&expense).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["payer"], 1);
    }
}
