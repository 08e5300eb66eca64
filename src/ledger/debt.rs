use crate::core::{DebtId, Entity, EntityId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One pairwise payment produced by a settlement pass.
///
/// Append-only: the only mutation is the one-way `paid` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debt {
    #[serde(skip)]
    id: DebtId,
    debtor: UserId,
    creditor: UserId,
    amount: f64,
    #[serde(default)]
    paid: bool,
}

impl Debt {
    pub(crate) fn new(debtor: UserId, creditor: UserId, amount: f64) -> Self {
        Self {
            id: EntityId::UNASSIGNED,
            debtor,
            creditor,
            amount,
            paid: false,
        }
    }

    pub fn debtor(&self) -> UserId {
        self.debtor
    }

    pub fn creditor(&self) -> UserId {
        self.creditor
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn is_paid(&self) -> bool {
        self.paid
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.debtor == user || self.creditor == user
    }

    pub(crate) fn mark_paid(&mut self) {
        self.paid = true;
    }
}

impl Entity for Debt {
    fn id(&self) -> EntityId {
        self.id
    }

    fn attach_id(&mut self, id: EntityId) {
        self.id = id;
    }
}

impl fmt::Display for Debt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{}: {} owes {} {:.2}{}",
            self.id,
            self.debtor,
            self.creditor,
            self.amount,
            if self.paid { " (paid)" } else { "" }
        )
    }
}

/// Result of asking to mark a debt paid. Only `Paid` changes state.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Paid(Debt),
    AlreadyPaid(Debt),
    NotFound(DebtId),
    NotCreditor { debt_id: DebtId, creditor: UserId },
}

impl PaymentOutcome {
    pub fn is_paid(&self) -> bool {
        matches!(self, PaymentOutcome::Paid(_))
    }

    pub fn describe(&self) -> String {
        match self {
            PaymentOutcome::Paid(debt) => format!("Debt #{} marked as paid", debt.id()),
            PaymentOutcome::AlreadyPaid(debt) => format!("Debt #{} is already settled", debt.id()),
            PaymentOutcome::NotFound(id) => format!("Debt #{} does not exist", id),
            PaymentOutcome::NotCreditor { debt_id, creditor } => format!(
                "Only the creditor ({}) can mark debt #{} as paid",
                creditor, debt_id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let mut debt = Debt::new(UserId(2), UserId(1), 10.0);
        debt.attach_id(EntityId(3));
        assert_eq!(debt.to_string(), "#3: 2 owes 1 10.00");
        debt.mark_paid();
        assert_eq!(debt.to_string(), "#3: 2 owes 1 10.00 (paid)");
    }

    #[test]
    fn test_involves() {
        let debt = Debt::new(UserId(2), UserId(1), 10.0);
        assert!(debt.involves(UserId(1)));
        assert!(debt.involves(UserId(2)));
        assert!(!debt.involves(UserId(3)));
    }

    #[test]
    fn test_outcome_descriptions() {
        let outcome = PaymentOutcome::NotFound(EntityId(9));
        assert_eq!(outcome.describe(), "Debt #9 does not exist");
        assert!(!outcome.is_paid());
    }
}
