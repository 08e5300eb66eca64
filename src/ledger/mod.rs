pub mod debt;
pub mod expense;
pub mod service;
pub mod settlement;

pub use debt::{Debt, PaymentOutcome};
pub use expense::Expense;
pub use service::{DEBTS_PARTITION, EXPENSES_PARTITION, Ledger};
pub use settlement::{Balances, SettlementEngine, SettlementOutcome, Transfer};
