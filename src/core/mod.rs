pub mod error;
pub mod types;

pub use error::{Result, StoreError};
pub use types::{DebtId, EPSILON, Entity, EntityId, EventId, ExpenseId, UserId};
