use serde::{Deserialize, Serialize};
use std::fmt;

/// Balances and transfers at or below this magnitude are treated as zero.
pub const EPSILON: f64 = 0.01;

/// Identity of an entity inside its partition. Allocated from 1 upwards and
/// never reused, even after deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl EntityId {
    /// The value carried by an entity whose identity has not been attached yet.
    pub const UNASSIGNED: EntityId = EntityId(0);

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

pub type ExpenseId = EntityId;
pub type DebtId = EntityId;
pub type EventId = EntityId;

/// Chat-platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A value stored in an [`EntityPartition`](crate::storage::EntityPartition).
///
/// The identity is the partition's map key and is not serialized with the
/// body. Implementors keep the field `#[serde(skip)]`; the partition attaches
/// it on insert and again when it is deserialized.
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> EntityId;

    fn attach_id(&mut self, id: EntityId);
}
