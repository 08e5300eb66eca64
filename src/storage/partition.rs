//! Identity-keyed entity partitions

use crate::core::{Entity, EntityId, Result};
use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::ser::{Error as _, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory map from identity to entity, plus the identity allocator.
///
/// The map key is the single source of truth for an entity's identity. The
/// serialized form holds bodies without ids, and decoding always reattaches
/// them before the partition is handed out.
pub struct EntityPartition<T> {
    next_id: AtomicU64,
    entities: RwLock<BTreeMap<EntityId, T>>,
}

impl<T: Entity> EntityPartition<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entities: RwLock::new(BTreeMap::new()),
        }
    }

    /// Hand out a fresh identity. Concurrent callers always get distinct,
    /// contiguous values.
    pub fn allocate_id(&self) -> EntityId {
        EntityId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// The identity the next `allocate_id` call will return.
    pub fn peek_next_id(&self) -> EntityId {
        EntityId(self.next_id.load(Ordering::SeqCst))
    }

    /// Allocate an identity, build the entity with it and store it.
    pub fn insert_with<F>(&self, build: F) -> Result<EntityId>
    where
        F: FnOnce(EntityId) -> T,
    {
        let id = self.allocate_id();
        let mut entity = build(id);
        entity.attach_id(id);
        self.entities.write()?.insert(id, entity);
        Ok(id)
    }

    /// Shared access to the live map.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<EntityId, T>>> {
        Ok(self.entities.read()?)
    }

    /// Exclusive access to the live map. Callers mark the owning partition
    /// dirty themselves.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<EntityId, T>>> {
        Ok(self.entities.write()?)
    }

    pub fn get(&self, id: EntityId) -> Result<Option<T>> {
        Ok(self.entities.read()?.get(&id).cloned())
    }

    pub fn contains(&self, id: EntityId) -> Result<bool> {
        Ok(self.entities.read()?.contains_key(&id))
    }

    /// Mutate one entity in place. `None` if the id is unknown.
    pub fn update<R, F>(&self, id: EntityId, f: F) -> Result<Option<R>>
    where
        F: FnOnce(&mut T) -> R,
    {
        Ok(self.entities.write()?.get_mut(&id).map(f))
    }

    /// Remove an entity. Its identity is never handed out again.
    pub fn remove(&self, id: EntityId) -> Result<Option<T>> {
        Ok(self.entities.write()?.remove(&id))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.entities.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.entities.read()?.is_empty())
    }

    pub fn ids(&self) -> Result<Vec<EntityId>> {
        Ok(self.entities.read()?.keys().copied().collect())
    }

    /// Fails when the stored identities leave no room for another allocation.
    fn from_entities(next_id: u64, entities: BTreeMap<EntityId, T>) -> Option<Self> {
        let after_max = match entities.keys().next_back() {
            Some(id) => id.get().checked_add(1)?,
            None => 1,
        };
        let next_id = next_id.max(after_max);
        if next_id == u64::MAX {
            return None;
        }
        let mut partition = Self {
            next_id: AtomicU64::new(next_id),
            entities: RwLock::new(entities),
        };
        partition.reattach_identities();
        Some(partition)
    }

    fn reattach_identities(&mut self) {
        let entities = self
            .entities
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for (id, entity) in entities.iter_mut() {
            entity.attach_id(*id);
        }
    }
}

impl<T: Entity> Default for EntityPartition<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> std::fmt::Debug for EntityPartition<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityPartition")
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .field("len", &self.entities.read().map(|e| e.len()).ok())
            .finish()
    }
}

// ============================================================================
// Serialized Form
// ============================================================================

#[derive(Serialize)]
struct PartitionRef<'a, T> {
    next_id: u64,
    entities: &'a BTreeMap<EntityId, T>,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct RawPartition<T> {
    #[serde(default)]
    next_id: u64,
    #[serde(default = "BTreeMap::new")]
    entities: BTreeMap<EntityId, T>,
}

impl<T: Entity + Serialize> Serialize for EntityPartition<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let entities = self
            .entities
            .read()
            .map_err(|e| S::Error::custom(e.to_string()))?;
        // Read under the lock so no stored id can be >= next_id.
        PartitionRef {
            next_id: self.next_id.load(Ordering::SeqCst),
            entities: &entities,
        }
        .serialize(serializer)
    }
}

impl<'de, T: Entity + DeserializeOwned> Deserialize<'de> for EntityPartition<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawPartition::<T>::deserialize(deserializer)?;
        Self::from_entities(raw.next_id, raw.entities)
            .ok_or_else(|| D::Error::custom("entity identities exhausted"))
    }
}
