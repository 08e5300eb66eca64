//! Event tracking: scheduled gatherings with an attendee list

use crate::core::{Entity, EntityId, EventId, Result, StoreError, UserId};
use crate::storage::{EntityPartition, PartitionRegistry};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const EVENTS_PARTITION: &str = "events";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(skip)]
    id: EventId,
    title: String,
    starts_at: DateTime<Utc>,
    organizer: UserId,
    attendees: BTreeSet<UserId>,
    #[serde(default)]
    cancelled: bool,
}

impl Event {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn starts_at(&self) -> DateTime<Utc> {
        self.starts_at
    }

    pub fn organizer(&self) -> UserId {
        self.organizer
    }

    pub fn attendees(&self) -> &BTreeSet<UserId> {
        &self.attendees
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl Entity for Event {
    fn id(&self) -> EntityId {
        self.id
    }

    fn attach_id(&mut self, id: EntityId) {
        self.id = id;
    }
}

/// Event operations over the `events` partition.
pub struct EventBook {
    registry: Arc<PartitionRegistry>,
    events: Arc<EntityPartition<Event>>,
}

impl EventBook {
    pub fn register(registry: &PartitionRegistry) -> Result<()> {
        registry.register(EVENTS_PARTITION, "events.json", EntityPartition::<Event>::new)
    }

    pub fn attach(registry: Arc<PartitionRegistry>) -> Result<Self> {
        let events = registry.get::<EntityPartition<Event>>(EVENTS_PARTITION)?;
        Ok(Self { registry, events })
    }

    /// The organizer attends by default.
    pub fn create_event(
        &self,
        title: &str,
        starts_at: DateTime<Utc>,
        organizer: UserId,
    ) -> Result<Event> {
        let mut event = Event {
            id: EntityId::UNASSIGNED,
            title: title.trim().to_string(),
            starts_at,
            organizer,
            attendees: BTreeSet::from([organizer]),
            cancelled: false,
        };
        let id = self.events.insert_with(|_| event.clone())?;
        event.attach_id(id);
        self.registry.mark_dirty(EVENTS_PARTITION);
        debug!("event #{} '{}' created by {}", id, event.title, organizer);
        Ok(event)
    }

    pub fn event(&self, id: EventId) -> Result<Event> {
        self.events.get(id)?.ok_or(StoreError::EventNotFound(id))
    }

    /// Returns false when the user was already attending.
    pub fn join(&self, id: EventId, user: UserId) -> Result<bool> {
        self.edit(id, |event| {
            if event.cancelled {
                return Err(StoreError::NotPermitted(format!("event #{} is cancelled", id)));
            }
            let joined = event.attendees.insert(user);
            Ok((joined, joined))
        })
    }

    /// Returns false when the user was not attending.
    pub fn leave(&self, id: EventId, user: UserId) -> Result<bool> {
        self.edit(id, |event| {
            let left = event.attendees.remove(&user);
            Ok((left, left))
        })
    }

    /// One-way; only the organizer may cancel.
    pub fn cancel(&self, id: EventId, caller: UserId) -> Result<Event> {
        self.edit(id, |event| {
            if event.organizer != caller {
                return Err(StoreError::NotPermitted(format!(
                    "only the organizer can cancel event #{}",
                    id
                )));
            }
            let changed = !event.cancelled;
            event.cancelled = true;
            Ok((event.clone(), changed))
        })
    }

    /// Events not cancelled and starting at or after `now`, soonest first.
    pub fn upcoming(&self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .read()?
            .values()
            .filter(|event| !event.cancelled && event.starts_at >= now)
            .cloned()
            .collect();
        events.sort_by_key(|event| (event.starts_at, event.id));
        Ok(events)
    }

    /// Only an edit that reports a change marks the partition dirty.
    fn edit<R, F>(&self, id: EventId, edit: F) -> Result<R>
    where
        F: FnOnce(&mut Event) -> Result<(R, bool)>,
    {
        let (result, changed) = self
            .events
            .update(id, edit)?
            .ok_or(StoreError::EventNotFound(id))??;
        if changed {
            self.registry.mark_dirty(EVENTS_PARTITION);
        }
        Ok(result)
    }
}
