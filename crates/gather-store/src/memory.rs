//! In-memory [`EventRepository`] implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use gather_core::ids::{EventId, PrincipalId};
use gather_core::model::{EventPatch, EventQuery, EventRecord, NewEvent, Profile};

use crate::repository::{EventRepository, StoreError};

/// Process-local event store backed by a `HashMap`.
///
/// Mutations take the write lock for their whole critical section, so each
/// call applies atomically; across calls the last write wins.
#[derive(Default)]
pub struct InMemoryEventRepository {
    events: RwLock<HashMap<EventId, EventRecord>>,
    profiles: RwLock<HashMap<PrincipalId, Profile>>,
}

impl InMemoryEventRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(record: &EventRecord, query: &EventQuery) -> bool {
        if let Some(term) = query.term.as_deref() {
            if !record
                .title
                .to_lowercase()
                .contains(&term.to_lowercase())
            {
                return false;
            }
        }
        if !query.categories.is_empty() && !query.categories.contains(&record.category) {
            return false;
        }
        true
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn insert(
        &self,
        new: NewEvent,
        creator: PrincipalId,
    ) -> Result<EventRecord, StoreError> {
        let now = Utc::now();
        let record = EventRecord {
            id: EventId::new(),
            title: new.title,
            description: new.description,
            date: new.date,
            category: new.category,
            location: new.location,
            creator,
            attendees: Vec::new(),
            max_attendees: new.max_attendees,
            status: new.status,
            created_at: now,
            updated_at: now,
        };
        let mut events = self.events.write().await;
        let _ = events.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn find(&self, id: &EventId) -> Result<Option<EventRecord>, StoreError> {
        Ok(self.events.read().await.get(id).cloned())
    }

    async fn list(&self, query: &EventQuery) -> Result<(Vec<EventRecord>, usize), StoreError> {
        let events = self.events.read().await;
        let mut matched: Vec<EventRecord> = events
            .values()
            .filter(|r| Self::matches(r, query))
            .cloned()
            .collect();
        // Date ascending, id as tiebreak for a stable page order.
        matched.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.as_str().cmp(b.id.as_str())));

        let total = matched.len();
        let limit = query.limit();
        let skip = (query.page() - 1) * limit;
        let page: Vec<EventRecord> = matched.into_iter().skip(skip).take(limit).collect();
        Ok((page, total))
    }

    async fn update(
        &self,
        id: &EventId,
        patch: EventPatch,
    ) -> Result<Option<EventRecord>, StoreError> {
        let mut events = self.events.write().await;
        let Some(record) = events.get_mut(id) else {
            return Ok(None);
        };
        if let Some(title) = patch.title {
            record.title = title;
        }
        if let Some(description) = patch.description {
            record.description = description;
        }
        if let Some(date) = patch.date {
            record.date = date;
        }
        if let Some(category) = patch.category {
            record.category = category;
        }
        if let Some(location) = patch.location {
            record.location = location;
        }
        if let Some(max_attendees) = patch.max_attendees {
            record.max_attendees = max_attendees;
        }
        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(attendees) = patch.attendees {
            record.attendees = attendees;
        }
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn delete(&self, id: &EventId) -> Result<bool, StoreError> {
        Ok(self.events.write().await.remove(id).is_some())
    }

    async fn profile(&self, id: &PrincipalId) -> Result<Option<Profile>, StoreError> {
        Ok(self.profiles.read().await.get(id).cloned())
    }

    async fn upsert_profile(&self, profile: Profile) -> Result<(), StoreError> {
        let mut profiles = self.profiles.write().await;
        let _ = profiles.insert(profile.id.clone(), profile);
        Ok(())
    }
}
