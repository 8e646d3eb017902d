//! Mutation pipeline: validate → mutate → invalidate → re-read → broadcast.
//!
//! Every mutating operation follows the same sequence, which is the
//! consistency contract of the whole server: a failure before the
//! repository write leaves no observable change, and a failure after it is
//! treated as committed — broadcast failure never rolls a mutation back.
//! Within one pipeline execution, every observer that receives the
//! broadcast sees state at least as fresh as the mutation that triggered
//! it. Concurrent mutations of the same resource carry no ordering
//! guarantee: there is no version check and the last write wins.

use std::sync::Arc;

use tracing::{debug, instrument};

use gather_core::CoreError;
use gather_core::ids::{EventId, PrincipalId, RoomId};
use gather_core::model::{
    EventPage, EventPatch, EventQuery, EventSnapshot, NewEvent, Pagination,
};
use gather_core::wire::ServerFrame;
use gather_store::repository::EventRepository;
use gather_store::snapshot;

use crate::cache::CacheStore;
use crate::realtime::broadcast::Broadcaster;

/// Cache key prefix for list queries.
const LIST_PREFIX: &str = "events";
/// Cache key prefix for detail reads.
const DETAIL_PREFIX: &str = "event";

fn list_key(query: &EventQuery) -> String {
    format!(
        "{LIST_PREFIX}:{}:page:{}:limit:{}",
        query.fingerprint(),
        query.page(),
        query.limit()
    )
}

fn detail_key(id: &EventId) -> String {
    format!("{DETAIL_PREFIX}:{id}")
}

/// Orchestrates authoritative mutations, cache invalidation, and the
/// post-mutation broadcast of canonical snapshots.
pub struct UpdateCoordinator {
    repo: Arc<dyn EventRepository>,
    cache: Arc<CacheStore>,
    broadcaster: Arc<Broadcaster>,
}

impl UpdateCoordinator {
    /// Wire the coordinator to its collaborators.
    pub fn new(
        repo: Arc<dyn EventRepository>,
        cache: Arc<CacheStore>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            repo,
            cache,
            broadcaster,
        }
    }

    /// Create an event and broadcast it to every connected session (new
    /// resources are of global interest).
    #[instrument(skip_all, fields(%actor))]
    pub async fn create_event(
        &self,
        actor: &PrincipalId,
        new: NewEvent,
    ) -> Result<EventSnapshot, CoreError> {
        if new.title.trim().is_empty() {
            return Err(CoreError::validation("Title must not be empty"));
        }
        if new.max_attendees == Some(0) {
            return Err(CoreError::validation("Capacity must be positive"));
        }

        let record = self.repo.insert(new, actor.clone()).await?;
        let _ = self.cache.invalidate(LIST_PREFIX);
        let snapshot = self.reread(&record.id).await?;
        self.broadcaster
            .to_all(&ServerFrame::resource_updated(&snapshot))
            .await;
        Ok(snapshot)
    }

    /// Update an event (creator only) and broadcast the fresh snapshot to
    /// its room.
    #[instrument(skip_all, fields(%actor, %id))]
    pub async fn update_event(
        &self,
        actor: &PrincipalId,
        id: &EventId,
        patch: EventPatch,
    ) -> Result<EventSnapshot, CoreError> {
        let existing = self
            .repo
            .find(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Event"))?;
        if existing.creator != *actor {
            return Err(CoreError::Authorization {
                message: "Not authorized to update this event".into(),
            });
        }

        let _ = self
            .repo
            .update(id, patch)
            .await?
            .ok_or_else(|| CoreError::not_found("Event"))?;
        self.invalidate(id);
        let snapshot = self.reread(id).await?;
        self.broadcaster
            .to_room(
                &RoomId::for_event(id),
                &ServerFrame::resource_updated(&snapshot),
            )
            .await;
        Ok(snapshot)
    }

    /// Delete an event (creator only) and notify its room.
    #[instrument(skip_all, fields(%actor, %id))]
    pub async fn delete_event(
        &self,
        actor: &PrincipalId,
        id: &EventId,
    ) -> Result<(), CoreError> {
        let existing = self
            .repo
            .find(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Event"))?;
        if existing.creator != *actor {
            return Err(CoreError::Authorization {
                message: "Not authorized to delete this event".into(),
            });
        }

        let _ = self.repo.delete(id).await?;
        self.invalidate(id);
        self.broadcaster
            .to_room(&RoomId::for_event(id), &ServerFrame::resource_deleted(id))
            .await;
        Ok(())
    }

    /// Add the caller to an event's attendee list.
    ///
    /// Fails fast — with no store write, no invalidation and no broadcast —
    /// on duplicate attendance or when the event is at capacity.
    #[instrument(skip_all, fields(%actor, %id))]
    pub async fn attend_event(
        &self,
        actor: &PrincipalId,
        id: &EventId,
    ) -> Result<EventSnapshot, CoreError> {
        let event = self
            .repo
            .find(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Event"))?;
        if event.is_attending(actor) {
            return Err(CoreError::validation("Already attending this event"));
        }
        if event.is_full() {
            return Err(CoreError::validation("Event has reached maximum capacity"));
        }

        let mut attendees = event.attendees;
        attendees.push(actor.clone());
        let _ = self
            .repo
            .update(id, EventPatch::attendees(attendees))
            .await?
            .ok_or_else(|| CoreError::not_found("Event"))?;

        self.invalidate(id);
        let snapshot = self.reread(id).await?;
        let frame = ServerFrame::resource_updated(&snapshot);
        self.broadcaster.to_room(&RoomId::for_event(id), &frame).await;
        // Attendance changes are broadcast globally as well; the original
        // system behaves this way for its low-fanout deployments.
        self.broadcaster.to_all(&frame).await;
        Ok(snapshot)
    }

    /// Cached, filtered, paginated listing.
    pub async fn list_events(&self, query: &EventQuery) -> Result<EventPage, CoreError> {
        let key = list_key(query);
        if let Some(hit) = self.cache.get(&key) {
            if let Ok(page) = serde_json::from_value::<EventPage>(hit) {
                debug!(key, "list served from cache");
                return Ok(page);
            }
        }

        let (records, total) = self.repo.list(query).await?;
        let mut events = Vec::with_capacity(records.len());
        for record in &records {
            events.push(snapshot::resolve(self.repo.as_ref(), record).await?);
        }
        let limit = query.limit();
        let page = EventPage {
            events,
            pagination: Pagination {
                total,
                pages: total.div_ceil(limit),
                current: query.page(),
            },
        };
        if let Ok(value) = serde_json::to_value(&page) {
            self.cache.set(key, value, None);
        }
        Ok(page)
    }

    /// Cached detail read.
    pub async fn get_event(&self, id: &EventId) -> Result<EventSnapshot, CoreError> {
        let key = detail_key(id);
        if let Some(hit) = self.cache.get(&key) {
            if let Ok(snapshot) = serde_json::from_value::<EventSnapshot>(hit) {
                debug!(key, "detail served from cache");
                return Ok(snapshot);
            }
        }

        let snapshot = self.reread(id).await?;
        if let Ok(value) = serde_json::to_value(&snapshot) {
            self.cache.set(key, value, None);
        }
        Ok(snapshot)
    }

    /// Coarse list invalidation plus the targeted detail key.
    fn invalidate(&self, id: &EventId) {
        let _ = self.cache.invalidate(LIST_PREFIX);
        let _ = self.cache.invalidate(&detail_key(id));
    }

    /// Fresh read, fully dereferenced — the canonical snapshot.
    async fn reread(&self, id: &EventId) -> Result<EventSnapshot, CoreError> {
        let record = self
            .repo
            .find(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Event"))?;
        Ok(snapshot::resolve(self.repo.as_ref(), &record).await?)
    }
}
