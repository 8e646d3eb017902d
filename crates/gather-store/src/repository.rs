//! The authoritative event store seam.

use async_trait::async_trait;

use gather_core::ids::{EventId, PrincipalId};
use gather_core::model::{EventPatch, EventQuery, EventRecord, NewEvent, Profile};

/// Store-level failure.
///
/// The in-memory implementations never produce one; network-backed
/// implementations surface I/O failures here and callers convert them to
/// the transient-store error at the operation boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or the call failed mid-flight.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Underlying failure description.
        message: String,
    },
}

impl StoreError {
    /// Convenience constructor.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

impl From<StoreError> for gather_core::CoreError {
    fn from(err: StoreError) -> Self {
        Self::TransientStore {
            message: err.to_string(),
        }
    }
}

/// Authoritative CRUD store for events, plus the principal profiles needed
/// to dereference snapshots.
///
/// The store provides no conflict detection: concurrent updates to the same
/// event apply in arrival order and the last write wins.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Insert a new event owned by `creator`.
    async fn insert(&self, new: NewEvent, creator: PrincipalId)
    -> Result<EventRecord, StoreError>;

    /// Fetch one event.
    async fn find(&self, id: &EventId) -> Result<Option<EventRecord>, StoreError>;

    /// Filtered, paginated listing ordered by date ascending. Returns the
    /// page of records and the total match count.
    async fn list(&self, query: &EventQuery) -> Result<(Vec<EventRecord>, usize), StoreError>;

    /// Apply a partial update. Returns the updated record, or `None` when
    /// the event does not exist.
    async fn update(
        &self,
        id: &EventId,
        patch: EventPatch,
    ) -> Result<Option<EventRecord>, StoreError>;

    /// Delete an event. Returns whether it existed.
    async fn delete(&self, id: &EventId) -> Result<bool, StoreError>;

    /// Fetch a principal's public profile.
    async fn profile(&self, id: &PrincipalId) -> Result<Option<Profile>, StoreError>;

    /// Create or replace a principal's public profile.
    async fn upsert_profile(&self, profile: Profile) -> Result<(), StoreError>;
}
