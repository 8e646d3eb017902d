//! The event domain model.
//!
//! [`EventRecord`] is the authoritative shape stored in the repository;
//! [`EventSnapshot`] is the fully dereferenced view (creator and attendees
//! expanded to [`Profile`]s) that gets broadcast after a mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EventId, PrincipalId};

/// Event category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    /// Multi-track conference.
    Conference,
    /// Hands-on workshop.
    Workshop,
    /// Social gathering.
    Social,
    /// Anything else.
    Other,
}

/// Publication status of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Not yet visible.
    Draft,
    /// Live and joinable.
    Published,
    /// Cancelled by the creator.
    Cancelled,
}

impl Default for EventStatus {
    fn default() -> Self {
        Self::Published
    }
}

/// Authoritative event state as stored in the repository.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Event identifier.
    pub id: EventId,
    /// Event title.
    pub title: String,
    /// Event description.
    pub description: String,
    /// When the event takes place.
    pub date: DateTime<Utc>,
    /// Category.
    pub category: EventCategory,
    /// Where the event takes place.
    pub location: String,
    /// Principal that created the event.
    pub creator: PrincipalId,
    /// Principals attending the event.
    pub attendees: Vec<PrincipalId>,
    /// Attendance cap; `None` means unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attendees: Option<usize>,
    /// Publication status.
    #[serde(default)]
    pub status: EventStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl EventRecord {
    /// Whether `principal` is already in the attendee list.
    #[must_use]
    pub fn is_attending(&self, principal: &PrincipalId) -> bool {
        self.attendees.contains(principal)
    }

    /// Whether the attendee list has reached `max_attendees`.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.max_attendees
            .is_some_and(|cap| self.attendees.len() >= cap)
    }
}

/// Public view of a principal, used when dereferencing snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Principal identifier.
    pub id: PrincipalId,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
}

/// Fully dereferenced event view produced by a fresh read immediately
/// before broadcast, so every subscriber observes a consistent
/// post-mutation state.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSnapshot {
    /// Event identifier.
    pub id: EventId,
    /// Event title.
    pub title: String,
    /// Event description.
    pub description: String,
    /// When the event takes place.
    pub date: DateTime<Utc>,
    /// Category.
    pub category: EventCategory,
    /// Where the event takes place.
    pub location: String,
    /// Creator, expanded.
    pub creator: Profile,
    /// Attendees, expanded.
    pub attendees: Vec<Profile>,
    /// Number of attendees.
    pub attendee_count: usize,
    /// Attendance cap; `None` means unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attendees: Option<usize>,
    /// Publication status.
    pub status: EventStatus,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an event.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    /// Event title.
    pub title: String,
    /// Event description.
    pub description: String,
    /// When the event takes place.
    pub date: DateTime<Utc>,
    /// Category.
    pub category: EventCategory,
    /// Where the event takes place.
    pub location: String,
    /// Attendance cap; `None` means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attendees: Option<usize>,
    /// Publication status; defaults to published.
    #[serde(default)]
    pub status: EventStatus,
}

/// Partial update applied to an event. `None` fields are left untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    /// New category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<EventCategory>,
    /// New location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// New attendance cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attendees: Option<Option<usize>>,
    /// New status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EventStatus>,
    /// Replacement attendee list (used by the attend pipeline).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<PrincipalId>>,
}

impl EventPatch {
    /// A patch that only replaces the attendee list.
    #[must_use]
    pub fn attendees(attendees: Vec<PrincipalId>) -> Self {
        Self {
            attendees: Some(attendees),
            ..Self::default()
        }
    }
}

/// List query: free-text title term, category filter, pagination.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQuery {
    /// Case-insensitive substring match against the title.
    #[serde(default)]
    pub term: Option<String>,
    /// Match any of these categories; empty means all.
    #[serde(default)]
    pub categories: Vec<EventCategory>,
    /// 1-based page number.
    #[serde(default)]
    pub page: Option<usize>,
    /// Page size.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl EventQuery {
    /// Default page size.
    pub const DEFAULT_LIMIT: usize = 10;

    /// Effective 1-based page (minimum 1).
    #[must_use]
    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    /// Effective page size (minimum 1).
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).max(1)
    }

    /// Stable fingerprint of the filter portion, used in cache keys.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let term = self.term.as_deref().unwrap_or("");
        let mut cats: Vec<String> = self
            .categories
            .iter()
            .map(|c| format!("{c:?}").to_lowercase())
            .collect();
        cats.sort();
        format!("{term}|{}", cats.join(","))
    }
}

/// Pagination block returned with every list response.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Total matching events.
    pub total: usize,
    /// Total pages at the requested limit.
    pub pages: usize,
    /// The returned page (1-based).
    pub current: usize,
}

/// One page of dereferenced events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    /// Events on this page, ordered by date ascending.
    pub events: Vec<EventSnapshot>,
    /// Pagination block.
    pub pagination: Pagination,
}
