//! Canonical snapshot dereferencing.

use gather_core::ids::PrincipalId;
use gather_core::model::{EventRecord, EventSnapshot, Profile};
use tracing::debug;

use crate::repository::{EventRepository, StoreError};

/// Expand an [`EventRecord`] into the fully dereferenced [`EventSnapshot`]
/// broadcast to subscribers.
///
/// Creator and attendee references are resolved to profiles. A principal
/// with no stored profile gets a minimal placeholder so a missing profile
/// row never blocks a broadcast.
pub async fn resolve(
    repo: &dyn EventRepository,
    record: &EventRecord,
) -> Result<EventSnapshot, StoreError> {
    let creator = lookup(repo, &record.creator).await?;
    let mut attendees = Vec::with_capacity(record.attendees.len());
    for principal in &record.attendees {
        attendees.push(lookup(repo, principal).await?);
    }

    Ok(EventSnapshot {
        id: record.id.clone(),
        title: record.title.clone(),
        description: record.description.clone(),
        date: record.date,
        category: record.category,
        location: record.location.clone(),
        creator,
        attendee_count: attendees.len(),
        attendees,
        max_attendees: record.max_attendees,
        status: record.status,
        updated_at: record.updated_at,
    })
}

async fn lookup(
    repo: &dyn EventRepository,
    principal: &PrincipalId,
) -> Result<Profile, StoreError> {
    match repo.profile(principal).await? {
        Some(profile) => Ok(profile),
        None => {
            debug!(%principal, "no profile on record, using placeholder");
            Ok(Profile {
                id: principal.clone(),
                name: principal.to_string(),
                email: String::new(),
            })
        }
    }
}
