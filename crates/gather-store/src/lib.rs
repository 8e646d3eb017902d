//! # gather-store
//!
//! Store seams for the gather server:
//!
//! - [`EventRepository`] — the authoritative CRUD store for events
//! - [`MembershipStore`] — the shared cross-process room-membership store
//!   (set-valued, keyed by principal)
//! - in-memory implementations of both, used by the server binary and tests
//! - [`snapshot::resolve`] — canonical snapshot dereferencing

#![deny(unsafe_code)]

pub mod membership;
pub mod memory;
pub mod repository;
pub mod snapshot;

pub use membership::{InMemoryMembershipStore, MembershipStore};
pub use memory::InMemoryEventRepository;
pub use repository::{EventRepository, StoreError};
