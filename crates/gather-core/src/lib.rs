//! # gather-core
//!
//! Shared domain types for the gather presence and update-distribution
//! server:
//!
//! - Branded ID newtypes ([`ids`])
//! - The event domain model and canonical snapshots ([`model`])
//! - Real-time channel wire frames ([`wire`])
//! - The error taxonomy ([`errors`])

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod model;
pub mod wire;

pub use errors::{CoreError, ErrorBody};
pub use ids::{EventId, PrincipalId, RoomId, SessionId};
