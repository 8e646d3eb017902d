//! # gather-server
//!
//! Real-time presence and update-distribution server:
//!
//! - `WebSocket` gateway: per-session task, heartbeat, frame dispatch
//! - Room presence: connection registry, room directory (local membership
//!   mirrored into a shared cross-process store), presence coordinator
//! - Mutation pipeline: validate → mutate → invalidate cache → re-read
//!   canonical snapshot → broadcast
//! - TTL read cache with substring invalidation and a periodic sweeper
//! - HTTP API over axum, Prometheus metrics, graceful shutdown via
//!   `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod health;
pub mod http;
pub mod metrics;
pub mod realtime;
pub mod server;
pub mod shutdown;
pub mod update;
