//! # FieldSync Engine
//!
//! Offline-first synchronization engine for field inspection data.
//!
//! This crate provides:
//! - Sync executor (one pass over the pending queue, per-record upserts)
//! - Sync orchestrator (mutex-gated serialization of all trigger sources)
//! - Connectivity monitor and background-sync capabilities
//! - Read-only status derivation for UI
//! - Remote store abstraction with a mock for testing
//!
//! ## Architecture
//!
//! Findings and photos captured in the field land in the durable queue
//! (`fieldsync_store`). Four trigger sources — a reconnect edge, an
//! explicit call, a periodic poll, and a platform background task — all
//! funnel into [`SyncOrchestrator::sync_now`], which admits at most one
//! executor pass at a time. The pass upserts each record to the
//! [`RemoteStore`] keyed by its `local_id` and writes the outcome back to
//! the store.
//!
//! ## Key Invariants
//!
//! - At most one sync pass runs at a time; concurrent triggers are
//!   suppressed, never queued
//! - Upserts are idempotent on `local_id`
//! - Record failures never abort a pass; connectivity loss does, with
//!   partial progress preserved
//! - Retries are bounded; a record past its ceiling parks in `Error`
//! - The sync flag is always released, whatever a pass does

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connectivity;
mod error;
mod executor;
mod orchestrator;
mod remote;
mod status;

pub use config::SyncConfig;
pub use connectivity::{BackgroundScheduler, BackgroundTask, ConnectivityMonitor, NoopScheduler};
pub use error::{SyncError, SyncResult};
pub use executor::SyncReport;
pub use orchestrator::{SyncOrchestrator, SyncOutcome};
pub use remote::{MockRemote, PhotoAck, RemoteAck, RemoteStore};
pub use status::SyncStatus;
