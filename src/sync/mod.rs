//! Offline-first multi-device sync
//!
//! The server keeps a per-user operation log ([`SyncService`]); devices keep a
//! [`LocalStore`] and reconcile through a [`SyncClient`], usually driven by an
//! [`AutoSaver`]. Conflicts resolve last-write-wins by record timestamp.

mod autosave;
mod client;
mod conflict;
mod local;
mod service;
mod store;
mod types;

pub use autosave::{AutoSaver, InFlightGuard, InFlightRecords, SyncHandle, MIN_SYNC_INTERVAL};
pub use client::{HttpTransport, PushReport, SyncClient, SyncError, SyncTransport};
pub use conflict::ConflictResolver;
pub use local::LocalStore;
pub use service::SyncService;
pub use store::{
    append_operation, server_operation, SyncRepository, PULL_BATCH_SIZE, SERVER_DEVICE_ID,
};
pub use types::*;
