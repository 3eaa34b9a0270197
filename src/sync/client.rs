//! Device side of the sync protocol
//!
//! [`SyncClient`] pushes the [`LocalStore`] queue to the server and pulls
//! other devices' changes back. The wire is abstracted behind
//! [`SyncTransport`] so the client runs against HTTP or in-process.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use super::autosave::InFlightRecords;
use super::local::LocalStore;
use super::types::{PullRequest, PullResponse, PushRequest, PushResponse};

/// Errors raised on the device side of sync
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Sync transport failed: {0:#}")]
    Transport(#[from] anyhow::Error),

    #[error("Server rejected sync request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid change: {0}")]
    Invalid(String),

    #[error("Malformed sync payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// How a device reaches the sync endpoints
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn push(&self, request: &PushRequest) -> Result<PushResponse, SyncError>;

    async fn pull(&self, request: &PullRequest) -> Result<PullResponse, SyncError>;
}

/// Transport for the server's `/api/sync` endpoints
pub struct HttpTransport {
    client: reqwest::Client,
    /// Server root, e.g. `http://localhost:3000`
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, SyncError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to call {}", url))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::Rejected { status, message });
        }

        let parsed: R = response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))?;
        Ok(parsed)
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn push(&self, request: &PushRequest) -> Result<PushResponse, SyncError> {
        self.post("/api/sync/push", request).await
    }

    async fn pull(&self, request: &PullRequest) -> Result<PullResponse, SyncError> {
        self.post("/api/sync/pull", request).await
    }
}

/// Outcome of one push
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub accepted: usize,
    pub conflicts: usize,
    /// Records left queued because a push of them was already in flight
    pub skipped: usize,
}

/// Reconciles a device's [`LocalStore`] with the server
pub struct SyncClient {
    store: Arc<LocalStore>,
    transport: Arc<dyn SyncTransport>,
    in_flight: InFlightRecords,
}

impl SyncClient {
    pub fn new(store: Arc<LocalStore>, transport: Arc<dyn SyncTransport>) -> Self {
        Self {
            store,
            transport,
            in_flight: InFlightRecords::default(),
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Push queued operations.
    ///
    /// Records already being pushed are skipped and stay queued for the next
    /// call. On a transport failure the taken operations are queued again.
    pub async fn push_pending(&self) -> Result<PushReport, SyncError> {
        let mut report = PushReport::default();
        let mut claimed = Vec::new();
        let mut guards = Vec::new();

        for key in self.store.pending_keys().await {
            match self.in_flight.try_claim(&key) {
                Some(guard) => {
                    claimed.push(key);
                    guards.push(guard);
                }
                None => {
                    tracing::debug!("Skipping {}: push already in flight", key);
                    report.skipped += 1;
                }
            }
        }

        let operations = self.store.take_pending(&claimed).await;
        if operations.is_empty() {
            return Ok(report);
        }

        let request = PushRequest {
            user_id: self.store.user_id().to_string(),
            device_id: self.store.device_id().to_string(),
            operations,
        };

        let response = match self.transport.push(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Push of {} operations failed: {}", request.operations.len(), e);
                self.store.requeue(request.operations).await;
                return Err(e);
            }
        };

        for conflict in &response.conflicts {
            self.store.adopt(conflict).await?;
        }
        drop(guards);

        report.accepted = response.accepted.len();
        report.conflicts = response.conflicts.len();
        Ok(report)
    }

    /// Pull and apply changes from other devices; returns how many applied
    pub async fn pull(&self) -> Result<usize, SyncError> {
        let mut applied = 0;

        loop {
            let request = PullRequest {
                user_id: self.store.user_id().to_string(),
                device_id: self.store.device_id().to_string(),
                since: self.store.cursor().await,
            };
            let response = self.transport.pull(&request).await?;

            for op in &response.operations {
                if self.store.apply_remote(op).await? {
                    applied += 1;
                }
            }
            self.store.set_cursor(response.cursor).await;

            if !response.has_more || response.operations.is_empty() {
                break;
            }
        }

        Ok(applied)
    }

    /// Push, then pull
    pub async fn reconcile(&self) -> Result<(), SyncError> {
        self.push_pending().await?;
        self.pull().await?;
        Ok(())
    }
}
