//! # Sync API Client
//!
//! The transport seam between the sync engine and the server.
//!
//! ```text
//! ┌──────────────────┐   push(PushRequest)      ┌───────────────────────┐
//! │ OutboxDispatcher │ ───────────────────────► │                       │
//! └──────────────────┘                          │   dyn SyncApi         │
//! ┌──────────────────┐   pull(since)            │                       │
//! │ PullApplier      │ ───────────────────────► │   HttpSyncApi (prod)  │
//! └──────────────────┘                          │   mock (tests)        │
//!                                               └───────────────────────┘
//! ```
//!
//! ## Error Mapping
//! | Outcome                         | Error                              |
//! |---------------------------------|------------------------------------|
//! | no HTTP answer (refused, DNS)   | `SyncError::Transport`             |
//! | request/connect timeout         | `SyncError::Timeout`               |
//! | non-2xx status                  | `SyncError::Http { status, body }` |
//! | 2xx with an unreadable body     | `SyncError::DeserializationFailed` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::config::RemoteSettings;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{ApiEnvelope, PullChanges, PushAck, PushRequest, PULL_PATH, PUSH_PATH};
use crate::state::format_watermark;

/// Longest error body kept in `SyncError::Http`.
const MAX_ERROR_BODY: usize = 512;

/// Remote side of the sync protocol.
#[async_trait]
pub trait SyncApi: Send + Sync {
    /// Delivers one batch of outbox events.
    async fn push(&self, request: &PushRequest) -> SyncResult<PushAck>;

    /// Fetches every change the server recorded after `since`.
    async fn pull(&self, since: DateTime<Utc>) -> SyncResult<PullChanges>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// `reqwest` client for the sync server.
#[derive(Debug, Clone)]
pub struct HttpSyncApi {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpSyncApi {
    /// Builds a client from the `[remote]` settings.
    ///
    /// ## Errors
    /// `InvalidConfig` when no base URL is set, `InvalidUrl` when it does
    /// not parse.
    pub fn new(remote: &RemoteSettings) -> SyncResult<Self> {
        let raw = remote
            .base_url
            .as_deref()
            .ok_or_else(|| SyncError::InvalidConfig("remote.base_url is not set".into()))?;

        let mut base_url = Url::parse(raw)?;
        // Url::join drops the last path segment unless it ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(remote.request_timeout())
            .connect_timeout(remote.connect_timeout())
            .build()
            .map_err(|e| SyncError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(HttpSyncApi {
            client,
            base_url,
            auth_token: remote.auth_token.clone().filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> SyncResult<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Checks the status and unwraps the `{ data }` envelope.
    async fn read_envelope<T: DeserializeOwned>(response: Response) -> SyncResult<T> {
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            warn!(status = status.as_u16(), body = %body, "Sync server returned an error");
            return Err(SyncError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let envelope: ApiEnvelope<T> = serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::DeserializationFailed(e.to_string()))?;
        Ok(envelope.into_inner())
    }
}

#[async_trait]
impl SyncApi for HttpSyncApi {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushAck> {
        let url = self.endpoint(PUSH_PATH)?;
        debug!(%url, events = request.events.len(), "POST push batch");

        let response = self
            .authorize(self.client.post(url))
            .json(request)
            .send()
            .await?;

        Self::read_envelope(response).await
    }

    async fn pull(&self, since: DateTime<Utc>) -> SyncResult<PullChanges> {
        let mut url = self.endpoint(PULL_PATH)?;
        url.query_pairs_mut()
            .append_pair("since", &format_watermark(since));
        debug!(%url, "GET pull");

        let response = self.authorize(self.client.get(url)).send().await?;

        Self::read_envelope(response).await
    }
}
