//! Chat session provisioning.
//!
//! When a meeting starts, the participants get an ephemeral chat session
//! from the chat service. Only the start notifier calls this.
//!
//! # Security
//!
//! - The scheduler authenticates with a bearer token held as a `SecretString`
//! - Timeouts prevent a slow chat service from stalling a notifier tick
//! - Response bodies from failed calls are not logged

use crate::models::Meeting;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, instrument, warn};
use uuid::Uuid;

/// Default timeout for chat service requests in seconds.
const CHAT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default connect timeout in seconds.
const CHAT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Handle passed to participants with the "starting now" notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    /// Chat service identifier of the session.
    pub session_id: String,

    /// Link participants open to join.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_url: Option<String>,

    /// When the session stops accepting messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Provisioning failure.
#[derive(Debug, Clone, Error)]
pub enum ProvisionError {
    #[error("Chat service unavailable: {0}")]
    Unavailable(String),

    #[error("Chat service rejected the request: {0}")]
    Rejected(String),

    #[error("Chat service returned an unreadable response")]
    InvalidResponse,
}

/// Opens chat sessions for starting meetings.
#[async_trait]
pub trait ChatProvisioner: Send + Sync {
    /// Open (or reuse) the session for `meeting`.
    async fn open_session(&self, meeting: &Meeting) -> Result<ChatSession, ProvisionError>;
}

/// Request body for `POST /api/v1/sessions`.
#[derive(Debug, Clone, Serialize)]
pub struct OpenSessionRequest {
    /// Meeting the session belongs to; the chat service dedups on it.
    pub meeting_id: Uuid,

    /// Conference the meeting belongs to.
    pub conference_id: Uuid,

    /// Both participant profile ids.
    pub participants: Vec<Uuid>,

    /// Meeting start.
    pub starts_at: DateTime<Utc>,

    /// Meeting length.
    pub duration_minutes: u32,
}

impl From<&Meeting> for OpenSessionRequest {
    fn from(meeting: &Meeting) -> Self {
        Self {
            meeting_id: meeting.id.0,
            conference_id: meeting.conference_id.0,
            participants: meeting.participants().iter().map(|p| p.0).collect(),
            starts_at: meeting.proposed_time,
            duration_minutes: meeting.duration_minutes,
        }
    }
}

/// HTTP client for the chat service.
#[derive(Clone)]
pub struct HttpChatProvisioner {
    /// HTTP client with configured timeouts.
    client: Client,

    /// Base URL of the chat service.
    base_url: String,

    /// Bearer token for the chat service.
    service_token: SecretString,
}

impl HttpChatProvisioner {
    /// Create a new chat client.
    ///
    /// # Errors
    ///
    /// Returns `ProvisionError::Unavailable` if the HTTP client cannot be built.
    pub fn new(base_url: String, service_token: SecretString) -> Result<Self, ProvisionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(CHAT_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CHAT_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                error!(target: "scheduler.services.chat", error = %e, "Failed to build HTTP client");
                ProvisionError::Unavailable("HTTP client unavailable".to_string())
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_token,
        })
    }

    /// Map chat service status codes to results.
    async fn handle_response(
        &self,
        response: reqwest::Response,
    ) -> Result<ChatSession, ProvisionError> {
        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| {
                error!(target: "scheduler.services.chat", error = %e, "Failed to parse chat response");
                ProvisionError::InvalidResponse
            })
        } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            warn!(target: "scheduler.services.chat", status = %status, "Chat service returned server error");
            Err(ProvisionError::Unavailable(format!("status {}", status)))
        } else if status == StatusCode::UNAUTHORIZED {
            error!(target: "scheduler.services.chat", "Scheduler service token rejected by chat service");
            Err(ProvisionError::Rejected("unauthorized".to_string()))
        } else {
            warn!(target: "scheduler.services.chat", status = %status, "Unexpected chat service response");
            Err(ProvisionError::Rejected(format!("status {}", status)))
        }
    }
}

#[async_trait]
impl ChatProvisioner for HttpChatProvisioner {
    #[instrument(skip_all, fields(meeting_id = %meeting.id))]
    async fn open_session(&self, meeting: &Meeting) -> Result<ChatSession, ProvisionError> {
        let url = format!("{}/api/v1/sessions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.service_token.expose_secret())
            .json(&OpenSessionRequest::from(meeting))
            .send()
            .await
            .map_err(|e| {
                warn!(target: "scheduler.services.chat", error = %e, "Chat request failed");
                ProvisionError::Unavailable("Chat service is unreachable".to_string())
            })?;

        self.handle_response(response).await
    }
}

/// Mock chat provisioner module for testing.
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Provisioner that replays scripted results, then succeeds.
    #[derive(Debug, Default)]
    pub struct ScriptedChatProvisioner {
        script: Mutex<VecDeque<Result<(), ProvisionError>>>,
        call_count: AtomicUsize,
    }

    impl ScriptedChatProvisioner {
        /// Provisioner that always succeeds.
        pub fn succeeding() -> Self {
            Self::default()
        }

        /// Fail the next `n` calls, then succeed.
        pub fn failing_first(n: usize) -> Self {
            let script = (0..n)
                .map(|_| Err(ProvisionError::Unavailable("scripted failure".to_string())))
                .collect();
            Self {
                script: Mutex::new(script),
                call_count: AtomicUsize::new(0),
            }
        }

        /// Get the number of calls made.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatProvisioner for ScriptedChatProvisioner {
        async fn open_session(&self, meeting: &Meeting) -> Result<ChatSession, ProvisionError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);

            let next = self
                .script
                .lock()
                .ok()
                .and_then(|mut script| script.pop_front());
            if let Some(Err(e)) = next {
                return Err(e);
            }

            Ok(ChatSession {
                session_id: format!("chat-{}", meeting.id),
                join_url: None,
                expires_at: None,
            })
        }
    }
}
