//! Chat session directory: list, create, and delete sessions on the backend, and keep a
//! local mirror ordered by recency.
//!
//! The mirror is invalidated by bumping a generation counter; [`SessionDirectory::is_stale`]
//! tells callers whether the list they hold predates the latest invalidation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{self, ApiClient, ApiError};
use crate::auth::AuthSession;
use crate::message::parse_timestamp;

/// Unique session identifier (opaque string).
pub type SessionId = String;

/// Prompt shown before a session is deleted.
pub const DELETE_SESSION_PROMPT: &str =
    "Are you sure you want to delete this session? This action cannot be undone.";

/// A persisted conversation thread, as the backend describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    /// Backend row id, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "api::opt_string_or_number")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub agent_type: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Session {
    /// `updated_at`, falling back to `created_at` when missing or empty; unparsable => epoch zero.
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        let raw = self
            .updated_at
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.created_at.as_deref())
            .unwrap_or("");
        parse_timestamp(raw).unwrap_or_default()
    }

    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or("Untitled Session")
    }
}

/// Sort newest first by effective timestamp. Stable, so ties keep backend order.
pub fn sort_by_recency(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| b.effective_timestamp().cmp(&a.effective_timestamp()));
}

/// The list endpoint answers either `{"sessions": [...]}` or a bare array.
pub fn normalize_session_list(value: serde_json::Value) -> Vec<Session> {
    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("sessions") {
            Some(serde_json::Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Session>(item) {
            Ok(s) => Some(s),
            Err(e) => {
                log::warn!("sessions: skipping malformed entry: {}", e);
                None
            }
        })
        .collect()
}

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The user declined the confirmation; nothing was sent.
    Declined,
    /// The backend call failed; the local entry was kept.
    Failed,
}

/// Client for `/api/v1/chat/sessions` plus the local mirror.
pub struct SessionDirectory {
    api: ApiClient,
    auth: AuthSession,
    sessions: Vec<Session>,
    generation: u64,
    loaded_generation: Option<u64>,
}

impl SessionDirectory {
    pub fn new(api: ApiClient, auth: AuthSession) -> Self {
        Self {
            api,
            auth,
            sessions: Vec::new(),
            generation: 0,
            loaded_generation: None,
        }
    }

    /// Mirrored sessions, newest first.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.session_id == session_id)
    }

    /// Mark the mirror out of date.
    pub fn invalidate(&mut self) {
        self.generation += 1;
    }

    /// True if the mirror was never loaded or predates the latest invalidation.
    pub fn is_stale(&self) -> bool {
        self.loaded_generation != Some(self.generation)
    }

    /// GET /api/v1/chat/sessions: fetch, normalize and sort newest first.
    pub async fn list(&self) -> Result<Vec<Session>, ApiError> {
        let url = self.api.v1("/chat/sessions");
        let res = self.api.get(&url).query(&self.auth.scope()).send().await?;
        let value: serde_json::Value = api::read_json(res).await?;
        let mut sessions = normalize_session_list(value);
        sort_by_recency(&mut sessions);
        log::debug!("sessions: listed {}", sessions.len());
        Ok(sessions)
    }

    /// Reload the mirror from the backend.
    pub async fn refresh(&mut self) -> Result<&[Session], ApiError> {
        let generation = self.generation;
        self.sessions = self.list().await?;
        self.loaded_generation = Some(generation);
        Ok(&self.sessions)
    }

    /// Refresh only when stale. Errors are logged and the old mirror kept.
    pub async fn refresh_if_stale(&mut self) -> &[Session] {
        if self.is_stale() {
            if let Err(e) = self.refresh().await {
                log::error!("failed to load sessions: {}", e);
            }
        }
        &self.sessions
    }

    /// POST /api/v1/chat/sessions: create and put at the top of the mirror.
    pub async fn create(&mut self, title: &str) -> Result<Session, ApiError> {
        let url = self.api.v1("/chat/sessions");
        let res = self
            .api
            .post(&url)
            .query(&[
                ("agent_type", self.auth.agent_type.as_str()),
                ("user_id", self.auth.user_id.as_str()),
                ("title", title),
            ])
            .send()
            .await?;
        let session: Session = api::read_json(res).await?;
        if session.session_id.is_empty() {
            return Err(ApiError::Rejected(
                "create session response has no session_id".to_string(),
            ));
        }
        log::info!("sessions: created {}", session.session_id);
        self.sessions.retain(|s| s.session_id != session.session_id);
        self.sessions.insert(0, session.clone());
        Ok(session)
    }

    /// DELETE /api/v1/chat/sessions/{id} after `confirm` agrees. On success the entry leaves
    /// the mirror; on failure it stays.
    pub async fn delete(
        &mut self,
        session_id: &str,
        confirm: impl FnOnce(&str) -> bool,
    ) -> DeleteOutcome {
        if !confirm(DELETE_SESSION_PROMPT) {
            return DeleteOutcome::Declined;
        }
        let url = self.api.v1(&format!("/chat/sessions/{}", session_id));
        let res = self
            .api
            .delete(&url)
            .query(&self.auth.scope())
            .send()
            .await;
        let res = match res {
            Ok(res) => api::check_status(res).await,
            Err(e) => Err(ApiError::from(e)),
        };
        match res {
            Ok(_) => {
                self.sessions.retain(|s| s.session_id != session_id);
                log::info!("sessions: deleted {}", session_id);
                DeleteOutcome::Deleted
            }
            Err(e) => {
                log::error!("failed to delete session {}: {}", session_id, e);
                DeleteOutcome::Failed
            }
        }
    }
}
