//! Persisted message history for a session and how it is merged into local state.

use serde::{Deserialize, Serialize};

use crate::api::{self, ApiClient, ApiError};
use crate::auth::AuthSession;
use crate::message::{parse_timestamp, Message, MessageIds, Role};

/// Policy for history that arrives while local messages already exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HistoryMerge {
    /// Empty local state takes the history; otherwise the history is discarded.
    #[default]
    KeepLocal,
    /// History goes in front of whatever is already local.
    PrependHistory,
}

/// One message as stored by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// The messages endpoint answers either `{"messages": [...]}` or a bare array.
pub fn normalize_history(value: serde_json::Value) -> Vec<HistoryEntry> {
    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("messages") {
            Some(serde_json::Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

/// Give history entries local ids. Roles other than user/assistant are dropped.
pub fn to_messages(entries: Vec<HistoryEntry>, ids: &mut MessageIds) -> Vec<Message> {
    entries
        .into_iter()
        .filter_map(|e| {
            let Some(role) = Role::parse(&e.role) else {
                log::debug!("history: skipping message with role {:?}", e.role);
                return None;
            };
            let timestamp = e
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_default();
            Some(ids.build(role, e.content, timestamp))
        })
        .collect()
}

/// Apply `policy` to merge fetched `history` into `local`. Returns true if `local` changed.
pub fn merge(local: &mut Vec<Message>, history: Vec<Message>, policy: HistoryMerge) -> bool {
    if history.is_empty() {
        return false;
    }
    if local.is_empty() {
        *local = history;
        return true;
    }
    match policy {
        HistoryMerge::KeepLocal => {
            log::debug!(
                "history: {} local messages present, discarding {} fetched",
                local.len(),
                history.len()
            );
            false
        }
        HistoryMerge::PrependHistory => {
            let mut merged = history;
            merged.append(local);
            *local = merged;
            true
        }
    }
}

/// GET /api/v1/chat/sessions/{id}/messages
pub async fn fetch_history(
    api: &ApiClient,
    auth: &AuthSession,
    session_id: &str,
) -> Result<Vec<HistoryEntry>, ApiError> {
    let url = api.v1(&format!("/chat/sessions/{}/messages", session_id));
    let res = api.get(&url).query(&auth.scope()).send().await?;
    let value: serde_json::Value = api::read_json(res).await?;
    Ok(normalize_history(value))
}
