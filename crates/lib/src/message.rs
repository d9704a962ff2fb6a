//! Local chat message model.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Locally generated message id. Unique within one chat view only; never sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Hands out increasing [`MessageId`]s.
#[derive(Debug, Default)]
pub struct MessageIds {
    next: u64,
}

impl MessageIds {
    pub fn next_id(&mut self) -> MessageId {
        self.next += 1;
        MessageId(self.next)
    }

    pub fn user(&mut self, content: impl Into<String>) -> Message {
        self.build(Role::User, content.into(), Utc::now())
    }

    pub fn assistant(&mut self, content: impl Into<String>) -> Message {
        self.build(Role::Assistant, content.into(), Utc::now())
    }

    pub fn build(&mut self, role: Role, content: String, timestamp: DateTime<Utc>) -> Message {
        Message {
            id: self.next_id(),
            role,
            content,
            timestamp,
        }
    }
}

/// Parse a backend timestamp: RFC 3339, or an ISO datetime without offset (read as UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
