//! Login/register against the backend and the persisted auth record.
//!
//! The record lives in a JSON file (default `~/.haven/auth.json`). Components never read
//! that file themselves: they receive an [`AuthSession`] built from it at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::api::{self, ApiClient, ApiError};

/// What the backend hands back after a successful login or registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRecord {
    #[serde(deserialize_with = "api::string_or_number")]
    pub user_id: String,
    pub username: String,
    pub token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthStoreError {
    #[error("auth store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("auth record at {path} is invalid: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// File-backed store for the current [`AuthRecord`].
#[derive(Debug, Clone)]
pub struct AuthStore {
    path: PathBuf,
}

impl AuthStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored record. Missing file => None.
    pub fn load(&self) -> Result<Option<AuthRecord>, AuthStoreError> {
        let s = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(AuthStoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if s.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&s)
            .map(Some)
            .map_err(|source| AuthStoreError::Parse {
                path: self.path.clone(),
                source,
            })
    }

    /// Persist the record. Creates parent dirs if needed.
    pub fn save(&self, record: &AuthRecord) -> Result<(), AuthStoreError> {
        let io_err = |source| AuthStoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let s = serde_json::to_string_pretty(record).map_err(|source| AuthStoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, s).map_err(io_err)?;
        log::debug!("saved auth record to {}", self.path.display());
        Ok(())
    }

    /// Remove the stored record (logout). Missing file is not an error.
    pub fn clear(&self) -> Result<(), AuthStoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AuthStoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Who is talking to the backend and as which agent. Passed explicitly to every component
/// that scopes requests by user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: String,
    pub username: String,
    pub token: String,
    pub agent_type: String,
}

impl AuthSession {
    pub fn new(record: AuthRecord, agent_type: impl Into<String>) -> Self {
        Self {
            user_id: record.user_id,
            username: record.username,
            token: record.token,
            agent_type: agent_type.into(),
        }
    }

    /// `user_id` + `agent_type` query pairs used by session and history endpoints.
    pub fn scope(&self) -> [(&'static str, &str); 2] {
        [
            ("user_id", self.user_id.as_str()),
            ("agent_type", self.agent_type.as_str()),
        ]
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    password: &'a str,
    invite_code: &'a str,
}

/// Calls the credential-exchange endpoints.
#[derive(Clone)]
pub struct AuthClient {
    api: ApiClient,
}

impl AuthClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// POST /api/v1/auth/login
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthRecord, ApiError> {
        let url = self.api.v1("/auth/login");
        let res = self
            .api
            .post(&url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;
        read_auth(res, "Login failed").await
    }

    /// POST /api/v1/auth/register
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        invite_code: &str,
    ) -> Result<AuthRecord, ApiError> {
        let url = self.api.v1("/auth/register");
        let res = self
            .api
            .post(&url)
            .json(&RegisterRequest {
                username,
                password,
                invite_code,
            })
            .send()
            .await?;
        read_auth(res, "Register failed").await
    }
}

/// Like `api::read_json` but with a fixed message when the backend gives no detail.
async fn read_auth(res: reqwest::Response, fallback: &str) -> Result<AuthRecord, ApiError> {
    match api::check_status(res).await {
        Ok(res) => Ok(res.json().await?),
        Err(ApiError::Api { status, detail }) if detail.is_empty() => Err(ApiError::Api {
            status,
            detail: fallback.to_string(),
        }),
        Err(e) => Err(e),
    }
}
