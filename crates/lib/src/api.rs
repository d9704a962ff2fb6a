//! Shared HTTP plumbing for the backend API: base URL, bearer token, status checks,
//! and error detail extraction.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::config::DEFAULT_API_URL;

/// Prefix of the versioned backend API.
pub const API_PREFIX: &str = "/api/v1";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend api error: {status} {detail}")]
    Api { status: u16, detail: String },
    #[error("backend rejected request: {0}")]
    Rejected(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client for the backend HTTP API. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Self {
            base_url,
            token: None,
            client: reqwest::Client::new(),
        }
    }

    /// Attach a bearer token to every request made through this client.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a path under the versioned API (`/api/v1` + path).
    pub fn v1(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    /// Absolute URL for a path relative to the server root.
    pub fn root(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.get(url))
    }

    pub fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.post(url))
    }

    pub fn delete(&self, url: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.delete(url))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }
}

/// Turn a non-success response into `ApiError::Api`, preferring the backend's `detail` field.
pub async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status().as_u16();
    let body = res.text().await.unwrap_or_default();
    Err(ApiError::Api {
        status,
        detail: error_detail(&body),
    })
}

/// Check status and decode the JSON body.
pub async fn read_json<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, ApiError> {
    let res = check_status(res).await?;
    Ok(res.json().await?)
}

/// `detail` string from a FastAPI-style error body, or the raw body when it is not JSON.
/// A JSON body without `detail` gives an empty string.
pub fn error_detail(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(v) => match v.get("detail") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        },
        Err(_) => body.trim().to_string(),
    }
}

/// Accept a JSON string or number and keep it as a string (backend ids are ints, clients treat them as opaque).
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        S(String),
        N(serde_json::Number),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::S(s) => s,
        Raw::N(n) => n.to_string(),
    })
}

/// Optional variant of [`string_or_number`]; null or missing gives None.
pub(crate) fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        S(String),
        N(serde_json::Number),
    }
    Ok(Option::<Raw>::deserialize(deserializer)?.map(|r| match r {
        Raw::S(s) => s,
        Raw::N(n) => n.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_is_extracted_from_json_body() {
        assert_eq!(error_detail(r#"{"detail":"Incorrect password"}"#), "Incorrect password");
        assert_eq!(error_detail("Bad Gateway\n"), "Bad Gateway");
        assert_eq!(error_detail(r#"{"detail":[{"loc":"x"}]}"#), r#"[{"loc":"x"}]"#);
        assert_eq!(error_detail(r#"{"message":"nope"}"#), "");
        assert_eq!(error_detail(""), "");
    }

    #[test]
    fn urls_are_joined_without_double_slash() {
        let api = ApiClient::new(Some("http://localhost:8001/".to_string()));
        assert_eq!(api.v1("/chat/stream"), "http://localhost:8001/api/v1/chat/stream");
        assert_eq!(api.root("/agent-tools/"), "http://localhost:8001/agent-tools/");
    }

    #[test]
    fn ids_accept_numbers_and_strings() {
        #[derive(Deserialize)]
        struct T {
            #[serde(deserialize_with = "string_or_number")]
            id: String,
            #[serde(default, deserialize_with = "opt_string_or_number")]
            other: Option<String>,
        }
        let t: T = serde_json::from_str(r#"{"id":7}"#).unwrap();
        assert_eq!(t.id, "7");
        assert!(t.other.is_none());
        let t: T = serde_json::from_str(r#"{"id":"abc","other":3}"#).unwrap();
        assert_eq!(t.id, "abc");
        assert_eq!(t.other.as_deref(), Some("3"));
    }
}
