//! HTTP remote store adapter
//!
//! Speaks plain JSON CRUD against a hosted backend: `POST /{collection}`,
//! `PUT`/`GET`/`DELETE /{collection}/{id}`. Authentication is a bearer token.
//! This adapter does not provide a change feed; see [`super::ChangeFeed`].

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::models::{Conversation, EntityKind, KnowledgeItem, RemoteEntity};

use super::{RemoteError, RemoteStore};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Remote store backed by a JSON-over-HTTP backend
#[derive(Clone)]
pub struct HttpRemoteStore {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl HttpRemoteStore {
    /// Create a client for the given base URL (scheme required)
    pub fn new(base_url: impl Into<String>) -> Result<Self, RemoteError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    /// Create a client with an explicit request timeout
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| RemoteError::Unavailable(error.to_string()))?;

        Ok(Self {
            base_url,
            auth_token: None,
            client,
        })
    }

    /// Attach a bearer token to every request
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        format!("{}/{}", self.base_url, kind.collection())
    }

    fn record_url(&self, kind: EntityKind, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, kind.collection(), id)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("Accept", "application/json");
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn expect_success(
        kind: EntityKind,
        id: &str,
        response: reqwest::Response,
    ) -> Result<(), RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body, kind, id))
    }
}

#[async_trait::async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn insert(&self, record: &RemoteEntity) -> Result<(), RemoteError> {
        let response = self
            .request(self.client.post(self.collection_url(record.kind())))
            .json(&record_body(record)?)
            .send()
            .await
            .map_err(map_transport_error)?;
        Self::expect_success(record.kind(), &record.entity_id(), response).await
    }

    async fn update(&self, record: &RemoteEntity) -> Result<(), RemoteError> {
        let response = self
            .request(
                self.client
                    .put(self.record_url(record.kind(), &record.entity_id())),
            )
            .json(&record_body(record)?)
            .send()
            .await
            .map_err(map_transport_error)?;
        Self::expect_success(record.kind(), &record.entity_id(), response).await
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), RemoteError> {
        let response = self
            .request(self.client.delete(self.record_url(kind, id)))
            .send()
            .await
            .map_err(map_transport_error)?;

        // Deleting an absent record is a no-op per the store contract.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::expect_success(kind, id, response).await
    }

    async fn fetch(&self, kind: EntityKind, id: &str) -> Result<Option<RemoteEntity>, RemoteError> {
        let response = self
            .request(self.client.get(self.record_url(kind, id)))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, kind, id));
        }

        let record = match kind {
            EntityKind::Conversation => {
                RemoteEntity::Conversation(response.json::<Conversation>().await.map_err(
                    |error| RemoteError::Rejected(format!("invalid conversation payload: {error}")),
                )?)
            }
            EntityKind::KnowledgeItem => {
                RemoteEntity::KnowledgeItem(response.json::<KnowledgeItem>().await.map_err(
                    |error| {
                        RemoteError::Rejected(format!("invalid knowledge item payload: {error}"))
                    },
                )?)
            }
        };
        Ok(Some(record))
    }
}

/// Serialize the inner record without the enum tag
fn record_body(record: &RemoteEntity) -> Result<serde_json::Value, RemoteError> {
    let value = match record {
        RemoteEntity::Conversation(c) => serde_json::to_value(c),
        RemoteEntity::KnowledgeItem(k) => serde_json::to_value(k),
    };
    value.map_err(|error| RemoteError::Rejected(error.to_string()))
}

fn map_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Unavailable(error.to_string())
    }
}

/// Map an unsuccessful HTTP status to the remote error taxonomy
fn classify_status(
    status: StatusCode,
    body: &str,
    kind: EntityKind,
    id: &str,
) -> RemoteError {
    if status == StatusCode::NOT_FOUND {
        return RemoteError::NotFound {
            collection: kind.collection(),
            id: id.to_string(),
        };
    }
    if status == StatusCode::REQUEST_TIMEOUT {
        return RemoteError::Timeout;
    }
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return RemoteError::Unavailable(parse_api_error(status, body));
    }
    RemoteError::Rejected(parse_api_error(status, body))
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> Result<String, RemoteError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RemoteError::Rejected(
            "base URL must not be empty".to_string(),
        ));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::Rejected(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("api.example.com".to_string()).is_err());
    }

    #[test]
    fn normalize_base_url_trims_trailing_slash() {
        let store = HttpRemoteStore::new("https://api.example.com/v1/").unwrap();
        assert_eq!(
            store.record_url(EntityKind::Conversation, "abc"),
            "https://api.example.com/v1/conversations/abc"
        );
    }

    #[test]
    fn classify_status_maps_server_errors_as_transient() {
        let error = classify_status(
            StatusCode::SERVICE_UNAVAILABLE,
            "",
            EntityKind::Conversation,
            "abc",
        );
        assert!(error.is_retryable());
    }

    #[test]
    fn classify_status_maps_validation_as_permanent() {
        let error = classify_status(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"title required"}"#,
            EntityKind::KnowledgeItem,
            "abc",
        );
        assert!(!error.is_retryable());
        assert!(error.to_string().contains("title required"));
    }

    #[test]
    fn classify_status_maps_not_found() {
        let error = classify_status(StatusCode::NOT_FOUND, "", EntityKind::Conversation, "abc");
        assert!(matches!(error, RemoteError::NotFound { .. }));
    }

    #[test]
    fn parse_api_error_prefers_structured_message() {
        let message = parse_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"bad","message":"missing field"}"#,
        );
        assert_eq!(message, "missing field (400)");
    }

    #[test]
    fn parse_api_error_falls_back_to_body_text() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down (502)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }
}
