// HTTP client wrapper for the notification API

use std::time::Duration;

use bellsync_core::{SyncConfig, SyncError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

const X_REQUESTED_WITH: HeaderName = HeaderName::from_static("x-requested-with");
const X_CSRF_TOKEN: HeaderName = HeaderName::from_static("x-csrf-token");

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not found")]
    NotFound,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Transport failure or a non-2xx answer
    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Http(_) | ClientError::Api { .. })
    }
}

impl From<ClientError> for SyncError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotFound => SyncError::not_found("notification"),
            ClientError::Decode(msg) => SyncError::decode(msg),
            ClientError::Config(msg) => SyncError::config(msg),
            other => SyncError::network(other.to_string()),
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Debug, Clone)]
pub struct HttpClientBuilder {
    base_url: String,
    csrf_token: Option<String>,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpClientBuilder {
    pub fn csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<HttpClient, ClientError> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| ClientError::Config(format!("invalid base url '{}': {}", self.base_url, e)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "base url must be http(s), got '{}'",
                base.scheme()
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(X_REQUESTED_WITH, HeaderValue::from_static("XMLHttpRequest"));
        if let Some(token) = &self.csrf_token {
            headers.insert(X_CSRF_TOKEN, header_value(token)?);
        }
        if let Some(token) = &self.auth_token {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .build()?;

        Ok(HttpClient {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

fn header_value(raw: &str) -> Result<HeaderValue, ClientError> {
    let mut value = HeaderValue::from_str(raw)
        .map_err(|_| ClientError::Config("header value contains invalid characters".to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Clone)]
pub struct HttpClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpClient {
    pub fn builder(base_url: impl Into<String>) -> HttpClientBuilder {
        HttpClientBuilder {
            base_url: base_url.into(),
            csrf_token: None,
            auth_token: None,
            timeout: bellsync_core::config::DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::builder(base_url).build()
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, ClientError> {
        let mut builder = Self::builder(config.api_url.clone()).timeout(config.request_timeout);
        if let Some(token) = &config.csrf_token {
            builder = builder.csrf_token(token.clone());
        }
        if let Some(token) = &config.auth_token {
            builder = builder.auth_token(token.clone());
        }
        builder.build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self.http.get(&url).query(query).send().await?;
        self.handle_response(response).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ClientError> {
        let url = self.url(path);
        debug!(%url, "PATCH");
        let mut request = self.http.patch(&url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        self.handle_response(response).await
    }

    pub async fn delete<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ClientError> {
        let url = self.url(path);
        debug!(%url, "DELETE");
        let mut request = self.http.delete(&url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        self.handle_response(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

/// Prefer the `message` of a JSON error body, fall back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<bellsync_schemas::ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_rejects_bad_urls() {
        assert!(matches!(
            HttpClient::new("not a url"),
            Err(ClientError::Config(_))
        ));
        assert!(matches!(
            HttpClient::new("ftp://example.test"),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let client = HttpClient::new("https://app.test/notification/").unwrap();
        assert_eq!(client.base_url(), "https://app.test/notification");
    }

    #[test]
    fn test_error_message_prefers_json_message() {
        assert_eq!(
            error_message(r#"{"success":false,"message":"Nope","code":"X"}"#),
            "Nope"
        );
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_into_sync_error() {
        let err: SyncError = ClientError::NotFound.into();
        assert!(matches!(err, SyncError::NotFound(_)));

        let err: SyncError = ClientError::Api {
            status: 500,
            message: "boom".into(),
        }
        .into();
        assert!(err.is_network());
    }
}
