//! Design document client.
//!
//! [`DesignSource`] is the read-only seam the pipeline fetches through.
//! [`DesignClient`] is the HTTP implementation; every request carries a
//! timeout and transient failures run through the shared retry budget.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use figsync_core::{retry, DesignDocument, DocumentId, RetryPolicy};

use crate::decode::decode_document;
use crate::error::FetchError;

/// Anything that can produce a design document by id.
#[async_trait]
pub trait DesignSource: Send + Sync {
    async fn fetch(&self, document: &DocumentId) -> Result<DesignDocument, FetchError>;
}

/// HTTP client for the design tool's REST API.
#[derive(Debug, Clone)]
pub struct DesignClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    retry: RetryPolicy,
}

impl DesignClient {
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("figsync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            retry,
        })
    }

    fn file_url(&self, document: &DocumentId) -> String {
        format!("{}/v1/files/{}", self.api_base, document)
    }

    async fn fetch_once(&self, document: &DocumentId) -> Result<DesignDocument, FetchError> {
        let url = self.file_url(document);
        tracing::debug!(%document, %url, "fetching design document");
        let response = self
            .http
            .get(&url)
            .header("X-Figma-Token", &self.token)
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(FetchError::Unauthorized {
                    status: status.as_u16(),
                })
            }
            StatusCode::NOT_FOUND => {
                return Err(FetchError::NotFound {
                    document: document.clone(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(FetchError::UpstreamUnavailable {
                    reason: "rate limited (HTTP 429)".to_string(),
                })
            }
            s if s.is_server_error() => {
                return Err(FetchError::UpstreamUnavailable {
                    reason: format!("HTTP {}", s.as_u16()),
                })
            }
            s if !s.is_success() => {
                return Err(FetchError::MalformedResponse {
                    reason: format!("unexpected HTTP {}", s.as_u16()),
                })
            }
            _ => {}
        }

        let body = response.bytes().await.map_err(unavailable)?;
        decode_document(document, &body)
    }
}

#[async_trait]
impl DesignSource for DesignClient {
    async fn fetch(&self, document: &DocumentId) -> Result<DesignDocument, FetchError> {
        let fetched = retry(&self.retry, "fetch_design_document", || {
            self.fetch_once(document)
        })
        .await?;
        tracing::info!(
            %document,
            name = %fetched.name,
            version = fetched.metadata.version.as_deref().unwrap_or("-"),
            "fetched design document"
        );
        Ok(fetched)
    }
}

fn unavailable(err: reqwest::Error) -> FetchError {
    FetchError::UpstreamUnavailable {
        reason: err.to_string(),
    }
}
