//! HTTP transport seam.
//!
//! A small trait the resilient client sends through: implementations
//! perform exactly one attempt; retry and auth policy live above this seam.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::error::ApiError;

/// An outgoing API request. The bearer credential is attached by the
/// resilient client at send time, never cached at construction.
#[derive(Debug, Clone)]
pub struct ApiRequest {
  pub method: Method,
  pub path: String,
  pub body: Option<Value>,
  pub bearer: Option<String>,
}

impl ApiRequest {
  pub fn get(path: impl Into<String>) -> Self {
    Self {
      method: Method::GET,
      path: path.into(),
      body: None,
      bearer: None,
    }
  }

  pub fn post(path: impl Into<String>, body: Value) -> Self {
    Self {
      method: Method::POST,
      path: path.into(),
      body: Some(body),
      bearer: None,
    }
  }

  pub(crate) fn with_bearer(mut self, token: Option<String>) -> Self {
    self.bearer = token;
    self
  }
}

/// A decoded API response: status, parsed JSON body, and the throttle hint
/// when the server sent one.
#[derive(Debug, Clone)]
pub struct ApiResponse {
  pub status: u16,
  pub body: Value,
  pub retry_after: Option<Duration>,
}

impl ApiResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Classify a non-success response into the error taxonomy.
  pub fn into_error(self) -> ApiError {
    match self.status {
      401 => ApiError::Auth,
      429 => ApiError::RateLimited {
        retry_after: self.retry_after,
      },
      s if (500..600).contains(&s) => ApiError::Server(s),
      s => {
        let message = self
          .body
          .get("error")
          .and_then(Value::as_str)
          .map(str::to_string)
          .unwrap_or_else(|| self.body.to_string());
        ApiError::Validation { status: s, message }
      }
    }
  }
}

/// Raw request execution, one attempt per call.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// reqwest-backed transport with a fixed per-attempt timeout.
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpTransport {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
    let base_url =
      Url::parse(base_url).map_err(|e| eyre!("Invalid API base URL {}: {}", base_url, e))?;

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { client, base_url })
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
    let url = self
      .base_url
      .join(&request.path)
      .map_err(|e| ApiError::Network(format!("invalid request path {}: {}", request.path, e)))?;

    let mut builder = self.client.request(request.method.clone(), url);
    if let Some(token) = &request.bearer {
      builder = builder.bearer_auth(token);
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder.send().await.map_err(|e| {
      if e.is_timeout() {
        ApiError::Network(format!("request timed out: {}", e))
      } else {
        ApiError::Network(e.to_string())
      }
    })?;

    let status = response.status().as_u16();
    let retry_after = response
      .headers()
      .get(reqwest::header::RETRY_AFTER)
      .and_then(|v| v.to_str().ok())
      .and_then(|s| s.parse::<u64>().ok())
      .map(Duration::from_secs);

    let text = response
      .text()
      .await
      .map_err(|e| ApiError::Network(e.to_string()))?;
    let body = if text.is_empty() {
      Value::Null
    } else {
      serde_json::from_str(&text).unwrap_or(Value::String(text))
    };

    Ok(ApiResponse {
      status,
      body,
      retry_after,
    })
  }
}
