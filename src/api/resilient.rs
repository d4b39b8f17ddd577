//! Resilient request sending.
//!
//! Wraps the raw transport with the three behaviors every call needs:
//! bearer injection read at call time, a single refresh-and-retry on 401,
//! and bounded exponential backoff for transient failures.

use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

use super::session::SessionManager;
use super::transport::{ApiRequest, ApiResponse, Transport};
use crate::config::RetryConfig;
use crate::error::ApiError;

pub struct ResilientClient<T: Transport> {
  transport: Arc<T>,
  session: SessionManager,
  retry: RetryConfig,
}

impl<T: Transport> ResilientClient<T> {
  pub fn new(transport: Arc<T>, session: SessionManager, retry: RetryConfig) -> Self {
    Self {
      transport,
      session,
      retry,
    }
  }

  pub fn session(&self) -> &SessionManager {
    &self.session
  }

  /// Send an authenticated request and decode the JSON response.
  pub async fn send<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R, ApiError> {
    let response = self.send_raw(request, true).await?;
    serde_json::from_value(response.body)
      .map_err(|e| ApiError::Network(format!("malformed response body: {}", e)))
  }

  /// Send without credentials (login, refresh).
  pub async fn send_unauthenticated<R: DeserializeOwned>(
    &self,
    request: ApiRequest,
  ) -> Result<R, ApiError> {
    let response = self.send_raw(request, false).await?;
    serde_json::from_value(response.body)
      .map_err(|e| ApiError::Network(format!("malformed response body: {}", e)))
  }

  async fn send_raw(
    &self,
    request: ApiRequest,
    authenticated: bool,
  ) -> Result<ApiResponse, ApiError> {
    let mut attempt: u32 = 0;
    let mut refreshed = false;

    loop {
      // Bearer credential is read at call time, never cached
      let bearer = if authenticated {
        match self.session.access_token().await {
          Some(token) => Some(token),
          None => return Err(ApiError::Auth),
        }
      } else {
        None
      };

      let outcome = self
        .transport
        .execute(&request.clone().with_bearer(bearer.clone()))
        .await;

      let error = match outcome {
        Ok(response) if response.is_success() => {
          debug!("{} {} -> {}", request.method, request.path, response.status);
          return Ok(response);
        }
        Ok(response) => response.into_error(),
        Err(error) => error,
      };

      match error {
        ApiError::Auth if authenticated && !refreshed => {
          // Exactly one refresh, then replay the original request with
          // the new token. A second 401 propagates.
          refreshed = true;
          debug!("401 for {}, refreshing session", request.path);
          let stale = bearer.unwrap_or_default();
          self
            .session
            .refresh(self.transport.as_ref(), &stale)
            .await?;
        }
        error if error.is_transient() && attempt < self.retry.max_retries => {
          attempt += 1;
          let mut delay = self.retry.delay_for(attempt);
          if let Some(hint) = error.retry_hint() {
            delay = delay.max(hint);
          }
          warn!(
            "{} {} failed ({}), retry {}/{} in {:?}",
            request.method, request.path, error, attempt, self.retry.max_retries, delay
          );
          tokio::time::sleep(delay).await;
        }
        error => return Err(error),
      }
    }
  }
}
