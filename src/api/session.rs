//! Auth session lifecycle: token pair storage and single-flight refresh.

use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::transport::{ApiRequest, Transport};
use super::types::TokenPair;
use crate::error::ApiError;

/// The current access/refresh token pair.
///
/// Rotated atomically: a refresh replaces both tokens under one lock
/// acquisition or neither.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
  pub access_token: String,
  pub refresh_token: String,
}

impl From<TokenPair> for AuthSession {
  fn from(tokens: TokenPair) -> Self {
    Self {
      access_token: tokens.access_token,
      refresh_token: tokens.refresh_token,
    }
  }
}

/// Holds the session and serializes token refresh.
///
/// The async lock is held across the refresh request, so concurrent 401s
/// queue up behind a single `/v1/auth/refresh` call and reuse its result
/// instead of racing their own.
#[derive(Clone, Default)]
pub struct SessionManager {
  inner: Arc<Mutex<Option<AuthSession>>>,
}

impl SessionManager {
  pub fn new() -> Self {
    Self::default()
  }

  /// Install a fresh token pair (login or session restore).
  pub async fn install(&self, tokens: TokenPair) {
    *self.inner.lock().await = Some(tokens.into());
  }

  /// Drop the session (logout or irrecoverable refresh failure).
  pub async fn clear(&self) {
    *self.inner.lock().await = None;
  }

  /// The access token as of right now.
  pub async fn access_token(&self) -> Option<String> {
    self.inner.lock().await.as_ref().map(|s| s.access_token.clone())
  }

  pub async fn is_authenticated(&self) -> bool {
    self.inner.lock().await.is_some()
  }

  /// Rotate the token pair after a 401.
  ///
  /// `stale_access` is the token the rejected request used. If the stored
  /// token already differs, another caller refreshed while we waited for
  /// the lock and the new token is returned without a second refresh call.
  ///
  /// A rejected refresh clears the session; a transport failure keeps it,
  /// since the tokens may still be good once connectivity returns.
  pub async fn refresh<T: Transport>(
    &self,
    transport: &T,
    stale_access: &str,
  ) -> Result<String, ApiError> {
    let mut guard = self.inner.lock().await;

    let session = guard.as_ref().ok_or(ApiError::Auth)?;
    if session.access_token != stale_access {
      return Ok(session.access_token.clone());
    }

    let request = ApiRequest {
      method: Method::POST,
      path: "/v1/auth/refresh".to_string(),
      body: Some(json!({ "refresh_token": session.refresh_token })),
      bearer: None,
    };

    match transport.execute(&request).await {
      Ok(response) if response.is_success() => {
        let tokens: TokenPair = serde_json::from_value(response.body)
          .map_err(|e| ApiError::Network(format!("malformed refresh response: {}", e)))?;
        let access = tokens.access_token.clone();
        *guard = Some(tokens.into());
        tracing::info!("auth session refreshed");
        Ok(access)
      }
      Ok(response) => {
        let status = response.status;
        let error = response.into_error();
        if error.is_transient() {
          return Err(error);
        }
        tracing::warn!("token refresh rejected (status {}), clearing session", status);
        *guard = None;
        Err(ApiError::Auth)
      }
      Err(error) => Err(error),
    }
  }
}
