//! Error taxonomy for the remote API surface.

use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by the resilient API client.
///
/// `Network`, `Server` and `RateLimited` are transient and eligible for
/// retry with backoff. `Validation` is terminal and never retried.
/// `Auth` triggers a single token refresh before it becomes terminal.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
  /// Connectivity failure or attempt timeout.
  #[error("network error: {0}")]
  Network(String),

  /// Token rejected (401) and refresh did not recover it. The caller must
  /// treat this as "logged out".
  #[error("authentication required")]
  Auth,

  /// The request itself was rejected (4xx other than 401/429). Replaying
  /// it verbatim can never succeed.
  #[error("request rejected (status {status}): {message}")]
  Validation { status: u16, message: String },

  /// Server-side failure (5xx).
  #[error("server error (status {0})")]
  Server(u16),

  /// Throttled (429), with the server-provided retry hint when one was
  /// sent.
  #[error("rate limited")]
  RateLimited { retry_after: Option<Duration> },
}

impl ApiError {
  /// Whether the retry loop may attempt this request again.
  pub fn is_transient(&self) -> bool {
    matches!(
      self,
      ApiError::Network(_) | ApiError::Server(_) | ApiError::RateLimited { .. }
    )
  }

  /// Minimum delay requested by the server, if any.
  pub fn retry_hint(&self) -> Option<Duration> {
    match self {
      ApiError::RateLimited { retry_after } => *retry_after,
      _ => None,
    }
  }
}
