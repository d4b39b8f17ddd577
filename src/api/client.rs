//! Typed client surface over the consumed REST API.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use super::resilient::ResilientClient;
use super::session::SessionManager;
use super::transport::{ApiRequest, HttpTransport, Transport};
use super::types::{Application, AuditEvent, JobFeedPage, SwipeDirection, SwipeReceipt, TokenPair};
use crate::config::{Config, RetryConfig};
use crate::error::ApiError;

pub struct ApiClient<T: Transport> {
  inner: ResilientClient<T>,
  page_size: u32,
}

impl ApiClient<HttpTransport> {
  /// Build the production client from configuration.
  pub fn from_config(config: &Config) -> color_eyre::Result<Self> {
    let transport = HttpTransport::new(
      &config.api.base_url,
      Duration::from_secs(config.api.timeout_secs),
    )?;

    Ok(Self::new(
      Arc::new(transport),
      SessionManager::new(),
      config.retry,
      config.api.page_size,
    ))
  }
}

impl<T: Transport> ApiClient<T> {
  pub fn new(
    transport: Arc<T>,
    session: SessionManager,
    retry: RetryConfig,
    page_size: u32,
  ) -> Self {
    Self {
      inner: ResilientClient::new(transport, session, retry),
      page_size,
    }
  }

  pub fn session(&self) -> &SessionManager {
    self.inner.session()
  }

  pub fn page_size(&self) -> u32 {
    self.page_size
  }

  /// Exchange credentials for a token pair and install it as the session.
  pub async fn login(&self, email: &str, password: &str) -> Result<(), ApiError> {
    let request = ApiRequest::post(
      "/v1/auth/login",
      json!({ "email": email, "password": password }),
    );
    let tokens: TokenPair = self.inner.send_unauthenticated(request).await?;
    self.session().install(tokens).await;
    tracing::info!("logged in");
    Ok(())
  }

  pub async fn logout(&self) {
    self.session().clear().await;
    tracing::info!("logged out");
  }

  /// One page of the job feed.
  pub async fn fetch_feed(&self, cursor: Option<&str>) -> Result<JobFeedPage, ApiError> {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("page_size", &self.page_size.to_string());
    if let Some(cursor) = cursor {
      query.append_pair("cursor", cursor);
    }

    self
      .inner
      .send(ApiRequest::get(format!("/v1/jobs/feed?{}", query.finish())))
      .await
  }

  /// Record a swipe on a job.
  pub async fn swipe(
    &self,
    job_id: &str,
    direction: SwipeDirection,
  ) -> Result<SwipeReceipt, ApiError> {
    let request = ApiRequest::post(
      format!("/v1/jobs/{}/swipe", job_id),
      json!({ "action": direction }),
    );
    self.inner.send(request).await
  }

  /// Applications submitted by the current user.
  pub async fn applications(&self) -> Result<Vec<Application>, ApiError> {
    self.inner.send(ApiRequest::get("/v1/applications")).await
  }

  /// Audit trail of a single application.
  pub async fn application_audit(&self, id: &str) -> Result<Vec<AuditEvent>, ApiError> {
    self
      .inner
      .send(ApiRequest::get(format!("/v1/applications/{}/audit", id)))
      .await
  }
}
