//! Wire types for the jobs API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a swipe: right applies to the job, left skips it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
  Left,
  Right,
}

impl SwipeDirection {
  pub fn as_str(&self) -> &'static str {
    match self {
      SwipeDirection::Left => "left",
      SwipeDirection::Right => "right",
    }
  }
}

/// A job card as served by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
  pub id: String,
  pub title: String,
  pub company: String,
  #[serde(default)]
  pub location: Option<String>,
  #[serde(default)]
  pub salary_range: Option<String>,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub posted_at: Option<DateTime<Utc>>,
}

/// One page of the paginated feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFeedPage {
  pub jobs: Vec<Job>,
  /// Cursor for the next page; absent on the last page
  #[serde(default)]
  pub next_cursor: Option<String>,
}

/// Server acknowledgement of a swipe.
#[derive(Debug, Clone, Deserialize)]
pub struct SwipeReceipt {
  pub job_id: String,
  pub action: SwipeDirection,
  /// Present when a right swipe opened an application
  #[serde(default)]
  pub application_id: Option<String>,
}

/// A submitted application, as listed by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct Application {
  pub id: String,
  pub job_id: String,
  pub status: String,
  pub submitted_at: DateTime<Utc>,
}

/// One entry of an application's audit trail.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditEvent {
  pub event: String,
  pub at: DateTime<Utc>,
  #[serde(default)]
  pub detail: Option<String>,
}

/// Access/refresh token pair returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
  pub access_token: String,
  pub refresh_token: String,
}
