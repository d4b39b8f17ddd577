//! Orchestration of the offline-first sync flow.
//!
//! A user mutation is sent immediately when possible; a transient failure
//! parks it in the durable queue. Connectivity transitions (and manual
//! triggers) drain the queue in FIFO order, stopping at the first failure
//! so a failed action is never bypassed.

pub mod undo;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::cache::FeedKey;
use crate::api::client::ApiClient;
use crate::api::transport::Transport;
use crate::api::types::{Application, AuditEvent, Job, JobFeedPage, SwipeDirection};
use crate::cache::{CacheKey, CacheLayer, CacheResult, SqliteCacheStore};
use crate::config::Config;
use crate::db::Database;
use crate::error::ApiError;
use crate::net::ConnectivityEvents;
use crate::queue::{ActionKind, ActionQueue, QueuedAction};
use self::undo::{UndoBuffer, UndoableAction};

/// Metadata key for the last successful drain completion time.
const LAST_SYNC_AT: &str = "last_sync_at";

/// Outcome of an immediate send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
  /// The action reached the server.
  Sent,
  /// Transient failure: the action is saved locally and will sync later.
  Queued,
}

/// Result of one drain pass.
#[derive(Debug)]
pub enum DrainReport {
  /// Every queued action was confirmed by the server.
  Completed { sent: usize },
  /// The drain halted at the current head; it and everything behind it
  /// stay queued for the next trigger.
  Stopped {
    sent: usize,
    remaining: usize,
    error: ApiError,
  },
  /// Another drain was already in flight; this trigger was a no-op.
  SkippedBusy,
}

/// What an undo actually did.
#[derive(Debug, Clone)]
pub struct UndoneAction {
  pub action: QueuedAction,
  /// Whether the card went back into the cached feed
  pub restored_card: bool,
  /// Whether the action was still waiting in the queue at undo time.
  /// It stays queued either way; only the local view is reversed.
  pub still_queued: bool,
}

/// Coordinates the queue, the cache, the undo buffer and the API client.
///
/// Owns queue mutation exclusively: the UI layer observes queue state and
/// issues undo requests, nothing else. Constructed explicitly and passed
/// around; no process-wide instances.
pub struct SyncCoordinator<T: Transport> {
  api: ApiClient<T>,
  queue: ActionQueue,
  cache: CacheLayer<SqliteCacheStore>,
  undo: UndoBuffer,
  db: Arc<Database>,
  undo_window: Duration,
  feed_ttl: Duration,
  drain_lock: tokio::sync::Mutex<()>,
}

impl<T: Transport> SyncCoordinator<T> {
  pub fn new(api: ApiClient<T>, db: Arc<Database>, config: &Config) -> Self {
    Self {
      api,
      queue: ActionQueue::new(Arc::clone(&db)),
      cache: CacheLayer::new(SqliteCacheStore::new(Arc::clone(&db))),
      undo: UndoBuffer::new(),
      db,
      undo_window: config.undo_window(),
      feed_ttl: config.cache.feed_ttl(),
      drain_lock: tokio::sync::Mutex::new(()),
    }
  }

  /// Record a swipe: optimistic local update, then immediate send with
  /// queue fallback.
  ///
  /// The card leaves the cached feed right away regardless of the send
  /// outcome; [`undo`] can re-insert it within the window. A transient
  /// failure queues the action ("saved, will sync"); a validation or auth
  /// failure is a hard error, since it would fail identically on replay.
  ///
  /// [`undo`]: SyncCoordinator::undo
  pub async fn submit_swipe(
    &self,
    job_id: &str,
    direction: SwipeDirection,
  ) -> Result<SubmitOutcome> {
    let action = QueuedAction::new(ActionKind::Swipe {
      job_id: job_id.to_string(),
      direction,
    });

    let card = self.remove_job_from_cached_feed(job_id)?;
    self.undo.record(
      UndoableAction {
        action: action.clone(),
        card,
      },
      self.undo_window,
    );

    match self.api.swipe(job_id, direction).await {
      Ok(receipt) => {
        info!(
          "swipe {} on {} acknowledged{}",
          direction.as_str(),
          job_id,
          receipt
            .application_id
            .as_deref()
            .map(|id| format!(" (application {})", id))
            .unwrap_or_default()
        );
        Ok(SubmitOutcome::Sent)
      }
      Err(error) if error.is_transient() => {
        info!("swipe on {} saved for later sync ({})", job_id, error);
        self.queue.enqueue(&action)?;
        Ok(SubmitOutcome::Queued)
      }
      Err(error) => {
        warn!("swipe on {} rejected: {}", job_id, error);
        Err(error.into())
      }
    }
  }

  /// Replay the queue head-to-tail, stopping at the first failure.
  ///
  /// At most one drain runs at a time; an overlapping trigger returns
  /// [`DrainReport::SkippedBusy`] instead of queueing a second pass. Each
  /// confirmed action is removed with its own durable write, so a crash
  /// mid-drain loses at most the in-flight action's bookkeeping.
  pub async fn drain(&self) -> Result<DrainReport> {
    let _guard = match self.drain_lock.try_lock() {
      Ok(guard) => guard,
      Err(_) => {
        debug!("drain already in progress, skipping trigger");
        return Ok(DrainReport::SkippedBusy);
      }
    };

    let mut sent = 0usize;
    loop {
      let action = match self.queue.peek_oldest()? {
        Some(action) => action,
        None => break,
      };

      match self.replay(&action).await {
        Ok(()) => {
          if !self.queue.remove_oldest(&action.id)? {
            warn!("queue head moved underneath drain, re-reading");
          }
          sent += 1;
        }
        Err(error) => {
          // The failed action is not bypassed: later actions may depend
          // on it (e.g. the same job's state transition).
          let remaining = self.queue.len()?;
          warn!(
            "drain stopped after {} actions, {} remain: {}",
            sent, remaining, error
          );
          return Ok(DrainReport::Stopped {
            sent,
            remaining,
            error,
          });
        }
      }
    }

    self.db.set_meta(LAST_SYNC_AT, &Utc::now().to_rfc3339())?;
    if sent > 0 {
      info!("drain complete, {} actions synced", sent);
    }
    Ok(DrainReport::Completed { sent })
  }

  /// Send one queued action. A failure here is already post-retry.
  async fn replay(&self, action: &QueuedAction) -> Result<(), ApiError> {
    match &action.kind {
      ActionKind::Swipe { job_id, direction } => {
        self.api.swipe(job_id, *direction).await.map(|_| ())
      }
    }
  }

  /// Drive drains from connectivity events until the monitor goes away.
  ///
  /// The subscription delivers the current status up front, so a device
  /// that starts online drains immediately; afterwards every
  /// offline-to-online transition triggers a pass.
  pub async fn run_auto_drain(&self, mut events: ConnectivityEvents) {
    while let Some(status) = events.next().await {
      if status.is_online() {
        if let Err(error) = self.drain().await {
          warn!("connectivity-triggered drain failed: {:?}", error);
        }
      }
    }
    debug!("connectivity monitor gone, auto-drain stopped");
  }

  /// Reverse the most recent action's local effect, if the undo window is
  /// still open.
  ///
  /// Only the observable local state comes back: the card is re-inserted
  /// into the cached feed. A queued action still replays and an
  /// already-sent swipe stays applied server-side; retracting it would
  /// need a compensating call the API does not offer.
  pub fn undo(&self) -> Result<Option<UndoneAction>> {
    let undoable = match self.undo.try_undo() {
      Some(undoable) => undoable,
      None => return Ok(None),
    };

    let restored_card = match &undoable.card {
      Some(job) => self.restore_job_to_cached_feed(job)?,
      None => false,
    };
    let still_queued = self.queue.contains(&undoable.action.id)?;

    info!(
      "undid swipe on {} (card restored: {}, still queued: {})",
      undoable.action.kind.job_id(),
      restored_card,
      still_queued
    );

    Ok(Some(UndoneAction {
      action: undoable.action,
      restored_card,
      still_queued,
    }))
  }

  /// Whether an undoable action is currently held.
  pub fn is_undo_armed(&self) -> bool {
    self.undo.is_armed()
  }

  /// A page of the job feed, served read-through from the local cache.
  pub async fn feed(&self, cursor: Option<&str>) -> Result<CacheResult<JobFeedPage>> {
    let key = FeedKey::page(cursor, self.api.page_size());
    self
      .cache
      .fetch_with(&key, Some(self.feed_ttl), || async {
        self
          .api
          .fetch_feed(cursor)
          .await
          .map_err(color_eyre::Report::from)
      })
      .await
  }

  /// Applications submitted by the current user (read model, uncached).
  pub async fn applications(&self) -> Result<Vec<Application>, ApiError> {
    self.api.applications().await
  }

  /// Audit trail of one application (read model, uncached).
  pub async fn application_audit(&self, id: &str) -> Result<Vec<AuditEvent>, ApiError> {
    self.api.application_audit(id).await
  }

  /// Log in through the API client.
  pub async fn login(&self, email: &str, password: &str) -> Result<(), ApiError> {
    self.api.login(email, password).await
  }

  pub async fn logout(&self) {
    self.api.logout().await;
  }

  /// Pending actions in replay order, for UI observation.
  pub fn pending_actions(&self) -> Result<Vec<QueuedAction>> {
    self.queue.list_all()
  }

  pub fn pending_count(&self) -> Result<usize> {
    self.queue.len()
  }

  /// When the queue last drained to empty.
  pub fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>> {
    match self.db.get_meta(LAST_SYNC_AT)? {
      Some(raw) => DateTime::parse_from_rfc3339(&raw)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|e| eyre!("Invalid last_sync_at value '{}': {}", raw, e)),
      None => Ok(None),
    }
  }

  /// Drop a job from every cached feed page, returning the card from the
  /// first page that held it.
  fn remove_job_from_cached_feed(&self, job_id: &str) -> Result<Option<Job>> {
    let mut removed: Option<Job> = None;

    for key in self.cache.keys_in_domain("feed")? {
      self.cache.modify_raw::<JobFeedPage, _>(&key, |page| {
        match page.jobs.iter().position(|job| job.id == job_id) {
          Some(index) => {
            let card = page.jobs.remove(index);
            if removed.is_none() {
              removed = Some(card);
            }
            true
          }
          None => false,
        }
      })?;
    }

    Ok(removed)
  }

  /// Re-insert a card at the head of the cached front page.
  fn restore_job_to_cached_feed(&self, job: &Job) -> Result<bool> {
    let key = FeedKey::page(None, self.api.page_size()).storage_key();
    self.cache.modify_raw::<JobFeedPage, _>(&key, |page| {
      if page.jobs.iter().any(|existing| existing.id == job.id) {
        return false;
      }
      page.jobs.insert(0, job.clone());
      true
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::session::SessionManager;
  use crate::api::transport::testing::MockTransport;
  use crate::api::transport::{ApiRequest, ApiResponse};
  use crate::api::types::TokenPair;
  use crate::cache::CacheSource;
  use crate::config::{ApiConfig, CacheConfig, RetryConfig};
  use crate::net::{ConnectivityMonitor, NetStatus};
  use serde_json::{json, Value};
  use std::sync::atomic::{AtomicBool, Ordering};

  fn test_config() -> Config {
    Config {
      api: ApiConfig {
        base_url: "http://api.test".to_string(),
        timeout_secs: 30,
        page_size: 3,
      },
      retry: RetryConfig::default(),
      cache: CacheConfig::default(),
      undo_window_secs: 3,
      data_dir: None,
    }
  }

  async fn coordinator_with(
    transport: Arc<MockTransport>,
    config: Config,
  ) -> SyncCoordinator<MockTransport> {
    let session = SessionManager::new();
    session
      .install(TokenPair {
        access_token: "tok".to_string(),
        refresh_token: "ref".to_string(),
      })
      .await;

    let api = ApiClient::new(transport, session, config.retry, config.api.page_size);
    let db = Arc::new(Database::open_in_memory().expect("open"));
    SyncCoordinator::new(api, db, &config)
  }

  async fn coordinator(transport: Arc<MockTransport>) -> SyncCoordinator<MockTransport> {
    coordinator_with(transport, test_config()).await
  }

  fn swipe_ok(req: &ApiRequest) -> Result<ApiResponse, ApiError> {
    let job_id = req
      .path
      .trim_start_matches("/v1/jobs/")
      .trim_end_matches("/swipe");
    MockTransport::ok(json!({
      "job_id": job_id,
      "action": req.body.as_ref().unwrap()["action"],
    }))
  }

  fn feed_page(jobs: &[&str]) -> Value {
    json!({
      "jobs": jobs
        .iter()
        .map(|id| json!({"id": id, "title": format!("Job {}", id), "company": "Acme"}))
        .collect::<Vec<_>>(),
      "next_cursor": null,
    })
  }

  fn queued_swipe(job_id: &str, direction: SwipeDirection) -> QueuedAction {
    QueuedAction::new(ActionKind::Swipe {
      job_id: job_id.to_string(),
      direction,
    })
  }

  #[tokio::test]
  async fn successful_immediate_send_is_not_queued() {
    let transport = Arc::new(MockTransport::with_handler(swipe_ok));
    let coord = coordinator(Arc::clone(&transport)).await;

    let outcome = coord
      .submit_swipe("J1", SwipeDirection::Right)
      .await
      .expect("submit");

    assert_eq!(outcome, SubmitOutcome::Sent);
    assert_eq!(coord.pending_count().expect("len"), 0);
    assert_eq!(transport.calls_to("/v1/jobs/J1/swipe"), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn transient_failure_falls_back_to_queue() {
    let transport = Arc::new(MockTransport::with_handler(|_| {
      Err(ApiError::Network("no route to host".to_string()))
    }));
    let coord = coordinator(Arc::clone(&transport)).await;

    let outcome = coord
      .submit_swipe("J1", SwipeDirection::Right)
      .await
      .expect("submit");

    assert_eq!(outcome, SubmitOutcome::Queued);

    let pending = coord.pending_actions().expect("list");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind.job_id(), "J1");
  }

  #[tokio::test]
  async fn validation_failure_is_a_hard_error() {
    let transport = Arc::new(MockTransport::with_handler(|_| {
      MockTransport::status(422, json!({"error": "unknown job"}))
    }));
    let coord = coordinator(Arc::clone(&transport)).await;

    let result = coord.submit_swipe("J9", SwipeDirection::Left).await;

    let error = result.expect_err("validation must surface");
    assert!(matches!(
      error.downcast_ref::<ApiError>(),
      Some(ApiError::Validation { status: 422, .. })
    ));
    // Blind replay could never succeed, so nothing was queued
    assert_eq!(coord.pending_count().expect("len"), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn drain_preserves_order_and_stops_at_first_failure() {
    let transport = Arc::new(MockTransport::with_handler(|req| {
      if req.path.contains("/jobs/J3/") {
        MockTransport::status(503, Value::Null)
      } else {
        swipe_ok(req)
      }
    }));
    let coord = coordinator(Arc::clone(&transport)).await;

    let actions: Vec<QueuedAction> = ["J1", "J2", "J3", "J4", "J5"]
      .iter()
      .map(|id| queued_swipe(id, SwipeDirection::Right))
      .collect();
    for action in &actions {
      coord.queue.enqueue(action).expect("enqueue");
    }

    let report = coord.drain().await.expect("drain");

    match report {
      DrainReport::Stopped {
        sent,
        remaining,
        error,
      } => {
        assert_eq!(sent, 2);
        assert_eq!(remaining, 3);
        assert!(matches!(error, ApiError::Server(503)));
      }
      other => panic!("expected Stopped, got {:?}", other),
    }

    // The failed head and everything behind it are untouched, in order
    let left: Vec<String> = coord
      .pending_actions()
      .expect("list")
      .iter()
      .map(|a| a.kind.job_id().to_string())
      .collect();
    assert_eq!(left, vec!["J3", "J4", "J5"]);

    // Network order: J1, J2, then the retried attempts on J3 only
    let swipes = transport.paths();
    assert!(swipes[0].contains("J1"));
    assert!(swipes[1].contains("J2"));
    assert!(swipes[2..].iter().all(|p| p.contains("J3")));
  }

  #[tokio::test(start_paused = true)]
  async fn offline_actions_replay_in_order_after_reconnect() {
    let online = Arc::new(AtomicBool::new(false));
    let online_flag = Arc::clone(&online);
    let transport = Arc::new(MockTransport::with_handler(move |req| {
      if !online_flag.load(Ordering::SeqCst) {
        return Err(ApiError::Network("no route to host".to_string()));
      }
      swipe_ok(req)
    }));
    let coord = Arc::new(coordinator(Arc::clone(&transport)).await);

    let monitor = ConnectivityMonitor::new(NetStatus::Offline);
    let auto = {
      let coord = Arc::clone(&coord);
      let events = monitor.subscribe();
      tokio::spawn(async move { coord.run_auto_drain(events).await })
    };

    // Offline: both swipes fall back to the queue, in issue order
    assert_eq!(
      coord
        .submit_swipe("J1", SwipeDirection::Right)
        .await
        .expect("submit"),
      SubmitOutcome::Queued
    );
    assert_eq!(
      coord
        .submit_swipe("J2", SwipeDirection::Left)
        .await
        .expect("submit"),
      SubmitOutcome::Queued
    );
    assert_eq!(coord.pending_count().expect("len"), 2);
    assert!(coord.last_sync_at().expect("meta").is_none());

    online.store(true, Ordering::SeqCst);
    monitor.set_online();

    // Let the auto-drain task observe the transition and finish
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(coord.pending_count().expect("len"), 0);
    assert!(coord.last_sync_at().expect("meta").is_some());

    // The two successful replays went out in insertion order
    let swipes: Vec<String> = transport
      .paths()
      .into_iter()
      .filter(|p| p.contains("/swipe"))
      .collect();
    let successes = &swipes[swipes.len() - 2..];
    assert!(successes[0].contains("J1"));
    assert!(successes[1].contains("J2"));

    drop(monitor);
    auto.await.expect("auto-drain task");
  }

  #[tokio::test]
  async fn concurrent_drain_trigger_is_skipped() {
    let transport = Arc::new(
      MockTransport::with_handler(swipe_ok).with_delay(Duration::from_millis(200)),
    );
    let coord = Arc::new(coordinator(Arc::clone(&transport)).await);
    coord
      .queue
      .enqueue(&queued_swipe("J1", SwipeDirection::Right))
      .expect("enqueue");

    let first = {
      let coord = Arc::clone(&coord);
      tokio::spawn(async move { coord.drain().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = coord.drain().await.expect("drain");
    assert!(matches!(second, DrainReport::SkippedBusy));

    let first = first.await.expect("join").expect("drain");
    assert!(matches!(first, DrainReport::Completed { sent: 1 }));
  }

  #[tokio::test]
  async fn drain_on_empty_queue_marks_sync_time() {
    let transport = Arc::new(MockTransport::scripted(vec![]));
    let coord = coordinator(Arc::clone(&transport)).await;

    let report = coord.drain().await.expect("drain");
    assert!(matches!(report, DrainReport::Completed { sent: 0 }));
    assert!(coord.last_sync_at().expect("meta").is_some());
  }

  #[tokio::test]
  async fn feed_is_served_from_cache_within_ttl() {
    let transport = Arc::new(MockTransport::with_handler(|_| {
      MockTransport::ok(json!({
        "jobs": [{"id": "J1", "title": "Engineer", "company": "Acme"}],
        "next_cursor": null,
      }))
    }));
    let coord = coordinator(Arc::clone(&transport)).await;

    let first = coord.feed(None).await.expect("feed");
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(first.data.jobs.len(), 1);

    let second = coord.feed(None).await.expect("feed");
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(transport.calls_to("/v1/jobs/feed?page_size=3"), 1);
  }

  #[tokio::test]
  async fn swipe_removes_card_and_undo_restores_it() {
    let feed_body = feed_page(&["J1", "J2"]);
    let transport = Arc::new(MockTransport::with_handler(move |req| {
      if req.path.starts_with("/v1/jobs/feed") {
        MockTransport::ok(feed_body.clone())
      } else {
        swipe_ok(req)
      }
    }));
    let coord = coordinator(Arc::clone(&transport)).await;

    // Populate the cached front page
    coord.feed(None).await.expect("feed");

    coord
      .submit_swipe("J1", SwipeDirection::Right)
      .await
      .expect("submit");

    // The card left the cached feed immediately
    let cached = coord.feed(None).await.expect("feed");
    assert_eq!(cached.source, CacheSource::Cache);
    let ids: Vec<&str> = cached.data.jobs.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec!["J2"]);

    // Undo re-inserts it at the head of the front page
    let undone = coord.undo().expect("undo").expect("within window");
    assert!(undone.restored_card);
    assert!(!undone.still_queued);

    let restored = coord.feed(None).await.expect("feed");
    let ids: Vec<&str> = restored.data.jobs.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec!["J1", "J2"]);

    // The slot was consumed
    assert!(coord.undo().expect("undo").is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn undo_reports_queued_action_without_removing_it() {
    let transport = Arc::new(MockTransport::with_handler(|_| {
      Err(ApiError::Network("offline".to_string()))
    }));
    let coord = coordinator(Arc::clone(&transport)).await;

    let outcome = coord
      .submit_swipe("J1", SwipeDirection::Left)
      .await
      .expect("submit");
    assert_eq!(outcome, SubmitOutcome::Queued);

    let undone = coord.undo().expect("undo").expect("within window");
    assert!(undone.still_queued);

    // Local reversal only: the queued action still replays later
    assert_eq!(coord.pending_count().expect("len"), 1);
  }

  #[tokio::test]
  async fn undo_after_window_returns_empty() {
    let transport = Arc::new(MockTransport::with_handler(swipe_ok));
    let mut config = test_config();
    config.undo_window_secs = 0;
    let coord = coordinator_with(Arc::clone(&transport), config).await;

    coord
      .submit_swipe("J1", SwipeDirection::Right)
      .await
      .expect("submit");

    assert!(!coord.is_undo_armed());
    assert!(coord.undo().expect("undo").is_none());
  }
}
