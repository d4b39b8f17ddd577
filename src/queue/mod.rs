//! Durable FIFO queue of pending user actions.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::types::SwipeDirection;
use crate::db::Database;

/// A mutating action awaiting transmission.
///
/// Created when an immediate send fails, destroyed on confirmed remote
/// success, never mutated in place. The id is generated at creation time
/// and stable across persistence reloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
  pub id: String,
  pub kind: ActionKind,
  pub created_at: DateTime<Utc>,
}

impl QueuedAction {
  /// Build a new action with a fresh id, stamped now.
  pub fn new(kind: ActionKind) -> Self {
    Self {
      id: Uuid::new_v4().to_string(),
      kind,
      created_at: Utc::now(),
    }
  }
}

/// The closed set of queueable actions.
///
/// The drain loop dispatches on this exhaustively, so a new action kind is
/// a compile-checked change rather than a new untyped payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
  Swipe {
    job_id: String,
    direction: SwipeDirection,
  },
}

impl ActionKind {
  /// The job this action refers to.
  pub fn job_id(&self) -> &str {
    match self {
      ActionKind::Swipe { job_id, .. } => job_id,
    }
  }
}

/// Durable, ordered queue of pending actions over the shared database.
///
/// Strict FIFO: no reordering and no coalescing. A later "skip" after an
/// earlier "apply" for the same job are both replayed in the order issued.
pub struct ActionQueue {
  db: Arc<Database>,
}

impl ActionQueue {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Append an action; the row is durable before this returns.
  pub fn enqueue(&self, action: &QueuedAction) -> Result<()> {
    let payload =
      serde_json::to_vec(action).map_err(|e| eyre!("Failed to serialize action: {}", e))?;

    let conn = self.db.lock()?;
    conn
      .execute(
        "INSERT INTO offline_queue (action_id, payload, created_at) VALUES (?, ?, ?)",
        params![action.id, payload, action.created_at.to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to enqueue action: {}", e))?;

    tracing::debug!("queued action {} ({})", action.id, action.kind.job_id());
    Ok(())
  }

  /// The action at the head of the queue, if any.
  pub fn peek_oldest(&self) -> Result<Option<QueuedAction>> {
    let conn = self.db.lock()?;

    let payload: Option<Vec<u8>> = conn
      .query_row(
        "SELECT payload FROM offline_queue ORDER BY seq LIMIT 1",
        [],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to peek queue head: {}", e))?;

    payload
      .map(|data| {
        serde_json::from_slice(&data).map_err(|e| eyre!("Failed to deserialize queued action: {}", e))
      })
      .transpose()
  }

  /// Remove the head of the queue, but only if its id matches. The guard
  /// keeps a drain that lost a race from deleting somebody else's head.
  ///
  /// Returns whether a row was removed.
  pub fn remove_oldest(&self, id: &str) -> Result<bool> {
    let conn = self.db.lock()?;

    let removed = conn
      .execute(
        "DELETE FROM offline_queue
         WHERE seq = (SELECT MIN(seq) FROM offline_queue) AND action_id = ?",
        params![id],
      )
      .map_err(|e| eyre!("Failed to remove queue head: {}", e))?;

    Ok(removed > 0)
  }

  /// All pending actions in insertion order.
  pub fn list_all(&self) -> Result<Vec<QueuedAction>> {
    let conn = self.db.lock()?;

    let mut stmt = conn
      .prepare("SELECT payload FROM offline_queue ORDER BY seq")
      .map_err(|e| eyre!("Failed to prepare queue query: {}", e))?;

    let payloads: Vec<Vec<u8>> = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list queue: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    payloads
      .into_iter()
      .map(|data| {
        serde_json::from_slice(&data).map_err(|e| eyre!("Failed to deserialize queued action: {}", e))
      })
      .collect()
  }

  pub fn len(&self) -> Result<usize> {
    let conn = self.db.lock()?;
    conn
      .query_row("SELECT COUNT(*) FROM offline_queue", [], |row| row.get(0))
      .map(|count: i64| count as usize)
      .map_err(|e| eyre!("Failed to count queue: {}", e))
  }

  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }

  /// Whether an action is still pending.
  pub fn contains(&self, id: &str) -> Result<bool> {
    let conn = self.db.lock()?;
    conn
      .query_row(
        "SELECT EXISTS(SELECT 1 FROM offline_queue WHERE action_id = ?)",
        params![id],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to check queue membership: {}", e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn swipe(job_id: &str, direction: SwipeDirection) -> QueuedAction {
    QueuedAction::new(ActionKind::Swipe {
      job_id: job_id.to_string(),
      direction,
    })
  }

  fn queue() -> ActionQueue {
    ActionQueue::new(Arc::new(Database::open_in_memory().expect("open")))
  }

  #[test]
  fn preserves_insertion_order() {
    let queue = queue();

    let a = swipe("J1", SwipeDirection::Right);
    let b = swipe("J2", SwipeDirection::Left);
    let c = swipe("J1", SwipeDirection::Left);

    queue.enqueue(&a).expect("enqueue");
    queue.enqueue(&b).expect("enqueue");
    queue.enqueue(&c).expect("enqueue");

    let all = queue.list_all().expect("list");
    assert_eq!(all, vec![a.clone(), b, c]);
    assert_eq!(queue.peek_oldest().expect("peek"), Some(a));
  }

  #[test]
  fn remove_oldest_requires_matching_id() {
    let queue = queue();

    let a = swipe("J1", SwipeDirection::Right);
    let b = swipe("J2", SwipeDirection::Left);
    queue.enqueue(&a).expect("enqueue");
    queue.enqueue(&b).expect("enqueue");

    // Wrong id leaves the queue untouched
    assert!(!queue.remove_oldest(&b.id).expect("remove"));
    assert_eq!(queue.len().expect("len"), 2);

    assert!(queue.remove_oldest(&a.id).expect("remove"));
    assert_eq!(queue.peek_oldest().expect("peek"), Some(b));
  }

  #[test]
  fn contains_tracks_membership() {
    let queue = queue();
    let a = swipe("J1", SwipeDirection::Right);

    assert!(!queue.contains(&a.id).expect("contains"));
    queue.enqueue(&a).expect("enqueue");
    assert!(queue.contains(&a.id).expect("contains"));
    queue.remove_oldest(&a.id).expect("remove");
    assert!(!queue.contains(&a.id).expect("contains"));
  }

  #[test]
  fn survives_reopen_with_stable_ids() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sync.db");

    let actions: Vec<QueuedAction> = (1..=5)
      .map(|i| swipe(&format!("J{}", i), SwipeDirection::Right))
      .collect();

    {
      let queue = ActionQueue::new(Arc::new(Database::open(&path).expect("open")));
      for action in &actions {
        queue.enqueue(action).expect("enqueue");
      }
      // Two confirmed sends before the process dies
      queue.remove_oldest(&actions[0].id).expect("remove");
      queue.remove_oldest(&actions[1].id).expect("remove");
    }

    // Restart: the drain resumes from the third action, not the first
    let queue = ActionQueue::new(Arc::new(Database::open(&path).expect("open")));
    assert_eq!(queue.len().expect("len"), 3);
    assert_eq!(queue.peek_oldest().expect("peek"), Some(actions[2].clone()));
    assert_eq!(
      queue.list_all().expect("list"),
      vec![actions[2].clone(), actions[3].clone(), actions[4].clone()]
    );
  }

  #[test]
  fn same_job_actions_are_not_coalesced() {
    let queue = queue();

    let apply = swipe("J1", SwipeDirection::Right);
    let skip = swipe("J1", SwipeDirection::Left);
    queue.enqueue(&apply).expect("enqueue");
    queue.enqueue(&skip).expect("enqueue");

    assert_eq!(queue.list_all().expect("list"), vec![apply, skip]);
  }
}
