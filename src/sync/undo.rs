//! Single-slot undo buffer for the most recent user action.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::api::types::Job;
use crate::queue::QueuedAction;

/// What the buffer hands back on undo: the action and, when the feed cache
/// held it, the card to re-insert.
#[derive(Debug, Clone)]
pub struct UndoableAction {
  pub action: QueuedAction,
  pub card: Option<Job>,
}

#[derive(Debug, Clone)]
struct UndoSlot {
  undoable: UndoableAction,
  expires_at: Instant,
}

/// Holds the single most recent user action for a bounded window.
///
/// Recording a new action replaces the previous slot outright; the earlier
/// action's remote effect, if already sent, is not compensated.
#[derive(Default)]
pub struct UndoBuffer {
  slot: Mutex<Option<UndoSlot>>,
}

impl UndoBuffer {
  pub fn new() -> Self {
    Self::default()
  }

  fn slot(&self) -> MutexGuard<'_, Option<UndoSlot>> {
    match self.slot.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }

  /// Arm the buffer with the latest action, replacing any previous slot.
  pub fn record(&self, undoable: UndoableAction, window: Duration) {
    *self.slot() = Some(UndoSlot {
      undoable,
      expires_at: Instant::now() + window,
    });
  }

  /// Take the action if the window is still open. The slot is cleared
  /// either way; an expired or absent slot yields nothing.
  pub fn try_undo(&self) -> Option<UndoableAction> {
    match self.slot().take() {
      Some(slot) if Instant::now() < slot.expires_at => Some(slot.undoable),
      _ => None,
    }
  }

  /// Whether an undoable action is currently held. Expired slots are
  /// dropped lazily on inspection.
  pub fn is_armed(&self) -> bool {
    let mut slot = self.slot();
    match &*slot {
      Some(live) if Instant::now() < live.expires_at => true,
      Some(_) => {
        *slot = None;
        false
      }
      None => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::SwipeDirection;
  use crate::queue::ActionKind;
  use std::thread::sleep;

  fn undoable(job_id: &str) -> UndoableAction {
    UndoableAction {
      action: QueuedAction::new(ActionKind::Swipe {
        job_id: job_id.to_string(),
        direction: SwipeDirection::Right,
      }),
      card: None,
    }
  }

  #[test]
  fn undo_within_window_returns_action_once() {
    let buffer = UndoBuffer::new();
    buffer.record(undoable("J1"), Duration::from_secs(3));

    let first = buffer.try_undo().expect("within window");
    assert_eq!(first.action.kind.job_id(), "J1");

    // The slot was cleared by the first take
    assert!(buffer.try_undo().is_none());
  }

  #[test]
  fn undo_after_expiry_is_empty() {
    let buffer = UndoBuffer::new();
    buffer.record(undoable("J1"), Duration::from_millis(30));

    sleep(Duration::from_millis(50));
    assert!(buffer.try_undo().is_none());
  }

  #[test]
  fn recording_replaces_previous_slot() {
    let buffer = UndoBuffer::new();
    buffer.record(undoable("J1"), Duration::from_secs(3));
    buffer.record(undoable("J2"), Duration::from_secs(3));

    let taken = buffer.try_undo().expect("within window");
    assert_eq!(taken.action.kind.job_id(), "J2");
    assert!(buffer.try_undo().is_none());
  }

  #[test]
  fn is_armed_drops_expired_slot() {
    let buffer = UndoBuffer::new();
    assert!(!buffer.is_armed());

    buffer.record(undoable("J1"), Duration::from_millis(30));
    assert!(buffer.is_armed());

    sleep(Duration::from_millis(50));
    assert!(!buffer.is_armed());
    assert!(buffer.try_undo().is_none());
  }
}
