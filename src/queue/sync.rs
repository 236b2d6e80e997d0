//! One-shot gate between the playback engine's "finished" callback and the
//! worker waiting for it.
//!
//! A fresh gate is created per job. The signal side may fire from any thread,
//! before or after the worker starts waiting; only the first outcome counts.

use std::sync::{Arc, Mutex, Weak};
use tokio::sync::oneshot;

/// Reason given when every signal handle is dropped without firing.
pub const DROPPED_CALLBACK: &str = "playback engine dropped the completion callback";

/// How a playback ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished,
    Skipped,
    Failed(String),
}

type Slot = Mutex<Option<oneshot::Sender<PlaybackOutcome>>>;

/// Fires the gate. Cloneable; the first `signal` wins.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    slot: Arc<Slot>,
}

impl CompletionSignal {
    /// Returns true if this call opened the gate.
    pub fn signal(&self, outcome: PlaybackOutcome) -> bool {
        fire(&self.slot, outcome)
    }

    /// A handle that can fire the gate without keeping it alive.
    ///
    /// Once every strong `CompletionSignal` is gone the waiter resolves to
    /// [`DROPPED_CALLBACK`], even if skip handles remain.
    pub fn skip_handle(&self) -> SkipHandle {
        SkipHandle {
            slot: Arc::downgrade(&self.slot),
        }
    }
}

/// Weak side of a [`CompletionSignal`], held by the session table for `skip`.
#[derive(Debug, Clone)]
pub struct SkipHandle {
    slot: Weak<Slot>,
}

impl SkipHandle {
    /// Fires [`PlaybackOutcome::Skipped`]; false if the gate was already open.
    pub fn skip(&self) -> bool {
        self.slot
            .upgrade()
            .is_some_and(|slot| fire(&slot, PlaybackOutcome::Skipped))
    }
}

fn fire(slot: &Slot, outcome: PlaybackOutcome) -> bool {
    let sender = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
    match sender {
        Some(tx) => {
            // The waiter may already be gone on shutdown.
            let _ = tx.send(outcome);
            true
        }
        None => false,
    }
}

/// The waiting side of the gate.
#[derive(Debug)]
pub struct PlaybackSynchronizer {
    rx: oneshot::Receiver<PlaybackOutcome>,
}

impl PlaybackSynchronizer {
    pub fn new() -> (Self, CompletionSignal) {
        let (tx, rx) = oneshot::channel();
        (
            Self { rx },
            CompletionSignal {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
        )
    }

    /// Resolves once the gate fires.
    pub async fn wait(self) -> PlaybackOutcome {
        self.rx
            .await
            .unwrap_or_else(|_| PlaybackOutcome::Failed(DROPPED_CALLBACK.to_string()))
    }
}
