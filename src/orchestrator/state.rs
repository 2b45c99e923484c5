//! Run state tracking and the teardown completion gate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Lifecycle state of a run.
///
/// ```text
/// Idle → NetworkReady → Provisioning → Running → TestExecuting → TearingDown → Done
/// ```
///
/// Interruption is tracked separately and may happen from any state between
/// `NetworkReady` and `TestExecuting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    NetworkReady,
    Provisioning,
    Running,
    TestExecuting,
    TearingDown,
    Done,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::NetworkReady => "network-ready",
            RunState::Provisioning => "provisioning",
            RunState::Running => "running",
            RunState::TestExecuting => "test-executing",
            RunState::TearingDown => "tearing-down",
            RunState::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Thread-safe holder of the current [`RunState`] plus the interrupted flag.
#[derive(Debug)]
pub struct StateTracker {
    state: Mutex<RunState>,
    interrupted: AtomicBool,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self {
            state: Mutex::new(RunState::Idle),
            interrupted: AtomicBool::new(false),
        }
    }
}

impl StateTracker {
    /// Returns the current state.
    pub fn current(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to `next` and logs the transition.
    pub fn transition(&self, next: RunState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let from = *state;
        debug!(from = %from, to = %next, "Run state transition");
        *state = next;
    }

    pub fn mark_interrupted(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

/// Single-fire gate guarding teardown.
///
/// Exactly one caller of [`CompletionGate::try_fire`] gets `true` for the
/// lifetime of the gate, whichever path reaches it first.
#[derive(Debug, Default)]
pub struct CompletionGate {
    fired: AtomicBool,
}

impl CompletionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the gate. Returns `false` if it was already claimed.
    pub fn try_fire(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
