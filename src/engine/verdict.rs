use serde::{Deserialize, Serialize};

/// Continuation signal computed once per dispatch cycle from the last
/// worker output processed. Never persisted; only returned to the session
/// runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleVerdict {
    /// An action-producing output landed; run another iteration.
    Continue,
    /// A session summary was produced; the task is complete.
    Done,
    /// The run needs user input before it can proceed.
    WaitUser,
    /// No worker was invoked this cycle. The caller keeps iterating, but
    /// distinctly from `WaitUser`: nothing is being asked of the user.
    Stalled,
}

/// Outcome of a whole session, reported by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Completed,
    Paused,
    MaxIterationsReached,
}
