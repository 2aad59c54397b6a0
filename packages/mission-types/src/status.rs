use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PldStatus {
    Unknown,
    Error,
    WaitingInfo,
    PlanningMission,
    ExecutingMission,
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DroneStatus {
    Unknown,
    StartingSim,
    Error,
    ExecutingMission,
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlannerStatus {
    ExpectingData,
    Calculating,
    Error,
    Finish,
}

/// `true` once a status enum has reached a terminal value (`Finish`/`Error`);
/// used to enforce the "no regression from FINISH to EXECUTING" invariant.
pub trait Terminal {
    fn is_terminal(&self) -> bool;
}

impl Terminal for PldStatus {
    fn is_terminal(&self) -> bool {
        matches!(self, PldStatus::Finish | PldStatus::Error)
    }
}

impl Terminal for DroneStatus {
    fn is_terminal(&self) -> bool {
        matches!(self, DroneStatus::Finish | DroneStatus::Error)
    }
}

impl Terminal for PlannerStatus {
    fn is_terminal(&self) -> bool {
        matches!(self, PlannerStatus::Finish | PlannerStatus::Error)
    }
}

/// Resolves a status transition against the current value: once `current`
/// is terminal (`Finish`/`Error`), it wins over whatever `next` a
/// concurrent task is about to report. Every status-bearing process keeps
/// an `AtomicU8` that two tasks can race to write (e.g. a per-drone error
/// callback racing the "all missions complete" path); this stops the later
/// write from erasing the earlier terminal one.
pub fn guard_transition<T: Terminal>(current: T, next: T) -> T {
    if current.is_terminal() {
        current
    } else {
        next
    }
}
