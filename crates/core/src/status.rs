//! Render job lifecycle status and the directed transition graph.
//!
//! ```text
//! submitted -> ready_to_start -> in_progress -> finished
//!                                     |   ^  \-> error
//!                                     \---/  (progress push)
//! ```
//!
//! `finished` and `error` are terminal. The only same-state edge is
//! `in_progress -> in_progress`, used by progress pushes as a guard.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Prefix some legacy senders put in front of the status name
/// (e.g. `RenderStatus.in_progress`).
const LEGACY_STATUS_PREFIX: &str = "RenderStatus.";

/// Lifecycle status of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    Submitted,
    ReadyToStart,
    InProgress,
    Finished,
    Error,
}

impl RenderStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [RenderStatus; 5] = [
        RenderStatus::Submitted,
        RenderStatus::ReadyToStart,
        RenderStatus::InProgress,
        RenderStatus::Finished,
        RenderStatus::Error,
    ];

    /// The database / wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            RenderStatus::Submitted => "submitted",
            RenderStatus::ReadyToStart => "ready_to_start",
            RenderStatus::InProgress => "in_progress",
            RenderStatus::Finished => "finished",
            RenderStatus::Error => "error",
        }
    }

    /// `finished` and `error` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, RenderStatus::Finished | RenderStatus::Error)
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: RenderStatus) -> bool {
        use RenderStatus::*;
        matches!(
            (self, next),
            (Submitted, ReadyToStart)
                | (ReadyToStart, InProgress)
                | (InProgress, InProgress)
                | (InProgress, Finished)
                | (InProgress, Error)
        )
    }

    /// Validate an edge, returning a descriptive error for illegal ones.
    pub fn check_transition(self, next: RenderStatus) -> Result<(), CoreError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "Illegal status transition: {self} -> {next}"
            )))
        }
    }

    /// The status a guarded update to `self` is expected to start from when
    /// the caller does not say otherwise.
    pub fn default_expected(self) -> Option<RenderStatus> {
        match self {
            RenderStatus::Submitted => None,
            RenderStatus::ReadyToStart => Some(RenderStatus::Submitted),
            RenderStatus::InProgress | RenderStatus::Finished | RenderStatus::Error => {
                Some(RenderStatus::InProgress)
            }
        }
    }
}

impl fmt::Display for RenderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let name = name.strip_prefix(LEGACY_STATUS_PREFIX).unwrap_or(name);
        RenderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| CoreError::Validation(format!("Unknown render status: \"{s}\"")))
    }
}

impl TryFrom<String> for RenderStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, CoreError> {
        value.parse()
    }
}
