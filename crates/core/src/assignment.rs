//! Worker assignment strategies.
//!
//! A policy runs once between `submitted` and `ready_to_start`. It is chosen
//! by configuration (`ASSIGNMENT_POLICY`), never by subtyping.

use std::str::FromStr;

use crate::error::CoreError;
use crate::render_request::validate_worker_name;

/// How a submitted job gets its worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentPolicy {
    /// Only the worker named in the request. Jobs without one stay
    /// `submitted` until an explicit assignment pass.
    Manual,
    /// The requested worker wins; otherwise the next worker of a static pool.
    RoundRobin { pool: Vec<String> },
}

impl AssignmentPolicy {
    /// Build a policy from its configured name and worker pool.
    pub fn from_config(kind: &str, pool: &[String]) -> Result<Self, CoreError> {
        match kind.parse::<PolicyKind>()? {
            PolicyKind::Manual => Ok(AssignmentPolicy::Manual),
            PolicyKind::RoundRobin => {
                if pool.is_empty() {
                    return Err(CoreError::Validation(
                        "round_robin assignment requires a non-empty worker pool".to_string(),
                    ));
                }
                for worker in pool {
                    validate_worker_name(worker)?;
                }
                Ok(AssignmentPolicy::RoundRobin {
                    pool: pool.to_vec(),
                })
            }
        }
    }

    /// Pick a worker. `ticket` is a monotonically increasing counter owned
    /// by the caller; only round-robin uses it.
    pub fn select(&self, requested: Option<&str>, ticket: usize) -> Option<String> {
        if let Some(worker) = requested {
            return Some(worker.to_string());
        }
        match self {
            AssignmentPolicy::Manual => None,
            AssignmentPolicy::RoundRobin { pool } => pool.get(ticket % pool.len()).cloned(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AssignmentPolicy::Manual => "manual",
            AssignmentPolicy::RoundRobin { .. } => "round_robin",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PolicyKind {
    Manual,
    RoundRobin,
}

impl FromStr for PolicyKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(PolicyKind::Manual),
            "round_robin" | "round-robin" => Ok(PolicyKind::RoundRobin),
            other => Err(CoreError::Validation(format!(
                "Unknown assignment policy \"{other}\" (expected manual or round_robin)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Vec<String> {
        vec!["W1".to_string(), "W2".to_string()]
    }

    #[test]
    fn manual_uses_requested_worker_only() {
        let policy = AssignmentPolicy::from_config("manual", &[]).unwrap();
        assert_eq!(policy.select(Some("W1"), 0).as_deref(), Some("W1"));
        assert_eq!(policy.select(None, 0), None);
    }

    #[test]
    fn round_robin_cycles_through_pool() {
        let policy = AssignmentPolicy::from_config("round_robin", &pool()).unwrap();
        let picks: Vec<_> = (0..4).map(|t| policy.select(None, t).unwrap()).collect();
        assert_eq!(picks, ["W1", "W2", "W1", "W2"]);
    }

    #[test]
    fn requested_worker_overrides_round_robin() {
        let policy = AssignmentPolicy::from_config("Round-Robin", &pool()).unwrap();
        assert_eq!(policy.select(Some("W9"), 1).as_deref(), Some("W9"));
    }

    #[test]
    fn round_robin_requires_valid_pool() {
        assert!(AssignmentPolicy::from_config("round_robin", &[]).is_err());
        assert!(
            AssignmentPolicy::from_config("round_robin", &["bad name".to_string()]).is_err()
        );
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(AssignmentPolicy::from_config("fair_share", &pool()).is_err());
    }
}
