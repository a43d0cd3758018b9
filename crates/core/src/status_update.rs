//! The status-update message pushed to `PUT /requests/{uid}`.
//!
//! Two encodings are accepted: a JSON [`StatusUpdate`] object, and the legacy
//! plain-text form `progress;time_estimate;status` sent by engine-side
//! scripts, e.g. `42.5;0:03:10;in_progress`.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::status::RenderStatus;

/// Time estimate used while nothing better is known.
pub const TIME_ESTIMATE_UNKNOWN: &str = "unknown";

/// Time estimate recorded on completion.
pub const TIME_ESTIMATE_DONE: &str = "N/A";

/// Field separator of the legacy plain-text encoding.
const LEGACY_SEPARATOR: char = ';';

/// A guarded status transition request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Target status.
    pub status: RenderStatus,
    /// Status the record must currently be in. Defaults per
    /// [`RenderStatus::default_expected`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_status: Option<RenderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_estimate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
}

impl StatusUpdate {
    /// A bare transition to `status` with no field updates.
    pub fn to(status: RenderStatus) -> Self {
        Self {
            status,
            expected_status: None,
            progress_percent: None,
            time_estimate: None,
            error_message: None,
            worker: None,
        }
    }

    /// Resolve the expected (guard) status.
    pub fn expected(&self) -> Result<RenderStatus, CoreError> {
        self.expected_status
            .or_else(|| self.status.default_expected())
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "expected_status is required for a transition to {}",
                    self.status
                ))
            })
    }

    /// Parse the legacy `progress;time_estimate;status` encoding.
    ///
    /// Empty progress or time-estimate fields are treated as absent.
    pub fn parse_legacy(body: &str) -> Result<Self, CoreError> {
        let parts: Vec<&str> = body.trim().splitn(3, LEGACY_SEPARATOR).collect();
        let [progress, estimate, status] = parts[..] else {
            return Err(CoreError::Validation(format!(
                "Expected \"progress;time_estimate;status\", got \"{body}\""
            )));
        };

        let progress_percent = match progress.trim() {
            "" => None,
            raw => Some(raw.parse::<f64>().map_err(|_| {
                CoreError::Validation(format!("Invalid progress value: \"{raw}\""))
            })?),
        };

        let time_estimate = match estimate.trim() {
            "" => None,
            raw => Some(raw.to_string()),
        };

        Ok(Self {
            progress_percent,
            time_estimate,
            ..Self::to(status.parse()?)
        })
    }

    /// Render the legacy plain-text encoding.
    pub fn to_legacy(&self) -> String {
        format!(
            "{}{LEGACY_SEPARATOR}{}{LEGACY_SEPARATOR}{}",
            self.progress_percent
                .map(|p| p.to_string())
                .unwrap_or_default(),
            self.time_estimate.as_deref().unwrap_or_default(),
            self.status,
        )
    }
}

/// Validate a progress percentage: finite and within `0..=100`.
pub fn check_progress(percent: f64) -> Result<f64, CoreError> {
    if percent.is_finite() && (0.0..=100.0).contains(&percent) {
        Ok(percent)
    } else {
        Err(CoreError::Validation(format!(
            "progress_percent must be within 0..=100, got {percent}"
        )))
    }
}

/// Clamp an engine-reported completion value into `0..=100`.
/// Non-finite values become 0.
pub fn clamp_progress(percent: f64) -> f64 {
    if percent.is_finite() {
        percent.clamp(0.0, 100.0)
    } else {
        0.0
    }
}
