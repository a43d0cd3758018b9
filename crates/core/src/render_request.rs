//! Render request description accepted at submission, and its validation.
//!
//! A request is validated in full before any store mutation happens.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::CoreError;
use crate::types::JobUid;

/// Maximum length of `name` and `owner`.
pub const MAX_LABEL_LEN: usize = 256;

/// Maximum length of an asset reference.
pub const MAX_ASSET_REF_LEN: usize = 1024;

/// Maximum length of a worker identity.
pub const MAX_WORKER_NAME_LEN: usize = 128;

// `validator` length bounds are `u64`.
const MAX_LABEL_LEN_U64: u64 = MAX_LABEL_LEN as u64;
const MAX_ASSET_REF_LEN_U64: u64 = MAX_ASSET_REF_LEN as u64;

/// A render request as submitted by an operator or a pipeline script.
///
/// Older submission scripts use `umap_path` / `useq_path` / `uconfig_path` for
/// the asset references; those names are accepted as aliases.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RenderRequest {
    /// Caller-generated identifier. Generated by the store side when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<JobUid>,

    #[validate(custom(function = "non_blank"), length(max = MAX_LABEL_LEN_U64))]
    pub name: String,

    #[validate(custom(function = "non_blank"), length(max = MAX_LABEL_LEN_U64))]
    pub owner: String,

    #[serde(alias = "umap_path")]
    #[validate(custom(function = "non_blank"), length(max = MAX_ASSET_REF_LEN_U64))]
    pub map_ref: String,

    #[serde(alias = "useq_path")]
    #[validate(custom(function = "non_blank"), length(max = MAX_ASSET_REF_LEN_U64))]
    pub sequence_ref: String,

    #[serde(alias = "uconfig_path")]
    #[validate(custom(function = "non_blank"), length(max = MAX_ASSET_REF_LEN_U64))]
    pub config_ref: String,

    /// Worker allowed to claim the job. When absent, the assignment policy
    /// decides (or the job waits for a separate assignment pass).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "worker_name"))]
    pub worker: Option<String>,
}

impl RenderRequest {
    /// Run all field validations, flattening failures into a
    /// [`CoreError::Validation`].
    pub fn check(&self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|errors| CoreError::Validation(errors.to_string()))
    }
}

fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be empty".into());
        return Err(err);
    }
    Ok(())
}

fn worker_name(value: &str) -> Result<(), ValidationError> {
    validate_worker_name(value).map_err(|e| {
        let mut err = ValidationError::new("worker_name");
        err.message = Some(e.to_string().into());
        err
    })
}

/// Validate a worker identity.
///
/// Rules:
/// - Must not be empty.
/// - Must not exceed [`MAX_WORKER_NAME_LEN`] characters.
/// - Must contain only alphanumeric, hyphen, underscore, or dot characters.
pub fn validate_worker_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::Validation(
            "Worker name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_WORKER_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Worker name must not exceed {MAX_WORKER_NAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(CoreError::Validation(
            "Worker name may only contain alphanumeric, hyphen, underscore, or dot characters"
                .to_string(),
        ));
    }
    Ok(())
}
