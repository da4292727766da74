//! Operation records persisted by the Slipway state store.
//!
//! Each record kind carries a globally unique `id` (assigned at creation,
//! immutable) and an `application` reference that groups related history
//! together. The store treats everything beyond those two fields as opaque
//! payload; it never mutates record content, only presence and index
//! membership.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Structural validation failure for an operation record.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{kind}: {field} is required")]
    Missing { kind: &'static str, field: &'static str },

    #[error("{kind}: {field} must not contain control characters")]
    ControlChars { kind: &'static str, field: &'static str },
}

/// Check that an identifier-like field is non-empty and printable.
///
/// Control characters are rejected because the store embeds these values in
/// composite index keys whose segments are separated by a control character.
fn check_ident(kind: &'static str, field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Missing { kind, field });
    }
    if value.chars().any(char::is_control) {
        return Err(ValidationError::ControlChars { kind, field });
    }
    Ok(())
}

// ── Status ────────────────────────────────────────────────────────

/// Outcome state of a long-running operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusState {
    Running,
    Success,
    Error,
}

/// Progress/outcome report attached to an operation record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationStatus {
    pub state: StatusState,
    /// Human-readable detail line (empty when there is nothing to say).
    pub details: String,
    /// Unix timestamp (seconds) when the operation started.
    pub started_at: u64,
    /// Unix timestamp when the operation reached a terminal state.
    pub completed_at: Option<u64>,
}

impl OperationStatus {
    /// A freshly started, still-running status.
    pub fn running(started_at: u64) -> Self {
        Self {
            state: StatusState::Running,
            details: String::new(),
            started_at,
            completed_at: None,
        }
    }
}

// ── Deployment ────────────────────────────────────────────────────

/// A deployment: a build placed onto the target platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deployment {
    pub id: String,
    /// Owning application; deployments are enumerated and retained per app.
    pub application: String,
    /// The build this deployment runs.
    pub build_id: String,
    pub status: OperationStatus,
    /// Platform-assigned address, when the platform reports one.
    pub url: Option<String>,
    /// Unix timestamp (seconds) when this record was created.
    pub created_at: u64,
}

impl Deployment {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_ident("deployment", "id", &self.id)?;
        check_ident("deployment", "application", &self.application)?;
        check_ident("deployment", "build_id", &self.build_id)?;
        Ok(())
    }
}

// ── Build ─────────────────────────────────────────────────────────

/// A build: source turned into a runnable artifact by a builder plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Build {
    pub id: String,
    pub application: String,
    /// Name of the builder plugin that produced the artifact.
    pub builder: String,
    pub status: OperationStatus,
    /// Content digest of the produced artifact, once known.
    pub artifact_digest: Option<String>,
    /// Arbitrary labels attached by the builder.
    pub labels: HashMap<String, String>,
    pub created_at: u64,
}

impl Build {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_ident("build", "id", &self.id)?;
        check_ident("build", "application", &self.application)?;
        check_ident("build", "builder", &self.builder)?;
        Ok(())
    }
}

// ── Release ───────────────────────────────────────────────────────

/// A release: a deployment opened up to traffic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Release {
    pub id: String,
    pub application: String,
    /// The deployment this release routes traffic to.
    pub deployment_id: String,
    pub status: OperationStatus,
    /// Public address of the released deployment.
    pub url: String,
    pub created_at: u64,
}

impl Release {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_ident("release", "id", &self.id)?;
        check_ident("release", "application", &self.application)?;
        check_ident("release", "deployment_id", &self.deployment_id)?;
        Ok(())
    }
}

// ── Job ───────────────────────────────────────────────────────────

/// Which operation a job asks a runner to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOperation {
    Build,
    Deploy,
    Release,
    Destroy,
}

/// Queue lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Success,
    Error,
}

/// A unit of work queued for a runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub application: String,
    pub operation: JobOperation,
    pub state: JobState,
    /// Runner that picked the job up, once assigned.
    pub assigned_runner: Option<String>,
    pub created_at: u64,
}

impl Job {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_ident("job", "id", &self.id)?;
        check_ident("job", "application", &self.application)?;
        Ok(())
    }
}
