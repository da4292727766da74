//! Operation references — how callers address a record without holding it.
//!
//! An [`OperationRef`] is conveyed by RPC callers as a tagged union: exactly
//! one variant is set. Resolution happens inside the state store; the same
//! addressing scheme works uniformly for every record kind, so "latest" means
//! the same thing for deployments, builds, releases, and jobs.

use serde::{Deserialize, Serialize};

/// Selects a single operation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationRef {
    /// Address a record by its exact id. A missing id resolves to
    /// not-found, never to an ambiguity error.
    Id { id: String },
    /// Address the most recently indexed record for an application.
    Latest { application: String },
}

impl OperationRef {
    /// Convenience constructor for the by-id variant.
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::Id { id: id.into() }
    }

    /// Convenience constructor for the latest-in-application variant.
    pub fn latest(application: impl Into<String>) -> Self {
        Self::Latest { application: application.into() }
    }
}
