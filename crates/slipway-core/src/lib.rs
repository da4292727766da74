//! slipway-core — shared domain types for the Slipway control plane.
//!
//! Defines the operation records the server persists (deployments, builds,
//! releases, jobs), their lifecycle/status enums, structural validation, and
//! the [`OperationRef`] addressing type RPC callers use to select a record
//! without knowing its id directly.

pub mod records;
pub mod refs;

pub use records::*;
pub use refs::OperationRef;
