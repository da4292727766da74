//! slipway-state — embedded operation-record store for the Slipway server.
//!
//! Backed by [redb](https://docs.rs/redb), the store durably records the
//! operational entities of the control plane (deployments, builds, releases,
//! jobs) with uniform transactional CRUD, secondary indexing for reference
//! resolution (by id, by latest), and bounded-retention pruning.
//!
//! # Architecture
//!
//! Each record kind is bound to a generic [`OperationDescriptor`]: a primary
//! table keyed by id, a group index keyed by `(application, sequence)`, and a
//! retention limit. Every mutation (upsert, index maintenance, pruning)
//! shares one write transaction, so readers observe either the prior state or
//! the fully-committed state, never a partial index. Values are
//! JSON-serialized into redb's `&[u8]` columns.
//!
//! The [`StateStore`] is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across request handlers.

pub mod error;
pub mod ops;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use ops::{OperationDescriptor, OperationRecord};
pub use store::{RetentionConfig, StateStore};

pub use slipway_core::{
    Build, Deployment, Job, JobOperation, JobState, OperationRef, OperationStatus, Release,
    StatusState, ValidationError,
};
