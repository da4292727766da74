//! StateStore — the control-plane state store of the Slipway server.
//!
//! Wraps a redb database and exposes per-kind entity stores (deployments,
//! builds, releases, jobs). Each entity store is a thin specialization of
//! [`OperationDescriptor`](crate::ops::OperationDescriptor): it contributes
//! structural validation and a retention limit, and delegates every storage
//! mechanic to the generic layer. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::Database;
use tracing::debug;

use slipway_core::{Build, Deployment, Job, OperationRef, Release};

use crate::error::{map_err, StateError, StateResult};
use crate::ops::OperationDescriptor;
use crate::tables::*;

/// Per-kind retention limits: the maximum number of indexed records kept per
/// application. 0 disables pruning for that kind.
#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    pub deployments: u64,
    pub builds: u64,
    pub releases: u64,
    pub jobs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            deployments: 250,
            builds: 250,
            releases: 250,
            // Job history churns much faster than operation history.
            jobs: 1000,
        }
    }
}

/// Thread-safe state store backed by redb.
///
/// Mutations serialize through redb's single write transaction; reads run in
/// snapshot-isolated read transactions that never block writers. `Clone` is
/// cheap (shared `Arc<Database>`), so one store handle can be shared across
/// request handlers.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    deployments: OperationDescriptor<Deployment>,
    builds: OperationDescriptor<Build>,
    releases: OperationDescriptor<Release>,
    jobs: OperationDescriptor<Job>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        Self::open_with(path, RetentionConfig::default())
    }

    /// Open a persistent store with explicit retention limits.
    pub fn open_with(path: &Path, retention: RetentionConfig) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::with_db(db, retention);
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        Self::open_in_memory_with(RetentionConfig::default())
    }

    /// Create an ephemeral in-memory store with explicit retention limits.
    pub fn open_in_memory_with(retention: RetentionConfig) -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::with_db(db, retention);
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn with_db(db: Database, retention: RetentionConfig) -> Self {
        Self {
            db: Arc::new(db),
            deployments: OperationDescriptor::new(
                "deployment",
                DEPLOYMENTS,
                DEPLOYMENTS_BY_APP,
                retention.deployments,
            ),
            builds: OperationDescriptor::new("build", BUILDS, BUILDS_BY_APP, retention.builds),
            releases: OperationDescriptor::new(
                "release",
                RELEASES,
                RELEASES_BY_APP,
                retention.releases,
            ),
            jobs: OperationDescriptor::new("job", JOBS, JOBS_BY_APP, retention.jobs),
        }
    }

    /// Create all tables if they don't exist yet, so read transactions never
    /// race table creation.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        self.deployments.ensure(&txn)?;
        self.builds.ensure(&txn)?;
        self.releases.ensure(&txn)?;
        self.jobs.ensure(&txn)?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Deployments ────────────────────────────────────────────────

    /// Insert or replace a deployment. With `index` set the deployment is
    /// enumerable per application and subject to retention; otherwise it is
    /// retrievable by id only.
    pub fn deployment_put(&self, index: bool, deployment: &Deployment) -> StateResult<()> {
        deployment
            .validate()
            .map_err(|e| StateError::Validation(e.to_string()))?;
        self.deployments.put(&self.db, index, deployment)
    }

    /// Get a deployment by reference (id or latest-in-application).
    pub fn deployment_get(&self, reference: &OperationRef) -> StateResult<Deployment> {
        self.deployments.get(&self.db, reference)
    }

    /// All indexed deployments for an application, newest first.
    pub fn deployment_list(&self, application: &str) -> StateResult<Vec<Deployment>> {
        self.deployments.list(&self.db, application)
    }

    /// Delete a deployment by id. Idempotent.
    pub fn deployment_delete(&self, id: &str) -> StateResult<()> {
        self.deployments.delete(&self.db, id)
    }

    /// Indexed deployment count for an application.
    pub fn deployment_indexed_len(&self, application: &str) -> StateResult<usize> {
        self.deployments.indexed_len(&self.db, application)
    }

    // ── Builds ─────────────────────────────────────────────────────

    /// Insert or replace a build.
    pub fn build_put(&self, index: bool, build: &Build) -> StateResult<()> {
        build
            .validate()
            .map_err(|e| StateError::Validation(e.to_string()))?;
        self.builds.put(&self.db, index, build)
    }

    /// Get a build by reference.
    pub fn build_get(&self, reference: &OperationRef) -> StateResult<Build> {
        self.builds.get(&self.db, reference)
    }

    /// All indexed builds for an application, newest first.
    pub fn build_list(&self, application: &str) -> StateResult<Vec<Build>> {
        self.builds.list(&self.db, application)
    }

    /// Delete a build by id. Idempotent.
    pub fn build_delete(&self, id: &str) -> StateResult<()> {
        self.builds.delete(&self.db, id)
    }

    /// Indexed build count for an application.
    pub fn build_indexed_len(&self, application: &str) -> StateResult<usize> {
        self.builds.indexed_len(&self.db, application)
    }

    // ── Releases ───────────────────────────────────────────────────

    /// Insert or replace a release.
    pub fn release_put(&self, index: bool, release: &Release) -> StateResult<()> {
        release
            .validate()
            .map_err(|e| StateError::Validation(e.to_string()))?;
        self.releases.put(&self.db, index, release)
    }

    /// Get a release by reference.
    pub fn release_get(&self, reference: &OperationRef) -> StateResult<Release> {
        self.releases.get(&self.db, reference)
    }

    /// All indexed releases for an application, newest first.
    pub fn release_list(&self, application: &str) -> StateResult<Vec<Release>> {
        self.releases.list(&self.db, application)
    }

    /// Delete a release by id. Idempotent.
    pub fn release_delete(&self, id: &str) -> StateResult<()> {
        self.releases.delete(&self.db, id)
    }

    /// Indexed release count for an application.
    pub fn release_indexed_len(&self, application: &str) -> StateResult<usize> {
        self.releases.indexed_len(&self.db, application)
    }

    // ── Jobs ───────────────────────────────────────────────────────

    /// Insert or replace a job.
    pub fn job_put(&self, index: bool, job: &Job) -> StateResult<()> {
        job.validate()
            .map_err(|e| StateError::Validation(e.to_string()))?;
        self.jobs.put(&self.db, index, job)
    }

    /// Get a job by reference.
    pub fn job_get(&self, reference: &OperationRef) -> StateResult<Job> {
        self.jobs.get(&self.db, reference)
    }

    /// All indexed jobs for an application, newest first.
    pub fn job_list(&self, application: &str) -> StateResult<Vec<Job>> {
        self.jobs.list(&self.db, application)
    }

    /// Delete a job by id. Idempotent.
    pub fn job_delete(&self, id: &str) -> StateResult<()> {
        self.jobs.delete(&self.db, id)
    }

    /// Indexed job count for an application.
    pub fn job_indexed_len(&self, application: &str) -> StateResult<usize> {
        self.jobs.indexed_len(&self.db, application)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slipway_core::{JobOperation, JobState, OperationStatus, StatusState};

    fn test_deployment(id: &str, app: &str) -> Deployment {
        Deployment {
            id: id.to_string(),
            application: app.to_string(),
            build_id: "build-1".to_string(),
            status: OperationStatus::running(1000),
            url: None,
            created_at: 1000,
        }
    }

    fn test_build(id: &str, app: &str) -> Build {
        Build {
            id: id.to_string(),
            application: app.to_string(),
            builder: "docker".to_string(),
            status: OperationStatus::running(1000),
            artifact_digest: Some("sha256:abc123".to_string()),
            labels: Default::default(),
            created_at: 1000,
        }
    }

    fn test_release(id: &str, app: &str) -> Release {
        Release {
            id: id.to_string(),
            application: app.to_string(),
            deployment_id: "deploy-1".to_string(),
            status: OperationStatus {
                state: StatusState::Success,
                details: String::new(),
                started_at: 1000,
                completed_at: Some(1060),
            },
            url: "https://web.example.com".to_string(),
            created_at: 1000,
        }
    }

    fn test_job(id: &str, app: &str) -> Job {
        Job {
            id: id.to_string(),
            application: app.to_string(),
            operation: JobOperation::Deploy,
            state: JobState::Queued,
            assigned_runner: None,
            created_at: 1000,
        }
    }

    // ── Deployment store ───────────────────────────────────────────

    #[test]
    fn deployment_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let deployment = test_deployment("d1", "web");

        store.deployment_put(true, &deployment).unwrap();
        let fetched = store.deployment_get(&OperationRef::by_id("d1")).unwrap();

        assert_eq!(fetched, deployment);
    }

    #[test]
    fn deployment_get_latest() {
        let store = StateStore::open_in_memory().unwrap();
        store.deployment_put(true, &test_deployment("d1", "web")).unwrap();
        store.deployment_put(true, &test_deployment("d2", "web")).unwrap();

        let latest = store.deployment_get(&OperationRef::latest("web")).unwrap();
        assert_eq!(latest.id, "d2");
    }

    #[test]
    fn deployment_validation_rejected_before_write() {
        let store = StateStore::open_in_memory().unwrap();
        let mut deployment = test_deployment("d1", "web");
        deployment.application = String::new();

        let err = store.deployment_put(true, &deployment).unwrap_err();
        assert!(matches!(err, StateError::Validation(_)));
        assert!(store
            .deployment_get(&OperationRef::by_id("d1"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn deployment_delete_is_idempotent() {
        let store = StateStore::open_in_memory().unwrap();
        store.deployment_put(true, &test_deployment("d1", "web")).unwrap();

        store.deployment_delete("d1").unwrap();
        store.deployment_delete("d1").unwrap();
        store.deployment_delete("never-existed").unwrap();

        assert!(store.deployment_list("web").unwrap().is_empty());
    }

    #[test]
    fn deployment_list_newest_first() {
        let store = StateStore::open_in_memory().unwrap();
        for id in ["d1", "d2", "d3"] {
            store.deployment_put(true, &test_deployment(id, "web")).unwrap();
        }
        store.deployment_put(true, &test_deployment("other", "api")).unwrap();

        let ids: Vec<String> = store
            .deployment_list("web")
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, ["d3", "d2", "d1"]);
    }

    #[test]
    fn deployment_prunes_old_records() {
        let store = StateStore::open_in_memory().unwrap();

        store.deployment_put(true, &test_deployment("A", "web")).unwrap();
        store.deployment_put(true, &test_deployment("B", "web")).unwrap();
        store.deployment_put(true, &test_deployment("C", "web")).unwrap();

        let txn = store.db.begin_write().unwrap();
        let deleted = store.deployments.prune_old(&txn, "web", 2).unwrap();
        txn.commit().unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(store.deployment_indexed_len("web").unwrap(), 2);

        let err = store.deployment_get(&OperationRef::by_id("A")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn deployment_retention_enforced_on_put() {
        let store = StateStore::open_in_memory_with(RetentionConfig {
            deployments: 2,
            ..Default::default()
        })
        .unwrap();

        for i in 0..5 {
            store
                .deployment_put(true, &test_deployment(&format!("d{i}"), "web"))
                .unwrap();
            assert!(store.deployment_indexed_len("web").unwrap() <= 2);
        }

        // Other applications are untouched by web's pruning.
        store.deployment_put(true, &test_deployment("api-1", "api")).unwrap();
        assert_eq!(store.deployment_indexed_len("api").unwrap(), 1);
    }

    #[test]
    fn deployment_non_indexed_put_hidden_from_listing() {
        let store = StateStore::open_in_memory().unwrap();
        store.deployment_put(false, &test_deployment("staged", "web")).unwrap();

        assert!(store.deployment_list("web").unwrap().is_empty());
        assert_eq!(store.deployment_indexed_len("web").unwrap(), 0);
        // Still addressable by id.
        assert!(store.deployment_get(&OperationRef::by_id("staged")).is_ok());
        // But not by latest.
        assert!(store
            .deployment_get(&OperationRef::latest("web"))
            .unwrap_err()
            .is_not_found());
    }

    // ── Build store ────────────────────────────────────────────────

    #[test]
    fn build_crud() {
        let store = StateStore::open_in_memory().unwrap();
        let build = test_build("b1", "web");

        store.build_put(true, &build).unwrap();
        assert_eq!(store.build_get(&OperationRef::by_id("b1")).unwrap(), build);
        assert_eq!(store.build_get(&OperationRef::latest("web")).unwrap().id, "b1");
        assert_eq!(store.build_list("web").unwrap().len(), 1);

        store.build_delete("b1").unwrap();
        assert!(store.build_list("web").unwrap().is_empty());
    }

    #[test]
    fn build_requires_builder() {
        let store = StateStore::open_in_memory().unwrap();
        let mut build = test_build("b1", "web");
        build.builder = String::new();

        let err = store.build_put(true, &build).unwrap_err();
        assert!(matches!(err, StateError::Validation(_)));
    }

    // ── Release store ──────────────────────────────────────────────

    #[test]
    fn release_crud() {
        let store = StateStore::open_in_memory().unwrap();
        let release = test_release("r1", "web");

        store.release_put(true, &release).unwrap();
        assert_eq!(store.release_get(&OperationRef::by_id("r1")).unwrap(), release);
        assert_eq!(store.release_list("web").unwrap().len(), 1);

        store.release_delete("r1").unwrap();
        assert_eq!(store.release_indexed_len("web").unwrap(), 0);
    }

    #[test]
    fn release_requires_deployment_id() {
        let store = StateStore::open_in_memory().unwrap();
        let mut release = test_release("r1", "web");
        release.deployment_id = String::new();

        let err = store.release_put(true, &release).unwrap_err();
        assert!(matches!(err, StateError::Validation(_)));
    }

    // ── Job store ──────────────────────────────────────────────────

    #[test]
    fn job_crud() {
        let store = StateStore::open_in_memory().unwrap();
        let mut job = test_job("j1", "web");

        store.job_put(true, &job).unwrap();

        // Full-replace update: the runner picks the job up.
        job.state = JobState::Running;
        job.assigned_runner = Some("runner-7".to_string());
        store.job_put(true, &job).unwrap();

        let fetched = store.job_get(&OperationRef::by_id("j1")).unwrap();
        assert_eq!(fetched.state, JobState::Running);
        assert_eq!(fetched.assigned_runner.as_deref(), Some("runner-7"));
        assert_eq!(store.job_indexed_len("web").unwrap(), 1);

        store.job_delete("j1").unwrap();
        assert!(store.job_get(&OperationRef::by_id("j1")).unwrap_err().is_not_found());
    }

    // ── Cross-kind independence ────────────────────────────────────

    #[test]
    fn kinds_share_application_without_interference() {
        let store = StateStore::open_in_memory().unwrap();
        store.deployment_put(true, &test_deployment("d1", "web")).unwrap();
        store.build_put(true, &test_build("b1", "web")).unwrap();
        store.release_put(true, &test_release("r1", "web")).unwrap();
        store.job_put(true, &test_job("j1", "web")).unwrap();

        assert_eq!(store.deployment_list("web").unwrap().len(), 1);
        assert_eq!(store.build_list("web").unwrap().len(), 1);
        assert_eq!(store.release_list("web").unwrap().len(), 1);
        assert_eq!(store.job_list("web").unwrap().len(), 1);

        store.deployment_delete("d1").unwrap();
        assert_eq!(store.build_list("web").unwrap().len(), 1);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.deployment_put(true, &test_deployment("d1", "prod")).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let fetched = store.deployment_get(&OperationRef::latest("prod")).unwrap();
        assert_eq!(fetched.id, "d1");
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.deployment_list("any").unwrap().is_empty());
        assert!(store.build_list("any").unwrap().is_empty());
        assert!(store.release_list("any").unwrap().is_empty());
        assert!(store.job_list("any").unwrap().is_empty());
        store.deployment_delete("nope").unwrap();
        store.job_delete("nope").unwrap();
        assert!(store
            .job_get(&OperationRef::latest("any"))
            .unwrap_err()
            .is_not_found());
    }
}
