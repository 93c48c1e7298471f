//! PromptLab Storage
//!
//! Store abstraction for the PromptLab API. Each resource type has its own
//! trait; every tenant-scoped method takes a [`TenantScope`] and must confine
//! its reads and writes to projects owned by `scope.tenant_id()`.
//!
//! # Architecture
//!
//! ```text
//! Route handler ──(&TenantScope, ids)──▶ DatasetStore / PromptStore / ...
//!                                              │
//!                          ┌───────────────────┴───────────────────┐
//!                     SqliteStore                           InMemoryStore
//!                (spawn_blocking + rusqlite)          (feature = "test-utils")
//! ```
//!
//! Absence is not an error: lookups return `Ok(None)` when the resource does
//! not exist *or* belongs to another tenant, so callers cannot tell the two
//! apart.

use async_trait::async_trait;
use promptlab_core::{
    Dataset, DatasetRecord, DatasetUpdate, EvaluationLog, EvaluationLogPage, EvaluationLogQuery,
    NewDataset, NewEvaluationLog, NewPrompt, NewPromptVersion, Project, Prompt, PromptRouter,
    PromptUpdate, PromptVersion, Result, Session, TenantScope,
};
use rand::RngCore;
use serde_json::Value;

pub mod sqlite;

#[cfg(feature = "test-utils")]
pub mod memory;

pub use sqlite::SqliteStore;

#[cfg(feature = "test-utils")]
pub use memory::{InMemoryStore, StoreCall};

/// Prefix for generated session tokens.
pub const SESSION_TOKEN_PREFIX: &str = "pls_";

/// Random bytes in a session token (hex encoded, so twice as many characters).
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Generate a new opaque session token.
pub fn generate_session_token() -> String {
    let mut bytes = vec![0u8; SESSION_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("{}{}", SESSION_TOKEN_PREFIX, hex::encode(bytes))
}

/// Resolves session tokens to sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a session by its token.
    ///
    /// Unknown and expired tokens return `Ok(None)`. `Err` is reserved for
    /// failures of the store itself.
    async fn resolve_session(&self, token: &str) -> Result<Option<Session>>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn list_projects(&self, scope: &TenantScope) -> Result<Vec<Project>>;

    async fn get_project(&self, scope: &TenantScope, project_id: i64) -> Result<Option<Project>>;

    /// Create a project owned by the scope's tenant.
    async fn create_project(&self, scope: &TenantScope, name: &str) -> Result<Project>;
}

#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Datasets of a project. Unknown or foreign projects yield an empty list.
    async fn list_datasets(&self, scope: &TenantScope, project_id: i64) -> Result<Vec<Dataset>>;

    async fn get_dataset(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset_id: i64,
    ) -> Result<Option<Dataset>>;

    /// Returns `None` when the project is not visible to the scope.
    async fn create_dataset(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset: NewDataset,
    ) -> Result<Option<Dataset>>;

    async fn update_dataset(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset_id: i64,
        update: DatasetUpdate,
    ) -> Result<Option<Dataset>>;

    /// Returns whether a dataset was deleted.
    async fn delete_dataset(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset_id: i64,
    ) -> Result<bool>;

    /// Records of a dataset, or `None` when the dataset is not visible.
    async fn list_records(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset_id: i64,
    ) -> Result<Option<Vec<DatasetRecord>>>;

    async fn create_record(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset_id: i64,
        variables: Value,
    ) -> Result<Option<DatasetRecord>>;

    /// Delete records by id and return how many were removed.
    ///
    /// Ids that do not belong to the dataset (or the tenant) are ignored.
    async fn delete_records(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset_id: i64,
        record_ids: &[i64],
    ) -> Result<usize>;
}

/// Outcome of pointing a prompt's router at a version.
#[derive(Debug, Clone, PartialEq)]
pub enum RouterUpdate {
    Updated(PromptRouter),
    PromptNotFound,
    VersionNotFound,
}

#[async_trait]
pub trait PromptStore: Send + Sync {
    async fn list_prompts(&self, scope: &TenantScope, project_id: i64) -> Result<Vec<Prompt>>;

    async fn get_prompt(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
    ) -> Result<Option<Prompt>>;

    /// Create a prompt with its first version and a router pointing at it.
    async fn create_prompt(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt: NewPrompt,
    ) -> Result<Option<Prompt>>;

    async fn update_prompt(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
        update: PromptUpdate,
    ) -> Result<Option<Prompt>>;

    /// All versions in ascending order, or `None` when the prompt is not visible.
    async fn list_versions(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
    ) -> Result<Option<Vec<PromptVersion>>>;

    async fn get_version(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
        version: i64,
    ) -> Result<Option<PromptVersion>>;

    /// Append the next version (latest + 1).
    async fn create_version(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
        version: NewPromptVersion,
    ) -> Result<Option<PromptVersion>>;

    async fn get_router(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
    ) -> Result<Option<PromptRouter>>;

    async fn set_router(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
        version: i64,
    ) -> Result<RouterUpdate>;
}

#[async_trait]
pub trait EvaluationStore: Send + Sync {
    /// Newest first. Unknown or foreign projects yield an empty page.
    async fn list_evaluation_logs(
        &self,
        scope: &TenantScope,
        project_id: i64,
        query: EvaluationLogQuery,
    ) -> Result<EvaluationLogPage>;

    async fn get_evaluation_log(
        &self,
        scope: &TenantScope,
        project_id: i64,
        log_id: i64,
    ) -> Result<Option<EvaluationLog>>;

    /// Returns `None` when the project is not visible.
    ///
    /// # Errors
    ///
    /// `PromptLabError::NotFound` when `prompt_id` names a prompt outside the project.
    async fn create_evaluation_log(
        &self,
        scope: &TenantScope,
        project_id: i64,
        log: NewEvaluationLog,
    ) -> Result<Option<EvaluationLog>>;
}

/// Connectivity probe used by the readiness endpoint.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<()>;
}

/// Everything the API needs from a store.
pub trait Store:
    SessionStore + ProjectStore + DatasetStore + PromptStore + EvaluationStore + StoreHealth + 'static
{
}

impl<T> Store for T where
    T: SessionStore
        + ProjectStore
        + DatasetStore
        + PromptStore
        + EvaluationStore
        + StoreHealth
        + 'static
{
}
