//! PromptLab Core
//!
//! Core types, validation, the record variable builder, and the SQLite schema
//! shared by the PromptLab storage, API and CLI crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub mod migrations;
pub mod session;
pub mod validation;
pub mod variables;

pub use session::{Session, TenantScope, SENTINEL_TENANT_ID};

// ============================================================================
// Projects
// ============================================================================

/// A project owned by exactly one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Datasets and Records
// ============================================================================

/// Declared type of a dataset schema field.
///
/// Unknown type names deserialize to `Other` and are treated as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Number,
    Boolean,
    Null,
    Array,
    Object,
    #[serde(other)]
    Other,
}

/// Schema entry for a single dotted field path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaField {
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
}

impl SchemaField {
    pub fn new(field_type: FieldType) -> Self {
        Self { field_type }
    }
}

/// Dataset schema keyed by dotted field path (e.g. `user.age`).
pub type DatasetSchema = BTreeMap<String, SchemaField>;

/// A dataset inside a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub schema: DatasetSchema,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when creating a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDataset {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub schema: DatasetSchema,
}

/// Partial update for a dataset. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub schema: Option<DatasetSchema>,
}

/// A single record of a dataset. `variables` is the nested variable tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetRecord {
    pub id: i64,
    pub dataset_id: i64,
    pub variables: Value,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Prompts
// ============================================================================

/// A prompt with a linear history of versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub latest_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when creating a prompt. The template becomes version 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPrompt {
    pub name: String,
    pub description: Option<String>,
    pub template: String,
    #[serde(default)]
    pub config: Value,
}

/// Partial update for prompt metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// An immutable version of a prompt template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptVersion {
    pub prompt_id: i64,
    pub version: i64,
    pub template: String,
    pub config: Value,
    pub commit_message: Option<String>,
    /// User who created the version, when known
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when appending a prompt version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPromptVersion {
    pub template: String,
    #[serde(default)]
    pub config: Value,
    pub commit_message: Option<String>,
}

/// Which version of a prompt is served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRouter {
    pub prompt_id: i64,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Evaluation Logs
// ============================================================================

/// A logged evaluation run of a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationLog {
    pub id: i64,
    pub project_id: i64,
    pub prompt_id: Option<i64>,
    pub prompt_version: Option<i64>,
    pub input: Value,
    pub output: Value,
    pub score: Option<f64>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when logging an evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvaluationLog {
    pub prompt_id: Option<i64>,
    pub prompt_version: Option<i64>,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Value,
    pub score: Option<f64>,
    #[serde(default)]
    pub metadata: Value,
}

/// Filter and page window for listing evaluation logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationLogQuery {
    pub prompt_id: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for EvaluationLogQuery {
    fn default() -> Self {
        Self {
            prompt_id: None,
            limit: validation::DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// One page of evaluation logs plus the unpaged total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationLogPage {
    pub logs: Vec<EvaluationLog>,
    pub total: i64,
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur in PromptLab operations
#[derive(Debug, thiserror::Error)]
pub enum PromptLabError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflicting field path: {0}")]
    ConflictingPath(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for PromptLabError {
    fn from(err: serde_json::Error) -> Self {
        PromptLabError::SerializationError(err.to_string())
    }
}

/// Result type for PromptLab operations
pub type Result<T> = std::result::Result<T, PromptLabError>;

// ============================================================================
// Schema
// ============================================================================

/// Initialize the SQLite schema
///
/// Creates the base tables if they don't exist:
/// - `sessions`: Issued sessions (user, tenant, expiry)
/// - `projects`: Tenant-owned projects; the tenant boundary for every query
/// - `datasets`: Datasets with their field schema (JSON)
/// - `dataset_records`: Records with serialized variable trees
/// - `prompts` / `prompt_versions`: Prompts and their immutable versions
/// - `prompt_routers`: The version each prompt serves
/// - `evaluation_logs`: Logged evaluation runs per project
///
/// Applied as step 1 by [`migrations::run_migrations`].
pub fn init_sqlite_schema(conn: &rusqlite::Connection) -> Result<()> {
    let ddl = r#"
    CREATE TABLE IF NOT EXISTS sessions (
      session_id TEXT PRIMARY KEY,
      user_id TEXT NOT NULL,
      tenant_id INTEGER NOT NULL,
      created_at TEXT NOT NULL,
      expires_at TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_sessions_tenant_id ON sessions(tenant_id);

    CREATE TABLE IF NOT EXISTS projects (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      tenant_id INTEGER NOT NULL,
      name TEXT NOT NULL,
      created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_projects_tenant_id ON projects(tenant_id);

    CREATE TABLE IF NOT EXISTS datasets (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      project_id INTEGER NOT NULL,
      name TEXT NOT NULL,
      description TEXT,
      schema TEXT NOT NULL DEFAULT '{}',
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL,
      FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_datasets_project_id ON datasets(project_id);

    CREATE TABLE IF NOT EXISTS dataset_records (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      dataset_id INTEGER NOT NULL,
      variables TEXT NOT NULL,
      created_at TEXT NOT NULL,
      FOREIGN KEY (dataset_id) REFERENCES datasets(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_dataset_records_dataset_id ON dataset_records(dataset_id);

    CREATE TABLE IF NOT EXISTS prompts (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      project_id INTEGER NOT NULL,
      name TEXT NOT NULL,
      description TEXT,
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL,
      FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_prompts_project_id ON prompts(project_id);

    CREATE TABLE IF NOT EXISTS prompt_versions (
      prompt_id INTEGER NOT NULL,
      version INTEGER NOT NULL,
      template TEXT NOT NULL,
      config TEXT NOT NULL DEFAULT 'null',
      commit_message TEXT,
      created_by TEXT,
      created_at TEXT NOT NULL,
      PRIMARY KEY (prompt_id, version),
      FOREIGN KEY (prompt_id) REFERENCES prompts(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS prompt_routers (
      prompt_id INTEGER PRIMARY KEY,
      version INTEGER NOT NULL,
      updated_at TEXT NOT NULL,
      FOREIGN KEY (prompt_id) REFERENCES prompts(id) ON DELETE CASCADE,
      FOREIGN KEY (prompt_id, version) REFERENCES prompt_versions(prompt_id, version)
    );

    CREATE TABLE IF NOT EXISTS evaluation_logs (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      project_id INTEGER NOT NULL,
      prompt_id INTEGER,
      prompt_version INTEGER,
      input TEXT NOT NULL DEFAULT 'null',
      output TEXT NOT NULL DEFAULT 'null',
      score REAL,
      metadata TEXT NOT NULL DEFAULT 'null',
      created_at TEXT NOT NULL,
      FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
      FOREIGN KEY (prompt_id) REFERENCES prompts(id) ON DELETE SET NULL
    );

    CREATE INDEX IF NOT EXISTS idx_evaluation_logs_project ON evaluation_logs(project_id, created_at DESC);
    CREATE INDEX IF NOT EXISTS idx_evaluation_logs_prompt ON evaluation_logs(prompt_id);
    "#;

    conn.execute_batch(ddl)?;
    Ok(())
}

/// Open-and-migrate helper used by the server and CLI.
///
/// Enables foreign keys and applies pending migrations, returning how many ran.
pub fn init_database(conn: &rusqlite::Connection) -> Result<usize> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    migrations::run_migrations(conn)
}
