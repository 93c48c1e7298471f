//! SQLite-backed store.
//!
//! Every operation opens its own connection inside `spawn_blocking`; no
//! connection is held across an `.await`. Tenant ownership is enforced in SQL
//! by joining each resource back to `projects` and filtering on
//! `projects.tenant_id`.

use crate::{
    DatasetStore, EvaluationStore, ProjectStore, PromptStore, RouterUpdate, SessionStore,
    StoreHealth,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use promptlab_core::{
    Dataset, DatasetRecord, DatasetSchema, DatasetUpdate, EvaluationLog, EvaluationLogPage,
    EvaluationLogQuery, NewDataset, NewEvaluationLog, NewPrompt, NewPromptVersion, Project,
    Prompt, PromptLabError, PromptRouter, PromptUpdate, PromptVersion, Result, Session,
    TenantScope,
};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration as StdDuration;
use tracing::{debug, info};

const BUSY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// Row counts reported by `promptlab stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub projects: i64,
    pub datasets: i64,
    pub records: i64,
    pub prompts: i64,
    pub prompt_versions: i64,
    pub evaluation_logs: i64,
    pub active_sessions: i64,
}

/// Store backed by a single SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: String,
}

impl SqliteStore {
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Create the schema and apply pending migrations.
    ///
    /// Returns the number of migrations applied.
    pub async fn initialize(&self) -> Result<usize> {
        let applied = self
            .with_conn(|conn| promptlab_core::init_database(conn))
            .await?;
        info!(db_path = %self.db_path, migrations_applied = applied, "Initialized database");
        Ok(applied)
    }

    /// Run `f` against a fresh connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open_connection(&db_path)?;
            f(&conn)
        })
        .await
        .map_err(|e| PromptLabError::Other(format!("Task join error: {}", e)))?
    }

    // =========================================================================
    // Session administration (CLI only)
    // =========================================================================

    /// Issue a session for `user_id` in `tenant_id`.
    ///
    /// `ttl` of `None` creates a session that never expires.
    pub async fn create_session(
        &self,
        user_id: &str,
        tenant_id: i64,
        ttl: Option<Duration>,
    ) -> Result<(Session, Option<DateTime<Utc>>)> {
        let token = crate::generate_session_token();
        let user_id = user_id.to_string();

        let (session, expires_at) = self
            .with_conn(move |conn| {
                let now = Utc::now();
                let expires_at = ttl.map(|ttl| now + ttl);
                conn.execute(
                    "INSERT INTO sessions (session_id, user_id, tenant_id, created_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![token, user_id, tenant_id, now, expires_at],
                )?;
                Ok((Session::new(token, user_id, tenant_id), expires_at))
            })
            .await?;

        info!(tenant_id, user_id = %session.user_id, "Created session");
        Ok((session, expires_at))
    }

    /// Delete a session. Returns whether it existed.
    pub async fn revoke_session(&self, token: &str) -> Result<bool> {
        let token = token.to_string();
        self.with_conn(move |conn| {
            let rows = conn.execute("DELETE FROM sessions WHERE session_id = ?1", [token])?;
            Ok(rows > 0)
        })
        .await
    }

    /// Remove sessions whose expiry has passed.
    pub async fn purge_expired_sessions(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "DELETE FROM sessions WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                [Utc::now()],
            )?;
            Ok(rows)
        })
        .await
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<i64> {
                Ok(conn.query_row(sql, [], |row| row.get(0))?)
            };
            let active_sessions: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sessions WHERE expires_at IS NULL OR expires_at > ?1",
                [Utc::now()],
                |row| row.get(0),
            )?;
            Ok(StoreStats {
                projects: count("SELECT COUNT(*) FROM projects")?,
                datasets: count("SELECT COUNT(*) FROM datasets")?,
                records: count("SELECT COUNT(*) FROM dataset_records")?,
                prompts: count("SELECT COUNT(*) FROM prompts")?,
                prompt_versions: count("SELECT COUNT(*) FROM prompt_versions")?,
                evaluation_logs: count("SELECT COUNT(*) FROM evaluation_logs")?,
                active_sessions,
            })
        })
        .await
    }
}

fn open_connection(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Begin a transaction that holds the write lock from the start, so concurrent
/// writers wait out the busy timeout instead of failing a lock upgrade.
fn begin_write(conn: &Connection) -> Result<Transaction<'_>> {
    Ok(Transaction::new_unchecked(
        conn,
        TransactionBehavior::Immediate,
    )?)
}

// =============================================================================
// Row mapping
// =============================================================================

/// Parse a JSON text column. Text that is not valid JSON comes back as a string.
fn json_column(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

const PROJECT_COLUMNS: &str = "p.id, p.tenant_id, p.name, p.created_at";

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

const DATASET_COLUMNS: &str =
    "d.id, d.project_id, d.name, d.description, d.schema, d.created_at, d.updated_at";

fn dataset_from_row(row: &Row<'_>) -> rusqlite::Result<Dataset> {
    let schema: String = row.get(4)?;
    Ok(Dataset {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        // A schema that no longer parses is served as empty
        schema: serde_json::from_str::<DatasetSchema>(&schema).unwrap_or_default(),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<DatasetRecord> {
    Ok(DatasetRecord {
        id: row.get(0)?,
        dataset_id: row.get(1)?,
        variables: json_column(row.get(2)?),
        created_at: row.get(3)?,
    })
}

const PROMPT_COLUMNS: &str = "pr.id, pr.project_id, pr.name, pr.description,
    (SELECT COALESCE(MAX(v.version), 0) FROM prompt_versions v WHERE v.prompt_id = pr.id),
    pr.created_at, pr.updated_at";

fn prompt_from_row(row: &Row<'_>) -> rusqlite::Result<Prompt> {
    Ok(Prompt {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        latest_version: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const VERSION_COLUMNS: &str =
    "v.prompt_id, v.version, v.template, v.config, v.commit_message, v.created_by, v.created_at";

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<PromptVersion> {
    Ok(PromptVersion {
        prompt_id: row.get(0)?,
        version: row.get(1)?,
        template: row.get(2)?,
        config: json_column(row.get(3)?),
        commit_message: row.get(4)?,
        created_by: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const LOG_COLUMNS: &str = "l.id, l.project_id, l.prompt_id, l.prompt_version, l.input, l.output,
    l.score, l.metadata, l.created_at";

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<EvaluationLog> {
    Ok(EvaluationLog {
        id: row.get(0)?,
        project_id: row.get(1)?,
        prompt_id: row.get(2)?,
        prompt_version: row.get(3)?,
        input: json_column(row.get(4)?),
        output: json_column(row.get(5)?),
        score: row.get(6)?,
        metadata: json_column(row.get(7)?),
        created_at: row.get(8)?,
    })
}

// =============================================================================
// Ownership checks
// =============================================================================

fn project_visible(conn: &Connection, tenant_id: i64, project_id: i64) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM projects WHERE id = ?1 AND tenant_id = ?2",
            params![project_id, tenant_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn dataset_visible(
    conn: &Connection,
    tenant_id: i64,
    project_id: i64,
    dataset_id: i64,
) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM datasets d JOIN projects p ON p.id = d.project_id
             WHERE d.id = ?1 AND d.project_id = ?2 AND p.tenant_id = ?3",
            params![dataset_id, project_id, tenant_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn prompt_visible(
    conn: &Connection,
    tenant_id: i64,
    project_id: i64,
    prompt_id: i64,
) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM prompts pr JOIN projects p ON p.id = pr.project_id
             WHERE pr.id = ?1 AND pr.project_id = ?2 AND p.tenant_id = ?3",
            params![prompt_id, project_id, tenant_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn version_exists(conn: &Connection, prompt_id: i64, version: i64) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM prompt_versions WHERE prompt_id = ?1 AND version = ?2",
            params![prompt_id, version],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn fetch_dataset(
    conn: &Connection,
    tenant_id: i64,
    project_id: i64,
    dataset_id: i64,
) -> Result<Option<Dataset>> {
    let sql = format!(
        "SELECT {} FROM datasets d JOIN projects p ON p.id = d.project_id
         WHERE d.id = ?1 AND d.project_id = ?2 AND p.tenant_id = ?3",
        DATASET_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![dataset_id, project_id, tenant_id], dataset_from_row)
        .optional()?)
}

fn fetch_prompt(
    conn: &Connection,
    tenant_id: i64,
    project_id: i64,
    prompt_id: i64,
) -> Result<Option<Prompt>> {
    let sql = format!(
        "SELECT {} FROM prompts pr JOIN projects p ON p.id = pr.project_id
         WHERE pr.id = ?1 AND pr.project_id = ?2 AND p.tenant_id = ?3",
        PROMPT_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![prompt_id, project_id, tenant_id], prompt_from_row)
        .optional()?)
}

fn fetch_version(conn: &Connection, prompt_id: i64, version: i64) -> Result<Option<PromptVersion>> {
    let sql = format!(
        "SELECT {} FROM prompt_versions v WHERE v.prompt_id = ?1 AND v.version = ?2",
        VERSION_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![prompt_id, version], version_from_row)
        .optional()?)
}

fn fetch_router(conn: &Connection, prompt_id: i64) -> Result<Option<PromptRouter>> {
    Ok(conn
        .query_row(
            "SELECT prompt_id, version, updated_at FROM prompt_routers WHERE prompt_id = ?1",
            [prompt_id],
            |row| {
                Ok(PromptRouter {
                    prompt_id: row.get(0)?,
                    version: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            },
        )
        .optional()?)
}

// =============================================================================
// Sessions
// =============================================================================

#[async_trait]
impl SessionStore for SqliteStore {
    async fn resolve_session(&self, token: &str) -> Result<Option<Session>> {
        let token = token.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT session_id, user_id, tenant_id, expires_at FROM sessions
                     WHERE session_id = ?1",
                    [&token],
                    |row| {
                        Ok((
                            Session::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get(2)?),
                            row.get::<_, Option<DateTime<Utc>>>(3)?,
                        ))
                    },
                )
                .optional()?;

            Ok(match row {
                Some((_, Some(expires_at))) if expires_at <= Utc::now() => {
                    debug!("Session expired");
                    None
                }
                Some((session, _)) => Some(session),
                None => None,
            })
        })
        .await
    }
}

// =============================================================================
// Projects
// =============================================================================

#[async_trait]
impl ProjectStore for SqliteStore {
    async fn list_projects(&self, scope: &TenantScope) -> Result<Vec<Project>> {
        let tenant_id = scope.tenant_id();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM projects p WHERE p.tenant_id = ?1 ORDER BY p.id",
                PROJECT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let projects = stmt
                .query_map([tenant_id], project_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(projects)
        })
        .await
    }

    async fn get_project(&self, scope: &TenantScope, project_id: i64) -> Result<Option<Project>> {
        let tenant_id = scope.tenant_id();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM projects p WHERE p.id = ?1 AND p.tenant_id = ?2",
                PROJECT_COLUMNS
            );
            Ok(conn
                .query_row(&sql, params![project_id, tenant_id], project_from_row)
                .optional()?)
        })
        .await
    }

    async fn create_project(&self, scope: &TenantScope, name: &str) -> Result<Project> {
        let tenant_id = scope.tenant_id();
        let name = name.to_string();
        let project = self
            .with_conn(move |conn| {
                let now = Utc::now();
                conn.execute(
                    "INSERT INTO projects (tenant_id, name, created_at) VALUES (?1, ?2, ?3)",
                    params![tenant_id, name, now],
                )?;
                Ok(Project {
                    id: conn.last_insert_rowid(),
                    tenant_id,
                    name,
                    created_at: now,
                })
            })
            .await?;

        info!(tenant_id, project_id = project.id, "Created project");
        Ok(project)
    }
}

// =============================================================================
// Datasets and records
// =============================================================================

#[async_trait]
impl DatasetStore for SqliteStore {
    async fn list_datasets(&self, scope: &TenantScope, project_id: i64) -> Result<Vec<Dataset>> {
        let tenant_id = scope.tenant_id();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM datasets d JOIN projects p ON p.id = d.project_id
                 WHERE d.project_id = ?1 AND p.tenant_id = ?2
                 ORDER BY d.created_at DESC, d.id DESC",
                DATASET_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let datasets = stmt
                .query_map(params![project_id, tenant_id], dataset_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(datasets)
        })
        .await
    }

    async fn get_dataset(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset_id: i64,
    ) -> Result<Option<Dataset>> {
        let tenant_id = scope.tenant_id();
        self.with_conn(move |conn| fetch_dataset(conn, tenant_id, project_id, dataset_id))
            .await
    }

    async fn create_dataset(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset: NewDataset,
    ) -> Result<Option<Dataset>> {
        let tenant_id = scope.tenant_id();
        self.with_conn(move |conn| {
            if !project_visible(conn, tenant_id, project_id)? {
                return Ok(None);
            }
            let now = Utc::now();
            let schema = serde_json::to_string(&dataset.schema)?;
            conn.execute(
                "INSERT INTO datasets (project_id, name, description, schema, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![project_id, dataset.name, dataset.description, schema, now],
            )?;
            Ok(Some(Dataset {
                id: conn.last_insert_rowid(),
                project_id,
                name: dataset.name,
                description: dataset.description,
                schema: dataset.schema,
                created_at: now,
                updated_at: now,
            }))
        })
        .await
    }

    async fn update_dataset(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset_id: i64,
        update: DatasetUpdate,
    ) -> Result<Option<Dataset>> {
        let tenant_id = scope.tenant_id();
        self.with_conn(move |conn| {
            let Some(mut dataset) = fetch_dataset(conn, tenant_id, project_id, dataset_id)? else {
                return Ok(None);
            };

            if let Some(name) = update.name {
                dataset.name = name;
            }
            if let Some(description) = update.description {
                dataset.description = Some(description);
            }
            if let Some(schema) = update.schema {
                dataset.schema = schema;
            }
            dataset.updated_at = Utc::now();

            conn.execute(
                "UPDATE datasets SET name = ?1, description = ?2, schema = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    dataset.name,
                    dataset.description,
                    serde_json::to_string(&dataset.schema)?,
                    dataset.updated_at,
                    dataset.id
                ],
            )?;
            Ok(Some(dataset))
        })
        .await
    }

    async fn delete_dataset(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset_id: i64,
    ) -> Result<bool> {
        let tenant_id = scope.tenant_id();
        let deleted = self
            .with_conn(move |conn| {
                let rows = conn.execute(
                    "DELETE FROM datasets WHERE id = ?1 AND project_id = ?2
                     AND project_id IN (SELECT id FROM projects WHERE tenant_id = ?3)",
                    params![dataset_id, project_id, tenant_id],
                )?;
                Ok(rows > 0)
            })
            .await?;

        if deleted {
            info!(tenant_id, project_id, dataset_id, "Deleted dataset");
        }
        Ok(deleted)
    }

    async fn list_records(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset_id: i64,
    ) -> Result<Option<Vec<DatasetRecord>>> {
        let tenant_id = scope.tenant_id();
        self.with_conn(move |conn| {
            if !dataset_visible(conn, tenant_id, project_id, dataset_id)? {
                return Ok(None);
            }
            let mut stmt = conn.prepare(
                "SELECT id, dataset_id, variables, created_at FROM dataset_records
                 WHERE dataset_id = ?1 ORDER BY created_at DESC, id DESC",
            )?;
            let records = stmt
                .query_map([dataset_id], record_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(Some(records))
        })
        .await
    }

    async fn create_record(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset_id: i64,
        variables: Value,
    ) -> Result<Option<DatasetRecord>> {
        let tenant_id = scope.tenant_id();
        self.with_conn(move |conn| {
            if !dataset_visible(conn, tenant_id, project_id, dataset_id)? {
                return Ok(None);
            }
            let now = Utc::now();
            conn.execute(
                "INSERT INTO dataset_records (dataset_id, variables, created_at) VALUES (?1, ?2, ?3)",
                params![dataset_id, serde_json::to_string(&variables)?, now],
            )?;
            Ok(Some(DatasetRecord {
                id: conn.last_insert_rowid(),
                dataset_id,
                variables,
                created_at: now,
            }))
        })
        .await
    }

    async fn delete_records(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset_id: i64,
        record_ids: &[i64],
    ) -> Result<usize> {
        let tenant_id = scope.tenant_id();
        let record_ids = record_ids.to_vec();
        let deleted = self
            .with_conn(move |conn| {
                if !dataset_visible(conn, tenant_id, project_id, dataset_id)? {
                    return Ok(0);
                }
                let tx = begin_write(conn)?;
                let mut deleted = 0;
                {
                    let mut stmt = tx.prepare(
                        "DELETE FROM dataset_records WHERE id = ?1 AND dataset_id = ?2",
                    )?;
                    for id in &record_ids {
                        deleted += stmt.execute(params![id, dataset_id])?;
                    }
                }
                tx.commit()?;
                Ok(deleted)
            })
            .await?;

        debug!(tenant_id, project_id, dataset_id, deleted, "Deleted records");
        Ok(deleted)
    }
}

// =============================================================================
// Prompts
// =============================================================================

#[async_trait]
impl PromptStore for SqliteStore {
    async fn list_prompts(&self, scope: &TenantScope, project_id: i64) -> Result<Vec<Prompt>> {
        let tenant_id = scope.tenant_id();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM prompts pr JOIN projects p ON p.id = pr.project_id
                 WHERE pr.project_id = ?1 AND p.tenant_id = ?2
                 ORDER BY pr.updated_at DESC, pr.id DESC",
                PROMPT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let prompts = stmt
                .query_map(params![project_id, tenant_id], prompt_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(prompts)
        })
        .await
    }

    async fn get_prompt(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
    ) -> Result<Option<Prompt>> {
        let tenant_id = scope.tenant_id();
        self.with_conn(move |conn| fetch_prompt(conn, tenant_id, project_id, prompt_id))
            .await
    }

    async fn create_prompt(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt: NewPrompt,
    ) -> Result<Option<Prompt>> {
        let tenant_id = scope.tenant_id();
        let user_id = scope.user_id().to_string();
        self.with_conn(move |conn| {
            if !project_visible(conn, tenant_id, project_id)? {
                return Ok(None);
            }
            let now = Utc::now();
            let tx = begin_write(conn)?;
            tx.execute(
                "INSERT INTO prompts (project_id, name, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![project_id, prompt.name, prompt.description, now],
            )?;
            let prompt_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO prompt_versions
                    (prompt_id, version, template, config, commit_message, created_by, created_at)
                 VALUES (?1, 1, ?2, ?3, NULL, ?4, ?5)",
                params![
                    prompt_id,
                    prompt.template,
                    serde_json::to_string(&prompt.config)?,
                    user_id,
                    now
                ],
            )?;
            tx.execute(
                "INSERT INTO prompt_routers (prompt_id, version, updated_at) VALUES (?1, 1, ?2)",
                params![prompt_id, now],
            )?;
            tx.commit()?;

            info!(tenant_id, project_id, prompt_id, "Created prompt");
            Ok(Some(Prompt {
                id: prompt_id,
                project_id,
                name: prompt.name,
                description: prompt.description,
                latest_version: 1,
                created_at: now,
                updated_at: now,
            }))
        })
        .await
    }

    async fn update_prompt(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
        update: PromptUpdate,
    ) -> Result<Option<Prompt>> {
        let tenant_id = scope.tenant_id();
        self.with_conn(move |conn| {
            let Some(mut prompt) = fetch_prompt(conn, tenant_id, project_id, prompt_id)? else {
                return Ok(None);
            };
            if let Some(name) = update.name {
                prompt.name = name;
            }
            if let Some(description) = update.description {
                prompt.description = Some(description);
            }
            prompt.updated_at = Utc::now();

            conn.execute(
                "UPDATE prompts SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
                params![prompt.name, prompt.description, prompt.updated_at, prompt.id],
            )?;
            Ok(Some(prompt))
        })
        .await
    }

    async fn list_versions(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
    ) -> Result<Option<Vec<PromptVersion>>> {
        let tenant_id = scope.tenant_id();
        self.with_conn(move |conn| {
            if !prompt_visible(conn, tenant_id, project_id, prompt_id)? {
                return Ok(None);
            }
            let sql = format!(
                "SELECT {} FROM prompt_versions v WHERE v.prompt_id = ?1 ORDER BY v.version",
                VERSION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let versions = stmt
                .query_map([prompt_id], version_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(Some(versions))
        })
        .await
    }

    async fn get_version(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
        version: i64,
    ) -> Result<Option<PromptVersion>> {
        let tenant_id = scope.tenant_id();
        self.with_conn(move |conn| {
            if !prompt_visible(conn, tenant_id, project_id, prompt_id)? {
                return Ok(None);
            }
            fetch_version(conn, prompt_id, version)
        })
        .await
    }

    async fn create_version(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
        version: NewPromptVersion,
    ) -> Result<Option<PromptVersion>> {
        let tenant_id = scope.tenant_id();
        let user_id = scope.user_id().to_string();
        self.with_conn(move |conn| {
            if !prompt_visible(conn, tenant_id, project_id, prompt_id)? {
                return Ok(None);
            }
            let now = Utc::now();
            let tx = begin_write(conn)?;
            let next: i64 = tx.query_row(
                "SELECT COALESCE(MAX(version), 0) + 1 FROM prompt_versions WHERE prompt_id = ?1",
                [prompt_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO prompt_versions
                    (prompt_id, version, template, config, commit_message, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    prompt_id,
                    next,
                    version.template,
                    serde_json::to_string(&version.config)?,
                    version.commit_message,
                    user_id,
                    now
                ],
            )?;
            tx.execute(
                "UPDATE prompts SET updated_at = ?1 WHERE id = ?2",
                params![now, prompt_id],
            )?;
            tx.commit()?;

            info!(tenant_id, prompt_id, version = next, "Created prompt version");
            Ok(Some(PromptVersion {
                prompt_id,
                version: next,
                template: version.template,
                config: version.config,
                commit_message: version.commit_message,
                created_by: Some(user_id),
                created_at: now,
            }))
        })
        .await
    }

    async fn get_router(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
    ) -> Result<Option<PromptRouter>> {
        let tenant_id = scope.tenant_id();
        self.with_conn(move |conn| {
            if !prompt_visible(conn, tenant_id, project_id, prompt_id)? {
                return Ok(None);
            }
            fetch_router(conn, prompt_id)
        })
        .await
    }

    async fn set_router(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
        version: i64,
    ) -> Result<RouterUpdate> {
        let tenant_id = scope.tenant_id();
        self.with_conn(move |conn| {
            if !prompt_visible(conn, tenant_id, project_id, prompt_id)? {
                return Ok(RouterUpdate::PromptNotFound);
            }
            if !version_exists(conn, prompt_id, version)? {
                return Ok(RouterUpdate::VersionNotFound);
            }
            let now = Utc::now();
            conn.execute(
                "INSERT INTO prompt_routers (prompt_id, version, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(prompt_id) DO UPDATE SET version = excluded.version,
                    updated_at = excluded.updated_at",
                params![prompt_id, version, now],
            )?;

            info!(tenant_id, prompt_id, version, "Updated prompt router");
            Ok(RouterUpdate::Updated(PromptRouter {
                prompt_id,
                version,
                updated_at: now,
            }))
        })
        .await
    }
}

// =============================================================================
// Evaluation logs
// =============================================================================

#[async_trait]
impl EvaluationStore for SqliteStore {
    async fn list_evaluation_logs(
        &self,
        scope: &TenantScope,
        project_id: i64,
        query: EvaluationLogQuery,
    ) -> Result<EvaluationLogPage> {
        let tenant_id = scope.tenant_id();
        self.with_conn(move |conn| {
            // ?3 IS NULL disables the prompt filter
            let filter = "FROM evaluation_logs l JOIN projects p ON p.id = l.project_id
                 WHERE l.project_id = ?1 AND p.tenant_id = ?2
                 AND (?3 IS NULL OR l.prompt_id = ?3)";

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) {}", filter),
                params![project_id, tenant_id, query.prompt_id],
                |row| row.get(0),
            )?;

            let sql = format!(
                "SELECT {} {} ORDER BY l.created_at DESC, l.id DESC LIMIT ?4 OFFSET ?5",
                LOG_COLUMNS, filter
            );
            let mut stmt = conn.prepare(&sql)?;
            let logs = stmt
                .query_map(
                    params![project_id, tenant_id, query.prompt_id, query.limit, query.offset],
                    log_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(EvaluationLogPage { logs, total })
        })
        .await
    }

    async fn get_evaluation_log(
        &self,
        scope: &TenantScope,
        project_id: i64,
        log_id: i64,
    ) -> Result<Option<EvaluationLog>> {
        let tenant_id = scope.tenant_id();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM evaluation_logs l JOIN projects p ON p.id = l.project_id
                 WHERE l.id = ?1 AND l.project_id = ?2 AND p.tenant_id = ?3",
                LOG_COLUMNS
            );
            Ok(conn
                .query_row(&sql, params![log_id, project_id, tenant_id], log_from_row)
                .optional()?)
        })
        .await
    }

    async fn create_evaluation_log(
        &self,
        scope: &TenantScope,
        project_id: i64,
        log: NewEvaluationLog,
    ) -> Result<Option<EvaluationLog>> {
        if log.prompt_version.is_some() && log.prompt_id.is_none() {
            return Err(PromptLabError::InvalidParameter("Invalid version".to_string()));
        }
        let tenant_id = scope.tenant_id();
        self.with_conn(move |conn| {
            if !project_visible(conn, tenant_id, project_id)? {
                return Ok(None);
            }
            if let Some(prompt_id) = log.prompt_id {
                if !prompt_visible(conn, tenant_id, project_id, prompt_id)? {
                    return Err(PromptLabError::NotFound("Prompt not found".to_string()));
                }
                if let Some(version) = log.prompt_version {
                    if !version_exists(conn, prompt_id, version)? {
                        return Err(PromptLabError::NotFound(
                            "Prompt version not found".to_string(),
                        ));
                    }
                }
            }

            let now = Utc::now();
            conn.execute(
                "INSERT INTO evaluation_logs
                    (project_id, prompt_id, prompt_version, input, output, score, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    project_id,
                    log.prompt_id,
                    log.prompt_version,
                    serde_json::to_string(&log.input)?,
                    serde_json::to_string(&log.output)?,
                    log.score,
                    serde_json::to_string(&log.metadata)?,
                    now
                ],
            )?;
            Ok(Some(EvaluationLog {
                id: conn.last_insert_rowid(),
                project_id,
                prompt_id: log.prompt_id,
                prompt_version: log.prompt_version,
                input: log.input,
                output: log.output,
                score: log.score,
                metadata: log.metadata,
                created_at: now,
            }))
        })
        .await
    }
}

#[async_trait]
impl StoreHealth for SqliteStore {
    async fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}
