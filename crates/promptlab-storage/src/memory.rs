//! In-memory store for tests.
//!
//! Implements every store trait over plain vectors behind a `parking_lot`
//! mutex, applying the same tenant rules as [`crate::SqliteStore`]. Each
//! tenant-scoped call is recorded as a [`StoreCall`] so tests can assert
//! which tenant and ids reached the store, or that nothing did.
//!
//! Seeding helpers (`insert_*`) and session lookups are not recorded.

use crate::{
    DatasetStore, EvaluationStore, ProjectStore, PromptStore, RouterUpdate, SessionStore,
    StoreHealth,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use promptlab_core::{
    Dataset, DatasetRecord, DatasetSchema, DatasetUpdate, EvaluationLog, EvaluationLogPage,
    EvaluationLogQuery, NewDataset, NewEvaluationLog, NewPrompt, NewPromptVersion, Project,
    Prompt, PromptLabError, PromptRouter, PromptUpdate, PromptVersion, Result, Session,
    TenantScope,
};
use serde_json::Value;
use std::collections::HashMap;

/// One recorded store invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    /// Trait method name, e.g. `"delete_records"`
    pub operation: &'static str,
    /// Tenant the call was scoped to
    pub tenant_id: i64,
    /// Resource ids passed in, in argument order
    pub ids: Vec<i64>,
}

#[derive(Default)]
struct State {
    next_id: i64,
    sessions: HashMap<String, Session>,
    projects: Vec<Project>,
    datasets: Vec<Dataset>,
    records: Vec<DatasetRecord>,
    prompts: Vec<Prompt>,
    versions: Vec<PromptVersion>,
    routers: HashMap<i64, PromptRouter>,
    logs: Vec<EvaluationLog>,
    calls: Vec<StoreCall>,
    failure: Option<String>,
    session_failure: Option<String>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Record the call, then fail if failure injection is armed.
    fn record(&mut self, operation: &'static str, scope: &TenantScope, ids: Vec<i64>) -> Result<()> {
        self.calls.push(StoreCall {
            operation,
            tenant_id: scope.tenant_id(),
            ids,
        });
        match &self.failure {
            Some(message) => Err(PromptLabError::Other(message.clone())),
            None => Ok(()),
        }
    }

    fn project_visible(&self, tenant_id: i64, project_id: i64) -> bool {
        self.projects
            .iter()
            .any(|p| p.id == project_id && p.tenant_id == tenant_id)
    }

    fn dataset_index(&self, tenant_id: i64, project_id: i64, dataset_id: i64) -> Option<usize> {
        if !self.project_visible(tenant_id, project_id) {
            return None;
        }
        self.datasets
            .iter()
            .position(|d| d.id == dataset_id && d.project_id == project_id)
    }

    fn prompt_index(&self, tenant_id: i64, project_id: i64, prompt_id: i64) -> Option<usize> {
        if !self.project_visible(tenant_id, project_id) {
            return None;
        }
        self.prompts
            .iter()
            .position(|p| p.id == prompt_id && p.project_id == project_id)
    }

    fn version_exists(&self, prompt_id: i64, version: i64) -> bool {
        self.versions
            .iter()
            .any(|v| v.prompt_id == prompt_id && v.version == version)
    }
}

/// Store that keeps everything in memory.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Call log and failure injection
    // =========================================================================

    /// Every recorded call, oldest first.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().calls.clone()
    }

    pub fn calls_for(&self, operation: &str) -> Vec<StoreCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Make every tenant-scoped call fail with `message` (after recording it).
    pub fn fail_with(&self, message: impl Into<String>) {
        self.state.lock().failure = Some(message.into());
    }

    /// Make session resolution fail with `message`.
    pub fn fail_session_lookup(&self, message: impl Into<String>) {
        self.state.lock().session_failure = Some(message.into());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failure = None;
        state.session_failure = None;
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    pub fn insert_session(&self, token: &str, user_id: &str, tenant_id: i64) -> Session {
        let session = Session::new(token, user_id, tenant_id);
        self.state
            .lock()
            .sessions
            .insert(token.to_string(), session.clone());
        session
    }

    pub fn insert_project(&self, tenant_id: i64, name: &str) -> Project {
        let mut state = self.state.lock();
        let project = Project {
            id: state.next_id(),
            tenant_id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        state.projects.push(project.clone());
        project
    }

    pub fn insert_dataset(&self, project_id: i64, name: &str, schema: DatasetSchema) -> Dataset {
        let mut state = self.state.lock();
        let now = Utc::now();
        let dataset = Dataset {
            id: state.next_id(),
            project_id,
            name: name.to_string(),
            description: None,
            schema,
            created_at: now,
            updated_at: now,
        };
        state.datasets.push(dataset.clone());
        dataset
    }

    pub fn insert_record(&self, dataset_id: i64, variables: Value) -> DatasetRecord {
        let mut state = self.state.lock();
        let record = DatasetRecord {
            id: state.next_id(),
            dataset_id,
            variables,
            created_at: Utc::now(),
        };
        state.records.push(record.clone());
        record
    }

    /// Seed a prompt with version 1 and a router pointing at it.
    pub fn insert_prompt(&self, project_id: i64, name: &str, template: &str) -> Prompt {
        let mut state = self.state.lock();
        let now = Utc::now();
        let prompt = Prompt {
            id: state.next_id(),
            project_id,
            name: name.to_string(),
            description: None,
            latest_version: 1,
            created_at: now,
            updated_at: now,
        };
        state.versions.push(PromptVersion {
            prompt_id: prompt.id,
            version: 1,
            template: template.to_string(),
            config: Value::Null,
            commit_message: None,
            created_by: None,
            created_at: now,
        });
        state.routers.insert(
            prompt.id,
            PromptRouter {
                prompt_id: prompt.id,
                version: 1,
                updated_at: now,
            },
        );
        state.prompts.push(prompt.clone());
        prompt
    }

    /// Ids of the records currently stored for a dataset.
    pub fn record_ids(&self, dataset_id: i64) -> Vec<i64> {
        self.state
            .lock()
            .records
            .iter()
            .filter(|r| r.dataset_id == dataset_id)
            .map(|r| r.id)
            .collect()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn resolve_session(&self, token: &str) -> Result<Option<Session>> {
        let state = self.state.lock();
        if let Some(message) = &state.session_failure {
            return Err(PromptLabError::Other(message.clone()));
        }
        Ok(state.sessions.get(token).cloned())
    }
}

#[async_trait]
impl ProjectStore for InMemoryStore {
    async fn list_projects(&self, scope: &TenantScope) -> Result<Vec<Project>> {
        let mut state = self.state.lock();
        state.record("list_projects", scope, vec![])?;
        Ok(state
            .projects
            .iter()
            .filter(|p| p.tenant_id == scope.tenant_id())
            .cloned()
            .collect())
    }

    async fn get_project(&self, scope: &TenantScope, project_id: i64) -> Result<Option<Project>> {
        let mut state = self.state.lock();
        state.record("get_project", scope, vec![project_id])?;
        Ok(state
            .projects
            .iter()
            .find(|p| p.id == project_id && p.tenant_id == scope.tenant_id())
            .cloned())
    }

    async fn create_project(&self, scope: &TenantScope, name: &str) -> Result<Project> {
        let mut state = self.state.lock();
        state.record("create_project", scope, vec![])?;
        let project = Project {
            id: state.next_id(),
            tenant_id: scope.tenant_id(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        state.projects.push(project.clone());
        Ok(project)
    }
}

#[async_trait]
impl DatasetStore for InMemoryStore {
    async fn list_datasets(&self, scope: &TenantScope, project_id: i64) -> Result<Vec<Dataset>> {
        let mut state = self.state.lock();
        state.record("list_datasets", scope, vec![project_id])?;
        if !state.project_visible(scope.tenant_id(), project_id) {
            return Ok(Vec::new());
        }
        Ok(state
            .datasets
            .iter()
            .rev()
            .filter(|d| d.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn get_dataset(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset_id: i64,
    ) -> Result<Option<Dataset>> {
        let mut state = self.state.lock();
        state.record("get_dataset", scope, vec![project_id, dataset_id])?;
        Ok(state
            .dataset_index(scope.tenant_id(), project_id, dataset_id)
            .map(|i| state.datasets[i].clone()))
    }

    async fn create_dataset(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset: NewDataset,
    ) -> Result<Option<Dataset>> {
        let mut state = self.state.lock();
        state.record("create_dataset", scope, vec![project_id])?;
        if !state.project_visible(scope.tenant_id(), project_id) {
            return Ok(None);
        }
        let now = Utc::now();
        let dataset = Dataset {
            id: state.next_id(),
            project_id,
            name: dataset.name,
            description: dataset.description,
            schema: dataset.schema,
            created_at: now,
            updated_at: now,
        };
        state.datasets.push(dataset.clone());
        Ok(Some(dataset))
    }

    async fn update_dataset(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset_id: i64,
        update: DatasetUpdate,
    ) -> Result<Option<Dataset>> {
        let mut state = self.state.lock();
        state.record("update_dataset", scope, vec![project_id, dataset_id])?;
        let Some(index) = state.dataset_index(scope.tenant_id(), project_id, dataset_id) else {
            return Ok(None);
        };
        let dataset = &mut state.datasets[index];
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
        Ok(Some(dataset.clone()))
    }

    async fn delete_dataset(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset_id: i64,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        state.record("delete_dataset", scope, vec![project_id, dataset_id])?;
        let Some(index) = state.dataset_index(scope.tenant_id(), project_id, dataset_id) else {
            return Ok(false);
        };
        state.datasets.remove(index);
        state.records.retain(|r| r.dataset_id != dataset_id);
        Ok(true)
    }

    async fn list_records(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset_id: i64,
    ) -> Result<Option<Vec<DatasetRecord>>> {
        let mut state = self.state.lock();
        state.record("list_records", scope, vec![project_id, dataset_id])?;
        if state
            .dataset_index(scope.tenant_id(), project_id, dataset_id)
            .is_none()
        {
            return Ok(None);
        }
        Ok(Some(
            state
                .records
                .iter()
                .rev()
                .filter(|r| r.dataset_id == dataset_id)
                .cloned()
                .collect(),
        ))
    }

    async fn create_record(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset_id: i64,
        variables: Value,
    ) -> Result<Option<DatasetRecord>> {
        let mut state = self.state.lock();
        state.record("create_record", scope, vec![project_id, dataset_id])?;
        if state
            .dataset_index(scope.tenant_id(), project_id, dataset_id)
            .is_none()
        {
            return Ok(None);
        }
        let record = DatasetRecord {
            id: state.next_id(),
            dataset_id,
            variables,
            created_at: Utc::now(),
        };
        state.records.push(record.clone());
        Ok(Some(record))
    }

    async fn delete_records(
        &self,
        scope: &TenantScope,
        project_id: i64,
        dataset_id: i64,
        record_ids: &[i64],
    ) -> Result<usize> {
        let mut state = self.state.lock();
        let mut ids = vec![project_id, dataset_id];
        ids.extend_from_slice(record_ids);
        state.record("delete_records", scope, ids)?;
        if state
            .dataset_index(scope.tenant_id(), project_id, dataset_id)
            .is_none()
        {
            return Ok(0);
        }
        let before = state.records.len();
        state
            .records
            .retain(|r| !(r.dataset_id == dataset_id && record_ids.contains(&r.id)));
        Ok(before - state.records.len())
    }
}

#[async_trait]
impl PromptStore for InMemoryStore {
    async fn list_prompts(&self, scope: &TenantScope, project_id: i64) -> Result<Vec<Prompt>> {
        let mut state = self.state.lock();
        state.record("list_prompts", scope, vec![project_id])?;
        if !state.project_visible(scope.tenant_id(), project_id) {
            return Ok(Vec::new());
        }
        let mut prompts: Vec<Prompt> = state
            .prompts
            .iter()
            .filter(|p| p.project_id == project_id)
            .cloned()
            .collect();
        prompts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(prompts)
    }

    async fn get_prompt(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
    ) -> Result<Option<Prompt>> {
        let mut state = self.state.lock();
        state.record("get_prompt", scope, vec![project_id, prompt_id])?;
        Ok(state
            .prompt_index(scope.tenant_id(), project_id, prompt_id)
            .map(|i| state.prompts[i].clone()))
    }

    async fn create_prompt(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt: NewPrompt,
    ) -> Result<Option<Prompt>> {
        let mut state = self.state.lock();
        state.record("create_prompt", scope, vec![project_id])?;
        if !state.project_visible(scope.tenant_id(), project_id) {
            return Ok(None);
        }
        let now = Utc::now();
        let created = Prompt {
            id: state.next_id(),
            project_id,
            name: prompt.name,
            description: prompt.description,
            latest_version: 1,
            created_at: now,
            updated_at: now,
        };
        state.versions.push(PromptVersion {
            prompt_id: created.id,
            version: 1,
            template: prompt.template,
            config: prompt.config,
            commit_message: None,
            created_by: Some(scope.user_id().to_string()),
            created_at: now,
        });
        state.routers.insert(
            created.id,
            PromptRouter {
                prompt_id: created.id,
                version: 1,
                updated_at: now,
            },
        );
        state.prompts.push(created.clone());
        Ok(Some(created))
    }

    async fn update_prompt(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
        update: PromptUpdate,
    ) -> Result<Option<Prompt>> {
        let mut state = self.state.lock();
        state.record("update_prompt", scope, vec![project_id, prompt_id])?;
        let Some(index) = state.prompt_index(scope.tenant_id(), project_id, prompt_id) else {
            return Ok(None);
        };
        let prompt = &mut state.prompts[index];
        if let Some(name) = update.name {
            prompt.name = name;
        }
        if let Some(description) = update.description {
            prompt.description = Some(description);
        }
        prompt.updated_at = Utc::now();
        Ok(Some(prompt.clone()))
    }

    async fn list_versions(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
    ) -> Result<Option<Vec<PromptVersion>>> {
        let mut state = self.state.lock();
        state.record("list_versions", scope, vec![project_id, prompt_id])?;
        if state
            .prompt_index(scope.tenant_id(), project_id, prompt_id)
            .is_none()
        {
            return Ok(None);
        }
        let mut versions: Vec<PromptVersion> = state
            .versions
            .iter()
            .filter(|v| v.prompt_id == prompt_id)
            .cloned()
            .collect();
        versions.sort_by_key(|v| v.version);
        Ok(Some(versions))
    }

    async fn get_version(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
        version: i64,
    ) -> Result<Option<PromptVersion>> {
        let mut state = self.state.lock();
        state.record("get_version", scope, vec![project_id, prompt_id, version])?;
        if state
            .prompt_index(scope.tenant_id(), project_id, prompt_id)
            .is_none()
        {
            return Ok(None);
        }
        Ok(state
            .versions
            .iter()
            .find(|v| v.prompt_id == prompt_id && v.version == version)
            .cloned())
    }

    async fn create_version(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
        version: NewPromptVersion,
    ) -> Result<Option<PromptVersion>> {
        let mut state = self.state.lock();
        state.record("create_version", scope, vec![project_id, prompt_id])?;
        let Some(index) = state.prompt_index(scope.tenant_id(), project_id, prompt_id) else {
            return Ok(None);
        };
        let now = Utc::now();
        let next = state.prompts[index].latest_version + 1;
        state.prompts[index].latest_version = next;
        state.prompts[index].updated_at = now;

        let created = PromptVersion {
            prompt_id,
            version: next,
            template: version.template,
            config: version.config,
            commit_message: version.commit_message,
            created_by: Some(scope.user_id().to_string()),
            created_at: now,
        };
        state.versions.push(created.clone());
        Ok(Some(created))
    }

    async fn get_router(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
    ) -> Result<Option<PromptRouter>> {
        let mut state = self.state.lock();
        state.record("get_router", scope, vec![project_id, prompt_id])?;
        if state
            .prompt_index(scope.tenant_id(), project_id, prompt_id)
            .is_none()
        {
            return Ok(None);
        }
        Ok(state.routers.get(&prompt_id).cloned())
    }

    async fn set_router(
        &self,
        scope: &TenantScope,
        project_id: i64,
        prompt_id: i64,
        version: i64,
    ) -> Result<RouterUpdate> {
        let mut state = self.state.lock();
        state.record("set_router", scope, vec![project_id, prompt_id, version])?;
        if state
            .prompt_index(scope.tenant_id(), project_id, prompt_id)
            .is_none()
        {
            return Ok(RouterUpdate::PromptNotFound);
        }
        if !state.version_exists(prompt_id, version) {
            return Ok(RouterUpdate::VersionNotFound);
        }
        let router = PromptRouter {
            prompt_id,
            version,
            updated_at: Utc::now(),
        };
        state.routers.insert(prompt_id, router.clone());
        Ok(RouterUpdate::Updated(router))
    }
}

#[async_trait]
impl EvaluationStore for InMemoryStore {
    async fn list_evaluation_logs(
        &self,
        scope: &TenantScope,
        project_id: i64,
        query: EvaluationLogQuery,
    ) -> Result<EvaluationLogPage> {
        let mut state = self.state.lock();
        state.record("list_evaluation_logs", scope, vec![project_id])?;
        if !state.project_visible(scope.tenant_id(), project_id) {
            return Ok(EvaluationLogPage {
                logs: Vec::new(),
                total: 0,
            });
        }
        let matching: Vec<&EvaluationLog> = state
            .logs
            .iter()
            .rev()
            .filter(|l| l.project_id == project_id)
            .filter(|l| query.prompt_id.map_or(true, |id| l.prompt_id == Some(id)))
            .collect();
        let total = matching.len() as i64;
        let logs = matching
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .cloned()
            .collect();
        Ok(EvaluationLogPage { logs, total })
    }

    async fn get_evaluation_log(
        &self,
        scope: &TenantScope,
        project_id: i64,
        log_id: i64,
    ) -> Result<Option<EvaluationLog>> {
        let mut state = self.state.lock();
        state.record("get_evaluation_log", scope, vec![project_id, log_id])?;
        if !state.project_visible(scope.tenant_id(), project_id) {
            return Ok(None);
        }
        Ok(state
            .logs
            .iter()
            .find(|l| l.id == log_id && l.project_id == project_id)
            .cloned())
    }

    async fn create_evaluation_log(
        &self,
        scope: &TenantScope,
        project_id: i64,
        log: NewEvaluationLog,
    ) -> Result<Option<EvaluationLog>> {
        let mut state = self.state.lock();
        state.record("create_evaluation_log", scope, vec![project_id])?;
        if log.prompt_version.is_some() && log.prompt_id.is_none() {
            return Err(PromptLabError::InvalidParameter("Invalid version".to_string()));
        }
        if !state.project_visible(scope.tenant_id(), project_id) {
            return Ok(None);
        }
        if let Some(prompt_id) = log.prompt_id {
            if state
                .prompt_index(scope.tenant_id(), project_id, prompt_id)
                .is_none()
            {
                return Err(PromptLabError::NotFound("Prompt not found".to_string()));
            }
            if let Some(version) = log.prompt_version {
                if !state.version_exists(prompt_id, version) {
                    return Err(PromptLabError::NotFound(
                        "Prompt version not found".to_string(),
                    ));
                }
            }
        }
        let created = EvaluationLog {
            id: state.next_id(),
            project_id,
            prompt_id: log.prompt_id,
            prompt_version: log.prompt_version,
            input: log.input,
            output: log.output,
            score: log.score,
            metadata: log.metadata,
            created_at: Utc::now(),
        };
        state.logs.push(created.clone());
        Ok(Some(created))
    }
}

#[async_trait]
impl StoreHealth for InMemoryStore {
    async fn ping(&self) -> Result<()> {
        match &self.state.lock().failure {
            Some(message) => Err(PromptLabError::Other(message.clone())),
            None => Ok(()),
        }
    }
}
