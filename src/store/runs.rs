//! Run record persistence interface and the in-memory store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::StoreError;
use crate::domain::{RunRecord, RunStatus, TransitionError, WorkflowId};

/// Default page size for run listings
pub const DEFAULT_LIMIT: usize = 50;

/// Largest page a listing may return
pub const MAX_LIMIT: usize = 200;

/// Persistence for run records
///
/// A record is written twice in its life: once on creation and once when it
/// reaches its final status.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a new record
    async fn create(&self, record: &RunRecord) -> Result<(), StoreError>;

    /// Persist a status change together with logs and `finished_at`
    async fn update_status(&self, record: &RunRecord) -> Result<(), StoreError>;

    /// Look up a record by id
    async fn get(&self, id: Uuid) -> Result<Option<RunRecord>, StoreError>;

    /// List records, newest first
    async fn list(&self, query: &RunQuery) -> Result<Vec<RunRecord>, StoreError>;

    /// Count records matching the filters
    async fn count(
        &self,
        workflow_id: Option<WorkflowId>,
        status: Option<RunStatus>,
    ) -> Result<usize, StoreError>;
}

/// Filter and page for run listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunQuery {
    pub workflow_id: Option<WorkflowId>,
    pub status: Option<RunStatus>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for RunQuery {
    fn default() -> Self {
        Self {
            workflow_id: None,
            status: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl RunQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs of one workflow
    pub fn for_workflow(workflow_id: WorkflowId) -> Self {
        Self {
            workflow_id: Some(workflow_id),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: Option<RunStatus>) -> Self {
        self.status = status;
        self
    }

    /// Set the page size, clamped to `1..=MAX_LIMIT`
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.clamp(1, MAX_LIMIT);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Page size actually applied
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, MAX_LIMIT)
    }

    /// Check whether a record passes the filters
    pub fn matches(&self, record: &RunRecord) -> bool {
        self.workflow_id.map_or(true, |id| record.workflow_id == id)
            && self.status.map_or(true, |status| record.status == status)
    }
}

/// Insertion-ordered table of run records shared by the store implementations
#[derive(Debug, Default)]
pub(crate) struct RunTable {
    records: Vec<RunRecord>,
    index: HashMap<Uuid, usize>,
}

impl RunTable {
    pub(crate) fn insert(&mut self, record: RunRecord) -> Result<(), StoreError> {
        if self.index.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        self.index.insert(record.id, self.records.len());
        self.records.push(record);
        Ok(())
    }

    /// Validate a status change against the stored record
    pub(crate) fn check_update(&self, record: &RunRecord) -> Result<(), StoreError> {
        let stored = self.get(record.id).ok_or(StoreError::NotFound(record.id))?;
        if !stored.status.can_transition_to(record.status) {
            return Err(StoreError::InvalidTransition(TransitionError {
                from: stored.status,
                to: record.status,
            }));
        }
        Ok(())
    }

    pub(crate) fn update(&mut self, record: &RunRecord) -> Result<(), StoreError> {
        self.check_update(record)?;
        self.apply(
            record.id,
            record.status,
            record.logs.clone(),
            record.finished_at,
        );
        Ok(())
    }

    /// Overwrite mutable fields without validation; returns false for unknown ids
    pub(crate) fn apply(
        &mut self,
        id: Uuid,
        status: RunStatus,
        logs: Value,
        finished_at: Option<DateTime<Utc>>,
    ) -> bool {
        let Some(&slot) = self.index.get(&id) else {
            return false;
        };
        let stored = &mut self.records[slot];
        stored.status = status;
        stored.logs = logs;
        stored.finished_at = finished_at;
        true
    }

    pub(crate) fn get(&self, id: Uuid) -> Option<&RunRecord> {
        self.index.get(&id).map(|&slot| &self.records[slot])
    }

    /// Newest first; records created at the same instant keep reverse insertion order
    pub(crate) fn select(&self, query: &RunQuery) -> Vec<RunRecord> {
        let mut matching: Vec<&RunRecord> = self
            .records
            .iter()
            .rev()
            .filter(|record| query.matches(record))
            .collect();

        // Stable sort keeps the reverse insertion order among ties
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        matching
            .into_iter()
            .skip(query.offset)
            .take(query.effective_limit())
            .cloned()
            .collect()
    }

    pub(crate) fn count(&self, workflow_id: Option<WorkflowId>, status: Option<RunStatus>) -> usize {
        let query = RunQuery {
            workflow_id,
            status,
            ..RunQuery::default()
        };
        self.records.iter().filter(|r| query.matches(r)).count()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

/// Non-durable store; contents are lost on restart
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    table: RwLock<RunTable>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create(&self, record: &RunRecord) -> Result<(), StoreError> {
        self.table.write().await.insert(record.clone())
    }

    async fn update_status(&self, record: &RunRecord) -> Result<(), StoreError> {
        self.table.write().await.update(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.table.read().await.get(id).cloned())
    }

    async fn list(&self, query: &RunQuery) -> Result<Vec<RunRecord>, StoreError> {
        Ok(self.table.read().await.select(query))
    }

    async fn count(
        &self,
        workflow_id: Option<WorkflowId>,
        status: Option<RunStatus>,
    ) -> Result<usize, StoreError> {
        Ok(self.table.read().await.count(workflow_id, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn record_at(workflow_id: WorkflowId, offset_secs: i64) -> RunRecord {
        let mut record = RunRecord::running(workflow_id);
        record.created_at = record.created_at + Duration::seconds(offset_secs);
        record
    }

    #[test]
    fn test_query_limit_clamped() {
        assert_eq!(RunQuery::new().effective_limit(), DEFAULT_LIMIT);
        assert_eq!(RunQuery::new().with_limit(0).limit, 1);
        assert_eq!(RunQuery::new().with_limit(1000).limit, MAX_LIMIT);

        let raw = RunQuery {
            limit: 0,
            ..RunQuery::default()
        };
        assert_eq!(raw.effective_limit(), 1);
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryRunStore::new();
        let record = RunRecord::running(1);

        store.create(&record).await.unwrap();
        assert_eq!(store.get(record.id).await.unwrap(), Some(record.clone()));

        let err = store.create(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(id) if id == record.id));
    }

    #[tokio::test]
    async fn test_update_status() {
        let store = MemoryRunStore::new();
        let mut record = RunRecord::running(1);
        store.create(&record).await.unwrap();

        record
            .finish(RunStatus::Success, json!({"final_state": {}}))
            .unwrap();
        store.update_status(&record).await.unwrap();

        let stored = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Success);
        assert!(stored.finished_at.is_some());

        // Terminal records cannot move again
        let err = store.update_status(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_update_unknown_record() {
        let store = MemoryRunStore::new();
        let record = RunRecord::running(1);

        let err = store.update_status(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == record.id));
    }

    #[tokio::test]
    async fn test_list_newest_first_with_paging() {
        let store = MemoryRunStore::new();
        let oldest = record_at(1, -20);
        let middle = record_at(1, -10);
        let newest = record_at(1, 0);
        let other = record_at(2, 5);

        // Insert out of chronological order
        for record in [&middle, &newest, &oldest, &other] {
            store.create(record).await.unwrap();
        }

        let ids: Vec<Uuid> = store
            .list(&RunQuery::for_workflow(1))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![newest.id, middle.id, oldest.id]);

        let page = store
            .list(&RunQuery::for_workflow(1).with_limit(1).with_offset(1))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, middle.id);

        assert_eq!(store.list(&RunQuery::new()).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_ties_fall_back_to_reverse_insertion() {
        let store = MemoryRunStore::new();
        let first = RunRecord::running(1);
        let mut second = RunRecord::running(1);
        second.created_at = first.created_at;

        store.create(&first).await.unwrap();
        store.create(&second).await.unwrap();

        let listed = store.list(&RunQuery::for_workflow(1)).await.unwrap();
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[tokio::test]
    async fn test_status_filter_and_count() {
        let store = MemoryRunStore::new();
        let mut failed = RunRecord::running(1);
        store.create(&failed).await.unwrap();
        failed
            .finish(RunStatus::Failed, json!({"error": "boom"}))
            .unwrap();
        store.update_status(&failed).await.unwrap();
        store.create(&RunRecord::running(1)).await.unwrap();
        store.create(&RunRecord::running(2)).await.unwrap();

        let query = RunQuery::for_workflow(1).with_status(Some(RunStatus::Failed));
        let listed = store.list(&query).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, failed.id);

        assert_eq!(store.count(None, None).await.unwrap(), 3);
        assert_eq!(store.count(Some(1), None).await.unwrap(), 2);
        assert_eq!(
            store.count(Some(1), Some(RunStatus::Running)).await.unwrap(),
            1
        );
    }
}
