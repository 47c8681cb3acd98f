//! Read-only access to workflow definitions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::StoreError;
use crate::domain::{WorkflowDefinition, WorkflowId};

/// File extensions tried by [`DirWorkflowStore`], in order
pub const DEFINITION_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Source of workflow definitions
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Load a definition; `None` when no such workflow exists
    async fn get(&self, id: WorkflowId) -> Result<Option<WorkflowDefinition>, StoreError>;
}

/// Definitions held in memory
#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    workflows: RwLock<HashMap<WorkflowId, WorkflowDefinition>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a set of definitions
    pub fn from_definitions(definitions: impl IntoIterator<Item = WorkflowDefinition>) -> Self {
        let workflows = definitions.into_iter().map(|d| (d.id, d)).collect();
        Self {
            workflows: RwLock::new(workflows),
        }
    }

    /// Add or replace a definition
    pub async fn insert(&self, definition: WorkflowDefinition) {
        self.workflows.write().await.insert(definition.id, definition);
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn get(&self, id: WorkflowId) -> Result<Option<WorkflowDefinition>, StoreError> {
        Ok(self.workflows.read().await.get(&id).cloned())
    }
}

/// Definitions stored as `<dir>/<id>.yaml|yml|json`
#[derive(Debug, Clone)]
pub struct DirWorkflowStore {
    dir: PathBuf,
}

impl DirWorkflowStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// First existing definition file for an id
    async fn locate(&self, id: WorkflowId) -> Result<Option<PathBuf>, StoreError> {
        for ext in DEFINITION_EXTENSIONS {
            let path = self.dir.join(format!("{}.{}", id, ext));
            if tokio::fs::try_exists(&path).await? {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl WorkflowStore for DirWorkflowStore {
    async fn get(&self, id: WorkflowId) -> Result<Option<WorkflowDefinition>, StoreError> {
        let Some(path) = self.locate(id).await? else {
            debug!(workflow_id = id, dir = %self.dir.display(), "No definition file");
            return Ok(None);
        };

        let content = tokio::fs::read_to_string(&path).await?;
        let is_json = path.extension().map_or(false, |ext| ext == "json");
        let parsed = if is_json {
            WorkflowDefinition::from_json(&content)
        } else {
            WorkflowDefinition::from_yaml(&content)
        };

        let mut definition = parsed.map_err(|e| StoreError::InvalidDefinition {
            path: path.clone(),
            message: format!("{:#}", e),
        })?;

        // An omitted id deserializes as 0; the file name supplies it
        if definition.id == 0 {
            definition.id = id;
        } else if definition.id != id {
            return Err(StoreError::InvalidDefinition {
                path,
                message: format!("id {} does not match the file name", definition.id),
            });
        }

        Ok(Some(definition))
    }
}
