//! Named-pipeline registry.
//!
//! Stores pipeline documents on disk, one JSON file per document, keyed by
//! a unique human-readable name. Names are a unique key: saving under a
//! taken name is rejected rather than overwriting.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// Directory used when `TABPIPE_STORE_DIR` is unset.
const DEFAULT_STORE_DIR: &str = ".tabpipe/pipelines";

/// Environment variable overriding the storage directory.
pub const STORE_DIR_ENV: &str = "TABPIPE_STORE_DIR";

/// A stored pipeline document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPipeline {
    pub id: Uuid,
    pub name: String,
    pub pipeline: Value,
    pub created_at: DateTime<Utc>,
}

/// Disk-backed registry of named pipelines.
pub struct PipelineRegistry {
    store_dir: PathBuf,
    /// Loaded documents, name -> document.
    documents: HashMap<String, StoredPipeline>,
}

impl PipelineRegistry {
    /// Open the registry at the directory named by `TABPIPE_STORE_DIR`,
    /// falling back to the default location.
    pub fn from_env() -> StoreResult<Self> {
        let dir = std::env::var(STORE_DIR_ENV).unwrap_or_else(|_| DEFAULT_STORE_DIR.to_string());
        Self::open(dir)
    }

    /// Open (creating if needed) a registry directory and load every
    /// document in it. Unreadable files are skipped.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let store_dir = PathBuf::from(dir.as_ref());
        fs::create_dir_all(&store_dir)?;
        let mut registry = Self {
            store_dir,
            documents: HashMap::new(),
        };
        registry.load_all()?;
        Ok(registry)
    }

    fn load_all(&mut self) -> StoreResult<()> {
        for entry in fs::read_dir(&self.store_dir)?.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            if let Ok(content) = fs::read_to_string(&path) {
                if let Ok(doc) = serde_json::from_str::<StoredPipeline>(&content) {
                    self.documents.insert(doc.name.clone(), doc);
                }
            }
        }
        Ok(())
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.store_dir.join(format!("{id}.json"))
    }

    /// Save a pipeline under a unique name, returning the document id.
    pub fn save(&mut self, name: &str, pipeline: Value) -> StoreResult<Uuid> {
        if self.documents.contains_key(name) {
            return Err(StoreError::Duplicate(name.to_string()));
        }
        let doc = StoredPipeline {
            id: Uuid::new_v4(),
            name: name.to_string(),
            pipeline,
            created_at: Utc::now(),
        };
        fs::write(self.path_for(doc.id), serde_json::to_string_pretty(&doc)?)?;
        let id = doc.id;
        self.documents.insert(doc.name.clone(), doc);
        Ok(id)
    }

    /// Exact-name lookup.
    pub fn get(&self, name: &str) -> StoreResult<&StoredPipeline> {
        self.documents
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    /// All stored documents, newest first.
    pub fn list(&self) -> Vec<&StoredPipeline> {
        let mut docs: Vec<&StoredPipeline> = self.documents.values().collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        docs
    }

    /// Delete a stored document by name.
    pub fn delete(&mut self, name: &str) -> StoreResult<()> {
        let doc = self
            .documents
            .remove(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        fs::remove_file(self.path_for(doc.id))?;
        Ok(())
    }
}
