use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{EvalError, Result};
use crate::models::{Batch, DatasetHandle};

/// Optional persistence of a batch before it is scored
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Save `batch` under its name and return where it went
    async fn save(&self, batch: &Batch) -> Result<DatasetHandle>;
}

/// Stores each batch as a pretty-printed JSON file named after the batch
pub struct FileDatasetStore {
    dir: PathBuf,
    project_name: String,
    overwrite: bool,
}

impl FileDatasetStore {
    pub fn new(dir: impl Into<PathBuf>, project_name: impl Into<String>, overwrite: bool) -> Self {
        Self {
            dir: dir.into(),
            project_name: project_name.into(),
            overwrite,
        }
    }

    fn path_for(&self, alias: &str) -> PathBuf {
        let file_name: String = alias
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }

    /// Ensure the directory for the dataset file exists
    fn ensure_directory_exists(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                EvalError::DatasetStore(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl DatasetStore for FileDatasetStore {
    async fn save(&self, batch: &Batch) -> Result<DatasetHandle> {
        let path = self.path_for(&batch.name);
        if path.exists() && !self.overwrite {
            return Err(EvalError::DatasetStore(format!(
                "Dataset {:?} already exists at {}",
                batch.name,
                path.display()
            )));
        }

        let json_content = serde_json::to_string_pretty(batch).map_err(|e| {
            EvalError::DatasetStore(format!("Failed to serialize dataset {:?}: {}", batch.name, e))
        })?;
        Self::ensure_directory_exists(&path)?;
        std::fs::write(&path, json_content).map_err(|e| {
            EvalError::DatasetStore(format!("Failed to write {}: {}", path.display(), e))
        })?;

        info!(alias = %batch.name, path = %path.display(), "Dataset stored");

        Ok(DatasetHandle {
            alias: batch.name.clone(),
            project_name: self.project_name.clone(),
            location: path.display().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Example;
    use tempfile::tempdir;

    fn venus_batch() -> Batch {
        Batch::new(
            "venus_dataset",
            vec![Example {
                input: "Why are there no rovers on Venus?".into(),
                actual_output: "It is too hot.".into(),
                expected_output: None,
                retrieval_context: Some(vec![
                    "The temperature and pressure on Venus are too high for probes.".into(),
                ]),
            }],
        )
    }

    #[tokio::test]
    async fn test_save_writes_batch() {
        let temp_dir = tempdir().unwrap();
        let store = FileDatasetStore::new(temp_dir.path().join("nested"), "SolarSystem", true);

        let handle = store.save(&venus_batch()).await.unwrap();

        assert_eq!(handle.alias, "venus_dataset");
        assert_eq!(handle.project_name, "SolarSystem");
        let content = std::fs::read_to_string(&handle.location).unwrap();
        let stored: Batch = serde_json::from_str(&content).unwrap();
        assert_eq!(stored, venus_batch());
    }

    #[tokio::test]
    async fn test_save_refuses_to_overwrite() {
        let temp_dir = tempdir().unwrap();
        let store = FileDatasetStore::new(temp_dir.path(), "SolarSystem", false);

        store.save(&venus_batch()).await.unwrap();
        let second = store.save(&venus_batch()).await;

        assert!(matches!(second, Err(EvalError::DatasetStore(_))));
    }

    #[tokio::test]
    async fn test_save_overwrites_when_allowed() {
        let temp_dir = tempdir().unwrap();
        let store = FileDatasetStore::new(temp_dir.path(), "SolarSystem", true);

        store.save(&venus_batch()).await.unwrap();
        store.save(&venus_batch()).await.unwrap();
    }

    #[test]
    fn test_alias_is_sanitized_into_file_name() {
        let store = FileDatasetStore::new("/data", "p", true);
        assert_eq!(
            store.path_for("Mars Questions/v2"),
            PathBuf::from("/data/Mars_Questions_v2.json")
        );
    }
}
