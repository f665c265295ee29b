//! Local object storage using the filesystem
//!
//! Containers are directories under a root; objects are files beneath them.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};

use super::object_storage::{ObjectStorage, StoredObject};

/// Filesystem-backed object storage
pub struct LocalObjectStorage {
    /// Root directory
    root: PathBuf,
}

impl LocalObjectStorage {
    /// Create a new local object storage rooted at `root`
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Resolve an object path, refusing anything that escapes the container
    fn object_path(&self, container: &str, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || path.is_empty() {
            return Err(Error::storage(path, "invalid object path"));
        }
        Ok(self.root.join(container).join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn read_object(&self, container: &str, path: &str) -> Result<StoredObject> {
        let file_path = self.object_path(container, path)?;
        let bytes = tokio::fs::read(&file_path)
            .await
            .map_err(|e| Error::storage(path, format!("Failed to read object: {}", e)))?;

        Ok(StoredObject {
            name: path.to_string(),
            bytes,
        })
    }

    async fn list_objects(&self, container: &str) -> Result<Vec<String>> {
        let container_dir = self.root.join(container);
        if !container_dir.exists() {
            return Ok(Vec::new());
        }

        tokio::task::spawn_blocking(move || {
            let mut names = Vec::new();
            for entry in WalkDir::new(&container_dir).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    Error::storage(container_dir.display().to_string(), e.to_string())
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Ok(relative) = entry.path().strip_prefix(&container_dir) {
                    let name = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    names.push(name);
                }
            }
            Ok(names)
        })
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    fn object_url(&self, container: &str, path: &str) -> String {
        let root = self.root.to_string_lossy().replace('\\', "/");
        format!("file://{}/{}/{}", root.trim_end_matches('/'), container, path)
    }

    fn name(&self) -> &str {
        "local-filesystem"
    }
}
