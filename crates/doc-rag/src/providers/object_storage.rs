//! Object storage trait for reading source documents

use async_trait::async_trait;

use crate::error::Result;

/// A downloaded object
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Object name inside its container (e.g. `manuals/setup.md`)
    pub name: String,
    /// Raw bytes
    pub bytes: Vec<u8>,
}

/// Trait for the object storage that notifications refer to
///
/// Implementations:
/// - `LocalObjectStorage`: directories under a local root
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Download an object
    async fn read_object(&self, container: &str, path: &str) -> Result<StoredObject>;

    /// List object names in a container
    async fn list_objects(&self, container: &str) -> Result<Vec<String>>;

    /// URL that notifications use for an object
    fn object_url(&self, container: &str, path: &str) -> String;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
