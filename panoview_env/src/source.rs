//! Panorama data sources.

use crate::error::SourceError;
use async_trait::async_trait;
use panoview_core::Panorama;
use std::path::PathBuf;
use tracing::debug;

/// Anything that can hand the navigator a full panorama set.
///
/// # Implementations
///
/// - **In-memory**: `StaticSource` - fixed list, used by tests and the simulator
/// - **File**: `JsonFileSource` - JSON array exported from the backend API
///
/// Each `load` returns the complete authoritative set; the navigator
/// replaces, never merges.
#[async_trait]
pub trait PanoramaSource: Send + Sync {
    /// Loads the current panorama set.
    async fn load(&self) -> Result<Vec<Panorama>, SourceError>;

    /// Human-readable source name for logs.
    fn name(&self) -> &str;
}

/// A fixed, in-memory panorama list.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    name: String,
    panoramas: Vec<Panorama>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, panoramas: Vec<Panorama>) -> Self {
        Self {
            name: name.into(),
            panoramas,
        }
    }
}

#[async_trait]
impl PanoramaSource for StaticSource {
    async fn load(&self) -> Result<Vec<Panorama>, SourceError> {
        Ok(self.panoramas.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Reads a JSON array of panorama objects from disk.
///
/// Each object needs `id`, `latitude` and `longitude`; every other field is
/// preserved as opaque data.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    name: String,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }
}

#[async_trait]
impl PanoramaSource for JsonFileSource {
    async fn load(&self) -> Result<Vec<Panorama>, SourceError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|source| SourceError::Io {
            path: self.name.clone(),
            source,
        })?;

        let panoramas: Vec<Panorama> =
            serde_json::from_slice(&bytes).map_err(|e| SourceError::decode(&self.name, e))?;

        debug!("Loaded {} panoramas from {}", panoramas.len(), self.name);
        Ok(panoramas)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
