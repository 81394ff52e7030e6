use std::path::PathBuf;

use super::{CollectError, DataSource, RawDatasets};

/// Reads `{"sales": [...], "marketing": [...], "support": [...]}` from disk.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl DataSource for JsonFileSource {
    async fn fetch_all(&self) -> Result<RawDatasets, CollectError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| CollectError::Source(format!("{}: {}", self.path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| CollectError::Source(format!("{}: {}", self.path.display(), e)))
    }
}
