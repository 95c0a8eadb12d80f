//! Taxonomy feed adapters
//!
//! The feed is read-only. Any failure to obtain a snapshot surfaces as
//! `FeedUnavailable` and no plan is built from partial data.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::domain::category::ExternalCategoryRecord;
use crate::domain::errors::{ReconciliationError, ReconciliationResult};
use crate::domain::repositories::TaxonomyFeed;

/// Reads a JSON array of records from disk on every fetch
#[derive(Debug, Clone)]
pub struct JsonFileTaxonomyFeed {
    path: PathBuf,
}

impl JsonFileTaxonomyFeed {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TaxonomyFeed for JsonFileTaxonomyFeed {
    async fn fetch_snapshot(&self) -> ReconciliationResult<Vec<ExternalCategoryRecord>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ReconciliationError::feed_unavailable(format!("{}: {e}", self.path.display())))?;

        let records: Vec<ExternalCategoryRecord> = serde_json::from_str(&content)
            .map_err(|e| ReconciliationError::feed_unavailable(format!("{}: {e}", self.path.display())))?;

        debug!(path = %self.path.display(), records = records.len(), "Taxonomy snapshot loaded");
        Ok(records)
    }
}

/// In-memory feed. Records can be swapped between fetches, and the feed can
/// be switched into an unavailable state.
#[derive(Debug)]
pub struct StaticTaxonomyFeed {
    state: Mutex<Result<Vec<ExternalCategoryRecord>, String>>,
}

impl StaticTaxonomyFeed {
    pub fn new(records: Vec<ExternalCategoryRecord>) -> Self {
        Self {
            state: Mutex::new(Ok(records)),
        }
    }

    pub fn set_records(&self, records: Vec<ExternalCategoryRecord>) {
        if let Ok(mut state) = self.state.lock() {
            *state = Ok(records);
        }
    }

    pub fn set_unavailable(&self, reason: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            *state = Err(reason.into());
        }
    }
}

#[async_trait]
impl TaxonomyFeed for StaticTaxonomyFeed {
    async fn fetch_snapshot(&self) -> ReconciliationResult<Vec<ExternalCategoryRecord>> {
        let state = self
            .state
            .lock()
            .map_err(|_| ReconciliationError::feed_unavailable("feed state lock poisoned"))?;
        state.clone().map_err(ReconciliationError::feed_unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn json_file_feed_reads_records() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("taxonomy.json");
        std::fs::write(
            &path,
            r#"[
                {"externalId": "ext-1", "name": "Бельё"},
                {"externalId": "ext-2", "name": "Комплекты", "parentExternalId": "ext-1"}
            ]"#,
        )?;

        let records = JsonFileTaxonomyFeed::new(&path).fetch_snapshot().await?;
        assert_eq!(
            records,
            vec![
                ExternalCategoryRecord::new("ext-1", "Бельё", None),
                ExternalCategoryRecord::new("ext-2", "Комплекты", Some("ext-1")),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn missing_or_malformed_file_is_feed_unavailable() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let missing = JsonFileTaxonomyFeed::new(dir.path().join("absent.json"));
        assert!(matches!(
            missing.fetch_snapshot().await,
            Err(ReconciliationError::FeedUnavailable { .. })
        ));

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json")?;
        assert!(matches!(
            JsonFileTaxonomyFeed::new(&path).fetch_snapshot().await,
            Err(ReconciliationError::FeedUnavailable { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn static_feed_can_go_down() {
        let feed = StaticTaxonomyFeed::new(vec![ExternalCategoryRecord::new("ext-1", "Бельё", None)]);
        assert_eq!(feed.fetch_snapshot().await.map(|r| r.len()), Ok(1));

        feed.set_unavailable("connection reset");
        assert_eq!(
            feed.fetch_snapshot().await,
            Err(ReconciliationError::feed_unavailable("connection reset"))
        );
    }
}
