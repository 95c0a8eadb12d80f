//! Reconciliation use cases
//!
//! The caller-facing facade. Plan building reads the store and the cached
//! dictionary snapshot; nothing is written until one of the `execute_*`
//! operations is called with an accepted plan.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::article::ArticleFormat;
use crate::domain::category::{CategoryId, ExternalCategoryRecord};
use crate::domain::dictionary::{CodeDictionary, CodeRule, RuleId, Synonym};
use crate::domain::errors::{ReconciliationError, ReconciliationResult};
use crate::domain::execution::{CategoryDeletionSummary, SkuExecutionSummary, SyncExecutionSummary};
use crate::domain::repositories::{CatalogRepository, DictionaryRepository, PlanExecutor, TaxonomyFeed};
use crate::domain::resolution::UserResolutions;
use crate::domain::sku_plan::{build_sku_plan, SkuResolutionPlan};
use crate::domain::sync_plan::{build_sync_plan, SyncPlan};
use crate::infrastructure::config::ReconciliationConfig;

pub struct ReconciliationService {
    catalog: Arc<dyn CatalogRepository>,
    dictionary_repo: Arc<dyn DictionaryRepository>,
    executor: Arc<dyn PlanExecutor>,
    feed: Arc<dyn TaxonomyFeed>,
    dictionary: RwLock<Arc<CodeDictionary>>,
    article_format: ArticleFormat,
}

impl ReconciliationService {
    /// Wire the service. The dictionary starts empty; call
    /// [`refresh_dictionary`](Self::refresh_dictionary) before building plans.
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        dictionary_repo: Arc<dyn DictionaryRepository>,
        executor: Arc<dyn PlanExecutor>,
        feed: Arc<dyn TaxonomyFeed>,
        settings: &ReconciliationConfig,
    ) -> ReconciliationResult<Self> {
        Ok(Self {
            catalog,
            dictionary_repo,
            executor,
            feed,
            dictionary: RwLock::new(Arc::new(CodeDictionary::empty())),
            article_format: settings.article_format()?,
        })
    }

    pub fn article_format(&self) -> &ArticleFormat {
        &self.article_format
    }

    /// Current dictionary snapshot
    pub async fn dictionary(&self) -> Arc<CodeDictionary> {
        self.dictionary.read().await.clone()
    }

    /// Reload the dictionary from the store and swap the snapshot
    pub async fn refresh_dictionary(&self) -> ReconciliationResult<Arc<CodeDictionary>> {
        let snapshot = self.dictionary_repo.load_snapshot().await?;
        let dictionary = Arc::new(CodeDictionary::from_snapshot(snapshot));

        debug!(
            rules = dictionary.snapshot().rules.len(),
            synonyms = dictionary.snapshot().synonyms.len(),
            legacy_mappings = dictionary.snapshot().legacy_mappings.len(),
            providers = ?dictionary.provider_names(),
            "Dictionary refreshed"
        );

        *self.dictionary.write().await = dictionary.clone();
        Ok(dictionary)
    }

    /// Dry-run diff of an external snapshot against the local tree
    pub async fn build_sync_plan(&self, external: &[ExternalCategoryRecord]) -> ReconciliationResult<SyncPlan> {
        let categories = self.catalog.load_categories().await?;
        let dictionary = self.dictionary().await;
        Ok(build_sync_plan(external, &categories, &dictionary))
    }

    /// Read the taxonomy feed, then build a sync plan from it
    pub async fn fetch_sync_plan(&self) -> ReconciliationResult<SyncPlan> {
        let external = self.feed.fetch_snapshot().await.map_err(|e| match e {
            ReconciliationError::FeedUnavailable { .. } => e,
            other => ReconciliationError::feed_unavailable(other),
        });
        let external = match external {
            Ok(records) => records,
            Err(e) => {
                warn!("⚠️ Taxonomy feed unavailable: {}", e);
                return Err(e);
            }
        };
        info!(records = external.len(), "Taxonomy snapshot fetched");
        self.build_sync_plan(&external).await
    }

    /// Create a rule with its first synonym. The cached dictionary is not
    /// refreshed; plans built before `refresh_dictionary` stay stale.
    pub async fn add_rule(&self, assigned_code: &str, synonym_name: &str) -> ReconciliationResult<CodeRule> {
        self.dictionary_repo.add_rule(assigned_code, synonym_name).await
    }

    pub async fn add_synonym(&self, rule_id: RuleId, synonym_name: &str) -> ReconciliationResult<Synonym> {
        self.dictionary_repo.add_synonym(rule_id, synonym_name).await
    }

    /// Audit article codes against the category tree
    pub async fn build_sku_resolution_plan(&self) -> ReconciliationResult<SkuResolutionPlan> {
        let categories = self.catalog.load_categories().await?;
        let products = self.catalog.load_products().await?;
        Ok(build_sku_plan(&products, &categories, &self.article_format))
    }

    pub async fn execute_sync_plan(&self, plan: &SyncPlan) -> ReconciliationResult<SyncExecutionSummary> {
        self.executor.execute_sync_plan(plan).await
    }

    pub async fn execute_sku_plan(
        &self,
        plan: &SkuResolutionPlan,
        resolutions: &UserResolutions,
    ) -> ReconciliationResult<SkuExecutionSummary> {
        self.executor
            .execute_sku_plan(plan, resolutions, &self.article_format)
            .await
    }

    /// Delete a category together with its whole subtree
    pub async fn delete_category(&self, id: CategoryId) -> ReconciliationResult<CategoryDeletionSummary> {
        self.executor.delete_category_cascade(id).await
    }
}
