//! Repository interfaces for the reconciliation engine
//!
//! Storage and the taxonomy feed are external collaborators; the engine only
//! sees these traits.

use async_trait::async_trait;

use crate::domain::article::ArticleFormat;
use crate::domain::category::{Category, CategoryId, ExternalCategoryRecord};
use crate::domain::dictionary::{CodeRule, DictionarySnapshot, RuleId, Synonym};
use crate::domain::errors::ReconciliationResult;
use crate::domain::execution::{CategoryDeletionSummary, SkuExecutionSummary, SyncExecutionSummary};
use crate::domain::resolution::UserResolutions;
use crate::domain::sku_plan::{Product, SkuResolutionPlan};
use crate::domain::sync_plan::SyncPlan;

/// Read access to the local catalog
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn load_categories(&self) -> ReconciliationResult<Vec<Category>>;
    async fn find_category(&self, id: CategoryId) -> ReconciliationResult<Option<Category>>;
    async fn load_products(&self) -> ReconciliationResult<Vec<Product>>;
}

/// Dictionary storage. Mutations are transactional and validated.
#[async_trait]
pub trait DictionaryRepository: Send + Sync {
    async fn load_snapshot(&self) -> ReconciliationResult<DictionarySnapshot>;

    /// New rule plus its first synonym, atomically
    async fn add_rule(&self, assigned_code: &str, synonym_name: &str) -> ReconciliationResult<CodeRule>;

    async fn add_synonym(&self, rule_id: RuleId, synonym_name: &str) -> ReconciliationResult<Synonym>;
}

/// Applies accepted plans. Each call is one transaction: it commits fully
/// or leaves the store untouched.
#[async_trait]
pub trait PlanExecutor: Send + Sync {
    async fn execute_sync_plan(&self, plan: &SyncPlan) -> ReconciliationResult<SyncExecutionSummary>;

    async fn execute_sku_plan(
        &self,
        plan: &SkuResolutionPlan,
        resolutions: &UserResolutions,
        format: &ArticleFormat,
    ) -> ReconciliationResult<SkuExecutionSummary>;

    /// Delete a category and all of its descendants
    async fn delete_category_cascade(&self, id: CategoryId) -> ReconciliationResult<CategoryDeletionSummary>;
}

/// Read-only external taxonomy source
#[async_trait]
pub trait TaxonomyFeed: Send + Sync {
    /// Full snapshot; failures surface as `FeedUnavailable`
    async fn fetch_snapshot(&self) -> ReconciliationResult<Vec<ExternalCategoryRecord>>;
}
