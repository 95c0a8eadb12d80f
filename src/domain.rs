//! Domain module - reconciliation entities, plan builders and seams
//!
//! Everything here is pure or trait-only; storage and the taxonomy feed
//! live in the infrastructure layer.
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod article;
pub mod category;
pub mod classifier;
pub mod dictionary;
pub mod errors;
pub mod execution;
pub mod fingerprint;
pub mod repositories;
pub mod resolution;
pub mod sku_plan;
pub mod sync_plan;

// Re-export commonly used items for convenience
// Note: Be specific about re-exports to avoid ambiguous glob warnings
pub use article::ArticleFormat;
pub use category::{Category, CategoryId, CategoryTree, ExternalCategoryRecord};
pub use classifier::{classify, Classification};
pub use dictionary::{CodeDictionary, CodeRule, DictionarySnapshot, LegacyMapping, RuleId, Synonym};
pub use errors::{PlanKind, ReconciliationError, ReconciliationResult};
pub use execution::{CategoryDeletionSummary, SkuExecutionSummary, SyncExecutionSummary};
pub use resolution::{SkuResolution, UserResolutions};
pub use sku_plan::{build_sku_plan, Product, ProductId, SkuConflict, SkuResolutionPlan};
pub use sync_plan::{build_sync_plan, SyncPlan, SyncPlanEntry, WarningReason};
