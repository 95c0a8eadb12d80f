//! Transactional plan executor backed by SQLite
//!
//! Each execution opens one transaction, re-reads the state the plan was
//! built from and compares fingerprints before the first write. Any failure
//! drops the transaction, which rolls it back.

use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn, Instrument};

use crate::domain::article::ArticleFormat;
use crate::domain::category::{Category, CategoryId, CategoryTree};
use crate::domain::errors::{PlanKind, ReconciliationError, ReconciliationResult};
use crate::domain::execution::{CategoryDeletionSummary, SkuExecutionSummary, SyncExecutionSummary};
use crate::domain::fingerprint::{sku_fingerprint, sync_fingerprint};
use crate::domain::repositories::PlanExecutor;
use crate::domain::resolution::{SkuResolution, UserResolutions};
use crate::domain::sku_plan::{ProductId, SkuResolutionPlan};
use crate::domain::sync_plan::{CreateEntry, ParentRef, SyncPlan, SyncPlanEntry};
use crate::infrastructure::catalog_repository::{fetch_categories, fetch_products};
use crate::infrastructure::dictionary_repository::fetch_snapshot;

pub struct SqlitePlanExecutor {
    pool: SqlitePool,
}

impl SqlitePlanExecutor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn ensure_fingerprint(plan_kind: PlanKind, expected: &str, actual: &str) -> ReconciliationResult<()> {
    if expected != actual {
        warn!(%plan_kind, expected, actual, "Plan fingerprint mismatch");
        return Err(ReconciliationError::stale(
            plan_kind,
            "catalog or dictionary changed since the plan was built; rebuild it",
        ));
    }
    Ok(())
}

/// Hands out `order` values per parent, continuing after existing siblings
struct SiblingOrders<'a> {
    tree: &'a CategoryTree,
    next: HashMap<Option<CategoryId>, i64>,
}

impl<'a> SiblingOrders<'a> {
    fn new(tree: &'a CategoryTree) -> Self {
        Self {
            tree,
            next: HashMap::new(),
        }
    }

    fn take(&mut self, parent_id: Option<CategoryId>) -> i64 {
        let tree = self.tree;
        let slot = self
            .next
            .entry(parent_id)
            .or_insert_with(|| tree.next_sibling_order(parent_id));
        let order = *slot;
        *slot += 1;
        order
    }
}

/// Creates in an order where every pending parent precedes its children
fn creation_order<'p>(creates: Vec<&'p CreateEntry>) -> ReconciliationResult<Vec<&'p CreateEntry>> {
    let mut ordered = Vec::with_capacity(creates.len());
    let mut placed: HashSet<&str> = HashSet::with_capacity(creates.len());
    let mut remaining = creates;

    while !remaining.is_empty() {
        let before = remaining.len();
        let (ready, blocked): (Vec<_>, Vec<_>) = remaining.into_iter().partition(|create| match &create.parent {
            ParentRef::Pending(parent) => placed.contains(parent.as_str()),
            ParentRef::Root | ParentRef::Local(_) => true,
        });
        for create in ready {
            placed.insert(create.external_id.as_str());
            ordered.push(create);
        }
        if blocked.len() == before {
            return Err(ReconciliationError::stale(
                PlanKind::Sync,
                format!("{} new categories reference each other as parents", blocked.len()),
            ));
        }
        remaining = blocked;
    }

    Ok(ordered)
}

async fn insert_category(
    conn: &mut SqliteConnection,
    create: &CreateEntry,
    parent_id: Option<CategoryId>,
    order: i64,
) -> ReconciliationResult<CategoryId> {
    let now = chrono::Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        INSERT INTO categories (name, code, parent_id, sort_order, external_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&create.name)
    .bind(&create.assigned_code)
    .bind(parent_id)
    .bind(order)
    .bind(&create.external_id)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

async fn apply_sync_plan(conn: &mut SqliteConnection, plan: &SyncPlan) -> ReconciliationResult<SyncExecutionSummary> {
    let categories = fetch_categories(conn).await?;
    let dictionary = fetch_snapshot(conn).await?;
    ensure_fingerprint(PlanKind::Sync, &plan.fingerprint, &sync_fingerprint(&categories, &dictionary))?;

    let tree = CategoryTree::new(&categories);
    let mut orders = SiblingOrders::new(&tree);
    let mut created_ids: HashMap<&str, CategoryId> = HashMap::new();
    let mut creates = Vec::new();
    let mut summary = SyncExecutionSummary::default();

    for entry in &plan.entries {
        match entry {
            SyncPlanEntry::Create(create) => creates.push(create),
            SyncPlanEntry::Update(update) => {
                let result = sqlx::query("UPDATE categories SET name = ?, updated_at = ? WHERE id = ?")
                    .bind(&update.new_name)
                    .bind(chrono::Utc::now().to_rfc3339())
                    .bind(update.id)
                    .execute(&mut *conn)
                    .await?;
                if result.rows_affected() == 0 {
                    return Err(ReconciliationError::stale(
                        PlanKind::Sync,
                        format!("category {} no longer exists", update.id),
                    ));
                }
                summary.updated += 1;
            }
            SyncPlanEntry::NoAction(_) => {}
            SyncPlanEntry::Warning(warning) => {
                return Err(ReconciliationError::stale(
                    PlanKind::Sync,
                    format!("unresolved warning for '{}': {}", warning.name, warning.reason),
                ));
            }
        }
    }

    for create in creation_order(creates)? {
        let parent_id = match &create.parent {
            ParentRef::Root => None,
            ParentRef::Local(id) => {
                if tree.get(*id).is_none() {
                    return Err(ReconciliationError::stale(
                        PlanKind::Sync,
                        format!("parent category {id} no longer exists"),
                    ));
                }
                Some(*id)
            }
            ParentRef::Pending(external_id) => created_ids.get(external_id.as_str()).copied(),
        };
        let order = orders.take(parent_id);
        let id = insert_category(conn, create, parent_id, order).await?;
        created_ids.insert(create.external_id.as_str(), id);
        summary.created += 1;
    }

    Ok(summary)
}

async fn set_article(conn: &mut SqliteConnection, product_id: ProductId, article: &str) -> ReconciliationResult<()> {
    sqlx::query("UPDATE products SET article = ?, updated_at = ? WHERE id = ?")
        .bind(article)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(product_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Allocates sequences per prefix, starting after every article already
/// stored. An article is never handed out twice, even when two prefixes
/// can synthesize the same text (`B` + `20001` and `B2` + `0001`).
struct SequenceAllocator<'a> {
    format: &'a ArticleFormat,
    existing: Vec<String>,
    taken: HashSet<String>,
    next: HashMap<String, u64>,
}

impl<'a> SequenceAllocator<'a> {
    fn new(format: &'a ArticleFormat, existing: Vec<String>) -> Self {
        let taken = existing.iter().map(|article| article.trim().to_string()).collect();
        Self {
            format,
            existing,
            taken,
            next: HashMap::new(),
        }
    }

    fn allocate(&mut self, prefix: &str) -> ReconciliationResult<String> {
        let mut sequence = match self.next.get(prefix) {
            Some(next) => *next,
            None => self
                .format
                .next_sequence(prefix, self.existing.iter().map(String::as_str))?,
        };

        loop {
            let article = self.format.synthesize(prefix, sequence);
            let following = sequence.checked_add(1).ok_or_else(|| {
                ReconciliationError::validation(format!("article sequences for prefix '{prefix}' are exhausted"))
            })?;
            if self.taken.insert(article.clone()) {
                self.next.insert(prefix.to_string(), following);
                return Ok(article);
            }
            sequence = following;
        }
    }
}

async fn apply_sku_plan(
    conn: &mut SqliteConnection,
    plan: &SkuResolutionPlan,
    resolutions: &UserResolutions,
    format: &ArticleFormat,
) -> ReconciliationResult<SkuExecutionSummary> {
    let categories: Vec<Category> = fetch_categories(conn).await?;
    let products = fetch_products(conn).await?;
    ensure_fingerprint(PlanKind::Sku, &plan.fingerprint, &sku_fingerprint(&categories, &products))?;

    let existing = products
        .iter()
        .filter_map(|product| product.article().map(str::to_string))
        .collect();
    let mut sequences = SequenceAllocator::new(format, existing);
    let mut summary = SkuExecutionSummary::default();

    for missing in &plan.to_create {
        let article = sequences.allocate(&missing.expected_article)?;
        set_article(conn, missing.product_id, &article).await?;
        summary.articles_created += 1;
    }

    for conflict in &plan.conflicts {
        let Some(resolution) = resolutions.get(conflict.product_id) else {
            return Err(ReconciliationError::stale(
                PlanKind::Sku,
                format!("product {} has no resolution", conflict.product_id),
            ));
        };
        match resolution {
            SkuResolution::FixSku => {
                let article = sequences.allocate(&conflict.expected_article)?;
                set_article(conn, conflict.product_id, &article).await?;
                summary.articles_fixed += 1;
            }
            SkuResolution::RevertCategory => {
                let Some(target) = conflict.expected_category_id_from_article else {
                    return Err(ReconciliationError::stale(
                        PlanKind::Sku,
                        format!("product {} has no category to revert to", conflict.product_id),
                    ));
                };
                sqlx::query("DELETE FROM product_categories WHERE product_id = ?")
                    .bind(conflict.product_id)
                    .execute(&mut *conn)
                    .await?;
                sqlx::query("INSERT INTO product_categories (product_id, category_id) VALUES (?, ?)")
                    .bind(conflict.product_id)
                    .bind(target)
                    .execute(&mut *conn)
                    .await?;
                summary.categories_reverted += 1;
            }
        }
    }

    Ok(summary)
}

async fn apply_cascade_delete(conn: &mut SqliteConnection, id: CategoryId) -> ReconciliationResult<CategoryDeletionSummary> {
    let categories = fetch_categories(conn).await?;
    let tree = CategoryTree::new(&categories);
    if tree.get(id).is_none() {
        return Err(ReconciliationError::not_found("category", id));
    }

    let subtree = tree.subtree_post_order(id);

    // Detach first so a parent cycle inside the subtree cannot trip the
    // foreign key on any single delete
    for category_id in &subtree {
        sqlx::query("UPDATE categories SET parent_id = NULL WHERE id = ?")
            .bind(category_id)
            .execute(&mut *conn)
            .await?;
    }

    let mut summary = CategoryDeletionSummary::default();
    for category_id in subtree {
        sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(category_id)
            .execute(&mut *conn)
            .await?;
        summary.deleted += 1;
    }
    Ok(summary)
}

#[async_trait]
impl PlanExecutor for SqlitePlanExecutor {
    async fn execute_sync_plan(&self, plan: &SyncPlan) -> ReconciliationResult<SyncExecutionSummary> {
        plan.ensure_executable()?;

        let span = tracing::info_span!("execute_sync_plan", fingerprint = %plan.fingerprint);
        async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| ReconciliationError::transaction_failure(PlanKind::Sync, e))?;

            let summary = apply_sync_plan(&mut tx, plan)
                .await
                .map_err(|e| e.into_transaction_failure(PlanKind::Sync))?;

            tx.commit()
                .await
                .map_err(|e| ReconciliationError::transaction_failure(PlanKind::Sync, e))?;

            info!(created = summary.created, updated = summary.updated, "✅ Sync plan executed");
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    async fn execute_sku_plan(
        &self,
        plan: &SkuResolutionPlan,
        resolutions: &UserResolutions,
        format: &ArticleFormat,
    ) -> ReconciliationResult<SkuExecutionSummary> {
        resolutions.ensure_covers(plan)?;

        let span = tracing::info_span!("execute_sku_plan", fingerprint = %plan.fingerprint);
        async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| ReconciliationError::transaction_failure(PlanKind::Sku, e))?;

            let summary = apply_sku_plan(&mut tx, plan, resolutions, format)
                .await
                .map_err(|e| e.into_transaction_failure(PlanKind::Sku))?;

            tx.commit()
                .await
                .map_err(|e| ReconciliationError::transaction_failure(PlanKind::Sku, e))?;

            info!(
                articles_fixed = summary.articles_fixed,
                categories_reverted = summary.categories_reverted,
                articles_created = summary.articles_created,
                "✅ SKU plan executed"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    async fn delete_category_cascade(&self, id: CategoryId) -> ReconciliationResult<CategoryDeletionSummary> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ReconciliationError::transaction_failure(PlanKind::CategoryDeletion, e))?;

        let summary = apply_cascade_delete(&mut tx, id)
            .await
            .map_err(|e| e.into_transaction_failure(PlanKind::CategoryDeletion))?;

        tx.commit()
            .await
            .map_err(|e| ReconciliationError::transaction_failure(PlanKind::CategoryDeletion, e))?;

        info!(category_id = id, deleted = summary.deleted, "🗑️ Category subtree deleted");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::category::ExternalCategoryRecord;
    use crate::domain::dictionary::CodeDictionary;
    use crate::domain::sku_plan::build_sku_plan;
    use crate::domain::sync_plan::build_sync_plan;
    use crate::domain::repositories::CatalogRepository;
    use crate::infrastructure::catalog_repository::SqliteCatalogRepository;
    use crate::test_utils::TestDatabase;

    async fn sync_plan_for(db: &TestDatabase, external: &[ExternalCategoryRecord]) -> anyhow::Result<SyncPlan> {
        let mut conn = db.connection.pool().acquire().await?;
        let categories = fetch_categories(&mut conn).await?;
        let dictionary = CodeDictionary::from_snapshot(fetch_snapshot(&mut conn).await?);
        Ok(build_sync_plan(external, &categories, &dictionary))
    }

    async fn sku_plan_for(db: &TestDatabase) -> anyhow::Result<SkuResolutionPlan> {
        sku_plan_with(db, &ArticleFormat::default()).await
    }

    async fn sku_plan_with(db: &TestDatabase, format: &ArticleFormat) -> anyhow::Result<SkuResolutionPlan> {
        let mut conn = db.connection.pool().acquire().await?;
        let categories = fetch_categories(&mut conn).await?;
        let products = fetch_products(&mut conn).await?;
        Ok(build_sku_plan(&products, &categories, format))
    }

    #[tokio::test]
    async fn creates_children_after_parents_listed_later() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        db.insert_legacy_mapping("Бельё", "BE").await?;
        db.insert_legacy_mapping("Комплекты", "KP").await?;
        let external = vec![
            ExternalCategoryRecord::new("ext-kp", "Комплекты", Some("ext-be")),
            ExternalCategoryRecord::new("ext-be", "Бельё", None),
        ];
        let plan = sync_plan_for(&db, &external).await?;
        let executor = SqlitePlanExecutor::new(db.pool());

        let summary = executor.execute_sync_plan(&plan).await?;
        assert_eq!(summary, SyncExecutionSummary { created: 2, updated: 0 });

        let categories = SqliteCatalogRepository::new(db.pool()).load_categories().await?;
        let be = categories.iter().find(|c| c.code == "BE").expect("parent created");
        let kp = categories.iter().find(|c| c.code == "KP").expect("child created");
        assert_eq!(kp.parent_id, Some(be.id));
        assert_eq!(kp.external_id.as_deref(), Some("ext-kp"));
        Ok(())
    }

    #[tokio::test]
    async fn new_categories_follow_existing_siblings() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        db.insert_category("Носки", "NS", None).await?;
        db.insert_legacy_mapping("Пижамы", "PJ").await?;
        let plan = sync_plan_for(&db, &[ExternalCategoryRecord::new("ext-pj", "Пижамы", None)]).await?;

        SqlitePlanExecutor::new(db.pool()).execute_sync_plan(&plan).await?;

        let categories = SqliteCatalogRepository::new(db.pool()).load_categories().await?;
        assert_eq!(categories.iter().map(|c| c.order).collect::<Vec<_>>(), vec![0, 1]);
        Ok(())
    }

    #[tokio::test]
    async fn rename_is_applied_through_external_id() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        let id = db.insert_category("Пижамы", "PJ", None).await?;
        db.link_external_id(id, "ext-pj").await?;
        let plan = sync_plan_for(&db, &[ExternalCategoryRecord::new("ext-pj", "Пижамы и сорочки", None)]).await?;

        let summary = SqlitePlanExecutor::new(db.pool()).execute_sync_plan(&plan).await?;
        assert_eq!(summary.updated, 1);

        let category = SqliteCatalogRepository::new(db.pool()).find_category(id).await?;
        assert_eq!(category.map(|c| c.name).as_deref(), Some("Пижамы и сорочки"));
        Ok(())
    }

    #[tokio::test]
    async fn plan_with_warnings_is_refused_before_any_write() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        let plan = sync_plan_for(&db, &[ExternalCategoryRecord::new("ext-1", "Пижамы", None)]).await?;
        let before = db.dump().await?;

        let err = SqlitePlanExecutor::new(db.pool()).execute_sync_plan(&plan).await.unwrap_err();
        assert!(matches!(err, ReconciliationError::StaleResolution { plan_kind: PlanKind::Sync, .. }));
        assert_eq!(db.dump().await?, before);
        Ok(())
    }

    #[tokio::test]
    async fn stale_fingerprint_is_rejected() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        db.insert_legacy_mapping("Пижамы", "PJ").await?;
        let plan = sync_plan_for(&db, &[ExternalCategoryRecord::new("ext-1", "Пижамы", None)]).await?;
        db.insert_category("Носки", "NS", None).await?;

        let err = SqlitePlanExecutor::new(db.pool()).execute_sync_plan(&plan).await.unwrap_err();
        assert!(matches!(err, ReconciliationError::StaleResolution { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn failed_write_rolls_back_everything() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        db.insert_legacy_mapping("Пижамы", "PJ").await?;
        db.insert_legacy_mapping("Boom", "BM").await?;
        sqlx::query(
            "CREATE TRIGGER fail_boom BEFORE INSERT ON categories WHEN NEW.name = 'Boom' BEGIN SELECT RAISE(ABORT, 'injected'); END",
        )
        .execute(db.connection.pool())
        .await?;
        let plan = sync_plan_for(
            &db,
            &[
                ExternalCategoryRecord::new("ext-1", "Пижамы", None),
                ExternalCategoryRecord::new("ext-2", "Boom", None),
            ],
        )
        .await?;
        let before = db.dump().await?;

        let err = SqlitePlanExecutor::new(db.pool()).execute_sync_plan(&plan).await.unwrap_err();
        assert!(matches!(err, ReconciliationError::TransactionFailure { plan_kind: PlanKind::Sync, .. }));
        assert_eq!(db.dump().await?, before);
        Ok(())
    }

    #[tokio::test]
    async fn sku_plan_fixes_reverts_and_creates() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        let be = db.insert_category("Бельё", "BE", None).await?;
        let kp = db.insert_category("Комплекты", "KP", Some(be)).await?;
        let old = db.insert_category("Комплекты (старые)", "KP", None).await?;
        let ok = db.insert_product("OK", Some("BEKP-0007"), &[kp]).await?;
        let fix = db.insert_product("Fix", Some("ZZ-0001"), &[kp]).await?;
        let revert = db.insert_product("Revert", Some("KP0001"), &[be, kp]).await?;
        let fresh = db.insert_product("Fresh", None, &[kp]).await?;

        let plan = sku_plan_for(&db).await?;
        assert_eq!(plan.conflicts.len(), 2);
        let resolutions: UserResolutions =
            [(fix, SkuResolution::FixSku), (revert, SkuResolution::RevertCategory)].into_iter().collect();

        let summary = SqlitePlanExecutor::new(db.pool())
            .execute_sku_plan(&plan, &resolutions, &ArticleFormat::default())
            .await?;
        assert_eq!(
            summary,
            SkuExecutionSummary {
                articles_fixed: 1,
                categories_reverted: 1,
                articles_created: 1,
            }
        );

        assert_eq!(db.article_of(ok).await?.as_deref(), Some("BEKP-0007"));
        assert_eq!(db.article_of(fresh).await?.as_deref(), Some("BEKP-0008"));
        assert_eq!(db.article_of(fix).await?.as_deref(), Some("BEKP-0009"));
        assert_eq!(db.article_of(revert).await?.as_deref(), Some("KP0001"));
        assert_eq!(db.categories_of(revert).await?, vec![old]);
        assert_eq!(db.categories_of(fix).await?, vec![kp]);
        Ok(())
    }

    #[tokio::test]
    async fn uncovered_conflicts_block_sku_execution() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        let kp = db.insert_category("Комплекты", "KP", None).await?;
        db.insert_product("Fix", Some("ZZ-0001"), &[kp]).await?;
        let plan = sku_plan_for(&db).await?;

        let err = SqlitePlanExecutor::new(db.pool())
            .execute_sku_plan(&plan, &UserResolutions::new(), &ArticleFormat::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconciliationError::StaleResolution { plan_kind: PlanKind::Sku, .. }));
        Ok(())
    }

    #[tokio::test]
    async fn cascade_delete_removes_subtree_and_memberships() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        let root = db.insert_category("Бельё", "BE", None).await?;
        let child = db.insert_category("Комплекты", "KP", Some(root)).await?;
        db.insert_category("Шёлк", "SH", Some(child)).await?;
        let other = db.insert_category("Носки", "NS", None).await?;
        let product = db.insert_product("Комплект", Some("BEKP-0001"), &[child, other]).await?;

        let summary = SqlitePlanExecutor::new(db.pool()).delete_category_cascade(root).await?;
        assert_eq!(summary.deleted, 3);

        let remaining = SqliteCatalogRepository::new(db.pool()).load_categories().await?;
        assert_eq!(remaining.iter().map(|c| c.id).collect::<Vec<_>>(), vec![other]);
        assert_eq!(db.categories_of(product).await?, vec![other]);
        Ok(())
    }

    #[tokio::test]
    async fn digit_ending_codes_stay_clean_without_separator() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        let format = ArticleFormat::new("", 4)?;
        let bags = db.insert_category("Сумки", "B", None).await?;
        let mini = db.insert_category("Мини", "2", Some(bags)).await?;
        db.insert_product("Клатч", Some("B20001"), &[mini]).await?;
        let fresh = db.insert_product("Кошелёк", None, &[mini]).await?;
        let wide = db.insert_product("Шоппер", None, &[bags]).await?;

        let plan = sku_plan_with(&db, &format).await?;
        assert_eq!(plan.ok_count, 1);
        SqlitePlanExecutor::new(db.pool())
            .execute_sku_plan(&plan, &UserResolutions::new(), &format)
            .await?;

        assert_eq!(db.article_of(fresh).await?.as_deref(), Some("B20002"));
        // `B` reads `B20001` as its own sequence 20001 and skips the article just handed to `B2`
        assert_eq!(db.article_of(wide).await?.as_deref(), Some("B20003"));

        let reaudit = sku_plan_with(&db, &format).await?;
        assert!(reaudit.conflicts.is_empty());
        assert!(reaudit.to_create.is_empty());
        assert_eq!(reaudit.ok_count, 3);
        Ok(())
    }

    #[tokio::test]
    async fn exhausted_sequence_fails_without_writes() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        let be = db.insert_category("Бельё", "BE", None).await?;
        db.insert_product("Last", Some("BE-18446744073709551615"), &[be]).await?;
        db.insert_product("Fresh", None, &[be]).await?;
        let plan = sku_plan_for(&db).await?;
        let before = db.dump().await?;

        let err = SqlitePlanExecutor::new(db.pool())
            .execute_sku_plan(&plan, &UserResolutions::new(), &ArticleFormat::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconciliationError::Validation { .. }));
        assert_eq!(db.dump().await?, before);
        Ok(())
    }

    #[tokio::test]
    async fn cascade_delete_handles_parent_cycles() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        let a = db.insert_category("Бельё", "BE", None).await?;
        let b = db.insert_category("Комплекты", "KP", Some(a)).await?;
        sqlx::query("UPDATE categories SET parent_id = ? WHERE id = ?")
            .bind(b)
            .bind(a)
            .execute(db.connection.pool())
            .await?;

        let summary = SqlitePlanExecutor::new(db.pool()).delete_category_cascade(a).await?;
        assert_eq!(summary.deleted, 2);
        assert!(SqliteCatalogRepository::new(db.pool()).load_categories().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn cascade_delete_of_unknown_category_is_not_found() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        let err = SqlitePlanExecutor::new(db.pool()).delete_category_cascade(7).await.unwrap_err();
        assert!(matches!(err, ReconciliationError::NotFound { entity: "category", .. }));
        Ok(())
    }
}
