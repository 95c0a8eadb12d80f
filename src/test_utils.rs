//! Test utilities for catalog-reconcile
//!
//! Provides common testing infrastructure and utilities to ensure tests
//! are isolated, reliable, and use consistent database setup patterns.

use anyhow::Result;
use std::sync::Arc;

use crate::application::ReconciliationService;
use crate::domain::category::CategoryId;
use crate::domain::sku_plan::ProductId;
use crate::infrastructure::config::ReconciliationConfig;
use crate::infrastructure::{
    DatabaseConnection, SqliteCatalogRepository, SqliteDictionaryRepository, SqlitePlanExecutor, StaticTaxonomyFeed,
};

/// Test database configuration
pub struct TestDatabase {
    pub connection: DatabaseConnection,
}

impl TestDatabase {
    /// Create a new in-memory test database
    ///
    /// Each test gets a fresh, clean database state.
    pub async fn new() -> Result<Self> {
        let db = DatabaseConnection::new("sqlite::memory:").await?;
        db.migrate().await?;
        Ok(Self { connection: db })
    }

    /// Get the database pool for use in repositories
    pub fn pool(&self) -> sqlx::Pool<sqlx::Sqlite> {
        self.connection.pool().clone()
    }

    pub async fn insert_category(&self, name: &str, code: &str, parent_id: Option<CategoryId>) -> Result<CategoryId> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO categories (name, code, parent_id, sort_order, created_at, updated_at) VALUES (?, ?, ?, 0, ?, ?)",
        )
        .bind(name)
        .bind(code)
        .bind(parent_id)
        .bind(&now)
        .bind(&now)
        .execute(self.connection.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn link_external_id(&self, id: CategoryId, external_id: &str) -> Result<()> {
        sqlx::query("UPDATE categories SET external_id = ? WHERE id = ?")
            .bind(external_id)
            .bind(id)
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    pub async fn insert_product(&self, name: &str, article: Option<&str>, category_ids: &[CategoryId]) -> Result<ProductId> {
        let now = chrono::Utc::now().to_rfc3339();
        let sku = format!("SKU-{}", uuid::Uuid::new_v4().simple());
        let result = sqlx::query(
            "INSERT INTO products (name, sku, article, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(&sku)
        .bind(article)
        .bind(&now)
        .bind(&now)
        .execute(self.connection.pool())
        .await?;
        let product_id = result.last_insert_rowid();

        for category_id in category_ids {
            sqlx::query("INSERT INTO product_categories (product_id, category_id) VALUES (?, ?)")
                .bind(product_id)
                .bind(category_id)
                .execute(self.connection.pool())
                .await?;
        }
        Ok(product_id)
    }

    pub async fn insert_legacy_mapping(&self, category_name: &str, assigned_code: &str) -> Result<()> {
        sqlx::query("INSERT INTO category_code_mappings (category_name, assigned_code) VALUES (?, ?)")
            .bind(category_name)
            .bind(assigned_code)
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    /// Every row of every table, rendered in a stable order. Two equal
    /// dumps mean nothing was written in between.
    pub async fn dump(&self) -> Result<Vec<String>> {
        let queries = [
            "SELECT 'category|' || id || '|' || name || '|' || code || '|' || IFNULL(parent_id, '') || '|' || sort_order || '|' || IFNULL(external_id, '') FROM categories ORDER BY id",
            "SELECT 'rule|' || id || '|' || assigned_code FROM code_rules ORDER BY id",
            "SELECT 'synonym|' || id || '|' || rule_id || '|' || name FROM code_rule_synonyms ORDER BY id",
            "SELECT 'mapping|' || id || '|' || category_name || '|' || assigned_code FROM category_code_mappings ORDER BY id",
            "SELECT 'product|' || id || '|' || name || '|' || sku || '|' || IFNULL(article, '') FROM products ORDER BY id",
            "SELECT 'link|' || product_id || '|' || category_id FROM product_categories ORDER BY product_id, category_id",
        ];

        let mut dump = Vec::new();
        for query in queries {
            let rows: Vec<String> = sqlx::query_scalar(query).fetch_all(self.connection.pool()).await?;
            dump.extend(rows);
        }
        Ok(dump)
    }

    pub async fn article_of(&self, product_id: ProductId) -> Result<Option<String>> {
        let article = sqlx::query_scalar("SELECT article FROM products WHERE id = ?")
            .bind(product_id)
            .fetch_one(self.connection.pool())
            .await?;
        Ok(article)
    }

    pub async fn categories_of(&self, product_id: ProductId) -> Result<Vec<CategoryId>> {
        let ids = sqlx::query_scalar("SELECT category_id FROM product_categories WHERE product_id = ? ORDER BY category_id")
            .bind(product_id)
            .fetch_all(self.connection.pool())
            .await?;
        Ok(ids)
    }
}

/// Complete test context with every repository wired into the service
pub struct TestContext {
    pub database: TestDatabase,
    pub feed: Arc<StaticTaxonomyFeed>,
    pub service: ReconciliationService,
}

impl TestContext {
    /// Create a complete test context with all components initialized.
    /// Seed rows first through `database`, then call
    /// `service.refresh_dictionary()` if the dictionary changed.
    pub async fn new() -> Result<Self> {
        let database = TestDatabase::new().await?;
        let pool = database.pool();

        let feed = Arc::new(StaticTaxonomyFeed::new(Vec::new()));
        let service = ReconciliationService::new(
            Arc::new(SqliteCatalogRepository::new(pool.clone())),
            Arc::new(SqliteDictionaryRepository::new(pool.clone())),
            Arc::new(SqlitePlanExecutor::new(pool)),
            feed.clone(),
            &ReconciliationConfig::default(),
        )?;
        service.refresh_dictionary().await?;

        Ok(Self { database, feed, service })
    }
}
