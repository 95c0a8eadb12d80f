//! SQLite implementation of the catalog read side
//!
//! The row loaders take a bare connection so the plan executor can call them
//! inside its own transaction when re-checking fingerprints.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;

use crate::domain::category::{Category, CategoryId};
use crate::domain::errors::ReconciliationResult;
use crate::domain::repositories::CatalogRepository;
use crate::domain::sku_plan::{Product, ProductId};

const CATEGORY_COLUMNS: &str = "id, name, code, parent_id, sort_order, color, external_id";

pub struct SqliteCatalogRepository {
    pool: SqlitePool,
}

impl SqliteCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Helper method to convert database row to Category entity
fn row_to_category(row: &SqliteRow) -> Result<Category, sqlx::Error> {
    Ok(Category {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        parent_id: row.try_get("parent_id")?,
        order: row.try_get("sort_order")?,
        color: row.try_get("color")?,
        external_id: row.try_get("external_id")?,
    })
}

pub(crate) async fn fetch_categories(conn: &mut SqliteConnection) -> ReconciliationResult<Vec<Category>> {
    let rows = sqlx::query(&format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY id"))
        .fetch_all(&mut *conn)
        .await?;

    let categories = rows
        .iter()
        .map(row_to_category)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(categories)
}

pub(crate) async fn fetch_products(conn: &mut SqliteConnection) -> ReconciliationResult<Vec<Product>> {
    let rows = sqlx::query("SELECT id, name, sku, article FROM products ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;

    let links = sqlx::query("SELECT product_id, category_id FROM product_categories ORDER BY product_id, category_id")
        .fetch_all(&mut *conn)
        .await?;

    let mut memberships: HashMap<ProductId, Vec<CategoryId>> = HashMap::new();
    for link in &links {
        memberships
            .entry(link.try_get("product_id")?)
            .or_default()
            .push(link.try_get("category_id")?);
    }

    let mut products = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: ProductId = row.try_get("id")?;
        products.push(Product {
            id,
            name: row.try_get("name")?,
            sku: row.try_get("sku")?,
            article: row.try_get("article")?,
            category_ids: memberships.remove(&id).unwrap_or_default(),
        });
    }
    Ok(products)
}

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn load_categories(&self) -> ReconciliationResult<Vec<Category>> {
        let mut conn = self.pool.acquire().await?;
        fetch_categories(&mut conn).await
    }

    async fn find_category(&self, id: CategoryId) -> ReconciliationResult<Option<Category>> {
        let row = sqlx::query(&format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row_to_category(&row)?)),
            None => Ok(None),
        }
    }

    async fn load_products(&self) -> ReconciliationResult<Vec<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_products(&mut conn).await
    }
}
