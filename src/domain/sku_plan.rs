//! SKU resolution plan: stored article codes vs. category code paths

use crate::domain::article::ArticleFormat;
use crate::domain::category::{Category, CategoryId, CategoryTree};
use crate::domain::fingerprint::sku_fingerprint;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

pub type ProductId = i64;

/// Product as seen by the SKU audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// System-generated identifier, never rewritten here
    pub sku: String,
    /// Custom article code
    pub article: Option<String>,
    pub category_ids: Vec<CategoryId>,
}

impl Product {
    /// Stored article, if any non-blank value is present
    pub fn article(&self) -> Option<&str> {
        self.article
            .as_deref()
            .map(str::trim)
            .filter(|article| !article.is_empty())
    }
}

/// Product that has no article yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MissingArticle {
    pub product_id: ProductId,
    pub name: String,
    pub current_category: Option<String>,
    pub current_category_id: Option<CategoryId>,
    /// Prefix the synthesized article will carry
    pub expected_article: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SkuConflict {
    pub product_id: ProductId,
    pub name: String,
    pub current_article: String,
    pub current_category: Option<String>,
    pub current_category_id: Option<CategoryId>,
    /// Prefix derived from the current category path
    pub expected_article: String,
    /// Category whose code path matches the stored article, if one exists
    pub expected_category_from_article: Option<String>,
    pub expected_category_id_from_article: Option<CategoryId>,
}

impl SkuConflict {
    /// REVERT_CATEGORY needs a category to revert to
    pub fn can_revert(&self) -> bool {
        self.expected_category_id_from_article.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SkuResolutionPlan {
    /// Digest of the categories and products this plan was built from
    pub fingerprint: String,
    pub to_create: Vec<MissingArticle>,
    pub conflicts: Vec<SkuConflict>,
    pub ok_count: usize,
}

impl SkuResolutionPlan {
    pub fn conflict(&self, product_id: ProductId) -> Option<&SkuConflict> {
        self.conflicts
            .iter()
            .find(|conflict| conflict.product_id == product_id)
    }

    pub fn total_products(&self) -> usize {
        self.to_create.len() + self.conflicts.len() + self.ok_count
    }
}

/// Audit every product's article against its category path
pub fn build_sku_plan(
    products: &[Product],
    categories: &[Category],
    format: &ArticleFormat,
) -> SkuResolutionPlan {
    let tree = CategoryTree::new(categories);

    let mut sorted: Vec<&Product> = products.iter().collect();
    sorted.sort_by_key(|product| product.id);

    let mut plan = SkuResolutionPlan {
        fingerprint: sku_fingerprint(categories, products),
        ..SkuResolutionPlan::default()
    };

    for product in sorted {
        let current = tree.most_specific(&product.category_ids);
        let expected_article = current.map_or_else(String::new, |category| tree.code_path(category.id));

        let Some(article) = product.article() else {
            plan.to_create.push(MissingArticle {
                product_id: product.id,
                name: product.name.clone(),
                current_category: current.map(|category| category.name.clone()),
                current_category_id: current.map(|category| category.id),
                expected_article,
            });
            continue;
        };

        if format.belongs_to(article, &expected_article) {
            plan.ok_count += 1;
            continue;
        }

        let reverse = tree.find_by_article(article, format);

        plan.conflicts.push(SkuConflict {
            product_id: product.id,
            name: product.name.clone(),
            current_article: article.to_string(),
            current_category: current.map(|category| category.name.clone()),
            current_category_id: current.map(|category| category.id),
            expected_article,
            expected_category_from_article: reverse.map(|category| category.name.clone()),
            expected_category_id_from_article: reverse.map(|category| category.id),
        });
    }

    tracing::debug!(
        products = products.len(),
        ok = plan.ok_count,
        to_create = plan.to_create.len(),
        conflicts = plan.conflicts.len(),
        "SKU plan built"
    );
    plan
}

#[cfg(test)]
pub(crate) fn product(id: ProductId, article: Option<&str>, category_ids: &[CategoryId]) -> Product {
    Product {
        id,
        name: format!("Product {id}"),
        sku: format!("SKU-{id:05}"),
        article: article.map(str::to_string),
        category_ids: category_ids.to_vec(),
    }
}
