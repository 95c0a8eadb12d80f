//! Operator decisions for SKU conflicts

use crate::domain::errors::{PlanKind, ReconciliationError, ReconciliationResult};
use crate::domain::sku_plan::{ProductId, SkuResolutionPlan};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

/// Remediation chosen for one conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkuResolution {
    /// Rewrite the article to match the current category
    FixSku,
    /// Move the product to the category its article points at
    RevertCategory,
}

/// One decision per conflicting product. A map, so a product can never
/// carry both resolutions at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserResolutions(BTreeMap<ProductId, SkuResolution>);

impl UserResolutions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a decision, replacing any earlier one for the product
    pub fn set(&mut self, product_id: ProductId, resolution: SkuResolution) -> Option<SkuResolution> {
        self.0.insert(product_id, resolution)
    }

    pub fn clear(&mut self, product_id: ProductId) -> Option<SkuResolution> {
        self.0.remove(&product_id)
    }

    pub fn get(&self, product_id: ProductId) -> Option<SkuResolution> {
        self.0.get(&product_id).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProductId, SkuResolution)> + '_ {
        self.0.iter().map(|(id, resolution)| (*id, *resolution))
    }

    /// Conflicts in `plan` without a decision
    pub fn unresolved_conflicts(&self, plan: &SkuResolutionPlan) -> usize {
        plan.conflicts
            .iter()
            .filter(|conflict| !self.0.contains_key(&conflict.product_id))
            .count()
    }

    /// Every conflict decided, nothing decided for non-conflicts, and every
    /// REVERT_CATEGORY has a target
    pub fn ensure_covers(&self, plan: &SkuResolutionPlan) -> ReconciliationResult<()> {
        let unresolved = self.unresolved_conflicts(plan);
        if unresolved > 0 {
            return Err(ReconciliationError::stale(
                PlanKind::Sku,
                format!("{unresolved} conflict(s) have no resolution"),
            ));
        }

        for (product_id, resolution) in self.iter() {
            let Some(conflict) = plan.conflict(product_id) else {
                return Err(ReconciliationError::stale(
                    PlanKind::Sku,
                    format!("product {product_id} has a resolution but no conflict in this plan"),
                ));
            };
            if resolution == SkuResolution::RevertCategory && !conflict.can_revert() {
                return Err(ReconciliationError::stale(
                    PlanKind::Sku,
                    format!("product {product_id} cannot revert: no category matches its article"),
                ));
            }
        }

        Ok(())
    }
}

impl FromIterator<(ProductId, SkuResolution)> for UserResolutions {
    fn from_iter<T: IntoIterator<Item = (ProductId, SkuResolution)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sku_plan::SkuConflict;

    fn conflict(product_id: ProductId, revert_to: Option<i64>) -> SkuConflict {
        SkuConflict {
            product_id,
            name: format!("Product {product_id}"),
            current_article: "KP0001".into(),
            current_category: Some("Комплекты".into()),
            current_category_id: Some(2),
            expected_article: "BEKP".into(),
            expected_category_from_article: revert_to.map(|_| "Комплекты (старые)".into()),
            expected_category_id_from_article: revert_to,
        }
    }

    fn plan() -> SkuResolutionPlan {
        SkuResolutionPlan {
            fingerprint: "f".into(),
            to_create: vec![],
            conflicts: vec![conflict(1, Some(3)), conflict(2, None)],
            ok_count: 0,
        }
    }

    #[test]
    fn uncovered_conflicts_block_execution() {
        let resolutions: UserResolutions = [(1, SkuResolution::FixSku)].into_iter().collect();
        assert_eq!(resolutions.unresolved_conflicts(&plan()), 1);
        assert!(matches!(
            resolutions.ensure_covers(&plan()),
            Err(ReconciliationError::StaleResolution { plan_kind: PlanKind::Sku, .. })
        ));
    }

    #[test]
    fn revert_requires_target() {
        let resolutions: UserResolutions =
            [(1, SkuResolution::RevertCategory), (2, SkuResolution::RevertCategory)].into_iter().collect();
        assert!(resolutions.ensure_covers(&plan()).is_err());

        let resolutions: UserResolutions =
            [(1, SkuResolution::RevertCategory), (2, SkuResolution::FixSku)].into_iter().collect();
        assert!(resolutions.ensure_covers(&plan()).is_ok());
    }

    #[test]
    fn resolutions_for_unknown_products_are_rejected() {
        let resolutions: UserResolutions = [
            (1, SkuResolution::FixSku),
            (2, SkuResolution::FixSku),
            (9, SkuResolution::FixSku),
        ]
        .into_iter()
        .collect();
        assert!(resolutions.ensure_covers(&plan()).is_err());
    }

    #[test]
    fn later_choice_replaces_earlier_one() {
        let mut resolutions = UserResolutions::new();
        resolutions.set(1, SkuResolution::FixSku);
        assert_eq!(resolutions.set(1, SkuResolution::RevertCategory), Some(SkuResolution::FixSku));
        assert_eq!(resolutions.get(1), Some(SkuResolution::RevertCategory));
        assert_eq!(resolutions.len(), 1);
    }

    #[test]
    fn serializes_as_operator_tokens() {
        let resolutions: UserResolutions = [(7, SkuResolution::FixSku)].into_iter().collect();
        assert_eq!(serde_json::to_string(&resolutions).unwrap(), r#"{"7":"FIX_SKU"}"#);
    }
}
