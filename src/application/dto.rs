//! Data Transfer Objects for the operator surface
//!
//! Plans travel as-is; these DTOs wrap them with the counts an operator
//! looks at first.

use serde::Serialize;

use crate::domain::sku_plan::SkuResolutionPlan;
use crate::domain::sync_plan::SyncPlan;

// ============================================================================
// Sync plan DTOs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPlanCountsDto {
    pub to_create: usize,
    pub to_update: usize,
    pub no_action: usize,
    pub warnings: usize,
    /// No warnings left and at least one change to apply
    pub executable: bool,
}

impl From<&SyncPlan> for SyncPlanCountsDto {
    fn from(plan: &SyncPlan) -> Self {
        let warnings = plan.warnings().len();
        Self {
            to_create: plan.to_create().len(),
            to_update: plan.to_update().len(),
            no_action: plan.no_action().len(),
            warnings,
            executable: warnings == 0 && plan.has_changes(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPlanReportDto<'a> {
    pub counts: SyncPlanCountsDto,
    pub plan: &'a SyncPlan,
}

impl<'a> From<&'a SyncPlan> for SyncPlanReportDto<'a> {
    fn from(plan: &'a SyncPlan) -> Self {
        Self {
            counts: SyncPlanCountsDto::from(plan),
            plan,
        }
    }
}

// ============================================================================
// SKU plan DTOs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuPlanCountsDto {
    pub ok: usize,
    pub to_create: usize,
    pub conflicts: usize,
    /// Conflicts that offer REVERT_CATEGORY
    pub revertible: usize,
}

impl From<&SkuResolutionPlan> for SkuPlanCountsDto {
    fn from(plan: &SkuResolutionPlan) -> Self {
        Self {
            ok: plan.ok_count,
            to_create: plan.to_create.len(),
            conflicts: plan.conflicts.len(),
            revertible: plan.conflicts.iter().filter(|conflict| conflict.can_revert()).count(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuPlanReportDto<'a> {
    pub counts: SkuPlanCountsDto,
    pub plan: &'a SkuResolutionPlan,
}

impl<'a> From<&'a SkuResolutionPlan> for SkuPlanReportDto<'a> {
    fn from(plan: &'a SkuResolutionPlan) -> Self {
        Self {
            counts: SkuPlanCountsDto::from(plan),
            plan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::category::ExternalCategoryRecord;
    use crate::domain::dictionary::CodeDictionary;
    use crate::domain::sync_plan::build_sync_plan;

    #[test]
    fn sync_counts_follow_plan_buckets() {
        let plan = build_sync_plan(
            &[ExternalCategoryRecord::new("ext-1", "Пижамы", None)],
            &[],
            &CodeDictionary::empty(),
        );
        let counts = SyncPlanCountsDto::from(&plan);
        assert_eq!(counts.warnings, 1);
        assert!(!counts.executable);

        let json = serde_json::to_value(SyncPlanReportDto::from(&plan)).unwrap();
        assert_eq!(json["counts"]["toCreate"], 0);
        assert_eq!(json["plan"]["entries"][0]["disposition"], "warning");
    }
}
