// Writes the TypeScript bindings consumed by the admin UI
use catalog_reconcile_lib::application::WarningAction;
use catalog_reconcile_lib::domain::category::{Category, ExternalCategoryRecord};
use catalog_reconcile_lib::domain::dictionary::{CodeRule, LegacyMapping, Synonym};
use catalog_reconcile_lib::domain::errors::PlanKind;
use catalog_reconcile_lib::domain::execution::{CategoryDeletionSummary, SkuExecutionSummary, SyncExecutionSummary};
use catalog_reconcile_lib::domain::resolution::SkuResolution;
use catalog_reconcile_lib::domain::sku_plan::{MissingArticle, Product, SkuConflict, SkuResolutionPlan};
use catalog_reconcile_lib::domain::sync_plan::{
    CreateEntry, NoActionEntry, ParentRef, SyncPlan, SyncPlanEntry, UpdateEntry, WarningEntry, WarningReason,
};
use ts_rs::TS;

macro_rules! export_types {
    ($($ty:ty),+ $(,)?) => {{
        let mut failures = 0usize;
        $(
            match <$ty>::export() {
                Ok(()) => println!("exported {}", <$ty>::name()),
                Err(e) => {
                    eprintln!("{} export error: {}", <$ty>::name(), e);
                    failures += 1;
                }
            }
        )+
        failures
    }};
}

fn main() {
    let failures = export_types!(
        Category,
        ExternalCategoryRecord,
        CodeRule,
        Synonym,
        LegacyMapping,
        PlanKind,
        ParentRef,
        CreateEntry,
        UpdateEntry,
        NoActionEntry,
        WarningReason,
        WarningEntry,
        SyncPlanEntry,
        SyncPlan,
        Product,
        MissingArticle,
        SkuConflict,
        SkuResolutionPlan,
        SkuResolution,
        WarningAction,
        SyncExecutionSummary,
        SkuExecutionSummary,
        CategoryDeletionSummary,
    );

    if failures > 0 {
        eprintln!("{failures} type(s) failed to export");
        std::process::exit(1);
    }
    println!("TypeScript bindings written");
}
