//! Operator resolution sessions
//!
//! A session holds one dry-run plan and the operator's pending decisions.
//! Warnings are cleared through the dictionary and the plan is rebuilt;
//! SKU conflicts collect one decision each before execution is allowed.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, Instrument};
use ts_rs::TS;
use uuid::Uuid;

use crate::application::reconciliation_service::ReconciliationService;
use crate::domain::category::ExternalCategoryRecord;
use crate::domain::dictionary::RuleId;
use crate::domain::errors::{ReconciliationError, ReconciliationResult};
use crate::domain::execution::{SkuExecutionSummary, SyncExecutionSummary};
use crate::domain::resolution::{SkuResolution, UserResolutions};
use crate::domain::sku_plan::{ProductId, SkuResolutionPlan};
use crate::domain::sync_plan::{SyncPlan, WarningEntry};

/// How the operator clears one classification warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum WarningAction {
    /// New rule whose first synonym is the warned name
    CreateRule { code: String },
    /// Warned name becomes a synonym of an existing rule
    #[serde(rename_all = "camelCase")]
    AttachSynonym { rule_id: RuleId },
}

// ============================================================================
// Sync warnings
// ============================================================================

pub struct SyncResolutionSession<'a> {
    id: Uuid,
    service: &'a ReconciliationService,
    snapshot: Vec<ExternalCategoryRecord>,
    plan: SyncPlan,
}

impl<'a> SyncResolutionSession<'a> {
    pub async fn start(
        service: &'a ReconciliationService,
        snapshot: Vec<ExternalCategoryRecord>,
    ) -> ReconciliationResult<Self> {
        let id = Uuid::new_v4();
        let span = info_span!("sync_resolution", session_id = %id);
        // Dictionary edits made outside this session must be visible to the first plan
        service.refresh_dictionary().instrument(span.clone()).await?;
        let plan = service.build_sync_plan(&snapshot).instrument(span.clone()).await?;

        span.in_scope(|| {
            info!(
                records = snapshot.len(),
                warnings = plan.warnings().len(),
                "Sync resolution session started"
            );
        });

        Ok(Self { id, service, snapshot, plan })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn plan(&self) -> &SyncPlan {
        &self.plan
    }

    pub fn outstanding_warnings(&self) -> Vec<&WarningEntry> {
        self.plan.warnings()
    }

    /// Apply `action` to the name behind one warning, then refresh the
    /// dictionary and rebuild the whole plan. Warnings may be taken in any
    /// order.
    pub async fn resolve_warning(&mut self, external_id: &str, action: WarningAction) -> ReconciliationResult<&SyncPlan> {
        let span = info_span!("sync_resolution", session_id = %self.id, external_id);

        let warning = self.plan.warning_for(external_id).ok_or_else(|| {
            ReconciliationError::validation(format!("no outstanding warning for external id '{external_id}'"))
        })?;
        if !warning.reason.is_dictionary_resolvable() {
            return Err(ReconciliationError::validation(format!(
                "warning for '{external_id}' is caused by {} and cannot be fixed through the dictionary",
                warning.reason
            )));
        }
        let name = warning.name.clone();

        async {
            match &action {
                WarningAction::CreateRule { code } => {
                    let rule = self.service.add_rule(code, &name).await?;
                    info!(rule_id = rule.id, code = %rule.assigned_code, name = %name, "Rule created for warning");
                }
                WarningAction::AttachSynonym { rule_id } => {
                    let synonym = self.service.add_synonym(*rule_id, &name).await?;
                    info!(rule_id, synonym_id = synonym.id, name = %name, "Synonym attached for warning");
                }
            }
            self.rebuild_inner().await
        }
        .instrument(span)
        .await?;

        Ok(&self.plan)
    }

    /// Refresh the dictionary and recompute the plan from the same snapshot
    pub async fn rebuild(&mut self) -> ReconciliationResult<&SyncPlan> {
        let span = info_span!("sync_resolution", session_id = %self.id);
        self.rebuild_inner().instrument(span).await?;
        Ok(&self.plan)
    }

    async fn rebuild_inner(&mut self) -> ReconciliationResult<()> {
        self.service.refresh_dictionary().await?;
        self.plan = self.service.build_sync_plan(&self.snapshot).await?;
        debug!(warnings = self.plan.warnings().len(), "Sync plan rebuilt");
        Ok(())
    }

    pub async fn execute(&self) -> ReconciliationResult<SyncExecutionSummary> {
        let span = info_span!("sync_resolution", session_id = %self.id);
        self.service.execute_sync_plan(&self.plan).instrument(span).await
    }
}

// ============================================================================
// SKU conflicts
// ============================================================================

pub struct SkuResolutionSession<'a> {
    id: Uuid,
    service: &'a ReconciliationService,
    plan: SkuResolutionPlan,
    resolutions: UserResolutions,
}

impl<'a> SkuResolutionSession<'a> {
    pub async fn start(service: &'a ReconciliationService) -> ReconciliationResult<Self> {
        let id = Uuid::new_v4();
        let span = info_span!("sku_resolution", session_id = %id);
        let plan = service.build_sku_resolution_plan().instrument(span.clone()).await?;

        span.in_scope(|| {
            info!(
                conflicts = plan.conflicts.len(),
                to_create = plan.to_create.len(),
                ok = plan.ok_count,
                "SKU resolution session started"
            );
        });

        Ok(Self {
            id,
            service,
            plan,
            resolutions: UserResolutions::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn plan(&self) -> &SkuResolutionPlan {
        &self.plan
    }

    pub fn resolutions(&self) -> &UserResolutions {
        &self.resolutions
    }

    /// Record a decision for one conflict; returns the decision it replaced
    pub fn resolve(&mut self, product_id: ProductId, resolution: SkuResolution) -> ReconciliationResult<Option<SkuResolution>> {
        let conflict = self
            .plan
            .conflict(product_id)
            .ok_or_else(|| ReconciliationError::validation(format!("product {product_id} has no conflict in this plan")))?;

        if resolution == SkuResolution::RevertCategory && !conflict.can_revert() {
            return Err(ReconciliationError::validation(format!(
                "no category matches the article prefix of product {product_id}; only FIX_SKU is possible"
            )));
        }

        let previous = self.resolutions.set(product_id, resolution);
        debug!(session_id = %self.id, product_id, ?resolution, ?previous, "Conflict resolved");
        Ok(previous)
    }

    pub fn clear(&mut self, product_id: ProductId) -> Option<SkuResolution> {
        self.resolutions.clear(product_id)
    }

    pub fn unresolved_conflicts(&self) -> usize {
        self.resolutions.unresolved_conflicts(&self.plan)
    }

    pub fn can_execute(&self) -> bool {
        self.unresolved_conflicts() == 0
    }

    /// Recompute the plan, keeping only decisions that still apply
    pub async fn rebuild(&mut self) -> ReconciliationResult<&SkuResolutionPlan> {
        let span = info_span!("sku_resolution", session_id = %self.id);
        let plan = self.service.build_sku_resolution_plan().instrument(span).await?;

        let before = self.resolutions.len();
        self.resolutions = self
            .resolutions
            .iter()
            .filter(|(product_id, resolution)| match plan.conflict(*product_id) {
                Some(conflict) => *resolution == SkuResolution::FixSku || conflict.can_revert(),
                None => false,
            })
            .collect();
        self.plan = plan;

        debug!(
            session_id = %self.id,
            dropped = before - self.resolutions.len(),
            unresolved = self.unresolved_conflicts(),
            "SKU plan rebuilt"
        );
        Ok(&self.plan)
    }

    pub async fn execute(&self) -> ReconciliationResult<SkuExecutionSummary> {
        let span = info_span!("sku_resolution", session_id = %self.id);
        self.service
            .execute_sku_plan(&self.plan, &self.resolutions)
            .instrument(span)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::PlanKind;
    use crate::test_utils::TestContext;

    fn record(external_id: &str, name: &str, parent: Option<&str>) -> ExternalCategoryRecord {
        ExternalCategoryRecord::new(external_id, name, parent)
    }

    #[tokio::test]
    async fn warnings_resolve_out_of_order() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let snapshot = vec![record("1", "Одежда", None), record("2", "Пижамы", Some("1"))];

        let mut session = SyncResolutionSession::start(&ctx.service, snapshot).await?;
        assert_eq!(session.outstanding_warnings().len(), 2);

        session
            .resolve_warning("2", WarningAction::CreateRule { code: "PJ".into() })
            .await?;
        assert_eq!(session.outstanding_warnings().len(), 1);
        assert_eq!(session.plan().to_create().len(), 1);

        session
            .resolve_warning("1", WarningAction::CreateRule { code: "OD".into() })
            .await?;
        assert!(session.outstanding_warnings().is_empty());

        let summary = session.execute().await?;
        assert_eq!(summary.created, 2);
        Ok(())
    }

    #[tokio::test]
    async fn attach_synonym_reuses_existing_code() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let rule = ctx.service.add_rule("PJ", "Пижамы").await?;

        let mut session = SyncResolutionSession::start(&ctx.service, vec![record("7", "Пижамки", None)]).await?;
        session
            .resolve_warning("7", WarningAction::AttachSynonym { rule_id: rule.id })
            .await?;

        let created = session.plan().to_create();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].assigned_code, "PJ");
        Ok(())
    }

    #[tokio::test]
    async fn first_plan_sees_rules_added_before_start() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        ctx.service.add_rule("PJ", "Пижамы").await?;

        let session = SyncResolutionSession::start(&ctx.service, vec![record("1", "Пижамы", None)]).await?;
        assert!(session.outstanding_warnings().is_empty());
        assert_eq!(session.plan().to_create().len(), 1);
        assert_eq!(session.plan().to_create()[0].assigned_code, "PJ");
        Ok(())
    }

    #[tokio::test]
    async fn non_dictionary_warnings_are_rejected() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let mut session = SyncResolutionSession::start(&ctx.service, vec![record("1", "   ", None)]).await?;

        let err = session
            .resolve_warning("1", WarningAction::CreateRule { code: "XX".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, ReconciliationError::Validation { .. }));

        let err = session
            .resolve_warning("missing", WarningAction::CreateRule { code: "XX".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, ReconciliationError::Validation { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn sku_session_gates_execution_and_replaces_choices() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let backpacks = ctx.database.insert_category("Рюкзаки", "BEKP", None).await?;
        let bags = ctx.database.insert_category("Сумки", "BAG", None).await?;
        let product = ctx.database.insert_product("Рюкзак", Some("BAG-0001"), &[backpacks]).await?;

        let mut session = SkuResolutionSession::start(&ctx.service).await?;
        assert_eq!(session.unresolved_conflicts(), 1);
        assert!(!session.can_execute());

        let err = session.execute().await.unwrap_err();
        assert!(matches!(err, ReconciliationError::StaleResolution { plan_kind: PlanKind::Sku, .. }));

        assert_eq!(session.resolve(product, SkuResolution::FixSku)?, None);
        assert_eq!(
            session.resolve(product, SkuResolution::RevertCategory)?,
            Some(SkuResolution::FixSku)
        );
        assert_eq!(session.resolutions().len(), 1);
        assert!(session.can_execute());

        let summary = session.execute().await?;
        assert_eq!(summary.categories_reverted, 1);
        assert_eq!(ctx.database.categories_of(product).await?, vec![bags]);
        Ok(())
    }

    #[tokio::test]
    async fn revert_without_target_is_rejected() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let backpacks = ctx.database.insert_category("Рюкзаки", "BEKP", None).await?;
        let product = ctx.database.insert_product("Рюкзак", Some("ZZZ-0001"), &[backpacks]).await?;

        let mut session = SkuResolutionSession::start(&ctx.service).await?;
        let err = session.resolve(product, SkuResolution::RevertCategory).unwrap_err();
        assert!(matches!(err, ReconciliationError::Validation { .. }));
        assert!(session.resolve(product + 100, SkuResolution::FixSku).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn rebuild_drops_decisions_for_vanished_conflicts() -> anyhow::Result<()> {
        let ctx = TestContext::new().await?;
        let backpacks = ctx.database.insert_category("Рюкзаки", "BEKP", None).await?;
        ctx.database.insert_category("Сумки", "BAG", None).await?;
        let product = ctx.database.insert_product("Рюкзак", Some("BAG-0001"), &[backpacks]).await?;

        let mut session = SkuResolutionSession::start(&ctx.service).await?;
        session.resolve(product, SkuResolution::FixSku)?;
        ctx.service.execute_sku_plan(session.plan(), session.resolutions()).await?;

        let plan = session.rebuild().await?;
        assert!(plan.conflicts.is_empty());
        assert!(session.resolutions().is_empty());
        Ok(())
    }
}
