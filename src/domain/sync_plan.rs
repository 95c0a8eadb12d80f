//! Dry-run sync plan: external taxonomy snapshot vs. local categories
//!
//! Building a plan is a pure function of its inputs. Each external record
//! yields exactly one [`SyncPlanEntry`], in input order.

use crate::domain::category::{Category, CategoryId, ExternalCategoryRecord};
use crate::domain::classifier::{classify, Classification};
use crate::domain::dictionary::{normalize_name, CodeDictionary, PLACEHOLDER_CODE};
use crate::domain::errors::{PlanKind, ReconciliationError, ReconciliationResult};
use crate::domain::fingerprint::sync_fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use ts_rs::TS;

/// Where a category to be created hangs in the local tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ParentRef {
    Root,
    /// Existing local category
    Local(CategoryId),
    /// Created earlier by the same plan, identified by its external id
    Pending(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntry {
    pub external_id: String,
    pub name: String,
    pub assigned_code: String,
    pub parent: ParentRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntry {
    pub id: CategoryId,
    pub external_id: String,
    pub old_name: String,
    pub new_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NoActionEntry {
    pub external_id: String,
    pub local_id: CategoryId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub enum WarningReason {
    /// Name not known to any dictionary provider
    AbsentFromDictionary,
    /// Dictionary maps the name to the placeholder code only
    PlaceholderCode,
    EmptyName,
    DuplicateExternalId,
}

impl WarningReason {
    /// Whether adding a rule or synonym can clear this warning
    pub fn is_dictionary_resolvable(self) -> bool {
        matches!(self, Self::AbsentFromDictionary | Self::PlaceholderCode)
    }
}

impl fmt::Display for WarningReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AbsentFromDictionary => write!(f, "absence from the dictionary"),
            Self::PlaceholderCode => write!(f, "only a placeholder code is assigned"),
            Self::EmptyName => write!(f, "record has an empty name"),
            Self::DuplicateExternalId => write!(f, "external id appears more than once"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct WarningEntry {
    pub external_id: String,
    pub name: String,
    pub reason: WarningReason,
}

/// Disposition of one external record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "disposition", rename_all = "camelCase")]
pub enum SyncPlanEntry {
    Create(CreateEntry),
    Update(UpdateEntry),
    NoAction(NoActionEntry),
    Warning(WarningEntry),
}

impl SyncPlanEntry {
    pub fn external_id(&self) -> &str {
        match self {
            Self::Create(entry) => &entry.external_id,
            Self::Update(entry) => &entry.external_id,
            Self::NoAction(entry) => &entry.external_id,
            Self::Warning(entry) => &entry.external_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SyncPlan {
    /// Digest of the categories and dictionary this plan was built from
    pub fingerprint: String,
    pub entries: Vec<SyncPlanEntry>,
}

impl SyncPlan {
    pub fn to_create(&self) -> Vec<&CreateEntry> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                SyncPlanEntry::Create(create) => Some(create),
                _ => None,
            })
            .collect()
    }

    pub fn to_update(&self) -> Vec<&UpdateEntry> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                SyncPlanEntry::Update(update) => Some(update),
                _ => None,
            })
            .collect()
    }

    pub fn no_action(&self) -> Vec<&NoActionEntry> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                SyncPlanEntry::NoAction(no_action) => Some(no_action),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<&WarningEntry> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                SyncPlanEntry::Warning(warning) => Some(warning),
                _ => None,
            })
            .collect()
    }

    pub fn warning_for(&self, external_id: &str) -> Option<&WarningEntry> {
        self.warnings()
            .into_iter()
            .find(|warning| warning.external_id == external_id)
    }

    pub fn has_changes(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| matches!(entry, SyncPlanEntry::Create(_) | SyncPlanEntry::Update(_)))
    }

    /// Reject execution while any warning is outstanding
    pub fn ensure_executable(&self) -> ReconciliationResult<()> {
        let outstanding = self.warnings().len();
        if outstanding > 0 {
            return Err(ReconciliationError::stale(
                PlanKind::Sync,
                format!("{outstanding} warning(s) must be resolved and the plan rebuilt before execution"),
            ));
        }
        Ok(())
    }
}

/// Diff the external snapshot against local categories
pub fn build_sync_plan(
    external: &[ExternalCategoryRecord],
    local: &[Category],
    dictionary: &CodeDictionary,
) -> SyncPlan {
    let mut sorted_local: Vec<&Category> = local.iter().collect();
    sorted_local.sort_by_key(|category| category.id);

    let mut by_external_id: HashMap<&str, &Category> = HashMap::new();
    let mut by_name: HashMap<String, &Category> = HashMap::new();
    for category in sorted_local {
        if let Some(external_id) = category.external_id.as_deref() {
            by_external_id.entry(external_id).or_insert(category);
        }
        by_name.entry(normalize_name(&category.name)).or_insert(category);
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(external.len());
    let mut pending_creates: HashSet<&str> = HashSet::new();
    // External id → local id for records matched to an existing category
    let mut matched_locals: HashMap<&str, CategoryId> = HashMap::new();
    let mut parents: HashMap<&str, Option<&str>> = HashMap::with_capacity(external.len());
    let mut entries = Vec::with_capacity(external.len());

    // First pass: match against local categories so parent references can
    // point at categories that appear later in the feed.
    for record in external {
        if record.name.trim().is_empty() || !seen.insert(record.external_id.as_str()) {
            continue;
        }
        parents.insert(
            record.external_id.as_str(),
            record
                .parent_external_id
                .as_deref()
                .filter(|parent| *parent != record.external_id),
        );
        let local_match = by_external_id
            .get(record.external_id.as_str())
            .or_else(|| by_name.get(&normalize_name(&record.name)));
        if let Some(category) = local_match {
            matched_locals.insert(record.external_id.as_str(), category.id);
        }
    }
    seen.clear();

    for record in external {
        let entry = classify_record(record, &mut seen, &by_external_id, &by_name, dictionary);
        if matches!(entry, SyncPlanEntry::Create(_)) {
            pending_creates.insert(record.external_id.as_str());
        }
        entries.push(entry);
    }

    // Parent references are resolved once every disposition is known
    for entry in &mut entries {
        if let SyncPlanEntry::Create(create) = entry {
            let parent_external_id = parents
                .get(create.external_id.as_str())
                .copied()
                .flatten();
            create.parent = resolve_parent(parent_external_id, &matched_locals, &pending_creates);
        }
    }

    let plan = SyncPlan {
        fingerprint: sync_fingerprint(local, dictionary.snapshot()),
        entries,
    };

    tracing::debug!(
        records = external.len(),
        to_create = plan.to_create().len(),
        to_update = plan.to_update().len(),
        no_action = plan.no_action().len(),
        warnings = plan.warnings().len(),
        "Sync plan built"
    );
    plan
}

fn classify_record<'a>(
    record: &'a ExternalCategoryRecord,
    seen: &mut HashSet<&'a str>,
    by_external_id: &HashMap<&str, &Category>,
    by_name: &HashMap<String, &Category>,
    dictionary: &CodeDictionary,
) -> SyncPlanEntry {
    let warning = |reason| {
        SyncPlanEntry::Warning(WarningEntry {
            external_id: record.external_id.clone(),
            name: record.name.clone(),
            reason,
        })
    };

    if record.name.trim().is_empty() {
        return warning(WarningReason::EmptyName);
    }
    if !seen.insert(record.external_id.as_str()) {
        return warning(WarningReason::DuplicateExternalId);
    }

    if let Some(local) = by_external_id.get(record.external_id.as_str()) {
        // Only names are synced for linked categories; upstream parent moves are not applied
        if local.name == record.name {
            return SyncPlanEntry::NoAction(NoActionEntry {
                external_id: record.external_id.clone(),
                local_id: local.id,
                name: local.name.clone(),
            });
        }
        return SyncPlanEntry::Update(UpdateEntry {
            id: local.id,
            external_id: record.external_id.clone(),
            old_name: local.name.clone(),
            new_name: record.name.clone(),
        });
    }

    if let Some(local) = by_name.get(&normalize_name(&record.name)) {
        return SyncPlanEntry::NoAction(NoActionEntry {
            external_id: record.external_id.clone(),
            local_id: local.id,
            name: local.name.clone(),
        });
    }

    match classify(dictionary, &record.name) {
        Classification::Resolved { code, .. } if code == PLACEHOLDER_CODE => {
            warning(WarningReason::PlaceholderCode)
        }
        Classification::Resolved { code, .. } => SyncPlanEntry::Create(CreateEntry {
            external_id: record.external_id.clone(),
            name: record.name.clone(),
            assigned_code: code,
            parent: ParentRef::Root,
        }),
        Classification::Unresolved => warning(WarningReason::AbsentFromDictionary),
    }
}

fn resolve_parent(
    parent_external_id: Option<&str>,
    matched_locals: &HashMap<&str, CategoryId>,
    pending_creates: &HashSet<&str>,
) -> ParentRef {
    let Some(parent_external_id) = parent_external_id else {
        return ParentRef::Root;
    };
    if let Some(local_id) = matched_locals.get(parent_external_id) {
        return ParentRef::Local(*local_id);
    }
    if pending_creates.contains(parent_external_id) {
        return ParentRef::Pending(parent_external_id.to_string());
    }
    tracing::warn!(
        parent_external_id,
        "Parent is neither local nor created by this plan; category will be created at the root"
    );
    ParentRef::Root
}
