//! Code dictionary: category name → short code
//!
//! The dictionary is an immutable snapshot assembled from two stored
//! sources. Each source is wrapped in a [`CodeLookupProvider`] and the
//! providers are consulted in a fixed order:
//!
//! 1. `legacy_mapping` - the flat `category_code_mappings` table
//! 2. `rule_synonym` - `code_rules` joined with `code_rule_synonyms`
//!
//! The first provider that knows a name wins. Callers rebuild the snapshot
//! with `refresh()` after any mutation; nothing here touches storage.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;

pub type RuleId = i64;

/// Code some legacy rows carry as a placeholder. Never assigned on create.
pub const PLACEHOLDER_CODE: &str = "TEMP";

pub fn is_placeholder_code(code: &str) -> bool {
    code.trim().eq_ignore_ascii_case(PLACEHOLDER_CODE)
}

/// Canonical short code that one or more names map to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CodeRule {
    pub id: RuleId,
    pub assigned_code: String,
}

/// Alternate name for a [`CodeRule`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Synonym {
    pub id: i64,
    pub rule_id: RuleId,
    pub name: String,
}

/// Row of the older flat mapping table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LegacyMapping {
    pub id: i64,
    pub category_name: String,
    pub assigned_code: String,
}

/// Raw rows the dictionary is built from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionarySnapshot {
    pub rules: Vec<CodeRule>,
    pub synonyms: Vec<Synonym>,
    pub legacy_mappings: Vec<LegacyMapping>,
}

impl DictionarySnapshot {
    /// Rows sorted by id so hashing and provider construction do not depend
    /// on query order
    pub fn canonicalized(&self) -> Self {
        let mut snapshot = self.clone();
        snapshot.rules.sort_by_key(|rule| rule.id);
        snapshot.synonyms.sort_by_key(|synonym| synonym.id);
        snapshot.legacy_mappings.sort_by_key(|mapping| mapping.id);
        snapshot
    }
}

/// Trim and lower-case a name for dictionary and category matching
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// One source of name → code knowledge
pub trait CodeLookupProvider: Send + Sync + std::fmt::Debug {
    /// Stable provider name, reported with every resolution
    fn name(&self) -> &'static str;

    /// Code for an already-normalized name
    fn lookup(&self, normalized_name: &str) -> Option<&str>;
}

#[derive(Debug, Default)]
pub struct LegacyMappingProvider {
    codes: HashMap<String, String>,
}

impl LegacyMappingProvider {
    pub fn new(mappings: &[LegacyMapping]) -> Self {
        let mut codes = HashMap::with_capacity(mappings.len());
        for mapping in mappings {
            let key = normalize_name(&mapping.category_name);
            if key.is_empty() {
                continue;
            }
            // Lowest id wins on duplicate names
            codes
                .entry(key)
                .or_insert_with(|| mapping.assigned_code.trim().to_string());
        }
        Self { codes }
    }
}

impl CodeLookupProvider for LegacyMappingProvider {
    fn name(&self) -> &'static str {
        "legacy_mapping"
    }

    fn lookup(&self, normalized_name: &str) -> Option<&str> {
        self.codes.get(normalized_name).map(String::as_str)
    }
}

#[derive(Debug, Default)]
pub struct RuleSynonymProvider {
    codes: HashMap<String, String>,
}

impl RuleSynonymProvider {
    pub fn new(rules: &[CodeRule], synonyms: &[Synonym]) -> Self {
        let rule_codes: HashMap<RuleId, &str> = rules
            .iter()
            .map(|rule| (rule.id, rule.assigned_code.trim()))
            .collect();

        let mut codes = HashMap::with_capacity(synonyms.len());
        for synonym in synonyms {
            let Some(code) = rule_codes.get(&synonym.rule_id) else {
                tracing::warn!(
                    synonym_id = synonym.id,
                    rule_id = synonym.rule_id,
                    "Synonym references a missing rule; ignored"
                );
                continue;
            };
            let key = normalize_name(&synonym.name);
            if key.is_empty() {
                continue;
            }
            codes.entry(key).or_insert_with(|| (*code).to_string());
        }
        Self { codes }
    }
}

impl CodeLookupProvider for RuleSynonymProvider {
    fn name(&self) -> &'static str {
        "rule_synonym"
    }

    fn lookup(&self, normalized_name: &str) -> Option<&str> {
        self.codes.get(normalized_name).map(String::as_str)
    }
}

/// Immutable dictionary snapshot with ordered providers
#[derive(Debug)]
pub struct CodeDictionary {
    providers: Vec<Box<dyn CodeLookupProvider>>,
    snapshot: DictionarySnapshot,
}

impl CodeDictionary {
    /// Standard precedence: legacy mappings, then rules and synonyms
    pub fn from_snapshot(snapshot: DictionarySnapshot) -> Self {
        let snapshot = snapshot.canonicalized();
        let providers: Vec<Box<dyn CodeLookupProvider>> = vec![
            Box::new(LegacyMappingProvider::new(&snapshot.legacy_mappings)),
            Box::new(RuleSynonymProvider::new(&snapshot.rules, &snapshot.synonyms)),
        ];
        Self { providers, snapshot }
    }

    pub fn empty() -> Self {
        Self::from_snapshot(DictionarySnapshot::default())
    }

    /// Provider names in the order they are consulted
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|provider| provider.name()).collect()
    }

    pub(crate) fn providers(&self) -> &[Box<dyn CodeLookupProvider>] {
        &self.providers
    }

    /// Rows this dictionary was built from
    pub fn snapshot(&self) -> &DictionarySnapshot {
        &self.snapshot
    }

    pub fn rule(&self, rule_id: RuleId) -> Option<&CodeRule> {
        self.snapshot.rules.iter().find(|rule| rule.id == rule_id)
    }

    pub fn rule_by_code(&self, code: &str) -> Option<&CodeRule> {
        self.snapshot
            .rules
            .iter()
            .find(|rule| rule.assigned_code.trim() == code)
    }

    /// Synonyms attached to a rule, in id order
    pub fn synonyms_of(&self, rule_id: RuleId) -> Vec<&Synonym> {
        self.snapshot
            .synonyms
            .iter()
            .filter(|synonym| synonym.rule_id == rule_id)
            .collect()
    }

    /// Whether any provider already maps `name` to a real code.
    /// Placeholder-only names do not count; they still need a rule.
    pub fn contains_name(&self, name: &str) -> bool {
        let key = normalize_name(name);
        self.providers.iter().any(|provider| {
            provider
                .lookup(&key)
                .is_some_and(|code| !code.is_empty() && !is_placeholder_code(code))
        })
    }
}
