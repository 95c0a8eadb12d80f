//! Category name classifier
//!
//! Pure function over a [`CodeDictionary`] snapshot.

use crate::domain::dictionary::{is_placeholder_code, normalize_name, CodeDictionary, PLACEHOLDER_CODE};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum Classification {
    Resolved {
        code: String,
        provider: &'static str,
    },
    Unresolved,
}

impl Classification {
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Resolved { code, .. } => Some(code),
            Self::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

/// Resolve `name` against the dictionary providers in precedence order.
///
/// A placeholder code does not stop the search: a later provider with a real
/// code wins. Only when nothing better exists is the placeholder returned.
pub fn classify(dictionary: &CodeDictionary, name: &str) -> Classification {
    let key = normalize_name(name);
    if key.is_empty() {
        return Classification::Unresolved;
    }

    let mut placeholder = None;
    for provider in dictionary.providers() {
        let Some(code) = provider.lookup(&key).filter(|code| !code.is_empty()) else {
            continue;
        };
        if is_placeholder_code(code) {
            placeholder.get_or_insert(provider.name());
            continue;
        }
        return Classification::Resolved {
            code: code.to_string(),
            provider: provider.name(),
        };
    }

    match placeholder {
        Some(provider) => Classification::Resolved {
            code: PLACEHOLDER_CODE.to_string(),
            provider,
        },
        None => Classification::Unresolved,
    }
}
