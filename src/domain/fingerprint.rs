//! Plan fingerprints
//!
//! A plan records a BLAKE3 digest of the store state it was computed from.
//! The executor recomputes the digest inside its transaction; a mismatch
//! means the store moved on and the plan must be rebuilt.

use crate::domain::category::Category;
use crate::domain::dictionary::DictionarySnapshot;
use crate::domain::sku_plan::Product;

fn update_field(hasher: &mut blake3::Hasher, value: &str) {
    // Length prefix keeps ("ab", "c") and ("a", "bc") apart
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn update_optional(hasher: &mut blake3::Hasher, value: Option<&str>) {
    match value {
        Some(value) => {
            hasher.update(&[1]);
            update_field(hasher, value);
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

fn update_categories(hasher: &mut blake3::Hasher, categories: &[Category]) {
    let mut sorted: Vec<&Category> = categories.iter().collect();
    sorted.sort_by_key(|category| category.id);

    hasher.update(b"categories");
    for category in sorted {
        hasher.update(&category.id.to_le_bytes());
        update_field(hasher, &category.name);
        update_field(hasher, &category.code);
        update_optional(hasher, category.parent_id.map(|id| id.to_string()).as_deref());
        hasher.update(&category.order.to_le_bytes());
        update_optional(hasher, category.external_id.as_deref());
    }
}

/// Digest of the state a sync plan depends on
pub fn sync_fingerprint(categories: &[Category], dictionary: &DictionarySnapshot) -> String {
    let mut hasher = blake3::Hasher::new();
    update_categories(&mut hasher, categories);

    let dictionary = dictionary.canonicalized();
    hasher.update(b"rules");
    for rule in &dictionary.rules {
        hasher.update(&rule.id.to_le_bytes());
        update_field(&mut hasher, &rule.assigned_code);
    }
    hasher.update(b"synonyms");
    for synonym in &dictionary.synonyms {
        hasher.update(&synonym.id.to_le_bytes());
        hasher.update(&synonym.rule_id.to_le_bytes());
        update_field(&mut hasher, &synonym.name);
    }
    hasher.update(b"legacy");
    for mapping in &dictionary.legacy_mappings {
        hasher.update(&mapping.id.to_le_bytes());
        update_field(&mut hasher, &mapping.category_name);
        update_field(&mut hasher, &mapping.assigned_code);
    }

    hasher.finalize().to_hex().to_string()
}

/// Digest of the state a SKU plan depends on
pub fn sku_fingerprint(categories: &[Category], products: &[Product]) -> String {
    let mut hasher = blake3::Hasher::new();
    update_categories(&mut hasher, categories);

    let mut sorted: Vec<&Product> = products.iter().collect();
    sorted.sort_by_key(|product| product.id);

    hasher.update(b"products");
    for product in sorted {
        hasher.update(&product.id.to_le_bytes());
        update_optional(&mut hasher, product.article.as_deref());
        let mut category_ids = product.category_ids.clone();
        category_ids.sort_unstable();
        hasher.update(&(category_ids.len() as u64).to_le_bytes());
        for id in category_ids {
            hasher.update(&id.to_le_bytes());
        }
    }

    hasher.finalize().to_hex().to_string()
}
