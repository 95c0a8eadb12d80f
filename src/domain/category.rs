//! Category entities and the in-memory category tree index
//!
//! The tree is rebuilt from a flat category list for every plan. All walks
//! are iterative and guard against cyclic parent links, which the store does
//! not prevent.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use ts_rs::TS;

use super::article::ArticleFormat;

pub type CategoryId = i64;

/// Local category row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub code: String,
    pub parent_id: Option<CategoryId>,
    pub order: i64,
    pub color: Option<String>,
    /// Feed id this category was created from, if any
    pub external_id: Option<String>,
}

/// Read-only record from the external taxonomy feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ExternalCategoryRecord {
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub parent_external_id: Option<String>,
}

impl ExternalCategoryRecord {
    pub fn new(external_id: &str, name: &str, parent_external_id: Option<&str>) -> Self {
        Self {
            external_id: external_id.to_string(),
            name: name.to_string(),
            parent_external_id: parent_external_id.map(str::to_string),
        }
    }
}

/// Index over a flat category list
#[derive(Debug, Clone)]
pub struct CategoryTree {
    by_id: HashMap<CategoryId, Category>,
    children: BTreeMap<CategoryId, Vec<CategoryId>>,
}

impl CategoryTree {
    pub fn new(categories: &[Category]) -> Self {
        let mut by_id = HashMap::with_capacity(categories.len());
        let mut children: BTreeMap<CategoryId, Vec<CategoryId>> = BTreeMap::new();

        for category in categories {
            by_id.insert(category.id, category.clone());
            if let Some(parent_id) = category.parent_id {
                children.entry(parent_id).or_default().push(category.id);
            }
        }
        for ids in children.values_mut() {
            ids.sort_unstable();
        }

        Self { by_id, children }
    }

    pub fn get(&self, id: CategoryId) -> Option<&Category> {
        self.by_id.get(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Ancestors of `id` in root-to-leaf order, including `id` itself.
    ///
    /// A broken parent link ends the walk at the last known category; a
    /// cycle ends it at the first repeated node.
    pub fn path_to_root(&self, id: CategoryId) -> Vec<&Category> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = self.by_id.get(&id);

        while let Some(category) = cursor {
            if !seen.insert(category.id) {
                tracing::warn!(category_id = category.id, "Cycle detected in category parents");
                break;
            }
            path.push(category);
            cursor = category.parent_id.and_then(|parent| self.by_id.get(&parent));
        }

        path.reverse();
        path
    }

    /// Number of levels from the root down to `id` (root = 1)
    pub fn depth(&self, id: CategoryId) -> usize {
        self.path_to_root(id).len()
    }

    /// Concatenated codes from the root down to `id`
    pub fn code_path(&self, id: CategoryId) -> String {
        self.path_to_root(id)
            .iter()
            .map(|category| category.code.trim())
            .collect()
    }

    /// Of the given categories, the deepest one; ties go to the lowest id.
    pub fn most_specific(&self, ids: &[CategoryId]) -> Option<&Category> {
        ids.iter()
            .filter_map(|id| self.by_id.get(id))
            .max_by(|a, b| {
                self.depth(a.id)
                    .cmp(&self.depth(b.id))
                    .then_with(|| b.id.cmp(&a.id))
            })
    }

    /// Category whose code path claims `article`: longest code path first,
    /// then deepest, then lowest id. Categories with an empty path never
    /// claim anything.
    pub fn find_by_article(&self, article: &str, format: &ArticleFormat) -> Option<&Category> {
        self.by_id
            .values()
            .filter_map(|category| {
                let path = self.code_path(category.id);
                (!path.is_empty() && format.belongs_to(article, &path)).then_some((path.len(), category))
            })
            .max_by(|(a_len, a), (b_len, b)| {
                a_len
                    .cmp(b_len)
                    .then_with(|| self.depth(a.id).cmp(&self.depth(b.id)))
                    .then_with(|| b.id.cmp(&a.id))
            })
            .map(|(_, category)| category)
    }

    /// Subtree rooted at `root` in post-order (children before parents).
    ///
    /// Explicit stack instead of recursion; nodes reachable twice through
    /// corrupt links are emitted once.
    pub fn subtree_post_order(&self, root: CategoryId) -> Vec<CategoryId> {
        if !self.by_id.contains_key(&root) {
            return Vec::new();
        }

        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(root, false)];

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            if !visited.insert(id) {
                continue;
            }
            stack.push((id, true));
            if let Some(children) = self.children.get(&id) {
                for child in children.iter().rev() {
                    if !visited.contains(child) {
                        stack.push((*child, false));
                    }
                }
            }
        }

        order
    }

    /// Next free `order` value under `parent_id`
    pub fn next_sibling_order(&self, parent_id: Option<CategoryId>) -> i64 {
        self.by_id
            .values()
            .filter(|category| category.parent_id == parent_id)
            .map(|category| category.order)
            .max()
            .map_or(0, |max| max + 1)
    }
}

#[cfg(test)]
pub(crate) fn category(id: CategoryId, name: &str, code: &str, parent_id: Option<CategoryId>) -> Category {
    Category {
        id,
        name: name.to_string(),
        code: code.to_string(),
        parent_id,
        order: 0,
        color: None,
        external_id: None,
    }
}
