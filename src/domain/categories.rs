use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

pub const MAX_CATEGORY_DEPTH: u8 = 32;

/// A category as stored, with its parent and child references resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub children: Vec<Uuid>,
}

/// A category with its descendants attached as `subcategories`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub children: Vec<Uuid>,
    pub subcategories: Vec<CategoryNode>,
}

impl CategoryNode {
    fn leaf(record: CategoryRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            parent_id: record.parent_id,
            children: record.children,
            subcategories: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_size(&self) -> usize {
        1 + self
            .subcategories
            .iter()
            .map(CategoryNode::subtree_size)
            .sum::<usize>()
    }
}

#[derive(Debug, Error)]
pub enum CategoryTreeError {
    #[error("duplicate category id `{id}` detected")]
    DuplicateId { id: Uuid },
    #[error("category `{id}` lists itself as its parent")]
    SelfParent { id: Uuid },
    #[error("category `{id}` exceeds maximum depth {max_depth}")]
    DepthExceeded { id: Uuid, max_depth: u8 },
}

/// Assemble the category forest from a flat, parent-referencing list.
///
/// Roots and siblings keep the order of `records`. Traversal starts only at
/// roots and consumes every node at most once, so malformed parent chains
/// cannot loop: categories that sit on a cycle or point at a missing parent are
/// never reached and are left out of the result.
pub fn build_category_forest(
    records: Vec<CategoryRecord>,
) -> Result<Vec<CategoryNode>, CategoryTreeError> {
    let mut nodes: HashMap<Uuid, CategoryNode> = HashMap::with_capacity(records.len());
    let mut children: HashMap<Option<Uuid>, Vec<Uuid>> = HashMap::new();

    for record in records {
        if nodes.contains_key(&record.id) {
            return Err(CategoryTreeError::DuplicateId { id: record.id });
        }
        if record.parent_id == Some(record.id) {
            return Err(CategoryTreeError::SelfParent { id: record.id });
        }

        children.entry(record.parent_id).or_default().push(record.id);
        nodes.insert(record.id, CategoryNode::leaf(record));
    }

    let mut roots = Vec::new();
    if let Some(root_ids) = children.get(&None) {
        for &root_id in root_ids {
            if let Some(node) = assemble(root_id, 1, &mut nodes, &children)? {
                roots.push(node);
            }
        }
    }

    if !nodes.is_empty() {
        let mut omitted: Vec<Uuid> = nodes.into_keys().collect();
        omitted.sort();
        warn!(
            omitted = omitted.len(),
            ids = ?omitted,
            "categories unreachable from any root were left out of the hierarchy"
        );
    }

    Ok(roots)
}

fn assemble(
    id: Uuid,
    depth: u8,
    nodes: &mut HashMap<Uuid, CategoryNode>,
    children: &HashMap<Option<Uuid>, Vec<Uuid>>,
) -> Result<Option<CategoryNode>, CategoryTreeError> {
    if depth > MAX_CATEGORY_DEPTH {
        return Err(CategoryTreeError::DepthExceeded {
            id,
            max_depth: MAX_CATEGORY_DEPTH,
        });
    }

    let Some(mut node) = nodes.remove(&id) else {
        return Ok(None);
    };

    if let Some(child_ids) = children.get(&Some(id)) {
        for &child_id in child_ids {
            if let Some(child) = assemble(child_id, depth + 1, nodes, children)? {
                node.subcategories.push(child);
            }
        }
    }

    Ok(Some(node))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u128, name: &str, parent: Option<u128>) -> CategoryRecord {
        CategoryRecord {
            id: Uuid::from_u128(id),
            name: name.to_string(),
            parent_id: parent.map(Uuid::from_u128),
            children: Vec::new(),
        }
    }

    #[test]
    fn two_roots_with_three_children() {
        let records = vec![
            record(1, "Food", None),
            record(2, "Outdoors", None),
            record(3, "Cafes", Some(1)),
            record(4, "Bakeries", Some(1)),
            record(5, "Hiking", Some(2)),
        ];

        let forest = build_category_forest(records).expect("forest");

        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].name, "Food");
        assert_eq!(forest[0].subcategories.len(), 2);
        assert_eq!(forest[0].subcategories[0].name, "Cafes");
        assert_eq!(forest[0].subcategories[1].name, "Bakeries");
        assert_eq!(forest[1].name, "Outdoors");
        assert_eq!(forest[1].subcategories.len(), 1);
        for root in &forest {
            for child in &root.subcategories {
                assert!(child.subcategories.is_empty());
            }
        }
    }

    #[test]
    fn nested_levels_are_attached_recursively() {
        let records = vec![
            record(3, "Espresso bars", Some(2)),
            record(2, "Cafes", Some(1)),
            record(1, "Food", None),
        ];

        let forest = build_category_forest(records).expect("forest");

        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].subtree_size(), 3);
        let cafes = &forest[0].subcategories[0];
        assert_eq!(cafes.subcategories[0].id, Uuid::from_u128(3));
    }

    #[test]
    fn cycle_is_omitted_without_looping() {
        let records = vec![
            record(1, "Food", None),
            record(2, "A", Some(3)),
            record(3, "B", Some(2)),
        ];

        let forest = build_category_forest(records).expect("forest");

        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].subtree_size(), 1);
    }

    #[test]
    fn dangling_parent_is_omitted() {
        let records = vec![record(1, "Food", None), record(2, "Orphan", Some(99))];

        let forest = build_category_forest(records).expect("forest");

        assert_eq!(forest.len(), 1);
        assert!(forest[0].subcategories.is_empty());
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let records = vec![record(1, "Food", None), record(1, "Food again", None)];

        let err = build_category_forest(records).expect_err("duplicate");
        assert!(matches!(err, CategoryTreeError::DuplicateId { id } if id == Uuid::from_u128(1)));
    }

    #[test]
    fn self_parent_is_rejected() {
        let records = vec![record(1, "Food", None), record(4, "Loop", Some(4))];

        let err = build_category_forest(records).expect_err("self parent");
        assert!(matches!(err, CategoryTreeError::SelfParent { id } if id == Uuid::from_u128(4)));
    }

    #[test]
    fn depth_overflow_is_rejected() {
        let mut records = Vec::new();
        let mut parent = None;
        for i in 0..=u128::from(MAX_CATEGORY_DEPTH) {
            records.push(record(i + 1, "level", parent));
            parent = Some(i + 1);
        }

        let err = build_category_forest(records).expect_err("depth overflow");
        assert!(matches!(err, CategoryTreeError::DepthExceeded { .. }));
    }

    #[test]
    fn empty_input_yields_empty_forest() {
        let forest = build_category_forest(Vec::new()).expect("forest");
        assert!(forest.is_empty());
    }
}
