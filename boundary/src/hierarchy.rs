//! Conversions between the registry's nested boundary tree and flat
//! representations (code paths, child to parent maps, level lists).

use crate::types::{BoundaryNode, ElementKey, HierarchyLevel};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Trees deeper than this are rejected rather than walked.
pub const MAX_DEPTH: usize = 64;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum HierarchyError {
    #[error("boundary {code} is nested deeper than {MAX_DEPTH} levels")]
    TooDeep { code: String },
    #[error("hierarchy definition has no root level")]
    NoRoot,
}

/// One entry per node in pre-order: the comma-joined codes from the root to
/// that node.
pub fn build_path_list(tree: &[BoundaryNode]) -> Result<Vec<String>, HierarchyError> {
    let mut out = Vec::new();
    let mut chain = Vec::new();
    walk_paths(tree, &mut chain, &mut out)?;
    Ok(out)
}

fn walk_paths<'a>(
    nodes: &'a [BoundaryNode],
    chain: &mut Vec<&'a str>,
    out: &mut Vec<String>,
) -> Result<(), HierarchyError> {
    for node in nodes {
        if chain.len() >= MAX_DEPTH {
            return Err(HierarchyError::TooDeep {
                code: node.code.clone(),
            });
        }
        chain.push(&node.code);
        out.push(chain.join(","));
        walk_paths(&node.children, chain, out)?;
        chain.pop();
    }
    Ok(())
}

/// Every code present anywhere in the tree.
pub fn extract_codes(tree: &[BoundaryNode]) -> HashSet<String> {
    let mut codes = HashSet::new();
    let mut stack: Vec<&BoundaryNode> = tree.iter().collect();
    while let Some(node) = stack.pop() {
        codes.insert(node.code.clone());
        stack.extend(node.children.iter());
    }
    codes
}

/// Code to boundary type for every node in the tree.
pub fn boundary_types(tree: &[BoundaryNode]) -> HashMap<String, String> {
    let mut types = HashMap::new();
    let mut stack: Vec<&BoundaryNode> = tree.iter().collect();
    while let Some(node) = stack.pop() {
        types.insert(node.code.clone(), node.boundary_type.clone());
        stack.extend(node.children.iter());
    }
    types
}

/// Immediate parent of every distinct element, in discovery order. The
/// first parent recorded for an element wins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChildParentMap {
    entries: IndexMap<ElementKey, Option<ElementKey>>,
}

impl ChildParentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the element was already present.
    pub fn insert(&mut self, child: ElementKey, parent: Option<ElementKey>) -> bool {
        if self.entries.contains_key(&child) {
            return false;
        }
        self.entries.insert(child, parent);
        true
    }

    pub fn contains(&self, element: &ElementKey) -> bool {
        self.entries.contains_key(element)
    }

    pub fn parent_of(&self, element: &ElementKey) -> Option<&ElementKey> {
        self.entries.get(element).and_then(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ElementKey, Option<&ElementKey>)> {
        self.entries.iter().map(|(k, v)| (k, v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries as a set of `(child, parent)` pairs, ignoring discovery order.
    pub fn pairs(&self) -> HashSet<(ElementKey, Option<ElementKey>)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Each row lists hierarchy cells from the root level down; a cell's parent
/// is the cell to its left.
pub fn build_child_parent_map<R: AsRef<[ElementKey]>>(rows: &[R]) -> ChildParentMap {
    let mut map = ChildParentMap::new();
    for row in rows {
        let mut parent: Option<&ElementKey> = None;
        for element in row.as_ref() {
            map.insert(element.clone(), parent.cloned());
            parent = Some(element);
        }
    }
    map
}

/// Orders a hierarchy definition from the root type down. Types unreachable
/// from a root are dropped.
pub fn order_levels(definition: &[HierarchyLevel]) -> Result<Vec<String>, HierarchyError> {
    let mut ordered = Vec::new();
    let mut seen = HashSet::new();

    let roots = definition
        .iter()
        .filter(|level| level.parent_boundary_type.is_none());
    for root in roots {
        push_level(&root.boundary_type, definition, &mut ordered, &mut seen);
    }

    if ordered.is_empty() && !definition.is_empty() {
        return Err(HierarchyError::NoRoot);
    }
    Ok(ordered)
}

fn push_level(
    boundary_type: &str,
    definition: &[HierarchyLevel],
    ordered: &mut Vec<String>,
    seen: &mut HashSet<String>,
) {
    if !seen.insert(boundary_type.to_string()) || ordered.len() >= MAX_DEPTH {
        return;
    }
    ordered.push(boundary_type.to_string());
    for child in definition
        .iter()
        .filter(|level| level.parent_boundary_type.as_deref() == Some(boundary_type))
    {
        push_level(&child.boundary_type, definition, ordered, seen);
    }
}

/// Levels starting at `first`, or all levels when `first` is not defined.
pub fn levels_from<'a>(levels: &'a [String], first: &str) -> &'a [String] {
    match levels.iter().position(|level| level == first) {
        Some(idx) => &levels[idx..],
        None => levels,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryFilter {
    pub code: String,
    #[serde(default)]
    pub include_all_children: bool,
}

/// Keeps the selected nodes and their ancestors. A selected node with
/// `include_all_children` keeps its whole subtree; otherwise only children
/// that lead to another selection are kept.
pub fn filter_tree(tree: &[BoundaryNode], filters: &[BoundaryFilter]) -> Vec<BoundaryNode> {
    let selected: HashMap<&str, bool> = filters
        .iter()
        .map(|f| (f.code.as_str(), f.include_all_children))
        .collect();
    tree.iter()
        .filter_map(|node| filter_node(node, &selected))
        .collect()
}

fn filter_node(node: &BoundaryNode, selected: &HashMap<&str, bool>) -> Option<BoundaryNode> {
    if selected.get(node.code.as_str()) == Some(&true) {
        return Some(node.clone());
    }

    let children: Vec<BoundaryNode> = node
        .children
        .iter()
        .filter_map(|child| filter_node(child, selected))
        .collect();

    if children.is_empty() && !selected.contains_key(node.code.as_str()) {
        return None;
    }

    Some(BoundaryNode {
        id: node.id.clone(),
        code: node.code.clone(),
        boundary_type: node.boundary_type.clone(),
        children,
    })
}
