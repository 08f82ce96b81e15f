//! In-memory boundary registry for tests.

use crate::registry::{BoundaryRegistry, RegistryError, RelationshipQuery, WriteReceipt};
use crate::types::{BoundaryEntity, BoundaryNode, BoundaryRelationship, HierarchyLevel};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    entities: IndexMap<String, BoundaryEntity>,
    relationships: Vec<BoundaryRelationship>,
    hierarchy: Vec<HierarchyLevel>,
    hidden: HashSet<String>,
    failing: HashSet<String>,
    entity_search_calls: usize,
    create_entity_calls: usize,
    create_relationship_calls: usize,
    code_searches: HashMap<String, usize>,
}

#[derive(Default)]
pub struct InMemoryRegistry {
    state: Mutex<State>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_hierarchy(self, levels: &[(&str, Option<&str>)]) -> Self {
        self.state().hierarchy = levels
            .iter()
            .map(|(boundary_type, parent)| HierarchyLevel {
                boundary_type: boundary_type.to_string(),
                parent_boundary_type: parent.map(String::from),
            })
            .collect();
        self
    }

    /// Stores every node of `tree` as an entity placed under its parent.
    pub fn insert_tree(&self, tree: &[BoundaryNode], hierarchy_type: &str) {
        let mut state = self.state();
        let mut stack: Vec<(&BoundaryNode, Option<&str>)> =
            tree.iter().rev().map(|node| (node, None)).collect();
        while let Some((node, parent)) = stack.pop() {
            state.entities.insert(
                node.code.clone(),
                BoundaryEntity::named("mz", &node.code, &node.code),
            );
            state.relationships.push(BoundaryRelationship {
                tenant_id: "mz".into(),
                code: node.code.clone(),
                hierarchy_type: hierarchy_type.to_string(),
                boundary_type: node.boundary_type.clone(),
                parent: parent.map(String::from),
            });
            stack.extend(
                node.children
                    .iter()
                    .rev()
                    .map(|child| (child, Some(node.code.as_str()))),
            );
        }
    }

    /// Searches by code never find `code`, as if its relationship had not
    /// propagated yet.
    pub fn hide_from_code_search(&self, code: &str) {
        self.state().hidden.insert(code.to_string());
    }

    pub fn fail_relationship_for(&self, code: &str) {
        self.state().failing.insert(code.to_string());
    }

    pub fn relationships(&self) -> Vec<BoundaryRelationship> {
        self.state().relationships.clone()
    }

    pub fn entities(&self) -> Vec<BoundaryEntity> {
        self.state().entities.values().cloned().collect()
    }

    pub fn entity_search_calls(&self) -> usize {
        self.state().entity_search_calls
    }

    pub fn create_entity_calls(&self) -> usize {
        self.state().create_entity_calls
    }

    pub fn create_relationship_calls(&self) -> usize {
        self.state().create_relationship_calls
    }

    pub fn code_searches(&self, code: &str) -> usize {
        self.state().code_searches.get(code).copied().unwrap_or(0)
    }
}

fn build_node(
    relationship: &BoundaryRelationship,
    all: &[BoundaryRelationship],
    include_children: bool,
) -> BoundaryNode {
    let children = match include_children {
        true => all
            .iter()
            .filter(|r| r.parent.as_deref() == Some(relationship.code.as_str()))
            .map(|r| build_node(r, all, true))
            .collect(),
        false => Vec::new(),
    };
    BoundaryNode::new(&relationship.code, &relationship.boundary_type).with_children(children)
}

fn receipt(url: &str, request: serde_json::Value) -> WriteReceipt {
    WriteReceipt {
        url: url.to_string(),
        status: 200,
        response: json!({ "TenantBoundary": [request.clone()] }),
        request,
    }
}

#[async_trait]
impl BoundaryRegistry for InMemoryRegistry {
    async fn search_boundaries(
        &self,
        _tenant_id: &str,
        codes: &[String],
    ) -> Result<Vec<BoundaryEntity>, RegistryError> {
        let mut state = self.state();
        state.entity_search_calls += 1;
        Ok(codes
            .iter()
            .filter_map(|code| state.entities.get(code).cloned())
            .collect())
    }

    async fn create_boundaries(
        &self,
        _tenant_id: &str,
        entities: &[BoundaryEntity],
    ) -> Result<WriteReceipt, RegistryError> {
        let mut state = self.state();
        state.create_entity_calls += 1;
        for entity in entities {
            state.entities.insert(entity.code.clone(), entity.clone());
        }
        Ok(receipt("memory://boundary/_create", json!({ "Boundary": entities })))
    }

    async fn search_relationships(
        &self,
        query: &RelationshipQuery,
    ) -> Result<Vec<BoundaryNode>, RegistryError> {
        let mut state = self.state();
        let in_hierarchy: Vec<BoundaryRelationship> = state
            .relationships
            .iter()
            .filter(|r| r.hierarchy_type == query.hierarchy_type)
            .cloned()
            .collect();

        match &query.codes {
            Some(codes) => {
                let mut found = Vec::new();
                for code in codes {
                    *state.code_searches.entry(code.clone()).or_default() += 1;
                    if state.hidden.contains(code) {
                        continue;
                    }
                    if let Some(r) = in_hierarchy.iter().find(|r| &r.code == code) {
                        found.push(build_node(r, &in_hierarchy, query.include_children));
                    }
                }
                Ok(found)
            }
            None => Ok(in_hierarchy
                .iter()
                .filter(|r| r.parent.is_none())
                .map(|r| build_node(r, &in_hierarchy, true))
                .collect()),
        }
    }

    async fn create_relationship(
        &self,
        relationship: &BoundaryRelationship,
    ) -> Result<WriteReceipt, RegistryError> {
        let mut state = self.state();
        state.create_relationship_calls += 1;
        if state.failing.contains(&relationship.code) {
            return Err(RegistryError::Status {
                url: "memory://boundary-relationships/_create".into(),
                status: 400,
                body: "rejected".into(),
            });
        }
        state.relationships.push(relationship.clone());
        Ok(receipt(
            "memory://boundary-relationships/_create",
            json!({ "BoundaryRelationship": relationship }),
        ))
    }

    async fn search_hierarchy_definition(
        &self,
        _tenant_id: &str,
        _hierarchy_type: &str,
    ) -> Result<Vec<HierarchyLevel>, RegistryError> {
        Ok(self.state().hierarchy.clone())
    }
}
