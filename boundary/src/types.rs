use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A boundary in the registry's relationship tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub code: String,
    pub boundary_type: String,
    #[serde(default)]
    pub children: Vec<BoundaryNode>,
}

impl BoundaryNode {
    pub fn new<C, T>(code: C, boundary_type: T) -> Self
    where
        C: Into<String>,
        T: Into<String>,
    {
        BoundaryNode {
            id: None,
            code: code.into(),
            boundary_type: boundary_type.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<BoundaryNode>) -> Self {
        self.children = children;
        self
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(BoundaryNode::count).sum::<usize>()
    }
}

/// A boundary entity as stored by the registry, without hierarchy placement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryEntity {
    pub tenant_id: String,
    pub code: String,
    #[serde(default)]
    pub geometry: Option<Value>,
    #[serde(default)]
    pub additional_details: Value,
}

impl BoundaryEntity {
    pub fn named(tenant_id: &str, code: &str, name: &str) -> Self {
        BoundaryEntity {
            tenant_id: tenant_id.to_string(),
            code: code.to_string(),
            geometry: None,
            additional_details: serde_json::json!({ "name": name }),
        }
    }
}

/// Placement of one boundary under its parent within a hierarchy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryRelationship {
    pub tenant_id: String,
    pub code: String,
    pub hierarchy_type: String,
    pub boundary_type: String,
    pub parent: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyLevel {
    pub boundary_type: String,
    #[serde(default)]
    pub parent_boundary_type: Option<String>,
}

/// A distinct cell value at one hierarchy column. Raw cell values repeat
/// across rows, so equality is structural.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementKey {
    pub key: String,
    pub value: String,
}

impl ElementKey {
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        ElementKey {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditDetails {
    pub created_by: Option<String>,
    pub created_time: i64,
    pub last_modified_by: Option<String>,
    pub last_modified_time: i64,
}

impl AuditDetails {
    pub fn now(user: Option<&str>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        AuditDetails {
            created_by: user.map(String::from),
            created_time: now,
            last_modified_by: user.map(String::from),
            last_modified_time: now,
        }
    }

    pub fn touch(&mut self, user: Option<&str>) {
        self.last_modified_by = user.map(String::from).or(self.last_modified_by.take());
        self.last_modified_time = chrono::Utc::now().timestamp_millis();
    }
}

/// Audit trail entry for one outbound write to the registry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: String,
    pub status: u16,
    pub retry_count: u32,
    pub tenant_id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub url: String,
    pub request_payload: Value,
    pub response_payload: Value,
    pub audit_details: AuditDetails,
    #[serde(default)]
    pub additional_details: Value,
    #[serde(default)]
    pub resource_details_id: Option<String>,
}

/// Who is running an operation, and on what.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunContext {
    pub tenant_id: String,
    pub hierarchy_type: String,
    pub resource_type: String,
    pub user: Option<String>,
    pub resource_details_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_deserializes_registry_shape() {
        let json = r#"{"id":"1","code":"ROOT","boundaryType":"Country","children":[
            {"code":"ROOT_01_A","boundaryType":"Province"}]}"#;
        let node: BoundaryNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.count(), 2);
        assert_eq!(node.children[0].boundary_type, "Province");
        assert!(node.children[0].children.is_empty());
    }

    #[test]
    fn test_entity_serializes_null_geometry() {
        let entity = BoundaryEntity::named("mz", "ROOT_01_A", "a");
        let json = serde_json::to_value(&entity).unwrap();
        assert!(json["geometry"].is_null());
        assert_eq!(json["additionalDetails"]["name"], "a");
        assert_eq!(json["tenantId"], "mz");
    }

    #[test]
    fn test_element_key_structural_equality() {
        assert_eq!(ElementKey::new("District", "x"), ElementKey::new("District", "x"));
        assert_ne!(ElementKey::new("District", "x"), ElementKey::new("Province", "x"));
    }
}
