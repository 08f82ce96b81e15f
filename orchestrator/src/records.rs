//! Generated-template and uploaded-sheet records, and where they are kept.
//!
//! Records are never deleted: a superseded generated template is marked
//! `expired` and kept.

use async_trait::async_trait;
use boundary::types::AuditDetails;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Mutex, MutexGuard};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Accepted,
    Started,
    InProgress,
    Completed,
    Failed,
    Expired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceType {
    Boundary,
    BoundaryWithTarget,
    FacilityWithBoundary,
    UserWithBoundary,
    Facility,
    User,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Boundary => "boundary",
            ResourceType::BoundaryWithTarget => "boundaryWithTarget",
            ResourceType::FacilityWithBoundary => "facilityWithBoundary",
            ResourceType::UserWithBoundary => "userWithBoundary",
            ResourceType::Facility => "facility",
            ResourceType::User => "user",
        }
    }

    /// Types a template can be generated for.
    pub fn is_generatable(&self) -> bool {
        !matches!(self, ResourceType::Facility | ResourceType::User)
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A downloadable template and the state of its generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedResource {
    pub id: String,
    #[serde(rename = "fileStoreid")]
    pub file_store_id: Option<String>,
    pub status: Status,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub tenant_id: String,
    pub hierarchy_type: String,
    pub count: Option<u64>,
    #[serde(default)]
    pub additional_details: Value,
    pub audit_details: AuditDetails,
}

impl GeneratedResource {
    pub fn filters(&self) -> Option<&Value> {
        self.additional_details
            .get("Filters")
            .filter(|filters| !filters.is_null())
    }

    pub fn set_error(&mut self, error: Value) {
        if !self.additional_details.is_object() {
            self.additional_details = json!({});
        }
        self.additional_details["error"] = error;
    }
}

/// An uploaded sheet to be processed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDetails {
    #[serde(default)]
    pub id: Option<String>,
    pub tenant_id: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub file_store_id: String,
    pub hierarchy_type: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub processed_file_store_id: Option<String>,
    #[serde(default)]
    pub additional_details: Value,
    #[serde(default)]
    pub audit_details: Option<AuditDetails>,
}

impl ResourceDetails {
    pub fn set_error(&mut self, error: Value) {
        if !self.additional_details.is_object() {
            self.additional_details = json!({});
        }
        self.additional_details["error"] = error;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedQuery {
    pub resource_type: ResourceType,
    pub tenant_id: String,
    pub hierarchy_type: String,
    pub status: Option<Status>,
    pub id: Option<String>,
}

impl GeneratedQuery {
    fn matches(&self, record: &GeneratedResource) -> bool {
        record.resource_type == self.resource_type
            && record.tenant_id == self.tenant_id
            && record.hierarchy_type == self.hierarchy_type
            && self.status.is_none_or(|status| record.status == status)
            && self.id.as_ref().is_none_or(|id| &record.id == id)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn search_generated(
        &self,
        query: &GeneratedQuery,
    ) -> Result<Vec<GeneratedResource>, StoreError>;

    /// Inserts or replaces records by id.
    async fn save_generated(&self, records: &[GeneratedResource]) -> Result<(), StoreError>;

    async fn save_details(&self, details: &ResourceDetails) -> Result<(), StoreError>;

    async fn find_details(&self, id: &str) -> Result<Option<ResourceDetails>, StoreError>;
}

#[derive(Default)]
struct Records {
    generated: Vec<GeneratedResource>,
    details: Vec<ResourceDetails>,
}

/// Process-local record store.
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<Records>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn search_generated(
        &self,
        query: &GeneratedQuery,
    ) -> Result<Vec<GeneratedResource>, StoreError> {
        Ok(self
            .records()
            .generated
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect())
    }

    async fn save_generated(&self, records: &[GeneratedResource]) -> Result<(), StoreError> {
        let mut store = self.records();
        for record in records {
            match store.generated.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => store.generated.push(record.clone()),
            }
        }
        Ok(())
    }

    async fn save_details(&self, details: &ResourceDetails) -> Result<(), StoreError> {
        let mut store = self.records();
        match store.details.iter_mut().find(|d| d.id == details.id) {
            Some(existing) => *existing = details.clone(),
            None => store.details.push(details.clone()),
        }
        Ok(())
    }

    async fn find_details(&self, id: &str) -> Result<Option<ResourceDetails>, StoreError> {
        Ok(self
            .records()
            .details
            .iter()
            .find(|d| d.id.as_deref() == Some(id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, status: Status) -> GeneratedResource {
        GeneratedResource {
            id: id.into(),
            file_store_id: None,
            status,
            resource_type: ResourceType::Boundary,
            tenant_id: "mz".into(),
            hierarchy_type: "ADMIN".into(),
            count: None,
            additional_details: json!({}),
            audit_details: AuditDetails::now(Some("u1")),
        }
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(record("1", Status::InProgress)).unwrap();
        assert_eq!(json["status"], "inprogress");
        assert_eq!(json["type"], "boundary");
        assert!(json["fileStoreid"].is_null());
        assert_eq!(json["auditDetails"]["createdBy"], "u1");

        let details: ResourceDetails = serde_json::from_value(json!({
            "tenantId": "mz",
            "type": "boundaryWithTarget",
            "fileStoreId": "fs-1",
            "hierarchyType": "ADMIN",
            "action": "create"
        }))
        .unwrap();
        assert_eq!(details.resource_type, ResourceType::BoundaryWithTarget);
        assert!(details.additional_details.is_null());
    }

    #[test]
    fn test_set_error_keeps_details() {
        let mut r = record("1", Status::Failed);
        r.additional_details = json!({ "Filters": { "boundaries": [] } });
        r.set_error(json!({ "code": "X" }));
        assert_eq!(r.additional_details["error"]["code"], "X");
        assert!(r.filters().is_some());

        let mut r = record("2", Status::Failed);
        r.additional_details = Value::Null;
        r.set_error(json!("boom"));
        assert_eq!(r.additional_details["error"], "boom");
        assert!(r.filters().is_none());
    }

    #[tokio::test]
    async fn test_store_replaces_by_id() {
        let store = InMemoryStore::new();
        store
            .save_generated(&[record("1", Status::Completed), record("2", Status::InProgress)])
            .await
            .unwrap();
        store
            .save_generated(&[record("1", Status::Expired)])
            .await
            .unwrap();

        let query = GeneratedQuery {
            resource_type: ResourceType::Boundary,
            tenant_id: "mz".into(),
            hierarchy_type: "ADMIN".into(),
            status: Some(Status::Expired),
            id: None,
        };
        let found = store.search_generated(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "1");

        let all = store
            .search_generated(&GeneratedQuery {
                status: None,
                ..query
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }
}
