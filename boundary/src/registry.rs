use crate::metrics_defs::REGISTRY_REQUEST_DURATION;
use crate::types::{BoundaryEntity, BoundaryNode, BoundaryRelationship, HierarchyLevel};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use shared::histogram;
use std::time::Instant;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid registry URL: {0}")]
    InvalidUrl(String),
    #[error("registry returned {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("unexpected registry response from {url}: {reason}")]
    UnexpectedResponse { url: String, reason: String },
}

/// Relationship tree query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RelationshipQuery {
    pub tenant_id: String,
    pub hierarchy_type: String,
    pub codes: Option<Vec<String>>,
    pub include_children: bool,
}

impl RelationshipQuery {
    pub fn full_tree(tenant_id: &str, hierarchy_type: &str) -> Self {
        RelationshipQuery {
            tenant_id: tenant_id.to_string(),
            hierarchy_type: hierarchy_type.to_string(),
            codes: None,
            include_children: true,
        }
    }

    pub fn code(tenant_id: &str, hierarchy_type: &str, code: &str) -> Self {
        RelationshipQuery {
            tenant_id: tenant_id.to_string(),
            hierarchy_type: hierarchy_type.to_string(),
            codes: Some(vec![code.to_string()]),
            include_children: false,
        }
    }
}

/// What the registry answered to a write, kept for the activity log.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteReceipt {
    pub url: String,
    pub status: u16,
    pub request: Value,
    pub response: Value,
}

/// The boundary system of record.
#[async_trait]
pub trait BoundaryRegistry: Send + Sync {
    async fn search_boundaries(
        &self,
        tenant_id: &str,
        codes: &[String],
    ) -> Result<Vec<BoundaryEntity>, RegistryError>;

    async fn create_boundaries(
        &self,
        tenant_id: &str,
        entities: &[BoundaryEntity],
    ) -> Result<WriteReceipt, RegistryError>;

    async fn search_relationships(
        &self,
        query: &RelationshipQuery,
    ) -> Result<Vec<BoundaryNode>, RegistryError>;

    async fn create_relationship(
        &self,
        relationship: &BoundaryRelationship,
    ) -> Result<WriteReceipt, RegistryError>;

    async fn search_hierarchy_definition(
        &self,
        tenant_id: &str,
        hierarchy_type: &str,
    ) -> Result<Vec<HierarchyLevel>, RegistryError>;
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegistryPaths {
    pub boundary_search: String,
    pub boundary_create: String,
    pub relationship_search: String,
    pub relationship_create: String,
    pub hierarchy_search: String,
}

impl Default for RegistryPaths {
    fn default() -> Self {
        RegistryPaths {
            boundary_search: "boundary-service/boundary/_search".into(),
            boundary_create: "boundary-service/boundary/_create".into(),
            relationship_search: "boundary-service/boundary-relationships/_search".into(),
            relationship_create: "boundary-service/boundary-relationships/_create".into(),
            hierarchy_search: "boundary-service/boundary-hierarchy-definition/_search".into(),
        }
    }
}

#[derive(Deserialize)]
struct BoundarySearchResponse {
    #[serde(rename = "Boundary", default)]
    boundary: Vec<BoundaryEntity>,
}

#[derive(Deserialize)]
struct TenantBoundary {
    #[serde(default)]
    boundary: Vec<BoundaryNode>,
}

#[derive(Deserialize)]
struct RelationshipSearchResponse {
    #[serde(rename = "TenantBoundary", default)]
    tenant_boundary: Vec<TenantBoundary>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HierarchyDefinition {
    #[serde(default)]
    boundary_hierarchy: Vec<HierarchyLevel>,
}

#[derive(Deserialize)]
struct HierarchySearchResponse {
    #[serde(rename = "BoundaryHierarchy", default)]
    boundary_hierarchy: Vec<HierarchyDefinition>,
}

/// Registry client speaking the boundary service's JSON API.
pub struct HttpRegistry {
    client: reqwest::Client,
    base_url: Url,
    paths: RegistryPaths,
    request_info: Value,
}

impl HttpRegistry {
    pub fn new(base_url: Url, paths: RegistryPaths, auth_token: Option<String>) -> Self {
        HttpRegistry {
            client: reqwest::Client::new(),
            base_url,
            paths,
            request_info: json!({ "apiId": "project-factory", "authToken": auth_token }),
        }
    }

    fn url(&self, path: &str) -> Result<Url, RegistryError> {
        self.base_url
            .join(path)
            .map_err(|e| RegistryError::InvalidUrl(format!("{path}: {e}")))
    }

    async fn post(
        &self,
        endpoint: &'static str,
        path: &str,
        query: &[(&str, String)],
        mut body: Value,
    ) -> Result<(WriteReceipt, Value), RegistryError> {
        let mut url = self.url(path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        body["RequestInfo"] = self.request_info.clone();

        let started = Instant::now();
        let result = self.client.post(url.clone()).json(&body).send().await;
        histogram!(REGISTRY_REQUEST_DURATION, "endpoint" => endpoint)
            .record(started.elapsed().as_secs_f64());

        let response = result?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(%url, status = status.as_u16(), "boundary registry request failed");
            return Err(RegistryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        let json: Value = response.json().await?;
        let receipt = WriteReceipt {
            url: url.to_string(),
            status: status.as_u16(),
            request: body,
            response: json.clone(),
        };
        Ok((receipt, json))
    }

    fn parse<T: for<'de> Deserialize<'de>>(url: &str, json: Value) -> Result<T, RegistryError> {
        serde_json::from_value(json).map_err(|e| RegistryError::UnexpectedResponse {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl BoundaryRegistry for HttpRegistry {
    async fn search_boundaries(
        &self,
        tenant_id: &str,
        codes: &[String],
    ) -> Result<Vec<BoundaryEntity>, RegistryError> {
        let query = [
            ("tenantId", tenant_id.to_string()),
            ("codes", codes.join(", ")),
        ];
        let (receipt, json) = self
            .post("boundary_search", &self.paths.boundary_search, &query, json!({}))
            .await?;
        let parsed: BoundarySearchResponse = Self::parse(&receipt.url, json)?;
        Ok(parsed.boundary)
    }

    async fn create_boundaries(
        &self,
        _tenant_id: &str,
        entities: &[BoundaryEntity],
    ) -> Result<WriteReceipt, RegistryError> {
        let body = json!({ "Boundary": entities });
        let (receipt, _) = self
            .post("boundary_create", &self.paths.boundary_create, &[], body)
            .await?;
        Ok(receipt)
    }

    async fn search_relationships(
        &self,
        query: &RelationshipQuery,
    ) -> Result<Vec<BoundaryNode>, RegistryError> {
        let mut params = vec![
            ("tenantId", query.tenant_id.clone()),
            ("hierarchyType", query.hierarchy_type.clone()),
            ("includeChildren", query.include_children.to_string()),
        ];
        if let Some(codes) = &query.codes {
            params.push(("codes", codes.join(",")));
        }
        let (receipt, json) = self
            .post(
                "relationship_search",
                &self.paths.relationship_search,
                &params,
                json!({}),
            )
            .await?;
        let parsed: RelationshipSearchResponse = Self::parse(&receipt.url, json)?;
        Ok(parsed
            .tenant_boundary
            .into_iter()
            .next()
            .map(|tenant| tenant.boundary)
            .unwrap_or_default())
    }

    async fn create_relationship(
        &self,
        relationship: &BoundaryRelationship,
    ) -> Result<WriteReceipt, RegistryError> {
        let body = json!({ "BoundaryRelationship": relationship });
        let (receipt, json) = self
            .post(
                "relationship_create",
                &self.paths.relationship_create,
                &[],
                body,
            )
            .await?;

        let created = json
            .get("TenantBoundary")
            .and_then(Value::as_array)
            .is_some_and(|arr| !arr.is_empty());
        if !created {
            return Err(RegistryError::UnexpectedResponse {
                url: receipt.url,
                reason: "no TenantBoundary in relationship create response".into(),
            });
        }
        Ok(receipt)
    }

    async fn search_hierarchy_definition(
        &self,
        tenant_id: &str,
        hierarchy_type: &str,
    ) -> Result<Vec<HierarchyLevel>, RegistryError> {
        let body = json!({
            "BoundaryTypeHierarchySearchCriteria": {
                "tenantId": tenant_id,
                "hierarchyType": hierarchy_type,
            }
        });
        let (receipt, json) = self
            .post("hierarchy_search", &self.paths.hierarchy_search, &[], body)
            .await?;
        let parsed: HierarchySearchResponse = Self::parse(&receipt.url, json)?;
        Ok(parsed
            .boundary_hierarchy
            .into_iter()
            .next()
            .map(|def| def.boundary_hierarchy)
            .unwrap_or_default())
    }
}
