use super::{ClientError, ServiceClient, parse};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use sheets::readme::ReadMeConfig;
use url::Url;

const README_MASTER: &str = "ReadMeConfig";

/// Schema and configuration master data.
#[async_trait]
pub trait MasterData: Send + Sync {
    /// JSON schema registered under `code`, e.g. `HCM-ADMIN-CONSOLE.facility`.
    async fn schema(&self, tenant_id: &str, code: &str) -> Result<Option<Value>, ClientError>;

    async fn readme_configs(
        &self,
        tenant_id: &str,
        module: &str,
    ) -> Result<Vec<ReadMeConfig>, ClientError>;
}

/// Header codes a schema requires, in declaration order.
pub fn required_columns(schema: &Value) -> Vec<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Deserialize)]
struct SchemaDefinition {
    code: String,
    #[serde(default)]
    definition: Value,
}

#[derive(Deserialize)]
struct SchemaResponse {
    #[serde(rename = "SchemaDefinitions", default)]
    schema_definitions: Vec<SchemaDefinition>,
}

pub struct HttpMasterData {
    service: ServiceClient,
    search_path: String,
    schema_path: String,
}

impl HttpMasterData {
    pub fn new(
        base_url: Url,
        search_path: String,
        schema_path: String,
        auth_token: Option<String>,
    ) -> Self {
        HttpMasterData {
            service: ServiceClient::new(base_url, auth_token),
            search_path,
            schema_path,
        }
    }
}

#[async_trait]
impl MasterData for HttpMasterData {
    async fn schema(&self, tenant_id: &str, code: &str) -> Result<Option<Value>, ClientError> {
        let body = json!({
            "SchemaDefCriteria": { "tenantId": tenant_id, "codes": [code] }
        });
        let (url, json) = self.service.post(&self.schema_path, &[], body).await?;
        let parsed: SchemaResponse = parse(&url, json)?;
        Ok(parsed
            .schema_definitions
            .into_iter()
            .find(|def| def.code == code)
            .map(|def| def.definition))
    }

    async fn readme_configs(
        &self,
        tenant_id: &str,
        module: &str,
    ) -> Result<Vec<ReadMeConfig>, ClientError> {
        let body = json!({
            "MdmsCriteria": {
                "tenantId": tenant_id,
                "moduleDetails": [{
                    "moduleName": module,
                    "masterDetails": [{ "name": README_MASTER }]
                }]
            }
        });
        let (url, json) = self.service.post(&self.search_path, &[], body).await?;
        let configs = json
            .pointer(&format!("/MdmsRes/{module}/{README_MASTER}"))
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        parse(&url, configs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};

    #[test]
    fn test_required_columns() {
        let schema = json!({ "required": ["HCM_FACILITY_NAME", "HCM_FACILITY_TYPE", 3] });
        assert_eq!(
            required_columns(&schema),
            vec!["HCM_FACILITY_NAME", "HCM_FACILITY_TYPE"]
        );
        assert!(required_columns(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn test_http_master_data() {
        let app = Router::new()
            .route(
                "/schema",
                post(|Json(body): Json<Value>| async move {
                    assert!(body["RequestInfo"].is_object());
                    Json(json!({ "SchemaDefinitions": [{
                        "code": "HCM-ADMIN-CONSOLE.facility",
                        "definition": { "required": ["NAME"] }
                    }]}))
                }),
            )
            .route(
                "/search",
                post(|| async {
                    Json(json!({ "MdmsRes": { "HCM-ADMIN-CONSOLE": { "ReadMeConfig": [
                        { "type": "boundary", "texts": [{ "header": "H", "descriptions": [] }] }
                    ]}}}))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let mdms = HttpMasterData::new(
            Url::parse(&format!("http://{addr}/")).unwrap(),
            "search".into(),
            "schema".into(),
            None,
        );
        let schema = mdms
            .schema("mz", "HCM-ADMIN-CONSOLE.facility")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(required_columns(&schema), vec!["NAME"]);
        assert!(mdms.schema("mz", "HCM-ADMIN-CONSOLE.user").await.unwrap().is_none());

        let configs = mdms.readme_configs("mz", "HCM-ADMIN-CONSOLE").await.unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].resource_type, "boundary");
    }
}
