use super::{ClientError, ServiceClient, parse};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

const PAGE_SIZE: usize = 50;

#[async_trait]
pub trait FacilityDirectory: Send + Sync {
    /// Every facility of the tenant.
    async fn facilities(&self, tenant_id: &str) -> Result<Vec<Value>, ClientError>;
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(rename = "Facilities", default)]
    facilities: Vec<Value>,
}

pub struct HttpFacilityDirectory {
    service: ServiceClient,
    search_path: String,
}

impl HttpFacilityDirectory {
    pub fn new(base_url: Url, search_path: String, auth_token: Option<String>) -> Self {
        HttpFacilityDirectory {
            service: ServiceClient::new(base_url, auth_token),
            search_path,
        }
    }
}

#[async_trait]
impl FacilityDirectory for HttpFacilityDirectory {
    async fn facilities(&self, tenant_id: &str) -> Result<Vec<Value>, ClientError> {
        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            let query = [
                ("tenantId", tenant_id.to_string()),
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ];
            let body = json!({ "Facility": { "isPermanent": true } });
            let (url, json) = self.service.post(&self.search_path, &query, body).await?;
            let page: SearchResponse = parse(&url, json)?;
            let fetched = page.facilities.len();
            all.extend(page.facilities);
            if fetched < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }
        tracing::debug!(tenant_id, count = all.len(), "facilities fetched");
        Ok(all)
    }
}
