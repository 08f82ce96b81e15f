use super::{ClientError, ServiceClient, parse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub code: String,
    pub message: String,
    pub module: String,
    pub locale: String,
}

#[async_trait]
pub trait Localization: Send + Sync {
    async fn messages(
        &self,
        tenant_id: &str,
        module: &str,
        locale: &str,
    ) -> Result<Vec<Message>, ClientError>;

    async fn upsert(&self, tenant_id: &str, messages: &[Message]) -> Result<(), ClientError>;
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    messages: Vec<Message>,
}

pub struct HttpLocalization {
    service: ServiceClient,
    search_path: String,
    upsert_path: String,
}

impl HttpLocalization {
    pub fn new(
        base_url: Url,
        search_path: String,
        upsert_path: String,
        auth_token: Option<String>,
    ) -> Self {
        HttpLocalization {
            service: ServiceClient::new(base_url, auth_token),
            search_path,
            upsert_path,
        }
    }
}

#[async_trait]
impl Localization for HttpLocalization {
    async fn messages(
        &self,
        tenant_id: &str,
        module: &str,
        locale: &str,
    ) -> Result<Vec<Message>, ClientError> {
        let query = [
            ("tenantId", tenant_id.to_string()),
            ("module", module.to_string()),
            ("locale", locale.to_string()),
        ];
        let (url, json) = self.service.post(&self.search_path, &query, json!({})).await?;
        let parsed: SearchResponse = parse(&url, json)?;
        Ok(parsed.messages)
    }

    async fn upsert(&self, tenant_id: &str, messages: &[Message]) -> Result<(), ClientError> {
        if messages.is_empty() {
            return Ok(());
        }
        let body = json!({ "tenantId": tenant_id, "messages": messages });
        self.service.post(&self.upsert_path, &[], body).await?;
        tracing::info!(count = messages.len(), "localization messages upserted");
        Ok(())
    }
}
