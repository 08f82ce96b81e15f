use super::{ClientError, ServiceClient, check, parse};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use url::Url;

const UPLOAD_MODULE: &str = "HCM-ADMIN-CONSOLE-SERVER";
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Stores `bytes` and returns the file store id.
    async fn upload(
        &self,
        tenant_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ClientError>;

    /// Download URL of a stored file, `None` when the store does not know it.
    async fn resolve_url(
        &self,
        tenant_id: &str,
        file_store_id: &str,
    ) -> Result<Option<String>, ClientError>;

    async fn download(&self, url: &str) -> Result<Vec<u8>, ClientError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredFile {
    file_store_id: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default)]
    files: Vec<StoredFile>,
}

#[derive(Deserialize)]
struct FileUrl {
    id: String,
    url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UrlResponse {
    #[serde(default)]
    file_store_ids: Vec<FileUrl>,
}

pub struct HttpFileStore {
    service: ServiceClient,
    upload_path: String,
    url_path: String,
}

impl HttpFileStore {
    pub fn new(base_url: Url, upload_path: String, url_path: String) -> Self {
        HttpFileStore {
            service: ServiceClient::new(base_url, None),
            upload_path,
            url_path,
        }
    }
}

#[async_trait]
impl FileStore for HttpFileStore {
    async fn upload(
        &self,
        tenant_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ClientError> {
        let url = self.service.url(&self.upload_path, &[])?;
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(XLSX_MIME)?;
        let form = Form::new()
            .part("file", part)
            .text("tenantId", tenant_id.to_string())
            .text("module", UPLOAD_MODULE);

        let response = self
            .service
            .client()
            .post(url.clone())
            .multipart(form)
            .send()
            .await?;
        let json = check(&url, response).await?.json().await?;
        let parsed: UploadResponse = parse(&url, json)?;
        parsed
            .files
            .into_iter()
            .next()
            .map(|file| file.file_store_id)
            .ok_or_else(|| ClientError::UnexpectedResponse {
                url: url.to_string(),
                reason: "no file in upload response".into(),
            })
    }

    async fn resolve_url(
        &self,
        tenant_id: &str,
        file_store_id: &str,
    ) -> Result<Option<String>, ClientError> {
        let query = [
            ("tenantId", tenant_id.to_string()),
            ("fileStoreIds", file_store_id.to_string()),
        ];
        let url = self.service.url(&self.url_path, &query)?;
        let response = self.service.client().get(url.clone()).send().await?;
        let json = check(&url, response).await?.json().await?;
        let parsed: UrlResponse = parse(&url, json)?;
        Ok(parsed
            .file_store_ids
            .into_iter()
            .find(|file| file.id == file_store_id)
            .map(|file| file.url))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        let parsed = Url::parse(url).map_err(|e| ClientError::InvalidUrl(format!("{url}: {e}")))?;
        let response = self.service.client().get(parsed.clone()).send().await?;
        let bytes = check(&parsed, response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::collections::HashMap;

    async fn spawn_store() -> Url {
        let app = Router::new()
            .route(
                "/filestore/v1/files",
                post(|| async { Json(json!({ "files": [{ "fileStoreId": "fs-1" }] })) }),
            )
            .route(
                "/filestore/v1/files/url",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    let id = q.get("fileStoreIds").cloned().unwrap_or_default();
                    let files: Vec<Value> = if id == "fs-1" {
                        vec![json!({ "id": "fs-1", "url": "http://files/fs-1.xlsx" })]
                    } else {
                        vec![]
                    };
                    Json(json!({ "fileStoreIds": files }))
                }),
            )
            .route("/raw", get(|| async { "workbook-bytes" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    #[tokio::test]
    async fn test_upload_resolve_download() {
        let base = spawn_store().await;
        let store = HttpFileStore::new(
            base.clone(),
            "filestore/v1/files".into(),
            "filestore/v1/files/url".into(),
        );

        let id = store.upload("mz", "template.xlsx", b"xlsx".to_vec()).await.unwrap();
        assert_eq!(id, "fs-1");

        assert_eq!(
            store.resolve_url("mz", "fs-1").await.unwrap().as_deref(),
            Some("http://files/fs-1.xlsx")
        );
        assert_eq!(store.resolve_url("mz", "fs-2").await.unwrap(), None);

        let bytes = store.download(base.join("raw").unwrap().as_str()).await.unwrap();
        assert_eq!(bytes, b"workbook-bytes");
    }
}
