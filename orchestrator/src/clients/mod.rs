//! HTTP clients of the services around the factory. Each capability is a
//! trait so workflows can run against in-memory doubles.

pub mod events;
pub mod facility;
pub mod file_store;
pub mod localization;
pub mod mdms;

pub use events::{EventPublisher, HttpPublisher, LogPublisher};
pub use facility::{FacilityDirectory, HttpFacilityDirectory};
pub use file_store::{FileStore, HttpFileStore};
pub use localization::{HttpLocalization, Localization, Message};
pub use mdms::{HttpMasterData, MasterData};

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("unexpected response from {url}: {reason}")]
    UnexpectedResponse { url: String, reason: String },
}

/// JSON-over-POST plumbing shared by the DIGIT service clients.
#[derive(Clone)]
pub(crate) struct ServiceClient {
    client: reqwest::Client,
    base_url: Url,
    request_info: Value,
}

impl ServiceClient {
    pub fn new(base_url: Url, auth_token: Option<String>) -> Self {
        ServiceClient {
            client: reqwest::Client::new(),
            base_url,
            request_info: json!({ "apiId": "project-factory", "authToken": auth_token }),
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ClientError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("{path}: {e}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// POSTs `body` with `RequestInfo` attached and returns the JSON answer.
    pub async fn post(
        &self,
        path: &str,
        query: &[(&str, String)],
        mut body: Value,
    ) -> Result<(Url, Value), ClientError> {
        let url = self.url(path, query)?;
        body["RequestInfo"] = self.request_info.clone();
        let response = self.client.post(url.clone()).json(&body).send().await?;
        let json = check(&url, response).await?.json().await?;
        Ok((url, json))
    }
}

/// Fails with the response body when the status is not a success.
pub(crate) async fn check(
    url: &Url,
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!(%url, status = status.as_u16(), "service request failed");
    Err(ClientError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn parse<T: DeserializeOwned>(url: &Url, json: Value) -> Result<T, ClientError> {
    serde_json::from_value(json).map_err(|e| ClientError::UnexpectedResponse {
        url: url.to_string(),
        reason: e.to_string(),
    })
}
