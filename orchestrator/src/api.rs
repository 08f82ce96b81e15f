use crate::config::Listener;
use crate::errors::{FactoryError, Result};
use crate::records::{GeneratedResource, ResourceDetails, ResourceType};
use crate::workflow::{DownloadQuery, Factory, Filters, GenerateRequest};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

const API_ID: &str = "project-factory";

pub fn router(factory: Factory) -> Router {
    Router::new()
        .route("/project-factory/v1/data/_generate", post(generate))
        .route("/project-factory/v1/data/_download", post(download))
        .route("/project-factory/v1/data/_create", post(create))
        .with_state(factory)
}

pub async fn serve(listener: Listener, factory: Factory) -> Result<()> {
    let addr = format!("{}:{}", listener.host, listener.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = ?listener.local_addr()?, "data API listening");
    axum::serve(listener, router(factory)).await?;
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponseInfo {
    api_id: &'static str,
    ver: &'static str,
    ts: i64,
    status: &'static str,
}

impl ResponseInfo {
    fn successful() -> Self {
        ResponseInfo {
            api_id: API_ID,
            ver: "1.0",
            ts: chrono::Utc::now().timestamp_millis(),
            status: "successful",
        }
    }
}

#[derive(Serialize)]
struct GeneratedResponse {
    #[serde(rename = "ResponseInfo")]
    response_info: ResponseInfo,
    #[serde(rename = "GeneratedResource")]
    generated_resource: Vec<GeneratedResource>,
}

impl IntoResponse for GeneratedResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(Serialize)]
struct DetailsResponse {
    #[serde(rename = "ResponseInfo")]
    response_info: ResponseInfo,
    #[serde(rename = "ResourceDetails")]
    resource_details: ResourceDetails,
}

impl IntoResponse for DetailsResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct UserInfo {
    uuid: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct RequestInfo {
    msg_id: Option<String>,
    user_info: Option<UserInfo>,
}

impl RequestInfo {
    /// `msgId` carries the caller's locale after a `|`.
    fn locale(&self) -> Option<&str> {
        self.msg_id
            .as_deref()
            .and_then(|id| id.split('|').nth(1))
            .map(str::trim)
            .filter(|locale| !locale.is_empty())
    }

    fn user(&self) -> Option<String> {
        self.user_info.as_ref().and_then(|info| info.uuid.clone())
    }
}

#[derive(Deserialize, Debug, Default)]
struct GenerateBody {
    #[serde(rename = "RequestInfo", default)]
    request_info: Option<RequestInfo>,
    #[serde(rename = "Filters", default)]
    filters: Option<Filters>,
}

#[derive(Deserialize, Debug)]
struct CreateBody {
    #[serde(rename = "RequestInfo", default)]
    request_info: Option<RequestInfo>,
    #[serde(rename = "ResourceDetails")]
    resource_details: ResourceDetails,
}

/// Query parameters are all optional here so that missing ones are
/// reported as validation errors.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct DataParams {
    #[serde(rename = "type")]
    resource_type: Option<String>,
    tenant_id: Option<String>,
    hierarchy_type: Option<String>,
    force_update: Option<String>,
    id: Option<String>,
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| FactoryError::Validation(format!("{name} is required")))
}

impl DataParams {
    fn resource_type(&self) -> Result<ResourceType> {
        let raw = required(self.resource_type.clone(), "type")?;
        serde_json::from_value(serde_json::Value::String(raw.clone()))
            .map_err(|_| FactoryError::Validation(format!("unknown type {raw}")))
    }

    fn force_update(&self) -> Result<bool> {
        match self.force_update.as_deref() {
            None | Some("") | Some("false") => Ok(false),
            Some("true") => Ok(true),
            Some(other) => Err(FactoryError::Validation(format!(
                "forceUpdate must be true or false, got {other}"
            ))),
        }
    }
}

/// An empty or `null` body stands for the default.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice::<Option<T>>(body)
        .map(Option::unwrap_or_default)
        .map_err(|e| FactoryError::Validation(format!("invalid request body: {e}")))
}

async fn generate(
    State(factory): State<Factory>,
    Query(params): Query<DataParams>,
    body: Bytes,
) -> Result<GeneratedResponse> {
    let body: GenerateBody = parse_body(&body)?;
    let request_info = body.request_info.unwrap_or_default();
    let locale = request_info
        .locale()
        .unwrap_or_else(|| factory.services().localizer.default_locale())
        .to_string();

    let request = GenerateRequest {
        resource_type: params.resource_type()?,
        force_update: params.force_update()?,
        tenant_id: required(params.tenant_id, "tenantId")?,
        hierarchy_type: required(params.hierarchy_type, "hierarchyType")?,
        filters: body.filters,
        locale,
        user: request_info.user(),
    };
    let generated_resource = factory.generate(request).await?;
    Ok(GeneratedResponse {
        response_info: ResponseInfo::successful(),
        generated_resource,
    })
}

async fn download(
    State(factory): State<Factory>,
    Query(params): Query<DataParams>,
) -> Result<GeneratedResponse> {
    let query = DownloadQuery {
        resource_type: params.resource_type()?,
        tenant_id: required(params.tenant_id, "tenantId")?,
        hierarchy_type: required(params.hierarchy_type, "hierarchyType")?,
        id: params.id.filter(|id| !id.is_empty()),
    };
    let generated_resource = factory.download(query).await?;
    Ok(GeneratedResponse {
        response_info: ResponseInfo::successful(),
        generated_resource,
    })
}

async fn create(State(factory): State<Factory>, body: Bytes) -> Result<DetailsResponse> {
    let body: CreateBody = serde_json::from_slice(&body)
        .map_err(|e| FactoryError::Validation(format!("invalid request body: {e}")))?;
    let request_info = body.request_info.unwrap_or_default();
    let resource_details = factory
        .create_resource(
            body.resource_details,
            request_info.user(),
            request_info.locale().map(String::from),
        )
        .await?;
    Ok(DetailsResponse {
        response_info: ResponseInfo::successful(),
        resource_details,
    })
}
