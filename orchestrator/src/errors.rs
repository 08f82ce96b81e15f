use crate::clients::ClientError;
use crate::config::ValidationError;
use crate::records::StoreError;
use axum::Json;
use axum::response::{IntoResponse, Response};
use boundary::{HierarchyError, ReconcileError, RegistryError};
use serde_json::{Value, json};
use shared::error_codes::{self, ErrorCode};
use sheets::SheetError;

#[derive(thiserror::Error, Debug)]
pub enum FactoryError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("no download URL for file {0}")]
    DownloadUrlNotFound(String),
    #[error("no read-me configuration for type {0}")]
    ReadMeConfig(String),
    #[error("schema {0} not found")]
    SchemaNotFound(String),
    #[error("background worker is not accepting jobs")]
    WorkerUnavailable,
    #[error(transparent)]
    Sheet(#[from] SheetError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = FactoryError> = std::result::Result<T, E>;

impl FactoryError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            FactoryError::Validation(_) => error_codes::lookup("COMMON", "VALIDATION_ERROR"),
            FactoryError::NotFound(_) => error_codes::lookup("GENERATE", "RESOURCE_NOT_FOUND"),
            FactoryError::DownloadUrlNotFound(_) => {
                error_codes::lookup("FILE", "DOWNLOAD_URL_NOT_FOUND")
            }
            FactoryError::ReadMeConfig(_) => error_codes::lookup("MDMS", "INVALID_README_CONFIG"),
            FactoryError::SchemaNotFound(_) => error_codes::lookup("MDMS", "SCHEMA_NOT_FOUND"),
            FactoryError::Sheet(e) => e.error_code(),
            FactoryError::Reconcile(e) => e.error_code(),
            FactoryError::WorkerUnavailable
            | FactoryError::Registry(_)
            | FactoryError::Hierarchy(_)
            | FactoryError::Client(_)
            | FactoryError::Store(_)
            | FactoryError::InvalidConfig(_)
            | FactoryError::Io(_) => error_codes::lookup("COMMON", "INTERNAL_SERVER_ERROR"),
        }
    }

    /// Shape stored in `additionalDetails.error` of a failed record.
    pub fn to_details(&self) -> Value {
        let code = self.error_code();
        json!({
            "code": code.code,
            "message": code.message,
            "description": self.to_string(),
        })
    }
}

impl IntoResponse for FactoryError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        if code.status.is_server_error() {
            tracing::error!(error = %self, code = code.code, "request failed");
        }
        (code.status, Json(code.payload(self.to_string()))).into_response()
    }
}
