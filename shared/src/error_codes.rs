//! Static table of the error codes returned to API callers.
//!
//! Each domain error resolves to one `(module, code)` entry which carries the
//! user-facing message and the HTTP status of the response.

use http::StatusCode;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode {
    pub module: &'static str,
    pub code: &'static str,
    pub message: &'static str,
    pub status: StatusCode,
}

const fn entry(
    module: &'static str,
    code: &'static str,
    message: &'static str,
    status: StatusCode,
) -> ErrorCode {
    ErrorCode {
        module,
        code,
        message,
        status,
    }
}

pub const UNKNOWN_ERROR: ErrorCode = entry(
    "COMMON",
    "UNKNOWN_ERROR",
    "Unknown error. Check logs",
    StatusCode::INTERNAL_SERVER_ERROR,
);

static TABLE: &[ErrorCode] = &[
    entry(
        "FILE",
        "INVALID_SHEETNAME",
        "Invalid sheet name",
        StatusCode::BAD_REQUEST,
    ),
    entry(
        "FILE",
        "INVALID_COLUMNS",
        "Columns are not in the expected order or are missing",
        StatusCode::BAD_REQUEST,
    ),
    entry(
        "FILE",
        "DOWNLOAD_URL_NOT_FOUND",
        "Not any download URL returned for given fileStoreId",
        StatusCode::INTERNAL_SERVER_ERROR,
    ),
    entry(
        "FILE",
        "INVALID_FILE",
        "Uploaded file is not a valid workbook",
        StatusCode::BAD_REQUEST,
    ),
    entry(
        "BOUNDARY",
        "INTERNAL_SERVER_ERROR",
        "Some internal error occurred while creating boundaries",
        StatusCode::INTERNAL_SERVER_ERROR,
    ),
    entry(
        "BOUNDARY",
        "BOUNDARY_RELATIONSHIP_CREATE_ERROR",
        "Some error occurred while creating boundary relationship",
        StatusCode::INTERNAL_SERVER_ERROR,
    ),
    entry(
        "BOUNDARY",
        "BOUNDARY_ENTITY_CREATE_ERROR",
        "Some error occurred while creating boundary entities",
        StatusCode::INTERNAL_SERVER_ERROR,
    ),
    entry(
        "COMMON",
        "VALIDATION_ERROR",
        "Validation failed",
        StatusCode::BAD_REQUEST,
    ),
    entry(
        "COMMON",
        "INTERNAL_SERVER_ERROR",
        "Internal server error",
        StatusCode::INTERNAL_SERVER_ERROR,
    ),
    UNKNOWN_ERROR,
    entry(
        "COMMON",
        "IDGEN_ERROR",
        "Error during generating campaign number",
        StatusCode::INTERNAL_SERVER_ERROR,
    ),
    entry(
        "MDMS",
        "INVALID_README_CONFIG",
        "Invalid readme config",
        StatusCode::INTERNAL_SERVER_ERROR,
    ),
    entry(
        "MDMS",
        "SCHEMA_NOT_FOUND",
        "Schema not found for the requested type",
        StatusCode::INTERNAL_SERVER_ERROR,
    ),
    entry(
        "GENERATE",
        "RESOURCE_NOT_FOUND",
        "No generated resource found",
        StatusCode::NOT_FOUND,
    ),
];

/// Resolves a `(module, code)` pair. Unknown pairs collapse to
/// `COMMON/UNKNOWN_ERROR`.
pub fn lookup(module: &str, code: &str) -> ErrorCode {
    TABLE
        .iter()
        .find(|e| e.module == module && e.code == code)
        .copied()
        .unwrap_or(UNKNOWN_ERROR)
}

/// One element of the `Errors` array of an error response.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub description: String,
    pub params: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorPayload {
    #[serde(rename = "ResponseInfo")]
    pub response_info: Option<serde_json::Value>,
    #[serde(rename = "Errors")]
    pub errors: Vec<ErrorDetail>,
}

impl ErrorCode {
    pub fn payload(&self, description: impl Into<String>) -> ErrorPayload {
        ErrorPayload {
            response_info: None,
            errors: vec![ErrorDetail {
                code: self.code.to_string(),
                message: self.message.to_string(),
                description: description.into(),
                params: Vec::new(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known() {
        let e = lookup("FILE", "INVALID_COLUMNS");
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            lookup("GENERATE", "RESOURCE_NOT_FOUND").status,
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_lookup_unknown_collapses() {
        assert_eq!(lookup("FILE", "NOPE"), UNKNOWN_ERROR);
        // Same code under a different module is a different entry.
        assert_eq!(
            lookup("BOUNDARY", "VALIDATION_ERROR").status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_payload_shape() {
        let payload = lookup("COMMON", "VALIDATION_ERROR").payload("Boundary already present");
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json["ResponseInfo"].is_null());
        assert_eq!(json["Errors"][0]["code"], "VALIDATION_ERROR");
        assert_eq!(json["Errors"][0]["description"], "Boundary already present");
        assert_eq!(json["Errors"][0]["params"], serde_json::json!([]));
    }

    #[test]
    fn test_codes_are_unique() {
        for (i, a) in TABLE.iter().enumerate() {
            for b in &TABLE[i + 1..] {
                assert!(!(a.module == b.module && a.code == b.code), "{}", a.code);
            }
        }
    }
}
