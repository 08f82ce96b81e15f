pub mod admin_service;
pub mod error_codes;
pub mod http;
pub mod metrics_defs;
