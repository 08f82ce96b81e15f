use boundary::{ReconcileConfig, RegistryPaths};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("{0} must be greater than 0")]
    ZeroValue(&'static str),

    #[error("Empty value for {0}")]
    Empty(&'static str),

    #[error("Duplicate topic name: {0}")]
    DuplicateTopic(String),
}

/// Project factory configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for the data API
    pub listener: Listener,
    /// Listener for health and readiness probes
    pub admin_listener: Listener,
    /// Sent as `RequestInfo.authToken` on every outbound call
    #[serde(default)]
    pub auth_token: Option<String>,
    pub hosts: Hosts,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub boundary: BoundaryConfig,
    #[serde(default)]
    pub localization: LocalizationConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.boundary.validate()?;
        self.localization.validate()?;
        self.events.topics.validate()?;

        if self.cache.capacity == 0 {
            return Err(ValidationError::ZeroValue("cache.capacity"));
        }
        if self.worker.queue_depth == 0 {
            return Err(ValidationError::ZeroValue("worker.queue_depth"));
        }
        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Base URLs of the services the factory talks to. Invalid URLs are
/// rejected during deserialization.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Hosts {
    pub boundary: Url,
    pub filestore: Url,
    pub mdms: Url,
    pub facility: Url,
    pub localization: Url,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Paths {
    #[serde(flatten)]
    pub registry: RegistryPaths,
    pub filestore_upload: String,
    pub filestore_url: String,
    pub mdms_search: String,
    pub mdms_schema_search: String,
    pub facility_search: String,
    pub localization_search: String,
    pub localization_upsert: String,
}

impl Default for Paths {
    fn default() -> Self {
        Paths {
            registry: RegistryPaths::default(),
            filestore_upload: "filestore/v1/files".into(),
            filestore_url: "filestore/v1/files/url".into(),
            mdms_search: "egov-mdms-service/v1/_search".into(),
            mdms_schema_search: "mdms-v2/schema/v1/_search".into(),
            facility_search: "facility/v1/_search".into(),
            localization_search: "localization/messages/v1/_search".into(),
            localization_upsert: "localization/messages/v1/_upsert".into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Header of the column holding boundary codes
    pub code_column: String,
    pub boundary_tab: String,
    pub facility_tab: String,
    pub user_tab: String,
    /// Header of the facility code column in the facility tab
    pub facility_code_column: String,
    /// Level whose values get a tab each in target templates
    pub split_boundary_type: String,
    pub split_threshold: usize,
    pub search_chunk_size: usize,
    pub create_chunk_size: usize,
    pub parent_poll_retries: u32,
    pub parent_poll_interval_ms: u64,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        BoundaryConfig {
            code_column: "HCM_ADMIN_CONSOLE_BOUNDARY_CODE".into(),
            boundary_tab: "HCM_ADMIN_CONSOLE_BOUNDARY_DATA".into(),
            facility_tab: "HCM_ADMIN_CONSOLE_FACILITIES".into(),
            user_tab: "HCM_ADMIN_CONSOLE_USER_LIST".into(),
            facility_code_column: "HCM_ADMIN_CONSOLE_FACILITY_CODE".into(),
            split_boundary_type: "Distrito".into(),
            split_threshold: 2,
            search_chunk_size: 20,
            create_chunk_size: 200,
            parent_poll_retries: 6,
            parent_poll_interval_ms: 1000,
        }
    }
}

impl BoundaryConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.code_column.is_empty() {
            return Err(ValidationError::Empty("boundary.code_column"));
        }
        if self.boundary_tab.is_empty() {
            return Err(ValidationError::Empty("boundary.boundary_tab"));
        }
        if self.split_threshold == 0 {
            return Err(ValidationError::ZeroValue("boundary.split_threshold"));
        }
        if self.search_chunk_size == 0 {
            return Err(ValidationError::ZeroValue("boundary.search_chunk_size"));
        }
        if self.create_chunk_size == 0 {
            return Err(ValidationError::ZeroValue("boundary.create_chunk_size"));
        }
        Ok(())
    }

    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            search_chunk_size: self.search_chunk_size,
            create_chunk_size: self.create_chunk_size,
            parent_poll_retries: self.parent_poll_retries,
            parent_poll_interval: Duration::from_millis(self.parent_poll_interval_ms),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocalizationConfig {
    pub default_locale: String,
    /// Module holding template header and tab messages
    pub schema_module: String,
    /// Boundary names live in `<prefix>-<hierarchy type>`
    pub boundary_module_prefix: String,
    /// Master data module of read-me configs and schemas
    pub mdms_module: String,
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        LocalizationConfig {
            default_locale: "en_MZ".into(),
            schema_module: "rainmaker-hcm-admin-schemas".into(),
            boundary_module_prefix: "rainmaker-boundary".into(),
            mdms_module: "HCM-ADMIN-CONSOLE".into(),
        }
    }
}

impl LocalizationConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.default_locale.is_empty() {
            return Err(ValidationError::Empty("localization.default_locale"));
        }
        Ok(())
    }

    pub fn boundary_module(&self, hierarchy_type: &str) -> String {
        format!(
            "{}-{}",
            self.boundary_module_prefix,
            hierarchy_type.to_lowercase()
        )
    }
}

/// Where lifecycle events go
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventSink {
    /// Events are only logged
    #[default]
    Log,
    /// Events are POSTed as `{topic, payload}`
    Http { url: Url },
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventsConfig {
    pub sink: EventSink,
    pub topics: Topics,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Topics {
    pub create_generated_resource: String,
    pub update_generated_resource: String,
    pub create_resource_details: String,
    pub update_resource_details: String,
    pub create_resource_activity: String,
}

impl Default for Topics {
    fn default() -> Self {
        Topics {
            create_generated_resource: "create-generated-resource-details".into(),
            update_generated_resource: "update-generated-resource-details".into(),
            create_resource_details: "create-resource-details".into(),
            update_resource_details: "update-resource-details".into(),
            create_resource_activity: "create-resource-activity".into(),
        }
    }
}

impl Topics {
    fn validate(&self) -> Result<(), ValidationError> {
        let all = [
            &self.create_generated_resource,
            &self.update_generated_resource,
            &self.create_resource_details,
            &self.update_resource_details,
            &self.create_resource_activity,
        ];
        let mut seen = std::collections::HashSet::new();
        for topic in all {
            if topic.is_empty() {
                return Err(ValidationError::Empty("events.topics"));
            }
            if !seen.insert(topic) {
                return Err(ValidationError::DuplicateTopic(topic.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: u64,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            capacity: 1000,
            ttl_secs: 1800,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Jobs that may wait for the background worker
    pub queue_depth: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig { queue_depth: 64 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
listener:
    host: "0.0.0.0"
    port: 8080
admin_listener:
    host: "127.0.0.1"
    port: 8081
hosts:
    boundary: "http://boundary.internal:8080/"
    filestore: "http://filestore.internal:8080/"
    mdms: "http://mdms.internal:8080/"
    facility: "http://facility.internal:8080/"
    localization: "http://localization.internal:8080/"
"#;

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.boundary.search_chunk_size, 20);
        assert_eq!(config.boundary.create_chunk_size, 200);
        assert_eq!(config.boundary.split_boundary_type, "Distrito");
        assert_eq!(config.events.sink, EventSink::Log);
        assert_eq!(config.cache.ttl_secs, 1800);
        assert_eq!(
            config.paths.registry.relationship_create,
            "boundary-service/boundary-relationships/_create"
        );
        assert_eq!(
            config.localization.boundary_module("ADMIN"),
            "rainmaker-boundary-admin"
        );

        let reconcile = config.boundary.reconcile_config();
        assert_eq!(reconcile.parent_poll_retries, 6);
        assert_eq!(reconcile.parent_poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_parse_overrides() {
        let yaml = format!(
            r#"{MINIMAL}
auth_token: secret
paths:
    boundary_search: "custom/boundary/_search"
    filestore_upload: "files/upload"
boundary:
    split_threshold: 50
    parent_poll_interval_ms: 10
events:
    sink:
        type: http
        url: "http://events.internal/publish"
    topics:
        create_resource_activity: "activity"
cache:
    capacity: 10
"#
        );
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.paths.registry.boundary_search, "custom/boundary/_search");
        assert_eq!(
            config.paths.registry.boundary_create,
            "boundary-service/boundary/_create"
        );
        assert_eq!(config.paths.filestore_upload, "files/upload");
        assert_eq!(config.boundary.split_threshold, 50);
        assert_eq!(config.boundary.code_column, "HCM_ADMIN_CONSOLE_BOUNDARY_CODE");
        assert!(matches!(config.events.sink, EventSink::Http { .. }));
        assert_eq!(config.events.topics.create_resource_activity, "activity");
        assert_eq!(
            config.events.topics.create_resource_details,
            "create-resource-details"
        );
        assert_eq!(config.cache.capacity, 10);
        assert_eq!(config.cache.ttl_secs, 1800);
    }

    #[test]
    fn test_invalid_values() {
        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.admin_listener.port = 0;
        assert!(matches!(config.validate(), Err(ValidationError::InvalidPort)));

        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.boundary.create_chunk_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::ZeroValue("boundary.create_chunk_size"))
        ));

        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.boundary.split_threshold = 0;
        assert!(config.validate().is_err());

        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.events.topics.update_resource_details = "create-resource-details".into();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::DuplicateTopic(_))
        ));
    }

    #[test]
    fn test_invalid_host_rejected() {
        let yaml = MINIMAL.replace("http://mdms.internal:8080/", "not a url");
        assert!(serde_yaml::from_str::<Config>(&yaml).is_err());
    }
}
