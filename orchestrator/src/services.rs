use crate::cache::LookupCache;
use crate::clients::{
    EventPublisher, FacilityDirectory, FileStore, HttpFacilityDirectory, HttpFileStore,
    HttpLocalization, HttpMasterData, HttpPublisher, LogPublisher, MasterData,
};
use crate::config::{BoundaryConfig, Config, EventSink, LocalizationConfig, Topics};
use crate::localizer::Localizer;
use crate::records::{InMemoryStore, ResourceStore};
use boundary::{BoundaryRegistry, HttpRegistry};
use std::sync::Arc;

/// Everything a workflow talks to, built once at bootstrap.
pub struct Services {
    pub registry: Arc<dyn BoundaryRegistry>,
    pub file_store: Arc<dyn FileStore>,
    pub master_data: Arc<dyn MasterData>,
    pub facilities: Arc<dyn FacilityDirectory>,
    pub localizer: Localizer,
    pub events: Arc<dyn EventPublisher>,
    pub store: Arc<dyn ResourceStore>,
    pub boundary: BoundaryConfig,
    pub localization: LocalizationConfig,
    pub topics: Topics,
}

impl Services {
    pub fn from_config(config: &Config) -> Self {
        let token = config.auth_token.clone();
        let paths = &config.paths;

        let events: Arc<dyn EventPublisher> = match &config.events.sink {
            EventSink::Log => Arc::new(LogPublisher),
            EventSink::Http { url } => Arc::new(HttpPublisher::new(url.clone())),
        };
        let localization = Arc::new(HttpLocalization::new(
            config.hosts.localization.clone(),
            paths.localization_search.clone(),
            paths.localization_upsert.clone(),
            token.clone(),
        ));

        Services {
            registry: Arc::new(HttpRegistry::new(
                config.hosts.boundary.clone(),
                paths.registry.clone(),
                token.clone(),
            )),
            file_store: Arc::new(HttpFileStore::new(
                config.hosts.filestore.clone(),
                paths.filestore_upload.clone(),
                paths.filestore_url.clone(),
            )),
            master_data: Arc::new(HttpMasterData::new(
                config.hosts.mdms.clone(),
                paths.mdms_search.clone(),
                paths.mdms_schema_search.clone(),
                token.clone(),
            )),
            facilities: Arc::new(HttpFacilityDirectory::new(
                config.hosts.facility.clone(),
                paths.facility_search.clone(),
                token,
            )),
            localizer: Localizer::new(
                localization,
                LookupCache::new(&config.cache),
                config.localization.clone(),
            ),
            events,
            store: Arc::new(InMemoryStore::new()),
            boundary: config.boundary.clone(),
            localization: config.localization.clone(),
            topics: config.events.topics.clone(),
        }
    }
}
