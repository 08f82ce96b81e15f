//! In-memory doubles of the surrounding services, and a harness wiring them
//! into a running factory.

use crate::cache::LookupCache;
use crate::clients::{
    ClientError, EventPublisher, FacilityDirectory, FileStore, Localization, MasterData, Message,
};
use crate::config::{BoundaryConfig, CacheConfig, LocalizationConfig, Topics};
use crate::localizer::Localizer;
use crate::records::{
    GeneratedQuery, GeneratedResource, InMemoryStore, ResourceDetails, ResourceStore, ResourceType,
};
use crate::services::Services;
use crate::workflow::{Factory, JobQueue};
use async_trait::async_trait;
use boundary::BoundaryNode;
use boundary::testutils::InMemoryRegistry;
use serde_json::{Value, json};
use sheets::readme::{ReadMeConfig, ReadMeDescription, ReadMeText};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

const URL_SCHEME: &str = "memory://";

#[derive(Default)]
pub struct InMemoryFileStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, id: &str, bytes: Vec<u8>) {
        lock(&self.files).insert(id.to_string(), bytes);
    }

    pub fn stored(&self, id: &str) -> Vec<u8> {
        lock(&self.files).get(id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn upload(
        &self,
        _tenant_id: &str,
        _file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ClientError> {
        let mut files = lock(&self.files);
        let id = format!("fs-{}", files.len() + 1);
        files.insert(id.clone(), bytes);
        Ok(id)
    }

    async fn resolve_url(
        &self,
        _tenant_id: &str,
        file_store_id: &str,
    ) -> Result<Option<String>, ClientError> {
        Ok(lock(&self.files)
            .contains_key(file_store_id)
            .then(|| format!("{URL_SCHEME}{file_store_id}")))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        url.strip_prefix(URL_SCHEME)
            .and_then(|id| lock(&self.files).get(id).cloned())
            .ok_or_else(|| ClientError::UnexpectedResponse {
                url: url.to_string(),
                reason: "no such file".into(),
            })
    }
}

/// Read-me configs for every generatable type and the facility and user
/// schemas.
pub struct InMemoryMasterData {
    readme: Mutex<Vec<ReadMeConfig>>,
    schemas: HashMap<String, Value>,
}

impl InMemoryMasterData {
    pub fn new() -> Self {
        let readme = [
            ResourceType::Boundary,
            ResourceType::BoundaryWithTarget,
            ResourceType::FacilityWithBoundary,
            ResourceType::UserWithBoundary,
        ]
        .iter()
        .map(|resource_type| ReadMeConfig {
            resource_type: resource_type.to_string(),
            texts: vec![ReadMeText {
                header: "HCM_README_INFO".into(),
                descriptions: vec![ReadMeDescription {
                    text: "HCM_README_FILL_ALL_COLUMNS".into(),
                    is_step_required: true,
                }],
            }],
        })
        .collect();

        let schemas = HashMap::from([
            (
                "HCM-ADMIN-CONSOLE.facility".to_string(),
                json!({ "required": [
                    "HCM_ADMIN_CONSOLE_FACILITY_NAME",
                    "HCM_ADMIN_CONSOLE_FACILITY_TYPE",
                    "HCM_ADMIN_CONSOLE_FACILITY_STATUS",
                    "HCM_ADMIN_CONSOLE_FACILITY_CAPACITY"
                ]}),
            ),
            (
                "HCM-ADMIN-CONSOLE.user".to_string(),
                json!({ "required": [
                    "HCM_ADMIN_CONSOLE_USER_NAME",
                    "HCM_ADMIN_CONSOLE_USER_PHONE_NUMBER",
                    "HCM_ADMIN_CONSOLE_USER_ROLE"
                ]}),
            ),
        ]);

        InMemoryMasterData {
            readme: Mutex::new(readme),
            schemas,
        }
    }

    pub fn clear_readme(&self) {
        lock(&self.readme).clear();
    }
}

impl Default for InMemoryMasterData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MasterData for InMemoryMasterData {
    async fn schema(&self, _tenant_id: &str, code: &str) -> Result<Option<Value>, ClientError> {
        Ok(self.schemas.get(code).cloned())
    }

    async fn readme_configs(
        &self,
        _tenant_id: &str,
        _module: &str,
    ) -> Result<Vec<ReadMeConfig>, ClientError> {
        Ok(lock(&self.readme).clone())
    }
}

/// Messages per locale, searchable after an upsert.
#[derive(Default)]
pub struct InMemoryLocalization {
    messages: Mutex<Vec<Message>>,
    upserted: Mutex<Vec<Message>>,
    search_calls: Mutex<usize>,
}

impl InMemoryLocalization {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, module: &str, code: &str, message: &str) {
        self.add_in(&LocalizationConfig::default().default_locale, module, code, message);
    }

    pub fn add_in(&self, locale: &str, module: &str, code: &str, message: &str) {
        lock(&self.messages).push(Message {
            code: code.to_string(),
            message: message.to_string(),
            module: module.to_string(),
            locale: locale.to_string(),
        });
    }

    pub fn search_calls(&self) -> usize {
        *lock(&self.search_calls)
    }

    pub fn upserted(&self) -> Vec<Message> {
        lock(&self.upserted).clone()
    }
}

#[async_trait]
impl Localization for InMemoryLocalization {
    async fn messages(
        &self,
        _tenant_id: &str,
        module: &str,
        locale: &str,
    ) -> Result<Vec<Message>, ClientError> {
        *lock(&self.search_calls) += 1;
        Ok(lock(&self.messages)
            .iter()
            .filter(|m| m.module == module && m.locale == locale)
            .cloned()
            .collect())
    }

    async fn upsert(&self, _tenant_id: &str, messages: &[Message]) -> Result<(), ClientError> {
        let mut stored = lock(&self.messages);
        for message in messages {
            stored.retain(|m| {
                (&m.code, &m.module, &m.locale)
                    != (&message.code, &message.module, &message.locale)
            });
            stored.push(message.clone());
        }
        lock(&self.upserted).extend_from_slice(messages);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryFacilities {
    facilities: Mutex<Vec<Value>>,
}

impl InMemoryFacilities {
    pub fn add(&self, facility: Value) {
        lock(&self.facilities).push(facility);
    }
}

#[async_trait]
impl FacilityDirectory for InMemoryFacilities {
    async fn facilities(&self, _tenant_id: &str) -> Result<Vec<Value>, ClientError> {
        Ok(lock(&self.facilities).clone())
    }
}

/// Keeps every published event in order.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingPublisher {
    pub fn topics(&self) -> Vec<String> {
        lock(&self.events).iter().map(|(topic, _)| topic.clone()).collect()
    }

    pub fn payloads(&self, topic: &str) -> Vec<Value> {
        lock(&self.events)
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn last(&self, topic: &str) -> Option<Value> {
        self.payloads(topic).pop()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: &Value) -> Result<(), ClientError> {
        lock(&self.events).push((topic.to_string(), payload.clone()));
        Ok(())
    }
}

/// MZ with two provinces and three districts.
pub fn sample_tree() -> Vec<BoundaryNode> {
    vec![BoundaryNode::new("MZ", "Country").with_children(vec![
        BoundaryNode::new("MZ_01_N", "Province").with_children(vec![
            BoundaryNode::new("MZ_01_LAKE", "District"),
            BoundaryNode::new("MZ_02_HILL", "District"),
        ]),
        BoundaryNode::new("MZ_02_S", "Province")
            .with_children(vec![BoundaryNode::new("MZ_01_REED", "District")]),
    ])]
}

const BOUNDARY_NAMES: [(&str, &str); 6] = [
    ("MZ", "Mozambique"),
    ("MZ_01_N", "North"),
    ("MZ_02_S", "South"),
    ("MZ_01_LAKE", "Lake"),
    ("MZ_02_HILL", "Hill"),
    ("MZ_01_REED", "Reed"),
];

/// A factory over in-memory services with its worker running.
pub struct TestHarness {
    pub factory: Factory,
    pub registry: Arc<InMemoryRegistry>,
    pub files: Arc<InMemoryFileStore>,
    pub master_data: Arc<InMemoryMasterData>,
    pub facilities: Arc<InMemoryFacilities>,
    pub localization: Arc<InMemoryLocalization>,
    pub events: Arc<RecordingPublisher>,
    pub store: Arc<InMemoryStore>,
    services: Arc<Services>,
    worker: JoinHandle<()>,
}

impl TestHarness {
    pub fn new() -> Self {
        let registry = Arc::new(InMemoryRegistry::new().with_hierarchy(&[
            ("Country", None),
            ("Province", Some("Country")),
            ("District", Some("Province")),
        ]));
        let files = Arc::new(InMemoryFileStore::new());
        let master_data = Arc::new(InMemoryMasterData::new());
        let facilities = Arc::new(InMemoryFacilities::default());
        let events = Arc::new(RecordingPublisher::default());
        let store = Arc::new(InMemoryStore::new());

        let localization_config = LocalizationConfig::default();
        let localization = Arc::new(InMemoryLocalization::new());
        let boundary_module = localization_config.boundary_module("ADMIN");
        for (code, name) in BOUNDARY_NAMES {
            localization.add(&boundary_module, code, name);
        }

        let services = Arc::new(Services {
            registry: registry.clone(),
            file_store: files.clone(),
            master_data: master_data.clone(),
            facilities: facilities.clone(),
            localizer: Localizer::new(
                localization.clone(),
                LookupCache::new(&CacheConfig::default()),
                localization_config.clone(),
            ),
            events: events.clone(),
            store: store.clone(),
            boundary: BoundaryConfig {
                split_boundary_type: "District".into(),
                parent_poll_interval_ms: 1,
                ..BoundaryConfig::default()
            },
            localization: localization_config,
            topics: Topics::default(),
        });
        let (factory, worker) = start(services.clone());

        TestHarness {
            factory,
            registry,
            files,
            master_data,
            facilities,
            localization,
            events,
            store,
            services,
            worker,
        }
    }

    /// Waits for every queued job, then restarts the worker.
    pub async fn drain(self) -> Self {
        let TestHarness {
            factory,
            worker,
            services,
            ..
        } = self;
        drop(factory);
        worker.await.unwrap();

        let (factory, worker) = start(services.clone());
        TestHarness {
            factory,
            worker,
            services,
            ..self
        }
    }

    /// Generated records of every type under the ADMIN hierarchy.
    pub async fn generated(&self, tenant_id: &str) -> Vec<GeneratedResource> {
        let mut records = Vec::new();
        for resource_type in [
            ResourceType::Boundary,
            ResourceType::BoundaryWithTarget,
            ResourceType::FacilityWithBoundary,
            ResourceType::UserWithBoundary,
        ] {
            let query = GeneratedQuery {
                resource_type,
                tenant_id: tenant_id.to_string(),
                hierarchy_type: "ADMIN".into(),
                status: None,
                id: None,
            };
            records.extend(self.store.search_generated(&query).await.unwrap());
        }
        records
    }

    pub async fn details(&self, id: &str) -> ResourceDetails {
        self.store.find_details(id).await.unwrap().unwrap()
    }
}

fn start(services: Arc<Services>) -> (Factory, JoinHandle<()>) {
    let (queue, worker) = JobQueue::new(8);
    let handle = tokio::spawn(worker.run(services.clone()));
    (Factory::new(services, queue), handle)
}
