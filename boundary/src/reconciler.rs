//! Pushes the boundaries found in an uploaded sheet into the registry.
//!
//! A run assigns codes to every new boundary, creates the entities the
//! registry does not know yet and then links each unrelated boundary to its
//! parent, one at a time and parents first. The first failing write stops
//! the run; writes already made stay in the registry.

use crate::code_gen::{CountMap, ElementCodes, assign_codes, column_elements, seed_code};
use crate::hierarchy::{build_child_parent_map, extract_codes};
use crate::metrics_defs::{
    BOUNDARY_ENTITIES_CREATED, BOUNDARY_RELATIONSHIPS_CREATED, PARENT_CONFIRMATION_RETRIES,
};
use crate::registry::{BoundaryRegistry, RegistryError, RelationshipQuery};
use crate::types::{
    ActivityRecord, AuditDetails, BoundaryEntity, BoundaryRelationship, ElementKey, RunContext,
};
use shared::counter;
use shared::error_codes::{self, ErrorCode};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    #[error("Boundary already present in the system")]
    AlreadyPresent,
    #[error("Boundary creation failed, for the boundary with code {code}")]
    ParentNotFound { code: String },
    #[error("error creating boundary entities: {0}")]
    EntityCreate(#[source] RegistryError),
    #[error("error creating boundary relationship for {boundary_type} {code}: {source}")]
    RelationshipCreate {
        code: String,
        boundary_type: String,
        #[source]
        source: RegistryError,
    },
    #[error("boundary registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl ReconcileError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ReconcileError::AlreadyPresent => error_codes::lookup("COMMON", "VALIDATION_ERROR"),
            ReconcileError::ParentNotFound { .. } => {
                error_codes::lookup("BOUNDARY", "INTERNAL_SERVER_ERROR")
            }
            ReconcileError::EntityCreate(_) => {
                error_codes::lookup("BOUNDARY", "BOUNDARY_ENTITY_CREATE_ERROR")
            }
            ReconcileError::RelationshipCreate { .. } => {
                error_codes::lookup("BOUNDARY", "BOUNDARY_RELATIONSHIP_CREATE_ERROR")
            }
            ReconcileError::Registry(_) => error_codes::lookup("COMMON", "INTERNAL_SERVER_ERROR"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReconcileConfig {
    /// Codes per entity search request.
    pub search_chunk_size: usize,
    /// Entities per create request.
    pub create_chunk_size: usize,
    /// Extra polls after the first when a parent is not visible yet.
    pub parent_poll_retries: u32,
    pub parent_poll_interval: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            search_chunk_size: 20,
            create_chunk_size: 200,
            parent_poll_retries: 6,
            parent_poll_interval: Duration::from_secs(1),
        }
    }
}

/// An uploaded row: hierarchy cells from the root level down, and the
/// boundary code of its deepest cell when the sheet already carries one.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundaryRow {
    pub cells: Vec<ElementKey>,
    pub code: Option<String>,
}

impl AsRef<[ElementKey]> for BoundaryRow {
    fn as_ref(&self) -> &[ElementKey] {
        &self.cells
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlannedBoundary {
    pub element: ElementKey,
    pub code: String,
    pub parent_code: Option<String>,
    /// False when the code came from the sheet.
    pub generated: bool,
}

impl PlannedBoundary {
    pub fn boundary_type(&self) -> &str {
        &self.element.key
    }

    pub fn name(&self) -> &str {
        &self.element.value
    }
}

/// Assigns codes to every distinct boundary in `rows`, parents before
/// children. Boundaries sharing a code are planned once.
pub fn plan_codes(rows: &[BoundaryRow], hierarchy_type: &str) -> Vec<PlannedBoundary> {
    let child_parent = build_child_parent_map(rows);
    let columns = column_elements(rows);
    let mut codes = ElementCodes::new();
    let mut counts = CountMap::new();

    let mut seeds: Vec<(&ElementKey, &str)> = rows
        .iter()
        .filter_map(|row| {
            let code = row.code.as_deref().map(str::trim).filter(|c| !c.is_empty())?;
            Some((row.cells.last()?, code))
        })
        .collect();
    seeds.sort_by_key(|(element, _)| {
        columns
            .iter()
            .position(|column| column.contains(*element))
            .unwrap_or(usize::MAX)
    });
    let seeded: HashSet<&ElementKey> = seeds.iter().map(|(element, _)| *element).collect();
    for (element, code) in &seeds {
        seed_code(
            (*element).clone(),
            code.to_string(),
            &child_parent,
            &mut codes,
            &mut counts,
        );
    }

    assign_codes(&columns, &child_parent, &mut codes, &mut counts, hierarchy_type);

    let mut planned = Vec::new();
    let mut seen_codes = HashSet::new();
    for element in columns.iter().flatten() {
        let Some(code) = codes.get(element) else {
            continue;
        };
        if !seen_codes.insert(code.clone()) {
            tracing::warn!(boundary_code = %code, name = %element.value, "duplicate boundary code skipped");
            continue;
        }
        planned.push(PlannedBoundary {
            element: element.clone(),
            code: code.clone(),
            parent_code: child_parent
                .parent_of(element)
                .and_then(|parent| codes.get(parent))
                .cloned(),
            generated: !seeded.contains(element),
        });
    }
    planned
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub boundaries: Vec<PlannedBoundary>,
    pub entities_created: usize,
    pub relationships_created: usize,
}

impl ReconcileOutcome {
    pub fn generated(&self) -> impl Iterator<Item = &PlannedBoundary> {
        self.boundaries.iter().filter(|b| b.generated)
    }
}

pub struct Reconciler {
    registry: Arc<dyn BoundaryRegistry>,
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(registry: Arc<dyn BoundaryRegistry>, config: ReconcileConfig) -> Self {
        Reconciler { registry, config }
    }

    /// Runs a full reconciliation. One activity record per relationship
    /// created is appended to `activities`, also when the run fails later.
    pub async fn run(
        &self,
        ctx: &RunContext,
        rows: &[BoundaryRow],
        activities: &mut Vec<ActivityRecord>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let boundaries = plan_codes(rows, &ctx.hierarchy_type);
        tracing::info!(
            tenant_id = %ctx.tenant_id,
            hierarchy_type = %ctx.hierarchy_type,
            boundaries = boundaries.len(),
            "reconciling uploaded boundaries"
        );

        let codes: Vec<String> = boundaries.iter().map(|b| b.code.clone()).collect();
        let existing = self.existing_codes(&ctx.tenant_id, &codes).await?;
        let missing: Vec<&PlannedBoundary> = boundaries
            .iter()
            .filter(|b| !existing.contains(&b.code))
            .collect();

        let tree = self
            .registry
            .search_relationships(&RelationshipQuery::full_tree(
                &ctx.tenant_id,
                &ctx.hierarchy_type,
            ))
            .await?;
        let related = extract_codes(&tree);
        let unrelated: Vec<&PlannedBoundary> = boundaries
            .iter()
            .filter(|b| !related.contains(&b.code))
            .collect();

        if missing.is_empty() && unrelated.is_empty() {
            return Err(ReconcileError::AlreadyPresent);
        }

        let entities_created = self.create_entities(ctx, &missing).await?;

        let mut relationships_created = 0;
        for boundary in unrelated {
            if let Some(parent) = &boundary.parent_code {
                self.confirm_parent(ctx, parent).await?;
            }

            let relationship = BoundaryRelationship {
                tenant_id: ctx.tenant_id.clone(),
                code: boundary.code.clone(),
                hierarchy_type: ctx.hierarchy_type.clone(),
                boundary_type: boundary.boundary_type().to_string(),
                parent: boundary.parent_code.clone(),
            };
            let receipt = match self.registry.create_relationship(&relationship).await {
                Ok(receipt) => receipt,
                Err(source) => {
                    tracing::error!(
                        boundary_code = %boundary.code,
                        boundary_type = %boundary.boundary_type(),
                        error = %source,
                        "error creating boundary relationship"
                    );
                    return Err(ReconcileError::RelationshipCreate {
                        code: boundary.code.clone(),
                        boundary_type: boundary.boundary_type().to_string(),
                        source,
                    });
                }
            };
            tracing::info!(
                boundary_code = %boundary.code,
                boundary_type = %boundary.boundary_type(),
                "boundary relationship created"
            );
            counter!(BOUNDARY_RELATIONSHIPS_CREATED).increment(1);
            relationships_created += 1;

            activities.push(ActivityRecord {
                id: uuid::Uuid::new_v4().to_string(),
                status: receipt.status,
                retry_count: 0,
                tenant_id: ctx.tenant_id.clone(),
                resource_type: ctx.resource_type.clone(),
                url: receipt.url,
                request_payload: receipt.request,
                response_payload: receipt.response,
                audit_details: AuditDetails::now(ctx.user.as_deref()),
                additional_details: serde_json::json!({}),
                resource_details_id: ctx.resource_details_id.clone(),
            });
        }

        Ok(ReconcileOutcome {
            boundaries,
            entities_created,
            relationships_created,
        })
    }

    async fn existing_codes(
        &self,
        tenant_id: &str,
        codes: &[String],
    ) -> Result<HashSet<String>, ReconcileError> {
        let mut existing = HashSet::new();
        for chunk in codes.chunks(self.config.search_chunk_size.max(1)) {
            let found = self.registry.search_boundaries(tenant_id, chunk).await?;
            existing.extend(found.into_iter().map(|entity| entity.code));
        }
        Ok(existing)
    }

    async fn create_entities(
        &self,
        ctx: &RunContext,
        missing: &[&PlannedBoundary],
    ) -> Result<usize, ReconcileError> {
        if missing.is_empty() {
            tracing::info!("boundary entities are already in the system");
            return Ok(0);
        }

        let entities: Vec<BoundaryEntity> = missing
            .iter()
            .map(|b| BoundaryEntity::named(&ctx.tenant_id, &b.code, b.name()))
            .collect();
        for chunk in entities.chunks(self.config.create_chunk_size.max(1)) {
            self.registry
                .create_boundaries(&ctx.tenant_id, chunk)
                .await
                .map_err(ReconcileError::EntityCreate)?;
            counter!(BOUNDARY_ENTITIES_CREATED).increment(chunk.len() as u64);
        }
        tracing::info!(count = entities.len(), "boundary entities created");
        Ok(entities.len())
    }

    async fn confirm_parent(&self, ctx: &RunContext, parent_code: &str) -> Result<(), ReconcileError> {
        let query = RelationshipQuery::code(&ctx.tenant_id, &ctx.hierarchy_type, parent_code);
        let mut retries = 0;

        loop {
            if !self.registry.search_relationships(&query).await?.is_empty() {
                return Ok(());
            }
            if retries >= self.config.parent_poll_retries {
                tracing::error!(parent_code, "parent boundary never became visible");
                return Err(ReconcileError::ParentNotFound {
                    code: parent_code.to_string(),
                });
            }

            tracing::info!(parent_code, "parent boundary not found, waiting");
            counter!(PARENT_CONFIRMATION_RETRIES).increment(1);
            sleep(self.config.parent_poll_interval).await;
            retries += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::InMemoryRegistry;
    use crate::types::BoundaryNode;

    fn ctx() -> RunContext {
        RunContext {
            tenant_id: "mz".into(),
            hierarchy_type: "ADMIN".into(),
            resource_type: "boundary".into(),
            user: Some("user-1".into()),
            resource_details_id: None,
        }
    }

    fn config() -> ReconcileConfig {
        ReconcileConfig {
            parent_poll_interval: Duration::from_millis(1),
            ..ReconcileConfig::default()
        }
    }

    fn row(cells: &[(&str, &str)], code: Option<&str>) -> BoundaryRow {
        BoundaryRow {
            cells: cells.iter().map(|(k, v)| ElementKey::new(*k, *v)).collect(),
            code: code.map(String::from),
        }
    }

    #[test]
    fn test_plan_orders_parents_first() {
        let rows = vec![
            row(&[("Country", "Moz"), ("Province", "North")], None),
            row(&[("Country", "Moz"), ("Province", "South")], None),
        ];
        let plan = plan_codes(&rows, "admin");
        let codes: Vec<&str> = plan.iter().map(|b| b.code.as_str()).collect();

        assert_eq!(codes, vec!["ADMIN_MO", "ADMIN_MO_01_NORTH", "ADMIN_MO_02_SOUTH"]);
        assert_eq!(plan[0].parent_code, None);
        assert_eq!(plan[2].parent_code.as_deref(), Some("ADMIN_MO"));
        assert!(plan.iter().all(|b| b.generated));
    }

    #[test]
    fn test_plan_uses_seeded_codes() {
        let rows = vec![
            row(&[("Country", "Moz")], Some("MZ")),
            row(&[("Country", "Moz"), ("Province", "North")], None),
        ];
        let plan = plan_codes(&rows, "admin");
        assert_eq!(plan[0].code, "MZ");
        assert!(!plan[0].generated);
        assert_eq!(plan[1].code, "MZ_01_NORTH");
    }

    #[tokio::test]
    async fn test_creates_missing_boundaries_parents_first() {
        let registry = Arc::new(InMemoryRegistry::new());
        let reconciler = Reconciler::new(registry.clone(), config());
        let rows = vec![
            row(&[("Country", "Moz"), ("Province", "North"), ("District", "Lake")], None),
            row(&[("Country", "Moz"), ("Province", "South")], None),
        ];

        let mut activities = Vec::new();
        let outcome = reconciler.run(&ctx(), &rows, &mut activities).await.unwrap();

        assert_eq!(outcome.entities_created, 4);
        assert_eq!(outcome.relationships_created, 4);
        assert_eq!(activities.len(), 4);
        assert_eq!(activities[0].audit_details.created_by.as_deref(), Some("user-1"));

        let created: Vec<String> = registry
            .relationships()
            .into_iter()
            .map(|r| r.code)
            .collect();
        assert_eq!(
            created,
            vec![
                "ADMIN_MO",
                "ADMIN_MO_01_NORTH",
                "ADMIN_MO_02_SOUTH",
                "ADMIN_MO_01_LAKE"
            ]
        );
        assert_eq!(registry.create_entity_calls(), 1);
    }

    #[tokio::test]
    async fn test_all_present_is_validation_error_without_writes() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.insert_tree(
            &[BoundaryNode::new("MZ", "Country")
                .with_children(vec![BoundaryNode::new("MZ_01_NORTH", "Province")])],
            "ADMIN",
        );
        let reconciler = Reconciler::new(registry.clone(), config());
        let rows = vec![
            row(&[("Country", "Moz")], Some("MZ")),
            row(&[("Country", "Moz"), ("Province", "North")], Some("MZ_01_NORTH")),
        ];

        let mut activities = Vec::new();
        let err = reconciler
            .run(&ctx(), &rows, &mut activities)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::AlreadyPresent));
        assert_eq!(err.error_code().code, "VALIDATION_ERROR");
        assert_eq!(registry.create_entity_calls(), 0);
        assert_eq!(registry.create_relationship_calls(), 0);
        assert!(activities.is_empty());
    }

    #[tokio::test]
    async fn test_invisible_parent_fails_without_child_create() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.insert_tree(&[BoundaryNode::new("MZ", "Country")], "ADMIN");
        registry.hide_from_code_search("MZ");
        let reconciler = Reconciler::new(registry.clone(), config());
        let rows = vec![
            row(&[("Country", "Moz")], Some("MZ")),
            row(&[("Country", "Moz"), ("Province", "North")], None),
        ];

        let mut activities = Vec::new();
        let err = reconciler
            .run(&ctx(), &rows, &mut activities)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::ParentNotFound { ref code } if code == "MZ"));
        assert_eq!(err.error_code().module, "BOUNDARY");
        assert_eq!(err.error_code().code, "INTERNAL_SERVER_ERROR");
        assert_eq!(registry.create_relationship_calls(), 0);
        assert_eq!(registry.code_searches("MZ"), 7);
    }

    #[tokio::test]
    async fn test_first_relationship_failure_stops_run() {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.fail_relationship_for("ADMIN_MO_01_NORTH");
        let reconciler = Reconciler::new(registry.clone(), config());
        let rows = vec![
            row(&[("Country", "Moz"), ("Province", "North")], None),
            row(&[("Country", "Moz"), ("Province", "South")], None),
        ];

        let mut activities = Vec::new();
        let err = reconciler
            .run(&ctx(), &rows, &mut activities)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::RelationshipCreate { ref code, .. } if code == "ADMIN_MO_01_NORTH"));
        assert_eq!(err.error_code().code, "BOUNDARY_RELATIONSHIP_CREATE_ERROR");
        // The root stays committed, the sibling after the failure is never tried.
        assert_eq!(activities.len(), 1);
        assert_eq!(registry.relationships().len(), 1);
        assert_eq!(registry.create_relationship_calls(), 2);
    }

    #[tokio::test]
    async fn test_search_and_create_are_chunked() {
        let registry = Arc::new(InMemoryRegistry::new());
        let reconciler = Reconciler::new(
            registry.clone(),
            ReconcileConfig {
                search_chunk_size: 2,
                create_chunk_size: 3,
                ..config()
            },
        );
        let rows: Vec<BoundaryRow> = (0..4)
            .map(|i| row(&[("Country", "Moz"), ("Province", format!("P{i}").as_str())], None))
            .collect();

        let mut activities = Vec::new();
        reconciler.run(&ctx(), &rows, &mut activities).await.unwrap();

        // Five codes: three search requests of at most two, two creates of at most three.
        assert_eq!(registry.entity_search_calls(), 3);
        assert_eq!(registry.create_entity_calls(), 2);
    }
}
