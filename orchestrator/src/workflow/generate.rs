use super::templates::{TemplateContext, builder_for};
use super::{Factory, Filters, Job};
use crate::clients::events::publish_logged;
use crate::errors::{FactoryError, Result};
use crate::metrics_defs::{GENERATION_COMPLETED, GENERATION_DURATION, GENERATION_FAILED};
use crate::records::{GeneratedQuery, GeneratedResource, ResourceType, Status};
use crate::services::Services;
use boundary::types::AuditDetails;
use serde_json::{Value, json};
use shared::{counter, histogram};
use std::time::Instant;

#[derive(Clone, Debug, PartialEq)]
pub struct GenerateRequest {
    pub resource_type: ResourceType,
    pub tenant_id: String,
    pub hierarchy_type: String,
    pub force_update: bool,
    pub filters: Option<Filters>,
    pub locale: String,
    pub user: Option<String>,
}

impl GenerateRequest {
    /// Filters as stored on records; empty filters are no filters.
    fn filters_value(&self) -> Option<Value> {
        self.filters
            .as_ref()
            .filter(|filters| !filters.boundaries.is_empty())
            .and_then(|filters| serde_json::to_value(filters).ok())
    }

    fn query(&self, status: Option<Status>) -> GeneratedQuery {
        GeneratedQuery {
            resource_type: self.resource_type,
            tenant_id: self.tenant_id.clone(),
            hierarchy_type: self.hierarchy_type.clone(),
            status,
            id: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.tenant_id.trim().is_empty() {
            return Err(FactoryError::Validation("tenantId is required".into()));
        }
        if self.hierarchy_type.trim().is_empty() {
            return Err(FactoryError::Validation("hierarchyType is required".into()));
        }
        if !self.resource_type.is_generatable() {
            return Err(FactoryError::Validation(format!(
                "templates cannot be generated for type {}",
                self.resource_type
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DownloadQuery {
    pub resource_type: ResourceType,
    pub tenant_id: String,
    pub hierarchy_type: String,
    pub id: Option<String>,
}

fn generated_payload(records: &[GeneratedResource]) -> Value {
    json!({ "generatedResource": records })
}

impl Factory {
    /// Returns the reusable templates for the request, or a new in-progress
    /// record whose template is built in the background.
    pub async fn generate(&self, request: GenerateRequest) -> Result<Vec<GeneratedResource>> {
        request.validate()?;
        let services = self.services();

        let filters = request.filters_value();
        let prior: Vec<GeneratedResource> = services
            .store
            .search_generated(&request.query(Some(Status::Completed)))
            .await?
            .into_iter()
            .filter(|record| record.filters() == filters.as_ref())
            .collect();

        if !prior.is_empty() && !request.force_update {
            tracing::info!(
                resource_type = %request.resource_type,
                tenant_id = %request.tenant_id,
                count = prior.len(),
                "reusing generated templates"
            );
            return Ok(prior);
        }

        if !prior.is_empty() {
            let expired: Vec<GeneratedResource> = prior
                .into_iter()
                .map(|mut record| {
                    record.status = Status::Expired;
                    record.audit_details.touch(request.user.as_deref());
                    record
                })
                .collect();
            services.store.save_generated(&expired).await?;
            publish_logged(
                &services.events,
                &services.topics.update_generated_resource,
                generated_payload(&expired),
            )
            .await;
            tracing::info!(count = expired.len(), "generated templates expired");
        }

        let mut additional_details = json!({});
        if let Some(filters) = filters {
            additional_details["Filters"] = filters;
        }
        let record = GeneratedResource {
            id: uuid::Uuid::new_v4().to_string(),
            file_store_id: None,
            status: Status::InProgress,
            resource_type: request.resource_type,
            tenant_id: request.tenant_id.clone(),
            hierarchy_type: request.hierarchy_type.clone(),
            count: None,
            additional_details,
            audit_details: AuditDetails::now(request.user.as_deref()),
        };
        services.store.save_generated(&[record.clone()]).await?;
        publish_logged(
            &services.events,
            &services.topics.create_generated_resource,
            generated_payload(std::slice::from_ref(&record)),
        )
        .await;

        self.queue
            .submit(Job::Generate {
                record: record.clone(),
                request,
            })
            .await?;
        Ok(vec![record])
    }

    /// Completed templates, optionally a single one by id.
    pub async fn download(&self, query: DownloadQuery) -> Result<Vec<GeneratedResource>> {
        let found = self
            .services()
            .store
            .search_generated(&GeneratedQuery {
                resource_type: query.resource_type,
                tenant_id: query.tenant_id,
                hierarchy_type: query.hierarchy_type,
                status: Some(Status::Completed),
                id: query.id.clone(),
            })
            .await?;
        if found.is_empty() && query.id.is_some() {
            return Err(FactoryError::NotFound(format!(
                "no completed template with id {}",
                query.id.unwrap_or_default()
            )));
        }
        Ok(found)
    }
}

async fn build_and_upload(
    services: &Services,
    record: &GeneratedResource,
    request: &GenerateRequest,
) -> Result<(String, u64)> {
    let builder = builder_for(request.resource_type)?;
    let localization = services
        .localizer
        .template_bundle(&request.tenant_id, &request.hierarchy_type, &request.locale)
        .await?;
    let ctx = TemplateContext {
        services,
        request,
        localization: &localization,
    };
    let template = builder.build(&ctx).await?;

    let file_name = format!("{}-{}.xlsx", request.resource_type, record.id);
    let file_store_id = services
        .file_store
        .upload(&request.tenant_id, &file_name, template.workbook)
        .await?;
    tracing::info!(
        template = builder.name(),
        file_store_id = %file_store_id,
        count = template.count,
        "template uploaded"
    );
    Ok((file_store_id, template.count))
}

/// Builds the template of `record` and publishes the record as completed or
/// failed. Errors end up on the record, never with the caller.
pub async fn run_generation(
    services: &Services,
    mut record: GeneratedResource,
    request: &GenerateRequest,
) {
    let started = Instant::now();
    match build_and_upload(services, &record, request).await {
        Ok((file_store_id, count)) => {
            record.status = Status::Completed;
            record.file_store_id = Some(file_store_id);
            record.count = Some(count);
            counter!(GENERATION_COMPLETED, "type" => request.resource_type.as_str()).increment(1);
        }
        Err(e) => {
            tracing::error!(
                id = %record.id,
                resource_type = %request.resource_type,
                error = %e,
                "template generation failed"
            );
            record.status = Status::Failed;
            record.set_error(e.to_details());
            counter!(GENERATION_FAILED, "type" => request.resource_type.as_str()).increment(1);
        }
    }
    histogram!(GENERATION_DURATION).record(started.elapsed().as_secs_f64());
    record.audit_details.touch(request.user.as_deref());

    if let Err(e) = services.store.save_generated(&[record.clone()]).await {
        tracing::error!(id = %record.id, error = %e, "failed to store generated template");
    }
    publish_logged(
        &services.events,
        &services.topics.update_generated_resource,
        generated_payload(std::slice::from_ref(&record)),
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{TestHarness, sample_tree};
    use boundary::BoundaryFilter;
    use sheets::boundary_sheet::TARGET_COLUMN;
    use sheets::workbook::{open, sheet_headers, sheet_names};

    fn request(resource_type: ResourceType) -> GenerateRequest {
        GenerateRequest {
            resource_type,
            tenant_id: "mz".into(),
            hierarchy_type: "ADMIN".into(),
            force_update: false,
            filters: None,
            locale: "en_MZ".into(),
            user: Some("u1".into()),
        }
    }

    #[tokio::test]
    async fn test_new_request_completes_in_background() {
        let harness = TestHarness::new();
        harness.registry.insert_tree(&sample_tree(), "ADMIN");

        let records = harness.factory.generate(request(ResourceType::Boundary)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, Status::InProgress);
        assert!(records[0].file_store_id.is_none());

        let harness = harness.drain().await;
        let stored = harness.generated("mz").await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, Status::Completed);
        assert_eq!(stored[0].count, Some(6));

        let bytes = harness.files.stored(stored[0].file_store_id.as_deref().unwrap());
        let book = open(&bytes).unwrap();
        // Three districts reach the split threshold.
        assert_eq!(
            sheet_names(&book),
            vec![
                "HCM_README_SHEETNAME",
                "HCM_ADMIN_CONSOLE_BOUNDARY_DATA",
                "Lake",
                "Hill",
                "Reed"
            ]
        );

        let topics = harness.events.topics();
        assert_eq!(
            topics,
            vec![
                "create-generated-resource-details",
                "update-generated-resource-details"
            ]
        );
    }

    #[tokio::test]
    async fn test_completed_record_is_reused() {
        let harness = TestHarness::new();
        harness.registry.insert_tree(&sample_tree(), "ADMIN");
        harness.factory.generate(request(ResourceType::Boundary)).await.unwrap();
        let harness = harness.drain().await;

        let first = harness.generated("mz").await;
        let again = harness.factory.generate(request(ResourceType::Boundary)).await.unwrap();
        assert_eq!(again, first);
        assert_eq!(harness.generated("mz").await.len(), 1);
    }

    #[tokio::test]
    async fn test_force_update_expires_prior() {
        let harness = TestHarness::new();
        harness.registry.insert_tree(&sample_tree(), "ADMIN");
        harness.factory.generate(request(ResourceType::Boundary)).await.unwrap();
        let harness = harness.drain().await;
        let first_id = harness.generated("mz").await[0].id.clone();

        let mut forced = request(ResourceType::Boundary);
        forced.force_update = true;
        let records = harness.factory.generate(forced).await.unwrap();
        assert_ne!(records[0].id, first_id);

        let harness = harness.drain().await;
        let stored = harness.generated("mz").await;
        assert_eq!(stored.len(), 2);
        let old = stored.iter().find(|r| r.id == first_id).unwrap();
        assert_eq!(old.status, Status::Expired);
        let new = stored.iter().find(|r| r.id != first_id).unwrap();
        assert_eq!(new.status, Status::Completed);
    }

    #[tokio::test]
    async fn test_different_filters_do_not_reuse() {
        let harness = TestHarness::new();
        harness.registry.insert_tree(&sample_tree(), "ADMIN");
        harness.factory.generate(request(ResourceType::Boundary)).await.unwrap();
        let harness = harness.drain().await;

        let mut filtered = request(ResourceType::Boundary);
        filtered.filters = Some(Filters {
            boundaries: vec![BoundaryFilter {
                code: "MZ_01_N".into(),
                include_all_children: true,
            }],
        });
        let records = harness.factory.generate(filtered).await.unwrap();
        assert_eq!(records[0].status, Status::InProgress);
        assert!(records[0].filters().is_some());

        let harness = harness.drain().await;
        let stored = harness.generated("mz").await;
        let filtered = stored.iter().find(|r| r.filters().is_some()).unwrap();
        // Country, the selected province and its two districts.
        assert_eq!(filtered.count, Some(4));
        assert!(stored.iter().all(|r| r.status == Status::Completed));
    }

    #[tokio::test]
    async fn test_failure_lands_on_record() {
        let harness = TestHarness::new();
        harness.registry.insert_tree(&sample_tree(), "ADMIN");
        harness.master_data.clear_readme();

        harness.factory.generate(request(ResourceType::Boundary)).await.unwrap();
        let harness = harness.drain().await;

        let stored = harness.generated("mz").await;
        assert_eq!(stored[0].status, Status::Failed);
        assert_eq!(
            stored[0].additional_details["error"]["code"],
            "INVALID_README_CONFIG"
        );
        let last = harness.events.last("update-generated-resource-details").unwrap();
        assert_eq!(last["generatedResource"][0]["status"], "failed");
    }

    #[tokio::test]
    async fn test_target_template_is_split() {
        let harness = TestHarness::new();
        harness.registry.insert_tree(&sample_tree(), "ADMIN");

        harness
            .factory
            .generate(request(ResourceType::BoundaryWithTarget))
            .await
            .unwrap();
        let harness = harness.drain().await;

        let stored = harness.generated("mz").await;
        assert_eq!(stored[0].status, Status::Completed);
        let book = open(&harness.files.stored(stored[0].file_store_id.as_deref().unwrap())).unwrap();
        // Read-me, index tab and one tab per district.
        assert_eq!(
            sheet_names(&book),
            vec![
                "HCM_README_SHEETNAME",
                "HCM_ADMIN_CONSOLE_BOUNDARY_DATA",
                "Lake",
                "Hill",
                "Reed"
            ]
        );
        assert_eq!(
            sheet_headers(&book, "Hill").unwrap(),
            vec![
                "ADMIN_COUNTRY",
                "ADMIN_PROVINCE",
                "ADMIN_DISTRICT",
                "HCM_ADMIN_CONSOLE_BOUNDARY_CODE",
                TARGET_COLUMN
            ]
        );
    }

    #[tokio::test]
    async fn test_small_boundary_template_is_not_split() {
        let harness = TestHarness::new();
        harness.registry.insert_tree(&sample_tree(), "ADMIN");

        let mut filtered = request(ResourceType::Boundary);
        filtered.filters = Some(Filters {
            boundaries: vec![BoundaryFilter {
                code: "MZ_02_S".into(),
                include_all_children: true,
            }],
        });
        harness.factory.generate(filtered).await.unwrap();
        let harness = harness.drain().await;

        let stored = harness.generated("mz").await;
        assert_eq!(stored[0].count, Some(3));
        let book = open(&harness.files.stored(stored[0].file_store_id.as_deref().unwrap())).unwrap();
        assert_eq!(
            sheet_names(&book),
            vec!["HCM_README_SHEETNAME", "HCM_ADMIN_CONSOLE_BOUNDARY_DATA"]
        );
    }

    #[tokio::test]
    async fn test_facility_and_user_templates() {
        let harness = TestHarness::new();
        harness.registry.insert_tree(&sample_tree(), "ADMIN");
        harness.facilities.add(json!({ "id": "F-1", "name": "Store", "isPermanent": true }));
        harness.facilities.add(json!({ "id": "F-2", "name": "Clinic" }));

        harness
            .factory
            .generate(request(ResourceType::FacilityWithBoundary))
            .await
            .unwrap();
        harness
            .factory
            .generate(request(ResourceType::UserWithBoundary))
            .await
            .unwrap();
        let harness = harness.drain().await;

        let query = |resource_type| DownloadQuery {
            resource_type,
            tenant_id: "mz".into(),
            hierarchy_type: "ADMIN".into(),
            id: None,
        };
        let facility = harness
            .factory
            .download(query(ResourceType::FacilityWithBoundary))
            .await
            .unwrap();
        assert_eq!(facility[0].count, Some(2));
        let book = open(&harness.files.stored(facility[0].file_store_id.as_deref().unwrap())).unwrap();
        assert_eq!(sheet_names(&book)[1], "HCM_ADMIN_CONSOLE_FACILITIES");

        let user = harness
            .factory
            .download(query(ResourceType::UserWithBoundary))
            .await
            .unwrap();
        assert_eq!(user[0].count, Some(0));
    }

    #[tokio::test]
    async fn test_validation_and_download_not_found() {
        let harness = TestHarness::new();
        let err = harness
            .factory
            .generate(request(ResourceType::Facility))
            .await
            .unwrap_err();
        assert_eq!(err.error_code().code, "VALIDATION_ERROR");

        let err = harness
            .factory
            .download(DownloadQuery {
                resource_type: ResourceType::Boundary,
                tenant_id: "mz".into(),
                hierarchy_type: "ADMIN".into(),
                id: Some("missing".into()),
            })
            .await
            .unwrap_err();
        assert_eq!(err.error_code().code, "RESOURCE_NOT_FOUND");
    }
}
