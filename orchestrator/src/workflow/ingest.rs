use super::{Factory, Job};
use crate::clients::events::publish_logged;
use crate::errors::{FactoryError, Result};
use crate::metrics_defs::{INGESTION_COMPLETED, INGESTION_FAILED};
use crate::records::{ResourceDetails, ResourceType, Status};
use crate::services::Services;
use boundary::types::{ActivityRecord, AuditDetails};
use boundary::{Reconciler, RunContext};
use serde_json::{Value, json};
use shared::counter;
use sheets::boundary_sheet::{BoundaryLayout, TARGET_COLUMN, boundary_rows};
use sheets::workbook::{open, parse_data_tabs, parse_sheet, sheet_headers};
use sheets::{LocalizationMap, ParseOptions, SheetError};
use umya_spreadsheet::Spreadsheet;

/// Invalid rows listed in a target validation error.
const MAX_REPORTED_ROWS: usize = 10;

fn details_payload(details: &ResourceDetails) -> Value {
    json!({ "ResourceDetails": details })
}

impl Factory {
    /// Records an uploaded sheet and queues its processing. Headers and tab
    /// names of the sheet are read in `locale`, the default one when absent.
    pub async fn create_resource(
        &self,
        mut details: ResourceDetails,
        user: Option<String>,
        locale: Option<String>,
    ) -> Result<ResourceDetails> {
        validate(&details)?;
        let services = self.services();
        let locale = locale.unwrap_or_else(|| services.localizer.default_locale().to_string());

        details.id = Some(uuid::Uuid::new_v4().to_string());
        details.processed_file_store_id = None;
        details.status = Some(match details.action.as_deref() {
            Some("create") => Status::Accepted,
            _ => Status::Started,
        });
        details.audit_details = Some(AuditDetails::now(user.as_deref()));

        services.store.save_details(&details).await?;
        publish_logged(
            &services.events,
            &services.topics.create_resource_details,
            details_payload(&details),
        )
        .await;
        tracing::info!(
            id = ?details.id,
            resource_type = %details.resource_type,
            tenant_id = %details.tenant_id,
            locale = %locale,
            "resource upload accepted"
        );

        self.queue
            .submit(Job::Ingest {
                details: details.clone(),
                user,
                locale,
            })
            .await?;
        Ok(details)
    }
}

fn validate(details: &ResourceDetails) -> Result<()> {
    for (field, value) in [
        ("tenantId", &details.tenant_id),
        ("fileStoreId", &details.file_store_id),
        ("hierarchyType", &details.hierarchy_type),
    ] {
        if value.trim().is_empty() {
            return Err(FactoryError::Validation(format!("{field} is required")));
        }
    }
    match details.resource_type {
        ResourceType::Boundary | ResourceType::BoundaryWithTarget => Ok(()),
        other => Err(FactoryError::Validation(format!(
            "uploads of type {other} are not supported"
        ))),
    }
}

/// Processes an uploaded sheet and publishes the final state of `details`.
/// Activity records of the run are published even when it fails.
pub async fn run_ingestion(
    services: &Services,
    mut details: ResourceDetails,
    user: Option<&str>,
    locale: &str,
) {
    let mut activities = Vec::new();
    let result = process(services, &details, user, locale, &mut activities).await;

    if !activities.is_empty() {
        publish_logged(
            &services.events,
            &services.topics.create_resource_activity,
            json!({ "Activities": activities }),
        )
        .await;
    }

    match result {
        Ok(summary) => {
            details.status = Some(Status::Completed);
            if !details.additional_details.is_object() {
                details.additional_details = json!({});
            }
            if let (Some(target), Value::Object(summary)) =
                (details.additional_details.as_object_mut(), summary)
            {
                target.extend(summary);
            }
            counter!(INGESTION_COMPLETED, "type" => details.resource_type.as_str()).increment(1);
            tracing::info!(id = ?details.id, "resource processed");
        }
        Err(e) => {
            tracing::error!(id = ?details.id, error = %e, "resource processing failed");
            details.status = Some(Status::Failed);
            details.set_error(e.to_details());
            counter!(INGESTION_FAILED, "type" => details.resource_type.as_str()).increment(1);
        }
    }
    if let Some(audit) = details.audit_details.as_mut() {
        audit.touch(user);
    }

    if let Err(e) = services.store.save_details(&details).await {
        tracing::error!(id = ?details.id, error = %e, "failed to store resource details");
    }
    publish_logged(
        &services.events,
        &services.topics.update_resource_details,
        details_payload(&details),
    )
    .await;
}

async fn process(
    services: &Services,
    details: &ResourceDetails,
    user: Option<&str>,
    locale: &str,
    activities: &mut Vec<ActivityRecord>,
) -> Result<Value> {
    let url = services
        .file_store
        .resolve_url(&details.tenant_id, &details.file_store_id)
        .await?
        .ok_or_else(|| FactoryError::DownloadUrlNotFound(details.file_store_id.clone()))?;
    let bytes = services.file_store.download(&url).await?;
    let book = open(&bytes)?;

    let localization = services
        .localizer
        .template_bundle(&details.tenant_id, &details.hierarchy_type, locale)
        .await?;

    match details.resource_type {
        ResourceType::Boundary => {
            ingest_boundaries(services, details, user, &book, &localization, locale, activities)
                .await
        }
        ResourceType::BoundaryWithTarget => validate_targets(&book, &localization),
        other => Err(FactoryError::Validation(format!(
            "uploads of type {other} are not supported"
        ))),
    }
}

async fn ingest_boundaries(
    services: &Services,
    details: &ResourceDetails,
    user: Option<&str>,
    book: &Spreadsheet,
    localization: &LocalizationMap,
    locale: &str,
    activities: &mut Vec<ActivityRecord>,
) -> Result<Value> {
    let definition = services
        .registry
        .search_hierarchy_definition(&details.tenant_id, &details.hierarchy_type)
        .await?;
    let levels = boundary::hierarchy::order_levels(&definition)?;

    let settings = &services.boundary;
    let layout = BoundaryLayout {
        hierarchy_type: &details.hierarchy_type,
        levels: &levels,
        code_column: &settings.code_column,
        tab_name: &settings.boundary_tab,
        with_target: false,
    };
    let tab = localization.get(layout.tab_name);
    let code_header = localization.get(layout.code_column);
    let all_levels = layout.level_headers(localization);

    // The sheet may start below the root; its level columns must then follow
    // the hierarchy in order up to the code column.
    let headers = sheet_headers(book, tab)?;
    let first = headers.first().map(String::as_str).unwrap_or_default();
    let start = all_levels
        .iter()
        .position(|(header, _)| header == first)
        .ok_or_else(|| SheetError::InvalidColumns {
            position: 1,
            expected: all_levels.first().map(|(h, _)| h.clone()).unwrap_or_default(),
            found: first.to_string(),
        })?;
    let level_columns = headers
        .iter()
        .take_while(|header| header.as_str() != code_header)
        .count();
    let sheet_levels = &all_levels[start..(start + level_columns).min(all_levels.len())];
    let expected: Vec<String> = sheet_levels.iter().map(|(h, _)| h.clone()).collect();

    let rows = parse_sheet(
        book,
        tab,
        &ParseOptions {
            expected_headers: Some(&expected),
            tag_row_number: true,
            ..ParseOptions::default()
        },
    )?;
    let boundary_rows = boundary_rows(&rows, sheet_levels, code_header);
    if boundary_rows.is_empty() {
        return Err(FactoryError::Validation(format!(
            "sheet {tab} has no boundary rows"
        )));
    }

    let ctx = RunContext {
        tenant_id: details.tenant_id.clone(),
        hierarchy_type: details.hierarchy_type.clone(),
        resource_type: details.resource_type.to_string(),
        user: user.map(String::from),
        resource_details_id: details.id.clone(),
    };
    let reconciler = Reconciler::new(services.registry.clone(), settings.reconcile_config());
    let outcome = reconciler.run(&ctx, &boundary_rows, activities).await?;

    let localized = services
        .localizer
        .upsert_boundary_names(
            &details.tenant_id,
            &details.hierarchy_type,
            locale,
            outcome.generated().map(|b| (b.code.as_str(), b.name())),
        )
        .await?;

    Ok(json!({
        "boundariesCreated": outcome.entities_created,
        "relationshipsCreated": outcome.relationships_created,
        "codesGenerated": outcome.generated().count(),
        "localizationsUpserted": localized,
    }))
}

/// Every data tab needs the target column; filled targets must be
/// non-negative numbers.
fn validate_targets(book: &Spreadsheet, localization: &LocalizationMap) -> Result<Value> {
    let target_header = localization.get(TARGET_COLUMN);
    let tabs = parse_data_tabs(
        book,
        &ParseOptions {
            tag_row_number: true,
            tag_sheet_name: true,
            ..ParseOptions::default()
        },
    )?;
    if tabs.is_empty() {
        return Err(FactoryError::Validation("workbook has no data tabs".into()));
    }

    let mut invalid = Vec::new();
    let mut rows_checked = 0;
    for (tab, rows) in &tabs {
        let headers = sheet_headers(book, tab)?;
        if !headers.iter().any(|h| h == target_header) {
            return Err(SheetError::InvalidColumns {
                position: headers.len() + 1,
                expected: target_header.to_string(),
                found: String::new(),
            }
            .into());
        }

        for row in rows {
            rows_checked += 1;
            let reason = match (row.number(target_header), row.text(target_header)) {
                (Some(n), _) if n < 0.0 => "target must not be negative",
                (None, Some(_)) => "target must be a number",
                _ => continue,
            };
            invalid.push(SheetError::InvalidValue {
                sheet: row.sheet_name.clone().unwrap_or_else(|| tab.clone()),
                row: row.row_number.unwrap_or_default(),
                reason: reason.to_string(),
            });
        }
    }

    if !invalid.is_empty() {
        tracing::warn!(invalid = invalid.len(), "invalid targets in upload");
        let listed: Vec<String> = invalid
            .iter()
            .take(MAX_REPORTED_ROWS)
            .map(ToString::to_string)
            .collect();
        return Err(FactoryError::Validation(format!(
            "{} invalid target rows: {}",
            invalid.len(),
            listed.join("; ")
        )));
    }
    Ok(json!({ "targetRowsValidated": rows_checked }))
}
