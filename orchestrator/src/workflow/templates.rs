//! Workbook layouts of the downloadable templates.

use super::GenerateRequest;
use crate::clients::mdms::required_columns;
use crate::errors::{FactoryError, Result};
use crate::records::ResourceType;
use crate::services::Services;
use async_trait::async_trait;
use boundary::hierarchy::{filter_tree, order_levels};
use boundary::registry::RelationshipQuery;
use boundary::BoundaryNode;
use serde_json::Value;
use sheets::boundary_sheet::{BoundaryLayout, TARGET_COLUMN, boundary_sheet, level_header};
use sheets::readme::{readme_sheet, select_config};
use sheets::split::{SplitOptions, split_sheet};
use sheets::{LocalizationMap, SheetData, WorkbookBuilder};

/// A rendered template and the number of records it lists.
pub struct Template {
    pub workbook: Vec<u8>,
    pub count: u64,
}

/// What a builder needs to render one template.
pub struct TemplateContext<'a> {
    pub services: &'a Services,
    pub request: &'a GenerateRequest,
    pub localization: &'a LocalizationMap,
}

impl TemplateContext<'_> {
    fn tenant_id(&self) -> &str {
        &self.request.tenant_id
    }

    fn hierarchy_type(&self) -> &str {
        &self.request.hierarchy_type
    }

    /// Boundary types of the hierarchy, root first.
    pub async fn levels(&self) -> Result<Vec<String>> {
        let definition = self
            .services
            .registry
            .search_hierarchy_definition(self.tenant_id(), self.hierarchy_type())
            .await?;
        let levels = order_levels(&definition)?;
        if levels.is_empty() {
            return Err(FactoryError::Validation(format!(
                "hierarchy {} has no boundary levels",
                self.hierarchy_type()
            )));
        }
        Ok(levels)
    }

    /// The hierarchy's boundary tree, restricted by the request filters.
    pub async fn tree(&self) -> Result<Vec<BoundaryNode>> {
        let tree = self
            .services
            .registry
            .search_relationships(&RelationshipQuery::full_tree(
                self.tenant_id(),
                self.hierarchy_type(),
            ))
            .await?;
        match &self.request.filters {
            Some(filters) if !filters.boundaries.is_empty() => {
                Ok(filter_tree(&tree, &filters.boundaries))
            }
            _ => Ok(tree),
        }
    }

    pub async fn readme(&self) -> Result<SheetData> {
        let resource_type = self.request.resource_type;
        let configs = self
            .services
            .master_data
            .readme_configs(self.tenant_id(), &self.services.localization.mdms_module)
            .await?;
        let config = select_config(&configs, resource_type.as_str())
            .ok_or_else(|| FactoryError::ReadMeConfig(resource_type.to_string()))?;
        let heading = self.localization.get(readme_heading(resource_type));
        Ok(readme_sheet(heading, &config, self.localization))
    }

    pub fn boundary_tab(
        &self,
        tree: &[BoundaryNode],
        levels: &[String],
        with_target: bool,
    ) -> Result<SheetData> {
        let layout = BoundaryLayout {
            hierarchy_type: self.hierarchy_type(),
            levels,
            code_column: &self.services.boundary.code_column,
            tab_name: &self.services.boundary.boundary_tab,
            with_target,
        };
        Ok(boundary_sheet(tree, &layout, self.localization)?)
    }

    /// Localized required columns of a master-data schema.
    pub async fn schema_columns(&self, title: &str) -> Result<Vec<String>> {
        let code = format!("{}.{title}", self.services.localization.mdms_module);
        let schema = self
            .services
            .master_data
            .schema(self.tenant_id(), &code)
            .await?
            .ok_or(FactoryError::SchemaNotFound(code))?;
        Ok(self.localization.localize_all(&required_columns(&schema)))
    }
}

fn readme_heading(resource_type: ResourceType) -> &'static str {
    match resource_type {
        ResourceType::Boundary => "HCM_README_BOUNDARY_HEADING",
        ResourceType::BoundaryWithTarget => "HCM_README_TARGET_HEADING",
        ResourceType::FacilityWithBoundary | ResourceType::Facility => {
            "HCM_README_FACILITY_HEADING"
        }
        ResourceType::UserWithBoundary | ResourceType::User => "HCM_README_USER_HEADING",
    }
}

fn finish(tabs: &[SheetData], count: usize) -> Result<Template> {
    let mut builder = WorkbookBuilder::new();
    for tab in tabs {
        builder.add_sheet(tab)?;
    }
    Ok(Template {
        workbook: builder.to_bytes()?,
        count: count as u64,
    })
}

#[async_trait]
pub trait TemplateBuilder: Send + Sync {
    fn name(&self) -> &'static str;

    async fn build(&self, ctx: &TemplateContext<'_>) -> Result<Template>;
}

pub fn builder_for(resource_type: ResourceType) -> Result<Box<dyn TemplateBuilder>> {
    match resource_type {
        ResourceType::Boundary | ResourceType::BoundaryWithTarget => {
            Ok(Box::new(BoundaryTemplate { resource_type }))
        }
        ResourceType::FacilityWithBoundary => Ok(Box::new(FacilityTemplate)),
        ResourceType::UserWithBoundary => Ok(Box::new(UserTemplate)),
        other => Err(FactoryError::Validation(format!(
            "templates cannot be generated for type {other}"
        ))),
    }
}

/// Read-me and the boundary data tab with targets, one tab per boundary at
/// the split level once enough rows reach it. Serves both boundary types.
pub struct BoundaryTemplate {
    resource_type: ResourceType,
}

impl BoundaryTemplate {
    fn split(ctx: &TemplateContext<'_>, boundaries: &SheetData) -> Vec<SheetData> {
        let settings = &ctx.services.boundary;
        let split_header = ctx
            .localization
            .get(&level_header(ctx.hierarchy_type(), &settings.split_boundary_type))
            .to_string();
        // Targets stay editable on every split tab.
        let carry = vec![ctx.localization.get(TARGET_COLUMN).to_string()];
        let options = SplitOptions {
            level_header: &split_header,
            code_header: ctx.localization.get(&settings.code_column),
            threshold: settings.split_threshold,
            carry_headers: &carry,
        };
        split_sheet(boundaries, &options)
    }
}

#[async_trait]
impl TemplateBuilder for BoundaryTemplate {
    fn name(&self) -> &'static str {
        self.resource_type.as_str()
    }

    async fn build(&self, ctx: &TemplateContext<'_>) -> Result<Template> {
        let levels = ctx.levels().await?;
        let tree = ctx.tree().await?;
        let boundaries = ctx.boundary_tab(&tree, &levels, true)?;
        let count = boundaries.rows.len();

        let mut tabs = vec![ctx.readme().await?];
        tabs.extend(Self::split(ctx, &boundaries));
        finish(&tabs, count)
    }
}

/// Read-me, every facility of the tenant and the boundary data tab.
pub struct FacilityTemplate;

fn facility_row(facility: &Value, width: usize) -> Vec<Value> {
    let text = |key: &str| facility.get(key).cloned().unwrap_or_else(|| Value::from(""));
    let permanence = match facility.get("isPermanent").and_then(Value::as_bool) {
        Some(true) => "Permanent",
        _ => "Temporary",
    };
    let mut row = vec![
        text("id"),
        text("name"),
        text("usage"),
        Value::from(permanence),
        text("storageCapacity"),
    ];
    row.resize(width.max(row.len()), Value::from(""));
    row
}

#[async_trait]
impl TemplateBuilder for FacilityTemplate {
    fn name(&self) -> &'static str {
        "facilityWithBoundary"
    }

    async fn build(&self, ctx: &TemplateContext<'_>) -> Result<Template> {
        let settings = &ctx.services.boundary;
        let mut headers = vec![ctx.localization.get(&settings.facility_code_column).to_string()];
        headers.extend(ctx.schema_columns("facility").await?);

        let facilities = ctx.services.facilities.facilities(ctx.tenant_id()).await?;
        tracing::info!(count = facilities.len(), "facilities found for template");
        let rows = facilities
            .iter()
            .map(|facility| facility_row(facility, headers.len()))
            .collect();
        let facility_tab = SheetData::new(
            ctx.localization.get(&settings.facility_tab),
            headers,
            rows,
        );

        let levels = ctx.levels().await?;
        let tree = ctx.tree().await?;
        let boundaries = ctx.boundary_tab(&tree, &levels, false)?;
        finish(
            &[ctx.readme().await?, facility_tab, boundaries],
            facilities.len(),
        )
    }
}

/// Read-me, an empty user tab and the boundary data tab.
pub struct UserTemplate;

#[async_trait]
impl TemplateBuilder for UserTemplate {
    fn name(&self) -> &'static str {
        "userWithBoundary"
    }

    async fn build(&self, ctx: &TemplateContext<'_>) -> Result<Template> {
        let headers = ctx.schema_columns("user").await?;
        let user_tab = SheetData::new(
            ctx.localization.get(&ctx.services.boundary.user_tab),
            headers,
            Vec::new(),
        );

        let levels = ctx.levels().await?;
        let tree = ctx.tree().await?;
        let boundaries = ctx.boundary_tab(&tree, &levels, false)?;
        finish(&[ctx.readme().await?, user_tab, boundaries], 0)
    }
}
