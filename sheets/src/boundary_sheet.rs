//! The boundary data tab: one row per boundary with its ancestors' names,
//! and the way back from such rows to hierarchy cells.

use crate::error::SheetError;
use crate::localize::LocalizationMap;
use crate::rows::{SheetData, SheetRow};
use boundary::hierarchy::{build_path_list, levels_from};
use boundary::{BoundaryNode, BoundaryRow, ElementKey};
use serde_json::Value;

pub const TARGET_COLUMN: &str = "Target at the Selected Boundary level";

/// Header code of a hierarchy level, before localization.
pub fn level_header(hierarchy_type: &str, level: &str) -> String {
    format!("{hierarchy_type}_{level}").to_uppercase()
}

#[derive(Clone, Debug)]
pub struct BoundaryLayout<'a> {
    pub hierarchy_type: &'a str,
    /// Every level of the hierarchy, root first.
    pub levels: &'a [String],
    pub code_column: &'a str,
    pub tab_name: &'a str,
    pub with_target: bool,
}

impl BoundaryLayout<'_> {
    /// Localized level headers paired with their boundary type.
    pub fn level_headers(&self, localization: &LocalizationMap) -> Vec<(String, String)> {
        self.levels
            .iter()
            .map(|level| {
                let code = level_header(self.hierarchy_type, level);
                (localization.get(&code).to_string(), level.clone())
            })
            .collect()
    }
}

/// Renders the tree below the first root's level. An empty tree gives a
/// header-only sheet.
pub fn boundary_sheet(
    tree: &[BoundaryNode],
    layout: &BoundaryLayout<'_>,
    localization: &LocalizationMap,
) -> Result<SheetData, SheetError> {
    let levels = match tree.first() {
        Some(root) => levels_from(layout.levels, &root.boundary_type),
        None => layout.levels,
    };

    let mut headers: Vec<String> = levels
        .iter()
        .map(|level| localization.get(&level_header(layout.hierarchy_type, level)).to_string())
        .collect();
    headers.push(localization.get(layout.code_column).to_string());
    if layout.with_target {
        headers.push(localization.get(TARGET_COLUMN).to_string());
    }

    let paths = build_path_list(tree)?;
    let rows = paths
        .iter()
        .map(|path| {
            let codes: Vec<&str> = path.split(',').collect();
            let mut row: Vec<Value> = (0..levels.len())
                .map(|idx| {
                    codes
                        .get(idx)
                        .map(|code| Value::from(localization.get(code)))
                        .unwrap_or_else(|| Value::from(""))
                })
                .collect();
            row.push(Value::from(codes.last().copied().unwrap_or_default()));
            if layout.with_target {
                row.push(Value::from(""));
            }
            row
        })
        .collect();

    Ok(SheetData::new(
        localization.get(layout.tab_name),
        headers,
        rows,
    ))
}

/// Reads uploaded boundary rows back into hierarchy cells. Blank level
/// cells are skipped; the code column seeds the deepest cell's code.
pub fn boundary_rows(
    rows: &[SheetRow],
    level_headers: &[(String, String)],
    code_header: &str,
) -> Vec<BoundaryRow> {
    rows.iter()
        .map(|row| BoundaryRow {
            cells: level_headers
                .iter()
                .filter_map(|(header, boundary_type)| {
                    row.text(header)
                        .map(|name| ElementKey::new(boundary_type.clone(), name.trim()))
                })
                .collect(),
            code: row.text(code_header),
        })
        .filter(|row| !row.cells.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::{ParseOptions, WorkbookBuilder, open, parse_sheet};
    use boundary::hierarchy::build_child_parent_map;
    use serde_json::json;

    fn levels() -> Vec<String> {
        vec!["Country".into(), "Province".into(), "District".into()]
    }

    fn tree() -> Vec<BoundaryNode> {
        vec![BoundaryNode::new("MZ", "Country").with_children(vec![
            BoundaryNode::new("MZ_01_N", "Province").with_children(vec![
                BoundaryNode::new("MZ_01_LAKE", "District"),
                BoundaryNode::new("MZ_02_HILL", "District"),
            ]),
            BoundaryNode::new("MZ_02_S", "Province")
                .with_children(vec![BoundaryNode::new("MZ_01_REED", "District")]),
        ])]
    }

    fn localization() -> LocalizationMap {
        [
            ("MZ", "Mozambique"),
            ("MZ_01_N", "North"),
            ("MZ_02_S", "South"),
            ("MZ_01_LAKE", "Lake"),
            ("MZ_02_HILL", "Hill"),
            ("MZ_01_REED", "Reed"),
            ("ADMIN_PROVINCE", "Province"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn layout(levels: &[String], with_target: bool) -> BoundaryLayout<'_> {
        BoundaryLayout {
            hierarchy_type: "admin",
            levels,
            code_column: "HCM_ADMIN_CONSOLE_BOUNDARY_CODE",
            tab_name: "HCM_ADMIN_CONSOLE_BOUNDARY_DATA",
            with_target,
        }
    }

    #[test]
    fn test_boundary_sheet_rows() {
        let levels = levels();
        let sheet = boundary_sheet(&tree(), &layout(&levels, true), &localization()).unwrap();

        assert_eq!(
            sheet.headers,
            vec![
                "ADMIN_COUNTRY",
                "Province",
                "ADMIN_DISTRICT",
                "HCM_ADMIN_CONSOLE_BOUNDARY_CODE",
                TARGET_COLUMN
            ]
        );
        assert_eq!(sheet.rows.len(), 6);
        assert_eq!(sheet.rows[0], vec![json!("Mozambique"), json!(""), json!(""), json!("MZ"), json!("")]);
        assert_eq!(
            sheet.rows[2],
            vec![json!("Mozambique"), json!("North"), json!("Lake"), json!("MZ_01_LAKE"), json!("")]
        );
    }

    #[test]
    fn test_sheet_starts_at_root_level() {
        let levels = levels();
        let subtree = vec![tree()[0].children[0].clone()];
        let sheet = boundary_sheet(&subtree, &layout(&levels, false), &localization()).unwrap();
        assert_eq!(sheet.headers.len(), 3);
        assert_eq!(sheet.headers[0], "Province");
    }

    #[test]
    fn test_empty_tree_is_header_only() {
        let levels = levels();
        let sheet = boundary_sheet(&[], &layout(&levels, false), &localization()).unwrap();
        assert!(sheet.rows.is_empty());
        assert_eq!(sheet.headers.len(), 4);
    }

    fn round_trip(rows: Vec<Vec<Value>>) -> Vec<BoundaryRow> {
        let levels = levels();
        let layout = layout(&levels, false);
        let localization = localization();
        let mut sheet = boundary_sheet(&tree(), &layout, &localization).unwrap();
        sheet.rows = rows;

        let mut builder = WorkbookBuilder::new();
        builder.add_sheet(&sheet).unwrap();
        let book = open(&builder.to_bytes().unwrap()).unwrap();
        let parsed = parse_sheet(&book, &sheet.name, &ParseOptions::default()).unwrap();
        boundary_rows(&parsed, &layout.level_headers(&localization), layout.code_column)
    }

    #[test]
    fn test_round_trip_reproduces_child_parent_map() {
        let levels = levels();
        let sheet = boundary_sheet(&tree(), &layout(&levels, false), &localization()).unwrap();

        let forward = round_trip(sheet.rows.clone());
        let mut reversed_rows = sheet.rows.clone();
        reversed_rows.reverse();
        let backward = round_trip(reversed_rows);

        let expected: std::collections::HashSet<_> = [
            (("Country", "Mozambique"), None),
            (("Province", "North"), Some(("Country", "Mozambique"))),
            (("Province", "South"), Some(("Country", "Mozambique"))),
            (("District", "Lake"), Some(("Province", "North"))),
            (("District", "Hill"), Some(("Province", "North"))),
            (("District", "Reed"), Some(("Province", "South"))),
        ]
        .into_iter()
        .map(|((k, v), parent)| {
            (
                ElementKey::new(k, v),
                parent.map(|(pk, pv)| ElementKey::new(pk, pv)),
            )
        })
        .collect();

        assert_eq!(build_child_parent_map(&forward).pairs(), expected);
        assert_eq!(build_child_parent_map(&backward).pairs(), expected);
        assert_eq!(forward[2].code.as_deref(), Some("MZ_01_LAKE"));
    }
}
