//! Splits a large boundary tab into one tab per boundary at a chosen level.

use crate::rows::SheetData;
use crate::workbook::sanitize_tab_name;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;

#[derive(Clone, Debug)]
pub struct SplitOptions<'a> {
    /// Localized header of the level to split on.
    pub level_header: &'a str,
    pub code_header: &'a str,
    /// Minimum number of rows with a value at the split level.
    pub threshold: usize,
    /// Extra columns kept on every tab, after the code column.
    pub carry_headers: &'a [String],
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn should_split(sheet: &SheetData, options: &SplitOptions<'_>) -> bool {
    let Some(col) = sheet.column(options.level_header) else {
        return false;
    };
    let populated = sheet
        .rows
        .iter()
        .filter(|row| !is_blank(row.get(col)))
        .count();
    populated >= options.threshold
}

/// Returns the index tab followed by one tab per distinct value at the
/// split level, or the sheet unchanged when it does not qualify. Every tab
/// keeps the columns up to the split level plus the code column.
pub fn split_sheet(sheet: &SheetData, options: &SplitOptions<'_>) -> Vec<SheetData> {
    let (Some(split_col), Some(code_col)) = (
        sheet.column(options.level_header),
        sheet.column(options.code_header),
    ) else {
        return vec![sheet.clone()];
    };
    if !should_split(sheet, options) {
        return vec![sheet.clone()];
    }

    let mut kept: Vec<usize> = (0..=split_col).collect();
    kept.push(code_col);
    kept.extend(
        options
            .carry_headers
            .iter()
            .filter_map(|header| sheet.column(header)),
    );
    let project = |row: &Vec<Value>| -> Vec<Value> {
        kept.iter()
            .map(|idx| row.get(*idx).cloned().unwrap_or_else(|| Value::from("")))
            .collect()
    };
    let headers: Vec<String> = kept.iter().map(|idx| sheet.headers[*idx].clone()).collect();

    // Level columns deeper than the split level; levels precede the code column.
    let deeper: Vec<usize> = (split_col + 1..code_col).collect();

    let mut index_rows = Vec::new();
    let mut groups: IndexMap<String, Vec<Vec<Value>>> = IndexMap::new();
    for row in &sheet.rows {
        if deeper.iter().all(|idx| is_blank(row.get(*idx))) {
            index_rows.push(project(row));
        }
        if !is_blank(row.get(split_col)) {
            let key = text(&row[split_col]);
            groups.entry(key).or_default().push(project(row));
        }
    }

    let mut tabs = vec![SheetData {
        name: sheet.name.clone(),
        headers: headers.clone(),
        rows: index_rows,
        column_width: sheet.column_width,
        wrap_text: sheet.wrap_text,
    }];
    let mut used: HashSet<String> = HashSet::from([sanitize_tab_name(&sheet.name)]);
    for (value, rows) in groups {
        tabs.push(SheetData {
            name: unique_tab_name(&value, &mut used),
            headers: headers.clone(),
            rows,
            column_width: sheet.column_width,
            wrap_text: sheet.wrap_text,
        });
    }
    tracing::info!(tabs = tabs.len(), level = options.level_header, "split boundary sheet");
    tabs
}

fn unique_tab_name(value: &str, used: &mut HashSet<String>) -> String {
    let base = sanitize_tab_name(value);
    let mut name = base.clone();
    let mut n = 1;
    while !used.insert(name.clone()) {
        n += 1;
        let suffix = format!("_{n}");
        let stem: String = base.chars().take(31 - suffix.len()).collect();
        name = format!("{stem}{suffix}");
    }
    name
}
