//! Instructions tab placed first in generated templates.

use crate::localize::LocalizationMap;
use crate::rows::SheetData;
use serde::Deserialize;
use serde_json::Value;

pub const README_SHEET_NAME: &str = "HCM_README_SHEETNAME";
pub const MAX_LINE_CHARS: usize = 100;
const README_COLUMN_WIDTH: f64 = 130.0;
const BLANK_ROWS_AFTER_BLOCK: usize = 4;

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ReadMeConfig {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub texts: Vec<ReadMeText>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ReadMeText {
    pub header: String,
    #[serde(default)]
    pub descriptions: Vec<ReadMeDescription>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMeDescription {
    pub text: String,
    #[serde(default)]
    pub is_step_required: bool,
}

/// Breaks `text` into lines of at most `max` characters, on the last space
/// when there is one.
pub fn wrap_text(text: &str, max: usize) -> String {
    let mut out = String::new();
    let mut remaining: Vec<char> = text.chars().collect();

    while remaining.len() > max {
        let window = &remaining[..=max.min(remaining.len() - 1)];
        let cut = match window.iter().rposition(|c| *c == ' ') {
            Some(idx) if idx > 0 => idx,
            _ => max,
        };
        out.extend(&remaining[..cut]);
        out.push('\n');
        let rest: String = remaining[cut..].iter().collect();
        remaining = rest.trim().chars().collect();
    }
    out.extend(&remaining);
    out
}

/// One entry per row: each block's header, its descriptions and a gap.
/// Step numbering restarts with every block.
pub fn readme_lines(config: &ReadMeConfig, localization: &LocalizationMap) -> Vec<String> {
    let mut lines = Vec::new();
    for block in &config.texts {
        lines.push(localization.get(&block.header).to_string());
        let mut step = 1;
        for description in &block.descriptions {
            let text = wrap_text(localization.get(&description.text), MAX_LINE_CHARS);
            if description.is_step_required {
                lines.push(format!("Step {step}: {text}"));
                step += 1;
            } else {
                lines.push(text);
            }
        }
        lines.extend(std::iter::repeat_n(String::new(), BLANK_ROWS_AFTER_BLOCK));
    }
    lines
}

pub fn readme_sheet(
    main_header: &str,
    config: &ReadMeConfig,
    localization: &LocalizationMap,
) -> SheetData {
    let mut rows = vec![vec![Value::from("")], vec![Value::from("")]];
    rows.extend(
        readme_lines(config, localization)
            .into_iter()
            .map(|line| vec![Value::from(line)]),
    );
    SheetData {
        name: localization.get(README_SHEET_NAME).to_string(),
        headers: vec![main_header.to_string()],
        rows,
        column_width: README_COLUMN_WIDTH,
        wrap_text: true,
    }
}

/// Picks the configuration for `resource_type` from the master-data list.
pub fn select_config(configs: &[ReadMeConfig], resource_type: &str) -> Option<ReadMeConfig> {
    configs
        .iter()
        .find(|c| c.resource_type == resource_type)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_on_last_space() {
        let text = format!("{} {}", "a".repeat(60), "b".repeat(60));
        let wrapped = wrap_text(&text, MAX_LINE_CHARS);
        assert_eq!(wrapped, format!("{}\n{}", "a".repeat(60), "b".repeat(60)));
    }

    #[test]
    fn test_wrap_without_spaces() {
        let wrapped = wrap_text(&"x".repeat(250), MAX_LINE_CHARS);
        let lines: Vec<&str> = wrapped.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 100);
        assert_eq!(lines[2].len(), 50);
    }

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(wrap_text("short text", MAX_LINE_CHARS), "short text");
    }

    #[test]
    fn test_steps_restart_per_block() {
        let config: ReadMeConfig = serde_json::from_value(serde_json::json!({
            "type": "boundary",
            "texts": [
                { "header": "H1", "descriptions": [
                    { "text": "intro" },
                    { "text": "first", "isStepRequired": true },
                    { "text": "second", "isStepRequired": true }
                ]},
                { "header": "H2", "descriptions": [
                    { "text": "again", "isStepRequired": true }
                ]}
            ]
        }))
        .unwrap();
        let mut localization = LocalizationMap::new();
        localization.insert("H1", "Heading one");

        let lines = readme_lines(&config, &localization);
        assert_eq!(
            lines,
            vec![
                "Heading one",
                "intro",
                "Step 1: first",
                "Step 2: second",
                "",
                "",
                "",
                "",
                "H2",
                "Step 1: again",
                "",
                "",
                "",
                "",
            ]
        );

        let sheet = readme_sheet("Boundary template", &config, &localization);
        assert_eq!(sheet.name, README_SHEET_NAME);
        assert_eq!(sheet.rows.len(), lines.len() + 2);
        assert!(sheet.wrap_text);
    }

    #[test]
    fn test_select_config() {
        let configs = vec![ReadMeConfig {
            resource_type: "facility".into(),
            texts: vec![],
        }];
        assert!(select_config(&configs, "facility").is_some());
        assert!(select_config(&configs, "user").is_none());
    }
}
