use crate::error::SheetError;
use crate::rows::{SheetData, SheetRow, coerce_cell};
use indexmap::IndexMap;
use serde_json::Value;
use std::io::Cursor;
use umya_spreadsheet::{Spreadsheet, Worksheet};

#[derive(Clone, Debug, Default)]
pub struct ParseOptions<'a> {
    /// Headers the sheet must carry in its first columns, in order.
    pub expected_headers: Option<&'a [String]>,
    pub tag_row_number: bool,
    pub tag_sheet_name: bool,
}

pub fn open(bytes: &[u8]) -> Result<Spreadsheet, SheetError> {
    umya_spreadsheet::reader::xlsx::read_reader(Cursor::new(bytes), true)
        .map_err(|e| SheetError::InvalidFile(e.to_string()))
}

pub fn sheet_names(book: &Spreadsheet) -> Vec<String> {
    book.get_sheet_collection()
        .iter()
        .map(|sheet| sheet.get_name().to_string())
        .collect()
}

pub fn parse_sheet(
    book: &Spreadsheet,
    sheet_name: &str,
    options: &ParseOptions<'_>,
) -> Result<Vec<SheetRow>, SheetError> {
    let sheet = book
        .get_sheet_by_name(sheet_name)
        .ok_or_else(|| SheetError::InvalidSheetName(sheet_name.to_string()))?;
    read_rows(sheet, options)
}

/// Parses every tab but the first, which holds instructions.
pub fn parse_data_tabs(
    book: &Spreadsheet,
    options: &ParseOptions<'_>,
) -> Result<IndexMap<String, Vec<SheetRow>>, SheetError> {
    let mut tabs = IndexMap::new();
    for sheet in book.get_sheet_collection().iter().skip(1) {
        tabs.insert(sheet.get_name().to_string(), read_rows(sheet, options)?);
    }
    Ok(tabs)
}

fn cell_text(sheet: &Worksheet, col: u32, row: u32) -> String {
    sheet
        .get_cell((col, row))
        .map(|cell| cell.get_value().to_string())
        .unwrap_or_default()
}

/// Non-blank headers of the first row, left to right.
pub fn sheet_headers(book: &Spreadsheet, sheet_name: &str) -> Result<Vec<String>, SheetError> {
    let sheet = book
        .get_sheet_by_name(sheet_name)
        .ok_or_else(|| SheetError::InvalidSheetName(sheet_name.to_string()))?;
    Ok(header_cells(sheet).into_iter().map(|(_, h)| h).collect())
}

fn header_cells(sheet: &Worksheet) -> Vec<(u32, String)> {
    let (max_col, _) = sheet.get_highest_column_and_row();
    (1..=max_col)
        .map(|col| (col, cell_text(sheet, col, 1).trim().to_string()))
        .filter(|(_, header)| !header.is_empty())
        .collect()
}

fn read_rows(sheet: &Worksheet, options: &ParseOptions<'_>) -> Result<Vec<SheetRow>, SheetError> {
    let (_, max_row) = sheet.get_highest_column_and_row();
    let headers = header_cells(sheet);

    if let Some(expected) = options.expected_headers {
        for (position, expected) in (1..).zip(expected) {
            let found = cell_text(sheet, position, 1);
            if found.trim() != expected.as_str() {
                return Err(SheetError::InvalidColumns {
                    position: position as usize,
                    expected: expected.clone(),
                    found: found.trim().to_string(),
                });
            }
        }
    }

    let mut rows = Vec::new();
    for row in 2..=max_row {
        let raw: Vec<String> = headers
            .iter()
            .map(|(col, _)| cell_text(sheet, *col, row))
            .collect();
        if raw.iter().all(|value| value.trim().is_empty()) {
            continue;
        }

        let cells = headers
            .iter()
            .zip(raw)
            .map(|((_, header), value)| (header.clone(), coerce_cell(&value)))
            .collect();
        // Counted from the first row below the header, blank rows included.
        let row_number = row - 1;
        rows.push(SheetRow {
            cells,
            row_number: options.tag_row_number.then_some(row_number),
            sheet_name: options
                .tag_sheet_name
                .then(|| sheet.get_name().to_string()),
        });
    }
    Ok(rows)
}

/// Spreadsheet column letters for a 1-based index.
pub fn column_letter(mut index: u32) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Excel limits tab names to 31 characters and forbids a few symbols.
pub fn sanitize_tab_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('\'');
    let short: String = trimmed.chars().take(31).collect();
    if short.is_empty() {
        "Sheet".to_string()
    } else {
        short
    }
}

/// Accumulates tabs into one downloadable workbook.
pub struct WorkbookBuilder {
    book: Spreadsheet,
}

impl Default for WorkbookBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkbookBuilder {
    pub fn new() -> Self {
        WorkbookBuilder {
            book: umya_spreadsheet::new_file_empty_worksheet(),
        }
    }

    pub fn sheet_names(&self) -> Vec<String> {
        sheet_names(&self.book)
    }

    pub fn add_sheet(&mut self, data: &SheetData) -> Result<&mut Self, SheetError> {
        let name = sanitize_tab_name(&data.name);
        let sheet = self
            .book
            .new_sheet(&name)
            .map_err(|e| SheetError::Write(format!("{name}: {e}")))?;

        for (idx, header) in data.headers.iter().enumerate() {
            sheet.get_cell_mut((idx as u32 + 1, 1)).set_value(header.as_str());
        }
        for (r, row) in data.rows.iter().enumerate() {
            let row_idx = r as u32 + 2;
            for (c, value) in row.iter().enumerate() {
                let text = render(value);
                if text.is_empty() && !data.wrap_text {
                    continue;
                }
                let coordinate = (c as u32 + 1, row_idx);
                sheet.get_cell_mut(coordinate).set_value(text);
                if data.wrap_text {
                    sheet
                        .get_style_mut(coordinate)
                        .get_alignment_mut()
                        .set_wrap_text(true);
                }
            }
        }

        let columns = data
            .headers
            .len()
            .max(data.rows.iter().map(Vec::len).max().unwrap_or(0))
            .max(1);
        for col in 1..=columns as u32 {
            sheet
                .get_column_dimension_mut(&column_letter(col))
                .set_width(data.column_width);
        }
        Ok(self)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SheetError> {
        let mut buffer = Cursor::new(Vec::new());
        umya_spreadsheet::writer::xlsx::write_writer(&self.book, &mut buffer)
            .map_err(|e| SheetError::Write(e.to_string()))?;
        Ok(buffer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workbook() -> Vec<u8> {
        let mut builder = WorkbookBuilder::new();
        builder
            .add_sheet(&SheetData::new(
                "Read Me",
                vec!["Instructions".into()],
                vec![vec![json!("fill the next tabs")]],
            ))
            .unwrap();
        builder
            .add_sheet(&SheetData::new(
                "North",
                vec!["Name".into(), "Target".into()],
                vec![
                    vec![json!("Lake"), json!(12)],
                    vec![json!(""), json!("")],
                    vec![json!("Hill"), json!("")],
                ],
            ))
            .unwrap();
        builder
            .add_sheet(&SheetData::new(
                "South",
                vec!["Name".into(), "Target".into()],
                vec![vec![json!("Reed"), json!(3.5)]],
            ))
            .unwrap();
        builder.to_bytes().unwrap()
    }

    #[test]
    fn test_write_and_parse() {
        let book = open(&workbook()).unwrap();
        assert_eq!(sheet_names(&book), vec!["Read Me", "North", "South"]);
        assert_eq!(sheet_headers(&book, "North").unwrap(), vec!["Name", "Target"]);

        let rows = parse_sheet(
            &book,
            "North",
            &ParseOptions {
                tag_row_number: true,
                tag_sheet_name: true,
                ..ParseOptions::default()
            },
        )
        .unwrap();

        // Blank rows are dropped but still counted; numbers come back as
        // numbers.
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cells["Target"], json!(12));
        assert_eq!(rows[0].row_number, Some(1));
        assert_eq!(rows[1].cells["Target"], json!(""));
        assert_eq!(rows[1].row_number, Some(3));
        assert_eq!(rows[1].sheet_name.as_deref(), Some("North"));
    }

    #[test]
    fn test_data_tabs_skip_first() {
        let book = open(&workbook()).unwrap();
        let tabs = parse_data_tabs(&book, &ParseOptions::default()).unwrap();
        assert_eq!(tabs.keys().collect::<Vec<_>>(), vec!["North", "South"]);
        assert_eq!(tabs["South"][0].number("Target"), Some(3.5));
    }

    #[test]
    fn test_expected_headers() {
        let book = open(&workbook()).unwrap();
        let good = vec!["Name".to_string()];
        let options = ParseOptions {
            expected_headers: Some(&good),
            ..ParseOptions::default()
        };
        assert!(parse_sheet(&book, "North", &options).is_ok());

        let bad = vec!["Name".to_string(), "Code".to_string()];
        let options = ParseOptions {
            expected_headers: Some(&bad),
            ..ParseOptions::default()
        };
        let err = parse_sheet(&book, "North", &options).unwrap_err();
        assert_eq!(err.error_code().code, "INVALID_COLUMNS");
    }

    #[test]
    fn test_expected_headers_by_column() {
        let mut builder = WorkbookBuilder::new();
        builder
            .add_sheet(&SheetData::new(
                "Gaps",
                vec!["Name".into(), "".into(), "Code".into()],
                vec![vec![json!("Lake"), json!(""), json!("MZ_01_LAKE")]],
            ))
            .unwrap();
        let book = open(&builder.to_bytes().unwrap()).unwrap();

        let expected = vec!["Name".to_string(), "Code".to_string()];
        let options = ParseOptions {
            expected_headers: Some(&expected),
            ..ParseOptions::default()
        };
        match parse_sheet(&book, "Gaps", &options).unwrap_err() {
            SheetError::InvalidColumns {
                position, found, ..
            } => {
                assert_eq!(position, 2);
                assert_eq!(found, "");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_sheet_and_bad_file() {
        let book = open(&workbook()).unwrap();
        let err = parse_sheet(&book, "Nope", &ParseOptions::default()).unwrap_err();
        assert_eq!(err.error_code().code, "INVALID_SHEETNAME");

        let err = open(b"not a workbook").unwrap_err();
        assert_eq!(err.error_code().code, "INVALID_FILE");
    }

    #[test]
    fn test_workbook_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.xlsx");
        std::fs::write(&path, workbook()).unwrap();
        let book = open(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(book.get_sheet_collection().len(), 3);
    }

    #[test]
    fn test_column_letter_and_tab_names() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(28), "AB");
        assert_eq!(sanitize_tab_name("a/b:c"), "a_b_c");
        assert_eq!(sanitize_tab_name(&"x".repeat(40)).len(), 31);
        assert_eq!(sanitize_tab_name("  "), "Sheet");
    }
}
