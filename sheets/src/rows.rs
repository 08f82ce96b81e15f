use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Number, Value};

/// One data row of a parsed sheet, keyed by header.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SheetRow {
    pub cells: IndexMap<String, Value>,
    /// 1-based position among the sheet's data rows.
    pub row_number: Option<u32>,
    pub sheet_name: Option<String>,
}

impl SheetRow {
    /// Cell text, or `None` when the cell is absent or blank.
    pub fn text(&self, header: &str) -> Option<String> {
        match self.cells.get(header)? {
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn number(&self, header: &str) -> Option<f64> {
        self.cells.get(header).and_then(Value::as_f64)
    }
}

/// A sheet ready to be written: header row, data rows and layout.
#[derive(Clone, Debug, PartialEq)]
pub struct SheetData {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub column_width: f64,
    pub wrap_text: bool,
}

pub const DEFAULT_COLUMN_WIDTH: f64 = 30.0;

impl SheetData {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        SheetData {
            name: name.into(),
            headers,
            rows,
            column_width: DEFAULT_COLUMN_WIDTH,
            wrap_text: false,
        }
    }

    pub fn column(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }
}

/// Numeric-looking text becomes a number, blank becomes an empty string and
/// anything else is kept as text.
pub fn coerce_cell(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }
    if is_numeric(raw) {
        if !raw.contains('.') {
            if let Ok(n) = raw.parse::<i64>() {
                return Value::Number(n.into());
            }
        }
        if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

/// `-?digits(.digits)?`
fn is_numeric(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let (int, frac) = match digits.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (digits, None),
    };
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    all_digits(int) && frac.is_none_or(all_digits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_cell() {
        assert_eq!(coerce_cell("12"), json!(12));
        assert_eq!(coerce_cell("-3.5"), json!(-3.5));
        assert_eq!(coerce_cell("007"), json!(7));
        assert_eq!(coerce_cell(""), json!(""));
        assert_eq!(coerce_cell("1.2.3"), json!("1.2.3"));
        assert_eq!(coerce_cell("12a"), json!("12a"));
        assert_eq!(coerce_cell("-"), json!("-"));
        assert_eq!(coerce_cell(".5"), json!(".5"));
        assert_eq!(coerce_cell("Lake"), json!("Lake"));
    }

    #[test]
    fn test_row_text() {
        let mut row = SheetRow::default();
        row.cells.insert("A".into(), json!(""));
        row.cells.insert("B".into(), json!(42));
        row.cells.insert("C".into(), json!("x"));
        assert_eq!(row.text("A"), None);
        assert_eq!(row.text("B").as_deref(), Some("42"));
        assert_eq!(row.text("C").as_deref(), Some("x"));
        assert_eq!(row.text("D"), None);
        assert_eq!(row.number("B"), Some(42.0));
    }
}
