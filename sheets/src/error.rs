use boundary::HierarchyError;
use shared::error_codes::{self, ErrorCode};

#[derive(thiserror::Error, Debug)]
pub enum SheetError {
    #[error("sheet {0} not found in workbook")]
    InvalidSheetName(String),
    #[error("column {position} should be {expected:?} but is {found:?}")]
    InvalidColumns {
        position: usize,
        expected: String,
        found: String,
    },
    #[error("could not read workbook: {0}")]
    InvalidFile(String),
    #[error("could not write workbook: {0}")]
    Write(String),
    #[error("invalid value in sheet {sheet}, row {row}: {reason}")]
    InvalidValue {
        sheet: String,
        row: u32,
        reason: String,
    },
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
}

impl SheetError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            SheetError::InvalidSheetName(_) => error_codes::lookup("FILE", "INVALID_SHEETNAME"),
            SheetError::InvalidColumns { .. } => error_codes::lookup("FILE", "INVALID_COLUMNS"),
            SheetError::InvalidFile(_) => error_codes::lookup("FILE", "INVALID_FILE"),
            SheetError::InvalidValue { .. } => error_codes::lookup("COMMON", "VALIDATION_ERROR"),
            SheetError::Write(_) | SheetError::Hierarchy(_) => {
                error_codes::lookup("COMMON", "INTERNAL_SERVER_ERROR")
            }
        }
    }
}
