//! Spreadsheet adapter: turns uploaded workbooks into typed rows and renders
//! boundary data into downloadable workbooks.

pub mod boundary_sheet;
pub mod error;
pub mod localize;
pub mod readme;
pub mod rows;
pub mod split;
pub mod workbook;

pub use error::SheetError;
pub use localize::LocalizationMap;
pub use rows::{SheetData, SheetRow};
pub use workbook::{ParseOptions, WorkbookBuilder};
