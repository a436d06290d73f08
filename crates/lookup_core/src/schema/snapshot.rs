//! Columnar snapshot as produced by the spreadsheet reader.
//!
//! A [`Workbook`] is a list of titled worksheets, each a list of row
//! dictionaries. Grouped columns are already nested by the reader, so a row
//! of a data sheet looks like:
//!
//! ```json
//! {"UID": "", "Delete(Y/N)": "N",
//!  "field": {"name": "Ohio", "capital": ["Columbus", "Colombo"]},
//!  "capital": {"lang": ["en", "fr"]},
//!  "property": {"code": "OH"},
//!  "user": ["alice"], "location": ["Boston"]}
//! ```

use lookup_model::legacy::scalar_to_string;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Title of the sheet holding table definitions.
pub const TYPES_SHEET: &str = "types";
/// Column marking a row for deletion.
pub const DELETE_HEADER: &str = "Delete(Y/N)";
/// Column carrying the out-of-band identity of a table or row.
pub const UID_HEADER: &str = "UID";

/// One row of a worksheet.
pub type RowDict = Map<String, Value>;

/// A titled worksheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Worksheet {
    /// Sheet title; a table tag or [`TYPES_SHEET`].
    pub title: String,
    /// Rows in sheet order.
    #[serde(default)]
    pub rows: Vec<RowDict>,
}

impl Worksheet {
    /// Creates an empty worksheet.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            rows: Vec::new(),
        }
    }

    /// Appends a row.
    #[must_use]
    pub fn with_row(mut self, row: RowDict) -> Self {
        self.rows.push(row);
        self
    }
}

/// A snapshot: one types sheet and one data sheet per table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    /// Sheets in order.
    #[serde(default)]
    pub sheets: Vec<Worksheet>,
}

impl Workbook {
    /// Creates an empty workbook.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sheet.
    #[must_use]
    pub fn with_sheet(mut self, sheet: Worksheet) -> Self {
        self.sheets.push(sheet);
        self
    }

    /// Looks up a sheet by title.
    #[must_use]
    pub fn sheet(&self, title: &str) -> Option<&Worksheet> {
        self.sheets.iter().find(|s| s.title == title)
    }

    /// Returns the types sheet.
    #[must_use]
    pub fn types(&self) -> Option<&Worksheet> {
        self.sheet(TYPES_SHEET)
    }
}

/// Reads a scalar cell as a string. Lists and objects yield `None`.
#[must_use]
pub fn cell_str(value: &Value) -> Option<String> {
    scalar_to_string(value)
}

/// Reads a cell holding a list of scalars.
///
/// Returns `None` if the cell is not a list or holds nested values.
#[must_use]
pub fn cell_list(value: &Value) -> Option<Vec<String>> {
    value.as_array()?.iter().map(cell_str).collect()
}

/// Reads a list cell leniently: a scalar counts as a one-element list and
/// blank entries are dropped.
#[must_use]
pub fn cell_names(value: &Value) -> Vec<String> {
    let names: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(cell_str).collect(),
        other => cell_str(other).into_iter().collect(),
    };
    names.into_iter().filter(|n| !n.trim().is_empty()).collect()
}

/// Reads a yes/no cell. Missing and blank cells are `false`.
#[must_use]
pub fn cell_flag(value: Option<&Value>) -> Option<bool> {
    match value {
        None | Some(Value::Null) => Some(false),
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::Number(n)) => Some(n.as_i64() != Some(0)),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "" | "n" | "no" | "false" | "0" => Some(false),
            "y" | "yes" | "true" | "1" => Some(true),
            _ => None,
        },
        Some(Value::Array(_) | Value::Object(_)) => None,
    }
}

/// Renders a flag the way exports write it.
#[must_use]
pub fn flag_cell(value: bool) -> Value {
    Value::String(if value { "yes" } else { "no" }.to_string())
}

/// Reads the delete marker of a row.
#[must_use]
pub fn is_delete_marked(row: &RowDict) -> bool {
    row.get(DELETE_HEADER)
        .and_then(cell_str)
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("y"))
}

/// Reads the non-blank UID of a row.
#[must_use]
pub fn uid(row: &RowDict) -> Option<String> {
    row.get(UID_HEADER)
        .and_then(cell_str)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
