//! Snapshot grammar and validation.
//!
//! A snapshot is checked as a whole by [`validate`] before any store is
//! touched. Problems are collected into [`SchemaErrors`] rather than
//! reported one at a time.

mod data;
mod definition;
mod snapshot;
mod validator;
mod violation;

pub use data::{check_data_row, parse_data_row, DataRow};
pub use definition::{
    field_indexed_column, field_properties_column, TableDefinition, DESCRIPTION_COLUMN,
    FIELD_COLUMN, IS_GLOBAL_COLUMN, PROPERTY_COLUMN, TABLE_ID_COLUMN, TAG_COLUMN,
};
pub use snapshot::{
    cell_flag, cell_list, cell_names, cell_str, flag_cell, is_delete_marked, uid, RowDict,
    Workbook, Worksheet, DELETE_HEADER, TYPES_SHEET, UID_HEADER,
};
pub use validator::{validate, ValidatedSnapshot};
pub use violation::{SchemaErrors, SchemaViolation};
