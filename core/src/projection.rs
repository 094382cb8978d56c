//! Inline projections: read models updated in the same transaction as the event append.
//!
//! # Overview
//!
//! An [`InlineProjection`] turns each committed [`RecordedEvent`] into a list of
//! [`RowChange`]s against tables it declares with a [`TableSchema`]. The event store
//! applies those changes inside the append transaction, so a projection row is never
//! visible without the event that produced it, and never missing once the event commits.
//!
//! Row changes are backend-neutral. The PostgreSQL store turns them into
//! `INSERT .. ON CONFLICT DO NOTHING` and `DELETE` statements, the in-memory store
//! into map operations.
//!
//! ```text
//!  append(request) ──► events ──► InlineProjection::project ──► RowChange*
//!        │                                                        │
//!        └──────────── one local transaction ◄────────────────────┘
//! ```
//!
//! ## Tenancy
//!
//! Every projection table carries the owning tenant in a key column named
//! [`TENANT_COLUMN`]. Readers are always scoped to one tenant through
//! [`ProjectionReader::fetch_rows`].

use crate::event::RecordedEvent;
use crate::stream::TenantId;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// Name of the tenant key column every projection table must start with.
pub const TENANT_COLUMN: &str = "tenant_id";

/// Error type for projection operations.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// An event payload could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A row does not fit the declared table schema.
    #[error("Schema error: {0}")]
    Schema(String),

    /// The projection refused to handle an event.
    #[error("Event processing error: {0}")]
    EventProcessing(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Storage type of a projection column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    /// UTF-8 text.
    Text,
    /// 128-bit UUID.
    Uuid,
    /// 32-bit signed integer.
    Int,
    /// Timestamp with time zone, stored in UTC.
    Timestamp,
}

impl ColumnType {
    /// PostgreSQL type used for this column.
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Uuid => "UUID",
            Self::Int => "INTEGER",
            Self::Timestamp => "TIMESTAMPTZ",
        }
    }
}

/// A named, typed column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: &'static str,
    /// Column type.
    pub ty: ColumnType,
}

impl Column {
    /// Declare a column.
    #[must_use]
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self { name, ty }
    }
}

/// Declaration of a projection table: primary key columns and value columns.
///
/// Schemas are `static` items so row changes can point at them without allocation.
///
/// ```
/// use borrowing_core::projection::{Column, ColumnType, TableSchema, TENANT_COLUMN};
///
/// static SHELVES: TableSchema = TableSchema {
///     name: "shelves",
///     key: &[
///         Column::new(TENANT_COLUMN, ColumnType::Text),
///         Column::new("shelf_id", ColumnType::Uuid),
///     ],
///     values: &[Column::new("label", ColumnType::Text)],
/// };
///
/// assert_eq!(SHELVES.columns().count(), 3);
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name.
    pub name: &'static str,
    /// Primary key columns, tenant column first.
    pub key: &'static [Column],
    /// Non-key columns.
    pub values: &'static [Column],
}

impl TableSchema {
    /// All columns, key columns first.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.key.iter().chain(self.values.iter())
    }

    /// Look up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns().find(|c| c.name == name)
    }

    /// Check the schema itself: the first key column must be the tenant column.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Schema`] when the tenant column is missing or misplaced.
    pub fn validate(&self) -> Result<()> {
        match self.key.first() {
            Some(first) if first.name == TENANT_COLUMN && first.ty == ColumnType::Text => Ok(()),
            _ => Err(ProjectionError::Schema(format!(
                "table {} must start its key with a text {TENANT_COLUMN} column",
                self.name
            ))),
        }
    }

    /// Check that `row` sets every column with the declared type and nothing else.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Schema`] describing the first mismatch.
    pub fn validate_row(&self, row: &Row) -> Result<()> {
        self.check_columns(row, self.columns())
    }

    /// Check that `key` sets exactly the primary key columns.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Schema`] describing the first mismatch.
    pub fn validate_key(&self, key: &Row) -> Result<()> {
        self.check_columns(key, self.key.iter())
    }

    /// Check that every column of `filter` exists with the declared type.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Schema`] for unknown or mistyped columns.
    pub fn validate_filter(&self, filter: &Row) -> Result<()> {
        for (name, value) in filter.iter() {
            let column = self.column(name).ok_or_else(|| {
                ProjectionError::Schema(format!("unknown column {name} in {}", self.name))
            })?;
            if column.ty != value.column_type() {
                return Err(self.type_error(column, value));
            }
        }
        Ok(())
    }

    /// Extract the primary key of a full row.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Schema`] when a key column is missing.
    pub fn key_of(&self, row: &Row) -> Result<Row> {
        let mut key = Row::new();
        for column in self.key {
            let value = row.get(column.name).ok_or_else(|| {
                ProjectionError::Schema(format!("missing key column {} in {}", column.name, self.name))
            })?;
            key.set(column.name, value.clone());
        }
        Ok(key)
    }

    fn check_columns<'a>(
        &self,
        row: &Row,
        expected: impl Iterator<Item = &'a Column>,
    ) -> Result<()> {
        let mut count = 0;
        for column in expected {
            count += 1;
            let value = row.get(column.name).ok_or_else(|| {
                ProjectionError::Schema(format!("missing column {} in {}", column.name, self.name))
            })?;
            if value.column_type() != column.ty {
                return Err(self.type_error(column, value));
            }
        }
        if row.len() == count {
            Ok(())
        } else {
            Err(ProjectionError::Schema(format!(
                "row for {} has {} columns, expected {count}",
                self.name,
                row.len()
            )))
        }
    }

    fn type_error(&self, column: &Column, value: &ColumnValue) -> ProjectionError {
        ProjectionError::Schema(format!(
            "column {}.{} is {:?}, got {:?}",
            self.name,
            column.name,
            column.ty,
            value.column_type()
        ))
    }
}

/// A typed cell value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ColumnValue {
    /// Text value.
    Text(String),
    /// UUID value.
    Uuid(Uuid),
    /// Integer value.
    Int(i32),
    /// UTC timestamp value.
    Timestamp(DateTime<Utc>),
}

impl ColumnValue {
    /// The column type this value belongs to.
    #[must_use]
    pub const fn column_type(&self) -> ColumnType {
        match self {
            Self::Text(_) => ColumnType::Text,
            Self::Uuid(_) => ColumnType::Uuid,
            Self::Int(_) => ColumnType::Int,
            Self::Timestamp(_) => ColumnType::Timestamp,
        }
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(v) => f.write_str(v),
            Self::Uuid(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<&TenantId> for ColumnValue {
    fn from(tenant: &TenantId) -> Self {
        Self::Text(tenant.as_str().to_string())
    }
}

impl From<Uuid> for ColumnValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<i32> for ColumnValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<DateTime<Utc>> for ColumnValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// A set of named cells: a full row, a primary key or an equality filter.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Row(BTreeMap<&'static str, ColumnValue>);

impl Row {
    /// An empty row.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style setter.
    #[must_use]
    pub fn with(mut self, column: &'static str, value: impl Into<ColumnValue>) -> Self {
        self.0.insert(column, value.into());
        self
    }

    /// Set a cell, replacing any previous value.
    pub fn set(&mut self, column: &'static str, value: ColumnValue) {
        self.0.insert(column, value);
    }

    /// Read a cell.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.0.get(column)
    }

    /// Iterate cells in column-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ColumnValue)> {
        self.0.iter().map(|(name, value)| (*name, value))
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no cell is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every cell of `filter` is present in this row with an equal value.
    #[must_use]
    pub fn matches(&self, filter: &Row) -> bool {
        filter
            .iter()
            .all(|(name, value)| self.get(name) == Some(value))
    }

    /// Read a text cell.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Schema`] when the cell is missing or not text.
    pub fn text(&self, column: &str) -> Result<&str> {
        match self.get(column) {
            Some(ColumnValue::Text(v)) => Ok(v),
            other => Err(Self::cell_error(column, "text", other)),
        }
    }

    /// Read a UUID cell.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Schema`] when the cell is missing or not a UUID.
    pub fn uuid(&self, column: &str) -> Result<Uuid> {
        match self.get(column) {
            Some(ColumnValue::Uuid(v)) => Ok(*v),
            other => Err(Self::cell_error(column, "uuid", other)),
        }
    }

    /// Read an integer cell.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Schema`] when the cell is missing or not an integer.
    pub fn int(&self, column: &str) -> Result<i32> {
        match self.get(column) {
            Some(ColumnValue::Int(v)) => Ok(*v),
            other => Err(Self::cell_error(column, "int", other)),
        }
    }

    /// Read a timestamp cell.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Schema`] when the cell is missing or not a timestamp.
    pub fn timestamp(&self, column: &str) -> Result<DateTime<Utc>> {
        match self.get(column) {
            Some(ColumnValue::Timestamp(v)) => Ok(*v),
            other => Err(Self::cell_error(column, "timestamp", other)),
        }
    }

    fn cell_error(column: &str, expected: &str, found: Option<&ColumnValue>) -> ProjectionError {
        match found {
            Some(value) => ProjectionError::Schema(format!(
                "column {column} is {:?}, expected {expected}",
                value.column_type()
            )),
            None => ProjectionError::Schema(format!("column {column} is missing")),
        }
    }
}

/// A change to a projection table, applied inside the append transaction.
#[derive(Clone, Debug, PartialEq)]
pub enum RowChange {
    /// Insert `row`; if a row with the same primary key exists, do nothing.
    InsertIfAbsent {
        /// Target table.
        table: &'static TableSchema,
        /// Full row, key and value columns.
        row: Row,
    },

    /// Delete the row with primary key `key`; a missing row is not an error.
    Delete {
        /// Target table.
        table: &'static TableSchema,
        /// Primary key of the row to delete.
        key: Row,
    },
}

impl RowChange {
    /// The table this change targets.
    #[must_use]
    pub const fn table(&self) -> &'static TableSchema {
        match self {
            Self::InsertIfAbsent { table, .. } | Self::Delete { table, .. } => table,
        }
    }

    /// Validate the change against its table schema.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Schema`] when the row or key does not fit.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::InsertIfAbsent { table, row } => table.validate_row(row),
            Self::Delete { table, key } => table.validate_key(key),
        }
    }
}

/// A read model maintained synchronously with event appends.
///
/// `project` must be a pure function of the event: it is called inside the store's
/// transaction, once per appended event, in stream order. Returning an error aborts
/// the whole append, so only return one for events the projection cannot
/// interpret. Events it does not care about should yield no changes.
pub trait InlineProjection: Send + Sync {
    /// Projection name, used in logs.
    fn name(&self) -> &'static str;

    /// Tables this projection writes to. Stores create them on startup.
    fn tables(&self) -> &'static [&'static TableSchema];

    /// Row changes implied by one committed event.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] when the event cannot be interpreted.
    fn project(&self, event: &RecordedEvent) -> Result<Vec<RowChange>>;
}

/// Tenant-scoped read access to projection tables.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so readers can be shared as
/// `Arc<dyn ProjectionReader>`.
pub trait ProjectionReader: Send + Sync {
    /// Rows of `table` owned by `tenant_id` whose cells equal every cell of `filter`,
    /// in primary key order. Returned rows include the tenant column.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Schema`] for filters that do not fit the table and
    /// [`ProjectionError::Storage`] for backend failures.
    fn fetch_rows(
        &self,
        tenant_id: TenantId,
        table: &'static TableSchema,
        filter: Row,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Row>>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    static LOANS: TableSchema = TableSchema {
        name: "loans",
        key: &[
            Column::new(TENANT_COLUMN, ColumnType::Text),
            Column::new("loan_id", ColumnType::Uuid),
        ],
        values: &[Column::new("renewals", ColumnType::Int)],
    };

    static BROKEN: TableSchema = TableSchema {
        name: "broken",
        key: &[Column::new("loan_id", ColumnType::Uuid)],
        values: &[],
    };

    fn loan_row(id: Uuid) -> Row {
        Row::new()
            .with(TENANT_COLUMN, &TenantId::new("T1"))
            .with("loan_id", id)
            .with("renewals", 2)
    }

    #[test]
    fn schema_requires_leading_tenant_column() {
        assert!(LOANS.validate().is_ok());
        assert!(matches!(BROKEN.validate(), Err(ProjectionError::Schema(_))));
    }

    #[test]
    fn full_rows_must_match_schema() {
        let id = Uuid::new_v4();
        assert!(LOANS.validate_row(&loan_row(id)).is_ok());

        let missing = Row::new().with(TENANT_COLUMN, &TenantId::new("T1")).with("loan_id", id);
        assert!(LOANS.validate_row(&missing).is_err());

        let mistyped = loan_row(id).with("loan_id", 5);
        assert!(LOANS.validate_row(&mistyped).is_err());

        let extra = loan_row(id).with("note", 1);
        assert!(LOANS.validate_row(&extra).is_err());
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn key_extraction_keeps_only_key_columns() {
        let id = Uuid::new_v4();
        let key = LOANS.key_of(&loan_row(id)).expect("key should extract");

        assert_eq!(key.len(), 2);
        assert!(LOANS.validate_key(&key).is_ok());
        assert_eq!(key.uuid("loan_id").expect("uuid cell"), id);
    }

    #[test]
    fn filters_match_subsets() {
        let id = Uuid::new_v4();
        let row = loan_row(id);

        assert!(row.matches(&Row::new()));
        assert!(row.matches(&Row::new().with("loan_id", id)));
        assert!(!row.matches(&Row::new().with("loan_id", Uuid::new_v4())));
        assert!(LOANS.validate_filter(&Row::new().with("renewals", 1)).is_ok());
        assert!(LOANS.validate_filter(&Row::new().with("unknown", 1)).is_err());
    }

    #[test]
    fn typed_getters_report_mismatches() {
        let row = loan_row(Uuid::new_v4());
        assert!(row.int("renewals").is_ok());
        assert!(row.text("renewals").is_err());
        assert!(row.timestamp("missing").is_err());
    }

    #[test]
    fn row_change_validation_uses_its_table() {
        let id = Uuid::new_v4();
        let insert = RowChange::InsertIfAbsent {
            table: &LOANS,
            row: loan_row(id),
        };
        let delete = RowChange::Delete {
            table: &LOANS,
            key: loan_row(id),
        };

        assert_eq!(insert.table().name, "loans");
        assert!(insert.validate().is_ok());
        assert!(delete.validate().is_err());
    }
}
