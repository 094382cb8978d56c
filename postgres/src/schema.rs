//! SQL for projection tables declared with [`TableSchema`].
//!
//! Identifiers come from `&'static` schema declarations, never from user input,
//! and are always quoted. Values are always bound.

use borrowing_core::projection::{
    ColumnType, ColumnValue, ProjectionError, Result, Row, TENANT_COLUMN, TableSchema,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row as _};
use uuid::Uuid;

/// Quote an identifier for PostgreSQL.
pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn column_list<'a>(columns: impl Iterator<Item = &'a str>) -> String {
    columns.map(quote).collect::<Vec<_>>().join(", ")
}

/// `CREATE TABLE IF NOT EXISTS` for a projection table.
///
/// # Errors
///
/// Returns [`ProjectionError::Schema`] when the table does not start its key with
/// the tenant column.
pub fn create_table_sql(table: &TableSchema) -> Result<String> {
    table.validate()?;

    let columns = table
        .columns()
        .map(|c| format!("{} {} NOT NULL", quote(c.name), c.ty.sql_type()))
        .collect::<Vec<_>>()
        .join(", ");
    let key = column_list(table.key.iter().map(|c| c.name));

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({columns}, PRIMARY KEY ({key}))",
        quote(table.name)
    ))
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &ColumnValue) {
    match value {
        ColumnValue::Text(v) => builder.push_bind(v.clone()),
        ColumnValue::Uuid(v) => builder.push_bind(*v),
        ColumnValue::Int(v) => builder.push_bind(*v),
        ColumnValue::Timestamp(v) => builder.push_bind(*v),
    };
}

fn push_conditions<'r>(
    builder: &mut QueryBuilder<'_, Postgres>,
    cells: impl Iterator<Item = (&'static str, &'r ColumnValue)>,
) {
    let mut separated = false;
    for (name, value) in cells {
        if separated {
            builder.push(" AND ");
        }
        separated = true;
        builder.push(quote(name)).push(" = ");
        push_value(builder, value);
    }
}

/// `INSERT .. ON CONFLICT DO NOTHING` for a validated row.
pub(crate) fn insert_if_absent(table: &TableSchema, row: &Row) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) VALUES (",
        quote(table.name),
        column_list(row.iter().map(|(name, _)| name))
    ));
    for (i, (_, value)) in row.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        push_value(&mut builder, value);
    }
    builder.push(") ON CONFLICT DO NOTHING");
    builder
}

/// `DELETE` by primary key.
pub(crate) fn delete_by_key(table: &TableSchema, key: &Row) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("DELETE FROM {} WHERE ", quote(table.name)));
    push_conditions(&mut builder, key.iter());
    builder
}

/// Tenant-scoped `SELECT` with equality filters, in key order.
pub(crate) fn select_rows(
    table: &TableSchema,
    tenant_id: &str,
    filter: &Row,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT {} FROM {} WHERE {} = ",
        column_list(table.columns().map(|c| c.name)),
        quote(table.name),
        quote(TENANT_COLUMN)
    ));
    builder.push_bind(tenant_id.to_owned());
    if !filter.is_empty() {
        builder.push(" AND ");
        push_conditions(&mut builder, filter.iter());
    }
    builder.push(format!(
        " ORDER BY {}",
        column_list(table.key.iter().map(|c| c.name))
    ));
    builder
}

/// Decode a database row using the table's declared column types.
pub(crate) fn decode_row(table: &TableSchema, row: &PgRow) -> Result<Row> {
    let storage = |e: sqlx::Error| ProjectionError::Storage(e.to_string());
    let mut decoded = Row::new();
    for column in table.columns() {
        let value = match column.ty {
            ColumnType::Text => ColumnValue::Text(row.try_get::<String, _>(column.name).map_err(storage)?),
            ColumnType::Uuid => ColumnValue::Uuid(row.try_get::<Uuid, _>(column.name).map_err(storage)?),
            ColumnType::Int => ColumnValue::Int(row.try_get::<i32, _>(column.name).map_err(storage)?),
            ColumnType::Timestamp => {
                ColumnValue::Timestamp(row.try_get::<DateTime<Utc>, _>(column.name).map_err(storage)?)
            }
        };
        decoded.set(column.name, value);
    }
    Ok(decoded)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use borrowing_core::projection::Column;
    use borrowing_core::stream::TenantId;

    static RESERVES: TableSchema = TableSchema {
        name: "course_reserves",
        key: &[
            Column::new(TENANT_COLUMN, ColumnType::Text),
            Column::new("course_id", ColumnType::Uuid),
        ],
        values: &[
            Column::new("copies", ColumnType::Int),
            Column::new("placed_on", ColumnType::Timestamp),
        ],
    };

    static UNSCOPED: TableSchema = TableSchema {
        name: "unscoped",
        key: &[Column::new("id", ColumnType::Uuid)],
        values: &[],
    };

    #[test]
    fn ddl_lists_columns_and_key() {
        let sql = create_table_sql(&RESERVES).expect("schema is valid");
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"course_reserves\" (\"tenant_id\" TEXT NOT NULL, \
             \"course_id\" UUID NOT NULL, \"copies\" INTEGER NOT NULL, \
             \"placed_on\" TIMESTAMPTZ NOT NULL, PRIMARY KEY (\"tenant_id\", \"course_id\"))"
        );
    }

    #[test]
    fn ddl_requires_tenant_key() {
        assert!(matches!(
            create_table_sql(&UNSCOPED),
            Err(ProjectionError::Schema(_))
        ));
    }

    #[test]
    fn statements_bind_every_value() {
        let id = Uuid::new_v4();
        let key = Row::new()
            .with(TENANT_COLUMN, &TenantId::new("T1"))
            .with("course_id", id);

        let delete = delete_by_key(&RESERVES, &key);
        assert_eq!(
            delete.sql(),
            "DELETE FROM \"course_reserves\" WHERE \"course_id\" = $1 AND \"tenant_id\" = $2"
        );

        let row = key.with("copies", 2).with("placed_on", Utc::now());
        let insert = insert_if_absent(&RESERVES, &row);
        assert_eq!(
            insert.sql(),
            "INSERT INTO \"course_reserves\" (\"copies\", \"course_id\", \"placed_on\", \"tenant_id\") \
             VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING"
        );

        let select = select_rows(&RESERVES, "T1", &Row::new().with("course_id", id));
        assert_eq!(
            select.sql(),
            "SELECT \"tenant_id\", \"course_id\", \"copies\", \"placed_on\" FROM \"course_reserves\" \
             WHERE \"tenant_id\" = $1 AND \"course_id\" = $2 ORDER BY \"tenant_id\", \"course_id\""
        );
    }
}
