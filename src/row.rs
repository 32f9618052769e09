//! Backend-agnostic result rows and null-safe value extraction.

use crate::error::DbResult;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{ColumnIndex, Decode, MySql, Postgres, Row, Sqlite, Type};
use std::fmt;

/// Column lookup usable against every supported row type. Implemented for
/// `&str` (column name) and `usize` (ordinal).
pub trait ColumnRef:
    ColumnIndex<PgRow> + ColumnIndex<MySqlRow> + ColumnIndex<SqliteRow>
{
}

impl<I> ColumnRef for I where
    I: ColumnIndex<PgRow> + ColumnIndex<MySqlRow> + ColumnIndex<SqliteRow>
{
}

/// Value types decodable from every supported backend.
pub trait SqlDecode:
    for<'r> Decode<'r, Postgres>
    + Type<Postgres>
    + for<'r> Decode<'r, MySql>
    + Type<MySql>
    + for<'r> Decode<'r, Sqlite>
    + Type<Sqlite>
{
}

impl<T> SqlDecode for T where
    T: for<'r> Decode<'r, Postgres>
        + Type<Postgres>
        + for<'r> Decode<'r, MySql>
        + Type<MySql>
        + for<'r> Decode<'r, Sqlite>
        + Type<Sqlite>
{
}

/// A single result row from any backend.
///
/// SQL `NULL` never fails extraction here: [`value`](Self::value) surfaces it
/// as `None` and the `*_or` variants substitute a caller default. A genuinely
/// missing column or a type mismatch is still an error.
pub enum DbRow {
    Postgres(PgRow),
    MySql(MySqlRow),
    Sqlite(SqliteRow),
}

impl DbRow {
    /// Number of columns in the row.
    pub fn len(&self) -> usize {
        match self {
            Self::Postgres(row) => row.len(),
            Self::MySql(row) => row.len(),
            Self::Sqlite(row) => row.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a column, mapping SQL `NULL` to `None`.
    pub fn value<T, I>(&self, index: I) -> DbResult<Option<T>>
    where
        T: SqlDecode,
        I: ColumnRef,
    {
        let value = match self {
            Self::Postgres(row) => row.try_get::<Option<T>, _>(index)?,
            Self::MySql(row) => row.try_get::<Option<T>, _>(index)?,
            Self::Sqlite(row) => row.try_get::<Option<T>, _>(index)?,
        };
        Ok(value)
    }

    /// Read a column, substituting `default` for SQL `NULL`.
    pub fn value_or<T, I>(&self, index: I, default: T) -> DbResult<T>
    where
        T: SqlDecode,
        I: ColumnRef,
    {
        Ok(self.value(index)?.unwrap_or(default))
    }

    /// Read a text column, mapping SQL `NULL` to the empty string.
    pub fn text<I: ColumnRef>(&self, index: I) -> DbResult<String> {
        Ok(self.value::<String, _>(index)?.unwrap_or_default())
    }

    /// Read a text column, substituting `default` for SQL `NULL`.
    pub fn text_or<I: ColumnRef>(&self, index: I, default: &str) -> DbResult<String> {
        Ok(self
            .value::<String, _>(index)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// Read a timestamp column as UTC, mapping SQL `NULL` to `None`.
    ///
    /// Backends store timestamps without an offset; the stored instant is
    /// taken to be UTC.
    pub fn timestamp<I: ColumnRef>(&self, index: I) -> DbResult<Option<DateTime<Utc>>> {
        let value = self.value::<NaiveDateTime, _>(index)?;
        Ok(value.map(|naive| naive.and_utc()))
    }

    /// Read a timestamp column as UTC, substituting `default` for SQL `NULL`.
    pub fn timestamp_or<I: ColumnRef>(
        &self,
        index: I,
        default: DateTime<Utc>,
    ) -> DbResult<DateTime<Utc>> {
        Ok(self.timestamp(index)?.unwrap_or(default))
    }
}

impl fmt::Debug for DbRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backend = match self {
            Self::Postgres(_) => "Postgres",
            Self::MySql(_) => "MySql",
            Self::Sqlite(_) => "Sqlite",
        };
        f.debug_struct("DbRow")
            .field("backend", &backend)
            .field("columns", &self.len())
            .finish()
    }
}
