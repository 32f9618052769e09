//! Backend adapter layer.
//!
//! This module binds the generic session to one concrete sqlx driver family,
//! selected at construction from the connection string scheme. [`DbPool`] and
//! [`DbTransaction`] are database-specific wrappers so the rest of the crate
//! speaks one vocabulary regardless of vendor.

use crate::command::{SqlParam, bind_mysql, bind_postgres, bind_sqlite};
use crate::config::SessionConfig;
use crate::error::{DbError, DbResult};
use crate::row::DbRow;
use futures_util::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{MySql, MySqlPool, PgPool, Postgres, Sqlite, SqlitePool, Transaction};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Postgres,
    /// Includes MariaDB
    MySql,
    Sqlite,
}

impl Backend {
    /// Detect the backend from a connection string scheme.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySql)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else {
            None
        }
    }

    /// Get the display name for this backend.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::MySql => "MySQL",
            Self::Sqlite => "SQLite",
        }
    }

    /// Build the `CALL` statement for a stored procedure with `argc`
    /// positional arguments.
    pub(crate) fn call_statement(&self, name: &str, argc: usize) -> DbResult<String> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        {
            return Err(DbError::invalid_command(format!(
                "invalid procedure name: {name:?}"
            )));
        }
        let placeholders: Vec<String> = match self {
            Self::Postgres => (1..=argc).map(|i| format!("${i}")).collect(),
            Self::MySql => (0..argc).map(|_| "?".to_string()).collect(),
            Self::Sqlite => {
                return Err(DbError::unsupported(
                    "SQLite does not support stored procedures",
                ));
            }
        };
        Ok(format!("CALL {}({})", name, placeholders.join(", ")))
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Concurrency-control strictness for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// Bind every parameter of a command to a query, in order.
macro_rules! bind_all {
    ($query:expr, $params:expr, $bind:path) => {{
        let mut query = $query;
        for param in $params {
            query = $bind(query, param);
        }
        query
    }};
}

/// Database-specific single-session pool.
///
/// Built with `max_connections(1)`: a session owns exactly one network
/// session to one database, per the concurrency model.
#[derive(Debug, Clone)]
pub enum DbPool {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

impl DbPool {
    /// Establish the network session. Driver connect errors propagate.
    pub(crate) async fn connect(config: &SessionConfig) -> DbResult<Self> {
        let acquire_timeout = config.acquire_timeout();
        match config.backend() {
            Backend::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(acquire_timeout)
                    .connect(config.connection_string())
                    .await?;
                Ok(Self::Postgres(pool))
            }
            Backend::MySql => {
                let options =
                    MySqlConnectOptions::from_str(config.connection_string())?.charset("utf8mb4");
                let pool = MySqlPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(acquire_timeout)
                    .connect_with(options)
                    .await?;
                Ok(Self::MySql(pool))
            }
            Backend::Sqlite => {
                let options = SqliteConnectOptions::from_str(config.connection_string())?
                    .create_if_missing(true);
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(acquire_timeout)
                    .connect_with(options)
                    .await?;
                Ok(Self::Sqlite(pool))
            }
        }
    }

    /// Get the backend for this pool.
    pub fn backend(&self) -> Backend {
        match self {
            Self::Postgres(_) => Backend::Postgres,
            Self::MySql(_) => Backend::MySql,
            Self::Sqlite(_) => Backend::Sqlite,
        }
    }

    /// Close the network session.
    pub(crate) async fn close(&self) {
        match self {
            Self::Postgres(pool) => pool.close().await,
            Self::MySql(pool) => pool.close().await,
            Self::Sqlite(pool) => pool.close().await,
        }
    }

    /// Start a transaction, applying the isolation level where the backend
    /// supports one.
    pub(crate) async fn begin(&self, level: Option<IsolationLevel>) -> DbResult<DbTransaction> {
        match self {
            Self::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                if let Some(level) = level {
                    // must be the first statement of the transaction
                    sqlx::query(&format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql()))
                        .execute(&mut *tx)
                        .await?;
                }
                Ok(DbTransaction::Postgres(tx))
            }
            Self::MySql(pool) => {
                if let Some(level) = level {
                    // MySQL scopes SET TRANSACTION to the next transaction
                    // started on the connection; the pool is pinned to one.
                    sqlx::query(&format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql()))
                        .execute(pool)
                        .await?;
                }
                Ok(DbTransaction::MySql(pool.begin().await?))
            }
            Self::Sqlite(pool) => {
                if let Some(level) = level {
                    debug!(level = %level, "isolation level ignored on SQLite");
                }
                Ok(DbTransaction::Sqlite(pool.begin().await?))
            }
        }
    }

    /// Execute a statement and materialize the cursor.
    pub(crate) async fn fetch_all(&self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<DbRow>> {
        match self {
            Self::Postgres(pool) => {
                let query = bind_all!(sqlx::query(sql), params, bind_postgres);
                let rows: Vec<sqlx::postgres::PgRow> = query.fetch(pool).try_collect().await?;
                Ok(rows.into_iter().map(DbRow::Postgres).collect())
            }
            Self::MySql(pool) => {
                let query = bind_all!(sqlx::query(sql), params, bind_mysql);
                let rows: Vec<sqlx::mysql::MySqlRow> = query.fetch(pool).try_collect().await?;
                Ok(rows.into_iter().map(DbRow::MySql).collect())
            }
            Self::Sqlite(pool) => {
                let query = bind_all!(sqlx::query(sql), params, bind_sqlite);
                let rows: Vec<sqlx::sqlite::SqliteRow> = query.fetch(pool).try_collect().await?;
                Ok(rows.into_iter().map(DbRow::Sqlite).collect())
            }
        }
    }

    /// Execute a scalar statement, reading the first column of the first row
    /// as a generated identifier.
    pub(crate) async fn fetch_identity(
        &self,
        sql: &str,
        params: &[SqlParam],
    ) -> DbResult<Option<i64>> {
        let row = match self {
            Self::Postgres(pool) => {
                let query = bind_all!(sqlx::query(sql), params, bind_postgres);
                query.fetch_optional(pool).await?.map(DbRow::Postgres)
            }
            Self::MySql(pool) => {
                let query = bind_all!(sqlx::query(sql), params, bind_mysql);
                query.fetch_optional(pool).await?.map(DbRow::MySql)
            }
            Self::Sqlite(pool) => {
                let query = bind_all!(sqlx::query(sql), params, bind_sqlite);
                query.fetch_optional(pool).await?.map(DbRow::Sqlite)
            }
        };
        identity_from(row)
    }

    /// Execute a non-query statement, returning the affected-row count.
    pub(crate) async fn execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<u64> {
        let rows_affected = match self {
            Self::Postgres(pool) => {
                let query = bind_all!(sqlx::query(sql), params, bind_postgres);
                query.execute(pool).await?.rows_affected()
            }
            Self::MySql(pool) => {
                let query = bind_all!(sqlx::query(sql), params, bind_mysql);
                query.execute(pool).await?.rows_affected()
            }
            Self::Sqlite(pool) => {
                let query = bind_all!(sqlx::query(sql), params, bind_sqlite);
                query.execute(pool).await?.rows_affected()
            }
        };
        Ok(rows_affected)
    }
}

/// Database-specific transaction wrapper.
pub enum DbTransaction {
    Postgres(Transaction<'static, Postgres>),
    MySql(Transaction<'static, MySql>),
    Sqlite(Transaction<'static, Sqlite>),
}

impl DbTransaction {
    /// Get the backend for this transaction.
    pub fn backend(&self) -> Backend {
        match self {
            Self::Postgres(_) => Backend::Postgres,
            Self::MySql(_) => Backend::MySql,
            Self::Sqlite(_) => Backend::Sqlite,
        }
    }

    /// Commit the transaction.
    pub(crate) async fn commit(self) -> DbResult<()> {
        match self {
            Self::Postgres(tx) => tx.commit().await.map_err(DbError::from),
            Self::MySql(tx) => tx.commit().await.map_err(DbError::from),
            Self::Sqlite(tx) => tx.commit().await.map_err(DbError::from),
        }
    }

    /// Roll back the transaction.
    pub(crate) async fn rollback(self) -> DbResult<()> {
        match self {
            Self::Postgres(tx) => tx.rollback().await.map_err(DbError::from),
            Self::MySql(tx) => tx.rollback().await.map_err(DbError::from),
            Self::Sqlite(tx) => tx.rollback().await.map_err(DbError::from),
        }
    }

    /// Execute a statement inside the transaction and materialize the cursor.
    pub(crate) async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> DbResult<Vec<DbRow>> {
        match self {
            Self::Postgres(tx) => {
                let query = bind_all!(sqlx::query(sql), params, bind_postgres);
                let rows: Vec<sqlx::postgres::PgRow> = query.fetch(&mut **tx).try_collect().await?;
                Ok(rows.into_iter().map(DbRow::Postgres).collect())
            }
            Self::MySql(tx) => {
                let query = bind_all!(sqlx::query(sql), params, bind_mysql);
                let rows: Vec<sqlx::mysql::MySqlRow> = query.fetch(&mut **tx).try_collect().await?;
                Ok(rows.into_iter().map(DbRow::MySql).collect())
            }
            Self::Sqlite(tx) => {
                let query = bind_all!(sqlx::query(sql), params, bind_sqlite);
                let rows: Vec<sqlx::sqlite::SqliteRow> =
                    query.fetch(&mut **tx).try_collect().await?;
                Ok(rows.into_iter().map(DbRow::Sqlite).collect())
            }
        }
    }

    /// Scalar execution inside the transaction.
    pub(crate) async fn fetch_identity(
        &mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> DbResult<Option<i64>> {
        let row = match self {
            Self::Postgres(tx) => {
                let query = bind_all!(sqlx::query(sql), params, bind_postgres);
                query.fetch_optional(&mut **tx).await?.map(DbRow::Postgres)
            }
            Self::MySql(tx) => {
                let query = bind_all!(sqlx::query(sql), params, bind_mysql);
                query.fetch_optional(&mut **tx).await?.map(DbRow::MySql)
            }
            Self::Sqlite(tx) => {
                let query = bind_all!(sqlx::query(sql), params, bind_sqlite);
                query.fetch_optional(&mut **tx).await?.map(DbRow::Sqlite)
            }
        };
        identity_from(row)
    }

    /// Non-query execution inside the transaction.
    pub(crate) async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> DbResult<u64> {
        let rows_affected = match self {
            Self::Postgres(tx) => {
                let query = bind_all!(sqlx::query(sql), params, bind_postgres);
                query.execute(&mut **tx).await?.rows_affected()
            }
            Self::MySql(tx) => {
                let query = bind_all!(sqlx::query(sql), params, bind_mysql);
                query.execute(&mut **tx).await?.rows_affected()
            }
            Self::Sqlite(tx) => {
                let query = bind_all!(sqlx::query(sql), params, bind_sqlite);
                query.execute(&mut **tx).await?.rows_affected()
            }
        };
        Ok(rows_affected)
    }
}

impl fmt::Debug for DbTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DbTransaction")
            .field(&self.backend())
            .finish()
    }
}

/// A scalar result with a NULL first column means "no identifier produced".
fn identity_from(row: Option<DbRow>) -> DbResult<Option<i64>> {
    match row {
        Some(row) => row.value::<i64, _>(0),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_connection_string() {
        assert_eq!(
            Backend::from_connection_string("postgres://u:p@h:5432/db"),
            Some(Backend::Postgres)
        );
        assert_eq!(
            Backend::from_connection_string("postgresql://u:p@h/db"),
            Some(Backend::Postgres)
        );
        assert_eq!(
            Backend::from_connection_string("mysql://u:p@h:3306/db"),
            Some(Backend::MySql)
        );
        assert_eq!(
            Backend::from_connection_string("mariadb://u:p@h/db"),
            Some(Backend::MySql)
        );
        assert_eq!(
            Backend::from_connection_string("sqlite:app.db"),
            Some(Backend::Sqlite)
        );
        assert_eq!(
            Backend::from_connection_string("sqlite://app.db"),
            Some(Backend::Sqlite)
        );
        assert_eq!(Backend::from_connection_string("redis://h"), None);
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(Backend::Postgres.to_string(), "PostgreSQL");
        assert_eq!(Backend::MySql.to_string(), "MySQL");
        assert_eq!(Backend::Sqlite.to_string(), "SQLite");
    }

    #[test]
    fn test_isolation_level_sql() {
        assert_eq!(IsolationLevel::ReadCommitted.as_sql(), "READ COMMITTED");
        assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
        assert_eq!(IsolationLevel::RepeatableRead.to_string(), "REPEATABLE READ");
    }

    #[test]
    fn test_call_statement_postgres() {
        let sql = Backend::Postgres.call_statement("refresh_totals", 2).unwrap();
        assert_eq!(sql, "CALL refresh_totals($1, $2)");

        let sql = Backend::Postgres.call_statement("noop", 0).unwrap();
        assert_eq!(sql, "CALL noop()");
    }

    #[test]
    fn test_call_statement_mysql() {
        let sql = Backend::MySql.call_statement("refresh_totals", 3).unwrap();
        assert_eq!(sql, "CALL refresh_totals(?, ?, ?)");
    }

    #[test]
    fn test_call_statement_sqlite_unsupported() {
        let err = Backend::Sqlite.call_statement("anything", 1).unwrap_err();
        assert!(matches!(err, DbError::Unsupported { .. }));
    }

    #[test]
    fn test_call_statement_rejects_injection() {
        let err = Backend::Postgres
            .call_statement("p; DROP TABLE t", 0)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidCommand { .. }));

        let err = Backend::Postgres.call_statement("", 0).unwrap_err();
        assert!(matches!(err, DbError::InvalidCommand { .. }));
    }
}
