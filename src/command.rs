//! Command value objects and parameter binding.
//!
//! A [`Command`] is a stateless unit of SQL text (or a stored-procedure name)
//! plus positional parameters, constructed per call by the caller. The session
//! attaches the connection and transaction; the command owns neither.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Postgres, Sqlite};

use crate::error::{DbError, DbResult};

/// A positional parameter value for parameterized commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    /// SQL NULL
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    Text(String),
    /// Timestamp, bound as a naive wall-clock value in UTC
    Timestamp(DateTime<Utc>),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl SqlParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl From<bool> for SqlParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for SqlParam {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SqlParam {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DateTime<Utc>> for SqlParam {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Vec<u8>> for SqlParam {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// `None` binds as SQL NULL.
impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlParam::Null)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// The statement category of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Plain SQL text.
    #[default]
    Text,
    /// A stored-procedure name; the backend builds the `CALL` statement.
    Procedure,
}

/// SQL text plus positional parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    sql: String,
    #[serde(default)]
    params: Vec<SqlParam>,
    #[serde(default)]
    kind: CommandKind,
}

impl Command {
    /// Create a plain SQL command.
    pub fn text(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            kind: CommandKind::Text,
        }
    }

    /// Create a stored-procedure command from the procedure name.
    pub fn procedure(name: impl Into<String>) -> Self {
        Self {
            sql: name.into(),
            params: Vec::new(),
            kind: CommandKind::Procedure,
        }
    }

    /// Append a positional parameter.
    pub fn bind(mut self, param: impl Into<SqlParam>) -> Self {
        self.params.push(param.into());
        self
    }

    /// The SQL text, or the procedure name for [`CommandKind::Procedure`].
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The bound positional parameters.
    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Reject the empty command, the closest Rust can come to the "command
    /// must not be absent" contract.
    pub(crate) fn validate(&self) -> DbResult<()> {
        if self.sql.trim().is_empty() {
            return Err(DbError::invalid_command("command text cannot be empty"));
        }
        Ok(())
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q SqlParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        SqlParam::Null => query.bind(None::<String>),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.as_str()),
        SqlParam::Timestamp(v) => query.bind(v.naive_utc()),
        SqlParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q SqlParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        SqlParam::Null => query.bind(None::<String>),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.as_str()),
        SqlParam::Timestamp(v) => query.bind(v.naive_utc()),
        SqlParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q SqlParam,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        SqlParam::Null => query.bind(None::<String>),
        SqlParam::Bool(v) => query.bind(*v),
        SqlParam::Int(v) => query.bind(*v),
        SqlParam::Float(v) => query.bind(*v),
        SqlParam::Text(v) => query.bind(v.as_str()),
        SqlParam::Timestamp(v) => query.bind(v.naive_utc()),
        SqlParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_builder_collects_params() {
        let cmd = Command::text("INSERT INTO t (a, b, c) VALUES (?, ?, ?)")
            .bind("title")
            .bind(5i64)
            .bind(Option::<i64>::None);

        assert_eq!(cmd.kind(), CommandKind::Text);
        assert_eq!(cmd.params().len(), 3);
        assert_eq!(cmd.params()[0], SqlParam::Text("title".to_string()));
        assert_eq!(cmd.params()[1], SqlParam::Int(5));
        assert!(cmd.params()[2].is_null());
    }

    #[test]
    fn test_procedure_kind() {
        let cmd = Command::procedure("refresh_totals").bind(7i64);
        assert_eq!(cmd.kind(), CommandKind::Procedure);
        assert_eq!(cmd.sql(), "refresh_totals");
    }

    #[test]
    fn test_empty_text_rejected() {
        assert!(Command::text("").validate().is_err());
        assert!(Command::text("  \n ").validate().is_err());
        assert!(Command::text("SELECT 1").validate().is_ok());
    }

    #[test]
    fn test_option_conversions() {
        assert_eq!(SqlParam::from(Some(3i64)), SqlParam::Int(3));
        assert_eq!(SqlParam::from(Option::<String>::None), SqlParam::Null);

        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(SqlParam::from(Some(ts)), SqlParam::Timestamp(ts));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(SqlParam::Null.type_name(), "null");
        assert_eq!(SqlParam::Int(1).type_name(), "int");
        assert_eq!(SqlParam::Bytes(vec![1, 2]).type_name(), "bytes");
    }

    #[test]
    fn test_param_serialization() {
        let json = serde_json::to_value(SqlParam::Int(42)).unwrap();
        assert_eq!(json, serde_json::json!(42));

        let json = serde_json::to_value(SqlParam::Null).unwrap();
        assert_eq!(json, serde_json::Value::Null);

        // bytes serialize as base64
        let json = serde_json::to_value(SqlParam::Bytes(b"hello".to_vec())).unwrap();
        assert_eq!(json, serde_json::json!("aGVsbG8="));
    }
}
