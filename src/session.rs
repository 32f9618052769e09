//! Connection lifecycle, transaction control, and command execution.

use crate::backend::{DbPool, DbTransaction, IsolationLevel};
use crate::command::{Command, CommandKind};
use crate::config::SessionConfig;
use crate::error::{DbError, DbResult};
use crate::row::DbRow;
use std::borrow::Cow;
use tracing::{debug, info, warn};

/// Identity sentinel returned by [`Session::execute_insert`] when the insert
/// produces no generated identifier.
pub const NO_IDENTITY: i64 = -1;

/// A stateful handle to one database.
///
/// The session owns at most one network session (opened lazily, reopened
/// after close) and at most one transaction at a time. It is not meant to be
/// shared across tasks; give each task its own session.
///
/// Reads outside a transaction close the network session once the rows are
/// materialized. Writes leave it open so a sequence of inserts reuses one
/// session.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    pool: Option<DbPool>,
    tx: Option<DbTransaction>,
}

impl Session {
    /// Create a session from a validated configuration. No network activity
    /// happens until the first operation.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            pool: None,
            tx: None,
        }
    }

    /// Create a session straight from a connection string, with defaults for
    /// everything else.
    pub fn connect_lazy(connection_string: impl Into<String>) -> DbResult<Self> {
        Ok(Self::new(SessionConfig::new(connection_string)?))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether the network session is currently established.
    pub fn is_open(&self) -> bool {
        self.pool.is_some()
    }

    /// Whether a transaction is currently active.
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Get the established session, opening it if necessary.
    async fn attach(&mut self) -> DbResult<DbPool> {
        if let Some(pool) = &self.pool {
            return Ok(pool.clone());
        }
        let pool = DbPool::connect(&self.config).await?;
        info!(
            backend = %self.config.backend(),
            url = %self.config.masked_connection_string(),
            "database session opened"
        );
        self.pool = Some(pool.clone());
        Ok(pool)
    }

    /// Open the network session. Opening an already-open session is a no-op.
    pub async fn open_connection(&mut self) -> DbResult<()> {
        self.attach().await.map(drop)
    }

    /// Close the network session. Closing a closed session is a no-op.
    ///
    /// An in-flight transaction is rolled back first; its work is discarded.
    pub async fn close_connection(&mut self) {
        if let Some(tx) = self.tx.take() {
            warn!("closing session with an active transaction, rolling back");
            if let Err(error) = tx.rollback().await {
                warn!(%error, "rollback during close failed");
            }
        }
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!(backend = %self.config.backend(), "database session closed");
        }
    }

    /// Start a transaction, opening the session first if needed.
    ///
    /// `level` overrides the configured default isolation for this
    /// transaction only. A transaction left over from a previous `begin` is
    /// rolled back before the new one starts.
    pub async fn begin_transaction(&mut self, level: Option<IsolationLevel>) -> DbResult<()> {
        if let Some(stale) = self.tx.take() {
            warn!("beginning a transaction while one is active, rolling back the old one");
            stale.rollback().await?;
        }
        let pool = self.attach().await?;
        let level = level.or(self.config.default_isolation());
        let tx = pool.begin(level).await?;
        debug!(backend = %pool.backend(), isolation = ?level, "transaction started");
        self.tx = Some(tx);
        Ok(())
    }

    /// Commit the active transaction and close the network session.
    ///
    /// Errors with [`DbError::Transaction`] when no transaction is active.
    pub async fn commit_transaction(&mut self) -> DbResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DbError::transaction("no active transaction to commit"))?;
        tx.commit().await?;
        debug!("transaction committed");
        self.close_connection().await;
        Ok(())
    }

    /// Roll back the active transaction and close the network session.
    ///
    /// Tolerates the absence of a transaction: the session is closed either
    /// way and no error is raised.
    pub async fn rollback_transaction(&mut self) -> DbResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
            debug!("transaction rolled back");
        }
        self.close_connection().await;
        Ok(())
    }

    /// Run a row-returning command and materialize every row.
    ///
    /// Outside a transaction the network session is closed once the rows are
    /// read, so one-shot queries do not pin a session.
    pub async fn execute_select(&mut self, command: &Command) -> DbResult<Vec<DbRow>> {
        command.validate()?;
        let sql = self.statement_for(command)?;
        debug!(kind = ?command.kind(), params = command.params().len(), "executing select");
        if let Some(tx) = &mut self.tx {
            return tx.fetch_all(&sql, command.params()).await;
        }
        let pool = self.attach().await?;
        let rows = pool.fetch_all(&sql, command.params()).await?;
        self.close_connection().await;
        Ok(rows)
    }

    /// Run an insert and return the generated identifier, or [`NO_IDENTITY`]
    /// when the statement produces none.
    ///
    /// The statement must yield the identifier as its first result column
    /// (`RETURNING id` or an equivalent). The network session stays open so
    /// consecutive inserts reuse it.
    pub async fn execute_insert(&mut self, command: &Command) -> DbResult<i64> {
        command.validate()?;
        let sql = self.statement_for(command)?;
        debug!(kind = ?command.kind(), params = command.params().len(), "executing insert");
        let identity = if let Some(tx) = &mut self.tx {
            tx.fetch_identity(&sql, command.params()).await?
        } else {
            let pool = self.attach().await?;
            pool.fetch_identity(&sql, command.params()).await?
        };
        Ok(identity.unwrap_or(NO_IDENTITY))
    }

    /// Run an update or delete and return the affected-row count. The network
    /// session stays open.
    pub async fn execute_adjust(&mut self, command: &Command) -> DbResult<u64> {
        command.validate()?;
        let sql = self.statement_for(command)?;
        debug!(kind = ?command.kind(), params = command.params().len(), "executing adjust");
        if let Some(tx) = &mut self.tx {
            return tx.execute(&sql, command.params()).await;
        }
        let pool = self.attach().await?;
        pool.execute(&sql, command.params()).await
    }

    /// Invoke a stored procedure, materializing any rows it returns. The
    /// command text is the procedure name; parameters are passed positionally.
    ///
    /// Closes the network session after the call when no transaction is
    /// active, like [`execute_select`](Self::execute_select).
    pub async fn execute_procedure(&mut self, command: &Command) -> DbResult<Vec<DbRow>> {
        command.validate()?;
        let sql = self
            .config
            .backend()
            .call_statement(command.sql(), command.params().len())?;
        debug!(procedure = command.sql(), params = command.params().len(), "executing procedure");
        if let Some(tx) = &mut self.tx {
            return tx.fetch_all(&sql, command.params()).await;
        }
        let pool = self.attach().await?;
        let rows = pool.fetch_all(&sql, command.params()).await?;
        self.close_connection().await;
        Ok(rows)
    }

    /// Resolve the SQL actually sent for a command: the text itself, or a
    /// backend-specific `CALL` statement for procedures.
    fn statement_for<'c>(&self, command: &'c Command) -> DbResult<Cow<'c, str>> {
        match command.kind() {
            CommandKind::Text => Ok(Cow::Borrowed(command.sql())),
            CommandKind::Procedure => Ok(Cow::Owned(
                self.config
                    .backend()
                    .call_statement(command.sql(), command.params().len())?,
            )),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Transactions roll back on drop inside sqlx. The pool is detached to
        // a background close when a runtime is still available; otherwise the
        // session ends with the process.
        drop(self.tx.take());
        if let Some(pool) = self.pool.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move { pool.close().await });
            }
        }
    }
}
