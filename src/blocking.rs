//! A synchronous session for callers without an async runtime.
//!
//! [`Session`] wraps the async [`crate::Session`] in an owned
//! single-threaded runtime and blocks on every call. Do not use it from
//! inside an async runtime; blocking there deadlocks the executor. Async
//! callers use [`crate::Session`] directly.

use crate::backend::IsolationLevel;
use crate::command::Command;
use crate::config::SessionConfig;
use crate::error::{DbError, DbResult};
use crate::row::DbRow;

/// Blocking counterpart of [`crate::Session`], with the same lifecycle and
/// execution surface.
#[derive(Debug)]
pub struct Session {
    inner: crate::Session,
    runtime: tokio::runtime::Runtime,
}

impl Session {
    /// Create a blocking session from a validated configuration.
    pub fn new(config: SessionConfig) -> DbResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DbError::configuration(format!("failed to build runtime: {e}")))?;
        Ok(Self {
            inner: crate::Session::new(config),
            runtime,
        })
    }

    /// Create a blocking session straight from a connection string.
    pub fn connect_lazy(connection_string: impl Into<String>) -> DbResult<Self> {
        Self::new(SessionConfig::new(connection_string)?)
    }

    pub fn config(&self) -> &SessionConfig {
        self.inner.config()
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    pub fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    /// See [`crate::Session::open_connection`].
    pub fn open_connection(&mut self) -> DbResult<()> {
        self.runtime.block_on(self.inner.open_connection())
    }

    /// See [`crate::Session::close_connection`].
    pub fn close_connection(&mut self) {
        self.runtime.block_on(self.inner.close_connection())
    }

    /// See [`crate::Session::begin_transaction`].
    pub fn begin_transaction(&mut self, level: Option<IsolationLevel>) -> DbResult<()> {
        self.runtime.block_on(self.inner.begin_transaction(level))
    }

    /// See [`crate::Session::commit_transaction`].
    pub fn commit_transaction(&mut self) -> DbResult<()> {
        self.runtime.block_on(self.inner.commit_transaction())
    }

    /// See [`crate::Session::rollback_transaction`].
    pub fn rollback_transaction(&mut self) -> DbResult<()> {
        self.runtime.block_on(self.inner.rollback_transaction())
    }

    /// See [`crate::Session::execute_select`].
    pub fn execute_select(&mut self, command: &Command) -> DbResult<Vec<DbRow>> {
        self.runtime.block_on(self.inner.execute_select(command))
    }

    /// See [`crate::Session::execute_insert`].
    pub fn execute_insert(&mut self, command: &Command) -> DbResult<i64> {
        self.runtime.block_on(self.inner.execute_insert(command))
    }

    /// See [`crate::Session::execute_adjust`].
    pub fn execute_adjust(&mut self, command: &Command) -> DbResult<u64> {
        self.runtime.block_on(self.inner.execute_adjust(command))
    }

    /// See [`crate::Session::execute_procedure`].
    pub fn execute_procedure(&mut self, command: &Command) -> DbResult<Vec<DbRow>> {
        self.runtime.block_on(self.inner.execute_procedure(command))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.runtime.block_on(self.inner.close_connection());
    }
}
