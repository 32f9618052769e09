//! Session-oriented database access over PostgreSQL, MySQL and SQLite.
//!
//! A [`Session`] owns one network session to one database, opened lazily and
//! reopened after close, with explicit transaction control and four
//! execution shapes: row-returning selects, identity-returning inserts,
//! count-returning adjustments, and stored procedure calls. [`DbRow`]
//! extraction helpers map SQL `NULL` to `Option` or a caller default instead
//! of failing.
//!
//! Synchronous callers use [`blocking::Session`], which carries its own
//! runtime.
//!
//! ```no_run
//! use db_session::{Command, Session};
//!
//! # async fn run() -> db_session::DbResult<()> {
//! let mut session = Session::connect_lazy("sqlite:app.db")?;
//!
//! session.begin_transaction(None).await?;
//! let id = session
//!     .execute_insert(
//!         &Command::text("INSERT INTO notes (title) VALUES (?) RETURNING id")
//!             .bind("first note"),
//!     )
//!     .await?;
//! session.commit_transaction().await?;
//!
//! let rows = session
//!     .execute_select(&Command::text("SELECT title FROM notes WHERE id = ?").bind(id))
//!     .await?;
//! for row in &rows {
//!     println!("{}", row.text("title")?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod blocking;
pub mod command;
pub mod config;
pub mod error;
pub mod row;
pub mod session;

pub use backend::{Backend, DbPool, DbTransaction, IsolationLevel};
pub use command::{Command, CommandKind, SqlParam};
pub use config::SessionConfig;
pub use error::{DbError, DbResult};
pub use row::{ColumnRef, DbRow, SqlDecode};
pub use session::{NO_IDENTITY, Session};
