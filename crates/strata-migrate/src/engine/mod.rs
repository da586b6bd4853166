//! Execution engines.
//!
//! An [`Engine`] receives schema verbs from [`Operation::run`]. The
//! [`MetaEngine`] replays them into a [`Catalog`](crate::catalog::Catalog);
//! the [`SqlEngine`] renders dialect DDL for them.
//!
//! [`Operation::run`]: crate::operations::Operation::run

mod meta;
mod sql;

pub use meta::MetaEngine;
pub use sql::SqlEngine;

use crate::error::Result;
use crate::operations::ColumnChanges;
use crate::schema::{Column, ForeignKey, Index};

/// The verbs every operation dispatches into.
pub trait Engine {
    /// Creates a table.
    fn create_table(&mut self, table: &str, columns: &[Column]) -> Result<()>;

    /// Drops a table.
    fn drop_table(&mut self, table: &str) -> Result<()>;

    /// Adds a column.
    fn add_column(&mut self, table: &str, column: &Column) -> Result<()>;

    /// Drops a column.
    fn drop_column(&mut self, table: &str, column: &str) -> Result<()>;

    /// Alters a column from `existing` according to `modify`.
    fn alter_column(
        &mut self,
        table: &str,
        column: &str,
        modify: &ColumnChanges,
        existing: &ColumnChanges,
    ) -> Result<()>;

    /// Creates an index.
    fn create_index(&mut self, index: &Index) -> Result<()>;

    /// Drops an index.
    fn drop_index(&mut self, table: &str, name: &str) -> Result<()>;

    /// Adds a foreign key constraint.
    fn create_foreign_key_constraint(&mut self, foreign_key: &ForeignKey) -> Result<()>;

    /// Drops a foreign key constraint.
    fn drop_foreign_key_constraint(&mut self, table: &str, name: &str) -> Result<()>;
}
