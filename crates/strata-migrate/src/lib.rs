//! Reversible, autogenerated schema migrations.
//!
//! `strata-migrate` keeps a database schema in step with the schema an
//! application declares:
//! - Every operation knows how to undo itself
//! - New revisions are generated by diffing the declared schema against the
//!   schema rebuilt from revision history
//! - Revisions form a graph, so branches and merges are supported
//! - SQL generation is dialect-aware (SQLite, PostgreSQL, MySQL, Oracle)
//!
//! # Architecture
//!
//! - **Schema** - Tables, columns, indexes and the live schema feed
//! - **Catalog** - The schema as of some revision, rebuilt in memory
//! - **Operations** - Reversible schema changes grouped per revision
//! - **Comparator** - Diffs the live schema against a catalog
//! - **Revisions** - The revision graph, name resolution and paths
//! - **Engines** - Apply operations to a catalog or render them as SQL
//! - **Scripts** - Revision files on disk
//! - **Executor** - Runs revisions against a database, tracking the ledger
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_migrate::prelude::*;
//!
//! let live = Schema::new().table(
//!     Table::new("users")
//!         .column(Column::new("id", "id"))
//!         .column(Column::new("email", "string").length(255).notnull().unique()),
//! );
//!
//! let scripts = ScriptDir::open("migrations")?;
//! let revisions = scripts.revision_map()?;
//! let migration = Generator::new(&revisions).generate_migration(&live, "add users", "head")?;
//! scripts.write(&migration)?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Generate a revision from schema changes
//! strata-migrate --schema schema.json generate -m "add users"
//!
//! # Apply every pending revision
//! strata-migrate up
//!
//! # Undo everything
//! strata-migrate down base
//! ```

pub mod catalog;
pub mod comparator;
pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod executor;
pub mod generator;
pub mod history;
pub mod migration;
pub mod operations;
pub mod revision;
pub mod schema;
pub mod script;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::catalog::Catalog;
    pub use crate::comparator::Comparator;
    pub use crate::config::MigrateConfig;
    pub use crate::dialect::{
        dialect_for_url, MigrationDialect, MysqlDialect, OracleDialect, PostgresDialect,
        SqliteDialect,
    };
    pub use crate::engine::{Engine, MetaEngine, SqlEngine};
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::{plan, Direction, MigrationReport, Migrator};
    pub use crate::generator::Generator;
    pub use crate::history::RevisionLedger;
    pub use crate::migration::Migration;
    pub use crate::operations::{
        ColumnChanges, ColumnDelta, DiffTuple, DowngradeOps, Operation, UpgradeOps,
    };
    pub use crate::revision::{LedgerTransition, RevisionMap};
    pub use crate::schema::{
        Column, ColumnType, DefaultValue, Delta, ForeignKey, Index, Schema, Table,
    };
    pub use crate::script::ScriptDir;
}
