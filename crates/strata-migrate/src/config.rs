//! Runtime configuration.

use std::path::PathBuf;

use crate::dialect::{dialect_for_url, MigrationDialect};
use crate::error::{MigrateError, Result};
use crate::history::DEFAULT_LEDGER_TABLE;
use crate::schema::Schema;
use crate::script::ScriptDir;

/// Default migrations directory.
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Settings shared by the library entry points and the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateConfig {
    /// Database connection string; its scheme selects the dialect.
    pub database_url: Option<String>,
    /// Directory holding revision scripts.
    pub migrations_dir: PathBuf,
    /// JSON file describing the live schema.
    pub schema: Option<PathBuf>,
    /// Name of the ledger table.
    pub ledger_table: String,
    /// Enables PostGIS column types on PostgreSQL.
    pub postgis: bool,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            schema: None,
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
            postgis: false,
        }
    }
}

impl MigrateConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the database URL.
    #[must_use]
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Sets the migrations directory.
    #[must_use]
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// Sets the live schema file.
    #[must_use]
    pub fn schema(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema = Some(path.into());
        self
    }

    /// Sets the ledger table name.
    #[must_use]
    pub fn ledger_table(mut self, table: impl Into<String>) -> Self {
        self.ledger_table = table.into();
        self
    }

    /// Enables or disables PostGIS types.
    #[must_use]
    pub const fn postgis(mut self, enabled: bool) -> Self {
        self.postgis = enabled;
        self
    }

    /// The database URL, required by commands that connect.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Unsupported`] when no URL is configured.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            MigrateError::Unsupported("no database URL configured (set DATABASE_URL)".to_string())
        })
    }

    /// Dialect for the configured database URL.
    ///
    /// # Errors
    ///
    /// Fails when no URL is configured or its scheme is unknown.
    pub fn dialect(&self) -> Result<Box<dyn MigrationDialect>> {
        dialect_for_url(self.require_database_url()?, self.postgis)
    }

    /// Opens the migrations directory.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MigrationsDirNotFound`] if it doesn't exist.
    pub fn scripts(&self) -> Result<ScriptDir> {
        ScriptDir::open(&self.migrations_dir)
    }

    /// Loads the live schema file.
    ///
    /// # Errors
    ///
    /// Fails when no schema file is configured or it cannot be parsed.
    pub fn live_schema(&self) -> Result<Schema> {
        let path = self.schema.as_ref().ok_or_else(|| {
            MigrateError::Unsupported("no live schema file configured (use --schema)".to_string())
        })?;
        Schema::from_json_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MigrateConfig::new();
        assert_eq!(config.migrations_dir, PathBuf::from("migrations"));
        assert_eq!(config.ledger_table, "strata_schema");
        assert!(matches!(
            config.dialect(),
            Err(MigrateError::Unsupported(_))
        ));
    }

    #[test]
    fn test_dialect_from_url() {
        let config = MigrateConfig::new()
            .database_url("postgres://localhost/app")
            .postgis(true);
        assert_eq!(config.dialect().unwrap().name(), "postgres");
        let config = config.database_url("mysql://localhost/app");
        assert_eq!(config.dialect().unwrap().name(), "mysql");
    }
}
