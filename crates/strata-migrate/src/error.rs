//! Error types for the migration system.

use std::path::PathBuf;

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The revision graph contains a cycle.
    #[error("Circular dependency detected in revisions")]
    CircularDependency,

    /// Two scripts declare the same revision id.
    #[error("Revision '{0}' is defined more than once")]
    DuplicateRevision(String),

    /// A revision points to a parent that is not in the script set.
    #[error("Revision '{revision}' revises '{parent}' which doesn't exist")]
    MissingParent {
        /// The revision with the dangling pointer.
        revision: String,
        /// The parent that's missing.
        parent: String,
    },

    /// `head` was requested but history has several heads.
    #[error("Multiple heads are present ({}); specify a revision", .0.join(", "))]
    MultipleHeads(Vec<String>),

    /// A revision prefix matched more than one revision.
    #[error("Revision '{prefix}' is ambiguous, it matches: {}", .candidates.join(", "))]
    AmbiguousRevision {
        /// The identifier given by the caller.
        prefix: String,
        /// Every revision it matched.
        candidates: Vec<String>,
    },

    /// No revision matches the given identifier.
    #[error("No such revision: '{0}'")]
    RevisionNotFound(String),

    /// The lower bound of a range is not an ancestor of the upper bound.
    #[error("Revision '{lower}' is not an ancestor of revision '{upper}'")]
    RangeNotAncestor {
        /// Lower bound of the range.
        lower: String,
        /// Upper bound of the range.
        upper: String,
    },

    /// An operation was reversed without the snapshot it needs.
    #[error("Operation is not reversible: {0}")]
    Irreversible(String),

    /// The bound engine cannot perform an operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A schema object with this name already exists.
    #[error("{kind} '{name}' already exists")]
    DuplicateName {
        /// Object kind ("table", "column", ...).
        kind: &'static str,
        /// Qualified object name.
        name: String,
    },

    /// A schema object with this name doesn't exist.
    #[error("{kind} '{name}' does not exist")]
    UnknownName {
        /// Object kind ("table", "column", ...).
        kind: &'static str,
        /// Qualified object name.
        name: String,
    },

    /// A column type string couldn't be understood.
    #[error("Invalid column type '{0}'")]
    InvalidType(String),

    /// Database error during migration execution.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading/writing migration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a revision script.
    #[error("Failed to parse migration file '{}': {message} at offset {offset}", .path.display())]
    Parse {
        /// Path to the script (empty for in-memory sources).
        path: PathBuf,
        /// Error message.
        message: String,
        /// Byte offset of the offending token.
        offset: usize,
    },

    /// Migration file already exists.
    #[error("Migration file already exists: {}", .0.display())]
    MigrationExists(PathBuf),

    /// No migrations directory found.
    #[error("Migrations directory not found: {}", .0.display())]
    MigrationsDirNotFound(PathBuf),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MigrateError {
    pub(crate) fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Self::DuplicateName {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn unknown(kind: &'static str, name: impl Into<String>) -> Self {
        Self::UnknownName {
            kind,
            name: name.into(),
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
