//! Revision scripts on disk.
//!
//! Every migration lives in its own `<revision>_<slug>.mig` file inside a
//! migrations directory. Files are parsed with a small call-based language
//! (see [`parser`]) and written back with [`render`].

pub mod lexer;
pub mod parser;
pub mod render;
pub mod verbs;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::error::{MigrateError, Result};
use crate::migration::{Migration, CREATED_FORMAT};
use crate::operations::{DowngradeOps, UpgradeOps};
use crate::revision::RevisionMap;

use self::parser::{Assignment, Parser, Value};

pub use self::render::render;
pub use self::verbs::Verb;

/// File extension of revision scripts.
pub const SCRIPT_EXTENSION: &str = "mig";

/// Longest slug taken from a message when naming a script file.
const MAX_SLUG_LENGTH: usize = 40;

/// Parses the text of one revision script.
///
/// # Errors
///
/// Returns `MigrateError::Parse` (carrying `path` and a byte offset) for
/// malformed scripts and `MigrateError::InvalidType` for unknown column types.
pub fn parse_migration(source: &str, path: &Path) -> Result<Migration> {
    let document = Parser::new(source, path).parse_document()?;
    let error = |message: String, offset: usize| MigrateError::Parse {
        path: path.to_path_buf(),
        message,
        offset,
    };

    for assignment in &document.assignments {
        if !matches!(
            assignment.name.as_str(),
            "revision" | "revises" | "message" | "created"
        ) {
            return Err(error(
                format!("unknown setting '{}'", assignment.name),
                assignment.offset,
            ));
        }
    }

    let string = |assignment: &Assignment| match &assignment.value {
        Value::Str(s) => Ok(s.clone()),
        other => Err(error(
            format!("'{}' must be a string, found {}", assignment.name, other.kind()),
            assignment.offset,
        )),
    };

    let revision = document
        .get("revision")
        .ok_or_else(|| error("missing 'revision'".to_string(), 0))
        .and_then(string)?;

    let revises = match document.get("revises") {
        None => Vec::new(),
        Some(assignment) => match &assignment.value {
            Value::None => Vec::new(),
            Value::Str(parent) => vec![parent.clone()],
            Value::List(items) => items
                .iter()
                .map(|item| match item {
                    Value::Str(parent) => Ok(parent.clone()),
                    other => Err(error(
                        format!("'revises' entries must be strings, found {}", other.kind()),
                        assignment.offset,
                    )),
                })
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(error(
                    format!("'revises' must be none, a string or a list, found {}", other.kind()),
                    assignment.offset,
                ))
            }
        },
    };

    let message = document
        .get("message")
        .map(string)
        .transpose()?
        .unwrap_or_default();

    let created = match document.get("created") {
        None => None,
        Some(assignment) => {
            let text = string(assignment)?;
            Some(
                NaiveDateTime::parse_from_str(&text, CREATED_FORMAT).map_err(|e| {
                    error(format!("invalid 'created': {}", e), assignment.offset)
                })?,
            )
        }
    };

    let upgrade = document
        .up
        .iter()
        .map(|call| verbs::operation(call, path))
        .collect::<Result<Vec<_>>>()?;
    let downgrade = document
        .down
        .iter()
        .map(|call| verbs::operation(call, path))
        .collect::<Result<Vec<_>>>()?;

    let mut migration = Migration::new(
        revision,
        revises,
        message,
        UpgradeOps::new(upgrade),
        DowngradeOps::new(downgrade),
    );
    migration.created = created;
    Ok(migration)
}

/// Turns a message into a file-name friendly slug.
#[must_use]
pub fn slug(message: &str) -> String {
    let mut slug = String::new();
    for c in message.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.truncate(MAX_SLUG_LENGTH);
    slug.trim_end_matches('_').to_string()
}

/// A directory of revision scripts.
#[derive(Debug, Clone)]
pub struct ScriptDir {
    path: PathBuf,
}

impl ScriptDir {
    /// Opens an existing migrations directory.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MigrationsDirNotFound`] if `path` is not a directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_dir() {
            return Err(MigrateError::MigrationsDirNotFound(path));
        }
        Ok(Self { path })
    }

    /// Creates the migrations directory (and parents) if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path)?;
        info!(path = %path.display(), "Initialized migrations directory");
        Ok(Self { path })
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Script files in the directory, sorted by file name.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be read.
    pub fn script_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|e| e == SCRIPT_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Parses every script in the directory.
    ///
    /// # Errors
    ///
    /// Fails on the first unreadable or malformed script.
    pub fn load(&self) -> Result<Vec<Migration>> {
        let mut migrations = Vec::new();
        for path in self.script_paths()? {
            let source = fs::read_to_string(&path)?;
            let migration = parse_migration(&source, &path)?;
            debug!(revision = %migration.revision, path = %path.display(), "Loaded revision");
            migrations.push(migration);
        }
        Ok(migrations)
    }

    /// Parses every script and builds the revision graph.
    ///
    /// # Errors
    ///
    /// Fails on malformed scripts and on graph errors (duplicate ids,
    /// unknown parents, cycles).
    pub fn revision_map(&self) -> Result<RevisionMap> {
        RevisionMap::new(self.load()?)
    }

    /// File path a migration is written to.
    #[must_use]
    pub fn script_path(&self, migration: &Migration) -> PathBuf {
        let slug = slug(&migration.message);
        let name = if slug.is_empty() {
            format!("{}.{}", migration.revision, SCRIPT_EXTENSION)
        } else {
            format!("{}_{}.{}", migration.revision, slug, SCRIPT_EXTENSION)
        };
        self.path.join(name)
    }

    /// Renders and writes a migration to a new script file.
    ///
    /// The text is rendered before the file is created, and an existing file
    /// is never overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MigrationExists`] if the file already exists.
    pub fn write(&self, migration: &Migration) -> Result<PathBuf> {
        let text = render(migration);
        let path = self.script_path(migration);

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(MigrateError::MigrationExists(path));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(text.as_bytes())?;

        info!(revision = %migration.revision, path = %path.display(), "Wrote revision script");
        Ok(path)
    }
}
