//! A single revision of the schema.

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::Result;
use crate::operations::{DowngradeOps, UpgradeOps};

/// Format of creation timestamps in revision scripts.
pub const CREATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Returns a fresh revision id: the last 12 hex digits of a v4 UUID.
#[must_use]
pub fn new_revision_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[hex.len() - 12..].to_string()
}

/// One revision: an identified pair of upgrade and downgrade operations.
#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    /// Revision id.
    pub revision: String,
    /// Parent revisions (empty for a base revision).
    pub revises: Vec<String>,
    /// Human-readable message.
    pub message: String,
    /// When the revision was generated.
    pub created: Option<NaiveDateTime>,
    /// Operations that apply the revision.
    pub upgrade: UpgradeOps,
    /// Operations that undo the revision.
    pub downgrade: DowngradeOps,
}

impl Migration {
    /// Creates a new migration.
    #[must_use]
    pub fn new(
        revision: impl Into<String>,
        revises: Vec<String>,
        message: impl Into<String>,
        upgrade: UpgradeOps,
        downgrade: DowngradeOps,
    ) -> Self {
        Self {
            revision: revision.into(),
            revises,
            message: message.into(),
            created: None,
            upgrade,
            downgrade,
        }
    }

    /// Sets the creation timestamp.
    #[must_use]
    pub const fn created(mut self, created: NaiveDateTime) -> Self {
        self.created = Some(created);
        self
    }

    /// Runs the upgrade operations against an engine.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first failing operation's error.
    pub fn up(&self, engine: &mut dyn Engine) -> Result<()> {
        for op in &self.upgrade.ops {
            op.run(engine)?;
        }
        Ok(())
    }

    /// Runs the downgrade operations against an engine.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first failing operation's error.
    pub fn down(&self, engine: &mut dyn Engine) -> Result<()> {
        for op in &self.downgrade.ops {
            op.run(engine)?;
        }
        Ok(())
    }

    /// Returns true if the migration has no parent.
    #[must_use]
    pub fn is_base(&self) -> bool {
        self.revises.is_empty()
    }

    /// Returns true if the migration joins several branches.
    #[must_use]
    pub fn is_merge(&self) -> bool {
        self.revises.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::engine::MetaEngine;
    use crate::operations::Operation;
    use crate::schema::Column;

    #[test]
    fn test_revision_id_shape() {
        let id = new_revision_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(id, new_revision_id());
    }

    #[test]
    fn test_up_then_down() {
        let upgrade = UpgradeOps::new(vec![Operation::create_table(
            "things",
            vec![Column::new("id", "id")],
        )]);
        let downgrade = upgrade.reverse().unwrap();
        let migration = Migration::new("a1", vec![], "create things", upgrade, downgrade);
        assert!(migration.is_base());

        let mut catalog = Catalog::new();
        migration.up(&mut MetaEngine::new(&mut catalog)).unwrap();
        assert!(catalog.get_table("things").is_some());
        migration.down(&mut MetaEngine::new(&mut catalog)).unwrap();
        assert!(catalog.tables().is_empty());
    }

    #[test]
    fn test_failing_operation_stops_up() {
        let upgrade = UpgradeOps::new(vec![
            Operation::drop_table("missing"),
            Operation::create_table("things", vec![Column::new("id", "id")]),
        ]);
        let migration = Migration::new("a1", vec![], "broken", upgrade, DowngradeOps::default());
        let mut catalog = Catalog::new();
        assert!(migration.up(&mut MetaEngine::new(&mut catalog)).is_err());
        assert!(catalog.get_table("things").is_none());
    }
}
