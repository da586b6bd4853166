//! Autogeneration of migrations.
//!
//! The generator rebuilds the schema as of a revision by replaying every
//! ancestor's upgrade operations into an empty [`Catalog`], then compares
//! the live schema against it.

use chrono::Local;
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::comparator::Comparator;
use crate::engine::MetaEngine;
use crate::error::Result;
use crate::migration::{new_revision_id, Migration};
use crate::operations::{DowngradeOps, UpgradeOps};
use crate::revision::RevisionMap;
use crate::schema::Schema;

/// Builds new migrations on top of a revision graph.
pub struct Generator<'a> {
    revisions: &'a RevisionMap,
}

impl<'a> Generator<'a> {
    /// Creates a generator over `revisions`.
    #[must_use]
    pub const fn new(revisions: &'a RevisionMap) -> Self {
        Self { revisions }
    }

    /// Replays the history up to `head` into a fresh catalog.
    ///
    /// # Errors
    ///
    /// Fails if `head` doesn't resolve or a replayed operation conflicts
    /// with the catalog.
    pub fn catalog_at(&self, head: &str) -> Result<Catalog> {
        let heads = self.revisions.resolve(head)?;
        let mut catalog = Catalog::new();
        let path = self.revisions.upgrade_path(&[], head)?;
        let mut engine = MetaEngine::new(&mut catalog);
        for migration in path {
            debug!(revision = %migration.revision, "Replaying revision");
            migration.up(&mut engine)?;
        }
        debug!(heads = ?heads, tables = catalog.tables().len(), "Rebuilt catalog");
        Ok(catalog)
    }

    /// Operations that bring the schema at `head` up to `live`.
    ///
    /// # Errors
    ///
    /// Same as [`catalog_at`](Self::catalog_at).
    pub fn generate_from(&self, live: &Schema, head: &str) -> Result<UpgradeOps> {
        let catalog = self.catalog_at(head)?;
        Ok(Comparator::compare(live, &catalog))
    }

    /// Builds a migration on top of `head` containing the detected changes.
    ///
    /// The result may have no operations when the schema is up to date; the
    /// caller decides whether to keep it.
    ///
    /// # Errors
    ///
    /// Fails on resolution errors and when an operation cannot be reversed.
    pub fn generate_migration(
        &self,
        live: &Schema,
        message: &str,
        head: &str,
    ) -> Result<Migration> {
        let upgrade = self.generate_from(live, head)?;
        let downgrade = upgrade.reverse()?;
        let migration = self.build(message, head, upgrade, downgrade)?;
        info!(
            revision = %migration.revision,
            operations = migration.upgrade.ops.len(),
            "Generated migration"
        );
        Ok(migration)
    }

    /// Builds a migration on top of `head` with no operations.
    ///
    /// Passing `heads` yields a merge revision when the graph has branches.
    ///
    /// # Errors
    ///
    /// Fails if `head` doesn't resolve.
    pub fn empty_migration(&self, message: &str, head: &str) -> Result<Migration> {
        self.build(message, head, UpgradeOps::default(), DowngradeOps::default())
    }

    fn build(
        &self,
        message: &str,
        head: &str,
        upgrade: UpgradeOps,
        downgrade: DowngradeOps,
    ) -> Result<Migration> {
        let revises = self.revisions.resolve(head)?;
        Ok(
            Migration::new(new_revision_id(), revises, message, upgrade, downgrade)
                .created(Local::now().naive_local()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrateError;
    use crate::operations::Operation;
    use crate::schema::{Column, Table};

    fn things() -> Table {
        Table::new("things")
            .column(Column::new("id", "id"))
            .column(Column::new("name", "string"))
    }

    fn with_migration(map: &RevisionMap, live: &Schema, message: &str) -> RevisionMap {
        let migration = Generator::new(map)
            .generate_migration(live, message, "head")
            .unwrap();
        let mut all: Vec<Migration> = map.iter().cloned().collect();
        all.push(migration);
        RevisionMap::new(all).unwrap()
    }

    fn empty(id: &str, revises: &[&str]) -> Migration {
        Migration::new(
            id,
            revises.iter().map(ToString::to_string).collect(),
            id,
            UpgradeOps::default(),
            DowngradeOps::default(),
        )
    }

    #[test]
    fn test_first_migration() {
        let map = RevisionMap::default();
        let live = Schema::new().table(things());
        let migration = Generator::new(&map)
            .generate_migration(&live, "initial", "head")
            .unwrap();
        assert!(migration.revises.is_empty());
        assert!(migration.created.is_some());
        assert_eq!(migration.upgrade.ops.len(), 1);
        assert!(matches!(
            migration.downgrade.ops[0],
            Operation::DropTable { .. }
        ));
    }

    #[test]
    fn test_second_migration_builds_on_history() {
        let map = with_migration(
            &RevisionMap::default(),
            &Schema::new().table(things()),
            "initial",
        );
        let live = Schema::new().table(things().column(Column::new("age", "integer")));
        let generator = Generator::new(&map);

        let migration = generator.generate_migration(&live, "age", "head").unwrap();
        assert_eq!(migration.revises, map.resolve("head").unwrap());
        assert_eq!(
            migration.upgrade.ops,
            vec![Operation::add_column("things", Column::new("age", "integer"))]
        );

        let map = with_migration(&map, &live, "age");
        assert!(Generator::new(&map)
            .generate_from(&live, "head")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_empty_merge_migration() {
        let map = RevisionMap::new(vec![
            empty("a1", &[]),
            empty("b2", &["a1"]),
            empty("c3", &["a1"]),
        ])
        .unwrap();
        let generator = Generator::new(&map);
        assert!(matches!(
            generator.empty_migration("merge", "head"),
            Err(MigrateError::MultipleHeads(_))
        ));
        let merge = generator.empty_migration("merge", "heads").unwrap();
        assert_eq!(merge.revises, vec!["b2".to_string(), "c3".to_string()]);
        assert!(merge.upgrade.is_empty());
    }
}
