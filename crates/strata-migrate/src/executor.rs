//! Migration executor.
//!
//! This module applies and undoes revisions against a live database. Every
//! step of a plan is rendered up front through a [`SqlEngine`], so a
//! revision that the dialect cannot express fails before anything runs.
//! Each revision then executes in its own transaction together with its
//! ledger update.

use std::collections::BTreeSet;
use std::fmt;

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tracing::{debug, info, warn};

use crate::config::MigrateConfig;
use crate::dialect::MigrationDialect;
use crate::engine::SqlEngine;
use crate::error::Result;
use crate::history::RevisionLedger;
use crate::migration::Migration;
use crate::revision::{LedgerTransition, RevisionMap};

/// Direction of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Applying a revision.
    Up,
    /// Undoing a revision.
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "upgrade"),
            Self::Down => write!(f, "downgrade"),
        }
    }
}

/// One rendered revision of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Revision id.
    pub revision: String,
    /// Revision message.
    pub message: String,
    /// Whether the revision is applied or undone.
    pub direction: Direction,
    /// Statements, in execution order.
    pub statements: Vec<String>,
    /// Ledger change recorded with the statements.
    pub transition: LedgerTransition,
}

/// Renders the steps from `current` heads towards `target` without touching
/// a database.
///
/// # Errors
///
/// Fails on resolution errors and on operations the dialect can't express.
pub fn plan(
    revisions: &RevisionMap,
    dialect: &dyn MigrationDialect,
    current: &BTreeSet<String>,
    target: &str,
    direction: Direction,
) -> Result<Vec<MigrationReport>> {
    let current_ids: Vec<String> = current.iter().cloned().collect();
    let path = match direction {
        Direction::Up => revisions.upgrade_path(&current_ids, target)?,
        Direction::Down => revisions.downgrade_path(&current_ids, target)?,
    };

    let mut heads = current.clone();
    let mut reports = Vec::with_capacity(path.len());
    for migration in path {
        let report = render_step(revisions, dialect, &heads, migration, direction)?;
        report.transition.apply(&mut heads);
        reports.push(report);
    }
    Ok(reports)
}

fn render_step(
    revisions: &RevisionMap,
    dialect: &dyn MigrationDialect,
    heads: &BTreeSet<String>,
    migration: &Migration,
    direction: Direction,
) -> Result<MigrationReport> {
    let mut engine = SqlEngine::new(dialect);
    let transition = match direction {
        Direction::Up => {
            migration.up(&mut engine)?;
            revisions.upgrade_transition(heads, migration)
        }
        Direction::Down => {
            migration.down(&mut engine)?;
            revisions.downgrade_transition(heads, migration)
        }
    };
    Ok(MigrationReport {
        revision: migration.revision.clone(),
        message: migration.message.clone(),
        direction,
        statements: engine.into_statements(),
        transition,
    })
}

/// Executes revisions against a database.
pub struct Migrator {
    pool: AnyPool,
    dialect: Box<dyn MigrationDialect>,
    ledger: RevisionLedger,
}

impl Migrator {
    /// Creates a migrator over an existing pool.
    #[must_use]
    pub fn new(pool: AnyPool, dialect: Box<dyn MigrationDialect>, ledger_table: &str) -> Self {
        let ledger = RevisionLedger::new(ledger_table, dialect.as_ref());
        Self {
            pool,
            dialect,
            ledger,
        }
    }

    /// Connects to the configured database.
    ///
    /// Statements are issued one at a time, so the pool holds a single
    /// connection.
    ///
    /// # Errors
    ///
    /// Fails when no URL is configured, its scheme has no dialect, or the
    /// connection cannot be opened.
    pub async fn connect(config: &MigrateConfig) -> Result<Self> {
        let dialect = config.dialect()?;
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect(config.require_database_url()?)
            .await?;
        Ok(Self::new(pool, dialect, &config.ledger_table))
    }

    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> &dyn MigrationDialect {
        self.dialect.as_ref()
    }

    /// Returns the ledger.
    #[must_use]
    pub const fn ledger(&self) -> &RevisionLedger {
        &self.ledger
    }

    /// Ensures the ledger table exists.
    ///
    /// # Errors
    ///
    /// Returns a database error if the table cannot be created.
    pub async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        self.ledger.ensure_table(&mut conn).await?;
        info!(table = %self.ledger.table(), "Ledger table ready");
        Ok(())
    }

    /// Currently applied heads.
    ///
    /// # Errors
    ///
    /// Returns a database error if the ledger cannot be read.
    pub async fn current(&self) -> Result<BTreeSet<String>> {
        let mut conn = self.pool.acquire().await?;
        self.ledger.ensure_table(&mut conn).await?;
        self.ledger.current(&mut conn).await
    }

    /// Applies revisions up to `target`.
    ///
    /// With `dry_run` nothing is executed; the rendered steps are returned.
    ///
    /// # Errors
    ///
    /// Fails on resolution, rendering or database errors. Revisions before
    /// the failing one stay applied; the failing one is rolled back.
    pub async fn up(
        &self,
        revisions: &RevisionMap,
        target: &str,
        dry_run: bool,
    ) -> Result<Vec<MigrationReport>> {
        self.run(revisions, target, Direction::Up, dry_run).await
    }

    /// Undoes revisions down to `target`.
    ///
    /// # Errors
    ///
    /// Same as [`up`](Self::up); additionally fails with
    /// `RangeNotAncestor` when `target` isn't below the applied heads.
    pub async fn down(
        &self,
        revisions: &RevisionMap,
        target: &str,
        dry_run: bool,
    ) -> Result<Vec<MigrationReport>> {
        self.run(revisions, target, Direction::Down, dry_run).await
    }

    /// Rewrites the ledger to `target` without running any DDL.
    ///
    /// # Errors
    ///
    /// Fails if `target` doesn't resolve or the ledger can't be written.
    pub async fn stamp(&self, revisions: &RevisionMap, target: &str) -> Result<BTreeSet<String>> {
        let heads: BTreeSet<String> = revisions.resolve(target)?.into_iter().collect();
        let mut tx = self.pool.begin().await?;
        self.ledger.ensure_table(&mut tx).await?;
        self.ledger.replace(&mut tx, &heads).await?;
        tx.commit().await?;
        info!(heads = ?heads, "Stamped ledger");
        Ok(heads)
    }

    async fn run(
        &self,
        revisions: &RevisionMap,
        target: &str,
        direction: Direction,
        dry_run: bool,
    ) -> Result<Vec<MigrationReport>> {
        let current = self.current().await?;
        let reports = plan(revisions, self.dialect(), &current, target, direction)?;

        if reports.is_empty() {
            info!(target = %target, "Nothing to do");
            return Ok(reports);
        }

        for report in &reports {
            if dry_run {
                for sql in &report.statements {
                    info!(revision = %report.revision, sql = %sql, "Dry run");
                }
                continue;
            }
            if let Err(e) = self.execute(report).await {
                warn!(
                    revision = %report.revision,
                    direction = %report.direction,
                    error = %e,
                    "Migration failed, rolled back"
                );
                return Err(e);
            }
        }
        Ok(reports)
    }

    async fn execute(&self, report: &MigrationReport) -> Result<()> {
        info!(
            revision = %report.revision,
            message = %report.message,
            direction = %report.direction,
            "Running migration"
        );

        let mut tx = self.pool.begin().await?;
        for sql in &report.statements {
            debug!(revision = %report.revision, sql = %sql, "Executing SQL");
            sqlx::query(sql).execute(&mut *tx).await?;
        }
        self.ledger.apply(&mut tx, &report.transition).await?;
        tx.commit().await?;

        info!(
            revision = %report.revision,
            statements = report.statements.len(),
            "Migration finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use crate::error::MigrateError;
    use crate::operations::{ColumnChanges, Operation, UpgradeOps};
    use crate::schema::Column;

    fn revision(id: &str, revises: &[&str], ops: Vec<Operation>) -> Migration {
        let upgrade = UpgradeOps::new(ops);
        let downgrade = upgrade.reverse().unwrap();
        Migration::new(
            id,
            revises.iter().map(ToString::to_string).collect(),
            format!("revision {}", id),
            upgrade,
            downgrade,
        )
    }

    fn history() -> RevisionMap {
        RevisionMap::new(vec![
            revision(
                "a1",
                &[],
                vec![Operation::create_table(
                    "things",
                    vec![Column::new("id", "id")],
                )],
            ),
            revision(
                "b2",
                &["a1"],
                vec![Operation::add_column("things", Column::new("age", "integer"))],
            ),
        ])
        .unwrap()
    }

    async fn migrator() -> Migrator {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Migrator::new(pool, Box::new(SqliteDialect::new()), "strata_schema")
    }

    async fn table_names(migrator: &Migrator) -> Vec<String> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&migrator.pool)
        .await
        .unwrap();
        rows.into_iter().map(|(name,)| name).collect()
    }

    #[test]
    fn test_plan_offline() {
        let map = history();
        let reports = plan(
            &map,
            &PostgresDialect::new(),
            &BTreeSet::new(),
            "heads",
            Direction::Up,
        )
        .unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(
            reports[0].statements,
            vec!["CREATE TABLE \"things\" (\n  \"id\" SERIAL PRIMARY KEY\n)"]
        );
        assert_eq!(reports[1].transition.delete, vec!["a1".to_string()]);
        assert_eq!(reports[1].transition.insert, vec!["b2".to_string()]);
    }

    #[test]
    fn test_plan_fails_before_running() {
        let map = RevisionMap::new(vec![revision(
            "a1",
            &[],
            vec![Operation::alter_column(
                "things",
                "age",
                ColumnChanges::new().set_notnull(true),
                ColumnChanges::new().set_notnull(false),
            )],
        )])
        .unwrap();
        let err = plan(
            &map,
            &SqliteDialect::new(),
            &BTreeSet::new(),
            "heads",
            Direction::Up,
        )
        .unwrap_err();
        assert!(matches!(err, MigrateError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_up_and_down() {
        let migrator = migrator().await;
        let map = history();

        let reports = migrator.up(&map, "heads", false).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(
            migrator.current().await.unwrap(),
            BTreeSet::from(["b2".to_string()])
        );
        assert_eq!(table_names(&migrator).await, vec!["strata_schema", "things"]);

        assert!(migrator.up(&map, "heads", false).await.unwrap().is_empty());

        let reports = migrator.down(&map, "base", false).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].revision, "b2");
        assert!(migrator.current().await.unwrap().is_empty());
        assert_eq!(table_names(&migrator).await, vec!["strata_schema"]);
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let migrator = migrator().await;
        let map = history();

        let reports = migrator.up(&map, "a1", true).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].statements.is_empty());
        assert!(migrator.current().await.unwrap().is_empty());
        assert_eq!(table_names(&migrator).await, vec!["strata_schema"]);
    }

    #[tokio::test]
    async fn test_failed_migration_keeps_ledger() {
        let migrator = migrator().await;
        let map = RevisionMap::new(vec![
            revision(
                "a1",
                &[],
                vec![Operation::create_table(
                    "things",
                    vec![Column::new("id", "id")],
                )],
            ),
            revision(
                "b2",
                &["a1"],
                vec![Operation::create_table(
                    "things",
                    vec![Column::new("id", "id")],
                )],
            ),
        ])
        .unwrap();

        let err = migrator.up(&map, "heads", false).await.unwrap_err();
        assert!(matches!(err, MigrateError::Database(_)));
        assert_eq!(
            migrator.current().await.unwrap(),
            BTreeSet::from(["a1".to_string()])
        );
    }

    #[tokio::test]
    async fn test_stamp() {
        let migrator = migrator().await;
        let map = history();
        migrator.stamp(&map, "b2").await.unwrap();
        assert_eq!(
            migrator.current().await.unwrap(),
            BTreeSet::from(["b2".to_string()])
        );
        assert_eq!(table_names(&migrator).await, vec!["strata_schema"]);
        migrator.stamp(&map, "base").await.unwrap();
        assert!(migrator.current().await.unwrap().is_empty());
    }
}
