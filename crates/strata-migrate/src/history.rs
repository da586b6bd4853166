//! Revision ledger.
//!
//! This module manages the table recording which revisions are currently
//! applied. The ledger holds the applied heads only: applying a revision
//! replaces its parents, undoing it brings back the parents that no
//! remaining head already covers.

use std::collections::BTreeSet;

use sqlx::AnyConnection;
use tracing::debug;

use crate::dialect::MigrationDialect;
use crate::error::Result;
use crate::revision::LedgerTransition;

/// Default name of the ledger table.
pub const DEFAULT_LEDGER_TABLE: &str = "strata_schema";

/// Reads and updates the ledger table.
///
/// All methods take a connection so that updates can share the transaction
/// running a migration's DDL.
#[derive(Debug, Clone)]
pub struct RevisionLedger {
    table: String,
    create_sql: String,
    select_sql: String,
    insert_sql: String,
    delete_sql: String,
}

impl RevisionLedger {
    /// Creates a ledger over `table`, quoting and binding for `dialect`.
    #[must_use]
    pub fn new(table: impl Into<String>, dialect: &dyn MigrationDialect) -> Self {
        let table = table.into();
        let quoted = dialect.quote_identifier(&table);
        let version = dialect.quote_identifier("version");
        Self {
            create_sql: format!(
                "CREATE TABLE IF NOT EXISTS {} ({} VARCHAR(32) NOT NULL)",
                quoted, version
            ),
            select_sql: format!("SELECT {} FROM {}", version, quoted),
            insert_sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quoted,
                version,
                dialect.placeholder(1)
            ),
            delete_sql: format!(
                "DELETE FROM {} WHERE {} = {}",
                quoted,
                version,
                dialect.placeholder(1)
            ),
            table,
        }
    }

    /// Ledger table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Ensures the ledger table exists.
    ///
    /// # Errors
    ///
    /// Returns a database error if the table cannot be created.
    pub async fn ensure_table(&self, conn: &mut AnyConnection) -> Result<()> {
        sqlx::query(&self.create_sql).execute(conn).await?;
        Ok(())
    }

    /// Currently applied heads, sorted.
    ///
    /// # Errors
    ///
    /// Returns a database error if the table cannot be read.
    pub async fn current(&self, conn: &mut AnyConnection) -> Result<BTreeSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(&self.select_sql).fetch_all(conn).await?;
        Ok(rows.into_iter().map(|(version,)| version).collect())
    }

    /// Applies a transition: deletes first, then inserts.
    ///
    /// # Errors
    ///
    /// Returns a database error if a statement fails.
    pub async fn apply(
        &self,
        conn: &mut AnyConnection,
        transition: &LedgerTransition,
    ) -> Result<()> {
        for version in &transition.delete {
            debug!(table = %self.table, version = %version, "Removing ledger row");
            sqlx::query(&self.delete_sql)
                .bind(version.as_str())
                .execute(&mut *conn)
                .await?;
        }
        for version in &transition.insert {
            debug!(table = %self.table, version = %version, "Adding ledger row");
            sqlx::query(&self.insert_sql)
                .bind(version.as_str())
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    /// Replaces the whole ledger with `heads`.
    ///
    /// # Errors
    ///
    /// Returns a database error if a statement fails.
    pub async fn replace(&self, conn: &mut AnyConnection, heads: &BTreeSet<String>) -> Result<()> {
        let current = self.current(&mut *conn).await?;
        let transition = LedgerTransition {
            delete: current.difference(heads).cloned().collect(),
            insert: heads.difference(&current).cloned().collect(),
        };
        self.apply(conn, &transition).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use sqlx::Connection;

    async fn connect() -> AnyConnection {
        sqlx::any::install_default_drivers();
        AnyConnection::connect("sqlite::memory:").await.unwrap()
    }

    #[test]
    fn test_statements_follow_dialect() {
        let ledger = RevisionLedger::new(DEFAULT_LEDGER_TABLE, &PostgresDialect::new());
        assert_eq!(
            ledger.insert_sql,
            "INSERT INTO \"strata_schema\" (\"version\") VALUES ($1)"
        );
        assert_eq!(
            ledger.delete_sql,
            "DELETE FROM \"strata_schema\" WHERE \"version\" = $1"
        );
    }

    #[tokio::test]
    async fn test_apply_transitions() {
        let mut conn = connect().await;
        let ledger = RevisionLedger::new(DEFAULT_LEDGER_TABLE, &SqliteDialect::new());
        ledger.ensure_table(&mut conn).await.unwrap();
        ledger.ensure_table(&mut conn).await.unwrap();
        assert!(ledger.current(&mut conn).await.unwrap().is_empty());

        ledger
            .apply(
                &mut conn,
                &LedgerTransition {
                    delete: vec![],
                    insert: vec!["b2".to_string(), "c3".to_string()],
                },
            )
            .await
            .unwrap();
        ledger
            .apply(
                &mut conn,
                &LedgerTransition {
                    delete: vec!["b2".to_string(), "c3".to_string()],
                    insert: vec!["m4".to_string()],
                },
            )
            .await
            .unwrap();
        assert_eq!(
            ledger.current(&mut conn).await.unwrap(),
            BTreeSet::from(["m4".to_string()])
        );

        let heads = BTreeSet::from(["x".to_string(), "y".to_string()]);
        ledger.replace(&mut conn, &heads).await.unwrap();
        assert_eq!(ledger.current(&mut conn).await.unwrap(), heads);
    }
}
