use tracing::debug;

use crate::dialect::MigrationDialect;
use crate::engine::Engine;
use crate::error::Result;
use crate::operations::ColumnChanges;
use crate::schema::{Column, ForeignKey, Index};

/// Engine that renders dialect DDL and collects the statements.
///
/// Nothing is executed here; the [`Migrator`](crate::executor::Migrator)
/// runs the collected statements (or, in dry-run mode, only reports them).
pub struct SqlEngine<'a> {
    dialect: &'a dyn MigrationDialect,
    statements: Vec<String>,
}

impl<'a> SqlEngine<'a> {
    /// Creates an engine rendering for `dialect`.
    #[must_use]
    pub fn new(dialect: &'a dyn MigrationDialect) -> Self {
        Self {
            dialect,
            statements: Vec::new(),
        }
    }

    /// Statements rendered so far, in order.
    #[must_use]
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Consumes the engine and returns its statements.
    #[must_use]
    pub fn into_statements(self) -> Vec<String> {
        self.statements
    }

    fn emit(&mut self, statements: impl IntoIterator<Item = String>) {
        for sql in statements {
            debug!(dialect = self.dialect.name(), sql = %sql, "Rendered statement");
            self.statements.push(sql);
        }
    }
}

impl Engine for SqlEngine<'_> {
    fn create_table(&mut self, table: &str, columns: &[Column]) -> Result<()> {
        let statements = self.dialect.create_table(table, columns)?;
        self.emit(statements);
        Ok(())
    }

    fn drop_table(&mut self, table: &str) -> Result<()> {
        let statements = self.dialect.drop_table(table);
        self.emit(statements);
        Ok(())
    }

    fn add_column(&mut self, table: &str, column: &Column) -> Result<()> {
        let statements = self.dialect.add_column(table, column)?;
        self.emit(statements);
        Ok(())
    }

    fn drop_column(&mut self, table: &str, column: &str) -> Result<()> {
        let statements = self.dialect.drop_column(table, column);
        self.emit(statements);
        Ok(())
    }

    fn alter_column(
        &mut self,
        table: &str,
        column: &str,
        modify: &ColumnChanges,
        existing: &ColumnChanges,
    ) -> Result<()> {
        let statements = self.dialect.alter_column(table, column, modify, existing)?;
        self.emit(statements);
        Ok(())
    }

    fn create_index(&mut self, index: &Index) -> Result<()> {
        let sql = self.dialect.create_index(index)?;
        self.emit([sql]);
        Ok(())
    }

    fn drop_index(&mut self, table: &str, name: &str) -> Result<()> {
        let sql = self.dialect.drop_index(table, name);
        self.emit([sql]);
        Ok(())
    }

    fn create_foreign_key_constraint(&mut self, foreign_key: &ForeignKey) -> Result<()> {
        let sql = self.dialect.create_foreign_key(foreign_key)?;
        self.emit([sql]);
        Ok(())
    }

    fn drop_foreign_key_constraint(&mut self, table: &str, name: &str) -> Result<()> {
        let sql = self.dialect.drop_foreign_key(table, name)?;
        self.emit([sql]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use crate::error::MigrateError;
    use crate::operations::Operation;

    #[test]
    fn test_collects_statements_in_order() {
        let dialect = SqliteDialect::new();
        let mut engine = SqlEngine::new(&dialect);
        let ops = [
            Operation::create_table("things", vec![Column::new("id", "id")]),
            Operation::add_column("things", Column::new("name", "string").length(40)),
            Operation::create_index(Index::new("idx_name", "things", ["name"])),
        ];
        for op in &ops {
            op.run(&mut engine).unwrap();
        }
        assert_eq!(
            engine.into_statements(),
            vec![
                "CREATE TABLE \"things\" (\n  \"id\" INTEGER PRIMARY KEY AUTOINCREMENT\n)",
                "ALTER TABLE \"things\" ADD COLUMN \"name\" CHAR(40)",
                "CREATE INDEX \"idx_name\" ON \"things\" (\"name\")",
            ]
        );
    }

    #[test]
    fn test_unsupported_is_reported_at_run_time() {
        let dialect = SqliteDialect::new();
        let mut engine = SqlEngine::new(&dialect);
        let op = Operation::alter_column(
            "things",
            "name",
            ColumnChanges::new().set_notnull(true),
            ColumnChanges::of_column(&Column::new("name", "string")),
        );
        assert!(matches!(op.run(&mut engine), Err(MigrateError::Unsupported(_))));
        assert!(engine.statements().is_empty());
    }

    #[test]
    fn test_postgres_alter_column() {
        let dialect = PostgresDialect::new();
        let mut engine = SqlEngine::new(&dialect);
        Operation::alter_column(
            "things",
            "name",
            ColumnChanges::new().set_notnull(true),
            ColumnChanges::of_column(&Column::new("name", "string")),
        )
        .run(&mut engine)
        .unwrap();
        assert_eq!(
            engine.statements(),
            ["ALTER TABLE \"things\" ALTER COLUMN \"name\" SET NOT NULL"]
        );
    }
}
