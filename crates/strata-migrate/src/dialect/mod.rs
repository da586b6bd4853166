//! Database dialect implementations.
//!
//! Each dialect knows how to render DDL for the engine verbs on its
//! database. The trait carries ANSI-ish defaults; dialects override the
//! parts where their database differs.

mod mysql;
mod oracle;
mod postgres;
mod sqlite;

pub use mysql::MysqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::error::{MigrateError, Result};
use crate::operations::ColumnChanges;
use crate::schema::{Column, ColumnType, DefaultValue, Delta, ForeignKey, Index};

/// Trait for database-specific SQL generation.
pub trait MigrationDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the SQL type for a column of the given semantic type.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Unsupported`] for types the database can't hold.
    fn type_name(&self, column: &Column, type_: &ColumnType) -> Result<String>;

    /// Renders an ALTER for the requested column changes.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Unsupported`] when the database can't express it.
    fn alter_column(
        &self,
        table: &str,
        column: &str,
        modify: &ColumnChanges,
        existing: &ColumnChanges,
    ) -> Result<Vec<String>>;

    /// Whether reference columns carry an inline `REFERENCES` clause.
    fn inline_references(&self) -> bool {
        true
    }

    /// Whether `CREATE INDEX ... WHERE` is available.
    fn supports_partial_indexes(&self) -> bool {
        true
    }

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name)
    }

    /// Bind parameter marker for the `index`-th (1-based) parameter.
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Keyword used to add a column.
    fn add_column_keyword(&self) -> &'static str {
        "ADD COLUMN"
    }

    /// Renders a default value with the literal rules of the column type.
    fn default_literal(&self, value: &DefaultValue, type_: &ColumnType) -> String {
        match value {
            DefaultValue::Bool(b) if *type_ == ColumnType::Boolean => {
                String::from(if *b { "'T'" } else { "'F'" })
            }
            DefaultValue::Bool(b) => String::from(if *b { "1" } else { "0" }),
            DefaultValue::Integer(i) => i.to_string(),
            DefaultValue::Float(f) => f.to_string(),
            DefaultValue::String(s) => format!("'{}'", s.replace('\'', "''")),
            DefaultValue::Expression(expr) => expr.clone(),
        }
    }

    /// Generates column definition SQL.
    fn column_definition(&self, column: &Column) -> Result<String> {
        let type_ = column.column_type()?;
        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.type_name(column, &type_)?,
        ];

        if !type_.is_id() {
            if let Some(default) = &column.default {
                parts.push(format!("DEFAULT {}", self.default_literal(default, &type_)));
            }
            if column.notnull {
                parts.push("NOT NULL".to_string());
            }
            if column.unique {
                parts.push("UNIQUE".to_string());
            }
        }

        if self.inline_references() {
            if let Some((table, field)) = type_.reference_target() {
                parts.push(format!(
                    "REFERENCES {} ({}) ON DELETE {}",
                    self.quote_identifier(table),
                    self.quote_identifier(field),
                    column.ondelete
                ));
            }
        }

        Ok(parts.join(" "))
    }

    /// Renders the named constraint backing a reference column.
    fn reference_constraint(&self, table: &str, column: &Column, target: (&str, &str)) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
            self.quote_identifier(&format!("{}_{}__constraint", table, column.name)),
            self.quote_identifier(&column.name),
            self.quote_identifier(target.0),
            self.quote_identifier(target.1),
            column.ondelete
        )
    }

    /// Table-level constraints appended after the column definitions.
    fn table_constraints(&self, table: &str, columns: &[Column]) -> Result<Vec<String>> {
        if self.inline_references() {
            return Ok(Vec::new());
        }
        let mut constraints = Vec::new();
        for column in columns {
            let type_ = column.column_type()?;
            if let Some(target) = type_.reference_target() {
                constraints.push(self.reference_constraint(table, column, target));
            }
        }
        Ok(constraints)
    }

    /// Text appended after the closing parenthesis of CREATE TABLE.
    fn table_options(&self) -> &'static str {
        ""
    }

    /// Statements that follow CREATE TABLE.
    fn after_create_table(&self, _table: &str, _columns: &[Column]) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Generates SQL for creating a table.
    fn create_table(&self, table: &str, columns: &[Column]) -> Result<Vec<String>> {
        let mut defs = columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect::<Result<Vec<_>>>()?;
        defs.extend(self.table_constraints(table, columns)?);

        let mut sql = format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.quote_identifier(table),
            defs.join(",\n  ")
        );
        sql.push_str(self.table_options());

        let mut statements = vec![sql];
        statements.extend(self.after_create_table(table, columns)?);
        Ok(statements)
    }

    /// Generates SQL for dropping a table.
    fn drop_table(&self, table: &str) -> Vec<String> {
        vec![format!("DROP TABLE {}", self.quote_identifier(table))]
    }

    /// Generates SQL for adding a column.
    fn add_column(&self, table: &str, column: &Column) -> Result<Vec<String>> {
        let mut statements = vec![format!(
            "ALTER TABLE {} {} {}",
            self.quote_identifier(table),
            self.add_column_keyword(),
            self.column_definition(column)?
        )];
        if !self.inline_references() {
            if let Some(target) = column.column_type()?.reference_target() {
                statements.push(format!(
                    "ALTER TABLE {} ADD {}",
                    self.quote_identifier(table),
                    self.reference_constraint(table, column, target)
                ));
            }
        }
        Ok(statements)
    }

    /// Generates SQL for dropping a column.
    fn drop_column(&self, table: &str, column: &str) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )]
    }

    /// Renders one indexed expression.
    fn index_expression(&self, expression: &str) -> String {
        expression.to_string()
    }

    /// Generates SQL for creating an index.
    fn create_index(&self, index: &Index) -> Result<String> {
        let mut sql = String::from("CREATE ");
        if index.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&self.quote_identifier(&index.name));
        sql.push_str(" ON ");
        sql.push_str(&self.quote_identifier(&index.table));
        sql.push_str(" (");

        let parts: Vec<String> = index
            .fields
            .iter()
            .map(|f| self.quote_identifier(f))
            .chain(index.expressions.iter().map(|e| self.index_expression(e)))
            .collect();
        sql.push_str(&parts.join(", "));
        sql.push(')');

        if let Some(predicate) = &index.where_clause {
            if !self.supports_partial_indexes() {
                return Err(MigrateError::Unsupported(format!(
                    "{} has no partial indexes (index '{}')",
                    self.name(),
                    index.name
                )));
            }
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }

        Ok(sql)
    }

    /// Generates SQL for dropping an index.
    fn drop_index(&self, _table: &str, name: &str) -> String {
        format!("DROP INDEX {}", self.quote_identifier(name))
    }

    /// Generates SQL for adding a foreign key constraint.
    fn create_foreign_key(&self, fk: &ForeignKey) -> Result<String> {
        let quote_all = |names: &[String]| {
            names
                .iter()
                .map(|n| self.quote_identifier(n))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote_identifier(&fk.table),
            self.quote_identifier(&fk.name),
            quote_all(&fk.columns),
            self.quote_identifier(&fk.foreign_table),
            quote_all(&fk.foreign_columns)
        );
        if let Some(action) = &fk.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action);
        }
        Ok(sql)
    }

    /// Generates SQL for dropping a foreign key constraint.
    fn drop_foreign_key(&self, table: &str, name: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_identifier(table),
            self.quote_identifier(name)
        ))
    }
}

/// Picks a dialect from the scheme of a database URL.
///
/// A bare scheme such as `postgres` is accepted too.
///
/// # Errors
///
/// Returns [`MigrateError::Unsupported`] for unknown schemes.
pub fn dialect_for_url(url: &str, postgis: bool) -> Result<Box<dyn MigrationDialect>> {
    let scheme = url.split(':').next().unwrap_or_default();
    match scheme {
        "sqlite" => Ok(Box::new(SqliteDialect::new())),
        "postgres" | "postgresql" => Ok(Box::new(PostgresDialect::new().with_postgis(postgis))),
        "mysql" | "mariadb" => Ok(Box::new(MysqlDialect::new())),
        "oracle" => Ok(Box::new(OracleDialect::new())),
        _ => Err(MigrateError::Unsupported(format!(
            "no dialect for database URL scheme '{}'",
            scheme
        ))),
    }
}

/// Length a column is rendered with.
pub(crate) fn effective_length(column: &Column, type_: &ColumnType) -> Option<u32> {
    column.length.or_else(|| type_.default_length())
}

/// Fails when an alteration would change the type of a reference column.
pub(crate) fn ensure_reference_type_kept(
    table: &str,
    column: &str,
    modify: &ColumnChanges,
    existing: &ColumnChanges,
) -> Result<()> {
    let Some(new_type) = &modify.type_ else {
        return Ok(());
    };
    let is_reference = |t: &str| ColumnType::parse(t).is_ok_and(|t| t.is_reference());
    if is_reference(new_type.as_str()) || existing.type_.as_deref().is_some_and(is_reference) {
        return Err(MigrateError::Unsupported(format!(
            "changing the type of reference column '{}.{}'",
            table, column
        )));
    }
    Ok(())
}

fn pick<'a, T>(modify: &'a Delta<T>, existing: &'a Delta<T>) -> Option<&'a T> {
    modify.resolved().or_else(|| existing.resolved()).flatten()
}

/// The column as it looks after the alteration.
///
/// # Errors
///
/// Returns [`MigrateError::Unsupported`] when neither side knows the type.
pub(crate) fn altered_column(
    table: &str,
    column: &str,
    modify: &ColumnChanges,
    existing: &ColumnChanges,
) -> Result<Column> {
    let type_ = modify
        .type_
        .as_ref()
        .or(existing.type_.as_ref())
        .ok_or_else(|| {
            MigrateError::Unsupported(format!(
                "altering '{}.{}' without knowing its type",
                table, column
            ))
        })?;
    let mut altered = Column::new(column, type_.clone());
    altered.length = pick(&modify.length, &existing.length).copied();
    altered.notnull = modify.notnull.or(existing.notnull).unwrap_or(false);
    altered.default = pick(&modify.default, &existing.default).cloned();
    Ok(altered)
}

/// Best known type of an altered column, for rendering default literals.
pub(crate) fn literal_type(modify: &ColumnChanges, existing: &ColumnChanges) -> ColumnType {
    modify
        .type_
        .as_ref()
        .or(existing.type_.as_ref())
        .and_then(|t| ColumnType::parse(t).ok())
        .unwrap_or(ColumnType::Text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_for_url() {
        assert_eq!(dialect_for_url("sqlite::memory:", false).unwrap().name(), "sqlite");
        assert_eq!(
            dialect_for_url("postgres://localhost/db", true).unwrap().name(),
            "postgres"
        );
        assert_eq!(dialect_for_url("mysql://root@localhost/db", false).unwrap().name(), "mysql");
        assert_eq!(dialect_for_url("oracle://scott@db", false).unwrap().name(), "oracle");
        assert!(matches!(
            dialect_for_url("mssql://db", false),
            Err(MigrateError::Unsupported(_))
        ));
    }

    #[test]
    fn test_default_literals() {
        let dialect = SqliteDialect::new();
        assert_eq!(
            dialect.default_literal(&DefaultValue::Bool(true), &ColumnType::Boolean),
            "'T'"
        );
        assert_eq!(
            dialect.default_literal(&DefaultValue::Bool(false), &ColumnType::Integer),
            "0"
        );
        assert_eq!(
            dialect.default_literal(&DefaultValue::String("it's".to_string()), &ColumnType::String),
            "'it''s'"
        );
        assert_eq!(
            dialect.default_literal(
                &DefaultValue::Expression("CURRENT_TIMESTAMP".to_string()),
                &ColumnType::DateTime
            ),
            "CURRENT_TIMESTAMP"
        );
    }

    #[test]
    fn test_reference_type_change_is_unsupported() {
        let existing = ColumnChanges::of_column(&Column::new("owner", "reference users"));
        let modify = ColumnChanges::new().set_type("integer");
        assert!(matches!(
            ensure_reference_type_kept("things", "owner", &modify, &existing),
            Err(MigrateError::Unsupported(_))
        ));
        let modify = ColumnChanges::new().set_notnull(true);
        assert!(ensure_reference_type_kept("things", "owner", &modify, &existing).is_ok());
    }

    #[test]
    fn test_altered_column_merges_sides() {
        let existing = ColumnChanges::of_column(
            &Column::new("name", "string")
                .length(32)
                .default(DefaultValue::String("x".to_string())),
        );
        let modify = ColumnChanges::new().set_notnull(true).set_default(None);
        let altered = altered_column("t", "name", &modify, &existing).unwrap();
        assert_eq!(altered.type_, "string");
        assert_eq!(altered.length, Some(32));
        assert!(altered.notnull);
        assert_eq!(altered.default, None);

        let unknown = altered_column("t", "name", &modify, &ColumnChanges::new());
        assert!(matches!(unknown, Err(MigrateError::Unsupported(_))));
    }
}
