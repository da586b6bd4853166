//! SQLite dialect for migrations.
//!
//! SQLite has limited ALTER TABLE support: columns can be added and
//! dropped (3.35.0+) but not altered, and constraints can't be added to an
//! existing table. Those verbs report [`MigrateError::Unsupported`].

use crate::error::{MigrateError, Result};
use crate::operations::ColumnChanges;
use crate::schema::{Column, ColumnType, ForeignKey};

use super::{effective_length, MigrationDialect};

/// SQLite migration dialect.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl MigrationDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn type_name(&self, column: &Column, type_: &ColumnType) -> Result<String> {
        let name = match type_ {
            ColumnType::Id | ColumnType::BigId => "INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
            ColumnType::String | ColumnType::Password | ColumnType::Upload => {
                format!("CHAR({})", effective_length(column, type_).unwrap_or_default())
            }
            ColumnType::Text
            | ColumnType::Json
            | ColumnType::ListReference { .. }
            | ColumnType::ListString
            | ColumnType::ListInteger => "TEXT".to_string(),
            ColumnType::Integer
            | ColumnType::BigInt
            | ColumnType::Reference { .. }
            | ColumnType::BigReference { .. } => "INTEGER".to_string(),
            ColumnType::Float | ColumnType::Double => "DOUBLE".to_string(),
            ColumnType::Boolean => "CHAR(1)".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::DateTime => "TIMESTAMP".to_string(),
            ColumnType::Blob => "BLOB".to_string(),
            ColumnType::Decimal { precision, scale } => {
                format!("DECIMAL({},{})", precision, scale)
            }
            ColumnType::Geometry(_) | ColumnType::Geography(_) => {
                return Err(MigrateError::Unsupported(format!(
                    "sqlite has no spatial type for column '{}'",
                    column.name
                )))
            }
        };
        Ok(name)
    }

    fn alter_column(
        &self,
        table: &str,
        column: &str,
        _modify: &ColumnChanges,
        _existing: &ColumnChanges,
    ) -> Result<Vec<String>> {
        Err(MigrateError::Unsupported(format!(
            "sqlite cannot alter column '{}.{}'",
            table, column
        )))
    }

    fn create_foreign_key(&self, fk: &ForeignKey) -> Result<String> {
        Err(MigrateError::Unsupported(format!(
            "sqlite cannot add constraint '{}' to existing table '{}'",
            fk.name, fk.table
        )))
    }

    fn drop_foreign_key(&self, table: &str, name: &str) -> Result<String> {
        Err(MigrateError::Unsupported(format!(
            "sqlite cannot drop constraint '{}' from table '{}'",
            name, table
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DefaultValue, Index};

    #[test]
    fn test_create_table_sql() {
        let dialect = SqliteDialect::new();
        let sql = dialect
            .create_table(
                "things",
                &[
                    Column::new("id", "id"),
                    Column::new("name", "string").notnull(),
                    Column::new("owner", "reference users"),
                    Column::new("active", "boolean").default(DefaultValue::Bool(true)),
                ],
            )
            .unwrap();

        assert_eq!(sql.len(), 1);
        assert_eq!(
            sql[0],
            "CREATE TABLE \"things\" (\n  \
             \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n  \
             \"name\" CHAR(512) NOT NULL,\n  \
             \"owner\" INTEGER REFERENCES \"users\" (\"id\") ON DELETE CASCADE,\n  \
             \"active\" CHAR(1) DEFAULT 'T'\n)"
        );
    }

    #[test]
    fn test_add_and_drop_column_sql() {
        let dialect = SqliteDialect::new();
        let sql = dialect
            .add_column("things", &Column::new("age", "integer"))
            .unwrap();
        assert_eq!(sql, vec!["ALTER TABLE \"things\" ADD COLUMN \"age\" INTEGER"]);
        assert_eq!(
            dialect.drop_column("things", "age"),
            vec!["ALTER TABLE \"things\" DROP COLUMN \"age\""]
        );
    }

    #[test]
    fn test_index_sql() {
        let dialect = SqliteDialect::new();
        let index = Index::new("idx_name", "things", ["name"])
            .unique()
            .expression("lower(\"email\")")
            .where_clause("\"name\" IS NOT NULL");
        assert_eq!(
            dialect.create_index(&index).unwrap(),
            "CREATE UNIQUE INDEX \"idx_name\" ON \"things\" (\"name\", lower(\"email\")) \
             WHERE \"name\" IS NOT NULL"
        );
        assert_eq!(dialect.drop_index("things", "idx_name"), "DROP INDEX \"idx_name\"");
    }

    #[test]
    fn test_unsupported_operations() {
        let dialect = SqliteDialect::new();
        assert!(matches!(
            dialect.alter_column(
                "things",
                "name",
                &ColumnChanges::new().set_notnull(true),
                &ColumnChanges::new()
            ),
            Err(MigrateError::Unsupported(_))
        ));
        assert!(matches!(
            dialect.create_table("places", &[Column::new("area", "geometry()")]),
            Err(MigrateError::Unsupported(_))
        ));
        assert!(dialect.drop_foreign_key("things", "fk").is_err());
    }
}
