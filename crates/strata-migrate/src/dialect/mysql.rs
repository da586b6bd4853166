//! MySQL dialect for migrations.

use crate::error::{MigrateError, Result};
use crate::operations::ColumnChanges;
use crate::schema::{Column, ColumnType};

use super::{altered_column, effective_length, ensure_reference_type_kept, MigrationDialect};

/// MySQL migration dialect.
///
/// Reference columns become named table constraints and tables are created
/// with InnoDB and a utf8 character set.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl MigrationDialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name)
    }

    fn inline_references(&self) -> bool {
        false
    }

    fn supports_partial_indexes(&self) -> bool {
        false
    }

    fn index_expression(&self, expression: &str) -> String {
        format!("({})", expression)
    }

    fn table_options(&self) -> &'static str {
        " ENGINE=InnoDB CHARACTER SET utf8"
    }

    fn type_name(&self, column: &Column, type_: &ColumnType) -> Result<String> {
        let name = match type_ {
            ColumnType::Id => "INT AUTO_INCREMENT NOT NULL".to_string(),
            ColumnType::BigId => "BIGINT AUTO_INCREMENT NOT NULL".to_string(),
            ColumnType::String | ColumnType::Password | ColumnType::Upload => {
                format!("VARCHAR({})", effective_length(column, type_).unwrap_or_default())
            }
            ColumnType::Text
            | ColumnType::ListReference { .. }
            | ColumnType::ListString
            | ColumnType::ListInteger => "TEXT".to_string(),
            ColumnType::Integer | ColumnType::Reference { .. } => "INT".to_string(),
            ColumnType::BigInt | ColumnType::BigReference { .. } => "BIGINT".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::Double => "DOUBLE".to_string(),
            ColumnType::Boolean => "CHAR(1)".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::DateTime => "DATETIME".to_string(),
            ColumnType::Blob => "LONGBLOB".to_string(),
            ColumnType::Json => "JSON".to_string(),
            ColumnType::Decimal { precision, scale } => {
                format!("DECIMAL({},{})", precision, scale)
            }
            ColumnType::Geometry(_) | ColumnType::Geography(_) => {
                return Err(MigrateError::Unsupported(format!(
                    "mysql spatial column '{}'",
                    column.name
                )))
            }
        };
        Ok(name)
    }

    fn table_constraints(&self, table: &str, columns: &[Column]) -> Result<Vec<String>> {
        let mut constraints = Vec::new();
        for column in columns {
            let type_ = column.column_type()?;
            if type_.is_id() {
                constraints.push(format!("PRIMARY KEY ({})", self.quote_identifier(&column.name)));
            }
        }
        for column in columns {
            let type_ = column.column_type()?;
            if let Some(target) = type_.reference_target() {
                constraints.push(self.reference_constraint(table, column, target));
            }
        }
        Ok(constraints)
    }

    fn drop_index(&self, table: &str, name: &str) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote_identifier(name),
            self.quote_identifier(table)
        )
    }

    fn drop_foreign_key(&self, table: &str, name: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP FOREIGN KEY {}",
            self.quote_identifier(table),
            self.quote_identifier(name)
        ))
    }

    /// MODIFY COLUMN restates the whole column, so the unchanged attributes
    /// come from `existing`.
    fn alter_column(
        &self,
        table: &str,
        column: &str,
        modify: &ColumnChanges,
        existing: &ColumnChanges,
    ) -> Result<Vec<String>> {
        if modify.is_empty() {
            return Ok(Vec::new());
        }
        ensure_reference_type_kept(table, column, modify, existing)?;
        let altered = altered_column(table, column, modify, existing)?;
        if altered.column_type()?.is_id() {
            return Err(MigrateError::Unsupported(format!(
                "changing key column '{}.{}' in place",
                table, column
            )));
        }
        Ok(vec![format!(
            "ALTER TABLE {} MODIFY COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(&altered)?
        )])
    }
}
