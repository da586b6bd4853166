//! Oracle dialect for migrations.
//!
//! Oracle has no auto-increment column type, so key columns are filled by a
//! per-table sequence and a BEFORE INSERT trigger.

use crate::error::{MigrateError, Result};
use crate::operations::ColumnChanges;
use crate::schema::{Column, ColumnType, Delta};

use super::{
    altered_column, effective_length, ensure_reference_type_kept, literal_type, MigrationDialect,
};

/// Oracle migration dialect.
#[derive(Debug, Clone, Default)]
pub struct OracleDialect;

impl OracleDialect {
    /// Creates a new Oracle dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn sequence_name(&self, table: &str) -> String {
        self.quote_identifier(&format!("{}_sequence", table))
    }
}

impl MigrationDialect for OracleDialect {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn placeholder(&self, index: usize) -> String {
        format!(":{}", index)
    }

    fn inline_references(&self) -> bool {
        false
    }

    fn supports_partial_indexes(&self) -> bool {
        false
    }

    fn add_column_keyword(&self) -> &'static str {
        "ADD"
    }

    fn type_name(&self, column: &Column, type_: &ColumnType) -> Result<String> {
        let name = match type_ {
            ColumnType::Id | ColumnType::BigId => "NUMBER PRIMARY KEY".to_string(),
            ColumnType::String | ColumnType::Password | ColumnType::Upload => {
                format!("VARCHAR2({})", effective_length(column, type_).unwrap_or_default())
            }
            ColumnType::Text
            | ColumnType::Json
            | ColumnType::ListReference { .. }
            | ColumnType::ListString
            | ColumnType::ListInteger => "CLOB".to_string(),
            ColumnType::Integer => "INT".to_string(),
            ColumnType::BigInt | ColumnType::Reference { .. } | ColumnType::BigReference { .. } => {
                "NUMBER".to_string()
            }
            ColumnType::Float => "BINARY_FLOAT".to_string(),
            ColumnType::Double => "BINARY_DOUBLE".to_string(),
            ColumnType::Boolean => "CHAR(1)".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "CHAR(8)".to_string(),
            ColumnType::DateTime => "TIMESTAMP".to_string(),
            ColumnType::Blob => "BLOB".to_string(),
            ColumnType::Decimal { precision, scale } => {
                format!("NUMBER({},{})", precision, scale)
            }
            ColumnType::Geometry(_) | ColumnType::Geography(_) => {
                return Err(MigrateError::Unsupported(format!(
                    "oracle spatial column '{}'",
                    column.name
                )))
            }
        };
        Ok(name)
    }

    fn after_create_table(&self, table: &str, columns: &[Column]) -> Result<Vec<String>> {
        let mut key = None;
        for column in columns {
            if column.column_type()?.is_id() {
                key = Some(column);
                break;
            }
        }
        let Some(key) = key else {
            return Ok(Vec::new());
        };

        let sequence = self.sequence_name(table);
        Ok(vec![
            format!(
                "CREATE SEQUENCE {} START WITH 1 INCREMENT BY 1 NOMAXVALUE MINVALUE -1",
                sequence
            ),
            format!(
                "CREATE OR REPLACE TRIGGER {} BEFORE INSERT ON {} FOR EACH ROW BEGIN \
                 SELECT {}.nextval INTO :NEW.{} FROM DUAL; END;",
                self.quote_identifier(&format!("{}_crtr", table)),
                self.quote_identifier(table),
                sequence,
                self.quote_identifier(&key.name)
            ),
        ])
    }

    fn drop_table(&self, table: &str) -> Vec<String> {
        vec![
            format!(
                "DROP TABLE {} CASCADE CONSTRAINTS",
                self.quote_identifier(table)
            ),
            format!(
                "BEGIN EXECUTE IMMEDIATE 'DROP SEQUENCE {}'; \
                 EXCEPTION WHEN OTHERS THEN NULL; END;",
                self.sequence_name(table)
            ),
        ]
    }

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

        let mut parts = vec![self.quote_identifier(column)];
        if modify.type_.is_some() || modify.length.is_set() {
            let altered = altered_column(table, column, modify, existing)?;
            let type_ = altered.column_type()?;
            if type_.is_id() {
                return Err(MigrateError::Unsupported(format!(
                    "changing key column '{}.{}' in place",
                    table, column
                )));
            }
            parts.push(self.type_name(&altered, &type_)?);
        }
        match &modify.default {
            Delta::Unset => {}
            Delta::Null => parts.push("DEFAULT NULL".to_string()),
            Delta::Value(default) => parts.push(format!(
                "DEFAULT {}",
                self.default_literal(default, &literal_type(modify, existing))
            )),
        }
        match modify.notnull {
            Some(true) => parts.push("NOT NULL".to_string()),
            Some(false) => parts.push("NULL".to_string()),
            None => {}
        }

        Ok(vec![format!(
            "ALTER TABLE {} MODIFY ({})",
            self.quote_identifier(table),
            parts.join(" ")
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_adds_sequence_and_trigger() {
        let dialect = OracleDialect::new();
        let sql = dialect
            .create_table(
                "things",
                &[Column::new("id", "id"), Column::new("name", "string").length(20)],
            )
            .unwrap();
        assert_eq!(sql.len(), 3);
        assert_eq!(
            sql[0],
            "CREATE TABLE \"things\" (\n  \"id\" NUMBER PRIMARY KEY,\n  \"name\" VARCHAR2(20)\n)"
        );
        assert!(sql[1].starts_with("CREATE SEQUENCE \"things_sequence\""));
        assert!(sql[2].contains("BEFORE INSERT ON \"things\""));
        assert!(sql[2].contains("INTO :NEW.\"id\""));
    }

    #[test]
    fn test_table_without_key_has_no_sequence() {
        let dialect = OracleDialect::new();
        let sql = dialect
            .create_table("notes", &[Column::new("body", "text")])
            .unwrap();
        assert_eq!(sql.len(), 1);
    }

    #[test]
    fn test_add_column_uses_add() {
        let dialect = OracleDialect::new();
        let sql = dialect
            .add_column("things", &Column::new("age", "integer").notnull())
            .unwrap();
        assert_eq!(sql, vec!["ALTER TABLE \"things\" ADD \"age\" INT NOT NULL"]);
    }

    #[test]
    fn test_alter_column_modify() {
        let dialect = OracleDialect::new();
        let sql = dialect
            .alter_column(
                "things",
                "name",
                &ColumnChanges::new().set_notnull(false),
                &ColumnChanges::new().set_notnull(true),
            )
            .unwrap();
        assert_eq!(sql, vec!["ALTER TABLE \"things\" MODIFY (\"name\" NULL)"]);
    }
}
