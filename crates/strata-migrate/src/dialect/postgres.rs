//! PostgreSQL dialect for migrations.
//!
//! Spatial types need the PostGIS extension; enable them with
//! [`PostgresDialect::with_postgis`].

use crate::error::{MigrateError, Result};
use crate::operations::ColumnChanges;
use crate::schema::{Column, ColumnType, Delta, Spatial};

use super::{
    altered_column, effective_length, ensure_reference_type_kept, literal_type, MigrationDialect,
};

/// PostgreSQL migration dialect.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect {
    postgis: bool,
}

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect without spatial support.
    #[must_use]
    pub const fn new() -> Self {
        Self { postgis: false }
    }

    /// Enables or disables PostGIS types.
    #[must_use]
    pub const fn with_postgis(mut self, postgis: bool) -> Self {
        self.postgis = postgis;
        self
    }

    fn spatial(&self, kind: &str, spatial: &Spatial, column: &Column) -> Result<String> {
        if !self.postgis {
            return Err(MigrateError::Unsupported(format!(
                "{} column '{}' requires PostGIS",
                kind, column.name
            )));
        }
        let shape = if spatial.dimension > 2 {
            "GEOMETRYZ"
        } else {
            "GEOMETRY"
        };
        Ok(format!("{}({},{})", kind, shape, spatial.srid))
    }
}

impl MigrationDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn type_name(&self, column: &Column, type_: &ColumnType) -> Result<String> {
        let name = match type_ {
            ColumnType::Id => "SERIAL PRIMARY KEY".to_string(),
            ColumnType::BigId => "BIGSERIAL PRIMARY KEY".to_string(),
            ColumnType::String | ColumnType::Password | ColumnType::Upload => {
                format!("VARCHAR({})", effective_length(column, type_).unwrap_or_default())
            }
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Integer | ColumnType::Reference { .. } => "INTEGER".to_string(),
            ColumnType::BigInt | ColumnType::BigReference { .. } => "BIGINT".to_string(),
            ColumnType::Float => "REAL".to_string(),
            ColumnType::Double => "FLOAT8".to_string(),
            ColumnType::Boolean => "CHAR(1)".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::DateTime => "TIMESTAMP".to_string(),
            ColumnType::Blob => "BYTEA".to_string(),
            ColumnType::Json => "JSON".to_string(),
            ColumnType::ListReference { .. } | ColumnType::ListInteger => "BIGINT[]".to_string(),
            ColumnType::ListString => "TEXT[]".to_string(),
            ColumnType::Decimal { precision, scale } => {
                format!("NUMERIC({},{})", precision, scale)
            }
            ColumnType::Geometry(spatial) => self.spatial("geometry", spatial, column)?,
            ColumnType::Geography(spatial) => self.spatial("geography", spatial, column)?,
        };
        Ok(name)
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

        let target = self.quote_identifier(column);
        let mut clauses = Vec::new();

        if modify.type_.is_some() || modify.length.is_set() {
            let altered = altered_column(table, column, modify, existing)?;
            let type_ = altered.column_type()?;
            if type_.is_id() {
                return Err(MigrateError::Unsupported(format!(
                    "changing key column '{}.{}' in place",
                    table, column
                )));
            }
            clauses.push(format!(
                "ALTER COLUMN {} TYPE {}",
                target,
                self.type_name(&altered, &type_)?
            ));
        }

        match &modify.default {
            Delta::Unset => {}
            Delta::Null => clauses.push(format!("ALTER COLUMN {} DROP DEFAULT", target)),
            Delta::Value(default) => clauses.push(format!(
                "ALTER COLUMN {} SET DEFAULT {}",
                target,
                self.default_literal(default, &literal_type(modify, existing))
            )),
        }

        match modify.notnull {
            Some(true) => clauses.push(format!("ALTER COLUMN {} SET NOT NULL", target)),
            Some(false) => clauses.push(format!("ALTER COLUMN {} DROP NOT NULL", target)),
            None => {}
        }

        Ok(vec![format!(
            "ALTER TABLE {} {}",
            self.quote_identifier(table),
            clauses.join(", ")
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DefaultValue, ForeignKey};

    fn existing(column: &Column) -> ColumnChanges {
        ColumnChanges::of_column(column)
    }

    #[test]
    fn test_type_names() {
        let dialect = PostgresDialect::new();
        let cases = [
            ("id", "SERIAL PRIMARY KEY"),
            ("big-id", "BIGSERIAL PRIMARY KEY"),
            ("string", "VARCHAR(512)"),
            ("list:reference tags", "BIGINT[]"),
            ("list:string", "TEXT[]"),
            ("decimal(10,2)", "NUMERIC(10,2)"),
            ("big-reference users", "BIGINT"),
        ];
        for (type_, expected) in cases {
            let column = Column::new("c", type_);
            let parsed = column.column_type().unwrap();
            assert_eq!(dialect.type_name(&column, &parsed).unwrap(), expected);
        }
    }

    #[test]
    fn test_geometry_requires_postgis() {
        let column = Column::new("area", "geometry('public', 4326, 2)");
        let parsed = column.column_type().unwrap();
        assert!(matches!(
            PostgresDialect::new().type_name(&column, &parsed),
            Err(MigrateError::Unsupported(_))
        ));
        assert_eq!(
            PostgresDialect::new()
                .with_postgis(true)
                .type_name(&column, &parsed)
                .unwrap(),
            "geometry(GEOMETRY,4326)"
        );
    }

    #[test]
    fn test_alter_column_single_statement() {
        let dialect = PostgresDialect::new();
        let before = Column::new("name", "string");
        let sql = dialect
            .alter_column(
                "things",
                "name",
                &ColumnChanges::new()
                    .set_length(Some(64))
                    .set_notnull(true)
                    .set_default(Some(DefaultValue::String("x".to_string()))),
                &existing(&before),
            )
            .unwrap();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"things\" ALTER COLUMN \"name\" TYPE VARCHAR(64), \
                 ALTER COLUMN \"name\" SET DEFAULT 'x', \
                 ALTER COLUMN \"name\" SET NOT NULL"
            ]
        );
    }

    #[test]
    fn test_alter_column_drop_default_and_null() {
        let dialect = PostgresDialect::new();
        let before = Column::new("flag", "boolean")
            .notnull()
            .default(DefaultValue::Bool(false));
        let sql = dialect
            .alter_column(
                "things",
                "flag",
                &ColumnChanges::new().set_notnull(false).set_default(None),
                &existing(&before),
            )
            .unwrap();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"things\" ALTER COLUMN \"flag\" DROP DEFAULT, \
                 ALTER COLUMN \"flag\" DROP NOT NULL"
            ]
        );
    }

    #[test]
    fn test_alter_reference_type_unsupported() {
        let dialect = PostgresDialect::new();
        let before = Column::new("owner", "reference users");
        assert!(matches!(
            dialect.alter_column(
                "things",
                "owner",
                &ColumnChanges::new().set_type("bigint"),
                &existing(&before)
            ),
            Err(MigrateError::Unsupported(_))
        ));
    }

    #[test]
    fn test_foreign_key_sql() {
        let dialect = PostgresDialect::new();
        let fk = ForeignKey::new(
            "fk_parts_thing",
            "parts",
            vec!["thing".to_string()],
            "things",
            vec!["id".to_string()],
        )
        .on_delete("SET NULL");
        assert_eq!(
            dialect.create_foreign_key(&fk).unwrap(),
            "ALTER TABLE \"parts\" ADD CONSTRAINT \"fk_parts_thing\" FOREIGN KEY (\"thing\") \
             REFERENCES \"things\" (\"id\") ON DELETE SET NULL"
        );
        assert_eq!(
            dialect.drop_foreign_key("parts", "fk_parts_thing").unwrap(),
            "ALTER TABLE \"parts\" DROP CONSTRAINT \"fk_parts_thing\""
        );
        assert_eq!(dialect.placeholder(2), "$2");
    }
}
