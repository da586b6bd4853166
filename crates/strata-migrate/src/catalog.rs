//! Virtual schema reconstructed from migration history.
//!
//! A [`Catalog`] is the schema "as of revision X". It is built fresh for
//! every diff by replaying migrations through a
//! [`MetaEngine`](crate::engine::MetaEngine) and never touches a database.

use indexmap::IndexMap;

use crate::error::{MigrateError, Result};
use crate::operations::ColumnChanges;
use crate::schema::{Column, Delta, ForeignKey, Index, Table};

/// In-memory table-name to table map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    tables: IndexMap<String, Table>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all tables in creation order.
    #[must_use]
    pub const fn tables(&self) -> &IndexMap<String, Table> {
        &self.tables
    }

    /// Gets a table by name.
    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| MigrateError::unknown("table", name))
    }

    /// Creates a table from its columns.
    ///
    /// # Errors
    ///
    /// Fails if the table exists or two columns share a name.
    pub fn create_table(&mut self, name: &str, columns: &[Column]) -> Result<()> {
        if self.tables.contains_key(name) {
            return Err(MigrateError::duplicate("table", name));
        }
        let table = Table::from_parts(name, columns.to_vec(), Vec::new())?;
        self.tables.insert(name.to_string(), table);
        Ok(())
    }

    /// Drops a table along with its indexes and foreign keys.
    ///
    /// # Errors
    ///
    /// Fails if the table doesn't exist.
    pub fn drop_table(&mut self, name: &str) -> Result<Table> {
        self.tables
            .shift_remove(name)
            .ok_or_else(|| MigrateError::unknown("table", name))
    }

    /// Appends a column to a table.
    ///
    /// # Errors
    ///
    /// Fails if the table is missing or already has the column.
    pub fn add_column(&mut self, table: &str, column: &Column) -> Result<()> {
        let t = self.table_mut(table)?;
        if t.columns.contains_key(&column.name) {
            return Err(MigrateError::duplicate(
                "column",
                format!("{}.{}", table, column.name),
            ));
        }
        t.columns.insert(column.name.clone(), column.clone());
        Ok(())
    }

    /// Removes a column from a table.
    ///
    /// # Errors
    ///
    /// Fails if the table or column doesn't exist.
    pub fn drop_column(&mut self, table: &str, name: &str) -> Result<Column> {
        let t = self.table_mut(table)?;
        t.columns
            .shift_remove(name)
            .ok_or_else(|| MigrateError::unknown("column", format!("{}.{}", table, name)))
    }

    /// Replaces a column with a copy carrying the requested changes.
    ///
    /// The column keeps its position in the table.
    ///
    /// # Errors
    ///
    /// Fails if the table or column doesn't exist.
    pub fn change_column(
        &mut self,
        table: &str,
        name: &str,
        changes: &ColumnChanges,
    ) -> Result<()> {
        let t = self.table_mut(table)?;
        let slot = t
            .columns
            .get_mut(name)
            .ok_or_else(|| MigrateError::unknown("column", format!("{}.{}", table, name)))?;

        let mut column = slot.clone();
        if let Some(type_) = &changes.type_ {
            column.type_.clone_from(type_);
        }
        match &changes.length {
            Delta::Unset => {}
            Delta::Null => column.length = None,
            Delta::Value(length) => column.length = Some(*length),
        }
        if let Some(notnull) = changes.notnull {
            column.notnull = notnull;
        }
        match &changes.default {
            Delta::Unset => {}
            Delta::Null => column.default = None,
            Delta::Value(default) => column.default = Some(default.clone()),
        }
        *slot = column;
        Ok(())
    }

    /// Creates an index on a table.
    ///
    /// # Errors
    ///
    /// Fails if the table is missing, the name is taken, or a field is unknown.
    pub fn create_index(&mut self, index: &Index) -> Result<()> {
        let t = self.table_mut(&index.table)?;
        if t.indexes.contains_key(&index.name) {
            return Err(MigrateError::duplicate(
                "index",
                format!("{}.{}", index.table, index.name),
            ));
        }
        if let Some(field) = index.fields.iter().find(|f| !t.columns.contains_key(*f)) {
            return Err(MigrateError::unknown(
                "column",
                format!("{}.{}", index.table, field),
            ));
        }
        t.indexes.insert(index.name.clone(), index.clone());
        Ok(())
    }

    /// Drops an index from a table.
    ///
    /// # Errors
    ///
    /// Fails if the table or index doesn't exist.
    pub fn drop_index(&mut self, table: &str, name: &str) -> Result<Index> {
        let t = self.table_mut(table)?;
        t.indexes
            .shift_remove(name)
            .ok_or_else(|| MigrateError::unknown("index", format!("{}.{}", table, name)))
    }

    /// Records a foreign key constraint.
    ///
    /// # Errors
    ///
    /// Fails if the table is missing, the name is taken, or a column is unknown.
    pub fn create_foreign_key(&mut self, fk: &ForeignKey) -> Result<()> {
        let t = self.table_mut(&fk.table)?;
        if t.foreign_keys.contains_key(&fk.name) {
            return Err(MigrateError::duplicate(
                "foreign key",
                format!("{}.{}", fk.table, fk.name),
            ));
        }
        if let Some(column) = fk.columns.iter().find(|c| !t.columns.contains_key(*c)) {
            return Err(MigrateError::unknown(
                "column",
                format!("{}.{}", fk.table, column),
            ));
        }
        t.foreign_keys.insert(fk.name.clone(), fk.clone());
        Ok(())
    }

    /// Removes a foreign key constraint.
    ///
    /// # Errors
    ///
    /// Fails if the table or constraint doesn't exist.
    pub fn drop_foreign_key(&mut self, table: &str, name: &str) -> Result<ForeignKey> {
        let t = self.table_mut(table)?;
        t.foreign_keys
            .shift_remove(name)
            .ok_or_else(|| MigrateError::unknown("foreign key", format!("{}.{}", table, name)))
    }
}
