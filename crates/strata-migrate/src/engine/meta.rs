use tracing::trace;

use crate::catalog::Catalog;
use crate::engine::Engine;
use crate::error::Result;
use crate::operations::ColumnChanges;
use crate::schema::{Column, ForeignKey, Index};

/// Engine that only mutates a borrowed catalog.
#[derive(Debug)]
pub struct MetaEngine<'a> {
    catalog: &'a mut Catalog,
}

impl<'a> MetaEngine<'a> {
    /// Binds the engine to a catalog.
    pub fn new(catalog: &'a mut Catalog) -> Self {
        Self { catalog }
    }
}

impl Engine for MetaEngine<'_> {
    fn create_table(&mut self, table: &str, columns: &[Column]) -> Result<()> {
        trace!(table, "catalog: create table");
        self.catalog.create_table(table, columns)
    }

    fn drop_table(&mut self, table: &str) -> Result<()> {
        trace!(table, "catalog: drop table");
        self.catalog.drop_table(table).map(drop)
    }

    fn add_column(&mut self, table: &str, column: &Column) -> Result<()> {
        self.catalog.add_column(table, column)
    }

    fn drop_column(&mut self, table: &str, column: &str) -> Result<()> {
        self.catalog.drop_column(table, column).map(drop)
    }

    fn alter_column(
        &mut self,
        table: &str,
        column: &str,
        modify: &ColumnChanges,
        _existing: &ColumnChanges,
    ) -> Result<()> {
        self.catalog.change_column(table, column, modify)
    }

    fn create_index(&mut self, index: &Index) -> Result<()> {
        self.catalog.create_index(index)
    }

    fn drop_index(&mut self, table: &str, name: &str) -> Result<()> {
        self.catalog.drop_index(table, name).map(drop)
    }

    fn create_foreign_key_constraint(&mut self, foreign_key: &ForeignKey) -> Result<()> {
        self.catalog.create_foreign_key(foreign_key)
    }

    fn drop_foreign_key_constraint(&mut self, table: &str, name: &str) -> Result<()> {
        self.catalog.drop_foreign_key(table, name).map(drop)
    }
}
