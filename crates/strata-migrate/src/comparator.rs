//! Comparator for generating migrations from schema changes.
//!
//! This module compares the live schema declared by the application against
//! a [`Catalog`] rebuilt from migration history and emits the operations
//! that turn the catalog into the live schema.
//!
//! Output order is fully determined by declaration order: additions follow
//! the live schema, removals follow the catalog. Foreign keys are not
//! compared and renames surface as a drop plus an add.

use crate::catalog::Catalog;
use crate::operations::{ColumnChanges, Operation, UpgradeOps};
use crate::schema::{Column, Delta, Index, Schema, Table};

/// Detects schema changes and generates migration operations.
#[derive(Debug, Default, Clone, Copy)]
pub struct Comparator;

impl Comparator {
    /// Compares the live schema against the catalog.
    #[must_use]
    pub fn compare(live: &Schema, catalog: &Catalog) -> UpgradeOps {
        let mut operations = Vec::new();

        // Tables to create, in live order
        for table in live.tables.values() {
            if catalog.get_table(&table.name).is_none() {
                operations.push(Operation::create_table(
                    table.name.clone(),
                    table.columns.values().cloned().collect(),
                ));
                for index in table.indexes.values() {
                    operations.push(Operation::create_index(index.clone()));
                }
            }
        }

        // Tables to drop, in catalog order
        for table in catalog.tables().values() {
            if live.get_table(&table.name).is_none() {
                operations.extend(Self::drop_table(table));
            }
        }

        // Tables on both sides, in live order
        for table in live.tables.values() {
            if let Some(existing) = catalog.get_table(&table.name) {
                operations.extend(Self::diff_table(table, existing));
            }
        }

        UpgradeOps::new(operations)
    }

    fn drop_table(table: &Table) -> Vec<Operation> {
        let mut operations: Vec<Operation> = table
            .indexes
            .values()
            .map(|index| {
                Operation::drop_index(index.name.clone(), table.name.clone())
                    .with_index_snapshot(index.clone())
            })
            .collect();
        operations.push(
            Operation::drop_table(table.name.clone())
                .with_table_snapshot(table.columns.values().cloned().collect()),
        );
        operations
    }

    /// Compares two versions of one table.
    ///
    /// Index drops come before any column change and index creates after,
    /// so no index ever refers to a missing column in either direction.
    fn diff_table(live: &Table, existing: &Table) -> Vec<Operation> {
        let (drops, creates) = Self::diff_indexes(live, existing);
        let mut operations = drops;
        let name = &live.name;

        for column in live.columns.values() {
            if !existing.columns.contains_key(&column.name) {
                operations.push(Operation::add_column(name.clone(), column.clone()));
            }
        }

        for column in existing.columns.values() {
            if !live.columns.contains_key(&column.name) {
                operations.push(
                    Operation::drop_column(name.clone(), column.name.clone())
                        .with_column_snapshot(column.clone()),
                );
            }
        }

        for column in live.columns.values() {
            if let Some(before) = existing.columns.get(&column.name) {
                let alter = Self::diff_column(name, column, before);
                if alter.has_changes() {
                    operations.push(alter);
                }
            }
        }

        operations.extend(creates);
        operations
    }

    /// Builds an AlterColumn; callers discard it when it has no changes.
    fn diff_column(table: &str, live: &Column, existing: &Column) -> Operation {
        let mut modify = ColumnChanges::new();

        if live.notnull != existing.notnull {
            modify.notnull = Some(live.notnull);
        }
        if live.type_ != existing.type_ {
            modify.type_ = Some(live.type_.clone());
        }
        if live.length != existing.length {
            modify.length = Delta::from_option(live.length);
        }
        if live.default != existing.default {
            modify.default = Delta::from_option(live.default.clone());
        }

        Operation::alter_column(
            table,
            live.name.clone(),
            modify,
            ColumnChanges::of_column(existing),
        )
    }

    /// Returns the index drops and the index creates for one table.
    fn diff_indexes(live: &Table, existing: &Table) -> (Vec<Operation>, Vec<Operation>) {
        let mut drops = Vec::new();
        let mut creates = Vec::new();

        for index in existing.indexes.values() {
            match live.indexes.get(&index.name) {
                None => drops.push(Self::drop_index(index)),
                Some(wanted) if !Self::same_index(wanted, index) => {
                    drops.push(Self::drop_index(index));
                }
                Some(_) => {}
            }
        }

        for index in live.indexes.values() {
            match existing.indexes.get(&index.name) {
                None => creates.push(Operation::create_index(index.clone())),
                Some(current) if !Self::same_index(index, current) => {
                    creates.push(Operation::create_index(index.clone()));
                }
                Some(_) => {}
            }
        }

        (drops, creates)
    }

    fn drop_index(index: &Index) -> Operation {
        Operation::drop_index(index.name.clone(), index.table.clone())
            .with_index_snapshot(index.clone())
    }

    fn same_index(a: &Index, b: &Index) -> bool {
        a.fields == b.fields
            && a.expressions == b.expressions
            && a.unique == b.unique
            && a.where_clause == b.where_clause
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MetaEngine;
    use crate::operations::{ColumnDelta, DiffTuple};

    fn things() -> Table {
        Table::new("t")
            .column(Column::new("id", "id"))
            .column(Column::new("name", "string"))
    }

    fn catalog_of(schema: &Schema) -> Catalog {
        let mut catalog = Catalog::new();
        let ops = Comparator::compare(schema, &catalog);
        let mut engine = MetaEngine::new(&mut catalog);
        for op in &ops.ops {
            op.run(&mut engine).unwrap();
        }
        catalog
    }

    #[test]
    fn test_identical_schema_is_empty() {
        let schema = Schema::new()
            .table(things().index(Index::new("idx_name", "t", ["name"]).unique()))
            .table(Table::new("u").column(Column::new("id", "id")));
        let catalog = catalog_of(&schema);
        assert!(Comparator::compare(&schema, &catalog).is_empty());
    }

    #[test]
    fn test_new_table() {
        let live = Schema::new().table(things());
        let ops = Comparator::compare(&live, &Catalog::new());
        assert_eq!(
            ops.diff_tuples(),
            vec![DiffTuple::AddTable {
                table: "t".to_string(),
                columns: vec![Column::new("id", "id"), Column::new("name", "string")],
            }]
        );
    }

    #[test]
    fn test_new_column_and_reverse() {
        let catalog = catalog_of(&Schema::new().table(things()));
        let live = Schema::new().table(things().column(Column::new("age", "integer")));
        let ops = Comparator::compare(&live, &catalog);
        assert_eq!(
            ops.ops,
            vec![Operation::add_column("t", Column::new("age", "integer"))]
        );
        assert_eq!(
            ops.reverse().unwrap().diff_tuples(),
            vec![DiffTuple::RemoveColumn {
                table: "t".to_string(),
                column: "age".to_string()
            }]
        );
    }

    #[test]
    fn test_removed_column_carries_snapshot() {
        let catalog = catalog_of(&Schema::new().table(things()));
        let live = Schema::new().table(Table::new("t").column(Column::new("id", "id")));
        let ops = Comparator::compare(&live, &catalog);
        assert_eq!(ops.ops.len(), 1);
        assert_eq!(
            ops.ops[0].reverse().unwrap(),
            Operation::add_column("t", Column::new("name", "string"))
        );
    }

    #[test]
    fn test_notnull_change_is_minimal() {
        let catalog = catalog_of(&Schema::new().table(things()));
        let live = Schema::new().table(
            Table::new("t")
                .column(Column::new("id", "id"))
                .column(Column::new("name", "string").notnull()),
        );
        let ops = Comparator::compare(&live, &catalog);
        assert_eq!(
            ops.diff_tuples(),
            vec![DiffTuple::ModifyColumn {
                table: "t".to_string(),
                column: "name".to_string(),
                changes: vec![ColumnDelta::Notnull {
                    from: Some(false),
                    to: true
                }],
            }]
        );
    }

    #[test]
    fn test_dropped_table_drops_indexes_first() {
        let catalog = catalog_of(
            &Schema::new().table(things().index(Index::new("idx_name", "t", ["name"]))),
        );
        let ops = Comparator::compare(&Schema::new(), &catalog);
        assert_eq!(
            ops.diff_tuples(),
            vec![
                DiffTuple::RemoveIndex {
                    table: "t".to_string(),
                    name: "idx_name".to_string()
                },
                DiffTuple::RemoveTable {
                    table: "t".to_string()
                },
            ]
        );
        assert!(ops.reverse().is_ok());
    }

    #[test]
    fn test_changed_index_is_dropped_and_recreated() {
        let catalog = catalog_of(
            &Schema::new().table(things().index(Index::new("idx_name", "t", ["name"]))),
        );
        let live =
            Schema::new().table(things().index(Index::new("idx_name", "t", ["name"]).unique()));
        let ops = Comparator::compare(&live, &catalog);
        assert_eq!(ops.ops.len(), 2);
        assert!(matches!(ops.ops[0], Operation::DropIndex { .. }));
        assert!(matches!(
            &ops.ops[1],
            Operation::CreateIndex { index } if index.unique
        ));
    }

    #[test]
    fn test_index_drop_precedes_column_drop() {
        let catalog = catalog_of(
            &Schema::new().table(things().index(Index::new("idx_name", "t", ["name"]))),
        );
        let live = Schema::new().table(
            Table::new("t")
                .column(Column::new("id", "id"))
                .column(Column::new("age", "integer"))
                .index(Index::new("idx_age", "t", ["age"])),
        );
        let ops = Comparator::compare(&live, &catalog);
        assert_eq!(
            ops.diff_tuples(),
            vec![
                DiffTuple::RemoveIndex {
                    table: "t".to_string(),
                    name: "idx_name".to_string()
                },
                DiffTuple::AddColumn {
                    table: "t".to_string(),
                    column: Column::new("age", "integer")
                },
                DiffTuple::RemoveColumn {
                    table: "t".to_string(),
                    column: "name".to_string()
                },
                DiffTuple::AddIndex(Index::new("idx_age", "t", ["age"])),
            ]
        );
    }

    #[test]
    fn test_ordering_follows_declarations() {
        let catalog = catalog_of(
            &Schema::new()
                .table(Table::new("b").column(Column::new("id", "id")))
                .table(Table::new("a").column(Column::new("id", "id"))),
        );
        let live = Schema::new()
            .table(Table::new("z").column(Column::new("id", "id")))
            .table(Table::new("y").column(Column::new("id", "id")));
        let ops = Comparator::compare(&live, &catalog);
        let tables: Vec<&str> = ops.ops.iter().map(Operation::table).collect();
        assert_eq!(tables, vec!["z", "y", "b", "a"]);
        assert_eq!(ops, Comparator::compare(&live, &catalog));
    }
}
