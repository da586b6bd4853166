//! Migration operations.
//!
//! This module defines every schema change a migration can express. Each
//! operation is reversible (given the snapshot it needs), reduces to a
//! canonical [`DiffTuple`], and runs against any [`Engine`].

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::{MigrateError, Result};
use crate::schema::{Column, DefaultValue, Delta, ForeignKey, Index};

/// A sparse set of column attributes.
///
/// Used twice by [`Operation::AlterColumn`]: once for the requested changes
/// and once for the values those attributes had before.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnChanges {
    /// Semantic type.
    pub type_: Option<String>,
    /// Length.
    pub length: Delta<u32>,
    /// Nullability.
    pub notnull: Option<bool>,
    /// Default value.
    pub default: Delta<DefaultValue>,
}

impl ColumnChanges {
    /// Creates empty column changes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a new type.
    #[must_use]
    pub fn set_type(mut self, type_: impl Into<String>) -> Self {
        self.type_ = Some(type_.into());
        self
    }

    /// Sets the length (`None` clears it).
    #[must_use]
    pub fn set_length(mut self, length: Option<u32>) -> Self {
        self.length = Delta::from_option(length);
        self
    }

    /// Sets nullability.
    #[must_use]
    pub const fn set_notnull(mut self, notnull: bool) -> Self {
        self.notnull = Some(notnull);
        self
    }

    /// Sets the default value (`None` drops it).
    #[must_use]
    pub fn set_default(mut self, default: Option<DefaultValue>) -> Self {
        self.default = Delta::from_option(default);
        self
    }

    /// Captures every attribute of a column.
    #[must_use]
    pub fn of_column(column: &Column) -> Self {
        Self {
            type_: Some(column.type_.clone()),
            length: Delta::from_option(column.length),
            notnull: Some(column.notnull),
            default: Delta::from_option(column.default.clone()),
        }
    }

    /// Returns true if no attribute is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.type_.is_none()
            && !self.length.is_set()
            && self.notnull.is_none()
            && !self.default.is_set()
    }
}

/// A single change to one column attribute, as seen in a diff tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnDelta {
    /// Type change.
    Type {
        /// Previous type, if known.
        from: Option<String>,
        /// New type.
        to: String,
    },
    /// Length change.
    Length {
        /// Previous length.
        from: Delta<u32>,
        /// New length.
        to: Delta<u32>,
    },
    /// Nullability change.
    Notnull {
        /// Previous nullability, if known.
        from: Option<bool>,
        /// New nullability.
        to: bool,
    },
    /// Default change.
    Default {
        /// Previous default.
        from: Delta<DefaultValue>,
        /// New default.
        to: Delta<DefaultValue>,
    },
}

/// Canonical, snapshot-free form of an operation.
///
/// Two operations with equal diff tuples have the same effect.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffTuple {
    /// `add_table`
    AddTable {
        /// Table name.
        table: String,
        /// Columns in order.
        columns: Vec<Column>,
    },
    /// `remove_table`
    RemoveTable {
        /// Table name.
        table: String,
    },
    /// `add_column`
    AddColumn {
        /// Table name.
        table: String,
        /// New column.
        column: Column,
    },
    /// `remove_column`
    RemoveColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// `modify_column`
    ModifyColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Only the attributes that change.
        changes: Vec<ColumnDelta>,
    },
    /// `add_index`
    AddIndex(Index),
    /// `remove_index`
    RemoveIndex {
        /// Table name.
        table: String,
        /// Index name.
        name: String,
    },
    /// `add_fk`
    AddForeignKey(ForeignKey),
    /// `remove_fk`
    RemoveForeignKey {
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
    },
}

/// A single migration operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Create a new table.
    CreateTable {
        /// Table name.
        table: String,
        /// Column definitions.
        columns: Vec<Column>,
    },

    /// Drop a table.
    DropTable {
        /// Table name.
        table: String,
        /// Columns of the dropped table, needed to reverse.
        snapshot: Option<Vec<Column>>,
    },

    /// Add a column to a table.
    AddColumn {
        /// Table name.
        table: String,
        /// Column definition.
        column: Column,
    },

    /// Drop a column from a table.
    DropColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// The dropped column, needed to reverse.
        snapshot: Option<Column>,
    },

    /// Alter attributes of a column.
    AlterColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Requested changes.
        modify: ColumnChanges,
        /// Values before the change.
        existing: ColumnChanges,
    },

    /// Create an index.
    CreateIndex {
        /// Index definition.
        index: Index,
    },

    /// Drop an index.
    DropIndex {
        /// Table name.
        table: String,
        /// Index name.
        name: String,
        /// The dropped index, needed to reverse.
        snapshot: Option<Index>,
    },

    /// Add a foreign key constraint.
    CreateForeignKey {
        /// Constraint definition.
        foreign_key: ForeignKey,
    },

    /// Drop a foreign key constraint.
    DropForeignKey {
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
        /// The dropped constraint, needed to reverse.
        snapshot: Option<ForeignKey>,
    },
}

impl Operation {
    /// Creates a CreateTable operation.
    #[must_use]
    pub fn create_table(table: impl Into<String>, columns: Vec<Column>) -> Self {
        Self::CreateTable {
            table: table.into(),
            columns,
        }
    }

    /// Creates a DropTable operation without snapshot.
    #[must_use]
    pub fn drop_table(table: impl Into<String>) -> Self {
        Self::DropTable {
            table: table.into(),
            snapshot: None,
        }
    }

    /// Creates an AddColumn operation.
    #[must_use]
    pub fn add_column(table: impl Into<String>, column: Column) -> Self {
        Self::AddColumn {
            table: table.into(),
            column,
        }
    }

    /// Creates a DropColumn operation without snapshot.
    #[must_use]
    pub fn drop_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::DropColumn {
            table: table.into(),
            column: column.into(),
            snapshot: None,
        }
    }

    /// Creates an AlterColumn operation.
    #[must_use]
    pub fn alter_column(
        table: impl Into<String>,
        column: impl Into<String>,
        modify: ColumnChanges,
        existing: ColumnChanges,
    ) -> Self {
        Self::AlterColumn {
            table: table.into(),
            column: column.into(),
            modify,
            existing,
        }
    }

    /// Creates a CreateIndex operation.
    #[must_use]
    pub const fn create_index(index: Index) -> Self {
        Self::CreateIndex { index }
    }

    /// Creates a DropIndex operation without snapshot.
    #[must_use]
    pub fn drop_index(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self::DropIndex {
            table: table.into(),
            name: name.into(),
            snapshot: None,
        }
    }

    /// Creates a CreateForeignKey operation.
    #[must_use]
    pub const fn create_foreign_key(foreign_key: ForeignKey) -> Self {
        Self::CreateForeignKey { foreign_key }
    }

    /// Creates a DropForeignKey operation without snapshot.
    #[must_use]
    pub fn drop_foreign_key(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self::DropForeignKey {
            table: table.into(),
            name: name.into(),
            snapshot: None,
        }
    }

    /// Attaches the original object to a Drop* operation.
    ///
    /// Has no effect on other operations.
    #[must_use]
    pub fn with_table_snapshot(mut self, columns: Vec<Column>) -> Self {
        if let Self::DropTable { snapshot, .. } = &mut self {
            *snapshot = Some(columns);
        }
        self
    }

    /// Attaches a column snapshot to a DropColumn operation.
    #[must_use]
    pub fn with_column_snapshot(mut self, column: Column) -> Self {
        if let Self::DropColumn { snapshot, .. } = &mut self {
            *snapshot = Some(column);
        }
        self
    }

    /// Attaches an index snapshot to a DropIndex operation.
    #[must_use]
    pub fn with_index_snapshot(mut self, index: Index) -> Self {
        if let Self::DropIndex { snapshot, .. } = &mut self {
            *snapshot = Some(index);
        }
        self
    }

    /// Attaches a constraint snapshot to a DropForeignKey operation.
    #[must_use]
    pub fn with_foreign_key_snapshot(mut self, foreign_key: ForeignKey) -> Self {
        if let Self::DropForeignKey { snapshot, .. } = &mut self {
            *snapshot = Some(foreign_key);
        }
        self
    }

    /// Returns the operation that undoes this one.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Irreversible`] for Drop* operations without a
    /// snapshot and for alterations whose previous values are unknown.
    pub fn reverse(&self) -> Result<Self> {
        match self {
            Self::CreateTable { table, columns } => {
                Ok(Self::drop_table(table.clone()).with_table_snapshot(columns.clone()))
            }

            Self::DropTable { table, snapshot } => snapshot
                .as_ref()
                .map(|columns| Self::create_table(table.clone(), columns.clone()))
                .ok_or_else(|| self.irreversible()),

            Self::AddColumn { table, column } => Ok(Self::drop_column(
                table.clone(),
                column.name.clone(),
            )
            .with_column_snapshot(column.clone())),

            Self::DropColumn {
                table, snapshot, ..
            } => snapshot
                .as_ref()
                .map(|column| Self::add_column(table.clone(), column.clone()))
                .ok_or_else(|| self.irreversible()),

            Self::AlterColumn {
                table,
                column,
                modify,
                existing,
            } => {
                let (modify, existing) =
                    swap_changes(modify, existing).ok_or_else(|| self.irreversible())?;
                Ok(Self::alter_column(
                    table.clone(),
                    column.clone(),
                    modify,
                    existing,
                ))
            }

            Self::CreateIndex { index } => Ok(Self::drop_index(
                index.name.clone(),
                index.table.clone(),
            )
            .with_index_snapshot(index.clone())),

            Self::DropIndex { snapshot, .. } => snapshot
                .as_ref()
                .map(|index| Self::create_index(index.clone()))
                .ok_or_else(|| self.irreversible()),

            Self::CreateForeignKey { foreign_key } => Ok(Self::drop_foreign_key(
                foreign_key.name.clone(),
                foreign_key.table.clone(),
            )
            .with_foreign_key_snapshot(foreign_key.clone())),

            Self::DropForeignKey { snapshot, .. } => snapshot
                .as_ref()
                .map(|fk| Self::create_foreign_key(fk.clone()))
                .ok_or_else(|| self.irreversible()),
        }
    }

    fn irreversible(&self) -> MigrateError {
        MigrateError::Irreversible(self.description())
    }

    /// Returns true if [`reverse`](Self::reverse) would succeed.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        match self {
            Self::CreateTable { .. }
            | Self::AddColumn { .. }
            | Self::CreateIndex { .. }
            | Self::CreateForeignKey { .. } => true,
            Self::DropTable { snapshot, .. } => snapshot.is_some(),
            Self::DropColumn { snapshot, .. } => snapshot.is_some(),
            Self::DropIndex { snapshot, .. } => snapshot.is_some(),
            Self::DropForeignKey { snapshot, .. } => snapshot.is_some(),
            Self::AlterColumn {
                modify, existing, ..
            } => swap_changes(modify, existing).is_some(),
        }
    }

    /// Reduces the operation to its canonical diff tuple.
    #[must_use]
    pub fn to_diff_tuple(&self) -> DiffTuple {
        match self {
            Self::CreateTable { table, columns } => DiffTuple::AddTable {
                table: table.clone(),
                columns: columns.clone(),
            },
            Self::DropTable { table, .. } => DiffTuple::RemoveTable {
                table: table.clone(),
            },
            Self::AddColumn { table, column } => DiffTuple::AddColumn {
                table: table.clone(),
                column: column.clone(),
            },
            Self::DropColumn { table, column, .. } => DiffTuple::RemoveColumn {
                table: table.clone(),
                column: column.clone(),
            },
            Self::AlterColumn {
                table,
                column,
                modify,
                existing,
            } => DiffTuple::ModifyColumn {
                table: table.clone(),
                column: column.clone(),
                changes: column_deltas(modify, existing),
            },
            Self::CreateIndex { index } => DiffTuple::AddIndex(index.clone()),
            Self::DropIndex { table, name, .. } => DiffTuple::RemoveIndex {
                table: table.clone(),
                name: name.clone(),
            },
            Self::CreateForeignKey { foreign_key } => DiffTuple::AddForeignKey(foreign_key.clone()),
            Self::DropForeignKey { table, name, .. } => DiffTuple::RemoveForeignKey {
                table: table.clone(),
                name: name.clone(),
            },
        }
    }

    /// Returns true for an AlterColumn that changes nothing.
    ///
    /// Every other operation always has changes.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        match self {
            Self::AlterColumn { modify, .. } => !modify.is_empty(),
            _ => true,
        }
    }

    /// Runs the operation against an engine.
    ///
    /// # Errors
    ///
    /// Propagates whatever the engine reports.
    pub fn run(&self, engine: &mut dyn Engine) -> Result<()> {
        match self {
            Self::CreateTable { table, columns } => engine.create_table(table, columns),
            Self::DropTable { table, .. } => engine.drop_table(table),
            Self::AddColumn { table, column } => engine.add_column(table, column),
            Self::DropColumn { table, column, .. } => engine.drop_column(table, column),
            Self::AlterColumn {
                table,
                column,
                modify,
                existing,
            } => engine.alter_column(table, column, modify, existing),
            Self::CreateIndex { index } => engine.create_index(index),
            Self::DropIndex { table, name, .. } => engine.drop_index(table, name),
            Self::CreateForeignKey { foreign_key } => {
                engine.create_foreign_key_constraint(foreign_key)
            }
            Self::DropForeignKey { table, name, .. } => {
                engine.drop_foreign_key_constraint(table, name)
            }
        }
    }

    /// Returns the table this operation touches.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { table, .. }
            | Self::DropTable { table, .. }
            | Self::AddColumn { table, .. }
            | Self::DropColumn { table, .. }
            | Self::AlterColumn { table, .. }
            | Self::DropIndex { table, .. }
            | Self::DropForeignKey { table, .. } => table,
            Self::CreateIndex { index } => &index.table,
            Self::CreateForeignKey { foreign_key } => &foreign_key.table,
        }
    }

    /// Returns a human-readable description of this operation.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateTable { table, .. } => format!("Create table '{}'", table),
            Self::DropTable { table, .. } => format!("Drop table '{}'", table),
            Self::AddColumn { table, column } => {
                format!("Add column '{}' to table '{}'", column.name, table)
            }
            Self::DropColumn { table, column, .. } => {
                format!("Drop column '{}' from table '{}'", column, table)
            }
            Self::AlterColumn { table, column, .. } => {
                format!("Alter column '{}' in table '{}'", column, table)
            }
            Self::CreateIndex { index } => {
                format!("Create index '{}' on table '{}'", index.name, index.table)
            }
            Self::DropIndex { table, name, .. } => {
                format!("Drop index '{}' from table '{}'", name, table)
            }
            Self::CreateForeignKey { foreign_key } => format!(
                "Add foreign key '{}' to table '{}'",
                foreign_key.name, foreign_key.table
            ),
            Self::DropForeignKey { table, name, .. } => {
                format!("Drop foreign key '{}' from table '{}'", name, table)
            }
        }
    }
}

/// Swaps each requested change with its previous value.
///
/// Returns `None` when a requested change has no known previous value.
fn swap_changes(
    modify: &ColumnChanges,
    existing: &ColumnChanges,
) -> Option<(ColumnChanges, ColumnChanges)> {
    let mut new_modify = ColumnChanges::default();
    let mut new_existing = existing.clone();

    if let Some(type_) = &modify.type_ {
        new_modify.type_ = Some(existing.type_.clone()?);
        new_existing.type_ = Some(type_.clone());
    }
    if modify.length.is_set() {
        if !existing.length.is_set() {
            return None;
        }
        new_modify.length = existing.length.clone();
        new_existing.length = modify.length.clone();
    }
    if let Some(notnull) = modify.notnull {
        new_modify.notnull = Some(existing.notnull?);
        new_existing.notnull = Some(notnull);
    }
    if modify.default.is_set() {
        if !existing.default.is_set() {
            return None;
        }
        new_modify.default = existing.default.clone();
        new_existing.default = modify.default.clone();
    }

    Some((new_modify, new_existing))
}

fn column_deltas(modify: &ColumnChanges, existing: &ColumnChanges) -> Vec<ColumnDelta> {
    let mut deltas = Vec::new();
    if let Some(type_) = &modify.type_ {
        deltas.push(ColumnDelta::Type {
            from: existing.type_.clone(),
            to: type_.clone(),
        });
    }
    if modify.length.is_set() {
        deltas.push(ColumnDelta::Length {
            from: existing.length.clone(),
            to: modify.length.clone(),
        });
    }
    if let Some(notnull) = modify.notnull {
        deltas.push(ColumnDelta::Notnull {
            from: existing.notnull,
            to: notnull,
        });
    }
    if modify.default.is_set() {
        deltas.push(ColumnDelta::Default {
            from: existing.default.clone(),
            to: modify.default.clone(),
        });
    }
    deltas
}

/// Operations that move the schema forward.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UpgradeOps {
    /// Operations in execution order.
    pub ops: Vec<Operation>,
}

/// Operations that move the schema back.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DowngradeOps {
    /// Operations in execution order.
    pub ops: Vec<Operation>,
}

fn reverse_all(ops: &[Operation]) -> Result<Vec<Operation>> {
    ops.iter().rev().map(Operation::reverse).collect()
}

impl UpgradeOps {
    /// Wraps a list of operations.
    #[must_use]
    pub const fn new(ops: Vec<Operation>) -> Self {
        Self { ops }
    }

    /// Returns true if there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Reverses every operation, in reverse order.
    ///
    /// # Errors
    ///
    /// Fails on the first irreversible operation.
    pub fn reverse(&self) -> Result<DowngradeOps> {
        reverse_all(&self.ops).map(DowngradeOps::new)
    }

    /// Returns the diff tuples of all operations.
    #[must_use]
    pub fn diff_tuples(&self) -> Vec<DiffTuple> {
        self.ops.iter().map(Operation::to_diff_tuple).collect()
    }
}

impl DowngradeOps {
    /// Wraps a list of operations.
    #[must_use]
    pub const fn new(ops: Vec<Operation>) -> Self {
        Self { ops }
    }

    /// Returns true if there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Reverses every operation, in reverse order.
    ///
    /// # Errors
    ///
    /// Fails on the first irreversible operation.
    pub fn reverse(&self) -> Result<UpgradeOps> {
        reverse_all(&self.ops).map(UpgradeOps::new)
    }

    /// Returns the diff tuples of all operations.
    #[must_use]
    pub fn diff_tuples(&self) -> Vec<DiffTuple> {
        self.ops.iter().map(Operation::to_diff_tuple).collect()
    }
}
