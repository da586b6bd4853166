//! Schema representation types.
//!
//! These types describe the structure of database tables and are used both
//! by the live schema feed (what the application declares) and by the
//! catalog (what migration history has created so far).

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// Length used for string-like columns declared without one.
pub const DEFAULT_STRING_LENGTH: u32 = 512;

/// On-delete action applied to reference columns unless told otherwise.
pub const DEFAULT_ONDELETE: &str = "CASCADE";

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultValue {
    /// Boolean default.
    Bool(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String default.
    String(String),
    /// Raw SQL expression (e.g., "CURRENT_TIMESTAMP").
    Expression(String),
}

/// A value that distinguishes "no change requested" from an explicit NULL.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Delta<T> {
    /// Nothing requested.
    #[default]
    Unset,
    /// Explicitly set to NULL / no value.
    Null,
    /// Set to a value.
    Value(T),
}

impl<T> Delta<T> {
    /// Returns true unless this is `Unset`.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }

    /// Builds a set delta from an optional value (`None` becomes `Null`).
    #[must_use]
    pub fn from_option(value: Option<T>) -> Self {
        value.map_or(Self::Null, Self::Value)
    }

    /// Resolves a set delta to the optional value it stands for.
    ///
    /// Returns `None` for `Unset`.
    #[must_use]
    pub fn resolved(&self) -> Option<Option<&T>> {
        match self {
            Self::Unset => None,
            Self::Null => Some(None),
            Self::Value(v) => Some(Some(v)),
        }
    }
}

/// A parsed semantic column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-incrementing integer primary key.
    Id,
    /// Auto-incrementing 64-bit primary key.
    BigId,
    /// Bounded string.
    String,
    /// Unbounded text.
    Text,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// Single precision float.
    Float,
    /// Double precision float.
    Double,
    /// Boolean.
    Boolean,
    /// Date only.
    Date,
    /// Time only.
    Time,
    /// Date and time.
    DateTime,
    /// Binary large object.
    Blob,
    /// JSON document.
    Json,
    /// Password hash (stored as a string).
    Password,
    /// Uploaded file name (stored as a string).
    Upload,
    /// Reference to another table's key.
    Reference {
        /// Referenced table.
        table: String,
        /// Referenced field, `id` when omitted.
        field: Option<String>,
    },
    /// 64-bit reference to another table's key.
    BigReference {
        /// Referenced table.
        table: String,
        /// Referenced field, `id` when omitted.
        field: Option<String>,
    },
    /// List of references, stored without a constraint.
    ListReference {
        /// Referenced table.
        table: String,
    },
    /// List of strings.
    ListString,
    /// List of integers.
    ListInteger,
    /// Fixed precision decimal.
    Decimal {
        /// Total digits.
        precision: u32,
        /// Digits after the decimal point.
        scale: u32,
    },
    /// Spatial geometry.
    Geometry(Spatial),
    /// Spatial geography.
    Geography(Spatial),
}

/// Extras carried by geometry and geography types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spatial {
    /// Database schema holding the spatial column.
    pub schema: String,
    /// Spatial reference id.
    pub srid: u32,
    /// Coordinate dimension.
    pub dimension: u32,
}

impl Default for Spatial {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            srid: 4326,
            dimension: 2,
        }
    }
}

impl ColumnType {
    /// Parses a semantic type string such as `"reference users"` or
    /// `"decimal(10,2)"`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::InvalidType`] for anything unrecognised.
    pub fn parse(type_: &str) -> Result<Self> {
        let invalid = || MigrateError::InvalidType(type_.to_string());
        let trimmed = type_.trim();

        let simple = match trimmed {
            "id" => Some(Self::Id),
            "big-id" => Some(Self::BigId),
            "string" => Some(Self::String),
            "text" => Some(Self::Text),
            "integer" => Some(Self::Integer),
            "bigint" => Some(Self::BigInt),
            "float" => Some(Self::Float),
            "double" => Some(Self::Double),
            "boolean" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            "time" => Some(Self::Time),
            "datetime" => Some(Self::DateTime),
            "blob" => Some(Self::Blob),
            "json" => Some(Self::Json),
            "password" => Some(Self::Password),
            "upload" => Some(Self::Upload),
            "list:string" => Some(Self::ListString),
            "list:integer" => Some(Self::ListInteger),
            _ => None,
        };
        if let Some(simple) = simple {
            return Ok(simple);
        }

        if let Some(target) = trimmed.strip_prefix("list:reference ") {
            let table = target.trim();
            if table.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::ListReference {
                table: table.to_string(),
            });
        }
        if let Some(target) = trimmed.strip_prefix("big-reference ") {
            let (table, field) = split_target(target).ok_or_else(invalid)?;
            return Ok(Self::BigReference { table, field });
        }
        if let Some(target) = trimmed.strip_prefix("reference ") {
            let (table, field) = split_target(target).ok_or_else(invalid)?;
            return Ok(Self::Reference { table, field });
        }
        if let Some(args) = call_args(trimmed, "decimal") {
            let [precision, scale] = args.as_slice() else {
                return Err(invalid());
            };
            return Ok(Self::Decimal {
                precision: precision.parse().map_err(|_| invalid())?,
                scale: scale.parse().map_err(|_| invalid())?,
            });
        }
        if let Some(args) = call_args(trimmed, "geometry") {
            return parse_spatial(&args).map(Self::Geometry).ok_or_else(invalid);
        }
        if let Some(args) = call_args(trimmed, "geography") {
            return parse_spatial(&args).map(Self::Geography).ok_or_else(invalid);
        }

        Err(invalid())
    }

    /// Returns true for types that carry a foreign key constraint.
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self, Self::Reference { .. } | Self::BigReference { .. })
    }

    /// Returns true for the auto-incrementing key types.
    #[must_use]
    pub const fn is_id(&self) -> bool {
        matches!(self, Self::Id | Self::BigId)
    }

    /// Length used when the column doesn't declare one.
    #[must_use]
    pub const fn default_length(&self) -> Option<u32> {
        match self {
            Self::String | Self::Password | Self::Upload => Some(DEFAULT_STRING_LENGTH),
            _ => None,
        }
    }

    /// The `(table, field)` a reference type points to.
    #[must_use]
    pub fn reference_target(&self) -> Option<(&str, &str)> {
        match self {
            Self::Reference { table, field } | Self::BigReference { table, field } => {
                Some((table, field.as_deref().unwrap_or("id")))
            }
            _ => None,
        }
    }
}

fn split_target(target: &str) -> Option<(String, Option<String>)> {
    let target = target.trim();
    if target.is_empty() || target.contains(char::is_whitespace) {
        return None;
    }
    match target.split_once('.') {
        Some((table, field)) if !table.is_empty() && !field.is_empty() => {
            Some((table.to_string(), Some(field.to_string())))
        }
        Some(_) => None,
        None => Some((target.to_string(), None)),
    }
}

fn call_args(type_: &str, name: &str) -> Option<Vec<String>> {
    let inner = type_.strip_prefix(name)?.trim_start();
    let inner = inner.strip_prefix('(')?.strip_suffix(')')?;
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    Some(
        inner
            .split(',')
            .map(|arg| arg.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
            .collect(),
    )
}

fn parse_spatial(args: &[String]) -> Option<Spatial> {
    let mut spatial = Spatial::default();
    if let Some(schema) = args.first() {
        spatial.schema.clone_from(schema);
    }
    if let Some(srid) = args.get(1) {
        spatial.srid = srid.parse().ok()?;
    }
    if let Some(dimension) = args.get(2) {
        spatial.dimension = dimension.parse().ok()?;
    }
    if args.len() > 3 {
        return None;
    }
    Some(spatial)
}

fn default_ondelete() -> String {
    DEFAULT_ONDELETE.to_string()
}

/// Schema definition for a column.
///
/// Columns are values: altering one produces a new `Column`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Semantic type string, parsed on demand by [`ColumnType::parse`].
    #[serde(rename = "type")]
    pub type_: String,
    /// Explicit length.
    #[serde(default)]
    pub length: Option<u32>,
    /// Whether the column rejects NULL.
    #[serde(default)]
    pub notnull: bool,
    /// Whether the column has a UNIQUE constraint.
    #[serde(default)]
    pub unique: bool,
    /// Default value.
    #[serde(default)]
    pub default: Option<DefaultValue>,
    /// On-delete action for reference columns.
    #[serde(default = "default_ondelete")]
    pub ondelete: String,
}

impl Column {
    /// Creates a new nullable column without default.
    #[must_use]
    pub fn new(name: impl Into<String>, type_: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_: type_.into(),
            length: None,
            notnull: false,
            unique: false,
            default: None,
            ondelete: default_ondelete(),
        }
    }

    /// Sets an explicit length.
    #[must_use]
    pub const fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub const fn notnull(mut self) -> Self {
        self.notnull = true;
        self
    }

    /// Sets the column as unique.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Sets the on-delete action.
    #[must_use]
    pub fn ondelete(mut self, action: impl Into<String>) -> Self {
        self.ondelete = action.into();
        self
    }

    /// Parses the semantic type.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::InvalidType`] if the type string is unknown.
    pub fn column_type(&self) -> Result<ColumnType> {
        ColumnType::parse(&self.type_)
    }
}

/// Schema definition for an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Table the index belongs to.
    #[serde(default)]
    pub table: String,
    /// Indexed columns, in order.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Indexed SQL expressions, after the fields.
    #[serde(default)]
    pub expressions: Vec<String>,
    /// Whether this is a unique index.
    #[serde(default)]
    pub unique: bool,
    /// Partial index predicate.
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
}

impl Index {
    /// Creates a new non-unique index over `fields`.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, table: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            table: table.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            expressions: Vec::new(),
            unique: false,
            where_clause: None,
        }
    }

    /// Marks the index as unique.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Adds an indexed expression.
    #[must_use]
    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.expressions.push(expression.into());
        self
    }

    /// Sets the partial index predicate.
    #[must_use]
    pub fn where_clause(mut self, predicate: impl Into<String>) -> Self {
        self.where_clause = Some(predicate.into());
        self
    }
}

/// Schema definition for a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,
    /// Referencing table.
    pub table: String,
    /// Column(s) in the referencing table.
    pub columns: Vec<String>,
    /// Referenced table name.
    pub foreign_table: String,
    /// Referenced column(s).
    pub foreign_columns: Vec<String>,
    /// Action on delete.
    #[serde(default)]
    pub on_delete: Option<String>,
}

impl ForeignKey {
    /// Creates a new foreign key constraint.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<String>,
        foreign_table: impl Into<String>,
        foreign_columns: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns,
            foreign_table: foreign_table.into(),
            foreign_columns,
            on_delete: None,
        }
    }

    /// Sets the on-delete action.
    #[must_use]
    pub fn on_delete(mut self, action: impl Into<String>) -> Self {
        self.on_delete = Some(action.into());
        self
    }
}

/// Complete schema definition for a table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: IndexMap<String, Column>,
    /// Indexes by name.
    pub indexes: IndexMap<String, Index>,
    /// Foreign keys by name.
    pub foreign_keys: IndexMap<String, ForeignKey>,
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builds a table, rejecting duplicate column or index names.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::DuplicateName`] on the first repeated name.
    pub fn from_parts(
        name: impl Into<String>,
        columns: Vec<Column>,
        indexes: Vec<Index>,
    ) -> Result<Self> {
        let mut table = Self::new(name);
        for column in columns {
            if table.columns.contains_key(&column.name) {
                return Err(MigrateError::duplicate(
                    "column",
                    format!("{}.{}", table.name, column.name),
                ));
            }
            table.columns.insert(column.name.clone(), column);
        }
        for mut index in indexes {
            if table.indexes.contains_key(&index.name) {
                return Err(MigrateError::duplicate(
                    "index",
                    format!("{}.{}", table.name, index.name),
                ));
            }
            index.table.clone_from(&table.name);
            table.indexes.insert(index.name.clone(), index);
        }
        Ok(table)
    }

    /// Adds a column, replacing one with the same name.
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        self.columns.insert(column.name.clone(), column);
        self
    }

    /// Adds an index, replacing one with the same name.
    #[must_use]
    pub fn index(mut self, mut index: Index) -> Self {
        index.table.clone_from(&self.name);
        self.indexes.insert(index.name.clone(), index);
        self
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<&str> = self.columns.keys().map(String::as_str).collect();
        write!(f, "{}({})", self.name, columns.join(", "))
    }
}

#[derive(Deserialize)]
struct SchemaDocument {
    tables: Vec<TableDocument>,
}

#[derive(Deserialize)]
struct TableDocument {
    name: String,
    #[serde(default)]
    columns: Vec<Column>,
    #[serde(default)]
    indexes: Vec<Index>,
}

/// The live schema: what the application currently declares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    /// Tables in declaration order.
    pub tables: IndexMap<String, Table>,
}

impl Schema {
    /// Creates a new empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table to the schema.
    #[must_use]
    pub fn table(mut self, table: Table) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Builds a schema, rejecting duplicate table names.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::DuplicateName`] on the first repeated table.
    pub fn from_tables(tables: Vec<Table>) -> Result<Self> {
        let mut schema = Self::new();
        for table in tables {
            if schema.tables.contains_key(&table.name) {
                return Err(MigrateError::duplicate("table", table.name));
            }
            schema.tables.insert(table.name.clone(), table);
        }
        Ok(schema)
    }

    /// Parses a JSON document of the form `{"tables": [...]}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or repeats a name.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let document: SchemaDocument = serde_json::from_str(json)?;
        let tables = document
            .tables
            .into_iter()
            .map(|t| Table::from_parts(t.name, t.columns, t.indexes))
            .collect::<Result<Vec<_>>>()?;
        Self::from_tables(tables)
    }

    /// Reads and parses a JSON schema file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Gets a table by name.
    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }
}
