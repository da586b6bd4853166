//! Operation verbs and helper constructors of the script language.

use std::path::Path;

use crate::error::{MigrateError, Result};
use crate::operations::{ColumnChanges, Operation};
use crate::schema::{Column, DefaultValue, Delta, ForeignKey, Index, DEFAULT_ONDELETE};

use super::parser::{Call, Value};

/// The fixed set of operation verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    CreateTable,
    DropTable,
    AddColumn,
    DropColumn,
    AlterColumn,
    CreateIndex,
    DropIndex,
    CreateForeignKey,
    DropForeignKey,
}

impl Verb {
    /// Looks up a verb by its script name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "create_table" => Some(Self::CreateTable),
            "drop_table" => Some(Self::DropTable),
            "add_column" => Some(Self::AddColumn),
            "drop_column" => Some(Self::DropColumn),
            "alter_column" => Some(Self::AlterColumn),
            "create_index" => Some(Self::CreateIndex),
            "drop_index" => Some(Self::DropIndex),
            "create_foreign_key" => Some(Self::CreateForeignKey),
            "drop_foreign_key" => Some(Self::DropForeignKey),
            _ => None,
        }
    }

    /// The verb rendering an operation.
    #[must_use]
    pub const fn of(operation: &Operation) -> Self {
        match operation {
            Operation::CreateTable { .. } => Self::CreateTable,
            Operation::DropTable { .. } => Self::DropTable,
            Operation::AddColumn { .. } => Self::AddColumn,
            Operation::DropColumn { .. } => Self::DropColumn,
            Operation::AlterColumn { .. } => Self::AlterColumn,
            Operation::CreateIndex { .. } => Self::CreateIndex,
            Operation::DropIndex { .. } => Self::DropIndex,
            Operation::CreateForeignKey { .. } => Self::CreateForeignKey,
            Operation::DropForeignKey { .. } => Self::DropForeignKey,
        }
    }

    /// Script name of the verb.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CreateTable => "create_table",
            Self::DropTable => "drop_table",
            Self::AddColumn => "add_column",
            Self::DropColumn => "drop_column",
            Self::AlterColumn => "alter_column",
            Self::CreateIndex => "create_index",
            Self::DropIndex => "drop_index",
            Self::CreateForeignKey => "create_foreign_key",
            Self::DropForeignKey => "drop_foreign_key",
        }
    }

    /// Builds the operation described by `call`.
    ///
    /// # Errors
    ///
    /// Returns `MigrateError::Parse` for missing, extra or mistyped
    /// arguments and `MigrateError::InvalidType` for unknown column types.
    pub fn build(self, call: &Call, path: &Path) -> Result<Operation> {
        let args = Args { call, path };
        match self {
            Self::CreateTable => {
                args.check(2, &[])?;
                let columns = args
                    .list(1, "columns")?
                    .iter()
                    .map(|value| column(args.nested(value, "column")?, path))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Operation::create_table(args.string(0, "table")?, columns))
            }
            Self::DropTable => {
                args.check(1, &[])?;
                Ok(Operation::drop_table(args.string(0, "table")?))
            }
            Self::AddColumn => {
                args.check(2, &[])?;
                let helper = args.nested(args.positional(1, "column")?, "column")?;
                Ok(Operation::add_column(
                    args.string(0, "table")?,
                    column(helper, path)?,
                ))
            }
            Self::DropColumn => {
                args.check(2, &[])?;
                Ok(Operation::drop_column(
                    args.string(0, "table")?,
                    args.string(1, "column")?,
                ))
            }
            Self::AlterColumn => {
                args.check(
                    2,
                    &[
                        "type",
                        "length",
                        "notnull",
                        "default",
                        "existing_type",
                        "existing_length",
                        "existing_notnull",
                        "existing_default",
                    ],
                )?;
                let modify = args.changes("")?;
                let existing = args.changes("existing_")?;
                Ok(Operation::alter_column(
                    args.string(0, "table")?,
                    args.string(1, "column")?,
                    modify,
                    existing,
                ))
            }
            Self::CreateIndex => {
                args.check(3, &["expressions", "unique", "where"])?;
                let mut index = Index::new(
                    args.string(0, "name")?,
                    args.string(1, "table")?,
                    args.strings(args.positional(2, "fields")?, "fields")?,
                );
                if let Some(value) = call.kwarg("expressions") {
                    index.expressions = args.strings(value, "expressions")?;
                }
                if args.flag("unique")? {
                    index = index.unique();
                }
                if let Some(predicate) = args.opt_string("where")? {
                    index = index.where_clause(predicate);
                }
                Ok(Operation::create_index(index))
            }
            Self::DropIndex => {
                args.check(2, &[])?;
                Ok(Operation::drop_index(
                    args.string(0, "name")?,
                    args.string(1, "table")?,
                ))
            }
            Self::CreateForeignKey => {
                args.check(5, &["ondelete"])?;
                let mut foreign_key = ForeignKey::new(
                    args.string(0, "name")?,
                    args.string(1, "table")?,
                    args.strings(args.positional(2, "columns")?, "columns")?,
                    args.string(3, "foreign_table")?,
                    args.strings(args.positional(4, "foreign_columns")?, "foreign_columns")?,
                );
                if let Some(action) = args.opt_string("ondelete")? {
                    foreign_key = foreign_key.on_delete(action);
                }
                Ok(Operation::create_foreign_key(foreign_key))
            }
            Self::DropForeignKey => {
                args.check(2, &[])?;
                Ok(Operation::drop_foreign_key(
                    args.string(0, "name")?,
                    args.string(1, "table")?,
                ))
            }
        }
    }
}

/// Builds an operation from any call in an `up` or `down` block.
///
/// # Errors
///
/// Fails for unknown verbs and malformed arguments.
pub fn operation(call: &Call, path: &Path) -> Result<Operation> {
    let verb = Verb::from_name(&call.name).ok_or_else(|| MigrateError::Parse {
        path: path.to_path_buf(),
        message: format!("unknown operation '{}'", call.name),
        offset: call.offset,
    })?;
    verb.build(call, path)
}

/// `column(name, type, length=, notnull=, unique=, default=, ondelete=)`
fn column(call: &Call, path: &Path) -> Result<Column> {
    let args = Args { call, path };
    args.check(2, &["length", "notnull", "unique", "default", "ondelete"])?;

    let mut column = Column::new(args.string(0, "name")?, args.string(1, "type")?);
    column.column_type()?;
    if let Some(length) = args.opt_length("length")? {
        column = column.length(length);
    }
    if args.flag("notnull")? {
        column = column.notnull();
    }
    if args.flag("unique")? {
        column = column.unique();
    }
    if let Some(value) = call.kwarg("default") {
        column.default = args.default_value(value)?;
    }
    column = column.ondelete(
        args.opt_string("ondelete")?
            .unwrap_or_else(|| DEFAULT_ONDELETE.to_string()),
    );
    Ok(column)
}

/// Argument accessors for one call, reporting errors at the call's offset.
struct Args<'a> {
    call: &'a Call,
    path: &'a Path,
}

impl<'a> Args<'a> {
    fn error(&self, message: String) -> MigrateError {
        MigrateError::Parse {
            path: self.path.to_path_buf(),
            message: format!("{}: {}", self.call.name, message),
            offset: self.call.offset,
        }
    }

    fn check(&self, positional: usize, keywords: &[&str]) -> Result<()> {
        if self.call.args.len() != positional {
            return Err(self.error(format!(
                "expected {} positional arguments, got {}",
                positional,
                self.call.args.len()
            )));
        }
        for (name, _) in &self.call.kwargs {
            if !keywords.contains(&name.as_str()) {
                return Err(self.error(format!("unexpected argument '{}'", name)));
            }
        }
        Ok(())
    }

    fn positional(&self, index: usize, what: &str) -> Result<&'a Value> {
        self.call
            .args
            .get(index)
            .ok_or_else(|| self.error(format!("missing {}", what)))
    }

    fn string(&self, index: usize, what: &str) -> Result<String> {
        match self.positional(index, what)? {
            Value::Str(s) => Ok(s.clone()),
            other => Err(self.mistyped(what, "a string", other)),
        }
    }

    fn list(&self, index: usize, what: &str) -> Result<&'a [Value]> {
        match self.positional(index, what)? {
            Value::List(items) => Ok(items),
            other => Err(self.mistyped(what, "a list", other)),
        }
    }

    fn strings(&self, value: &Value, what: &str) -> Result<Vec<String>> {
        let Value::List(items) = value else {
            return Err(self.mistyped(what, "a list of strings", value));
        };
        items
            .iter()
            .map(|item| match item {
                Value::Str(s) => Ok(s.clone()),
                other => Err(self.mistyped(what, "a list of strings", other)),
            })
            .collect()
    }

    fn nested(&self, value: &'a Value, helper: &str) -> Result<&'a Call> {
        match value {
            Value::Call(call) if call.name == helper => Ok(call),
            other => Err(self.mistyped(helper, &format!("{}(...)", helper), other)),
        }
    }

    fn flag(&self, name: &str) -> Result<bool> {
        match self.call.kwarg(name) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(self.mistyped(name, "true or false", other)),
        }
    }

    fn opt_string(&self, name: &str) -> Result<Option<String>> {
        match self.call.kwarg(name) {
            None | Some(Value::None) => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.mistyped(name, "a string", other)),
        }
    }

    fn opt_length(&self, name: &str) -> Result<Option<u32>> {
        match self.call.kwarg(name) {
            None | Some(Value::None) => Ok(None),
            Some(Value::Int(n)) => u32::try_from(*n)
                .map(Some)
                .map_err(|_| self.error(format!("'{}' out of range: {}", name, n))),
            Some(other) => Err(self.mistyped(name, "an integer", other)),
        }
    }

    fn default_value(&self, value: &Value) -> Result<Option<DefaultValue>> {
        let default = match value {
            Value::None => return Ok(None),
            Value::Bool(b) => DefaultValue::Bool(*b),
            Value::Int(i) => DefaultValue::Integer(*i),
            Value::Float(f) => DefaultValue::Float(*f),
            Value::Str(s) => DefaultValue::String(s.clone()),
            Value::Call(call) if call.name == "sql" => match call.args.as_slice() {
                [Value::Str(expression)] if call.kwargs.is_empty() => {
                    DefaultValue::Expression(expression.clone())
                }
                _ => return Err(self.error("sql() takes one string".to_string())),
            },
            other => return Err(self.mistyped("default", "a literal or sql(...)", other)),
        };
        Ok(Some(default))
    }

    /// Reads the alteration keywords carrying `prefix`; absent ones stay unset.
    fn changes(&self, prefix: &str) -> Result<ColumnChanges> {
        let key = |name: &str| format!("{}{}", prefix, name);
        let mut changes = ColumnChanges::new();

        match self.call.kwarg(&key("type")) {
            None | Some(Value::None) => {}
            Some(Value::Str(s)) => changes.type_ = Some(s.clone()),
            Some(other) => return Err(self.mistyped(&key("type"), "a string", other)),
        }
        if let Some(value) = self.call.kwarg(&key("length")) {
            changes.length = match value {
                Value::None => Delta::Null,
                _ => Delta::from_option(self.opt_length(&key("length"))?),
            };
        }
        match self.call.kwarg(&key("notnull")) {
            None => {}
            Some(Value::Bool(b)) => changes.notnull = Some(*b),
            Some(other) => return Err(self.mistyped(&key("notnull"), "true or false", other)),
        }
        if let Some(value) = self.call.kwarg(&key("default")) {
            changes.default = match self.default_value(value)? {
                Some(default) => Delta::Value(default),
                None => Delta::Null,
            };
        }
        Ok(changes)
    }

    fn mistyped(&self, what: &str, expected: &str, found: &Value) -> MigrateError {
        self.error(format!(
            "{} must be {}, found {}",
            what,
            expected,
            found.kind()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parser::Parser;

    fn parse_call(source: &str) -> Result<Operation> {
        let text = format!("up {{ {} }}\ndown {{}}", source);
        let path = Path::new("test.mig");
        let document = Parser::new(&text, path).parse_document()?;
        operation(&document.up[0], path)
    }

    #[test]
    fn test_verb_names_round_trip() {
        for verb in [
            Verb::CreateTable,
            Verb::DropTable,
            Verb::AddColumn,
            Verb::DropColumn,
            Verb::AlterColumn,
            Verb::CreateIndex,
            Verb::DropIndex,
            Verb::CreateForeignKey,
            Verb::DropForeignKey,
        ] {
            assert_eq!(Verb::from_name(verb.name()), Some(verb));
        }
        assert_eq!(Verb::from_name("rename_table"), None);
    }

    #[test]
    fn test_create_table() {
        let op = parse_call(
            r#"create_table("things", [
                column("id", "id"),
                column("name", "string", length=40, notnull=true, default="x"),
                column("owner", "reference users", ondelete="SET NULL"),
            ])"#,
        )
        .unwrap();
        assert_eq!(
            op,
            Operation::create_table(
                "things",
                vec![
                    Column::new("id", "id"),
                    Column::new("name", "string")
                        .length(40)
                        .notnull()
                        .default(DefaultValue::String("x".to_string())),
                    Column::new("owner", "reference users").ondelete("SET NULL"),
                ]
            )
        );
    }

    #[test]
    fn test_alter_column_keywords() {
        let op = parse_call(
            r#"alter_column("t", "name", notnull=true, default=none,
                existing_type="string", existing_length=none, existing_notnull=false,
                existing_default=sql("CURRENT_TIMESTAMP"))"#,
        )
        .unwrap();
        let Operation::AlterColumn {
            modify, existing, ..
        } = op
        else {
            panic!("expected alter_column");
        };
        assert_eq!(modify.notnull, Some(true));
        assert_eq!(modify.default, Delta::Null);
        assert_eq!(modify.type_, None);
        assert_eq!(modify.length, Delta::Unset);
        assert_eq!(existing.type_.as_deref(), Some("string"));
        assert_eq!(existing.length, Delta::Null);
        assert_eq!(existing.notnull, Some(false));
        assert_eq!(
            existing.default,
            Delta::Value(DefaultValue::Expression("CURRENT_TIMESTAMP".to_string()))
        );
    }

    #[test]
    fn test_create_index_options() {
        let op = parse_call(
            r#"create_index("idx", "t", [], expressions=["lower(name)"], unique=true, where="x > 0")"#,
        )
        .unwrap();
        assert_eq!(
            op,
            Operation::create_index(
                Index::new("idx", "t", Vec::<String>::new())
                    .expression("lower(name)")
                    .unique()
                    .where_clause("x > 0")
            )
        );
    }

    #[test]
    fn test_create_foreign_key() {
        let op = parse_call(
            r#"create_foreign_key("fk", "posts", ["author"], "users", ["id"], ondelete="CASCADE")"#,
        )
        .unwrap();
        assert_eq!(
            op,
            Operation::create_foreign_key(
                ForeignKey::new(
                    "fk",
                    "posts",
                    vec!["author".to_string()],
                    "users",
                    vec!["id".to_string()]
                )
                .on_delete("CASCADE")
            )
        );
    }

    #[test]
    fn test_argument_errors() {
        assert!(matches!(
            parse_call(r#"drop_table("t", "u")"#),
            Err(MigrateError::Parse { .. })
        ));
        assert!(matches!(
            parse_call(r#"drop_table(1)"#),
            Err(MigrateError::Parse { .. })
        ));
        assert!(matches!(
            parse_call(r#"rename_table("a", "b")"#),
            Err(MigrateError::Parse { .. })
        ));
        assert!(matches!(
            parse_call(r#"add_column("t", column("a", "string", bogus=1))"#),
            Err(MigrateError::Parse { .. })
        ));
        assert!(matches!(
            parse_call(r#"add_column("t", column("a", "strnig"))"#),
            Err(MigrateError::InvalidType(_))
        ));
    }
}
