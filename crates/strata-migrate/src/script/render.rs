//! Renders migrations as revision scripts.
//!
//! Output depends only on the migration: keyword arguments come in a fixed
//! order and are omitted when they hold their default, so rendering the
//! same migration twice gives identical bytes.

use crate::migration::{Migration, CREATED_FORMAT};
use crate::operations::{ColumnChanges, Operation};
use crate::schema::{Column, DefaultValue, Delta, DEFAULT_ONDELETE};

use super::verbs::Verb;

const INDENT: &str = "    ";

/// Renders the full script text of a migration.
#[must_use]
pub fn render(migration: &Migration) -> String {
    let created = migration
        .created
        .map(|c| c.format(CREATED_FORMAT).to_string());
    let mut out = String::new();

    for line in migration.message.lines() {
        if line.is_empty() {
            out.push_str("//\n");
        } else {
            out.push_str(&format!("// {}\n", line));
        }
    }
    out.push_str("//\n");
    out.push_str(&format!("// Revision ID: {}\n", migration.revision));
    out.push_str(&format!("// Revises: {}\n", migration.revises.join(", ")));
    if let Some(created) = &created {
        out.push_str(&format!("// Creation Date: {}\n", created));
    }
    out.push('\n');

    out.push_str(&format!("revision = {}\n", quote(&migration.revision)));
    let revises = match migration.revises.as_slice() {
        [] => "none".to_string(),
        [single] => quote(single),
        many => list(many.iter().map(|r| quote(r))),
    };
    out.push_str(&format!("revises = {}\n", revises));
    out.push_str(&format!("message = {}\n", quote(&migration.message)));
    if let Some(created) = &created {
        out.push_str(&format!("created = {}\n", quote(created)));
    }
    out.push('\n');

    render_block(&mut out, "up", &migration.upgrade.ops);
    out.push('\n');
    render_block(&mut out, "down", &migration.downgrade.ops);
    out
}

fn render_block(out: &mut String, name: &str, ops: &[Operation]) {
    out.push_str(name);
    out.push_str(" {\n");
    for op in ops {
        out.push_str(INDENT);
        out.push_str(&render_operation(op));
        out.push('\n');
    }
    out.push_str("}\n");
}

/// Renders one operation as a call.
#[must_use]
pub fn render_operation(op: &Operation) -> String {
    let verb = Verb::of(op).name();
    match op {
        Operation::CreateTable { table, columns } => {
            if columns.is_empty() {
                return format!("{}({}, [])", verb, quote(table));
            }
            let mut text = format!("{}({}, [\n", verb, quote(table));
            for column in columns {
                text.push_str(&format!("{INDENT}{INDENT}{},\n", render_column(column)));
            }
            text.push_str(&format!("{INDENT}])"));
            text
        }
        Operation::DropTable { table, .. } => format!("{}({})", verb, quote(table)),
        Operation::AddColumn { table, column } => {
            format!("{}({}, {})", verb, quote(table), render_column(column))
        }
        Operation::DropColumn { table, column, .. } => {
            format!("{}({}, {})", verb, quote(table), quote(column))
        }
        Operation::AlterColumn {
            table,
            column,
            modify,
            existing,
        } => {
            let mut args = vec![quote(table), quote(column)];
            push_changes(&mut args, "", modify);
            push_changes(&mut args, "existing_", existing);
            format!("{}({})", verb, args.join(", "))
        }
        Operation::CreateIndex { index } => {
            let mut args = vec![
                quote(&index.name),
                quote(&index.table),
                list(index.fields.iter().map(|f| quote(f))),
            ];
            if !index.expressions.is_empty() {
                args.push(format!(
                    "expressions={}",
                    list(index.expressions.iter().map(|e| quote(e)))
                ));
            }
            if index.unique {
                args.push("unique=true".to_string());
            }
            if let Some(predicate) = &index.where_clause {
                args.push(format!("where={}", quote(predicate)));
            }
            format!("{}({})", verb, args.join(", "))
        }
        Operation::DropIndex { table, name, .. }
        | Operation::DropForeignKey { table, name, .. } => {
            format!("{}({}, {})", verb, quote(name), quote(table))
        }
        Operation::CreateForeignKey { foreign_key } => {
            let mut args = vec![
                quote(&foreign_key.name),
                quote(&foreign_key.table),
                list(foreign_key.columns.iter().map(|c| quote(c))),
                quote(&foreign_key.foreign_table),
                list(foreign_key.foreign_columns.iter().map(|c| quote(c))),
            ];
            if let Some(action) = &foreign_key.on_delete {
                args.push(format!("ondelete={}", quote(action)));
            }
            format!("{}({})", verb, args.join(", "))
        }
    }
}

fn render_column(column: &Column) -> String {
    let mut args = vec![quote(&column.name), quote(&column.type_)];
    if let Some(length) = column.length {
        args.push(format!("length={}", length));
    }
    if column.notnull {
        args.push("notnull=true".to_string());
    }
    if column.unique {
        args.push("unique=true".to_string());
    }
    if let Some(default) = &column.default {
        args.push(format!("default={}", render_default(default)));
    }
    if column.ondelete != DEFAULT_ONDELETE {
        args.push(format!("ondelete={}", quote(&column.ondelete)));
    }
    format!("column({})", args.join(", "))
}

fn push_changes(args: &mut Vec<String>, prefix: &str, changes: &ColumnChanges) {
    if let Some(type_) = &changes.type_ {
        args.push(format!("{}type={}", prefix, quote(type_)));
    }
    match changes.length {
        Delta::Unset => {}
        Delta::Null => args.push(format!("{}length=none", prefix)),
        Delta::Value(length) => args.push(format!("{}length={}", prefix, length)),
    }
    if let Some(notnull) = changes.notnull {
        args.push(format!("{}notnull={}", prefix, notnull));
    }
    match &changes.default {
        Delta::Unset => {}
        Delta::Null => args.push(format!("{}default=none", prefix)),
        Delta::Value(default) => {
            args.push(format!("{}default={}", prefix, render_default(default)));
        }
    }
}

fn render_default(default: &DefaultValue) -> String {
    match default {
        DefaultValue::Bool(b) => b.to_string(),
        DefaultValue::Integer(i) => i.to_string(),
        DefaultValue::Float(f) => format!("{:?}", f),
        DefaultValue::String(s) => quote(s),
        DefaultValue::Expression(e) => format!("sql({})", quote(e)),
    }
}

fn list(items: impl Iterator<Item = String>) -> String {
    format!("[{}]", items.collect::<Vec<_>>().join(", "))
}

/// Quotes a string literal, escaping backslashes, quotes and newlines.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{DowngradeOps, UpgradeOps};
    use crate::schema::Index;
    use chrono::NaiveDate;

    fn created() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_render_script() {
        let upgrade = UpgradeOps::new(vec![Operation::add_column(
            "things",
            Column::new("age", "integer"),
        )]);
        let downgrade = upgrade.reverse().unwrap();
        let migration = Migration::new(
            "3f2a9c1d4e5b",
            vec!["1a2b3c4d5e6f".to_string()],
            "add age to things",
            upgrade,
            downgrade,
        )
        .created(created());

        assert_eq!(
            render(&migration),
            "// add age to things
//
// Revision ID: 3f2a9c1d4e5b
// Revises: 1a2b3c4d5e6f
// Creation Date: 2026-10-16 12:00:00

revision = \"3f2a9c1d4e5b\"
revises = \"1a2b3c4d5e6f\"
message = \"add age to things\"
created = \"2026-10-16 12:00:00\"

up {
    add_column(\"things\", column(\"age\", \"integer\"))
}

down {
    drop_column(\"things\", \"age\")
}
"
        );
    }

    #[test]
    fn test_render_create_table() {
        let op = Operation::create_table(
            "t",
            vec![
                Column::new("id", "id"),
                Column::new("name", "string")
                    .length(40)
                    .notnull()
                    .default(DefaultValue::String("a \"b\"".to_string())),
            ],
        );
        assert_eq!(
            render_operation(&op),
            "create_table(\"t\", [
        column(\"id\", \"id\"),
        column(\"name\", \"string\", length=40, notnull=true, default=\"a \\\"b\\\"\"),
    ])"
        );
    }

    #[test]
    fn test_render_alter_column_omits_unset() {
        let op = Operation::alter_column(
            "t",
            "name",
            ColumnChanges::new().set_notnull(true).set_default(None),
            ColumnChanges::new()
                .set_type("string")
                .set_notnull(false)
                .set_default(Some(DefaultValue::Float(1.5))),
        );
        assert_eq!(
            render_operation(&op),
            "alter_column(\"t\", \"name\", notnull=true, default=none, \
             existing_type=\"string\", existing_notnull=false, existing_default=1.5)"
        );
    }

    #[test]
    fn test_render_index_and_merge() {
        let op = Operation::create_index(
            Index::new("idx", "t", ["a", "b"])
                .unique()
                .where_clause("a > 0"),
        );
        assert_eq!(
            render_operation(&op),
            "create_index(\"idx\", \"t\", [\"a\", \"b\"], unique=true, where=\"a > 0\")"
        );

        let merge = Migration::new(
            "m",
            vec!["a".to_string(), "b".to_string()],
            "merge",
            UpgradeOps::default(),
            DowngradeOps::default(),
        );
        let text = render(&merge);
        assert!(text.contains("revises = [\"a\", \"b\"]\n"));
        assert!(text.contains("up {\n}\n\ndown {\n}\n"));
        assert!(!text.contains("created"));
    }
}
