//! Example: Blog Application Migrations
//!
//! This example evolves the schema of a small blog in three steps, generates
//! a revision for each step, applies them to an in-memory SQLite database and
//! finally rolls everything back.
//!
//! Run with: cargo run --example blog_migrations -p strata-migrate

use std::collections::BTreeSet;

use sqlx::any::AnyPoolOptions;
use strata_migrate::executor::{plan, Direction};
use strata_migrate::prelude::*;

// =============================================================================
// Schema Versions
// =============================================================================

fn users() -> Table {
    Table::new("users")
        .column(Column::new("id", "id"))
        .column(Column::new("username", "string").length(100).notnull().unique())
        .column(Column::new("email", "string").length(255).notnull())
        .column(
            Column::new("is_active", "boolean")
                .notnull()
                .default(DefaultValue::Bool(true)),
        )
}

fn posts() -> Table {
    Table::new("posts")
        .column(Column::new("id", "id"))
        .column(Column::new("author", "reference users").notnull())
        .column(Column::new("title", "string").length(200).notnull())
        .column(Column::new("body", "text"))
        .column(
            Column::new("created_at", "datetime")
                .default(DefaultValue::Expression("CURRENT_TIMESTAMP".to_string())),
        )
        .index(Index::new("idx_posts_title", "posts", ["title"]))
}

fn comments() -> Table {
    Table::new("comments")
        .column(Column::new("id", "id"))
        .column(Column::new("post", "reference posts").notnull())
        .column(Column::new("body", "text").notnull())
}

fn versions() -> Vec<(&'static str, Schema)> {
    vec![
        ("create users", Schema::new().table(users())),
        (
            "create posts",
            Schema::new().table(users()).table(posts()),
        ),
        (
            "add comments and bios",
            Schema::new()
                .table(users().column(Column::new("bio", "text")))
                .table(posts())
                .table(comments()),
        ),
    ]
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let scripts = ScriptDir::create(dir.path().join("migrations"))?;

    println!("=== Generating revisions ===\n");
    for (message, live) in versions() {
        let revisions = scripts.revision_map()?;
        let migration = Generator::new(&revisions).generate_migration(&live, message, "head")?;
        let path = scripts.write(&migration)?;
        println!("{}", std::fs::read_to_string(&path)?);
    }

    let revisions = scripts.revision_map()?;

    println!("=== PostgreSQL upgrade SQL ===\n");
    let reports = plan(
        &revisions,
        &PostgresDialect::new(),
        &BTreeSet::new(),
        "heads",
        Direction::Up,
    )?;
    for report in &reports {
        println!("-- {}", report.message);
        for sql in &report.statements {
            println!("{};", sql);
        }
    }

    println!("\n=== Applying to SQLite ===\n");
    sqlx::any::install_default_drivers();
    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let migrator = Migrator::new(pool, Box::new(SqliteDialect::new()), "strata_schema");

    let applied = migrator.up(&revisions, "heads", false).await?;
    println!("Applied {} revisions, heads: {:?}", applied.len(), migrator.current().await?);

    let undone = migrator.down(&revisions, "base", false).await?;
    println!("Undid {} revisions, heads: {:?}", undone.len(), migrator.current().await?);

    Ok(())
}
