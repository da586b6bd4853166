//! strata-migrate CLI
//!
//! Command-line tool for generating and running schema revisions.

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use strata_migrate::config::DEFAULT_MIGRATIONS_DIR;
use strata_migrate::dialect::dialect_for_url;
use strata_migrate::executor::{plan, Direction, MigrationReport};
use strata_migrate::history::DEFAULT_LEDGER_TABLE;
use strata_migrate::prelude::*;

/// Reversible, autogenerated schema migrations.
#[derive(Parser)]
#[command(name = "strata-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL; its scheme selects the SQL dialect.
    #[arg(short, long, env = "DATABASE_URL")]
    database: Option<String>,

    /// Migrations directory.
    #[arg(short, long, default_value = DEFAULT_MIGRATIONS_DIR)]
    migrations_dir: PathBuf,

    /// JSON file describing the live schema.
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Name of the ledger table.
    #[arg(long, default_value = DEFAULT_LEDGER_TABLE)]
    ledger_table: String,

    /// Enable PostGIS column types on PostgreSQL.
    #[arg(long)]
    postgis: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the migrations directory and, with a database, the ledger table.
    Init,

    /// Generate a revision from the differences between the live schema and history.
    Generate {
        /// Revision message.
        #[arg(short, long)]
        message: String,

        /// Revision to build on (`heads` merges branches).
        #[arg(long, default_value = "head")]
        head: String,
    },

    /// Create an empty revision.
    New {
        /// Revision message.
        #[arg(short, long)]
        message: String,

        /// Revision to build on (`heads` merges branches).
        #[arg(long, default_value = "head")]
        head: String,
    },

    /// List revisions, newest first.
    History {
        /// Range as `lower:upper`.
        #[arg(short, long, default_value = "base:heads")]
        range: String,
    },

    /// Show the revisions without children.
    Heads,

    /// Show applied heads and pending revisions.
    Status,

    /// Apply revisions up to a target.
    Up {
        /// Target revision.
        #[arg(default_value = "heads")]
        target: String,

        /// Print SQL without executing it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Undo revisions down to a target.
    Down {
        /// Target revision (`base` undoes everything).
        target: String,

        /// Print SQL without executing it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Set the ledger to a revision without running any SQL.
    Set {
        /// Revision to record as applied.
        target: String,
    },

    /// Print SQL for a range of revisions without connecting.
    Sql {
        /// Target revision.
        #[arg(default_value = "heads")]
        target: String,

        /// Revision the database is assumed to be at.
        #[arg(long)]
        from: Option<String>,

        /// Render downgrades instead of upgrades.
        #[arg(long)]
        down: bool,

        /// Dialect name, when no database URL is configured.
        #[arg(long)]
        dialect: Option<String>,
    },
}

fn print_statements(reports: &[MigrationReport]) {
    for report in reports {
        println!("-- {} {}: {}", report.direction, report.revision, report.message);
        for sql in &report.statements {
            println!("{};", sql);
        }
        println!();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = MigrateConfig::new()
        .migrations_dir(cli.migrations_dir)
        .ledger_table(cli.ledger_table)
        .postgis(cli.postgis);
    config.database_url = cli.database;
    config.schema = cli.schema;

    match cli.command {
        Commands::Init => {
            let scripts = ScriptDir::create(&config.migrations_dir)?;
            info!("Migrations directory: {}", scripts.path().display());
            if config.database_url.is_some() {
                Migrator::connect(&config).await?.init().await?;
            }
        }

        Commands::Generate { message, head } => {
            let scripts = config.scripts()?;
            let revisions = scripts.revision_map()?;
            let live = config.live_schema()?;
            let migration =
                Generator::new(&revisions).generate_migration(&live, &message, &head)?;
            if migration.upgrade.is_empty() {
                warn!("No changes detected; no revision written.");
            } else {
                for op in &migration.upgrade.ops {
                    info!("Detected {}", op.description());
                }
                let path = scripts.write(&migration)?;
                info!("Created revision {}: {}", migration.revision, path.display());
            }
        }

        Commands::New { message, head } => {
            let scripts = config.scripts()?;
            let revisions = scripts.revision_map()?;
            let migration = Generator::new(&revisions).empty_migration(&message, &head)?;
            let path = scripts.write(&migration)?;
            info!("Created revision {}: {}", migration.revision, path.display());
        }

        Commands::History { range } => {
            let revisions = config.scripts()?.revision_map()?;
            let heads = revisions.heads();
            for migration in revisions.range(&range)? {
                let parents = if migration.is_base() {
                    "<base>".to_string()
                } else {
                    migration.revises.join(", ")
                };
                let marker = if heads.contains(&migration.revision.as_str()) {
                    " (head)"
                } else {
                    ""
                };
                println!(
                    "{} -> {}{}, {}",
                    parents, migration.revision, marker, migration.message
                );
            }
        }

        Commands::Heads => {
            let revisions = config.scripts()?.revision_map()?;
            for head in revisions.heads() {
                println!("{}", head);
            }
        }

        Commands::Status => {
            let revisions = config.scripts()?.revision_map()?;
            let migrator = Migrator::connect(&config).await?;
            let current = migrator.current().await?;
            let current_ids: Vec<String> = current.iter().cloned().collect();
            let pending = revisions.upgrade_path(&current_ids, "heads")?;

            println!("\nApplied heads:");
            println!("{:-<60}", "");
            if current.is_empty() {
                println!(" <base>");
            }
            for head in &current {
                println!(" [X] {}", head);
            }
            println!("\nPending revisions:");
            println!("{:-<60}", "");
            for migration in &pending {
                println!(" [ ] {} {}", migration.revision, migration.message);
            }
            println!();
        }

        Commands::Up { target, dry_run } => {
            let revisions = config.scripts()?.revision_map()?;
            let migrator = Migrator::connect(&config).await?;
            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }
            let reports = migrator.up(&revisions, &target, dry_run).await?;
            if dry_run {
                print_statements(&reports);
            }
            info!("Applied {} revision(s).", if dry_run { 0 } else { reports.len() });
        }

        Commands::Down { target, dry_run } => {
            let revisions = config.scripts()?.revision_map()?;
            let migrator = Migrator::connect(&config).await?;
            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }
            let reports = migrator.down(&revisions, &target, dry_run).await?;
            if dry_run {
                print_statements(&reports);
            }
            info!("Undid {} revision(s).", if dry_run { 0 } else { reports.len() });
        }

        Commands::Set { target } => {
            let revisions = config.scripts()?.revision_map()?;
            let migrator = Migrator::connect(&config).await?;
            let heads = migrator.stamp(&revisions, &target).await?;
            info!("Ledger set to {:?}", heads);
        }

        Commands::Sql {
            target,
            from,
            down,
            dialect,
        } => {
            let revisions = config.scripts()?.revision_map()?;
            let dialect = match dialect {
                Some(name) => dialect_for_url(&name, config.postgis)?,
                None => config.dialect()?,
            };
            let (direction, default_from) = if down {
                (Direction::Down, "heads")
            } else {
                (Direction::Up, "base")
            };
            let current: BTreeSet<String> = revisions
                .resolve(from.as_deref().unwrap_or(default_from))?
                .into_iter()
                .collect();
            let reports = plan(&revisions, dialect.as_ref(), &current, &target, direction)?;
            print_statements(&reports);
        }
    }

    Ok(())
}
