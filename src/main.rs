//! Cookiejar CLI - runs the ORM walkthrough and inspects the cookie shop store

use clap::{Parser, Subcommand, ValueEnum};
use cookiejar::config::{self, CookiejarConfig};
use cookiejar::session::{Engine, Session};
use cookiejar::{models, ui, walkthrough};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "cookiejar")]
#[command(version)]
#[command(about = "ORM walkthrough over SQLite - cookies, users, orders and line items")]
#[command(long_about = r#"
Cookiejar maps a small cookie shop onto SQLite and walks through:
  • Units of work, commits and rollbacks
  • Generative queries: filters, ordering, limits, aggregates
  • Relationships and joins inferred from foreign keys

Example usage:
  cookiejar walkthrough
  cookiejar --echo walkthrough --format json
  cookiejar --database shop.db inventory
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log every SQL statement sent to the store
    #[arg(short, long, global = true)]
    echo: bool,

    /// Database file, or :memory:
    #[arg(short, long, global = true)]
    database: Option<String>,

    /// Config file (defaults to ./cookiejar.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the walkthrough end to end
    Walkthrough {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the DDL for every mapped table
    Schema,

    /// Seed the sample cookies and show inventory costs
    Inventory {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Write a config file with the current settings
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let flags = CookiejarConfig {
        database: cli.database.clone(),
        echo: cli.echo.then_some(true),
    };

    match cli.command {
        Commands::Walkthrough { format } => {
            let config = resolve_config(flags, cli.config.as_deref())?;
            let engine = Engine::from_config(&config)?;
            let steps = walkthrough::run(&engine)?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&steps)?),
                OutputFormat::Text => {
                    ui::header("Cookie shop walkthrough");
                    for (i, step) in steps.iter().enumerate() {
                        ui::step(i + 1, step);
                    }
                    println!();
                    ui::success(&format!("{} steps completed", steps.len()));
                }
            }
        }

        Commands::Schema => {
            let metadata = models::metadata();
            ui::header("Mapped tables");
            for statement in metadata.ddl() {
                println!();
                ui::sql(&statement);
            }

            let counts: Vec<(&str, String)> = metadata
                .tables()
                .iter()
                .map(|t| (t.name, format!("{} columns", t.columns.len())))
                .collect();
            ui::section("Summary");
            println!("{}", ui::summary_table(&counts));
        }

        Commands::Inventory { format } => {
            let config = resolve_config(flags, cli.config.as_deref())?;
            let engine = Engine::from_config(&config)?;
            let session = Session::new(&engine);
            let seeded = walkthrough::seed_inventory(&session)?;
            let rows = walkthrough::inventory(&session)?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
                OutputFormat::Text => {
                    ui::header("Cookie inventory");
                    if seeded > 0 {
                        ui::info("Seeded", &format!("{} sample cookies", seeded));
                    }
                    println!("{}", ui::rows_table(&rows));
                }
            }
        }

        Commands::Init { force } => {
            let path = cli.config.unwrap_or_else(config::default_config_path);
            let config = CookiejarConfig {
                database: Some(flags.database.unwrap_or_else(|| ":memory:".to_string())),
                echo: Some(cli.echo),
            };
            config::write_config(&path, &config, force)?;
            ui::success(&format!("Wrote {}", path.display()));
        }
    }

    Ok(())
}

/// Flags win over the config file
fn resolve_config(flags: CookiejarConfig, path: Option<&std::path::Path>) -> anyhow::Result<CookiejarConfig> {
    let file = config::load_config(path)?.unwrap_or_default();
    let config = flags.or(file);
    tracing::debug!(
        "Using database {} (echo: {})",
        config.database.as_deref().unwrap_or(":memory:"),
        config.echo.unwrap_or(false)
    );
    Ok(config)
}
