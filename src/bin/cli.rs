//! SQLSandbox CLI
//!
//! Operator commands for checking configuration, inspecting and converting
//! exercise scripts, running a one-off sandbox, and reclaiming orphans.

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use sqlsandbox::catalog::{SourceDatabase, StaticCatalog};
use sqlsandbox::config::{
    config_path, load_config, load_config_from_path, apply_env_overrides, validate_config, Config,
    LogConfig, LogFormat,
};
use sqlsandbox::sandbox::{CleanupScheduler, QueryRows, SandboxOrchestrator};
use sqlsandbox::sql::{
    detect_dialect, prepare_content, split_statements_with, validate_script, ValidationPolicy,
};
use sqlsandbox::VERSION;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Student id used for one-off `run` sandboxes
const CLI_STUDENT_ID: i64 = 0;
/// Source database id used for one-off `run` sandboxes
const CLI_DATABASE_ID: i64 = 1;

#[derive(Parser)]
#[command(
    name = "sqlsandbox",
    author = "SQLSandbox Contributors",
    version = VERSION,
    about = "SQLSandbox - ephemeral PostgreSQL sandboxes for SQL exercises",
    long_about = None
)]
struct Cli {
    /// Config file (defaults to SQLSANDBOX_CONFIG or the user config dir)
    #[arg(long, short, global = true, env = "SQLSANDBOX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate the configuration
    CheckConfig,

    /// Detect the SQL dialect of a script
    Detect {
        file: PathBuf,
    },

    /// Split a script into statements
    Split {
        file: PathBuf,
    },

    /// Convert a schema (and optional seed) script to loadable PostgreSQL
    Convert {
        /// Schema script
        file: PathBuf,
        /// Seed data script
        #[arg(long)]
        seed: Option<PathBuf>,
    },

    /// Check SQL against the safety rules
    Validate {
        sql: String,
        /// Apply the read-only allow-list as well
        #[arg(long)]
        read_only: bool,
    },

    /// Provision a sandbox, run a query, and tear the sandbox down
    Run {
        #[arg(long)]
        schema: PathBuf,
        #[arg(long)]
        seed: Option<PathBuf>,
        #[arg(long, short)]
        query: String,
        /// Only allow read-only statements
        #[arg(long)]
        read_only: bool,
        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove sandbox containers left behind by a previous process
    SweepOrphans,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = read_config(cli.config.as_deref())?;
    init_logging(&config.log);

    match cli.command {
        Commands::CheckConfig => check_config(&config),
        Commands::Detect { file } => {
            let sql = read_script(&file)?;
            println!("{}", detect_dialect(&sql));
            Ok(())
        }
        Commands::Split { file } => {
            let sql = read_script(&file)?;
            let escapes = detect_dialect(&sql).literal_escapes();
            for (i, statement) in split_statements_with(&sql, escapes).iter().enumerate() {
                println!("{} {}", style(format!("-- [{}]", i + 1)).dim(), statement);
            }
            Ok(())
        }
        Commands::Convert { file, seed } => convert(&file, seed.as_deref()),
        Commands::Validate { sql, read_only } => validate(&sql, read_only),
        Commands::Run {
            schema,
            seed,
            query,
            read_only,
            json,
        } => run(&config, &schema, seed.as_deref(), &query, read_only, json).await,
        Commands::SweepOrphans => sweep_orphans(&config).await,
    }
}

fn read_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            let mut config = load_config_from_path(path)?;
            apply_env_overrides(&mut config);
            Ok(config)
        }
        None => Ok(load_config()?),
    }
}

fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn read_script(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn check_config(config: &Config) -> anyhow::Result<()> {
    println!("{} {}", style("Config file:").bold(), config_path().display());
    println!("  image        {}", style(&config.sandbox.image).cyan());
    println!(
        "  ports        {}-{} on {}",
        config.sandbox.ports.start, config.sandbox.ports.end, config.sandbox.host
    );
    println!("  name prefix  {}", config.sandbox.name_prefix);
    println!(
        "  readiness    {} x {:?}",
        config.sandbox.readiness.attempts, config.sandbox.readiness.interval
    );
    println!(
        "  cleanup      every {:?}, max age {:?}",
        config.sandbox.cleanup.interval, config.sandbox.cleanup.max_age
    );
    println!(
        "  catalog      {}",
        if config.catalog.is_configured() {
            style("configured").green()
        } else {
            style("not configured").yellow()
        }
    );

    let result = validate_config(config);
    for issue in &result.errors {
        println!("{} {}", style("✗").red(), issue);
    }
    for issue in &result.warnings {
        println!("{} {}", style("⚠").yellow(), issue);
    }

    if result.valid {
        println!("{} Configuration is valid", style("✓").green());
        Ok(())
    } else {
        anyhow::bail!("configuration has {} error(s)", result.errors.len())
    }
}

fn convert(schema: &Path, seed: Option<&Path>) -> anyhow::Result<()> {
    let schema = read_script(schema)?;
    let seed = seed.map(read_script).transpose()?.unwrap_or_default();
    let prepared = prepare_content(&schema, &seed)?;

    eprintln!("{} {}", style("Dialect:").bold(), prepared.dialect);
    for note in &prepared.notes {
        eprintln!("{} {}", style("note:").yellow(), note);
    }

    println!("{}", prepared.schema);
    if !prepared.seed.is_empty() {
        println!();
        println!("{}", prepared.seed);
    }
    Ok(())
}

fn validate(sql: &str, read_only: bool) -> anyhow::Result<()> {
    let policy = if read_only {
        ValidationPolicy::ReadOnly
    } else {
        ValidationPolicy::DenyList
    };

    match validate_script(sql, policy) {
        Ok(statements) => {
            println!("{} {} statement(s) accepted", style("✓").green(), statements.len());
            Ok(())
        }
        Err(e) => {
            println!("{} {}", style("✗").red(), e);
            Err(e.into())
        }
    }
}

async fn run(
    config: &Config,
    schema: &Path,
    seed: Option<&Path>,
    query: &str,
    read_only: bool,
    json: bool,
) -> anyhow::Result<()> {
    let source = SourceDatabase {
        name: schema
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "cli".to_string()),
        schema: read_script(schema)?,
        seed_data: seed.map(read_script).transpose()?.unwrap_or_default(),
    };
    let catalog = StaticCatalog::new().with_database(CLI_DATABASE_ID, source);
    let orchestrator = SandboxOrchestrator::from_config(&config.sandbox, Arc::new(catalog)).await?;

    let info = orchestrator.provision(CLI_STUDENT_ID, CLI_DATABASE_ID).await?;
    info!("Sandbox {} listening on {}:{}", info.name, config.sandbox.host, info.port);

    let result = if read_only {
        orchestrator
            .query_read_only(CLI_STUDENT_ID, CLI_DATABASE_ID, query)
            .await
    } else {
        orchestrator.query(CLI_STUDENT_ID, CLI_DATABASE_ID, query).await
    };

    if !orchestrator.teardown(CLI_STUDENT_ID, CLI_DATABASE_ID).await {
        warn!("Sandbox {} was already gone at teardown", info.name);
    }

    let rows = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows.to_json())?);
    } else {
        print_table(&rows);
    }
    Ok(())
}

async fn sweep_orphans(config: &Config) -> anyhow::Result<()> {
    let orchestrator =
        SandboxOrchestrator::from_config(&config.sandbox, Arc::new(StaticCatalog::new())).await?;
    let scheduler = CleanupScheduler::new(orchestrator, config.sandbox.cleanup.clone());
    let removed = scheduler.sweep_orphans().await?;
    println!(
        "{} Removed {} orphan sandbox(es) with prefix {}",
        style("✓").green(),
        removed,
        style(&config.sandbox.name_prefix).cyan()
    );
    Ok(())
}

fn print_table(rows: &QueryRows) {
    if rows.columns.is_empty() {
        println!("{}", style("(no rows)").dim());
        return;
    }

    let cell = |value: &Option<String>| value.clone().unwrap_or_else(|| "NULL".to_string());
    let mut widths: Vec<usize> = rows.columns.iter().map(|c| c.chars().count()).collect();
    for row in &rows.rows {
        for (width, value) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell(value).chars().count());
        }
    }

    let header: Vec<String> = rows
        .columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:<w$}", c, w = *w))
        .collect();
    println!("{}", style(header.join(" │ ")).bold());
    println!(
        "{}",
        widths
            .iter()
            .map(|w| "─".repeat(*w))
            .collect::<Vec<_>>()
            .join("─┼─")
    );
    for row in &rows.rows {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<w$}", cell(v), w = *w))
            .collect();
        println!("{}", line.join(" │ "));
    }
    println!("{}", style(format!("({} row(s))", rows.len())).dim());
}
