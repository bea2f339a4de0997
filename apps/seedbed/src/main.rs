use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use db::{admin, ConnectOpts, DbHandle};
use futures::TryStreamExt;
use mimalloc::MiMalloc;
use runtime::{AppConfig, CliArgs, DatabaseConfig};
use seeder::{load_csv, LoadReport, UserRecord, UserStore};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Expand a sqlite DSN into an absolute-path DSN using a base directory.
/// - Keeps "sqlite::memory:" as-is.
/// - Normalizes backslashes into forward slashes (important on Windows).
fn absolutize_sqlite_dsn(dsn: &str, base_dir: &Path, create_dirs: bool) -> Result<String> {
    if dsn.eq_ignore_ascii_case("sqlite::memory:") || dsn.eq_ignore_ascii_case("sqlite://:memory:")
    {
        return Ok("sqlite::memory:".to_string());
    }
    let db_path = dsn
        .strip_prefix("sqlite://")
        .ok_or_else(|| anyhow!("DSN must start with sqlite:// (got: {})", dsn))?;

    let (path_str, query) = match db_path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (db_path, None),
    };

    let mut p = PathBuf::from(path_str);
    if p.as_os_str().is_empty() {
        return Err(anyhow!("Empty SQLite path in DSN"));
    }
    if p.is_relative() {
        p = base_dir.join(p);
    }

    if let Some(dir) = p.parent() {
        if create_dirs {
            std::fs::create_dir_all(dir)?;
        }
    }

    // Rebuild DSN with absolute path and normalized slashes
    let mut out = String::from("sqlite://");
    out.push_str(&p.to_string_lossy().replace('\\', "/"));
    if let Some(q) = query {
        out.push('?');
        out.push_str(q);
    }
    Ok(out)
}

/// Seedbed - CSV-to-database seeding toolkit
#[derive(Parser)]
#[command(name = "seedbed")]
#[command(about = "Seedbed - CSV-to-database seeding toolkit")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the CSV file with rows to load (overrides config)
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the CSV file into the database
    Seed,
    /// Print seeded rows to stdout as JSON lines
    Stream {
        /// Only print rows strictly older than this age
        #[arg(long)]
        older_than: Option<i32>,

        /// Page through the table with this page size
        #[arg(long, conflicts_with = "batch_size")]
        page_size: Option<u32>,

        /// Fetch rows in batches of this size
        #[arg(long)]
        batch_size: Option<u32>,
    },
    /// Print aggregate statistics for the seeded table
    Stats,
    /// Check configuration
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // CLI args passed down to config
    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        csv: cli.csv.as_ref().map(|p| p.to_string_lossy().to_string()),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Load configuration (normalized home_dir is applied inside)
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;

    // Apply CLI overrides (csv path / verbosity)
    config.apply_cli_overrides(&args);

    // Initialize logging
    match config.logging.as_ref() {
        Some(logging) => runtime::logging::init_logging_from_config(
            logging,
            Path::new(&config.seeder.home_dir),
        ),
        None => runtime::logging::init_default_logging(),
    }

    // Print config and exit if requested
    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    // Execute command
    match cli.command.unwrap_or(Commands::Seed) {
        Commands::Seed => run_seed(&config).await,
        Commands::Stream {
            older_than,
            page_size,
            batch_size,
        } => run_stream(&config, older_than, page_size, batch_size).await,
        Commands::Stats => run_stats(&config).await,
        Commands::Check => check_config(&config),
    }
}

fn database_config(config: &AppConfig) -> Result<&DatabaseConfig> {
    config
        .database
        .as_ref()
        .ok_or_else(|| anyhow!("Database URL not configured"))
}

/// Resolve the configured DSN: expand `${VAR}` credential references and
/// absolutize relative sqlite paths against the home directory.
fn resolve_dsn(config: &AppConfig, db_config: &DatabaseConfig) -> Result<String> {
    let raw = db_config.url.trim().to_owned();
    if raw.is_empty() {
        return Err(anyhow!("Database URL not configured"));
    }

    let mut dsn = db::expand_env_vars(&raw)?;
    if dsn.starts_with("sqlite://") {
        dsn = absolutize_sqlite_dsn(&dsn, Path::new(&config.seeder.home_dir), true)?;
    }
    Ok(dsn)
}

fn connect_opts_from(db_config: &DatabaseConfig) -> ConnectOpts {
    ConnectOpts {
        max_conns: db_config.max_conns,
        acquire_timeout: db_config.acquire_timeout.or(Some(Duration::from_secs(5))),
        sqlite_busy_timeout: db_config
            .busy_timeout_ms
            .map(|ms| Duration::from_millis(ms as u64)),
        create_sqlite_dirs: true,
        ..Default::default()
    }
}

/// First stage of every command: create the application database if the
/// engine has a notion of one, then open the application pool.
async fn connect(config: &AppConfig) -> Result<DbHandle> {
    let db_config = database_config(config)?;
    let dsn = resolve_dsn(config, db_config)?;
    let opts = connect_opts_from(db_config);

    if let Some(name) = admin::database_from_dsn(&dsn)? {
        let admin_db = DbHandle::connect(&admin::admin_dsn(&dsn)?, opts.clone()).await?;
        let ensured = admin::ensure_database(&admin_db, &name).await;
        admin_db.close().await;
        ensured?;
    }

    tracing::info!(dsn = %db::redact_credentials_in_dsn(Some(&dsn)), "connecting to database");
    let db = DbHandle::connect(&dsn, opts).await?;
    tracing::info!(engine = ?db.engine(), "connected");
    Ok(db)
}

async fn run_seed(config: &AppConfig) -> Result<()> {
    let csv_path = PathBuf::from(&config.seeder.csv_path);
    let db = connect(config).await?;

    let result = seed(&UserStore::new(&db), &csv_path).await;
    db.close().await;

    let report = result?;
    println!("{report}");
    Ok(())
}

async fn seed(store: &UserStore<'_>, csv_path: &Path) -> Result<LoadReport> {
    store.ensure_table().await?;
    Ok(load_csv(store, csv_path).await?)
}

async fn run_stream(
    config: &AppConfig,
    older_than: Option<i32>,
    page_size: Option<u32>,
    batch_size: Option<u32>,
) -> Result<()> {
    let db = connect(config).await?;
    let result = stream_rows(&UserStore::new(&db), older_than, page_size, batch_size).await;
    db.close().await;
    result
}

async fn stream_rows(
    store: &UserStore<'_>,
    older_than: Option<i32>,
    page_size: Option<u32>,
    batch_size: Option<u32>,
) -> Result<()> {
    store.ensure_table().await?;

    match (page_size, batch_size) {
        (Some(size), _) => {
            let mut pages = store.paginate(size);
            while let Some(page) = pages.try_next().await? {
                for rec in filter_older(page, older_than) {
                    println!("{}", serde_json::to_string(&rec)?);
                }
            }
        }
        (None, Some(size)) => {
            let mut batches = store.fetch_in_batches(size);
            while let Some(batch) = batches.try_next().await? {
                for rec in filter_older(batch, older_than) {
                    println!("{}", serde_json::to_string(&rec)?);
                }
            }
        }
        (None, None) => match older_than {
            // The filter runs server-side when no paging is requested.
            Some(age) => {
                for rec in store.fetch_older_than(age).await? {
                    println!("{}", serde_json::to_string(&rec)?);
                }
            }
            None => {
                let mut rows = store.stream_users()?;
                while let Some(rec) = rows.try_next().await? {
                    println!("{}", serde_json::to_string(&rec)?);
                }
            }
        },
    }
    Ok(())
}

fn filter_older(
    page: Vec<UserRecord>,
    older_than: Option<i32>,
) -> impl Iterator<Item = UserRecord> {
    page.into_iter()
        .filter(move |rec| older_than.map_or(true, |age| rec.age > age))
}

async fn run_stats(config: &AppConfig) -> Result<()> {
    let db = connect(config).await?;
    let store = UserStore::new(&db);

    let result = async {
        store.ensure_table().await?;
        store.summary().await
    }
    .await;
    db.close().await;

    let summary = result?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("checking configuration");

    if let Some(db_config) = config.database.as_ref() {
        let dsn = resolve_dsn(config, db_config)?;
        let engine = DbHandle::detect(&dsn)?;
        println!("Database engine: {engine:?}");
    }

    println!("Configuration check passed");
    println!("{}", config.to_yaml()?);
    Ok(())
}
