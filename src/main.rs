//! The CLI: `clap` derive + `env` for flags, layered with a
//! `.migrate-config.yaml` fallback (CLI flag, then config file, then error),
//! driving the create/goto/up/down/drop/force/version surface over source
//! and database URLs.

mod command;

use std::{
    fs::File,
    io::{self, BufRead, Write},
    path::PathBuf,
    process::ExitCode,
    sync::atomic::{AtomicBool, Ordering},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use rusqlite::Connection;

use migrate_engine::database::sqlite::SqliteDatabase;
use migrate_engine::source::file::FileSource;
use migrate_engine::source::SourceDriver;
use migrate_engine::url::to_nonneg_i64;
use migrate_engine::{MigrateError, Migrator};

/// Drive schema migrations between a source of versioned scripts and a
/// target database.
#[derive(clap::Parser, Debug, Clone)]
#[command(name = "migrate")]
#[command(bin_name = "migrate")]
struct MigrateCli {
    #[command(subcommand)]
    command: Commands,

    /// `file://` URL (or bare path) to a directory of migration scripts.
    #[arg(short, long, env = "MIGRATION_SOURCE", global = true)]
    source: Option<String>,

    /// `sqlite://` URL (or bare path) to the target database.
    #[arg(short, long, env = "MIGRATION_DATABASE", global = true)]
    database: Option<String>,

    /// How many migrations the pipeline may prefetch ahead of the runner.
    #[arg(long, env = "MIGRATION_PREFETCH", global = true)]
    prefetch: Option<usize>,

    /// How long to wait to acquire the database lock, in seconds.
    #[arg(long, env = "MIGRATION_LOCK_TIMEOUT", global = true)]
    lock_timeout: Option<u64>,

    /// Emit debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Subcommand, Debug, Clone)]
enum Commands {
    /// Scaffold a new pair of up/down migration scripts.
    Create(CreateArgs),
    /// Migrate to an absolute version.
    Goto(GotoArgs),
    /// Apply up migrations (all, or N if given).
    Up(StepsArgs),
    /// Undo applied migrations (all, or N if given).
    Down(DownArgs),
    /// Erase all user data and reset to NilVersion.
    Drop(DropArgs),
    /// Set the persistent version directly, clearing any dirty flag.
    Force(ForceArgs),
    /// Print the current version and dirty state.
    Version,
}

#[derive(clap::Args, Debug, Clone)]
struct CreateArgs {
    /// Name for the new migration.
    #[arg(required = true)]
    migration_name: String,
}

#[derive(clap::Args, Debug, Clone)]
struct GotoArgs {
    version: i64,
}

#[derive(clap::Args, Debug, Clone)]
struct StepsArgs {
    /// Number of migrations to apply; omit to apply all remaining.
    n: Option<u64>,
}

#[derive(clap::Args, Debug, Clone)]
struct DownArgs {
    /// Number of migrations to undo; omit together with `--all` to be
    /// prompted for confirmation before undoing everything.
    n: Option<u64>,
    #[arg(long)]
    all: bool,
}

#[derive(clap::Args, Debug, Clone)]
struct DropArgs {
    /// Skip the confirmation prompt.
    #[arg(short, long)]
    force: bool,
}

#[derive(clap::Args, Debug, Clone)]
struct ForceArgs {
    version: i64,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
struct MigrateFileCfg {
    source_path: Option<String>,
    database_path: Option<String>,
    prefetch: Option<usize>,
    lock_timeout_secs: Option<u64>,
}

fn load_config() -> Result<MigrateFileCfg> {
    let current_dir = std::env::current_dir()?;
    match File::open(current_dir.join(".migrate-config.yaml")) {
        Ok(f) => serde_yaml::from_reader(f).context("failed to parse .migrate-config.yaml"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(MigrateFileCfg::default()),
        Err(e) => Err(e.into()),
    }
}

fn resolve(args: &MigrateCli, config: &MigrateFileCfg) -> Result<(String, String, usize, u64)> {
    let source = args
        .source
        .clone()
        .or_else(|| config.source_path.clone())
        .context("'source' not set via --source, MIGRATION_SOURCE, or .migrate-config.yaml")?;
    let database = args
        .database
        .clone()
        .or_else(|| config.database_path.clone())
        .context("'database' not set via --database, MIGRATION_DATABASE, or .migrate-config.yaml")?;
    let prefetch = args
        .prefetch
        .or(config.prefetch)
        .unwrap_or(migrate_engine::pipeline::DEFAULT_PREFETCH);
    let lock_timeout = args
        .lock_timeout
        .or(config.lock_timeout_secs)
        .unwrap_or(migrate_engine::migrator::DEFAULT_LOCK_TIMEOUT.as_secs());
    Ok((source, database, prefetch, lock_timeout))
}

fn open_sqlite(url: &str, lock_timeout: Duration) -> Result<SqliteDatabase> {
    let (path, query) = migrate_engine::url::filter_custom_query_params(url);
    let path = path.strip_prefix("sqlite://").unwrap_or(&path);
    let conn = if path.is_empty() || path == ":memory:" {
        Connection::open_in_memory()
    } else {
        Connection::open(path)
    }
    .context("failed to open database")?;
    let table = query
        .get("x-migrations-table")
        .cloned()
        .unwrap_or_else(|| "schema_migrations".to_string());
    SqliteDatabase::new(conn, table, lock_timeout)
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to initialize database")
}

/// Ask the controlling terminal for a y/N confirmation. Defaults to
/// "no" on anything but an explicit "y"/"yes".
fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let answer = line.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

fn install_sigint_handler(stop: migrate_engine::GracefulStop) -> Result<()> {
    let triggered = Arc::new(AtomicBool::new(false));
    // SAFETY: the handler only stores to an `Arc<AtomicBool>` and calls
    // `GracefulStop::trigger`, which itself only stores to an
    // `Arc<AtomicBool>`; both are async-signal-safe.
    unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGINT, move || {
            if !triggered.swap(true, Ordering::SeqCst) {
                stop.trigger();
            }
        })?;
    }
    Ok(())
}

fn run(args: MigrateCli) -> Result<()> {
    let config = load_config()?;
    let (source_url, database_url, prefetch, lock_timeout_secs) = resolve(&args, &config)?;

    if let Commands::Create(ref v) = args.command {
        let dir = source_url
            .strip_prefix("file://")
            .unwrap_or(&source_url);
        return command::create(&PathBuf::from(dir), &v.migration_name);
    }

    let source = FileSource::open(&source_url).map_err(|e| anyhow::anyhow!(e))?;
    let database = open_sqlite(&database_url, Duration::from_secs(lock_timeout_secs))?;
    let mut migrator = Migrator::new(source, database).with_prefetch(prefetch);
    install_sigint_handler(migrator.graceful_stop_handle())?;

    let outcome = match args.command {
        Commands::Create(_) => unreachable!("handled above"),
        Commands::Goto(GotoArgs { version }) => migrator.migrate(version),
        Commands::Up(StepsArgs { n }) => match n {
            Some(n) => {
                let n = to_nonneg_i64(n).context("step count out of range")?;
                migrator.steps(n)
            }
            None => migrator.up(),
        },
        Commands::Down(DownArgs { n, all }) => match (n, all) {
            (Some(n), _) => {
                let n = to_nonneg_i64(n).context("step count out of range")?;
                migrator.steps(-n)
            }
            (None, true) => migrator.down(),
            (None, false) => {
                if confirm("Are you sure you want to undo every applied migration?")? {
                    migrator.down()
                } else {
                    println!("aborted");
                    return Ok(());
                }
            }
        },
        Commands::Drop(DropArgs { force }) => {
            if force || confirm("Are you sure you want to drop all data?")? {
                migrator.drop()
            } else {
                println!("aborted");
                return Ok(());
            }
        }
        Commands::Force(ForceArgs { version }) => migrator.force(version),
        Commands::Version => match migrator.version() {
            Ok((version, dirty)) => {
                println!("{version} (dirty: {dirty})");
                Ok(())
            }
            Err(e) => Err(e),
        },
    };

    match outcome {
        Ok(()) | Err(MigrateError::NoChange) => {
            migrator.close().map_err(|e| anyhow::anyhow!(e))?;
            Ok(())
        }
        Err(e) => {
            let _ = migrator.close();
            Err(anyhow::anyhow!(e))
        }
    }
}

fn main() -> ExitCode {
    let args = MigrateCli::parse();
    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    match run(args) {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
