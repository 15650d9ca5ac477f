use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use vpm_registry::config::{self, ResolverConfig};
use vpm_registry::repository::cache::{ReconcileReport, RepositoryCache, Session};
use vpm_registry::repository::sources::HttpSource;
use vpm_registry::repository::store::CacheStore;
use vpm_registry::source_list::{SourceProvider, SourceStore};
use vpm_registry::version::spec::VersionSpec;
use vpm_registry::watch::{SourceWatcher, watch_sources};

#[derive(Parser)]
#[command(name = "vpm-registry")]
#[command(version, about = "Package repository resolver with an on-disk manifest cache")]
struct Cli {
    /// Configuration file (defaults to config.json in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    log_stderr: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch every configured repository now
    Refresh,
    /// List every known package
    List,
    /// Resolve a version query for one package
    Resolve {
        name: String,
        /// Version query such as 1.2.x or x.x.x
        query: String,
        /// Consider beta versions
        #[arg(long)]
        beta: bool,
    },
    /// Edit the configured repository sources
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },
    /// Keep the cache in step with source list edits until interrupted
    Watch,
}

#[derive(Subcommand)]
enum SourcesAction {
    List,
    Add { locator: String },
    Remove { locator: String },
}

fn init_logging(cli: &Cli) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if cli.log_stderr {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);
        if cli.log_json {
            builder.json().init();
        } else {
            builder.with_target(false).init();
        }
        return Ok(None);
    }

    let log_path = config::log_path();
    let log_dir = log_path
        .parent()
        .context("log path has no parent directory")?;
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {:?}", log_dir))?;
    let file_name = log_path
        .file_name()
        .context("log path has no file name")?;

    let appender = tracing_appender::rolling::never(log_dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(Some(guard))
}

struct App {
    config: ResolverConfig,
    sources: Arc<SourceStore>,
    cache: RepositoryCache,
}

impl App {
    fn open(cli: &Cli) -> anyhow::Result<Self> {
        let config_path = cli.config.clone().unwrap_or_else(config::config_path);
        let config = ResolverConfig::load(&config_path)
            .with_context(|| format!("failed to load configuration {:?}", config_path))?;

        let sources_path = config::sources_path();
        let sources = Arc::new(
            SourceStore::open(&sources_path)
                .with_context(|| format!("failed to open source list {:?}", sources_path))?,
        );
        let network = HttpSource::new(config.fetch.timeout_ms, &config.fetch.user_agent)
            .context("failed to build HTTP client")?;
        let cache = RepositoryCache::new(
            CacheStore::new(config.cache_dir()),
            sources.clone(),
            Arc::new(network),
            Session::new(),
            config.fetch.clone(),
        );

        Ok(Self {
            config,
            sources,
            cache,
        })
    }
}

fn print_report(report: &ReconcileReport) {
    println!(
        "{:?}: {} repositories loaded",
        report.mode,
        report.loaded.len()
    );
    for failure in &report.failures {
        let suffix = if failure.used_fallback {
            " (using cached copy)"
        } else {
            ""
        };
        println!("  failed {}: {}{}", failure.locator, failure.error, suffix);
    }
    if !report.removed_records.is_empty() {
        println!("  removed {} stale records", report.removed_records.len());
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let app = App::open(&cli)?;

    match cli.command {
        Command::Refresh => {
            let report = app
                .cache
                .refresh_all()
                .await
                .context("failed to refresh repositories")?;
            print_report(&report);
        }
        Command::List => {
            app.cache.init().await.context("failed to load repositories")?;
            let catalog = app.cache.catalog();
            for name in catalog.package_names() {
                if let Some((entry, repository)) = catalog.lookup_with_repository(name) {
                    let latest = entry
                        .most_recent(app.config.allow_beta)
                        .map(|v| v.version.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!("{}\t{}\t{}", name, latest, repository.label());
                }
            }
            for conflict in catalog.conflicts() {
                println!(
                    "conflict: {} from {} ignored, using {}",
                    conflict.package_name, conflict.skipped, conflict.selected
                );
            }
        }
        Command::Resolve { name, query, beta } => {
            let query = VersionSpec::try_parse(&query)
                .with_context(|| format!("invalid version query {:?}", query))?;
            app.cache.init().await.context("failed to load repositories")?;
            let catalog = app.cache.catalog();
            match catalog.resolve(&name, &query, beta || app.config.allow_beta) {
                Some(version) => println!("{} {}", version.name, version.version),
                None => {
                    eprintln!("no version of {} matches {}", name, query);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::Sources { action } => match action {
            SourcesAction::List => {
                for locator in app.sources.sources() {
                    println!("{}", locator);
                }
            }
            SourcesAction::Add { locator } => {
                if !app.sources.add(&locator).context("failed to add source")? {
                    println!("{} is already configured", locator);
                }
            }
            SourcesAction::Remove { locator } => {
                if !app
                    .sources
                    .remove(&locator)
                    .context("failed to remove source")?
                {
                    println!("{} is not configured", locator);
                }
            }
        },
        Command::Watch => {
            let report = app.cache.init().await.context("failed to load repositories")?;
            print_report(&report);
            app.cache.subscribe(|catalog| {
                println!("catalog updated: {} packages", catalog.len());
            });

            let watcher = SourceWatcher::new(app.sources.path());
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            watch_sources(
                watcher,
                &app.sources,
                &app.cache,
                Duration::from_millis(app.config.watch.poll_interval_ms),
                shutdown,
            )
            .await;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let _guard = init_logging(&cli)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}
