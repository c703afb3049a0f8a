//! # Component Harvest CLI (`harvest`)
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest sources` | List configured registries |
//! | `harvest scan <source> <name>` | Resolve, fetch, and store a component |
//! | `harvest list` | List harvested components |
//! | `harvest prompt <source> <name>` | Print integration instructions |
//! | `harvest registry list <source>` | List a metadata registry's components |
//! | `harvest registry refresh [source]` | Re-fetch registry listings |
//! | `harvest serve mcp` | Start the HTTP + MCP tool server |

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use component_harvest::config::{self, Config};
use component_harvest::fetch::HttpFetcher;
use component_harvest::harvest::{format_harvested, format_registry, Harvester};
use component_harvest::models::SourceFilter;
use component_harvest::{server, sources};

/// Component Harvest: resolve, store, and explain UI registry components.
#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Component Harvest: resolve UI component names against registries and store them locally",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// A missing file falls back to the built-in sources and defaults.
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    /// Log verbosity. `RUST_LOG` takes precedence when set.
    #[arg(long, global = true, value_enum, default_value = "info")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List configured sources.
    Sources,

    /// Resolve a component by name, fetch its payload, and record it.
    ///
    /// The source's registry listing is fetched first. Names that are not
    /// listed can still be scanned with `--url`.
    Scan {
        /// Source name (e.g. `aceternity`, `magicui`).
        source: String,
        /// Component name as shown on the site, e.g. "3D Pin".
        name: String,
        /// Component page or registry URL, used when the name is not listed.
        #[arg(long)]
        url: Option<String>,
    },

    /// List harvested components.
    List {
        /// `all` or a source name.
        #[arg(long, default_value = "all")]
        source: String,
    },

    /// Print integration instructions for a harvested component.
    Prompt {
        source: String,
        name: String,
    },

    /// Inspect or refresh registry listings.
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },

    /// Start the tool server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

#[derive(Subcommand)]
enum RegistryAction {
    /// List every component in a metadata (inline) registry.
    List { source: String },
    /// Fetch registry listings and report entry counts.
    Refresh {
        /// Only this source; all sources when omitted.
        source: Option<String>,
    },
}

#[derive(Subcommand)]
enum ServeService {
    /// Serve `/tools/*`, `/health`, and the MCP endpoint at `/mcp`.
    ///
    /// Binds to the address configured in `[server].bind`.
    Mcp,
}

fn initialize_tracing(log_level: &LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found, using built-in defaults");
        return Ok(Config::minimal());
    }
    config::load_config(path)
}

/// Refreshes one source for a CLI command. A failure is logged and the
/// command continues with overrides and `--url` resolution only.
async fn refresh_quietly(harvester: &Harvester, source: &str) -> Result<()> {
    harvester.cache(source)?;
    if let Err(e) = harvester.refresh(source).await {
        tracing::warn!(source, error = %e, "registry listing unavailable");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(&cli.log_level);

    let cfg = Arc::new(resolve_config(&cli.config)?);
    if let Commands::Sources = cli.command {
        sources::list_sources(&cfg);
        return Ok(());
    }

    let http = Arc::new(HttpFetcher::new(&cfg.http)?);
    let harvester = Arc::new(Harvester::new(Arc::clone(&cfg), http));

    match cli.command {
        Commands::Sources => {}
        Commands::Scan { source, name, url } => {
            harvester.store().load();
            refresh_quietly(&harvester, &source).await?;
            let outcome = harvester.scan(&source, &name, url.as_deref()).await?;
            println!("{}", outcome.message());
        }
        Commands::List { source } => {
            harvester.store().load();
            let records = harvester.list_harvested(&SourceFilter::parse(Some(&source)))?;
            print!("{}", format_harvested(&records));
        }
        Commands::Prompt { source, name } => {
            harvester.store().load();
            println!("{}", harvester.prompt(&source, &name)?);
        }
        Commands::Registry { action } => match action {
            RegistryAction::List { source } => {
                refresh_quietly(&harvester, &source).await?;
                let entries = harvester.list_registry(&source)?;
                print!("{}", format_registry(&source, &entries));
            }
            RegistryAction::Refresh { source: Some(source) } => {
                let count = harvester.refresh(&source).await?;
                println!("{}: {} entries", source, count);
            }
            RegistryAction::Refresh { source: None } => {
                let mut failed = 0;
                for report in harvester.refresh_all().await {
                    match report.result {
                        Ok(count) => println!("{}: {} entries", report.source, count),
                        Err(e) => {
                            failed += 1;
                            println!("{}: failed ({})", report.source, e);
                        }
                    }
                }
                if failed > 0 {
                    anyhow::bail!("{} registry refresh(es) failed", failed);
                }
            }
        },
        Commands::Serve { service } => match service {
            ServeService::Mcp => server::run_server(harvester).await?,
        },
    }

    Ok(())
}
