use clap::{Parser, Subcommand};
use media_indexer::alias::{AliasRegistry, JsonAliasStore};
use media_indexer::byday::by_day;
use media_indexer::config::{self, DEFAULT_CONFIG_FILE, IndexerConfig};
use media_indexer::indexer::{Collaborators, Indexer};
use media_indexer::output;
use media_indexer::store::JsonDocumentStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn version_string() -> &'static str {
    let on_tag = env!("INDEXER_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("INDEXER_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "media-indexer")]
#[command(about = "Index photo and video libraries for search")]
#[command(long_about = "\
Index photo and video libraries for search

Each scan root gets a short numeric alias, and indexed paths are stored as
alias\\relative\\path so the index survives moving the library. Files are
deduplicated by content: unchanged files are skipped on later runs, and
documents of deleted files are removed.

Required tools: exiftool, ffmpeg. Optional: vipsthumbnail (faster image
thumbnails; without it images are resized in process).

Log verbosity is controlled with LOG_LEVEL (e.g. LOG_LEVEL=debug).

Run 'media-indexer gen-config' to generate a documented config file.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (defaults apply when it does not exist)
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index every photo and video under a directory
    Index {
        /// Directory to scan
        root: PathBuf,
        /// Reindex every file, even when the stored document is current
        #[arg(long)]
        reindex: bool,
        /// Run every stage without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Base URL of the reverse geocoding service
        #[arg(long)]
        lookup_url: Option<String>,
    },
    /// List the registered scan roots
    Aliases,
    /// Show what was captured on a calendar day, any year
    ByDay {
        /// Month (1-12)
        #[arg(value_parser = clap::value_parser!(u32).range(1..=12))]
        month: u32,
        /// Day of the month (1-31)
        #[arg(value_parser = clap::value_parser!(u32).range(1..=31))]
        day: u32,
    },
    /// Print a stock config file with all options documented
    GenConfig,
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .init();
}

fn open_registry(config: &IndexerConfig) -> Result<AliasRegistry, Box<dyn std::error::Error>> {
    Ok(AliasRegistry::open(Box::new(JsonAliasStore::new(
        &config.paths.alias_store,
    )))?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Command::Index {
            root,
            reindex,
            dry_run,
            lookup_url,
        } => {
            let mut config = config::load_config(&cli.config)?;
            if reindex {
                config.indexing.force_reindex = true;
            }
            if let Some(url) = lookup_url {
                config.location.lookup_url = url;
                config.validate()?;
            }
            let registry = Arc::new(open_registry(&config)?);
            let collaborators = Collaborators::from_config(&config)?;
            let summary = Indexer::new(&config, collaborators, registry)
                .dry_run(dry_run)
                .run(&root)?;
            output::print_run_report(&summary);
        }
        Command::Aliases => {
            let config = config::load_config(&cli.config)?;
            output::print_aliases(&open_registry(&config)?.entries());
        }
        Command::ByDay { month, day } => {
            let config = config::load_config(&cli.config)?;
            let store = JsonDocumentStore::open(&config.paths.document_store)?;
            output::print_by_day(&by_day(&store, month, day)?);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}
