mod display;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kusuri_core::PipelineConfig;
use kusuri_feed::{FeedKey, FeedRecords, IncidentQuery, Loaded, Pipeline};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kusuri", version, about = "Drug shortage, incident, surveillance, and pollen feeds")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, env = "KUSURI_CONFIG")]
    config: Option<PathBuf>,

    /// Cache directory (overrides the config file)
    #[arg(long, global = true, env = "KUSURI_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a feed through the cache
    Load {
        /// shortage, incidents, surveillance, or pollen
        feed: FeedKey,
        /// Show at most this many records
        #[arg(long)]
        limit: Option<usize>,
        /// Print JSON instead of cards
        #[arg(long)]
        json: bool,
    },
    /// Search incident reports by drug or ingredient name
    Incidents {
        keyword: String,
        /// Extra free-text narrowing
        #[arg(long)]
        filter: Option<String>,
        #[arg(long, default_value_t = 50)]
        count: u32,
        #[arg(long)]
        json: bool,
    },
    /// Clear the cached copy of a feed and fetch it again
    Reload {
        feed: FeedKey,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Clear every cached copy of a feed
    Clear { feed: FeedKey },
}

fn load_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    Ok(config)
}

fn print_loaded(mut loaded: Loaded<FeedRecords>, limit: Option<usize>, json: bool) -> anyhow::Result<()> {
    let total = loaded.data.len();
    if let Some(n) = limit {
        loaded.data.truncate(n);
    }
    if json {
        let text = serde_json::to_string_pretty(&loaded).context("encoding records")?;
        println!("{text}");
        return Ok(());
    }
    print!("{}", display::render_records(&loaded.data));
    eprintln!("{}", display::render_provenance(&loaded, total));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    tracing::debug!("kusuri v{}", env!("CARGO_PKG_VERSION"));
    let pipeline = Pipeline::open(config).context("opening pipeline")?;

    match cli.command {
        Command::Load { feed, limit, json } => {
            let loaded = pipeline
                .load_records(feed)
                .await
                .with_context(|| format!("loading {feed}"))?;
            print_loaded(loaded, limit, json)?;
        }
        Command::Incidents {
            keyword,
            filter,
            count,
            json,
        } => {
            let mut query = IncidentQuery::keyword(keyword).with_count(count);
            if let Some(filter) = filter {
                query = query.with_filter(filter);
            }
            let loaded = pipeline
                .load_incidents(query)
                .await
                .context("searching incident reports")?;
            print_loaded(loaded, None, json)?;
        }
        Command::Reload { feed, limit, json } => {
            let loaded = pipeline
                .reload(feed)
                .await
                .with_context(|| format!("reloading {feed}"))?;
            print_loaded(loaded, limit, json)?;
        }
        Command::Clear { feed } => {
            let removed = pipeline
                .clear(feed)
                .await
                .with_context(|| format!("clearing {feed}"))?;
            eprintln!("cleared {feed} ({removed} cached entries)");
        }
    }
    Ok(())
}
