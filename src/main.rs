use anyhow::Result;
use clap::{Parser, Subcommand};
use pinglun::config::Config;
use pinglun::crawler::{video, AcquisitionEngine, BiliFetcher, CrawlParams};
use pinglun::models::SortMode;
use pinglun::server::ApiServer;
use pinglun::storage::Database;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "pinglun",
    version,
    about = "Bilibili video comment acquisition and query service",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the REST API server
    Serve {
        /// Bind address override, e.g. 0.0.0.0:60001
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Acquire comments for one video from the command line
    Crawl {
        /// Video BV identifier
        bv: String,

        /// Sort mode (2 = latest, 3 = hot)
        #[arg(short, long, default_value = "3")]
        mode: u8,

        /// Skip second-level replies
        #[arg(long, default_value = "false")]
        no_replies: bool,

        /// Maximum number of comments to acquire
        #[arg(short, long, default_value = "100")]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = Config::from_env()?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            serve(config).await?;
        }

        Commands::Crawl {
            bv,
            mode,
            no_replies,
            limit,
        } => {
            tracing::info!(bv = %bv, mode, limit, "starting crawl command");
            let config = Config::from_env()?;
            crawl(config, bv, mode, !no_replies, limit).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("pinglun=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("pinglun=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let server = ApiServer::new(config)?;
    server.start().await?;
    Ok(())
}

/// One-shot acquisition without the server: resolve, create an unattributed
/// job, and run it to a terminal status
async fn crawl(config: Config, bv: String, mode: u8, include_replies: bool, limit: u32) -> Result<()> {
    let db = Arc::new(Database::open(&config.database.sqlite_path)?);
    let fetcher = Arc::new(BiliFetcher::new(&config.crawler)?);
    let engine = AcquisitionEngine::new(fetcher.clone(), db.clone(), &config.crawler);

    let sort = SortMode::from_mode(mode);
    let budget = limit.clamp(1, 1000);

    let resolved = video::resolve(&fetcher, &bv).await?;
    println!("Resolved {bv}: {} (oid {})", resolved.title, resolved.oid);

    let job_id = db.create_job(&bv, &resolved.title, sort, include_replies, None)?;
    let params = CrawlParams {
        oid: resolved.oid,
        sort,
        include_replies,
        budget,
        initial_cursor: String::new(),
    };

    let acquired = engine.run(job_id, &params).await?;
    println!("Job {job_id} done: {acquired} comments acquired");
    Ok(())
}
