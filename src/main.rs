use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dwarf_planet::config::Config;
use dwarf_planet::fetcher::{start_background_refresh, Fetcher};
use dwarf_planet::render;
use dwarf_planet::routes::{self, AppState};

#[derive(Parser)]
#[command(name = "dwarf-planet", version, about = "A feed aggregator")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "planet.toml")]
    config: PathBuf,

    /// Log much more about what is going on
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch every source once and update the stores
    Update {
        /// Also write the site as static files into this directory
        #[arg(long = "static", value_name = "DIR")]
        static_dir: Option<PathBuf>,
    },
    /// Serve the planet, refreshing sources in the background
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose {
        "dwarf_planet=debug,tower_http=debug"
    } else {
        "dwarf_planet=info,tower_http=debug"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::load(&cli.config)?);
    info!(
        "Loaded {} sources from {}",
        config.sources.len(),
        cli.config.display()
    );

    let fetcher = Arc::new(Fetcher::new(config.clone())?);

    match cli.command {
        Command::Update { static_dir } => {
            if let Some(report) = fetcher.refresh_all_sources().await? {
                for failed in report.failures() {
                    warn!("Source '{}' was not updated", failed.name);
                }
            }
            if let Some(dir) = static_dir {
                render::freeze(&config, &dir, Utc::now())?;
            }
        }
        Command::Serve => serve(config, fetcher).await?,
    }

    Ok(())
}

async fn serve(config: Arc<Config>, fetcher: Arc<Fetcher>) -> anyhow::Result<()> {
    // Start background refresh task
    let bg_fetcher = fetcher.clone();
    let refresh_interval = config.refresh_interval;
    tokio::spawn(async move {
        start_background_refresh(bg_fetcher, refresh_interval).await;
    });

    let state = Arc::new(AppState {
        config: config.clone(),
        fetcher,
    });

    let app = routes::router(state)
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Server starting on http://{}", config.bind);

    axum::serve(listener, app).await?;

    Ok(())
}
