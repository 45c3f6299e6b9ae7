use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recipe_scribe::{server, utils, AppState, Cli, Commands, Config, LogFormat, TikTokExtractor};

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_filter = if verbose {
        "recipe_scribe=debug,tower_http=debug"
    } else {
        "recipe_scribe=info,tower_http=info"
    };

    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| default_filter.into()),
    );

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            let mut config = Config::load(cli.config.as_deref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;

            // Check for required external dependencies (non-fatal in Docker)
            let missing_deps = utils::check_dependencies(&config.downloader.yt_dlp_path).await;
            for dep in missing_deps {
                tracing::warn!("Missing dependency: {} (continuing anyway)", dep);
            }

            let state = AppState::from_config(&config)?;
            server::serve(&config, state).await?;
        }
        Commands::Config { show } => {
            let config = Config::load(cli.config.as_deref())?;
            if show {
                config.display();
            }
            if let Err(e) = config.validate() {
                println!("Configuration is incomplete: {}", e);
            }
        }
        Commands::Platforms => {
            println!("Supported platforms:");
            println!("  • TikTok");
            for shape in TikTokExtractor::supported_shapes() {
                println!("      {}", shape);
            }
        }
    }

    Ok(())
}
