use anyhow::{Context, Result};
use clap::Parser;
use lmstudio_gateway::app::App;
use lmstudio_gateway::config::Config;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "lmstudio-gateway")]
#[command(about = "HTTP chat gateway for a local LM Studio runtime")]
struct CliArgs {
    /// Bind address; overrides HOST.
    #[arg(long)]
    host: Option<String>,

    /// Listen port; overrides PORT.
    #[arg(long)]
    port: Option<u16>,
}

impl CliArgs {
    fn apply(self, mut config: Config) -> Config {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lmstudio_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting lmstudio-gateway");

    let args = CliArgs::parse();
    let config = args.apply(Config::from_env().context("reading configuration")?);
    let app = App::new(config).context("building application")?;

    if let Err(e) = app.serve().await {
        error!("Server failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
