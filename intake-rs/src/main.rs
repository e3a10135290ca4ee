use clap::Parser;
use intake_rs::config::Config;
use intake_rs::intake::IntakeHandler;
use intake_rs::smtp::SmtpServer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Inbound SMTP intake for MailHub
#[derive(Parser, Debug)]
#[command(name = "intake-rs", version, about)]
struct Cli {
    /// TOML configuration file; INTAKE__* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.logging.format.as_str() {
        "json" => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        "compact" => registry.with(tracing_subscriber::fmt::layer().compact()).init(),
        _ => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    init_logging(&config);
    config.validate()?;

    info!("Starting intake-rs v{}", env!("CARGO_PKG_VERSION"));
    info!("  SMTP listening on: {}", config.smtp.listen_addr);
    info!("  Domain: {}", config.server.domain);
    info!("  Message API: {}", config.api.create_message_url);

    let handler = Arc::new(IntakeHandler::from_config(&config)?);
    let server = SmtpServer::new(config, handler);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("SMTP server error: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
