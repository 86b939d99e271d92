//! ScoreHall CLI
//!
//! ```bash
//! # Serve the HTTP API
//! scorehall serve --port 3000
//!
//! # Wipe every tenant and recreate the registry
//! scorehall init
//!
//! # Register a tenant and create its store
//! scorehall add-tenant acme --display-name "Acme Inc"
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use scorehall_core::ScoreHallConfig;
use scorehall_core::types::TenantBilling;
use scorehall_platform::Platform;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "scorehall", version, about = "Multi-tenant competition scoring service")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, global = true, env = "SCOREHALL_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway.
    Serve {
        /// Override the configured listen port.
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Destroy all tenant data and recreate an empty registry.
    Init,
    /// Register a tenant and provision its store.
    AddTenant {
        name: String,
        #[arg(long)]
        display_name: Option<String>,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let config_path = cli.config.unwrap_or_else(ScoreHallConfig::default_path);
    let mut config = ScoreHallConfig::load_or_default(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.gateway.port = port;
            }
            let platform = Arc::new(Platform::open(&config).context("opening platform")?);
            tracing::info!("🚀 ScoreHall starting with shards in {}", config.tenant_db_dir().display());
            scorehall_gateway::start(&config, platform).await?;
        }
        Command::Init => {
            let platform = Platform::open(&config).context("opening platform")?;
            platform.reset().context("reset failed")?;
            println!("✅ Registry recreated, all tenant stores removed");
        }
        Command::AddTenant { name, display_name } => {
            let platform = Platform::open(&config).context("opening platform")?;
            let display_name = display_name.unwrap_or_else(|| name.clone());
            let tenant = platform
                .provision_tenant(&name, &display_name)
                .with_context(|| format!("adding tenant {name}"))?;
            println!("{}", serde_json::to_string_pretty(&TenantBilling::unbilled(&tenant))?);
        }
    }

    Ok(())
}
