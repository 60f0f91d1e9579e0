//! Prompter - Desktop assistant runtime core
//!
//! The local daemon supervising assistant agents, holding session state,
//! and probing remote services on behalf of the presentation layer.

use anyhow::Result;
use clap::{Parser, Subcommand};
use prompter::{
    agent::{resolve_agent_binary, AgentKind},
    api::build_app,
    backend::{BackendClient, HealthApi},
    config::PrompterConfig,
    Runtime,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "prompter")]
#[command(version)]
#[command(about = "Desktop assistant runtime core")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PROMPTER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the runtime daemon
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(long, default_value = "18520")]
        port: u16,
    },

    /// Run diagnostics
    Doctor,

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("prompter={},tower_http=debug", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = if let Some(config_path) = cli.config {
        let content = std::fs::read_to_string(&config_path)?;
        toml::from_str(&content)?
    } else {
        PrompterConfig::default()
    };

    match cli.command {
        Commands::Serve { host, port } => {
            run_serve(config, host, port).await?;
        }
        Commands::Doctor => {
            run_doctor(&config).await?;
        }
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
    }

    Ok(())
}

async fn run_serve(mut config: PrompterConfig, host: String, port: u16) -> Result<()> {
    tracing::info!("Starting Prompter runtime");

    config.server.host = host;
    config.server.port = port;
    let cors_origins = config.server.cors_origins.clone();
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    let runtime = Runtime::builder().config(config).build()?;
    runtime.start().await;

    let app = build_app(runtime.clone(), &cors_origins);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Control surface listening");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Control surface server exited");
        }
    });

    tracing::info!("Prompter runtime is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");
    runtime.stop().await;
    server.abort();

    Ok(())
}

async fn run_doctor(config: &PrompterConfig) -> Result<()> {
    println!("Prompter Doctor");
    println!();

    println!("Checking agent binaries...");
    let agents_dir = config.agents.agents_dir.as_deref();
    for kind in AgentKind::ALL {
        match resolve_agent_binary(kind, agents_dir) {
            Ok(path) => println!("  ✓ {} -> {}", kind, path.display()),
            Err(_) => println!("  ✗ {} binary not found", kind),
        }
    }

    println!();
    println!("Checking backend at {}...", config.backend.base_url);
    match BackendClient::new(&config.backend) {
        Ok(client) => {
            let response = client.ping().await;
            if response.is_ok() {
                println!("  ✓ Backend reachable");
            } else {
                println!("  ✗ Backend not reachable (status {})", response.status);
            }
        }
        Err(e) => println!("  ✗ Failed to build backend client: {}", e),
    }

    println!();
    println!("Checking configuration...");
    match config.validate() {
        Ok(()) => println!("  ✓ Agent channel ports are distinct"),
        Err(e) => println!("  ✗ {}", e),
    }

    println!();
    println!("Doctor check complete!");

    Ok(())
}

fn show_config(config: Option<&PrompterConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    let toml = toml::to_string_pretty(&config)?;
    println!("{}", toml);
    Ok(())
}
