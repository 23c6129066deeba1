//! CLI interface for tool-proxy

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::agent::tools::ToolContext;
use crate::config::{Config, DEFAULT_CONFIG_FILE};

#[derive(Parser)]
#[command(name = "tool-proxy")]
#[command(about = "OpenAI-compatible proxy that runs model tool calls against the local machine", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE, env = "TOOL_PROXY_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server (default when no command given)
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// API key sent to the model backend
        #[arg(long, env = "TOOL_PROXY_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// List the tools advertised to the model
    Tools {
        /// Print the OpenAI tool definitions as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the effective configuration
    Config,
    /// Check a path against the security policy
    CheckPath {
        path: String,
    },
    /// Check a shell command against the security policy
    CheckCommand {
        command: String,
    },
}

/// Run CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, found) = Config::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
        api_key: None,
    }) {
        Commands::Serve { host, port, api_key } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(key) = api_key {
                config.model.api_key = key;
            }

            let _guard = crate::logging::init(&config.logging)?;
            if found {
                tracing::info!(path = %cli.config.display(), "Loaded configuration");
            } else {
                tracing::warn!(path = %cli.config.display(), "Config file not found, using defaults");
            }

            crate::server::start(config).await?;
        }
        Commands::Tools { json } => {
            let tools = ToolContext::from_config(&config);
            if json {
                println!("{}", serde_json::to_string_pretty(&tools.tools_json())?);
            } else {
                for tool in tools.catalog() {
                    println!("{:<18} {}", tool.name(), tool.description);
                }
            }
        }
        Commands::Config => {
            if !found {
                eprintln!("{} not found; showing defaults", cli.config.display());
            }
            print!("{}", config.to_display_yaml()?);
        }
        Commands::CheckPath { path } => {
            let verdict = config.security_policy().check_path(&path);
            print_verdict(verdict.allowed, verdict.reason.as_deref());
            if let Some(resolved) = verdict.resolved_path {
                println!("  Resolved: {}", resolved.display());
            }
        }
        Commands::CheckCommand { command } => {
            let verdict = config.security_policy().check_command(&command);
            print_verdict(verdict.allowed, verdict.reason.as_deref());
        }
    }

    Ok(())
}

fn print_verdict(allowed: bool, reason: Option<&str>) {
    match (allowed, reason) {
        (true, _) => println!("allowed"),
        (false, Some(reason)) => println!("denied: {}", reason),
        (false, None) => println!("denied"),
    }
}
