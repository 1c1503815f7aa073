use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "grwm")]
#[command(version, about = "Turn a GitHub profile into a profile README")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit diagnostic logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Path to a config file (defaults to ./grwm.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service (session API plus SSE and WebSocket streams)
    Serve {
        /// Interface to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to serve on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable dev mode (CORS permissive, bind all interfaces)
        #[arg(long)]
        dev: bool,
    },
    /// Generate a README for one user in this terminal
    Run {
        /// GitHub username
        username: String,

        /// Writing tone: professional, genz, minimalist, creative
        #[arg(long)]
        tone: Option<String>,

        /// README style: modern, minimal, detailed, creative (skips the prompt)
        #[arg(long)]
        style: Option<String>,

        /// A sentence about yourself to include in the intro
        #[arg(long)]
        description: Option<String>,

        /// Write the README here instead of printing it
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and exit
    Validate,
    /// Write a default grwm.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    grwm::logging::init(cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Serve { host, port, dev } => {
            let config = load_config(&cli.config)?;
            cmd::cmd_serve(config, host, port, dev).await?;
        }
        Commands::Run {
            username,
            tone,
            style,
            description,
            out,
        } => {
            let config = load_config(&cli.config)?;
            let args = cmd::run::RunArgs {
                username,
                tone,
                style,
                description,
                out,
            };
            cmd::cmd_run(config, args, cli.verbose).await?;
        }
        Commands::Config { command } => cmd::cmd_config(cli.config.as_deref(), command)?,
    }

    Ok(())
}

fn load_config(path: &Option<PathBuf>) -> Result<grwm::config::Config> {
    grwm::config::Config::load(path.as_deref()).context("Failed to load configuration")
}
