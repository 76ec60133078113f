use anyhow::{bail, Context, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing::{error, info};

use interviewer::config::{Config, ConfigStore};
use interviewer::constants::{self, DEFAULT_PORT};
use interviewer::gateway::OpenAiGateway;
use interviewer::history::HistoryStore;
use interviewer::session::SessionController;
use interviewer::{chat, web_server};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path of the JSON config file [default: config.json]
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding saved sessions [default: history]
    #[arg(long, global = true)]
    history_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the interview web UI.
    Serve {
        #[arg(long, env = "INTERVIEWER_HOST", default_value = "127.0.0.1", help = "Address to bind.")]
        host: IpAddr,
        #[arg(long, env = "INTERVIEWER_PORT", default_value_t = DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
    },
    /// Run an interview in the terminal.
    Chat {
        #[arg(long, help = "Continue a saved session (file name from `history list`).")]
        resume: Option<String>,
    },
    /// Show or change the API settings.
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
    /// Inspect saved sessions.
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },
    /// Print an evaluation report for a saved session.
    Summarize {
        #[arg(value_parser = clap::value_parser!(String))]
        file: String,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigCommands {
    /// Print the current settings (API key masked).
    Show,
    /// Update one or more settings and save them.
    Set {
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
}

#[derive(clap::Subcommand, Debug)]
enum HistoryCommands {
    /// List saved sessions, newest first.
    List,
    /// Print a saved session's transcript as JSON.
    Show { file: String },
    /// Delete a saved session.
    Delete { file: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (RUST_LOG, INTERVIEWER_* overrides)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g. RUST_LOG=info,interviewer=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("Interviewer starting with command: {:?}", cli.command);

    let config_store = ConfigStore::new(cli.config.unwrap_or_else(|| PathBuf::from(&*constants::CONFIG_FILE)));
    let history = HistoryStore::new(cli.history_dir.unwrap_or_else(|| PathBuf::from(&*constants::HISTORY_DIR)));

    match cli.command {
        Commands::Serve { host, port } => {
            let state = web_server::AppState::new(
                config_store,
                history,
                &constants::TEMPLATES_DIR,
                web_server::openai_gateway_factory(),
            )?;
            let addr = SocketAddr::new(host, port);
            let static_dir = constants::STATIC_DIR.clone();
            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(addr, state, &static_dir).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, shutting down...");
                    web_server_handle.abort();
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(_) => info!("Web server task completed."),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }
            info!("Shutdown complete.");
        }
        Commands::Chat { resume } => {
            let config = config_store.load().context("Failed to load config")?;
            chat::run_terminal_chat(&config, history, resume)
                .await
                .context("Chat session failed")?;
        }
        Commands::Config { action } => match action {
            ConfigCommands::Show => {
                let config = config_store.load().context("Failed to load config")?;
                println!("{}", serde_json::to_string_pretty(&config.masked())?);
            }
            ConfigCommands::Set { api_key, base_url, model } => {
                let mut config = config_store.load().context("Failed to load config")?;
                apply_config_update(&mut config, api_key, base_url, model);
                config_store.save(&config).context("Failed to save config")?;
                println!("Saved {}", config_store.path().display());
            }
        },
        Commands::History { action } => match action {
            HistoryCommands::List => {
                for entry in history.summaries()? {
                    println!("{}  {}", entry.file, entry.title);
                }
            }
            HistoryCommands::Show { file } => match history.load(&file)? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => bail!("No such session: {}", file),
            },
            HistoryCommands::Delete { file } => {
                history.delete(&file)?;
                println!("Deleted {}", file);
            }
        },
        Commands::Summarize { file } => {
            let config = config_store.load().context("Failed to load config")?;
            if !config.has_api_key() {
                bail!(interviewer::prompts::API_KEY_MISSING_MESSAGE);
            }
            let gateway = OpenAiGateway::new(&config).context("Failed to create API client")?;
            let mut session = SessionController::new(history);
            if !session.open(&file)? {
                bail!("No such session: {}", file);
            }
            println!("{}", session.summarize(&gateway).await);
        }
    }

    Ok(())
}

fn apply_config_update(config: &mut Config, api_key: Option<String>, base_url: Option<String>, model: Option<String>) {
    if let Some(api_key) = api_key {
        config.api_key = api_key;
    }
    if let Some(base_url) = base_url {
        config.base_url = base_url;
    }
    if let Some(model) = model {
        config.model = model;
    }
}
