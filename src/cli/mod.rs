use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::NoteViewController;
use crate::config::{AppConfig, ClientMode, ConfigLoader};
use crate::session::SessionStore;
use crate::storage::{self, StorageHandle};
use crate::store::{ClientBackend, LocalStore, RemoteStore};
use crate::ui::{NoteRenderer, TimestampStyle};

pub mod commands;

use self::commands::{AuthArgs, DeleteArgs, EditArgs, ListArgs, NewArgs, RenderArgs};

#[derive(Parser, Debug)]
#[command(
    name = "notes",
    version,
    about = "Notes client for local, remote and account-backed note stores"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over NOTES_CLIENT_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over NOTES_CLIENT_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Client flavour for this run: local, remote or accounts
    #[arg(long)]
    pub mode: Option<ClientMode>,

    /// API base URL for this run, e.g. http://localhost:3000/api
    #[arg(long)]
    pub api_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the current feed (default)
    List(ListArgs),
    /// Write the feed as a standalone HTML page
    Render(RenderArgs),
    /// Create a note
    New(NewArgs),
    /// Change an existing note
    Edit(EditArgs),
    /// Delete a note
    Delete(DeleteArgs),
    /// Log in and remember the session
    Login(AuthArgs),
    /// Create an account (log in afterwards)
    Register(AuthArgs),
    /// Forget the stored session
    Logout,
    /// Show who is logged in
    Whoami,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("NOTES_CLIENT_CONFIG", path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var("NOTES_CLIENT_DATA", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let mut config = loader.load_or_init()?;
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
    }
    let storage = storage::init(&paths, &config.storage)?;

    let backend = build_backend(&config, storage.clone())?;
    let style = TimestampStyle::from_options(&config.display)?;
    let mut controller = NoteViewController::init(
        config.mode,
        backend,
        SessionStore::new(storage),
        NoteRenderer::new(style),
    )
    .await;

    let command = cli
        .command
        .unwrap_or(Commands::List(ListArgs::default()));
    commands::execute(&mut controller, command).await
}

/// Local notes stay in the client database; the other modes talk to the API.
pub fn build_backend(config: &AppConfig, storage: StorageHandle) -> Result<ClientBackend> {
    let mode = config.mode;
    if !mode.is_remote() {
        return Ok(ClientBackend::Local(LocalStore::new(storage)));
    }
    let remote = RemoteStore::new(&config.api, mode.uses_accounts())
        .context("configuring the API client")?;
    tracing::debug!(base_url = %remote.base_url(), %mode, "using remote backend");
    Ok(ClientBackend::Remote(remote))
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
