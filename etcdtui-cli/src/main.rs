#![allow(clippy::collapsible_if)]

mod app;
mod backends;
mod events;
mod form;
mod ui;

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use clap::{Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use etcdtui_core::config::{self, Config};
use etcdtui_core::connection::ConnectionManager;
use etcdtui_core::controller::Controller;

use app::{App, Io};

#[derive(Parser)]
#[command(name = "etcdtui")]
#[command(about = "Browse and edit an etcd keyspace as a tree", long_about = None)]
struct Cli {
    /// Profile to connect to on startup
    #[arg(short, long)]
    profile: Option<String>,

    /// Config file (default: ~/.config/etcdtui/config.yaml)
    #[arg(long, env = config::CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Browse a seeded in-memory store instead of a cluster
    #[arg(long)]
    demo: bool,

    /// Write diagnostics to this file
    #[arg(long, env = "ETCDTUI_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Use the high-contrast palette
    #[arg(long)]
    high_contrast: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured profiles and exit
    Profiles,
}

/// Log to a file only; the terminal belongs to the UI.
fn init_logging(path: &Path) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let file = File::create(path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .init();
    Ok(())
}

// --- Terminal setup/teardown ---
fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = Config::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    if config.has_profiles() {
        Ok(config)
    } else {
        tracing::info!("no profiles configured, offering localhost");
        Ok(Config::with_local_profile())
    }
}

fn list_profiles(config: &Config) {
    if !config.has_profiles() {
        println!("No profiles configured.");
        return;
    }
    let default = config.default_profile().ok().map(|p| p.name.clone());
    for profile in &config.profiles {
        let marker = if Some(&profile.name) == default.as_ref() {
            "*"
        } else {
            " "
        };
        println!("{} {}", marker, profile.display_string());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.log_file {
        init_logging(path)?;
    }

    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => config::config_path()?,
    };

    if let Some(Commands::Profiles) = cli.command {
        let config = Config::load(&config_path)?;
        list_profiles(&config);
        return Ok(());
    }

    let config = load_config(&config_path)?;
    // Resolve before touching the terminal so a typo fails cleanly.
    let startup_profile = match &cli.profile {
        Some(name) => Some(config.profile(name)?.clone()),
        None => None,
    };

    ui::theme::init(cli.high_contrast);
    tracing::info!(config = %config_path.display(), demo = cli.demo, "starting etcdtui");

    let (watch_tx, mut watch_rx) = mpsc::unbounded_channel();
    let controller = Controller::new(ConnectionManager::new(), watch_tx);
    let mut app = App::new(controller, config, config_path, cli.demo);

    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let mut io = Io::new(input_rx);

    let mut terminal = setup_terminal()?;
    let reader = events::spawn_reader(input_tx);

    if app.is_demo() {
        let store = backends::demo_store().await;
        app.open(store, backends::DEMO_PROFILE, &mut io).await;
    } else if let Some(profile) = startup_profile {
        app.connect_profile(&profile, &mut io).await;
    }

    let result = app::run(&mut terminal, &mut app, &mut io, &mut watch_rx).await;

    app.controller.disconnect().await;
    restore_terminal(terminal)?;
    // The reader notices the closed channel within one poll interval.
    drop(io);
    if reader.join().is_err() {
        tracing::warn!("input reader panicked");
    }
    result?;
    Ok(())
}
