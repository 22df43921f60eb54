// AutoDash entry point.
//
// Startup sequence (dashboard):
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Open database
// 4. Build the LLM client
// 5. Create mpsc channels and the application state
// 6. Restore the last listing batch
// 7. Spawn app logic task
// 8. Run the TUI until the user quits
// 9. Cleanup on exit
//
// Any arguments select a one-shot subcommand instead (see `cli`).

use std::process::ExitCode;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

use autodash_app::app;
use autodash_core::config::{self, Config};
use autodash_core::db::Database;
use autodash_core::protocol::UiUpdate;
use autodash_llm::LlmClient;
use autodash_tui::cli::{self, Command};
use autodash_tui::{DashboardInfo, ViewState};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let command = match cli::parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {e}\n");
            eprintln!("{}", cli::HELP);
            return Ok(ExitCode::from(2));
        }
    };

    match command {
        Command::Help => {
            println!("{}", cli::HELP);
            Ok(ExitCode::SUCCESS)
        }
        Command::Tui => {
            init_file_tracing()?;
            run_dashboard().await?;
            Ok(ExitCode::SUCCESS)
        }
        command => {
            init_stderr_tracing()?;
            run_subcommand(command).await
        }
    }
}

async fn run_subcommand(command: Command) -> anyhow::Result<ExitCode> {
    let mut stdout = std::io::stdout().lock();

    if let Command::CheckManifest { path } = &command {
        let valid = cli::check_manifest(path, &mut stdout)?;
        return Ok(if valid {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let config = load_config()?;
    match command {
        Command::Generate { count, csv } => {
            let db = open_database(&config)?;
            let mut rng = rand::rng();
            cli::generate(&config, &db, count, csv.as_deref(), &mut rng, &mut stdout)?;
        }
        Command::DecodeVin { vin, year } => {
            let db = open_database(&config)?;
            cli::decode_vin(&config, &db, &vin, year, &mut stdout).await?;
        }
        Command::Review { file } => {
            let client = LlmClient::from_config(&config);
            cli::review(&config, &client, &file, &mut stdout).await?;
        }
        Command::SelfUpdate { target, prompt } => {
            let client = LlmClient::from_config(&config);
            cli::self_update(&config, &client, target, prompt, &mut stdout).await?;
        }
        Command::Tui | Command::Help | Command::CheckManifest { .. } => {}
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_dashboard() -> anyhow::Result<()> {
    info!("AutoDash starting up");

    let config = load_config()?;
    let db = open_database(&config)?;
    info!("Database opened at {}", config.db_path.display());

    let llm_client = LlmClient::from_config(&config);
    match llm_client.model() {
        Some(model) => info!("LLM client initialized (model: {})", model),
        None => info!("LLM client disabled (no API key)"),
    }
    let info = DashboardInfo::from_config(&config, llm_client.model());

    // Channels first so the state can hold its senders.
    let (llm_tx, llm_rx) = mpsc::channel(256);
    let (vin_tx, vin_rx) = mpsc::channel(16);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    let mut app_state = app::AppState::new(config, db, llm_client, llm_tx, vin_tx)?;
    let listing_count = app_state.initial_listing_count();

    match app::restore_from_db(&mut app_state) {
        Ok(true) => {
            let _ = ui_tx
                .send(UiUpdate::ListingsRestored(app_state.listings.clone()))
                .await;
        }
        Ok(false) => {}
        Err(e) => {
            error!("Failed to restore listings: {:#}", e);
            return Err(e.context("failed to restore previous session"));
        }
    }

    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(llm_rx, vin_rx, cmd_rx, ui_tx, app_state).await {
            error!("Application loop error: {}", e);
        }
    });

    info!("Application ready");
    let view_state = ViewState::new(info, listing_count);
    if let Err(e) = autodash_tui::run(ui_rx, cmd_tx, view_state).await {
        error!("TUI error: {}", e);
    }

    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), app_handle).await;

    info!("AutoDash shut down cleanly");
    Ok(())
}

fn load_config() -> anyhow::Result<Config> {
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: {} makes, {}-{} model years",
        config.dashboard.catalog.len(),
        config.dashboard.listings.min_year,
        config.dashboard.listings.max_year
    );
    Ok(config)
}

fn open_database(config: &Config) -> anyhow::Result<Database> {
    Database::open(&config.db_path.to_string_lossy()).context("failed to open database")
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("autodash=info,warn"))
}

/// Log to `logs/autodash.log`; the terminal belongs to the TUI.
fn init_file_tracing() -> anyhow::Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let log_file = std::fs::File::create(log_dir.join("autodash.log"))?;

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter())
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;
    Ok(())
}

/// Subcommands print results on stdout and log to stderr.
fn init_stderr_tracing() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;
    Ok(())
}
