pub mod analysis;
pub mod db;
pub mod models;
pub mod report;
pub mod scanner;
pub mod settings;
mod utils;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
    task::JoinHandle,
};

use analysis::GeminiClient;
use db::{Database, KeyValueStore, MemoryStore};
use scanner::{
    commands::{self, ConsoleCommand, Reply},
    AutoScanStatus, ScanController, ScanEvent, ScanState,
};
use settings::SettingsStore;

const ENABLE_LOGS: bool = true;

const DB_FILE: &str = "phishguard.sqlite3";
const SETTINGS_FILE: &str = "settings.json";

fn init_logging() {
    let default_level = match std::env::var("PHISHGUARD_DEBUG").as_deref() {
        Ok("1") | Ok("true") => "debug",
        _ => "info",
    };
    // RUST_LOG still wins when set.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .try_init();
}

fn data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("PHISHGUARD_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|dir| dir.join("phishguard"))
        .ok_or_else(|| anyhow!("Could not determine a data directory; set PHISHGUARD_DATA_DIR"))
}

fn open_store(dir: &Path) -> Arc<dyn KeyValueStore> {
    match Database::new(dir.join(DB_FILE)) {
        Ok(database) => {
            log_info!("Scan history stored in {}", database.path().display());
            Arc::new(database)
        }
        Err(err) => {
            log_warn!("Falling back to in-memory storage; history will not be kept: {err:#}");
            Arc::new(MemoryStore::new())
        }
    }
}

/// Prints state transitions, analysis steps and finished reports.
fn spawn_event_printer(controller: &ScanController) -> JoinHandle<()> {
    let mut events = controller.subscribe();

    tokio::spawn(async move {
        let mut last_scan = ScanState::Idle;
        let mut last_auto = AutoScanStatus::Idle;
        let mut last_step = None;

        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    log_warn!("Console fell behind; skipped {skipped} scanner events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match event {
                ScanEvent::StateChanged(snapshot) => {
                    if snapshot.auto_scan_enabled && snapshot.auto_scan_status != last_auto {
                        match snapshot.auto_scan_status {
                            AutoScanStatus::Waiting => println!("[auto] Input settled, scanning shortly..."),
                            AutoScanStatus::Typing if last_auto == AutoScanStatus::Idle => {
                                println!("[auto] Watching input")
                            }
                            _ => {}
                        }
                    }
                    last_auto = snapshot.auto_scan_status;

                    if snapshot.scan != last_scan {
                        match &snapshot.scan {
                            ScanState::Scanning => {
                                last_step = None;
                                println!("Analysis pipeline active");
                            }
                            ScanState::Resulted(result) => println!("{}", report::render_report(result)),
                            ScanState::Failed(message) => println!("Scan failed: {message}"),
                            ScanState::Idle => {}
                        }
                        last_scan = snapshot.scan;
                    }
                }
                ScanEvent::Progress { analysis_step, .. } => {
                    if last_scan.is_scanning() && last_step != Some(analysis_step) {
                        last_step = Some(analysis_step);
                        let label = scanner::ANALYSIS_STEPS
                            .get(analysis_step)
                            .copied()
                            .unwrap_or_default();
                        println!("  > {label}");
                    }
                }
                ScanEvent::HistoryChanged { .. } => {}
            }
        }
    })
}

/// Starts the console scanner: settings, storage, analysis client, then a
/// line loop over stdin until `:quit` or EOF.
pub async fn run() -> Result<()> {
    init_logging();
    log_info!("PhishGuard starting up...");

    let data_dir = data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE))?;
    let analysis_settings = settings.analysis();
    if analysis_settings.api_key.is_none() {
        log_warn!("No API key found in GEMINI_API_KEY or API_KEY; scans will fail");
    }

    let store = open_store(&data_dir);
    let service = Arc::new(GeminiClient::new(&analysis_settings)?);
    let controller = ScanController::load(service, store, settings.scanner_timings()).await;
    let printer = spawn_event_printer(&controller);

    println!("{}", commands::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let command = match ConsoleCommand::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        match commands::dispatch(&controller, command).await {
            Ok(Reply::Silent) => {}
            Ok(Reply::Print(text)) => println!("{text}"),
            Ok(Reply::Quit) => break,
            Err(message) => println!("{message}"),
        }
    }

    controller.clear().await;
    printer.abort();
    log_info!("PhishGuard shutting down");
    Ok(())
}
