use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::report;

use super::{ScanController, SubmitOutcome};

pub const HELP: &str = "\
Commands:
  :scan                 scan the current input
  :auto on|off          toggle debounced auto-scan
  :image <path>         attach an image file
  :image clear          remove the attached image
  :clear                reset input and result
  :history              list past scans
  :restore <n|id>       show a past result
  :status               show scanner status
  :help                 show this help
  :quit                 exit
Any other line replaces the text to analyze.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Scan,
    AutoScan(bool),
    AttachImage(PathBuf),
    ClearImage,
    Clear,
    History,
    Restore(String),
    Status,
    Help,
    Quit,
    Input(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(command) = line.strip_prefix(':') else {
            return Ok(ConsoleCommand::Input(line.to_string()));
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };

        match (name, arg) {
            ("scan", "") => Ok(ConsoleCommand::Scan),
            ("auto", "on") => Ok(ConsoleCommand::AutoScan(true)),
            ("auto", "off") => Ok(ConsoleCommand::AutoScan(false)),
            ("auto", _) => Err("Usage: :auto on|off".into()),
            ("image", "") => Err("Usage: :image <path>|clear".into()),
            ("image", "clear") => Ok(ConsoleCommand::ClearImage),
            ("image", path) => Ok(ConsoleCommand::AttachImage(PathBuf::from(path))),
            ("clear", "") => Ok(ConsoleCommand::Clear),
            ("history", "") => Ok(ConsoleCommand::History),
            ("restore", "") => Err("Usage: :restore <n|id>".into()),
            ("restore", target) => Ok(ConsoleCommand::Restore(target.to_string())),
            ("status", "") => Ok(ConsoleCommand::Status),
            ("help", "") => Ok(ConsoleCommand::Help),
            ("quit" | "exit", "") => Ok(ConsoleCommand::Quit),
            _ => Err(format!("Unknown command :{command}. Type :help for a list.")),
        }
    }
}

/// What the console should do after a command ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Silent,
    Print(String),
    Quit,
}

fn mime_for(path: &Path) -> anyhow::Result<&'static str> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    Ok(match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        other => bail!("Unsupported image type {other:?} for {}", path.display()),
    })
}

/// Reads an image file into a `data:<mime>;base64,...` URL.
pub async fn load_image_data_url(path: &Path) -> anyhow::Result<String> {
    let mime = mime_for(path)?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    if bytes.is_empty() {
        bail!("Image {} is empty", path.display());
    }
    Ok(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
}

async fn restore(controller: &ScanController, target: &str) -> Result<Reply, String> {
    if let Ok(position) = target.parse::<usize>() {
        let history = controller.history().await;
        let item = position
            .checked_sub(1)
            .and_then(|index| history.get(index))
            .ok_or_else(|| format!("No history entry #{position} ({} stored)", history.len()))?;
        controller.restore_from_history(item).await;
        return Ok(Reply::Silent);
    }

    controller
        .restore_by_id(target)
        .await
        .map(|_| Reply::Silent)
        .ok_or_else(|| format!("No history entry with id {target}"))
}

pub async fn dispatch(controller: &ScanController, command: ConsoleCommand) -> Result<Reply, String> {
    match command {
        ConsoleCommand::Input(text) => {
            controller.set_input(text).await;
            Ok(Reply::Silent)
        }
        ConsoleCommand::Scan => match controller.submit_current().await {
            SubmitOutcome::IgnoredEmpty => Err("Nothing to scan: enter text or attach an image.".into()),
            SubmitOutcome::AlreadyScanning => Err("A scan is already running.".into()),
            SubmitOutcome::Resulted | SubmitOutcome::Failed => Ok(Reply::Silent),
        },
        ConsoleCommand::AutoScan(enabled) => {
            controller.set_auto_scan_enabled(enabled).await;
            Ok(Reply::Print(format!(
                "Auto-scan {}",
                if enabled { "enabled" } else { "disabled" }
            )))
        }
        ConsoleCommand::AttachImage(path) => {
            let data_url = load_image_data_url(&path)
                .await
                .map_err(|e| format!("{e:#}"))?;
            controller.set_image(Some(data_url)).await;
            Ok(Reply::Print(format!("Attached {}", path.display())))
        }
        ConsoleCommand::ClearImage => {
            controller.set_image(None).await;
            Ok(Reply::Print("Image removed".into()))
        }
        ConsoleCommand::Clear => {
            controller.clear().await;
            Ok(Reply::Silent)
        }
        ConsoleCommand::History => Ok(Reply::Print(report::render_history(
            &controller.history().await,
        ))),
        ConsoleCommand::Restore(target) => restore(controller, &target).await,
        ConsoleCommand::Status => Ok(Reply::Print(report::render_status(
            &controller.snapshot().await,
        ))),
        ConsoleCommand::Help => Ok(Reply::Print(HELP.to_string())),
        ConsoleCommand::Quit => Ok(Reply::Quit),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;

    use super::*;
    use crate::{
        analysis::{AnalysisRequest, AnalysisService},
        db::MemoryStore,
        models::{AdvancedForensics, AnalysisResult, ThreatLevel},
        scanner::ScanState,
        settings::ScannerTimings,
    };

    struct FixedService;

    #[async_trait]
    impl AnalysisService for FixedService {
        async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult> {
            Ok(AnalysisResult {
                risk_score: request.content.len().min(100) as u8,
                threat_level: ThreatLevel::Low,
                threat_breakdown: Vec::new(),
                advanced_forensics: AdvancedForensics::default(),
                summary: request.content,
                sources: None,
            })
        }
    }

    async fn controller() -> ScanController {
        ScanController::load(
            Arc::new(FixedService),
            Arc::new(MemoryStore::new()),
            ScannerTimings::default(),
        )
        .await
    }

    #[test]
    fn parses_commands_and_plain_input() {
        assert_eq!(ConsoleCommand::parse(":scan"), Ok(ConsoleCommand::Scan));
        assert_eq!(ConsoleCommand::parse(":auto on"), Ok(ConsoleCommand::AutoScan(true)));
        assert_eq!(ConsoleCommand::parse(":auto  off\n"), Ok(ConsoleCommand::AutoScan(false)));
        assert_eq!(
            ConsoleCommand::parse(":image /tmp/qr code.png"),
            Ok(ConsoleCommand::AttachImage(PathBuf::from("/tmp/qr code.png")))
        );
        assert_eq!(ConsoleCommand::parse(":image clear"), Ok(ConsoleCommand::ClearImage));
        assert_eq!(
            ConsoleCommand::parse(":restore 3"),
            Ok(ConsoleCommand::Restore("3".into()))
        );
        assert_eq!(
            ConsoleCommand::parse("http://login.example.com"),
            Ok(ConsoleCommand::Input("http://login.example.com".into()))
        );
        assert_eq!(ConsoleCommand::parse(""), Ok(ConsoleCommand::Input(String::new())));
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(ConsoleCommand::parse(":auto maybe").is_err());
        assert!(ConsoleCommand::parse(":image").is_err());
        assert!(ConsoleCommand::parse(":restore").is_err());
        assert!(ConsoleCommand::parse(":scan now").is_err());
        assert!(ConsoleCommand::parse(":frobnicate").is_err());
    }

    #[tokio::test]
    async fn image_files_become_data_urls() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("Badge.PNG");
        std::fs::write(&path, b"hello")?;
        assert_eq!(
            load_image_data_url(&path).await?,
            "data:image/png;base64,aGVsbG8="
        );

        let text = dir.path().join("notes.txt");
        std::fs::write(&text, b"hello")?;
        assert!(load_image_data_url(&text).await.is_err());
        assert!(load_image_data_url(&dir.path().join("missing.jpg")).await.is_err());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn scan_and_restore_by_position() {
        let ctl = controller().await;

        assert!(dispatch(&ctl, ConsoleCommand::Scan).await.is_err());

        dispatch(&ctl, ConsoleCommand::Input("first".into())).await.unwrap();
        assert_eq!(dispatch(&ctl, ConsoleCommand::Scan).await, Ok(Reply::Silent));
        dispatch(&ctl, ConsoleCommand::Input("second one".into())).await.unwrap();
        dispatch(&ctl, ConsoleCommand::Scan).await.unwrap();

        dispatch(&ctl, ConsoleCommand::Restore("2".into())).await.unwrap();
        match ctl.snapshot().await.scan {
            ScanState::Resulted(result) => assert_eq!(result.summary, "first"),
            other => panic!("unexpected state {other:?}"),
        }

        assert!(dispatch(&ctl, ConsoleCommand::Restore("9".into())).await.is_err());
        assert!(dispatch(&ctl, ConsoleCommand::Restore("0".into())).await.is_err());
        assert!(dispatch(&ctl, ConsoleCommand::Restore("nope".into())).await.is_err());

        match dispatch(&ctl, ConsoleCommand::History).await {
            Ok(Reply::Print(listing)) => assert_eq!(listing.lines().count(), 2),
            other => panic!("unexpected reply {other:?}"),
        }
        assert_eq!(dispatch(&ctl, ConsoleCommand::Quit).await, Ok(Reply::Quit));
    }
}
