//! Plain-text rendering of verdicts, history and controller status for the
//! console front-end.

use std::fmt::Write;

use crate::models::{AnalysisResult, HistoryItem};
use crate::scanner::{AutoScanStatus, ScanSnapshot, ScanState, ANALYSIS_STEPS};

const BAR_WIDTH: usize = 20;
const SUBJECT_WIDTH: usize = 22;

/// Fixed-width bar for a 0..=100 value.
pub fn bar(value: f64, width: usize) -> String {
    let filled = ((value.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!("{}{}", "#".repeat(filled), ".".repeat(width - filled))
}

fn flag(active: bool) -> &'static str {
    if active {
        "DETECTED"
    } else {
        "Clean"
    }
}

pub fn render_report(result: &AnalysisResult) -> String {
    let mut out = String::new();
    let forensics = &result.advanced_forensics;

    let _ = writeln!(
        out,
        "== Threat Intelligence Result ==\nRisk score: {}% ({} RISK)",
        result.risk_score,
        result.threat_level.as_str()
    );
    let _ = writeln!(out, "  [{}]", bar(f64::from(result.risk_score), BAR_WIDTH));

    if !result.threat_breakdown.is_empty() {
        let _ = writeln!(out, "Threat breakdown:");
        for vector in &result.threat_breakdown {
            let _ = writeln!(
                out,
                "  {:<width$} [{}] {:>3}",
                vector.subject,
                bar(vector.score, BAR_WIDTH),
                vector.score.round().clamp(0.0, 100.0) as u8,
                width = SUBJECT_WIDTH
            );
        }
    }

    let _ = writeln!(out, "Attack vectors:");
    let _ = writeln!(out, "  {:<12} {}", "Quishing", flag(forensics.quishing_detected));
    let _ = writeln!(out, "  {:<12} {}", "AiTM Proxy", flag(forensics.aitm_proxy_suspected));
    let _ = writeln!(out, "  {:<12} {}", "BitB UI", flag(forensics.bitb_fake_ui_detected));
    let obfuscation = forensics
        .obfuscation_technique
        .as_deref()
        .filter(|technique| !technique.trim().is_empty())
        .unwrap_or("None Detected");
    let _ = writeln!(out, "  {:<12} {}", "Obfuscation", obfuscation);

    let _ = writeln!(out, "Summary:\n  {}", result.summary);

    if let Some(sources) = result.sources.as_ref().filter(|sources| !sources.is_empty()) {
        let _ = writeln!(out, "Sources:");
        for (index, source) in sources.iter().enumerate() {
            let _ = writeln!(out, "  {}. {} <{}>", index + 1, source.title, source.uri);
        }
    }

    out
}

pub fn render_history(items: &[HistoryItem]) -> String {
    if items.is_empty() {
        return "History is empty.".to_string();
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            format!(
                "{:>2}. [{:<8}] {} {:<5} {}",
                index + 1,
                item.result.threat_level.as_str(),
                item.timestamp.format("%Y-%m-%d %H:%M"),
                item.input_type.as_str(),
                item.input_snippet.lines().next().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn auto_status_label(status: AutoScanStatus) -> &'static str {
    match status {
        AutoScanStatus::Idle => "idle",
        AutoScanStatus::Typing => "typing",
        AutoScanStatus::Waiting => "waiting",
        AutoScanStatus::Analyzing => "analyzing",
    }
}

/// One-line summary of where the controller is.
pub fn render_status(snapshot: &ScanSnapshot) -> String {
    let phase = match &snapshot.scan {
        ScanState::Idle => "idle".to_string(),
        ScanState::Scanning => format!(
            "scanning: {} ({}/{})",
            snapshot.analysis_step_label,
            snapshot.analysis_step + 1,
            ANALYSIS_STEPS.len()
        ),
        ScanState::Resulted(result) => format!(
            "result: {} risk {}%",
            result.threat_level.as_str(),
            result.risk_score
        ),
        ScanState::Failed(message) => format!("failed: {message}"),
    };

    format!(
        "phase {phase} | auto-scan {} ({}) | progress [{}] {:.0}% | input {:?} {} chars{} | history {}",
        if snapshot.auto_scan_enabled { "on" } else { "off" },
        auto_status_label(snapshot.auto_scan_status),
        bar(snapshot.scan_progress, 10),
        snapshot.scan_progress,
        snapshot.input_mode,
        snapshot.input_text.chars().count(),
        if snapshot.has_image { " + image" } else { "" },
        snapshot.history_len
    )
}
