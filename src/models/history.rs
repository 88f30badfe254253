use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AnalysisResult;

pub const MAX_HISTORY_ITEMS: usize = 20;
pub const SNIPPET_CHARS: usize = 100;
pub const IMAGE_ONLY_SNIPPET: &str = "Image Analysis";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum InputType {
    Text,
    Image,
    Both,
}

impl InputType {
    pub fn from_inputs(text: &str, has_image: bool) -> Self {
        match (text.trim().is_empty(), has_image) {
            (false, true) => InputType::Both,
            (true, true) => InputType::Image,
            _ => InputType::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Text => "text",
            InputType::Image => "image",
            InputType::Both => "both",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub input_snippet: String,
    pub input_type: InputType,
    pub result: AnalysisResult,
}

impl HistoryItem {
    pub fn record(text: &str, has_image: bool, result: AnalysisResult) -> Self {
        let input_snippet = if text.trim().is_empty() {
            IMAGE_ONLY_SNIPPET.to_string()
        } else {
            text.chars().take(SNIPPET_CHARS).collect()
        };

        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            input_snippet,
            input_type: InputType::from_inputs(text, has_image),
            result,
        }
    }
}

/// Newest-first scan history, never longer than [`MAX_HISTORY_ITEMS`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ScanHistory {
    items: VecDeque<HistoryItem>,
}

impl ScanHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a history from persisted items, enforcing the cap.
    pub fn from_items(items: Vec<HistoryItem>) -> Self {
        let mut items: VecDeque<HistoryItem> = items.into();
        items.truncate(MAX_HISTORY_ITEMS);
        Self { items }
    }

    pub fn push(&mut self, item: HistoryItem) {
        self.items.push_front(item);
        self.items.truncate(MAX_HISTORY_ITEMS);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&HistoryItem> {
        self.items.get(index)
    }

    pub fn find(&self, id: &str) -> Option<&HistoryItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryItem> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<HistoryItem> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdvancedForensics, ThreatLevel};

    fn verdict(score: u8) -> AnalysisResult {
        AnalysisResult {
            risk_score: score,
            threat_level: ThreatLevel::Medium,
            threat_breakdown: vec![],
            advanced_forensics: AdvancedForensics::default(),
            summary: String::new(),
            sources: None,
        }
    }

    #[test]
    fn snippet_is_first_hundred_chars() {
        let text = "é".repeat(150);
        let item = HistoryItem::record(&text, false, verdict(10));
        assert_eq!(item.input_snippet.chars().count(), SNIPPET_CHARS);
        assert_eq!(item.input_type, InputType::Text);
    }

    #[test]
    fn image_only_uses_placeholder() {
        let item = HistoryItem::record("   ", true, verdict(10));
        assert_eq!(item.input_snippet, IMAGE_ONLY_SNIPPET);
        assert_eq!(item.input_type, InputType::Image);

        let both = HistoryItem::record("scan this", true, verdict(10));
        assert_eq!(both.input_type, InputType::Both);
    }

    #[test]
    fn history_is_newest_first_and_capped() {
        let mut history = ScanHistory::new();
        for score in 0..25u8 {
            history.push(HistoryItem::record(&format!("input {score}"), false, verdict(score)));
        }

        assert_eq!(history.len(), MAX_HISTORY_ITEMS);
        assert_eq!(history.get(0).unwrap().input_snippet, "input 24");
        assert_eq!(history.get(19).unwrap().input_snippet, "input 5");
    }

    #[test]
    fn persisted_items_are_truncated_on_load() {
        let items = (0..30u8)
            .map(|score| HistoryItem::record("x", false, verdict(score)))
            .collect();
        let history = ScanHistory::from_items(items);
        assert_eq!(history.len(), MAX_HISTORY_ITEMS);
        assert_eq!(history.get(0).unwrap().result.risk_score, 0);
    }

    #[test]
    fn serializes_as_plain_array() {
        let mut history = ScanHistory::new();
        history.push(HistoryItem::record("hello", false, verdict(3)));
        let json = serde_json::to_value(&history).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["inputType"], "text");

        let back: ScanHistory = serde_json::from_value(json).unwrap();
        assert_eq!(back, history);
    }
}
