pub mod analysis;
pub mod history;

pub use analysis::{AdvancedForensics, AnalysisResult, SourceLink, ThreatLevel, ThreatVector};
pub use history::{HistoryItem, InputType, ScanHistory, MAX_HISTORY_ITEMS};
