pub mod gemini;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::AnalysisResult;

pub use gemini::GeminiClient;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub content: String,
    /// Attached image as a `data:<mime>;base64,<payload>` URL.
    pub image: Option<String>,
}

/// Remote classifier that turns submitted content into a threat verdict.
///
/// Any `Err` is treated as a failed scan by the controller; the error's
/// display text is what the user sees.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult>;
}
