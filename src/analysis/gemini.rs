use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::models::{AnalysisResult, SourceLink};
use crate::settings::AnalysisSettings;

use super::{AnalysisRequest, AnalysisService};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

const CONNECT_TIMEOUT_SECS: u64 = 10;

const ANALYST_PROMPT: &str = "You are a tier-1 phishing forensics analyst. \
Inspect the submitted content (URL, email headers, message body or page source, \
and any attached screenshot) for phishing, quishing (QR-code phishing), \
adversary-in-the-middle reverse proxies, browser-in-the-browser fake login windows \
and obfuscation. Use web search to check the reputation of any domains involved. \
Respond with ONLY a JSON object of the form: \
{\"riskScore\": <integer 0-100>, \
\"threatLevel\": \"LOW\"|\"MEDIUM\"|\"HIGH\"|\"CRITICAL\", \
\"threatBreakdown\": [{\"subject\": <vector name>, \"score\": <0-100>}], \
\"advancedForensics\": {\"quishingDetected\": <bool>, \"aitmProxySuspected\": <bool>, \
\"bitbFakeUIDetected\": <bool>, \"obfuscationTechnique\": <string or null>}, \
\"summary\": <short forensic summary>}. \
Score these vectors in threatBreakdown: Urgency, Spoofing, Credential Harvesting, \
Malicious Links, Social Engineering, Technical Obfuscation.";

/// `generateContent` client for the Gemini API.
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(settings: &AnalysisSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl AnalysisService for GeminiClient {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("No API key configured. Set GEMINI_API_KEY and try again."))?;

        let body = build_request_body(&request)?;
        log_debug!(
            "POST {} ({} chars, image: {})",
            self.url(),
            request.content.chars().count(),
            request.image.is_some()
        );

        let response = self
            .http
            .post(self.url())
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .context("Analysis service unreachable")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body);
            log_warn!("Gemini returned {status}: {message}");
            bail!("Analysis service error ({status}): {message}");
        }

        let payload: Value = response
            .json()
            .await
            .context("Analysis service returned an unreadable response")?;

        parse_generate_response(payload)
    }
}

const ERROR_BODY_CHARS: usize = 200;

/// Human-readable detail for a failed call: the API's `error.message` when the
/// body is Gemini JSON, otherwise the start of the raw body.
fn error_message(body: &str) -> String {
    if let Some(message) = serde_json::from_str::<Value>(body)
        .ok()
        .as_ref()
        .and_then(|payload| payload.pointer("/error/message"))
        .and_then(Value::as_str)
    {
        return message.to_string();
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no error details".to_string()
    } else {
        trimmed.chars().take(ERROR_BODY_CHARS).collect()
    }
}

pub fn build_request_body(request: &AnalysisRequest) -> Result<Value> {
    let mut parts = vec![json!({
        "text": format!("{ANALYST_PROMPT}\n\nCONTENT TO ANALYZE:\n{}", request.content)
    })];

    if let Some(image) = &request.image {
        let (mime_type, data) = split_data_url(image)?;
        parts.push(json!({
            "inline_data": { "mime_type": mime_type, "data": data }
        }));
    }

    Ok(json!({
        "contents": [{ "role": "user", "parts": parts }],
        "tools": [{ "google_search": {} }],
        "generationConfig": { "temperature": 0.2 }
    }))
}

/// Splits `data:<mime>;base64,<payload>` into mime type and payload.
pub fn split_data_url(url: &str) -> Result<(&str, &str)> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| anyhow!("image is not a data URL"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| anyhow!("image data URL has no payload"))?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| anyhow!("image data URL is not base64 encoded"))?;

    if mime_type.is_empty() {
        bail!("image data URL has no mime type");
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .context("image data URL payload is not valid base64")?;

    Ok((mime_type, payload))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

pub fn parse_generate_response(payload: Value) -> Result<AnalysisResult> {
    let response: GenerateResponse =
        serde_json::from_value(payload).context("Unexpected analysis response shape")?;
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Analysis service returned no verdict"))?;

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let json_text =
        extract_json_object(&text).ok_or_else(|| anyhow!("Analysis verdict was not JSON"))?;
    let mut result: AnalysisResult =
        serde_json::from_str(json_text).context("Analysis verdict was malformed")?;

    if result.sources.is_none() {
        let sources: Vec<SourceLink> = candidate
            .grounding_metadata
            .map(|meta| meta.grounding_chunks)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|chunk| chunk.web)
            .filter_map(|web| {
                let uri = web.uri?;
                let title = web.title.unwrap_or_else(|| uri.clone());
                Some(SourceLink { uri, title })
            })
            .collect();
        if !sources.is_empty() {
            result.sources = Some(sources);
        }
    }

    Ok(result)
}

/// Returns the outermost `{...}` span, which also strips markdown fences.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
