use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Low => "LOW",
            ThreatLevel::Medium => "MEDIUM",
            ThreatLevel::High => "HIGH",
            ThreatLevel::Critical => "CRITICAL",
        }
    }
}

/// One axis of the threat breakdown (e.g. "Urgency", "Spoofing").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreatVector {
    pub subject: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedForensics {
    #[serde(default)]
    pub quishing_detected: bool,
    #[serde(default)]
    pub aitm_proxy_suspected: bool,
    #[serde(default, rename = "bitbFakeUIDetected")]
    pub bitb_fake_ui_detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfuscation_technique: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceLink {
    pub uri: String,
    pub title: String,
}

/// Verdict returned by the analysis service. Every field is produced remotely;
/// the only local adjustment is clamping `risk_score` into 0..=100.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(deserialize_with = "deserialize_risk_score")]
    pub risk_score: u8,
    pub threat_level: ThreatLevel,
    #[serde(default)]
    pub threat_breakdown: Vec<ThreatVector>,
    #[serde(default)]
    pub advanced_forensics: AdvancedForensics,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceLink>>,
}

fn deserialize_risk_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if raw.is_nan() {
        return Err(serde::de::Error::custom("riskScore is not a number"));
    }
    Ok(raw.round().clamp(0.0, 100.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_service_payload() {
        let payload = r#"{
            "riskScore": 87,
            "threatLevel": "HIGH",
            "threatBreakdown": [
                {"subject": "Urgency", "score": 90},
                {"subject": "Spoofing", "score": 72.5}
            ],
            "advancedForensics": {
                "quishingDetected": false,
                "aitmProxySuspected": true,
                "bitbFakeUIDetected": false,
                "obfuscationTechnique": "Punycode homoglyphs"
            },
            "summary": "Credential harvesting lure."
        }"#;

        let result: AnalysisResult = serde_json::from_str(payload).unwrap();
        assert_eq!(result.risk_score, 87);
        assert_eq!(result.threat_level, ThreatLevel::High);
        assert_eq!(result.threat_breakdown.len(), 2);
        assert_eq!(result.threat_breakdown[1].score, 72.5);
        assert!(result.advanced_forensics.aitm_proxy_suspected);
        assert_eq!(
            result.advanced_forensics.obfuscation_technique.as_deref(),
            Some("Punycode homoglyphs")
        );
        assert!(result.sources.is_none());
    }

    #[test]
    fn clamps_out_of_range_scores() {
        let over: AnalysisResult =
            serde_json::from_str(r#"{"riskScore": 140, "threatLevel": "CRITICAL"}"#).unwrap();
        assert_eq!(over.risk_score, 100);

        let under: AnalysisResult =
            serde_json::from_str(r#"{"riskScore": -3.2, "threatLevel": "LOW"}"#).unwrap();
        assert_eq!(under.risk_score, 0);
    }

    #[test]
    fn rejects_unknown_threat_level() {
        let parsed =
            serde_json::from_str::<AnalysisResult>(r#"{"riskScore": 10, "threatLevel": "SEVERE"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn serializes_with_wire_names() {
        let result = AnalysisResult {
            risk_score: 12,
            threat_level: ThreatLevel::Low,
            threat_breakdown: vec![],
            advanced_forensics: AdvancedForensics {
                bitb_fake_ui_detected: true,
                ..Default::default()
            },
            summary: "Benign newsletter.".into(),
            sources: None,
        };

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["threatLevel"], "LOW");
        assert_eq!(value["advancedForensics"]["bitbFakeUIDetected"], true);
        assert!(value.get("sources").is_none());
    }
}
