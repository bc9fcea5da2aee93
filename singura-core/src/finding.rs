//! Detection outputs — activity patterns, automation signatures, risk
//! indicators, and the fused per-pass result.
//!
//! Every confidence value is clamped to [0, 100] at construction; the engine
//! treats an out-of-range confidence after clamping as an internal invariant
//! violation.

use crate::event::ResourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Clamp a confidence score into the canonical [0, 100] range.
/// NaN collapses to 0 so malformed arithmetic can never leak outward.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 100.0) }
}

/// Statistical finding categories produced by the pattern detectors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Velocity,
    RegularInterval,
    OffHours,
    BatchOperation,
    PermissionChange,
    FileDownload,
    #[serde(untagged)]
    Unknown(String),
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PatternType::Velocity => "velocity",
            PatternType::RegularInterval => "regular_interval",
            PatternType::OffHours => "off_hours",
            PatternType::BatchOperation => "batch_operation",
            PatternType::PermissionChange => "permission_change",
            PatternType::FileDownload => "file_download",
            PatternType::Unknown(s) => s.as_str(),
        };
        f.write_str(s)
    }
}

/// Canonical subject of a pattern: who did what, on which resource class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSubject {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    pub resource_type: ResourceType,
    pub action_type: String,
    /// Timestamp of the most recent supporting event.
    pub timestamp: DateTime<Utc>,
}

/// Supporting evidence attached to every pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternEvidence {
    pub description: String,
    /// Named measurements that drove the detection
    /// (e.g. `coefficient_of_variation`, `off_hours_percentage`).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data_points: HashMap<String, serde_json::Value>,
    /// Event ids that contributed to the finding.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supporting_events: Vec<String>,
}

/// A statistical finding describing anomalous behavior of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPattern {
    pub pattern_id: Uuid,
    pub pattern_type: PatternType,
    pub detected_at: DateTime<Utc>,
    /// Confidence in [0, 100].
    pub confidence: f64,
    pub metadata: PatternSubject,
    pub evidence: PatternEvidence,
}

impl ActivityPattern {
    pub fn new(
        pattern_type: PatternType,
        confidence: f64,
        metadata: PatternSubject,
        evidence: PatternEvidence,
    ) -> Self {
        Self {
            pattern_id: Uuid::new_v4(),
            pattern_type,
            detected_at: Utc::now(),
            confidence: clamp_confidence(confidence),
            metadata,
            evidence,
        }
    }
}

/// AI providers recognized by the signature registry.
///
/// Like `EventType` and `PatternType`, provider names outside the known set
/// are preserved as opaque strings so a signature bearing a future provider
/// re-serializes unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiProvider {
    Openai,
    Anthropic,
    GoogleAi,
    Cohere,
    Huggingface,
    Replicate,
    Mistral,
    TogetherAi,
    #[serde(untagged)]
    Unknown(String),
}

impl std::fmt::Display for AiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AiProvider::Openai => "openai",
            AiProvider::Anthropic => "anthropic",
            AiProvider::GoogleAi => "google_ai",
            AiProvider::Cohere => "cohere",
            AiProvider::Huggingface => "huggingface",
            AiProvider::Replicate => "replicate",
            AiProvider::Mistral => "mistral",
            AiProvider::TogetherAi => "together_ai",
            AiProvider::Unknown(s) => s.as_str(),
        };
        f.write_str(s)
    }
}

/// How a signature was matched. Ordered by evidentiary base weight, so the
/// derived `Ord` breaks ties toward the stronger method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    IpRange,
    WebhookPattern,
    ContentSignature,
    UserAgent,
    OauthScope,
    ApiEndpoint,
}

impl DetectionMethod {
    /// Base score contributed by one hit of this method.
    pub fn base_weight(&self) -> f64 {
        match self {
            DetectionMethod::ApiEndpoint => 40.0,
            DetectionMethod::OauthScope => 40.0,
            DetectionMethod::UserAgent => 30.0,
            DetectionMethod::ContentSignature => 30.0,
            DetectionMethod::WebhookPattern => 25.0,
            DetectionMethod::IpRange => 20.0,
        }
    }
}

/// Severity classification derived from confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Classify a [0, 100] confidence into a risk level.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence < 30.0 {
            RiskLevel::Low
        } else if confidence < 60.0 {
            RiskLevel::Medium
        } else if confidence < 90.0 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    /// Numeric severity used by the engine's risk fusion.
    pub fn severity_score(&self) -> f64 {
        match self {
            RiskLevel::Low => 25.0,
            RiskLevel::Medium => 50.0,
            RiskLevel::High => 75.0,
            RiskLevel::Critical => 100.0,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Raw match evidence carried on a signature.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignatureIndicators {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_endpoints: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_user_agents: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_content_signatures: Vec<String>,
}

/// Occurrence bookkeeping for a signature across an engine invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureMetadata {
    pub first_detected: DateTime<Utc>,
    pub last_detected: DateTime<Utc>,
    pub occurrence_count: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_resources: Vec<String>,
}

/// Evidence that a specific AI provider is being called.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationSignature {
    pub signature_id: Uuid,
    /// Always `ai_integration` for signatures produced by this engine.
    pub signature_type: String,
    pub ai_provider: AiProvider,
    /// The acting user the evidence is attributed to.
    pub user_id: String,
    /// Primary method: the matched method with the highest base weight.
    pub detection_method: DetectionMethod,
    /// Confidence in [0, 100].
    pub confidence: f64,
    pub risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub indicators: SignatureIndicators,
    pub metadata: SignatureMetadata,
}

impl AutomationSignature {
    pub fn new(
        ai_provider: AiProvider,
        user_id: impl Into<String>,
        detection_method: DetectionMethod,
        confidence: f64,
        detected_at: DateTime<Utc>,
    ) -> Self {
        let confidence = clamp_confidence(confidence);
        Self {
            signature_id: Uuid::new_v4(),
            signature_type: "ai_integration".to_string(),
            ai_provider,
            user_id: user_id.into(),
            detection_method,
            confidence,
            risk_level: RiskLevel::from_confidence(confidence),
            model: None,
            indicators: SignatureIndicators::default(),
            metadata: SignatureMetadata {
                first_detected: detected_at,
                last_detected: detected_at,
                occurrence_count: 1,
                affected_resources: Vec::new(),
            },
        }
    }
}

/// Compliance frameworks a finding bears on. PCI is never auto-flagged by
/// the engine; it stays false unless set by a human workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceImpact {
    pub gdpr: bool,
    pub sox: bool,
    pub hipaa: bool,
    pub pci: bool,
}

impl ComplianceImpact {
    /// Derive framework impact from a risk level: GDPR for anything above
    /// low, SOX and HIPAA for high and critical.
    pub fn from_risk_level(level: RiskLevel) -> Self {
        Self {
            gdpr: level > RiskLevel::Low,
            sox: level >= RiskLevel::High,
            hipaa: level >= RiskLevel::High,
            pci: false,
        }
    }
}

/// An actionable risk derived from an automation signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskIndicator {
    pub indicator_id: Uuid,
    /// Risk classification (currently always `external_access` for
    /// AI-integration signatures).
    pub risk_type: String,
    pub severity: RiskLevel,
    pub ai_provider: AiProvider,
    pub user_id: String,
    pub description: String,
    pub mitigation_recommendation: String,
    pub compliance_impact: ComplianceImpact,
}

/// The pair of all patterns and indicators for one engine invocation, plus
/// the fused overall risk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub activity_patterns: Vec<ActivityPattern>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risk_indicators: Vec<RiskIndicator>,
    /// Fused risk in [0, 100]; 0 when both sides are empty.
    pub overall_risk: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(-5.0), 0.0);
        assert_eq!(clamp_confidence(150.0), 100.0);
        assert_eq!(clamp_confidence(72.5), 72.5);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
    }

    #[test]
    fn test_risk_level_bands() {
        assert_eq!(RiskLevel::from_confidence(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_confidence(29.9), RiskLevel::Low);
        assert_eq!(RiskLevel::from_confidence(30.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_confidence(59.9), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_confidence(60.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_confidence(89.9), RiskLevel::High);
        assert_eq!(RiskLevel::from_confidence(90.0), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_confidence(100.0), RiskLevel::Critical);
    }

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn test_detection_method_tie_break_order() {
        // api_endpoint beats oauth_scope at equal base weight.
        assert!(DetectionMethod::ApiEndpoint > DetectionMethod::OauthScope);
        assert!(DetectionMethod::OauthScope > DetectionMethod::UserAgent);
        assert_eq!(
            DetectionMethod::ApiEndpoint.base_weight(),
            DetectionMethod::OauthScope.base_weight()
        );
    }

    #[test]
    fn test_compliance_impact_from_risk() {
        let low = ComplianceImpact::from_risk_level(RiskLevel::Low);
        assert!(!low.gdpr && !low.sox && !low.hipaa && !low.pci);

        let medium = ComplianceImpact::from_risk_level(RiskLevel::Medium);
        assert!(medium.gdpr && !medium.sox);

        let critical = ComplianceImpact::from_risk_level(RiskLevel::Critical);
        assert!(critical.gdpr && critical.sox && critical.hipaa);
        // PCI is never auto-flagged.
        assert!(!critical.pci);
    }

    #[test]
    fn test_signature_confidence_clamped() {
        let sig = AutomationSignature::new(
            AiProvider::Openai,
            "user-1",
            DetectionMethod::ApiEndpoint,
            250.0,
            Utc::now(),
        );
        assert_eq!(sig.confidence, 100.0);
        assert_eq!(sig.risk_level, RiskLevel::Critical);
        assert_eq!(sig.signature_type, "ai_integration");
    }

    #[test]
    fn test_pattern_type_serde_forward_compat() {
        let known: PatternType = serde_json::from_str("\"regular_interval\"").unwrap();
        assert_eq!(known, PatternType::RegularInterval);
        let novel: PatternType = serde_json::from_str("\"sequence_replay\"").unwrap();
        assert_eq!(novel, PatternType::Unknown("sequence_replay".into()));
        assert_eq!(
            serde_json::to_string(&novel).unwrap(),
            "\"sequence_replay\""
        );
    }

    #[test]
    fn test_ai_provider_unknown_preserved() {
        let known: AiProvider = serde_json::from_str("\"together_ai\"").unwrap();
        assert_eq!(known, AiProvider::TogetherAi);

        // A future provider name survives the round trip untouched.
        let novel: AiProvider = serde_json::from_str("\"deepmind\"").unwrap();
        assert_eq!(novel, AiProvider::Unknown("deepmind".into()));
        assert_eq!(serde_json::to_string(&novel).unwrap(), "\"deepmind\"");
    }
}
