//! Risk derivation — turns automation signatures into actionable risk
//! indicators and fuses patterns and indicators into one overall score.

use singura_core::finding::{
    ActivityPattern, AiProvider, AutomationSignature, ComplianceImpact, RiskIndicator,
    clamp_confidence,
};
use uuid::Uuid;

/// Mitigation recommendation template, keyed on provider.
fn mitigation_for(provider: &AiProvider) -> String {
    let (name, console) = match provider {
        AiProvider::Openai => ("OpenAI", "platform.openai.com usage dashboard"),
        AiProvider::Anthropic => ("Anthropic", "Anthropic console usage logs"),
        AiProvider::GoogleAi => ("Google AI", "Google Cloud IAM audit logs"),
        AiProvider::Cohere => ("Cohere", "Cohere dashboard"),
        AiProvider::Huggingface => ("Hugging Face", "Hugging Face token settings"),
        AiProvider::Replicate => ("Replicate", "Replicate account settings"),
        AiProvider::Mistral => ("Mistral", "Mistral console"),
        AiProvider::TogetherAi => ("Together AI", "Together AI dashboard"),
        AiProvider::Unknown(_) => ("an unidentified AI provider", "your egress logs"),
    };
    format!(
        "Review the integration with {name}: confirm it is sanctioned, rotate any exposed \
         credentials, scope its access to the minimum required, and cross-check {console} \
         for data sent outside the tenant."
    )
}

/// Derive one risk indicator per signature. AI-integration signatures are
/// external-access risks; compliance impact follows the severity bands.
pub fn indicators_from_signatures(signatures: &[AutomationSignature]) -> Vec<RiskIndicator> {
    signatures
        .iter()
        .map(|signature| RiskIndicator {
            indicator_id: Uuid::new_v4(),
            risk_type: "external_access".to_string(),
            severity: signature.risk_level,
            ai_provider: signature.ai_provider.clone(),
            user_id: signature.user_id.clone(),
            description: format!(
                "{} integration detected for user {} via {} ({} occurrence{})",
                signature.ai_provider,
                signature.user_id,
                match signature.detection_method {
                    singura_core::finding::DetectionMethod::ApiEndpoint => "API endpoint evidence",
                    singura_core::finding::DetectionMethod::OauthScope => "OAuth scope evidence",
                    singura_core::finding::DetectionMethod::UserAgent => "user-agent evidence",
                    singura_core::finding::DetectionMethod::ContentSignature =>
                        "content signature evidence",
                    singura_core::finding::DetectionMethod::WebhookPattern => "webhook evidence",
                    singura_core::finding::DetectionMethod::IpRange => "IP range evidence",
                },
                signature.metadata.occurrence_count,
                if signature.metadata.occurrence_count == 1 { "" } else { "s" },
            ),
            mitigation_recommendation: mitigation_for(&signature.ai_provider),
            compliance_impact: ComplianceImpact::from_risk_level(signature.risk_level),
        })
        .collect()
}

/// Fuse pattern and indicator evidence into the overall risk score:
/// `0.6 x max pattern confidence + 0.4 x max indicator severity`, clamped.
/// Both sides empty means zero risk.
pub fn fuse_overall_risk(patterns: &[ActivityPattern], indicators: &[RiskIndicator]) -> f64 {
    if patterns.is_empty() && indicators.is_empty() {
        return 0.0;
    }
    let max_pattern = patterns
        .iter()
        .map(|p| p.confidence)
        .fold(0.0_f64, f64::max);
    let max_severity = indicators
        .iter()
        .map(|i| i.severity.severity_score())
        .fold(0.0_f64, f64::max);
    clamp_confidence(0.6 * max_pattern + 0.4 * max_severity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use singura_core::event::ResourceType;
    use singura_core::finding::{
        DetectionMethod, PatternEvidence, PatternSubject, PatternType, RiskLevel,
    };
    use std::collections::HashMap;

    fn make_signature(confidence: f64) -> AutomationSignature {
        AutomationSignature::new(
            AiProvider::Openai,
            "user-1",
            DetectionMethod::ApiEndpoint,
            confidence,
            Utc::now(),
        )
    }

    fn make_pattern(confidence: f64) -> ActivityPattern {
        ActivityPattern::new(
            PatternType::Velocity,
            confidence,
            PatternSubject {
                user_id: "user-1".into(),
                user_email: None,
                resource_type: ResourceType::File,
                action_type: "file_create".into(),
                timestamp: Utc::now(),
            },
            PatternEvidence {
                description: "test".into(),
                data_points: HashMap::new(),
                supporting_events: Vec::new(),
            },
        )
    }

    #[test]
    fn test_indicator_derivation() {
        let signatures = vec![make_signature(75.0)];
        let indicators = indicators_from_signatures(&signatures);
        assert_eq!(indicators.len(), 1);
        let indicator = &indicators[0];
        assert_eq!(indicator.risk_type, "external_access");
        assert_eq!(indicator.severity, RiskLevel::High);
        assert!(indicator.compliance_impact.gdpr);
        assert!(indicator.compliance_impact.sox);
        assert!(!indicator.compliance_impact.pci);
        assert!(indicator.mitigation_recommendation.contains("OpenAI"));
    }

    #[test]
    fn test_low_risk_indicator_has_no_framework_impact() {
        let indicators = indicators_from_signatures(&[make_signature(20.0)]);
        assert_eq!(indicators[0].severity, RiskLevel::Low);
        assert!(!indicators[0].compliance_impact.gdpr);
    }

    #[test]
    fn test_fusion_weights() {
        let patterns = vec![make_pattern(80.0), make_pattern(40.0)];
        let indicators = indicators_from_signatures(&[make_signature(95.0)]);
        // 0.6 * 80 + 0.4 * 100 (critical severity) = 88.
        let risk = fuse_overall_risk(&patterns, &indicators);
        assert!((risk - 88.0).abs() < 1e-9);
    }

    #[test]
    fn test_fusion_empty_is_zero() {
        assert_eq!(fuse_overall_risk(&[], &[]), 0.0);
    }

    #[test]
    fn test_fusion_patterns_only() {
        let patterns = vec![make_pattern(50.0)];
        let risk = fuse_overall_risk(&patterns, &[]);
        assert!((risk - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_fusion_stays_in_range() {
        let patterns = vec![make_pattern(100.0)];
        let indicators = indicators_from_signatures(&[make_signature(100.0)]);
        let risk = fuse_overall_risk(&patterns, &indicators);
        assert!((0.0..=100.0).contains(&risk));
    }
}
