//! AI-provider signature matching — the registry of known provider
//! fingerprints and the multi-method scorer that turns event evidence into
//! `AutomationSignature`s.
//!
//! The registry is table-driven: one row per provider holding endpoint and
//! user-agent substrings, exact OAuth scopes, CIDR ranges, webhook path
//! fragments, and compiled content regexes. Content matching runs on
//! attacker-influenceable strings, so inputs are capped before any regex
//! executes and every pattern compiles on the linear-time engine.

use regex::Regex;
use singura_core::event::Event;
use singura_core::finding::{
    AiProvider, AutomationSignature, DetectionMethod, SignatureIndicators, clamp_confidence,
};
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// An IPv4 CIDR block. The pack keeps IP matching dependency-free.
#[derive(Debug, Clone, Copy)]
struct Ipv4Cidr {
    network: u32,
    mask: u32,
}

impl Ipv4Cidr {
    fn parse(spec: &str) -> Option<Self> {
        let (addr, len) = spec.split_once('/')?;
        let addr: Ipv4Addr = addr.parse().ok()?;
        let len: u32 = len.parse().ok()?;
        if len > 32 {
            return None;
        }
        let mask = if len == 0 { 0 } else { u32::MAX << (32 - len) };
        Some(Self {
            network: u32::from(addr) & mask,
            mask,
        })
    }

    fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & self.mask == self.network
    }
}

/// One registry row: everything known to fingerprint a provider.
struct ProviderSignature {
    provider: AiProvider,
    endpoint_substrings: Vec<&'static str>,
    user_agent_substrings: Vec<&'static str>,
    oauth_scope_exacts: Vec<&'static str>,
    webhook_substrings: Vec<&'static str>,
    ip_ranges: Vec<Ipv4Cidr>,
    content_patterns: Vec<Regex>,
}

/// Evidence projected out of one event for matching.
#[derive(Debug, Default)]
pub struct DetectionInput<'a> {
    pub api_endpoint: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub scopes: Vec<&'a str>,
    pub ip: Option<&'a str>,
    pub webhook_url: Option<&'a str>,
    pub content: String,
}

impl<'a> DetectionInput<'a> {
    /// Project an event, serializing its action details as the content
    /// haystack and truncating to the cap on a char boundary.
    pub fn from_event(event: &'a Event, max_content_bytes: usize) -> Self {
        let details = &event.action_details;
        let mut content = serde_json::to_string(details).unwrap_or_default();
        if content.len() > max_content_bytes {
            let mut end = max_content_bytes;
            while !content.is_char_boundary(end) {
                end -= 1;
            }
            content.truncate(end);
        }

        let scopes = details
            .additional_metadata
            .get("oauth_scopes")
            .map(|value| match value {
                serde_json::Value::Array(items) => {
                    items.iter().filter_map(|v| v.as_str()).collect()
                }
                serde_json::Value::String(s) => vec![s.as_str()],
                _ => Vec::new(),
            })
            .unwrap_or_default();

        Self {
            api_endpoint: details
                .meta_str("api_endpoint")
                .or_else(|| details.meta_str("endpoint"))
                .or_else(|| details.meta_str("url")),
            user_agent: event
                .user_agent
                .as_deref()
                .or_else(|| details.meta_str("user_agent")),
            scopes,
            ip: event.ip_address.as_deref(),
            webhook_url: details.meta_str("webhook_url"),
            content,
        }
    }
}

/// Per-provider match outcome for one event.
struct MatchOutcome {
    score: f64,
    primary: DetectionMethod,
    indicators: SignatureIndicators,
}

/// Registry of provider fingerprints plus the model-extraction patterns.
pub struct ProviderDetector {
    registry: Vec<ProviderSignature>,
    model_patterns: Vec<Regex>,
    max_content_bytes: usize,
}

impl ProviderDetector {
    pub fn new() -> Self {
        Self::with_content_cap(64 * 1024)
    }

    pub fn with_content_cap(max_content_bytes: usize) -> Self {
        Self {
            registry: build_registry(),
            model_patterns: build_model_patterns(),
            max_content_bytes,
        }
    }

    /// Scan a batch and return deduplicated signatures: at most one per
    /// `(provider, user)` per invocation, ordered by `(user, provider)`.
    pub fn detect(&self, events: &[Event]) -> Vec<AutomationSignature> {
        let mut merged: HashMap<(String, AiProvider), AutomationSignature> = HashMap::new();

        for event in events {
            let input = DetectionInput::from_event(event, self.max_content_bytes);
            let Some((provider, outcome)) = self.best_provider(&input) else {
                continue;
            };
            let model = self.extract_model(&input.content);

            match merged.entry((event.user_id.clone(), provider.clone())) {
                std::collections::hash_map::Entry::Occupied(mut existing) => {
                    merge_hit(existing.get_mut(), event, &outcome, model.as_deref());
                }
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(new_signature(provider, event, &outcome, model));
                }
            }
        }

        let mut signatures: Vec<AutomationSignature> = merged.into_values().collect();
        signatures.sort_by(|a, b| {
            a.user_id
                .cmp(&b.user_id)
                .then_with(|| a.ai_provider.to_string().cmp(&b.ai_provider.to_string()))
        });
        signatures
    }

    /// Score every registry row against the input and keep the best.
    /// No matching evidence means no signature, never an "unknown" one.
    fn best_provider(&self, input: &DetectionInput<'_>) -> Option<(AiProvider, MatchOutcome)> {
        let mut best: Option<(AiProvider, MatchOutcome)> = None;
        for row in &self.registry {
            let Some(outcome) = score_row(row, input) else {
                continue;
            };
            let better = match &best {
                None => true,
                // Higher total score wins; ties break toward the stronger
                // primary method (api_endpoint over oauth_scope).
                Some((_, current)) => {
                    outcome.score > current.score
                        || (outcome.score == current.score && outcome.primary > current.primary)
                }
            };
            if better {
                best = Some((row.provider.clone(), outcome));
            }
        }
        best
    }

    /// First model-name match across the extraction patterns.
    fn extract_model(&self, content: &str) -> Option<String> {
        self.model_patterns
            .iter()
            .find_map(|pattern| pattern.find(content).map(|m| m.as_str().to_lowercase()))
    }
}

impl Default for ProviderDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Score one registry row against the input. Per-method hits accumulate up
/// to the method's base weight; method scores sum and the engine clamps the
/// total to 100 at signature construction.
fn score_row(row: &ProviderSignature, input: &DetectionInput<'_>) -> Option<MatchOutcome> {
    let mut score = 0.0;
    let mut primary: Option<DetectionMethod> = None;
    let mut indicators = SignatureIndicators::default();

    let mut register = |method: DetectionMethod, hits: usize, score: &mut f64| {
        if hits == 0 {
            return false;
        }
        let cap = method.base_weight();
        *score += (hits as f64 * cap).min(cap);
        if primary.is_none_or(|current| method > current) {
            primary = Some(method);
        }
        true
    };

    if let Some(endpoint) = input.api_endpoint {
        let hits: Vec<&str> = row
            .endpoint_substrings
            .iter()
            .copied()
            .filter(|s| endpoint.contains(s))
            .collect();
        if register(DetectionMethod::ApiEndpoint, hits.len(), &mut score) {
            indicators
                .matched_endpoints
                .extend(hits.iter().map(|s| s.to_string()));
        }
    }

    let scope_hits = input
        .scopes
        .iter()
        .copied()
        .filter(|scope| row.oauth_scope_exacts.iter().any(|exact| *exact == *scope))
        .count();
    register(DetectionMethod::OauthScope, scope_hits, &mut score);

    if let Some(agent) = input.user_agent {
        let agent_lower = agent.to_ascii_lowercase();
        let hits: Vec<&str> = row
            .user_agent_substrings
            .iter()
            .copied()
            .filter(|s| agent_lower.contains(&s.to_ascii_lowercase()))
            .collect();
        if register(DetectionMethod::UserAgent, hits.len(), &mut score) {
            indicators.matched_user_agents.push(agent.to_string());
        }
    }

    let content_hits: Vec<String> = row
        .content_patterns
        .iter()
        .filter(|pattern| pattern.is_match(&input.content))
        .map(|pattern| pattern.as_str().to_string())
        .collect();
    if register(DetectionMethod::ContentSignature, content_hits.len(), &mut score) {
        indicators.matched_content_signatures.extend(content_hits);
    }

    if let Some(webhook) = input.webhook_url {
        let hits = row
            .webhook_substrings
            .iter()
            .filter(|s| webhook.contains(*s))
            .count();
        register(DetectionMethod::WebhookPattern, hits, &mut score);
    }

    if let Some(ip) = input.ip.and_then(|raw| raw.parse::<Ipv4Addr>().ok()) {
        let hits = row.ip_ranges.iter().filter(|cidr| cidr.contains(ip)).count();
        register(DetectionMethod::IpRange, hits, &mut score);
    }

    primary.map(|primary| MatchOutcome {
        score,
        primary,
        indicators,
    })
}

fn new_signature(
    provider: AiProvider,
    event: &Event,
    outcome: &MatchOutcome,
    model: Option<String>,
) -> AutomationSignature {
    let mut signature = AutomationSignature::new(
        provider,
        event.user_id.clone(),
        outcome.primary,
        outcome.score,
        event.timestamp,
    );
    signature.model = model;
    signature.indicators = outcome.indicators.clone();
    if let Some(resource) = affected_resource(event) {
        signature.metadata.affected_resources.push(resource);
    }
    signature
}

/// Fold another matching event into an existing `(provider, user)`
/// signature: occurrence counting, first/last timestamps, indicator and
/// resource union, and the strongest method/confidence seen.
fn merge_hit(
    signature: &mut AutomationSignature,
    event: &Event,
    outcome: &MatchOutcome,
    model: Option<&str>,
) {
    signature.metadata.occurrence_count += 1;
    signature.metadata.first_detected = signature.metadata.first_detected.min(event.timestamp);
    signature.metadata.last_detected = signature.metadata.last_detected.max(event.timestamp);

    if outcome.score > signature.confidence {
        signature.confidence = clamp_confidence(outcome.score);
        signature.risk_level =
            singura_core::finding::RiskLevel::from_confidence(signature.confidence);
    }
    if outcome.primary > signature.detection_method {
        signature.detection_method = outcome.primary;
    }
    if signature.model.is_none() {
        signature.model = model.map(String::from);
    }

    for endpoint in &outcome.indicators.matched_endpoints {
        if !signature.indicators.matched_endpoints.contains(endpoint) {
            signature.indicators.matched_endpoints.push(endpoint.clone());
        }
    }
    for agent in &outcome.indicators.matched_user_agents {
        if !signature.indicators.matched_user_agents.contains(agent) {
            signature.indicators.matched_user_agents.push(agent.clone());
        }
    }
    for content in &outcome.indicators.matched_content_signatures {
        if !signature
            .indicators
            .matched_content_signatures
            .contains(content)
        {
            signature
                .indicators
                .matched_content_signatures
                .push(content.clone());
        }
    }
    if let Some(resource) = affected_resource(event) {
        if !signature.metadata.affected_resources.contains(&resource) {
            signature.metadata.affected_resources.push(resource);
        }
    }
}

fn affected_resource(event: &Event) -> Option<String> {
    event
        .resource_id
        .clone()
        .or_else(|| event.action_details.resource_name.clone())
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(err) => {
                tracing::warn!(%pattern, %err, "skipping invalid provider pattern");
                None
            }
        })
        .collect()
}

fn cidrs(specs: &[&str]) -> Vec<Ipv4Cidr> {
    specs.iter().filter_map(|spec| Ipv4Cidr::parse(spec)).collect()
}

fn build_registry() -> Vec<ProviderSignature> {
    vec![
        ProviderSignature {
            provider: AiProvider::Openai,
            endpoint_substrings: vec!["api.openai.com", "oaiusercontent.com"],
            user_agent_substrings: vec!["openai", "chatgpt"],
            oauth_scope_exacts: vec!["openai.api.read", "openai.api.write"],
            webhook_substrings: vec!["openai-webhook", "hooks.openai"],
            ip_ranges: cidrs(&["23.102.140.112/28", "13.66.11.96/28"]),
            content_patterns: compile(&[
                r"(?i)api\.openai\.com",
                r"(?i)\bgpt-[34][a-z0-9.-]*",
                r"sk-[A-Za-z0-9]{32,}",
            ]),
        },
        ProviderSignature {
            provider: AiProvider::Anthropic,
            endpoint_substrings: vec!["api.anthropic.com"],
            user_agent_substrings: vec!["anthropic", "claude-cli"],
            oauth_scope_exacts: vec!["anthropic.api.read", "anthropic.api.write"],
            webhook_substrings: vec!["anthropic-webhook"],
            ip_ranges: cidrs(&["160.79.104.0/23"]),
            content_patterns: compile(&[
                r"(?i)api\.anthropic\.com",
                r"(?i)\bclaude-[0-9][a-z0-9.-]*",
                r"sk-ant-[A-Za-z0-9-]{24,}",
            ]),
        },
        ProviderSignature {
            provider: AiProvider::GoogleAi,
            endpoint_substrings: vec![
                "generativelanguage.googleapis.com",
                "aiplatform.googleapis.com",
            ],
            user_agent_substrings: vec!["google-genai", "google-generativeai"],
            oauth_scope_exacts: vec![
                "https://www.googleapis.com/auth/generative-language",
                "https://www.googleapis.com/auth/cloud-platform.ai",
            ],
            webhook_substrings: vec!["gemini-webhook"],
            ip_ranges: Vec::new(),
            content_patterns: compile(&[
                r"(?i)generativelanguage\.googleapis\.com",
                r"(?i)\bgemini-(?:pro|1\.5)[a-z0-9.-]*",
            ]),
        },
        ProviderSignature {
            provider: AiProvider::Cohere,
            endpoint_substrings: vec!["api.cohere.ai", "api.cohere.com"],
            user_agent_substrings: vec!["cohere"],
            oauth_scope_exacts: vec!["cohere.api"],
            webhook_substrings: vec!["cohere-webhook"],
            ip_ranges: Vec::new(),
            content_patterns: compile(&[r"(?i)api\.cohere\.(?:ai|com)", r"(?i)\bcommand-r(?:-plus)?\b"]),
        },
        ProviderSignature {
            provider: AiProvider::Huggingface,
            endpoint_substrings: vec!["api-inference.huggingface.co", "huggingface.co/api"],
            user_agent_substrings: vec!["huggingface_hub", "transformers"],
            oauth_scope_exacts: vec!["huggingface.inference"],
            webhook_substrings: vec!["hf-webhook"],
            ip_ranges: Vec::new(),
            content_patterns: compile(&[
                r"(?i)api-inference\.huggingface\.co",
                r"hf_[A-Za-z0-9]{30,}",
            ]),
        },
        ProviderSignature {
            provider: AiProvider::Replicate,
            endpoint_substrings: vec!["api.replicate.com"],
            user_agent_substrings: vec!["replicate"],
            oauth_scope_exacts: vec!["replicate.predictions"],
            webhook_substrings: vec!["replicate-webhook"],
            ip_ranges: Vec::new(),
            content_patterns: compile(&[r"(?i)api\.replicate\.com", r"r8_[A-Za-z0-9]{30,}"]),
        },
        ProviderSignature {
            provider: AiProvider::Mistral,
            endpoint_substrings: vec!["api.mistral.ai"],
            user_agent_substrings: vec!["mistralai", "mistral-client"],
            oauth_scope_exacts: vec!["mistral.api"],
            webhook_substrings: vec!["mistral-webhook"],
            ip_ranges: Vec::new(),
            content_patterns: compile(&[
                r"(?i)api\.mistral\.ai",
                r"(?i)\bmistral-(?:tiny|small|medium|large)[a-z0-9.-]*",
            ]),
        },
        ProviderSignature {
            provider: AiProvider::TogetherAi,
            endpoint_substrings: vec!["api.together.xyz", "api.together.ai"],
            user_agent_substrings: vec!["together"],
            oauth_scope_exacts: vec!["together.api"],
            webhook_substrings: vec!["together-webhook"],
            ip_ranges: Vec::new(),
            content_patterns: compile(&[r"(?i)api\.together\.(?:xyz|ai)"]),
        },
    ]
}

fn build_model_patterns() -> Vec<Regex> {
    compile(&[
        r"(?i)\bgpt-4[a-z0-9.-]*",
        r"(?i)\bgpt-3\.5[a-z0-9.-]*",
        r"(?i)\bo[134](?:-mini|-preview)\b",
        r"(?i)\bclaude-3(?:[.-][a-z0-9.]+)*",
        r"(?i)\bclaude-[24](?:[.-][a-z0-9.]+)*",
        r"(?i)\bgemini-1\.5-[a-z]+",
        r"(?i)\bgemini-pro[a-z0-9.-]*",
        r"(?i)\bmistral-(?:tiny|small|medium|large)[a-z0-9.-]*",
        r"(?i)\bcommand-r(?:-plus)?\b",
        r"(?i)\bllama-?[23][a-z0-9.-]*",
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use singura_core::event::{ActionDetails, EventType, ResourceType};
    use singura_core::finding::RiskLevel;

    fn script_event(id: &str, user: &str, details: ActionDetails) -> Event {
        Event::new(
            id,
            Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap(),
            user,
            "org-1",
            EventType::ScriptExecution,
            ResourceType::Script,
            details,
        )
    }

    #[test]
    fn test_openai_endpoint_and_agent() {
        let details = ActionDetails::new("external_request").with_metadata(
            "api_endpoint",
            serde_json::json!("https://api.openai.com/v1/chat/completions"),
        );
        let event = script_event("e-1", "user-1", details).with_user_agent("OpenAI-Python/1.12");

        let signatures = ProviderDetector::new().detect(&[event]);
        assert_eq!(signatures.len(), 1);
        let sig = &signatures[0];
        assert_eq!(sig.ai_provider, AiProvider::Openai);
        assert_eq!(sig.detection_method, DetectionMethod::ApiEndpoint);
        // endpoint (40) + user agent (30) + content signature (30, the
        // endpoint also appears in the serialized details).
        assert!(sig.confidence >= 70.0);
        assert!(
            sig.indicators
                .matched_endpoints
                .contains(&"api.openai.com".to_string())
        );
    }

    #[test]
    fn test_no_evidence_no_signature() {
        let event = script_event("e-1", "user-1", ActionDetails::new("routine_job"));
        let signatures = ProviderDetector::new().detect(&[event]);
        assert!(signatures.is_empty());
    }

    #[test]
    fn test_model_extraction() {
        let details = ActionDetails::new("external_request")
            .with_metadata("api_endpoint", serde_json::json!("https://api.openai.com/v1"))
            .with_metadata("body", serde_json::json!({"model": "gpt-4-turbo"}));
        let event = script_event("e-1", "user-1", details);

        let signatures = ProviderDetector::new().detect(&[event]);
        assert_eq!(signatures.len(), 1);
        assert_eq!(signatures[0].model.as_deref(), Some("gpt-4-turbo"));
    }

    #[test]
    fn test_anthropic_content_signature() {
        let details = ActionDetails::new("external_request")
            .with_metadata("body", serde_json::json!("POST https://api.anthropic.com/v1/messages model=claude-3-opus"));
        let event = script_event("e-1", "user-1", details);

        let signatures = ProviderDetector::new().detect(&[event]);
        assert_eq!(signatures.len(), 1);
        let sig = &signatures[0];
        assert_eq!(sig.ai_provider, AiProvider::Anthropic);
        assert_eq!(sig.detection_method, DetectionMethod::ContentSignature);
        assert_eq!(sig.model.as_deref(), Some("claude-3-opus"));
    }

    #[test]
    fn test_oauth_scope_match() {
        let details = ActionDetails::new("token_grant").with_metadata(
            "oauth_scopes",
            serde_json::json!(["https://www.googleapis.com/auth/generative-language"]),
        );
        let event = script_event("e-1", "user-1", details);

        let signatures = ProviderDetector::new().detect(&[event]);
        assert_eq!(signatures.len(), 1);
        let sig = &signatures[0];
        assert_eq!(sig.ai_provider, AiProvider::GoogleAi);
        assert_eq!(sig.detection_method, DetectionMethod::OauthScope);
    }

    #[test]
    fn test_ip_range_match() {
        let event = script_event("e-1", "user-1", ActionDetails::new("request"))
            .with_ip_address("23.102.140.115");
        let signatures = ProviderDetector::new().detect(&[event]);
        assert_eq!(signatures.len(), 1);
        let sig = &signatures[0];
        assert_eq!(sig.ai_provider, AiProvider::Openai);
        assert_eq!(sig.detection_method, DetectionMethod::IpRange);
        assert_eq!(sig.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_dedup_per_provider_and_user() {
        let make = |id: &str, offset_secs: i64| {
            let mut event = script_event(
                id,
                "user-1",
                ActionDetails::new("external_request").with_metadata(
                    "api_endpoint",
                    serde_json::json!("https://api.openai.com/v1/embeddings"),
                ),
            );
            event.timestamp += chrono::Duration::seconds(offset_secs);
            event
        };
        let events = vec![make("e-1", 0), make("e-2", 60), make("e-3", 120)];

        let signatures = ProviderDetector::new().detect(&events);
        assert_eq!(signatures.len(), 1);
        let sig = &signatures[0];
        assert_eq!(sig.metadata.occurrence_count, 3);
        assert_eq!(
            (sig.metadata.last_detected - sig.metadata.first_detected).num_seconds(),
            120
        );
    }

    #[test]
    fn test_separate_users_separate_signatures() {
        let make = |id: &str, user: &str| {
            script_event(
                id,
                user,
                ActionDetails::new("external_request").with_metadata(
                    "api_endpoint",
                    serde_json::json!("https://api.openai.com/v1/embeddings"),
                ),
            )
        };
        let events = vec![make("e-1", "user-a"), make("e-2", "user-b")];
        let signatures = ProviderDetector::new().detect(&events);
        assert_eq!(signatures.len(), 2);
        assert_eq!(signatures[0].user_id, "user-a");
        assert_eq!(signatures[1].user_id, "user-b");
    }

    #[test]
    fn test_content_cap_truncates_before_matching() {
        // The marker sits beyond the cap, so it must not match.
        let mut padding = "x".repeat(2_000);
        padding.push_str("api.openai.com");
        let details =
            ActionDetails::new("request").with_metadata("blob", serde_json::json!(padding));
        let event = script_event("e-1", "user-1", details);

        let signatures = ProviderDetector::with_content_cap(1_024).detect(&[event]);
        assert!(signatures.is_empty());
    }

    #[test]
    fn test_cidr_parse_and_contains() {
        let cidr = Ipv4Cidr::parse("10.1.2.0/24").unwrap();
        assert!(cidr.contains("10.1.2.200".parse().unwrap()));
        assert!(!cidr.contains("10.1.3.1".parse().unwrap()));
        assert!(Ipv4Cidr::parse("10.1.2.0/33").is_none());
        assert!(Ipv4Cidr::parse("not-an-ip/8").is_none());
    }

    #[test]
    fn test_risk_level_bands_applied() {
        // Endpoint + scope + agent + content: 40+40+30+30 = 140, clamped to
        // 100, critical.
        let details = ActionDetails::new("external_request")
            .with_metadata("api_endpoint", serde_json::json!("https://api.openai.com/v1"))
            .with_metadata("oauth_scopes", serde_json::json!(["openai.api.read"]));
        let event = script_event("e-1", "user-1", details).with_user_agent("openai-python");

        let signatures = ProviderDetector::new().detect(&[event]);
        assert_eq!(signatures.len(), 1);
        assert_eq!(signatures[0].confidence, 100.0);
        assert_eq!(signatures[0].risk_level, RiskLevel::Critical);
    }
}
