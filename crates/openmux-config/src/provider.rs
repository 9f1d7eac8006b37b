//! `Provider` — a vendor configuration (SPEC_FULL.md §3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Selects which upstream adapter (SPEC_FULL.md §4.5) handles an account bound
/// to this provider, and therefore which credential shape its accounts carry
/// (§6 "Adapter credential shapes").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStyle {
    Token,
    RefreshToken,
    Jwt,
    CookieTicket,
    CompositeJwt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub display_name: String,
    pub enabled: bool,
    /// Ordered list of supported model patterns. An entry may end with `*`
    /// (prefix-wildcard). An empty list means "supports everything" (§4.3).
    pub supported_models: Vec<String>,
    /// Per-provider model mapping, consulted before the global mapper (§4.2).
    #[serde(default)]
    pub model_mappings: HashMap<String, String>,
    pub auth_style: AuthStyle,
    pub endpoint_base_url: String,
    /// Header template applied to every request this provider forwards.
    #[serde(default)]
    pub request_headers: HashMap<String, String>,
    /// Configured creation timestamp (unix seconds), surfaced as `created` in
    /// `GET /v1/models` entries. Falls back to process start time when unset
    /// (§4.1 "GET /v1/models").
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl Provider {
    /// Whether `model` is supported per §4.3: an empty list supports everything,
    /// otherwise entries match exactly or via case-insensitive prefix-wildcard.
    pub fn supports_model(&self, model: &str) -> bool {
        if self.supported_models.is_empty() {
            return true;
        }
        self.supported_models
            .iter()
            .any(|pattern| model_pattern_matches(pattern, model))
    }
}

/// Shared wildcard matcher for provider `supported_models` entries. Unlike the
/// full mapper pattern language (§4.2), provider support patterns are documented
/// as exact-or-prefix-wildcard only.
pub fn model_pattern_matches(pattern: &str, model: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let model = model.to_ascii_lowercase();
    match pattern.strip_suffix('*') {
        Some(prefix) => model.starts_with(prefix),
        None => pattern == model,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(models: Vec<&str>) -> Provider {
        Provider {
            id: "p".into(),
            display_name: "P".into(),
            enabled: true,
            supported_models: models.into_iter().map(str::to_string).collect(),
            model_mappings: HashMap::new(),
            auth_style: AuthStyle::Token,
            endpoint_base_url: "https://example.invalid".into(),
            request_headers: HashMap::new(),
            created_at: None,
        }
    }

    #[test]
    fn empty_supported_models_matches_anything() {
        assert!(provider(vec![]).supports_model("whatever"));
    }

    #[test]
    fn prefix_wildcard_matches_case_insensitively() {
        assert!(provider(vec!["gpt-4o*"]).supports_model("GPT-4O-mini"));
        assert!(!provider(vec!["gpt-4o*"]).supports_model("claude-3"));
    }

    #[test]
    fn exact_entry_requires_exact_match() {
        assert!(provider(vec!["gpt-4o"]).supports_model("gpt-4o"));
        assert!(!provider(vec!["gpt-4o"]).supports_model("gpt-4o-mini"));
    }
}
