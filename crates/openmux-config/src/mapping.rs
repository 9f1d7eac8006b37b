//! `ModelMapping` and the model mapper (SPEC_FULL.md §4.2).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMapping {
    pub request_model: String,
    pub actual_model: String,
    pub preferred_provider_id: Option<String>,
    pub preferred_account_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub actual_model: String,
    pub preferred_provider_id: Option<String>,
    pub preferred_account_id: Option<String>,
}

/// Resolves `(requestedModel, provider)` to the actual upstream model name plus
/// any preferences, per §4.2:
///
/// 1. a direct mapping whose `preferredProviderId` is empty or matches `provider`;
/// 2. else the first wildcard entry (in insertion order) that matches;
/// 3. else `actualModel = requestedModel` with no preferences.
pub fn resolve_model(
    mappings: &[ModelMapping],
    requested_model: &str,
    provider: Option<&str>,
) -> ResolvedModel {
    if let Some(direct) = mappings.iter().find(|m| {
        m.request_model == requested_model
            && m.preferred_provider_id
                .as_deref()
                .is_none_or(|p| Some(p) == provider)
    }) {
        return ResolvedModel {
            actual_model: direct.actual_model.clone(),
            preferred_provider_id: direct.preferred_provider_id.clone(),
            preferred_account_id: direct.preferred_account_id.clone(),
        };
    }

    if let Some(wildcard) = mappings
        .iter()
        .filter(|m| m.request_model.contains('*'))
        .find(|m| wildcard_matches(&m.request_model, requested_model))
    {
        return ResolvedModel {
            actual_model: wildcard.actual_model.clone(),
            preferred_provider_id: wildcard.preferred_provider_id.clone(),
            preferred_account_id: wildcard.preferred_account_id.clone(),
        };
    }

    ResolvedModel {
        actual_model: requested_model.to_string(),
        preferred_provider_id: None,
        preferred_account_id: None,
    }
}

/// Supported wildcard forms: `*`, `prefix*`, `*suffix`, `prefix*suffix`.
/// Case-insensitive.
fn wildcard_matches(pattern: &str, model: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let model = model.to_ascii_lowercase();

    if pattern == "*" {
        return true;
    }
    let Some(star) = pattern.find('*') else {
        return pattern == model;
    };
    let prefix = &pattern[..star];
    let suffix = &pattern[star + 1..];
    if pattern[star + 1..].contains('*') {
        // Only a single `*` is a documented form; treat extras as literal by
        // falling back to prefix/suffix around the first star only.
    }
    model.starts_with(prefix) && model.ends_with(suffix) && model.len() >= prefix.len() + suffix.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(request: &str, actual: &str, provider: Option<&str>) -> ModelMapping {
        ModelMapping {
            request_model: request.to_string(),
            actual_model: actual.to_string(),
            preferred_provider_id: provider.map(str::to_string),
            preferred_account_id: None,
        }
    }

    #[test]
    fn direct_mapping_wins_when_provider_matches() {
        let mappings = vec![mapping("claude-3-opus", "glm-4.6", Some("glm"))];
        let resolved = resolve_model(&mappings, "claude-3-opus", Some("glm"));
        assert_eq!(resolved.actual_model, "glm-4.6");
    }

    #[test]
    fn wildcard_prefix_matches_s6() {
        let mappings = vec![
            mapping("claude-3-opus", "glm-4.6", Some("glm")),
            mapping("gpt-4o*", "kimi-k2.5", Some("kimi")),
        ];
        let resolved = resolve_model(&mappings, "gpt-4o-mini", None);
        assert_eq!(resolved.actual_model, "kimi-k2.5");
        assert_eq!(resolved.preferred_provider_id.as_deref(), Some("kimi"));
    }

    #[test]
    fn suffix_and_infix_wildcard_forms() {
        assert!(wildcard_matches("*-mini", "gpt-4o-mini"));
        assert!(wildcard_matches("gpt-*-mini", "gpt-4o-mini"));
        assert!(!wildcard_matches("gpt-*-mini", "gpt-4o"));
    }

    #[test]
    fn no_match_falls_back_to_request_model_unchanged() {
        let resolved = resolve_model(&[], "some-model", None);
        assert_eq!(resolved.actual_model, "some-model");
        assert!(resolved.preferred_provider_id.is_none());
    }
}
