use std::collections::HashMap;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::errors::{TapCrewError, TapCrewResult};
use crate::llm::gemini::GeminiProvider;
use crate::llm::provider::ReasoningService;

/// Role id of the planning model that selects workers each cycle.
pub const ORCHESTRATOR_ROLE: &str = "orchestrator";

/// Every role the engine resolves a provider for: the planner plus the
/// eight workers.
pub const ALL_ROLES: [&str; 9] = [
    ORCHESTRATOR_ROLE,
    "coordinate_extractor",
    "chain_of_thought",
    "code_generator",
    "code_verifier",
    "user_prompt",
    "page_summarizer",
    "summarizer",
    "application_selector",
];

/// Registry of reasoning providers, one per role.
///
/// Each role may carry its own model and API key so rate limits are spread
/// across keys; unconfigured roles fall back to the shared defaults.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ReasoningService>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn register(&mut self, role: &str, provider: Arc<dyn ReasoningService>) {
        self.providers.insert(role.to_string(), provider);
    }

    pub fn for_role(&self, role: &str) -> TapCrewResult<Arc<dyn ReasoningService>> {
        self.providers
            .get(role)
            .cloned()
            .ok_or_else(|| TapCrewError::Config(format!("no provider registered for role '{role}'")))
    }

    /// Build one provider per role from config.
    ///
    /// API key resolution order: `TAPCREW_<ROLE>_API_KEY` env var, the
    /// role's configured key, the shared configured key, `TAPCREW_API_KEY`.
    pub fn from_config(cfg: &LlmConfig) -> Self {
        let shared_key = cfg
            .api_key
            .clone()
            .or_else(|| std::env::var("TAPCREW_API_KEY").ok())
            .unwrap_or_default();

        let mut registry = Self::new();
        for role in ALL_ROLES {
            let entry = cfg.roles.get(role);
            let api_key = std::env::var(format!("TAPCREW_{}_API_KEY", role.to_uppercase()))
                .ok()
                .or_else(|| entry.and_then(|e| e.api_key.clone()))
                .unwrap_or_else(|| shared_key.clone());

            let model = entry
                .and_then(|e| e.model.clone())
                .unwrap_or_else(|| default_model_for(role, cfg));

            tracing::debug!(role, model = %model, "provider registered");
            registry.register(
                role,
                Arc::new(GeminiProvider::new(
                    role.to_string(),
                    cfg.api_base.clone(),
                    api_key,
                    model,
                )),
            );
        }
        registry
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Vision roles read pixels and need the heavier models; everything else
/// runs on the default chat model.
fn default_model_for(role: &str, cfg: &LlmConfig) -> String {
    match role {
        "coordinate_extractor" => cfg.vision_model.clone(),
        "page_summarizer" => cfg.page_model.clone(),
        _ => cfg.default_model.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoleEntry;

    #[test]
    fn builds_a_provider_for_every_role() {
        let registry = ProviderRegistry::from_config(&LlmConfig::default());
        for role in ALL_ROLES {
            assert!(registry.for_role(role).is_ok(), "missing role {role}");
        }
        assert!(registry.for_role("ninth_agent").is_err());
    }

    #[test]
    fn vision_roles_get_vision_models() {
        let cfg = LlmConfig::default();
        assert_eq!(default_model_for("coordinate_extractor", &cfg), cfg.vision_model);
        assert_eq!(default_model_for("page_summarizer", &cfg), cfg.page_model);
        assert_eq!(default_model_for("summarizer", &cfg), cfg.default_model);
    }

    #[test]
    fn role_model_override_wins() {
        let mut cfg = LlmConfig::default();
        cfg.roles.insert(
            "summarizer".into(),
            RoleEntry {
                model: Some("gemini-exp".into()),
                api_key: None,
            },
        );
        let registry = ProviderRegistry::from_config(&cfg);
        assert_eq!(registry.for_role("summarizer").unwrap().name(), "summarizer");
    }
}
