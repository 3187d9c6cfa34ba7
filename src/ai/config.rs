//! AI provider configuration, role presets and the provider catalog.
//!
//! Everything here is held in memory only and lost on restart.

use crate::error::{AiError, AiResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 4000;

fn default_temperature() -> Option<f64> {
    Some(DEFAULT_TEMPERATURE)
}

fn default_max_tokens() -> Option<u32> {
    Some(DEFAULT_MAX_TOKENS)
}

fn default_enabled() -> bool {
    true
}

/// Connection settings for one OpenAI-compatible provider account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Catalog key such as `deepseek` or `custom`
    #[serde(default)]
    pub provider: String,
    /// Contains sensitive data - never log or return
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: Option<f64>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl AiConfig {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            provider: "custom".to_string(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            enabled: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Fail unless the config is enabled and carries an API key.
    pub fn ensure_usable(&self) -> AiResult<()> {
        if !self.enabled || self.api_key.trim().is_empty() {
            return Err(AiError::Disabled);
        }
        Ok(())
    }

    /// `<base_url>/chat/completions`
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Millisecond timestamp id, bumped until it does not collide.
fn timestamp_id(prefix: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut millis = chrono::Utc::now().timestamp_millis();
    loop {
        let id = format!("{}{}", prefix, millis);
        if !taken(&id) {
            return id;
        }
        millis += 1;
    }
}

/// In-memory store of AI configurations, kept in insertion order.
#[derive(Clone, Default)]
pub struct AiConfigStore {
    configs: Arc<RwLock<Vec<AiConfig>>>,
}

impl AiConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a config; an empty id gets a timestamp id.
    pub async fn save(&self, mut config: AiConfig) -> String {
        let mut configs = self.configs.write().await;
        if config.id.trim().is_empty() {
            config.id = timestamp_id("", |id| configs.iter().any(|c| c.id == id));
        }
        let id = config.id.clone();

        match configs.iter_mut().find(|c| c.id == id) {
            Some(existing) => *existing = config,
            None => configs.push(config),
        }

        info!(config_id = %id, "AI configuration saved");
        id
    }

    /// Replace the config stored under `id`, creating it if absent.
    ///
    /// An empty API key keeps the stored one, since keys are never sent back
    /// to clients.
    pub async fn update(&self, id: &str, mut config: AiConfig) {
        let mut configs = self.configs.write().await;
        config.id = id.to_string();

        match configs.iter_mut().find(|c| c.id == id) {
            Some(existing) => {
                if config.api_key.is_empty() {
                    config.api_key = std::mem::take(&mut existing.api_key);
                }
                *existing = config;
            }
            None => configs.push(config),
        }
        debug!(config_id = %id, "AI configuration updated");
    }

    /// Remove a config. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> bool {
        let mut configs = self.configs.write().await;
        let before = configs.len();
        configs.retain(|c| c.id != id);
        configs.len() != before
    }

    pub async fn get(&self, id: &str) -> Option<AiConfig> {
        self.configs
            .read()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub async fn list(&self) -> Vec<AiConfig> {
        self.configs.read().await.clone()
    }

    /// The config named by `config_id`, else the first enabled config.
    pub async fn resolve(&self, config_id: Option<&str>) -> AiResult<AiConfig> {
        let configs = self.configs.read().await;

        if let Some(id) = config_id.filter(|id| !id.is_empty()) {
            if let Some(config) = configs.iter().find(|c| c.id == id) {
                return Ok(config.clone());
            }
            debug!(config_id = %id, "Unknown AI configuration, using first enabled");
        }

        configs
            .iter()
            .find(|c| c.enabled)
            .cloned()
            .ok_or(AiError::NoConfig)
    }
}

/// A persona whose system prompt frames a chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiRole {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub is_custom: bool,
}

impl AiRole {
    fn preset(id: &str, name: &str, description: &str, system_prompt: &str, avatar: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            system_prompt: system_prompt.to_string(),
            avatar: avatar.to_string(),
            is_custom: false,
        }
    }
}

fn preset_roles() -> Vec<AiRole> {
    vec![
        AiRole::preset(
            "sql-expert",
            "SQL Expert",
            "Professional SQL development and tuning expert",
            "You are a senior SQL expert with deep experience in database design and optimization.",
            "👨‍💻",
        ),
        AiRole::preset(
            "data-analyst",
            "Data Analyst",
            "Professional data analysis and reporting expert",
            "You are a professional data analyst who is good at finding insights and patterns in data.",
            "📊",
        ),
        AiRole::preset(
            "assistant",
            "Assistant",
            "Friendly general-purpose assistant",
            "You are a friendly and helpful AI assistant who can answer all kinds of questions.",
            "🤖",
        ),
        AiRole::preset(
            "code-generator",
            "Code Generator",
            "Professional code generation and optimization expert",
            "You are a professional programmer who is good at producing high-quality code and solutions.",
            "💻",
        ),
    ]
}

/// Preset and custom roles.
#[derive(Clone)]
pub struct RoleRegistry {
    roles: Arc<RwLock<Vec<AiRole>>>,
}

impl RoleRegistry {
    /// A registry holding the four preset roles.
    pub fn with_presets() -> Self {
        Self {
            roles: Arc::new(RwLock::new(preset_roles())),
        }
    }

    pub async fn list(&self) -> Vec<AiRole> {
        self.roles.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<AiRole> {
        self.roles
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// The system prompt of a role, if the role exists.
    pub async fn system_prompt(&self, id: &str) -> Option<String> {
        self.get(id).await.map(|r| r.system_prompt)
    }

    /// Add a custom role; an empty id becomes `custom-<millis>`.
    pub async fn create(&self, mut role: AiRole) -> AiResult<String> {
        if role.name.trim().is_empty() || role.system_prompt.trim().is_empty() {
            return Err(AiError::invalid_input(
                "Role name and system prompt are required",
            ));
        }

        let mut roles = self.roles.write().await;
        if role.id.trim().is_empty() {
            role.id = timestamp_id("custom-", |id| roles.iter().any(|r| r.id == id));
        }
        role.is_custom = true;
        let id = role.id.clone();

        match roles.iter_mut().find(|r| r.id == id) {
            Some(existing) => *existing = role,
            None => roles.push(role),
        }

        info!(role_id = %id, "Custom role created");
        Ok(id)
    }

    /// Replace an existing role, keeping its preset/custom status.
    pub async fn update(&self, id: &str, mut role: AiRole) -> AiResult<()> {
        let mut roles = self.roles.write().await;
        let existing = roles
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| AiError::RoleNotFound { id: id.to_string() })?;

        role.id = id.to_string();
        role.is_custom = existing.is_custom;
        *existing = role;
        Ok(())
    }

    /// Delete a custom role. Preset roles are refused.
    pub async fn delete(&self, id: &str) -> AiResult<()> {
        let mut roles = self.roles.write().await;
        let position = roles
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| AiError::RoleNotFound { id: id.to_string() })?;

        if !roles[position].is_custom {
            return Err(AiError::PresetRole { id: id.to_string() });
        }
        roles.remove(position);
        info!(role_id = %id, "Custom role deleted");
        Ok(())
    }
}

impl Default for RoleRegistry {
    fn default() -> Self {
        Self::with_presets()
    }
}

/// A known provider with its default endpoint and models.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    #[serde(skip)]
    pub id: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
    pub models: &'static [&'static str],
}

/// Providers offered to clients, in display order.
pub fn provider_catalog() -> Vec<Provider> {
    vec![
        Provider {
            id: "deepseek",
            name: "DeepSeek",
            base_url: "https://api.deepseek.com",
            models: &["deepseek-chat", "deepseek-coder"],
        },
        Provider {
            id: "iflow",
            name: "iFlow",
            base_url: "https://apis.iflow.cn/v1",
            models: &["Iflow-chat", "Iflow-pro"],
        },
        Provider {
            id: "openai",
            name: "OpenAI",
            base_url: "https://api.openai.com/v1",
            models: &["gpt-3.5-turbo", "gpt-4", "gpt-4-turbo-preview"],
        },
        Provider {
            id: "custom",
            name: "Custom",
            base_url: "",
            models: &[""],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(id: &str, enabled: bool) -> AiConfig {
        AiConfig::new(id, "http://localhost", "model", "key")
            .with_id(id)
            .with_enabled(enabled)
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: AiConfig =
            serde_json::from_str(r#"{"name":"a","baseUrl":"http://x/","apiKey":"k"}"#).unwrap();
        assert_eq!(config.temperature, Some(DEFAULT_TEMPERATURE));
        assert_eq!(config.max_tokens, Some(DEFAULT_MAX_TOKENS));
        assert!(config.enabled);
        assert_eq!(config.completions_url(), "http://x/chat/completions");
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let json = serde_json::to_value(config("a", true)).unwrap();
        assert!(json.get("apiKey").is_none());
        assert_eq!(json["baseUrl"], "http://localhost");
    }

    #[test]
    fn test_ensure_usable() {
        assert!(config("a", true).ensure_usable().is_ok());
        assert!(matches!(
            config("a", false).ensure_usable(),
            Err(AiError::Disabled)
        ));
        let mut keyless = config("a", true);
        keyless.api_key.clear();
        assert!(matches!(keyless.ensure_usable(), Err(AiError::Disabled)));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_first_enabled() {
        let store = AiConfigStore::new();
        store.save(config("off", false)).await;
        store.save(config("on", true)).await;

        assert_eq!(store.resolve(None).await.unwrap().id, "on");
        assert_eq!(store.resolve(Some("off")).await.unwrap().id, "off");
        assert_eq!(store.resolve(Some("missing")).await.unwrap().id, "on");
    }

    #[tokio::test]
    async fn test_resolve_without_enabled_config() {
        let store = AiConfigStore::new();
        store.save(config("off", false)).await;
        let err = store.resolve(None).await.unwrap_err();
        assert_eq!(err.to_string(), "no available AI configuration");
    }

    #[tokio::test]
    async fn test_save_assigns_id_and_update_keeps_key() {
        let store = AiConfigStore::new();
        let id = store
            .save(AiConfig::new("gen", "http://localhost", "m", "secret"))
            .await;
        assert!(!id.is_empty());

        let mut edited = AiConfig::new("renamed", "http://localhost", "m", "");
        edited.enabled = false;
        store.update(&id, edited).await;

        let stored = store.get(&id).await.unwrap();
        assert_eq!(stored.name, "renamed");
        assert_eq!(stored.api_key, "secret");
        assert_eq!(store.list().await.len(), 1);

        assert!(store.delete(&id).await);
        assert!(!store.delete(&id).await);
    }

    #[tokio::test]
    async fn test_roles_lifecycle() {
        let roles = RoleRegistry::with_presets();
        assert_eq!(roles.list().await.len(), 4);

        let id = roles
            .create(AiRole {
                id: String::new(),
                name: "Reviewer".into(),
                description: String::new(),
                system_prompt: "Review SQL.".into(),
                avatar: String::new(),
                is_custom: false,
            })
            .await
            .unwrap();
        assert!(id.starts_with("custom-"));
        assert!(roles.get(&id).await.unwrap().is_custom);

        assert!(matches!(
            roles.delete("sql-expert").await,
            Err(AiError::PresetRole { .. })
        ));
        assert!(matches!(
            roles.delete("nope").await,
            Err(AiError::RoleNotFound { .. })
        ));
        roles.delete(&id).await.unwrap();
        assert_eq!(roles.list().await.len(), 4);
    }

    #[tokio::test]
    async fn test_role_update_requires_existing_id() {
        let roles = RoleRegistry::with_presets();
        let mut role = roles.get("assistant").await.unwrap();
        role.name = "Helper".to_string();
        role.is_custom = true;
        roles.update("assistant", role.clone()).await.unwrap();

        let updated = roles.get("assistant").await.unwrap();
        assert_eq!(updated.name, "Helper");
        assert!(!updated.is_custom);

        assert!(matches!(
            roles.update("missing", role).await,
            Err(AiError::RoleNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_role_create_requires_name_and_prompt() {
        let roles = RoleRegistry::with_presets();
        let role = AiRole {
            id: String::new(),
            name: "x".into(),
            description: String::new(),
            system_prompt: " ".into(),
            avatar: String::new(),
            is_custom: false,
        };
        assert!(matches!(
            roles.create(role).await,
            Err(AiError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_provider_catalog() {
        let ids: Vec<_> = provider_catalog().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["deepseek", "iflow", "openai", "custom"]);
    }
}
