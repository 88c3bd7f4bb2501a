use serde::{Deserialize, Serialize};

use crate::error::{Result, VideoTitlerError};

/// OpenAI-compatible chat services the title generator can talk to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Deepseek,
    Openai,
    Grok,
}

pub struct ProviderConfig {
    pub base_url: &'static str,
    pub model: &'static str,
    pub env_var: &'static str,
}

impl Provider {
    pub fn config(&self) -> ProviderConfig {
        match self {
            Provider::Deepseek => ProviderConfig {
                base_url: "https://api.deepseek.com/v1",
                model: "deepseek-chat",
                env_var: "DEEPSEEK_API_KEY",
            },
            Provider::Openai => ProviderConfig {
                base_url: "https://api.openai.com/v1",
                model: "gpt-5.1",
                env_var: "OPENAI_API_KEY",
            },
            Provider::Grok => ProviderConfig {
                base_url: "https://api.x.ai/v1",
                model: "grok-4-fast",
                env_var: "XAI_API_KEY",
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Deepseek => "DeepSeek",
            Provider::Openai => "OpenAI",
            Provider::Grok => "Grok",
        }
    }

    /// Picks the explicit key if it is non-blank, otherwise the provider's
    /// environment variable.
    pub fn resolve_api_key(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(key) = explicit.map(str::trim).filter(|k| !k.is_empty()) {
            return Ok(key.to_string());
        }

        let config = self.config();
        std::env::var(config.env_var)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| VideoTitlerError::MissingApiKey {
                provider_name: self.name().to_string(),
                env_var: config.env_var.to_string(),
            })
    }
}
