//! Process configuration, read from the environment (and `.env` if present).

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;

pub const DEFAULT_MODEL_ID: &str = "t5-small";

/// Where the summarization weights come from and how generation is driven.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// Hugging Face hub repository, e.g. `t5-small`.
    pub model_id: String,
    pub revision: String,
    /// Task prompt prepended to every input.
    pub prompt_prefix: String,
    /// Longest tokenized input accepted by the model.
    pub context_tokens: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: "main".to_string(),
            prompt_prefix: "summarize: ".to_string(),
            context_tokens: 512,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub model: ModelSettings,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Missing or unparsable
    /// values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = ModelSettings::default();
        let model = ModelSettings {
            model_id: lookup("SUMMARIZER_MODEL_ID").unwrap_or(defaults.model_id),
            revision: lookup("SUMMARIZER_MODEL_REVISION").unwrap_or(defaults.revision),
            prompt_prefix: lookup("SUMMARIZER_PROMPT_PREFIX").unwrap_or(defaults.prompt_prefix),
            context_tokens: lookup("SUMMARIZER_CONTEXT_TOKENS")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.context_tokens),
        };
        Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup("PORT").and_then(|s| s.parse().ok()).unwrap_or(5000),
            model,
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .context("invalid HOST/PORT")
    }
}
