use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::warn;

use crate::gemini::{InvokerConfig, RetryPolicy};

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub base_url: String,
    pub image_model: String,
    pub text_model: String,
    pub image_timeout: Duration,
    pub text_timeout: Duration,
    pub image_max_attempts: u32,
    pub retry_delay: Duration,
    pub assets_dir: PathBuf,
    pub records_path: PathBuf,
    pub port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let string_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let api_key = get("GEMINI_API_KEY").ok_or_else(|| anyhow!("GEMINI_API_KEY is not set"))?;

        Ok(Self {
            api_key,
            base_url: string_or("GEMINI_BASE_URL", "https://generativelanguage.googleapis.com/v1beta"),
            image_model: string_or("GEMINI_IMAGE_MODEL", "gemini-3-pro-image-preview"),
            text_model: string_or("GEMINI_TEXT_MODEL", "gemini-3-pro-image-preview"),
            image_timeout: Duration::from_secs(parse_or(&get, "IMAGE_TIMEOUT_SECS", 120)),
            text_timeout: Duration::from_secs(parse_or(&get, "TEXT_TIMEOUT_SECS", 60)),
            image_max_attempts: parse_or(&get, "IMAGE_MAX_ATTEMPTS", 3u32).max(1),
            retry_delay: Duration::from_millis(parse_or(&get, "RETRY_DELAY_MS", 2000)),
            assets_dir: PathBuf::from(string_or("ASSETS_DIR", "public")),
            records_path: PathBuf::from(string_or("RECORDS_PATH", "data/records.json")),
            port: parse_or(&get, "PORT", 8080),
        })
    }

    pub fn invoker_config(&self) -> InvokerConfig {
        InvokerConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            image_model: self.image_model.clone(),
            text_model: self.text_model.clone(),
            image_timeout: self.image_timeout,
            text_timeout: self.text_timeout,
            image_retry: RetryPolicy {
                max_attempts: self.image_max_attempts,
                retry_delay: self.retry_delay,
            },
        }
    }

    pub fn masked_key(&self) -> String {
        let prefix: String = self.api_key.chars().take(6).collect();
        format!("{prefix}...")
    }
}

fn parse_or<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match get(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Invalid {} value '{}', using default", key, raw);
            default
        }),
    }
}
