//! Feature flag evaluation.
//!
//! `Flags` is the only thing components see: a boolean lookup that answers
//! `false` whenever the provider cannot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

mod ofrep;

pub use ofrep::OfrepFlagProvider;

/// Random delay before materializing each order.
pub const THROTTLE_ENABLED: &str = "throttleEnabled";
/// Read-through cache in front of the product store.
pub const CACHE_ENABLED: &str = "redisCacheEnabled";

/// Errors that can occur while evaluating a flag.
#[derive(Debug, thiserror::Error)]
pub enum FlagError {
    #[error("Flag not found: {0}")]
    NotFound(String),

    #[error("Flag '{flag}' is not a boolean: {value}")]
    TypeMismatch { flag: String, value: String },

    #[error("Flag provider error: {0}")]
    Provider(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Source of flag values.
#[async_trait]
pub trait FlagProvider: Send + Sync {
    async fn evaluate_bool(&self, flag: &str) -> Result<bool, FlagError>;
}

/// Boolean flag lookups with default-false semantics.
#[derive(Clone)]
pub struct Flags {
    provider: Arc<dyn FlagProvider>,
}

impl Flags {
    pub fn new(provider: Arc<dyn FlagProvider>) -> Self {
        Self { provider }
    }

    /// Every flag off.
    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledFlagProvider))
    }

    /// Evaluate `flag`; any failure reads as `false`.
    pub async fn enabled(&self, flag: &str) -> bool {
        match self.provider.evaluate_bool(flag).await {
            Ok(value) => value,
            Err(e) => {
                debug!(flag = %flag, error = %e, "Flag evaluation failed, defaulting to false");
                false
            }
        }
    }

    pub async fn throttle_enabled(&self) -> bool {
        self.enabled(THROTTLE_ENABLED).await
    }

    pub async fn cache_enabled(&self) -> bool {
        self.enabled(CACHE_ENABLED).await
    }
}

impl std::fmt::Debug for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flags").finish_non_exhaustive()
    }
}

/// Answers `false` for every flag.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledFlagProvider;

#[async_trait]
impl FlagProvider for DisabledFlagProvider {
    async fn evaluate_bool(&self, _flag: &str) -> Result<bool, FlagError> {
        Ok(false)
    }
}

/// Flags from a fixed map. Names match case-insensitively, since
/// configuration keys arrive lowercased.
#[derive(Debug, Default)]
pub struct StaticFlagProvider {
    values: RwLock<HashMap<String, bool>>,
}

impl StaticFlagProvider {
    pub fn new(values: impl IntoIterator<Item = (String, bool)>) -> Self {
        Self {
            values: RwLock::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.to_lowercase(), v))
                    .collect(),
            ),
        }
    }

    pub async fn set(&self, flag: &str, value: bool) {
        self.values.write().await.insert(flag.to_lowercase(), value);
    }
}

#[async_trait]
impl FlagProvider for StaticFlagProvider {
    async fn evaluate_bool(&self, flag: &str) -> Result<bool, FlagError> {
        self.values
            .read()
            .await
            .get(&flag.to_lowercase())
            .copied()
            .ok_or_else(|| FlagError::NotFound(flag.to_string()))
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Flag provider discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagProviderType {
    /// Values from `flags.values`.
    #[default]
    Static,
    /// Remote evaluation over OFREP.
    Ofrep,
    /// Everything off.
    Disabled,
}

/// Feature flag configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlagsConfig {
    pub provider: FlagProviderType,
    /// OFREP service base URL.
    pub url: String,
    /// Per-evaluation HTTP timeout.
    pub timeout_ms: u64,
    /// Static flag values.
    pub values: HashMap<String, bool>,
}

impl Default for FlagsConfig {
    fn default() -> Self {
        Self {
            provider: FlagProviderType::Static,
            url: "http://localhost:8016".to_string(),
            timeout_ms: 500,
            values: HashMap::new(),
        }
    }
}

/// Build `Flags` from configuration.
pub fn init_flags(config: &FlagsConfig) -> Result<Flags, FlagError> {
    let provider: Arc<dyn FlagProvider> = match config.provider {
        FlagProviderType::Static => Arc::new(StaticFlagProvider::new(config.values.clone())),
        FlagProviderType::Ofrep => Arc::new(OfrepFlagProvider::new(
            &config.url,
            Duration::from_millis(config.timeout_ms),
        )?),
        FlagProviderType::Disabled => Arc::new(DisabledFlagProvider),
    };

    info!(provider = ?config.provider, "Feature flags initialized");

    Ok(Flags::new(provider))
}
