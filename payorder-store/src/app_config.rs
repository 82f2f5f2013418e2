use payorder_core::pii::Masked;
use payorder_core::OrderResult;
use payorder_order::SlotSecrets;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub signature: SignatureConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: Masked<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct SignatureConfig {
    pub slot_secrets: Vec<Masked<String>>,
}

impl SignatureConfig {
    pub fn slot_secrets(&self) -> OrderResult<SlotSecrets> {
        let secrets: Vec<String> = self
            .slot_secrets
            .iter()
            .map(|s| s.expose().clone())
            .collect();
        SlotSecrets::try_from(secrets)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_lookup_limit")]
    pub lookup_limit: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            lookup_limit: default_lookup_limit(),
        }
    }
}

fn default_lookup_limit() -> i64 {
    10
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `PAYORDER__DATABASE__URL=postgres://...`
            .add_source(
                config::Environment::with_prefix("PAYORDER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        s.try_deserialize()
    }
}
