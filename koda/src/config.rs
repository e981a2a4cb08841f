//! Layered server configuration.
//!
//! Sources, lowest priority first:
//!
//! 1. the defaults embedded from `config/default.toml`
//! 2. optional `config/default` and `config/local` files in the working directory
//! 3. `KODA_<SECTION>__<KEY>` environment variables
//! 4. the plain variables kept for existing deployments: `CORS_ALLOWED_ORIGINS`
//!    (comma separated), `AWS_REGION`, `NOVA_MODEL_ID`, `SESSION_TIMEOUT_MINUTES`
//!
//! ```rust
//! use koda::config::AppConfig;
//!
//! let config = AppConfig::from_toml_str("[router]\ntie_break = \"earliest_mention\"")
//!     .expect("config should load");
//!
//! assert_eq!(config.inference.max_tokens, 4096);
//! assert_eq!(config.server.cors_allowed_origins, vec!["http://localhost:8501"]);
//! config.validate().expect("defaults should validate");
//! ```

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::time::Duration;

use ::config::builder::DefaultState;
use ::config::{Config, ConfigBuilder, Environment, File, FileFormat};
use kagents::RouteTieBreak;
use kcommon::SamplingParams;
use kprovider::RetryPolicy;
use serde::Deserialize;

pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

pub const CORS_ORIGINS_VAR: &str = "CORS_ALLOWED_ORIGINS";

const PLAIN_OVERRIDES: &[(&str, &str)] = &[
    ("AWS_REGION", "provider.region"),
    ("NOVA_MODEL_ID", "provider.model_id"),
    ("SESSION_TIMEOUT_MINUTES", "session.idle_timeout_minutes"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigErrorKind {
    Load,
    Invalid,
}

impl ConfigErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Invalid => "invalid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub message: String,
}

impl ConfigError {
    pub fn load(message: impl Into<String>) -> Self {
        Self {
            kind: ConfigErrorKind::Load,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            kind: ConfigErrorKind::Invalid,
            message: message.into(),
        }
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} config: {}", self.kind.as_str(), self.message)
    }
}

impl Error for ConfigError {}

impl From<::config::ConfigError> for ConfigError {
    fn from(value: ::config::ConfigError) -> Self {
        Self::load(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub inference: InferenceConfig,
    pub retry: RetryConfig,
    pub session: SessionConfig,
    pub router: RouterConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub cors_allowed_origins: Vec<String>,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind.parse().map_err(|_| {
            ConfigError::invalid(format!("server.bind '{}' is not a socket address", self.bind))
        })
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    pub model_id: String,
    pub region: String,
    /// Replaces the regional endpoint, e.g. for a local mock.
    #[serde(default)]
    pub endpoint: Option<String>,
    pub read_timeout_secs: u64,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ProviderConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("model_id", &self.model_id)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct InferenceConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl InferenceConfig {
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams::new(self.max_tokens, self.temperature, self.top_p)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::with_retries(self.max_retries)
            .with_initial_backoff(Duration::from_millis(self.initial_backoff_ms));
        policy.max_backoff = Duration::from_millis(self.max_backoff_ms);
        policy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    pub idle_timeout_minutes: u64,
    pub max_turns: usize,
    pub sweep_interval_secs: u64,
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_minutes * 60)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouterConfig {
    pub tie_break: String,
}

impl RouterConfig {
    pub fn tie_break(&self) -> Result<RouteTieBreak, ConfigError> {
        RouteTieBreak::parse(&self.tie_break).ok_or_else(|| {
            ConfigError::invalid(format!(
                "router.tie_break '{}' must be 'declaration_order' or 'earliest_mention'",
                self.tie_break
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ObservabilityConfig {
    pub metrics: bool,
}

impl AppConfig {
    /// Loads every source from the process environment and working directory.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = defaults()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("KODA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        build(builder, |name| std::env::var(name).ok())
    }

    /// Embedded defaults overlaid with a TOML document. No files or environment.
    pub fn from_toml_str(overlay: &str) -> Result<Self, ConfigError> {
        build(
            defaults().add_source(File::from_str(overlay, FileFormat::Toml)),
            |_| None,
        )
    }

    /// Rejects settings the server must not start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let origins = &self.server.cors_allowed_origins;
        if origins.is_empty() {
            return Err(ConfigError::invalid(
                "CORS_ALLOWED_ORIGINS is empty; set it to a comma-separated list of allowed origins (e.g. https://koda.example.com)",
            ));
        }
        if origins.iter().any(|origin| origin == "*") {
            return Err(ConfigError::invalid(
                "CORS_ALLOWED_ORIGINS must not contain the wildcard '*'; list explicit origins instead",
            ));
        }
        if let Some(origin) = origins
            .iter()
            .find(|origin| !origin.starts_with("http://") && !origin.starts_with("https://"))
        {
            return Err(ConfigError::invalid(format!(
                "CORS origin '{origin}' must start with http:// or https://"
            )));
        }

        self.server.bind_addr()?;
        self.router.tie_break()?;

        if self.provider.model_id.trim().is_empty() {
            return Err(ConfigError::invalid("provider.model_id must not be empty"));
        }
        if self.provider.region.trim().is_empty() && self.provider.endpoint.is_none() {
            return Err(ConfigError::invalid(
                "provider.region must be set when no provider.endpoint is configured",
            ));
        }
        if self.provider.read_timeout_secs == 0 {
            return Err(ConfigError::invalid("provider.read_timeout_secs must be greater than zero"));
        }

        if self.inference.max_tokens == 0 {
            return Err(ConfigError::invalid("inference.max_tokens must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.inference.temperature) {
            return Err(ConfigError::invalid("inference.temperature must be within 0.0..=1.0"));
        }
        if !(self.inference.top_p > 0.0 && self.inference.top_p <= 1.0) {
            return Err(ConfigError::invalid("inference.top_p must be within (0.0, 1.0]"));
        }

        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(ConfigError::invalid(
                "retry.max_backoff_ms must not be smaller than retry.initial_backoff_ms",
            ));
        }

        if self.session.idle_timeout_minutes == 0 {
            return Err(ConfigError::invalid("session.idle_timeout_minutes must be greater than zero"));
        }
        if self.session.sweep_interval_secs == 0 {
            return Err(ConfigError::invalid("session.sweep_interval_secs must be greater than zero"));
        }
        if self.session.max_turns < kchat::MIN_MAX_TURNS {
            return Err(ConfigError::invalid(format!(
                "session.max_turns must be at least {}",
                kchat::MIN_MAX_TURNS
            )));
        }

        Ok(())
    }
}

/// Splits a comma-separated origin list, dropping blank entries.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn defaults() -> ConfigBuilder<DefaultState> {
    Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
}

fn build<F>(mut builder: ConfigBuilder<DefaultState>, lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    for &(var, key) in PLAIN_OVERRIDES {
        builder = builder.set_override_option(key, lookup(var))?;
    }
    if let Some(raw) = lookup(CORS_ORIGINS_VAR) {
        builder = builder.set_override("server.cors_allowed_origins", parse_origins(&raw))?;
    }

    Ok(builder.build()?.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn with_vars(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        build(defaults(), |name| vars.get(name).cloned()).expect("config should load")
    }

    #[test]
    fn embedded_defaults_match_documented_values() {
        let config = AppConfig::from_toml_str("").expect("defaults");

        assert_eq!(config.server.bind, "0.0.0.0:8000");
        assert_eq!(config.provider.model_id, "us.amazon.nova-2-lite-v1:0");
        assert_eq!(config.provider.region, "us-east-1");
        assert_eq!(config.provider.read_timeout(), Duration::from_secs(3600));
        assert_eq!(config.provider.endpoint, None);
        assert_eq!(config.inference.sampling(), SamplingParams::default());
        assert_eq!(config.retry.policy().max_retries(), 3);
        assert_eq!(config.retry.policy().initial_backoff, Duration::from_secs(1));
        assert_eq!(config.session.idle_timeout(), Duration::from_secs(30 * 60));
        assert_eq!(config.session.max_turns, 100);
        assert_eq!(
            config.router.tie_break().expect("tie break"),
            RouteTieBreak::DeclarationOrder
        );
        assert!(config.observability.metrics);
        config.validate().expect("defaults validate");
    }

    #[test]
    fn toml_overlay_replaces_only_named_keys() {
        let config = AppConfig::from_toml_str(
            r#"
            [retry]
            max_retries = 5

            [provider]
            endpoint = "http://127.0.0.1:9000"
            "#,
        )
        .expect("overlay");

        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_backoff_ms, 1000);
        assert_eq!(config.provider.endpoint.as_deref(), Some("http://127.0.0.1:9000"));
        assert_eq!(config.provider.region, "us-east-1");
    }

    #[test]
    fn plain_cors_variable_overrides_the_origin_list() {
        let config = with_vars(&[(
            CORS_ORIGINS_VAR,
            "https://koda.example.com, https://staging.koda.example.com ,",
        )]);

        assert_eq!(
            config.server.cors_allowed_origins,
            vec!["https://koda.example.com", "https://staging.koda.example.com"]
        );
        config.validate().expect("explicit origins validate");
    }

    #[test]
    fn legacy_variables_override_provider_and_session() {
        let config = with_vars(&[
            ("AWS_REGION", "eu-central-1"),
            ("NOVA_MODEL_ID", "global.amazon.nova-2-lite-v1:0"),
            ("SESSION_TIMEOUT_MINUTES", "5"),
        ]);

        assert_eq!(config.provider.region, "eu-central-1");
        assert_eq!(config.provider.model_id, "global.amazon.nova-2-lite-v1:0");
        assert_eq!(config.session.idle_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn empty_cors_list_fails_validation() {
        let config = with_vars(&[(CORS_ORIGINS_VAR, " , ")]);

        let error = config.validate().expect_err("empty list must fail");
        assert_eq!(error.kind, ConfigErrorKind::Invalid);
        assert!(error.message.contains("CORS_ALLOWED_ORIGINS is empty"));
    }

    #[test]
    fn wildcard_origin_fails_validation() {
        let config = with_vars(&[(CORS_ORIGINS_VAR, "https://koda.example.com,*")]);

        let error = config.validate().expect_err("wildcard must fail");
        assert!(error.message.contains("must not contain the wildcard '*'"));
    }

    #[test]
    fn zero_timeouts_fail_validation() {
        let config = AppConfig::from_toml_str("[session]\nidle_timeout_minutes = 0").expect("load");
        assert!(config.validate().is_err());

        let config = AppConfig::from_toml_str("[provider]\nread_timeout_secs = 0").expect("load");
        assert!(config.validate().is_err());
    }

    #[test]
    fn history_bound_must_hold_a_full_exchange() {
        let config = AppConfig::from_toml_str("[session]\nmax_turns = 1").expect("load");
        let error = config.validate().expect_err("single turn bound");
        assert!(error.message.contains("session.max_turns"));

        let config = AppConfig::from_toml_str("[session]\nmax_turns = 2").expect("load");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_tie_break_fails_validation() {
        let config = AppConfig::from_toml_str("[router]\ntie_break = \"random\"").expect("load");

        let error = config.validate().expect_err("unknown tie break");
        assert!(error.message.contains("router.tie_break"));
    }

    #[test]
    fn provider_debug_redacts_api_key() {
        let config = AppConfig::from_toml_str("[provider]\napi_key = \"secret-token\"").expect("load");

        let rendered = format!("{:?}", config.provider);
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }
}
