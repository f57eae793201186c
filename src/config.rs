//! Configuration management
//!
//! One validated configuration structure supplied at startup: assessment thresholds,
//! retry policy, rate-limit window, storage quota, upstream and server settings.
//! Loaded from a TOML file, then overridden from the environment.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable holding the upstream service credential
pub const API_KEY_ENV: &str = "LINGO_API_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream AI service settings
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Proficiency assessment thresholds
    #[serde(default)]
    pub assessment: AssessmentConfig,
    /// Client-side retry policy
    #[serde(default)]
    pub retry: RetryConfig,
    /// Backend admission gate
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Local persistence
    #[serde(default)]
    pub storage: StorageConfig,
    /// Backend HTTP server
    #[serde(default)]
    pub server: ServerConfig,
    /// Practice client
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Credential is read from the environment only, never written to disk
    #[serde(skip)]
    pub api_key: Option<String>,
    /// OpenAI-compatible base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Exchanges forwarded to the upstream service with each request
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_history_window() -> usize {
    10
}

fn default_max_tokens() -> u32 {
    600
}

fn default_upstream_timeout() -> u64 {
    60
}

fn default_system_prompt() -> String {
    "You are a patient Nepali language tutor. Reply in simple Nepali with an English gloss, \
     and point out mistakes gently."
        .to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            history_window: default_history_window(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_upstream_timeout(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// Thresholds and constants for one proficiency tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierRule {
    /// Success rate must exceed this value
    pub min_rate: f64,
    /// Complexity of the current message must exceed this value
    pub min_complexity: f64,
    pub level: u8,
    pub confidence: f64,
}

impl TierRule {
    pub const fn new(min_rate: f64, min_complexity: f64, level: u8, confidence: f64) -> Self {
        Self { min_rate, min_complexity, level, confidence }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierTable {
    pub advanced: TierRule,
    pub intermediate: TierRule,
    pub elementary: TierRule,
    pub beginner: TierRule,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            advanced: TierRule::new(0.85, 5.0, 5, 0.9),
            intermediate: TierRule::new(0.7, 3.0, 3, 0.75),
            elementary: TierRule::new(0.5, 1.0, 2, 0.6),
            beginner: TierRule::new(0.0, 0.0, 1, 0.5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentConfig {
    /// Counted interactions required before a profile is produced
    #[serde(default = "default_min_interactions")]
    pub min_interactions: u32,
    /// Inclusive code point ranges of the target script
    #[serde(default = "default_script_ranges")]
    pub script_ranges: Vec<[u32; 2]>,
    #[serde(default)]
    pub tiers: TierTable,
}

fn default_min_interactions() -> u32 {
    3
}

fn default_script_ranges() -> Vec<[u32; 2]> {
    // Devanagari
    vec![[0x0900, 0x097F]]
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            min_interactions: default_min_interactions(),
            script_ranges: default_script_ranges(),
            tiers: TierTable::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
    /// Only these statuses trigger a retry
    #[serde(default = "default_retryable")]
    pub retryable_statuses: Vec<u16>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_retryable() -> Vec<u16> {
    vec![408, 500, 502, 503, 504]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_multiplier(),
            retryable_statuses: default_retryable(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_max_requests() -> u32 {
    20
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Largest single serialized value accepted, in megabytes
    #[serde(default = "default_quota_mb")]
    pub quota_mb: u64,
    /// Total budget across every stored key, in megabytes
    #[serde(default = "default_capacity_mb")]
    pub capacity_mb: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Exchanges kept in local history
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Overrides the platform data directory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_quota_mb() -> u64 {
    5
}

fn default_capacity_mb() -> u64 {
    5
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_max_history() -> usize {
    100
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            quota_mb: default_quota_mb(),
            capacity_mb: default_capacity_mb(),
            debounce_ms: default_debounce_ms(),
            max_history: default_max_history(),
            data_dir: None,
        }
    }
}

impl StorageConfig {
    pub fn quota_bytes(&self) -> usize {
        (self.quota_mb as usize).saturating_mul(1024 * 1024)
    }

    pub fn capacity_bytes(&self) -> usize {
        (self.capacity_mb as usize).saturating_mul(1024 * 1024)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_max_message_chars() -> usize {
    2000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8787/api/chat".to_string()
}

fn default_max_input_chars() -> usize {
    1000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

impl Config {
    /// Load configuration from file, apply environment overrides and validate
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            toml::from_str(&contents).context("Failed to parse config file")?
        } else {
            let config = Config::default();
            config.save()?;
            config
        };

        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = config_path()?;
        let parent = config_path.parent().context("Config path has no parent")?;

        std::fs::create_dir_all(parent).context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.upstream.api_key = Some(key.trim().to_string());
        }
        if let Some(url) = lookup("LINGO_UPSTREAM_URL") {
            self.upstream.base_url = url;
        }
        if let Some(model) = lookup("LINGO_MODEL") {
            self.upstream.model = model;
        }
        if let Some(v) = lookup("LINGO_RATE_LIMIT_WINDOW_MS") {
            self.rate_limit.window_ms = parse_var("LINGO_RATE_LIMIT_WINDOW_MS", &v)?;
        }
        if let Some(v) = lookup("LINGO_RATE_LIMIT_MAX") {
            self.rate_limit.max_requests = parse_var("LINGO_RATE_LIMIT_MAX", &v)?;
        }
        if let Some(v) = lookup("LINGO_MAX_RETRIES") {
            self.retry.max_retries = parse_var("LINGO_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("LINGO_RETRY_INITIAL_DELAY_MS") {
            self.retry.initial_delay_ms = parse_var("LINGO_RETRY_INITIAL_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("LINGO_RETRY_MAX_DELAY_MS") {
            self.retry.max_delay_ms = parse_var("LINGO_RETRY_MAX_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("LINGO_STORAGE_QUOTA_MB") {
            self.storage.quota_mb = parse_var("LINGO_STORAGE_QUOTA_MB", &v)?;
        }
        if let Some(v) = lookup("LINGO_STORAGE_CAPACITY_MB") {
            self.storage.capacity_mb = parse_var("LINGO_STORAGE_CAPACITY_MB", &v)?;
        }
        Ok(())
    }

    /// Reject configurations the assessment and resilience layers cannot run with
    pub fn validate(&self) -> Result<()> {
        let t = &self.assessment.tiers;
        let ordered = [t.advanced, t.intermediate, t.elementary, t.beginner];
        for pair in ordered.windows(2) {
            if pair[0].min_rate <= pair[1].min_rate
                || pair[0].min_complexity <= pair[1].min_complexity
                || pair[0].level <= pair[1].level
            {
                bail!("Tier thresholds must be strictly descending from advanced to beginner");
            }
        }
        for rule in ordered {
            if !(0.0..=1.0).contains(&rule.confidence) {
                bail!("Tier confidence {} is outside [0, 1]", rule.confidence);
            }
            if !(1..=5).contains(&rule.level) {
                bail!("Tier level {} is outside 1..=5", rule.level);
            }
        }
        if self.assessment.min_interactions == 0 {
            bail!("assessment.min_interactions must be at least 1");
        }
        if self.assessment.script_ranges.iter().any(|[lo, hi]| lo > hi) {
            bail!("assessment.script_ranges contains an inverted range");
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            bail!("retry.backoff_multiplier must be a finite number >= 1.0");
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            bail!("retry.initial_delay_ms must not exceed retry.max_delay_ms");
        }
        if self.rate_limit.window_ms == 0 || self.rate_limit.max_requests == 0 {
            bail!("rate_limit.window_ms and rate_limit.max_requests must be positive");
        }
        if self.storage.quota_mb == 0 {
            bail!("storage.quota_mb must be positive");
        }
        if self.storage.capacity_mb < self.storage.quota_mb {
            bail!("storage.capacity_mb must be at least storage.quota_mb");
        }
        if self.upstream.history_window == 0 {
            bail!("upstream.history_window must be positive");
        }
        Ok(())
    }

    /// The upstream credential; its absence is fatal for the backend
    pub fn require_api_key(&self) -> Result<&str> {
        match self.upstream.api_key.as_deref() {
            Some(key) => Ok(key),
            None => bail!(
                "Upstream service credential missing: set {} before starting the server",
                API_KEY_ENV
            ),
        }
    }

    /// Directory holding persisted learner state
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => data_dir(),
        }
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {} ({})", name, value, e))
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "lingo-coach", "lingo-coach")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "lingo-coach", "lingo-coach")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}

/// Show current configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("Configuration ({})", config_path()?.display());
    println!();
    println!("  upstream:     {} ({})", config.upstream.base_url, config.upstream.model);
    println!(
        "  credential:   {}",
        if config.upstream.api_key.is_some() { "set" } else { "missing" }
    );
    println!(
        "  retry:        {} retries, {}ms -> {}ms (x{})",
        config.retry.max_retries,
        config.retry.initial_delay_ms,
        config.retry.max_delay_ms,
        config.retry.backoff_multiplier
    );
    println!(
        "  rate limit:   {} requests / {}ms",
        config.rate_limit.max_requests, config.rate_limit.window_ms
    );
    println!(
        "  storage:      {} MB per value, {} MB total, {}ms debounce, {} exchanges kept",
        config.storage.quota_mb,
        config.storage.capacity_mb,
        config.storage.debounce_ms,
        config.storage.max_history
    );
    println!("  server:       {}:{}", config.server.host, config.server.port);
    Ok(())
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}
