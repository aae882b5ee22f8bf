use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for GenUI
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenUiConfig {
    /// Model identifiers per pipeline stage
    #[serde(default)]
    pub models: ModelsConfig,

    /// Chat-completion endpoint
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Retry and timeout policy of the model gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Refinement loop policy
    #[serde(default)]
    pub refinement: RefinementConfig,

    /// Prompt template overrides
    #[serde(default)]
    pub prompts: PromptsConfig,

    /// Record and artifact storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Background execution limits
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// HTTP binding
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Model identifier used by each stage of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsConfig {
    #[serde(default = "default_analysis_model")]
    pub requirement_analysis: String,

    #[serde(default = "default_analysis_model", alias = "webDSL")]
    pub ui_spec_synthesis: String,

    #[serde(default = "default_coding_model")]
    pub coding: String,

    #[serde(default = "default_analysis_model")]
    pub evaluation: String,

    #[serde(default = "default_validation_model")]
    pub validation: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            requirement_analysis: default_analysis_model(),
            ui_spec_synthesis: default_analysis_model(),
            coding: default_coding_model(),
            evaluation: default_analysis_model(),
            validation: default_validation_model(),
        }
    }
}

impl ModelsConfig {
    /// Same model for every stage; handy for local endpoints serving a single model.
    pub fn uniform(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            requirement_analysis: model.clone(),
            ui_spec_synthesis: model.clone(),
            coding: model.clone(),
            evaluation: model.clone(),
            validation: model,
        }
    }

    pub(crate) fn entries(&self) -> [(&'static str, &str); 5] {
        [
            ("requirementAnalysis", &self.requirement_analysis),
            ("uiSpecSynthesis", &self.ui_spec_synthesis),
            ("coding", &self.coding),
            ("evaluation", &self.evaluation),
            ("validation", &self.validation),
        ]
    }
}

/// OpenAI-compatible chat-completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL, e.g. "https://openrouter.ai/api/v1"
    #[serde(default = "default_provider_url")]
    pub url: String,

    /// Provider name for display purposes
    #[serde(default = "default_provider_name")]
    pub name: String,

    // Do not serialize secrets; allow deserialization from config/env only.
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: default_provider_url(),
            name: default_provider_name(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Attempts per gateway call (request + parse + validate), including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wall-clock limit for a single model call, in seconds
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Base delay between attempts; doubles after every failure
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            call_timeout_secs: default_call_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// When the refinement loop stops before reaching `max_iterations`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoppingRuleKind {
    /// Stop only once the target score is reached.
    TargetOnly,
    /// Also stop when an iteration improves the best score by less than `min_improvement`.
    TargetOrDiminishingReturns,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_target_score")]
    pub target_score: f64,

    #[serde(default = "default_stopping_rule")]
    pub stopping_rule: StoppingRuleKind,

    #[serde(default = "default_min_improvement")]
    pub min_improvement: f64,

    /// Refinement candidates generated in parallel per iteration
    #[serde(default = "default_candidates_per_iteration")]
    pub candidates_per_iteration: usize,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            target_score: default_target_score(),
            stopping_rule: default_stopping_rule(),
            min_improvement: default_min_improvement(),
            candidates_per_iteration: default_candidates_per_iteration(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptsConfig {
    /// Directory holding template overrides (requirements.md, blueprint.md, ...)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for records and blobs; `None` keeps everything in memory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Prefix of every blob key
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            namespace: default_namespace(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: default_max_concurrent_runs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_analysis_model() -> String {
    "qwen/qwen3-235b-a22b-2507".to_string()
}
fn default_coding_model() -> String {
    "moonshotai/kimi-k2-0905".to_string()
}
fn default_validation_model() -> String {
    "qwen/qwen3-235b-thinking-2507".to_string()
}
pub const DEFAULT_PROVIDER_URL: &str = "https://openrouter.ai/api/v1";

fn default_provider_url() -> String {
    DEFAULT_PROVIDER_URL.to_string()
}
fn default_provider_name() -> String {
    "openrouter".to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_call_timeout_secs() -> u64 {
    300
} // candidate generation routinely streams 20k tokens
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_max_iterations() -> u32 {
    5
}
fn default_target_score() -> f64 {
    92.0
}
fn default_stopping_rule() -> StoppingRuleKind {
    StoppingRuleKind::TargetOrDiminishingReturns
}
fn default_min_improvement() -> f64 {
    1.5
}
fn default_candidates_per_iteration() -> usize {
    1
}
fn default_namespace() -> String {
    "genui".to_string()
}
fn default_max_concurrent_runs() -> usize {
    4
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8787
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager with layered loading
pub struct ConfigManager {
    config: GenUiConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.genui.toml)
    /// 3. Sensible defaults
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading GenUI configuration...");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        Self::finish(config, config_path)
    }

    /// Load an explicit config file, still honouring `.env` and environment overrides.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::load_dotenv();
        let config = Self::read_toml_file(path)?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    /// Wrap an in-memory configuration (tests, embedding).
    pub fn from_config(config: GenUiConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    fn finish(config: GenUiConfig, config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        info!("Configuration loaded successfully");
        match &config_path {
            Some(path) => info!("  Config file: {}", path.display()),
            None => info!("  Config file: NONE (using defaults)"),
        }
        info!("  Provider: {} ({})", config.provider.name, config.provider.url);
        info!(
            "  Refinement: max {} iterations, target {}, rule {:?}",
            config.refinement.max_iterations,
            config.refinement.target_score,
            config.refinement.stopping_rule
        );
        if config.provider.api_key.is_none() {
            warn!("No provider API key configured (set OPENROUTER_API_KEY or GENUI_API_KEY)");
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load .env file if it exists
    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            } else {
                info!("Loaded .env file from current directory");
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".genui.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .genui.env: {}", e);
                } else {
                    info!("Loaded .genui.env from home directory");
                }
            }
        }
    }

    /// Find and load config file
    /// Search order:
    /// 1. ./.genui.toml (current directory)
    /// 2. ~/.genui/config.toml (user config)
    /// 3. Use defaults
    fn load_config_file() -> Result<(GenUiConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".genui.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".genui").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        info!("No config file found, using defaults");
        Ok((GenUiConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<GenUiConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut config: GenUiConfig) -> GenUiConfig {
        // Provider
        if let Ok(url) = std::env::var("GENUI_PROVIDER_URL") {
            config.provider.url = url;
        }
        if let Ok(key) = std::env::var("GENUI_API_KEY").or_else(|_| std::env::var("OPENROUTER_API_KEY"))
        {
            config.provider.api_key = Some(SecretString::from(key));
        }

        // Models
        if let Ok(model) = std::env::var("GENUI_MODEL") {
            config.models = ModelsConfig::uniform(model);
        }
        if let Ok(model) = std::env::var("GENUI_MODEL_REQUIREMENTS") {
            config.models.requirement_analysis = model;
        }
        if let Ok(model) = std::env::var("GENUI_MODEL_SPEC") {
            config.models.ui_spec_synthesis = model;
        }
        if let Ok(model) = std::env::var("GENUI_MODEL_CODING") {
            config.models.coding = model;
        }
        if let Ok(model) = std::env::var("GENUI_MODEL_EVALUATION") {
            config.models.evaluation = model;
        }
        if let Ok(model) = std::env::var("GENUI_MODEL_VALIDATION") {
            config.models.validation = model;
        }

        // Refinement
        if let Ok(iters) = std::env::var("GENUI_MAX_ITERATIONS") {
            if let Ok(n) = iters.parse() {
                config.refinement.max_iterations = n;
            }
        }
        if let Ok(target) = std::env::var("GENUI_TARGET_SCORE") {
            if let Ok(t) = target.parse() {
                config.refinement.target_score = t;
            }
        }

        // Storage and server
        if let Ok(dir) = std::env::var("GENUI_DATA_DIR") {
            config.storage.data_dir = Some(PathBuf::from(dir));
        }
        if let Ok(host) = std::env::var("GENUI_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("GENUI_PORT") {
            if let Ok(p) = port.parse() {
                config.server.port = p;
            }
        }

        // Logging
        if let Ok(level) = std::env::var("GENUI_LOG_LEVEL") {
            config.logging.level = level;
        }

        config
    }

    /// Validate configuration
    pub fn validate_config(config: &GenUiConfig) -> Result<(), ConfigError> {
        for (stage, model) in config.models.entries() {
            if model.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Model for stage '{}' must not be empty",
                    stage
                )));
            }
        }

        validate_provider_url(&config.provider.url)?;

        if config.gateway.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.max_attempts must be at least 1".to_string(),
            ));
        }

        let refinement = &config.refinement;
        if !(0.0..=100.0).contains(&refinement.target_score) {
            return Err(ConfigError::ValidationError(format!(
                "refinement.target_score must be within 0..=100, got {}",
                refinement.target_score
            )));
        }
        if !refinement.min_improvement.is_finite() || refinement.min_improvement < 0.0 {
            return Err(ConfigError::ValidationError(
                "refinement.min_improvement must be a non-negative number".to_string(),
            ));
        }
        if refinement.candidates_per_iteration == 0 {
            return Err(ConfigError::ValidationError(
                "refinement.candidates_per_iteration must be at least 1".to_string(),
            ));
        }

        validate_namespace(&config.storage.namespace)?;

        if config.scheduler.max_concurrent_runs == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.max_concurrent_runs must be at least 1".to_string(),
            ));
        }

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "json" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, json, compact",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &GenUiConfig {
        &self.config
    }

    pub fn into_config(self) -> GenUiConfig {
        self.config
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = GenUiConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}

pub(crate) fn validate_provider_url(url: &str) -> Result<(), ConfigError> {
    let trimmed = url.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://"))
        || trimmed.len() <= "https://".len()
    {
        return Err(ConfigError::ValidationError(format!(
            "Provider URL must be an http(s) URL, got '{}'",
            url
        )));
    }
    Ok(())
}

/// Namespaces prefix blob keys, so they follow the same segment rules.
fn validate_namespace(namespace: &str) -> Result<(), ConfigError> {
    let trimmed = namespace.trim_matches('/');
    let invalid = trimmed.is_empty()
        || trimmed.contains('\\')
        || trimmed
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if invalid {
        return Err(ConfigError::ValidationError(format!(
            "storage.namespace must be a relative path without empty, '.' or '..' segments, got '{}'",
            namespace
        )));
    }
    Ok(())
}
