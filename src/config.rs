use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_directory")]
    pub directory: String,
    #[serde(default = "default_log_filename")]
    pub filename: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Http,
    Fixture,
    Webdriver,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_backend")]
    pub backend: Backend,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Environment variable holding the session cookie value, if any.
    #[serde(default = "default_cookie_env")]
    pub cookie_env: String,
    #[serde(default)]
    pub fixture_glob: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_first_wait_secs")]
    pub first_wait_secs: u64,
    #[serde(default = "default_reveal_wait_secs")]
    pub reveal_wait_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_min_item_delay_ms")]
    pub min_item_delay_ms: u64,
    #[serde(default = "default_max_item_delay_ms")]
    pub max_item_delay_ms: u64,
    #[serde(default = "default_min_page_delay_ms")]
    pub min_page_delay_ms: u64,
    #[serde(default = "default_max_page_delay_ms")]
    pub max_page_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_emergency_dir")]
    pub emergency_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_json_dir")]
    pub json_dir: String,
    #[serde(default)]
    pub csv: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub start_path: String,
    pub database: String,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_generator_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
    #[serde(default = "default_topics_file")]
    pub topics_file: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LogConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default = "default_bundles_target")]
    pub bundles: TargetConfig,

    #[serde(default = "default_keys_target")]
    pub keys: TargetConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,
}

// Default implementations
impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_directory(),
            filename: default_log_filename(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            base_url: default_base_url(),
            webdriver_url: default_webdriver_url(),
            headless: default_headless(),
            cookie_name: default_cookie_name(),
            cookie_env: default_cookie_env(),
            fixture_glob: String::new(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            first_wait_secs: default_first_wait_secs(),
            reveal_wait_secs: default_reveal_wait_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            min_item_delay_ms: default_min_item_delay_ms(),
            max_item_delay_ms: default_max_item_delay_ms(),
            min_page_delay_ms: default_min_page_delay_ms(),
            max_page_delay_ms: default_max_page_delay_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_retries: default_store_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            emergency_dir: default_emergency_dir(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            json_dir: default_json_dir(),
            csv: false,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_retries: default_generator_max_retries(),
            base_delay_secs: default_base_delay_secs(),
            cache_file: default_cache_file(),
            topics_file: default_topics_file(),
            output_dir: default_output_dir(),
            language: default_language(),
            difficulty: default_difficulty(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LogConfig::default(),
            session: SessionConfig::default(),
            timing: TimingConfig::default(),
            store: StoreConfig::default(),
            export: ExportConfig::default(),
            bundles: default_bundles_target(),
            keys: default_keys_target(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::FileRead)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;

        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Reads the session cookie from the configured environment variable.
    /// An unset or empty variable means "no cookie".
    pub fn session_cookie(&self) -> Option<String> {
        if self.session.cookie_env.is_empty() {
            return None;
        }
        std::env::var(&self.session.cookie_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }

    fn validate(&self) -> Result<()> {
        let session = &self.session;
        if session.base_url.is_empty() {
            return Err(ConfigError::MissingField("session.base_url".to_string()).into());
        }
        if session.backend != Backend::Fixture && !session.base_url.starts_with("http") {
            return Err(ConfigError::InvalidValue(format!(
                "session.base_url must start with http(s): {}",
                session.base_url
            ))
            .into());
        }

        if session.backend == Backend::Fixture && session.fixture_glob.is_empty() {
            return Err(ConfigError::MissingField("session.fixture_glob".to_string()).into());
        }

        if session.backend == Backend::Webdriver && session.webdriver_url.is_empty() {
            return Err(ConfigError::MissingField("session.webdriver_url".to_string()).into());
        }

        let timing = &self.timing;
        if timing.first_wait_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "timing.first_wait_secs must be greater than 0".to_string(),
            )
            .into());
        }

        if timing.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "timing.poll_interval_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if timing.min_item_delay_ms > timing.max_item_delay_ms {
            return Err(ConfigError::InvalidValue(format!(
                "timing.min_item_delay_ms ({}) exceeds timing.max_item_delay_ms ({})",
                timing.min_item_delay_ms, timing.max_item_delay_ms
            ))
            .into());
        }

        if timing.min_page_delay_ms > timing.max_page_delay_ms {
            return Err(ConfigError::InvalidValue(format!(
                "timing.min_page_delay_ms ({}) exceeds timing.max_page_delay_ms ({})",
                timing.min_page_delay_ms, timing.max_page_delay_ms
            ))
            .into());
        }

        if self.store.max_retries == 0 {
            return Err(ConfigError::InvalidValue(
                "store.max_retries must be greater than 0".to_string(),
            )
            .into());
        }

        for (name, target) in [("bundles", &self.bundles), ("keys", &self.keys)] {
            if target.database.is_empty() {
                return Err(ConfigError::MissingField(format!("{}.database", name)).into());
            }
            if target.max_items == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "{}.max_items must be greater than 0",
                    name
                ))
                .into());
            }
        }

        if self.generator.max_retries == 0 {
            return Err(ConfigError::InvalidValue(
                "generator.max_retries must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

fn default_backend() -> Backend {
    Backend::Http
}

fn default_base_url() -> String {
    "https://www.humblebundle.com".to_string()
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_cookie_name() -> String {
    "_simpleauth_sess".to_string()
}

fn default_cookie_env() -> String {
    "HUMBLE_SESSION_COOKIE".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36".to_string()
}

fn default_first_wait_secs() -> u64 {
    20
}

fn default_reveal_wait_secs() -> u64 {
    5
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_min_item_delay_ms() -> u64 {
    100
}

fn default_max_item_delay_ms() -> u64 {
    500
}

fn default_min_page_delay_ms() -> u64 {
    2000
}

fn default_max_page_delay_ms() -> u64 {
    5000
}

fn default_store_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_emergency_dir() -> String {
    "emergency".to_string()
}

fn default_json_dir() -> String {
    "json_data".to_string()
}

fn default_max_items() -> usize {
    2000
}

fn default_bundles_target() -> TargetConfig {
    TargetConfig {
        start_path: "/bundles".to_string(),
        database: "humble_bundles.db".to_string(),
        max_items: default_max_items(),
    }
}

fn default_keys_target() -> TargetConfig {
    TargetConfig {
        start_path: "/home/keys".to_string(),
        database: "humble_keys.db".to_string(),
        max_items: default_max_items(),
    }
}

fn default_api_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model() -> String {
    "models/gemini-1.5-flash".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_generator_max_retries() -> u32 {
    5
}

fn default_base_delay_secs() -> u64 {
    30
}

fn default_cache_file() -> String {
    "api_cache.json".to_string()
}

fn default_topics_file() -> String {
    "topics.txt".to_string()
}

fn default_output_dir() -> String {
    "generated_lessons".to_string()
}

fn default_language() -> String {
    "English".to_string()
}

fn default_difficulty() -> String {
    "intermediate".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> String {
    "logs".to_string()
}

fn default_log_filename() -> String {
    "scraper.log".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.session.backend, Backend::Http);
        assert_eq!(config.store.max_retries, 3);
        assert_eq!(config.keys.start_path, "/home/keys");
        assert_eq!(config.bundles.database, "humble_bundles.db");
    }

    #[test]
    fn fixture_backend_requires_glob() {
        let err = Config::from_toml("[session]\nbackend = \"fixture\"\n").unwrap_err();
        assert!(matches!(
            err,
            AppError::Config(ConfigError::MissingField(ref f)) if f == "session.fixture_glob"
        ));
    }

    #[test]
    fn rejects_inverted_delay_bounds() {
        let err = Config::from_toml("[timing]\nmin_item_delay_ms = 900\nmax_item_delay_ms = 10\n")
            .unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn rejects_zero_store_retries() {
        let err = Config::from_toml("[store]\nmax_retries = 0\n").unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn target_sections_override_defaults() {
        let config = Config::from_toml(
            "[keys]\nstart_path = \"/vault\"\ndatabase = \"vault.db\"\nmax_items = 10\n",
        )
        .unwrap();
        assert_eq!(config.keys.start_path, "/vault");
        assert_eq!(config.keys.max_items, 10);
    }
}
