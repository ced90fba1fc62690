use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "pricewatch";
pub const MAX_HISTORY_ENTRIES: usize = 50;
pub const NOTIFICATION_CAP_RANGE: std::ops::RangeInclusive<usize> = 50..=100;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub ledger: LedgerConfig,
    pub llm: LlmConfig,
    pub scraper: ScraperConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// File path for the json backend, database URL or path for sqlite.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the alarm fires.
    pub alarm_period_minutes: u64,
    /// Minimum age of the last check before an item is checked again.
    pub check_interval_minutes: u64,
    pub max_concurrent_checks: usize,
    pub check_on_startup: bool,
    /// Upper bound for a single tick, in seconds.
    pub job_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub max_history_entries: usize,
    pub max_notifications: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Gemini,
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<String>,
    pub model: String,
    /// Overrides the provider's public endpoint (proxies, compatible APIs).
    pub base_url: Option<String>,
    pub request_timeout: u64,
    pub retry_attempts: usize,
    pub retry_delay_ms: u64,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub request_timeout: u64,
    pub max_page_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub enabled: bool,
    pub discord: DiscordConfig,
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub webhook_url: Option<String>,
    pub username: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
    pub from_name: String,
    pub to_address: Option<String>,
    pub use_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Daily rolling log files are written here when set.
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Json,
            path: "pricewatch-data.json".to_string(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            alarm_period_minutes: 30,
            check_interval_minutes: 360,
            max_concurrent_checks: 2,
            check_on_startup: true,
            job_timeout: 600,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_history_entries: MAX_HISTORY_ENTRIES,
            max_notifications: 100,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Gemini,
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            base_url: None,
            request_timeout: 60,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            temperature: 0.0,
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
            request_timeout: 30,
            max_page_chars: 20_000,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            discord: DiscordConfig::default(),
            email: EmailConfig::default(),
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            username: "Pricewatch".to_string(),
            avatar_url: None,
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: 587,
            username: None,
            password: None,
            from_address: None,
            from_name: "Pricewatch".to_string(),
            to_address: None,
            use_tls: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9001,
        }
    }
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some() && self.to_address.is_some()
    }
}

impl SchedulerConfig {
    pub fn alarm_period(&self) -> Duration {
        Duration::from_secs(self.alarm_period_minutes * 60)
    }

    pub fn check_interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.check_interval_minutes as i64)
    }
}

impl AppConfig {
    /// Layer defaults, an optional config file and `PRICEWATCH__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        builder = match path {
            Some(path) => builder.add_source(File::from(path)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let s = builder
            .add_source(
                Environment::with_prefix("PRICEWATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Provider-conventional key variables, when none was configured explicitly
        if config.llm.api_key.is_none() {
            let var = match config.llm.provider {
                LlmProvider::Gemini => "GEMINI_API_KEY",
                LlmProvider::Openai => "OPENAI_API_KEY",
            };
            config.llm.api_key = env::var(var).ok().filter(|k| !k.is_empty());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.backend != StorageBackend::Memory && self.storage.path.trim().is_empty() {
            return Err(ConfigError::Message("Storage path must not be empty".into()));
        }

        if self.scheduler.alarm_period_minutes == 0 {
            return Err(ConfigError::Message("Scheduler alarm_period_minutes must be greater than 0".into()));
        }

        if self.scheduler.max_concurrent_checks == 0 {
            return Err(ConfigError::Message("Scheduler max_concurrent_checks must be greater than 0".into()));
        }

        if self.scheduler.job_timeout == 0 {
            return Err(ConfigError::Message("Scheduler job_timeout must be greater than 0".into()));
        }

        if !(1..=MAX_HISTORY_ENTRIES).contains(&self.ledger.max_history_entries) {
            return Err(ConfigError::Message(format!(
                "Ledger max_history_entries must be between 1 and {}",
                MAX_HISTORY_ENTRIES
            )));
        }

        if !NOTIFICATION_CAP_RANGE.contains(&self.ledger.max_notifications) {
            return Err(ConfigError::Message(format!(
                "Ledger max_notifications must be between {} and {}",
                NOTIFICATION_CAP_RANGE.start(),
                NOTIFICATION_CAP_RANGE.end()
            )));
        }

        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Message("LLM model must not be empty".into()));
        }

        if let Some(base_url) = &self.llm.base_url {
            if Url::parse(base_url).is_err() {
                return Err(ConfigError::Message("Invalid LLM base URL format".into()));
            }
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Message("LLM temperature must be between 0 and 2".into()));
        }

        if self.scraper.max_page_chars < 1000 {
            return Err(ConfigError::Message("Scraper max_page_chars must be at least 1000".into()));
        }

        if let Some(webhook_url) = &self.notifications.discord.webhook_url {
            if Url::parse(webhook_url).is_err() {
                return Err(ConfigError::Message("Invalid Discord webhook URL format".into()));
            }
        }

        if self.notifications.email.smtp_port == 0 {
            return Err(ConfigError::Message("SMTP port must be greater than 0".into()));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ledger.max_history_entries, 50);
        assert_eq!(config.ledger.max_notifications, 100);
    }

    #[test]
    fn test_config_validation_zero_alarm_period() {
        let mut config = AppConfig::default();
        config.scheduler.alarm_period_minutes = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("alarm_period_minutes must be greater than 0"));
    }

    #[test]
    fn test_config_validation_notification_cap() {
        let mut config = AppConfig::default();
        config.ledger.max_notifications = 0;
        assert!(config.validate().is_err());

        config.ledger.max_notifications = 49;
        assert!(config.validate().is_err());

        config.ledger.max_notifications = 1000;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("between 50 and 100"));

        config.ledger.max_notifications = 50;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_history_cap() {
        let mut config = AppConfig::default();
        config.ledger.max_history_entries = 0;
        assert!(config.validate().is_err());

        config.ledger.max_history_entries = 1_000_000;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("between 1 and 50"));

        config.ledger.max_history_entries = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_base_url() {
        let mut config = AppConfig::default();
        config.llm.base_url = Some("not a url".to_string());

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid LLM base URL"));
    }

    #[test]
    fn test_config_validation_invalid_webhook() {
        let mut config = AppConfig::default();
        config.notifications.discord.webhook_url = Some("nope".to_string());

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Discord webhook"));
    }

    #[test]
    fn test_memory_backend_allows_empty_path() {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.storage.path = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scheduler_durations() {
        let scheduler = SchedulerConfig {
            alarm_period_minutes: 15,
            check_interval_minutes: 120,
            ..SchedulerConfig::default()
        };

        assert_eq!(scheduler.alarm_period(), Duration::from_secs(900));
        assert_eq!(scheduler.check_interval(), chrono::Duration::hours(2));
    }

    #[test]
    fn test_email_is_configured() {
        let mut email = EmailConfig::default();
        assert!(!email.is_configured());

        email.smtp_host = Some("smtp.example.com".to_string());
        email.from_address = Some("watcher@example.com".to_string());
        email.to_address = Some("me@example.com".to_string());
        assert!(email.is_configured());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[storage]
backend = "sqlite"
path = "sqlite://prices.db"

[scheduler]
alarm_period_minutes = 10

[llm]
provider = "openai"
api_key = "sk-test"
model = "gpt-4o-mini"
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.scheduler.alarm_period_minutes, 10);
        // Untouched keys keep their defaults
        assert_eq!(config.scheduler.check_interval_minutes, 360);
        assert_eq!(config.llm.provider, LlmProvider::Openai);
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_to_toml_contains_sections() {
        let rendered = AppConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[scheduler]"));
        assert!(rendered.contains("[notifications.discord]"));
    }
}
