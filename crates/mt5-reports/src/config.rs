//! Configuration for the MT5 report tools

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::categorizer::{Classifier, RuleSpec};
use crate::constants;
use crate::error::ReportError;

// =============================================================================
// File-based Configuration (config.toml)
// =============================================================================

/// Configuration loaded from config.toml
#[derive(Debug, Deserialize)]
pub struct FileConfig {
    /// Named MT5 database targets
    pub databases: BTreeMap<String, DatabaseConfig>,
    /// Target used when a command does not name one
    #[serde(default)]
    pub default_database: Option<String>,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub report: ReportSettings,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

/// Connection details for one MT5 MySQL database
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Schema name (e.g. mt5gn_live)
    pub database: String,
}

fn default_port() -> u16 {
    constants::DEFAULT_MYSQL_PORT
}

impl DatabaseConfig {
    /// user@host:port/database, safe to log
    pub fn describe(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

/// Telegram bot credentials
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Chat used by `telegram test` and tasks created without --chat-id
    #[serde(default)]
    pub default_chat_id: Option<String>,
}

/// Report defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Logins at or below this are service accounts and never reported
    pub login_floor: u64,
    pub max_logins_per_query: usize,
    pub output_dir: PathBuf,
    /// Directory holding the configuration store
    pub data_dir: PathBuf,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            login_floor: constants::LOGIN_FLOOR,
            max_logins_per_query: constants::MAX_LOGINS_PER_QUERY,
            output_dir: PathBuf::from("./output"),
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// Extra classification rules, evaluated before the built-in ones
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl FileConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| {
            "Failed to parse config.toml. Check for:\n\
             - Missing required fields (databases.<name>.host, user, password, database)\n\
             - Invalid TOML syntax (missing quotes, brackets, etc.)\n\
             - Unknown categories in [[classifier.rules]]\n\n\
             See config.toml.example for the expected format."
        })
    }
}

// =============================================================================
// Runtime Configuration
// =============================================================================

/// Explicit context handed to every command; there is no global state
pub struct Config {
    pub databases: BTreeMap<String, DatabaseConfig>,
    pub default_database: String,
    pub telegram: Option<TelegramConfig>,
    pub login_floor: u64,
    pub max_logins_per_query: usize,
    pub output_dir: PathBuf,
    pub data_dir: PathBuf,
    pub classifier: Classifier,
}

impl Config {
    pub fn from_file(file_config: &FileConfig) -> Result<Self> {
        let Some(first) = file_config.databases.keys().next() else {
            bail!("config.toml must declare at least one [databases.<name>] section");
        };

        let default_database = file_config
            .default_database
            .clone()
            .unwrap_or_else(|| first.clone());
        if !file_config.databases.contains_key(&default_database) {
            bail!(
                "default_database '{}' is not declared under [databases]",
                default_database
            );
        }

        let settings = &file_config.report;
        if settings.max_logins_per_query == 0 {
            bail!("report.max_logins_per_query must be at least 1");
        }

        let classifier = Classifier::with_rules(&file_config.classifier.rules)
            .context("Invalid [[classifier.rules]] entry")?;
        debug!(rules = classifier.rule_count(), "classifier ready");

        Ok(Self {
            databases: file_config.databases.clone(),
            default_database,
            telegram: file_config.telegram.clone(),
            login_floor: settings.login_floor,
            max_logins_per_query: settings.max_logins_per_query,
            output_dir: settings.output_dir.clone(),
            data_dir: settings.data_dir.clone(),
            classifier,
        })
    }

    /// Resolve a database target by name, falling back to the default
    pub fn database(&self, name: Option<&str>) -> Result<(&str, &DatabaseConfig), ReportError> {
        let name = name.unwrap_or(&self.default_database);
        self.databases
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| {
                ReportError::Config(format!(
                    "unknown database '{}' (known: {})",
                    name,
                    self.databases.keys().cloned().collect::<Vec<_>>().join(", ")
                ))
            })
    }

    pub fn telegram(&self) -> Result<&TelegramConfig, ReportError> {
        self.telegram
            .as_ref()
            .ok_or_else(|| ReportError::Config("no [telegram] section in config.toml".to_string()))
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(constants::STORE_FILENAME)
    }
}

/// Mask a secret for logging, keeping a short prefix for recognition
/// ("123456:ABC-DEF..." becomes "1234****")
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() <= 8 {
        return "****".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{}****", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deals::Category;

    const SAMPLE: &str = r#"
default_database = "live"

[databases.live]
host = "10.0.0.5"
user = "report"
password = "s3cret"
database = "mt5gn_live"

[databases.demo]
host = "10.0.0.6"
port = 3307
user = "report"
password = "s3cret"
database = "mt5gn_demo"

[telegram]
bot_token = "123456789:AAE-example-token"
default_chat_id = "-1001234567890"

[report]
output_dir = "./reports"

[[classifier.rules]]
kind = "prefix"
value = "IB-"
category = "Promotion"
"#;

    #[test]
    fn test_parse_sample_config() {
        let file = FileConfig::parse(SAMPLE).unwrap();
        assert_eq!(file.databases.len(), 2);
        assert_eq!(file.databases["live"].port, constants::DEFAULT_MYSQL_PORT);
        assert_eq!(file.databases["demo"].port, 3307);
        assert_eq!(file.report.output_dir, PathBuf::from("./reports"));
        assert_eq!(file.report.login_floor, constants::LOGIN_FLOOR);
        assert_eq!(file.classifier.rules[0].category, Category::Promotion);
    }

    #[test]
    fn test_runtime_config_resolves_databases() {
        let file = FileConfig::parse(SAMPLE).unwrap();
        let config = Config::from_file(&file).unwrap();

        let (name, db) = config.database(None).unwrap();
        assert_eq!(name, "live");
        assert_eq!(db.describe(), "report@10.0.0.5:3306/mt5gn_live");

        let (name, _) = config.database(Some("demo")).unwrap();
        assert_eq!(name, "demo");
        assert!(matches!(
            config.database(Some("archive")),
            Err(ReportError::Config(_))
        ));
        assert!(config.telegram().is_ok());
    }

    #[test]
    fn test_missing_databases_is_rejected() {
        let file = FileConfig::parse("databases = {}\n").unwrap();
        assert!(Config::from_file(&file).is_err());
    }

    #[test]
    fn test_unknown_default_database_is_rejected() {
        let content = SAMPLE.replace("default_database = \"live\"", "default_database = \"x\"");
        let file = FileConfig::parse(&content).unwrap();
        assert!(Config::from_file(&file).is_err());
    }

    #[test]
    fn test_bad_rule_regex_fails_at_startup() {
        let content = format!(
            "{}\n[[classifier.rules]]\nkind = \"regex\"\nvalue = \"(open\"\ncategory = \"Credit\"\n",
            SAMPLE
        );
        let file = FileConfig::parse(&content).unwrap();
        assert!(Config::from_file(&file).is_err());
    }

    #[test]
    fn test_unknown_rule_category_fails_to_parse() {
        let content = SAMPLE.replace("category = \"Promotion\"", "category = \"Refund\"");
        assert!(FileConfig::parse(&content).is_err());
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("123456789:AAE-example-token"), "1234****");
        assert_eq!(mask_secret("short"), "****");
    }
}
