//! Configuration management for ReviewDesk
//!
//! Loads and validates configuration from environment variables, with support
//! for different environments (development, staging, production). External
//! collaborators each get their own section so services receive only what they use.

use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::payments::HashAlgorithm;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Application environment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Parse environment from string
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

/// Marketplace API endpoints and pacing
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    /// Base URL of the feedbacks API (`/feedbacks` lives under it)
    pub feedbacks_url: String,

    /// Base URL of the buyer chat API (`/seller/chats`, `/seller/events`, `/seller/message`)
    pub chat_url: String,

    /// Upper bound on a single upstream request
    pub request_timeout: Duration,

    /// Items requested per page
    pub page_size: u32,

    /// Pause between consecutive page fetches of one run
    pub page_delay: Duration,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            feedbacks_url: "https://feedbacks-api.wildberries.ru/api/v1".to_string(),
            chat_url: "https://buyer-chat-api.wildberries.ru/api/v1".to_string(),
            request_timeout: Duration::from_secs(30),
            page_size: 50,
            page_delay: Duration::from_millis(350),
        }
    }
}

/// Chat-completion API used for drafting replies
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    /// Fallback system prompt when none is stored in settings
    pub default_prompt: String,
    pub request_timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1000,
            default_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "Ты представитель продавца на маркетплейсе. \
Напиши вежливый, короткий и конкретный ответ на отзыв покупателя. \
Не используй шаблонные фразы и не обещай того, что продавец не может выполнить.";

/// Payment gateway credentials
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub merchant_login: String,
    /// Secret for outbound redirect signatures
    pub password1: String,
    /// Secret for inbound result callbacks
    pub password2: String,
    pub is_test: bool,
    pub base_url: String,
    pub hash_algorithm: HashAlgorithm,
}

/// Archival job schedule and thresholds
#[derive(Debug, Clone)]
pub struct ArchivalConfig {
    /// Six-field cron expression (sec min hour day month weekday)
    pub schedule: String,
    pub age_days: i64,
    pub batch_size: i64,
}

impl Default for ArchivalConfig {
    fn default() -> Self {
        Self {
            schedule: "0 0 * * * *".to_string(),
            age_days: 7,
            batch_size: 100,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Current environment
    pub environment: Environment,

    /// Server port
    pub port: u16,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// CORS allowed origins
    pub cors_allowed_origins: Option<String>,

    /// Log level (RUST_LOG)
    pub log_level: String,

    /// JWT secret for token verification
    pub jwt_secret: String,

    /// Access token TTL in seconds (default: 900 = 15 minutes)
    pub jwt_access_token_ttl_seconds: i64,

    pub marketplace: MarketplaceConfig,
    pub completion: CompletionConfig,
    /// Absent until all gateway credentials are provided
    pub gateway: Option<GatewayConfig>,
    pub archival: ArchivalConfig,
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(format!("{} has an invalid value: '{}'", name, raw))),
        Err(_) => Ok(default),
    }
}

/// Like `parse_or`, but values below 1 are rejected
fn parse_positive<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + From<u8> + std::fmt::Display,
{
    let value = parse_or(name, default)?;
    if value < T::from(1) {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be at least 1, got {}",
            name, value
        )));
    }
    Ok(value)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .map(|s| Environment::from_str(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", 5u32)?;

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS").ok();

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) => secret,
            Err(_) if environment.is_production() => {
                return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string()))
            }
            Err(_) => "development-secret-change-in-production".to_string(),
        };

        let jwt_access_token_ttl_seconds = parse_or("JWT_ACCESS_TOKEN_TTL_SECONDS", 900i64)?;

        Ok(Config {
            database_url,
            environment,
            port,
            db_max_connections,
            cors_allowed_origins,
            log_level,
            jwt_secret,
            jwt_access_token_ttl_seconds,
            marketplace: Self::marketplace_from_env()?,
            completion: Self::completion_from_env()?,
            gateway: Self::gateway_from_env()?,
            archival: Self::archival_from_env()?,
        })
    }

    fn marketplace_from_env() -> Result<MarketplaceConfig, ConfigError> {
        let defaults = MarketplaceConfig::default();
        Ok(MarketplaceConfig {
            feedbacks_url: env::var("MARKETPLACE_FEEDBACKS_URL").unwrap_or(defaults.feedbacks_url),
            chat_url: env::var("MARKETPLACE_CHAT_URL").unwrap_or(defaults.chat_url),
            request_timeout: Duration::from_secs(parse_or("MARKETPLACE_TIMEOUT_SECS", 30u64)?),
            page_size: parse_positive("MARKETPLACE_PAGE_SIZE", defaults.page_size)?,
            page_delay: Duration::from_millis(parse_or("MARKETPLACE_PAGE_DELAY_MS", 350u64)?),
        })
    }

    fn completion_from_env() -> Result<CompletionConfig, ConfigError> {
        let defaults = CompletionConfig::default();
        Ok(CompletionConfig {
            base_url: env::var("COMPLETION_BASE_URL").unwrap_or(defaults.base_url),
            api_key: env::var("COMPLETION_API_KEY").ok().filter(|k| !k.is_empty()),
            model: env::var("COMPLETION_MODEL").unwrap_or(defaults.model),
            max_tokens: parse_or("COMPLETION_MAX_TOKENS", defaults.max_tokens)?,
            default_prompt: env::var("COMPLETION_DEFAULT_PROMPT").unwrap_or(defaults.default_prompt),
            request_timeout: Duration::from_secs(parse_or("COMPLETION_TIMEOUT_SECS", 60u64)?),
        })
    }

    /// Gateway settings are all-or-nothing: partial credentials are a startup error
    fn gateway_from_env() -> Result<Option<GatewayConfig>, ConfigError> {
        let login = env::var("GATEWAY_MERCHANT_LOGIN").ok();
        let password1 = env::var("GATEWAY_PASSWORD1").ok();
        let password2 = env::var("GATEWAY_PASSWORD2").ok();

        let (merchant_login, password1, password2) = match (login, password1, password2) {
            (None, None, None) => return Ok(None),
            (Some(l), Some(p1), Some(p2)) => (l, p1, p2),
            (l, p1, _) => {
                let missing = if l.is_none() {
                    "GATEWAY_MERCHANT_LOGIN"
                } else if p1.is_none() {
                    "GATEWAY_PASSWORD1"
                } else {
                    "GATEWAY_PASSWORD2"
                };
                return Err(ConfigError::MissingEnvVar(missing.to_string()));
            }
        };

        let hash_algorithm = match env::var("GATEWAY_HASH_ALGORITHM") {
            Ok(raw) => HashAlgorithm::parse(&raw).ok_or_else(|| {
                ConfigError::InvalidValue(format!(
                    "Invalid hash algorithm: '{}'. Expected: sha256, sha384, or sha512",
                    raw
                ))
            })?,
            Err(_) => HashAlgorithm::default(),
        };

        Ok(Some(GatewayConfig {
            merchant_login,
            password1,
            password2,
            is_test: parse_or("GATEWAY_IS_TEST", false)?,
            base_url: env::var("GATEWAY_URL")
                .unwrap_or_else(|_| "https://auth.robokassa.ru/Merchant/Index.aspx".to_string()),
            hash_algorithm,
        }))
    }

    fn archival_from_env() -> Result<ArchivalConfig, ConfigError> {
        let defaults = ArchivalConfig::default();
        Ok(ArchivalConfig {
            schedule: env::var("ARCHIVE_SCHEDULE").unwrap_or(defaults.schedule),
            age_days: parse_or("ARCHIVE_AGE_DAYS", defaults.age_days)?,
            batch_size: parse_positive("ARCHIVE_BATCH_SIZE", defaults.batch_size)?,
        })
    }

    /// Get database URL (useful for logging masked version)
    pub fn database_url_masked(&self) -> String {
        // Mask password in database URL for logging
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let prefix = &self.database_url[..colon_pos + 1];
                let suffix = &self.database_url[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        self.database_url.clone()
    }
}
