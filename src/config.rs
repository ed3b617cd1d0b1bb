use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::HeaderValue;

use crate::error::{AppError, Result};

const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const FIREFOX_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0";

/// Where the outbound `User-Agent` header comes from. Custom values are
/// checked once when parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserAgent {
    Chrome,
    Firefox,
    Custom(HeaderValue),
}

impl UserAgent {
    pub fn header_value(&self) -> HeaderValue {
        match self {
            UserAgent::Chrome => HeaderValue::from_static(CHROME_UA),
            UserAgent::Firefox => HeaderValue::from_static(FIREFOX_UA),
            UserAgent::Custom(ua) => ua.clone(),
        }
    }
}

impl FromStr for UserAgent {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        match value.to_lowercase().as_str() {
            "" => Err(AppError::ConfigError("USER_AGENT must not be empty".to_string())),
            "chrome" => Ok(UserAgent::Chrome),
            "firefox" => Ok(UserAgent::Firefox),
            _ => HeaderValue::from_str(value)
                .map(UserAgent::Custom)
                .map_err(|e| AppError::ConfigError(format!("Invalid USER_AGENT: {}", e))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    /// Whole-request timeout for one provider call.
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub database_path: PathBuf,
    pub fetch_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub cooldown: Duration,
    pub fetch_deadline: Option<Duration>,
    pub user_agent: UserAgent,
    pub top_keywords: usize,
    /// `None` when no API key is configured; comparisons then fail with
    /// `embedding_unavailable`.
    pub embedding: Option<EmbeddingConfig>,
    pub request_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = get("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port: u16 = parse_or(get("PORT"), "PORT", 3000)?;
        let ip = IpAddr::from_str(&host)
            .map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;

        let database_path = get("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data/seo_optimizer.db"));

        let max_retries: u32 = parse_or(get("FETCH_MAX_RETRIES"), "FETCH_MAX_RETRIES", 3)?;
        if max_retries == 0 {
            return Err(AppError::ConfigError(
                "FETCH_MAX_RETRIES must be at least 1".to_string(),
            ));
        }

        let top_keywords: usize = parse_or(get("TOP_KEYWORDS"), "TOP_KEYWORDS", 5)?;
        if top_keywords == 0 {
            return Err(AppError::ConfigError(
                "TOP_KEYWORDS must be at least 1".to_string(),
            ));
        }

        let fetch_deadline = match get("FETCH_DEADLINE_SECS") {
            Some(raw) => Some(Duration::from_secs(parse_value(&raw, "FETCH_DEADLINE_SECS")?)),
            None => None,
        };

        let user_agent = match get("USER_AGENT") {
            Some(raw) => raw.parse()?,
            None => UserAgent::Chrome,
        };

        let embedding_timeout = Duration::from_secs(parse_or(
            get("EMBEDDING_TIMEOUT_SECS"),
            "EMBEDDING_TIMEOUT_SECS",
            30,
        )?);
        if embedding_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "EMBEDDING_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }

        let embedding = get("EMBEDDING_API_KEY")
            .or_else(|| get("OPENROUTER_API_KEY"))
            .map(|api_key| EmbeddingConfig {
                api_url: get("EMBEDDING_API_URL")
                    .unwrap_or_else(|| "https://openrouter.ai/api/v1".to_string()),
                api_key,
                model: get("EMBEDDING_MODEL")
                    .unwrap_or_else(|| "openai/text-embedding-3-small".to_string()),
                timeout: embedding_timeout,
            });

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            database_path,
            fetch_timeout: Duration::from_secs(parse_or(
                get("FETCH_TIMEOUT_SECS"),
                "FETCH_TIMEOUT_SECS",
                10,
            )?),
            max_retries,
            backoff_base: Duration::from_millis(parse_or(
                get("FETCH_BACKOFF_BASE_MS"),
                "FETCH_BACKOFF_BASE_MS",
                1000,
            )?),
            cooldown: Duration::from_millis(parse_or(
                get("FETCH_COOLDOWN_MS"),
                "FETCH_COOLDOWN_MS",
                1500,
            )?),
            fetch_deadline,
            user_agent,
            top_keywords,
            embedding,
            request_timeout: Duration::from_secs(parse_or(
                get("REQUEST_TIMEOUT_SECS"),
                "REQUEST_TIMEOUT_SECS",
                90,
            )?),
        })
    }
}

fn parse_value<T>(raw: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| AppError::ConfigError(format!("Invalid {}: {}", key, e)))
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => parse_value(&raw, key),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.server_addr.to_string(), "127.0.0.1:3000");
        assert_eq!(config.database_path, PathBuf::from("data/seo_optimizer.db"));
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_base, Duration::from_secs(1));
        assert_eq!(config.cooldown, Duration::from_millis(1500));
        assert_eq!(config.fetch_deadline, None);
        assert_eq!(config.user_agent, UserAgent::Chrome);
        assert_eq!(config.top_keywords, 5);
        assert!(config.embedding.is_none());
    }

    #[test]
    fn embedding_key_falls_back_to_openrouter() {
        let config = config_from(&[("OPENROUTER_API_KEY", "sk-test")]).unwrap();
        let embedding = config.embedding.unwrap();
        assert_eq!(embedding.api_key, "sk-test");
        assert_eq!(embedding.api_url, "https://openrouter.ai/api/v1");
        assert_eq!(embedding.timeout, Duration::from_secs(30));

        let config = config_from(&[
            ("EMBEDDING_API_KEY", "sk-test"),
            ("EMBEDDING_TIMEOUT_SECS", "7"),
        ])
        .unwrap();
        assert_eq!(config.embedding.unwrap().timeout, Duration::from_secs(7));
        assert!(config_from(&[("EMBEDDING_TIMEOUT_SECS", "0")]).is_err());
    }

    #[test]
    fn rejects_zero_retries_and_bad_port() {
        let err = config_from(&[("FETCH_MAX_RETRIES", "0")]).unwrap_err();
        assert_eq!(err.kind(), "config");

        let err = config_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("Invalid PORT"));
    }

    #[test]
    fn user_agent_sources() {
        assert_eq!("Firefox".parse::<UserAgent>().unwrap(), UserAgent::Firefox);
        let custom: UserAgent = "my-bot/1.0".parse().unwrap();
        assert_eq!(custom.header_value(), "my-bot/1.0");
        assert!("  ".parse::<UserAgent>().is_err());
    }

    #[test]
    fn user_agent_with_control_chars_is_rejected() {
        let err = "crawl\u{1}er/1.0".parse::<UserAgent>().unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("Invalid USER_AGENT"));

        let err = config_from(&[("USER_AGENT", "bot\nInjected: yes")]).unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
