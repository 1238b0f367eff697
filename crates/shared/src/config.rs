use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

pub const DEFAULT_HN_API_BASE: &str = "https://hacker-news.firebaseio.com/v0";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://hn_stories.db";

#[derive(Debug, Clone)]
pub struct Config {
    pub hn_api_base: String,
    pub max_stories: usize,
    pub keywords: Vec<String>,
    pub min_score: i64,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub database_url: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Try to load .env from multiple locations
        Self::try_load_dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. `from_env` passes the
    /// process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let keywords = get("KEYWORDS")
            .map(|raw| parse_keywords(&raw))
            .unwrap_or_default();

        Ok(Self {
            hn_api_base: get("HN_API_BASE").unwrap_or_else(|| DEFAULT_HN_API_BASE.to_string()),
            max_stories: parse_var("HN_MAX_STORIES", get("HN_MAX_STORIES"), 100)?,
            keywords,
            min_score: parse_var("SCRAPE_MIN_SCORE", get("SCRAPE_MIN_SCORE"), 10)?,
            openai_api_key: get("OPENAI_API_KEY"),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            port: parse_var("PORT", get("PORT"), 8000)?,
        })
    }

    /// The scraper cannot run without a completion key; the API server never needs one.
    pub fn require_openai_key(&self) -> Result<&str> {
        self.openai_api_key.as_deref().context(
            "OPENAI_API_KEY not found.\n\n\
            To fix this, create ~/.config/hn-classifier/.env with:\n  \
            OPENAI_API_KEY=your_key_here\n  \
            KEYWORDS=ai,llm,machine learning\n\n\
            Get an OpenAI API key from: https://platform.openai.com/api-keys",
        )
    }

    fn try_load_dotenv() {
        // Try locations in order of preference:

        // 1. Current directory (for development)
        if dotenvy::dotenv().is_ok() {
            return;
        }

        // 2. ~/.config/hn-classifier/.env (standard config location)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("hn-classifier").join(".env");
            if config_path.exists() && dotenvy::from_path(&config_path).is_ok() {
                return;
            }
        }

        // 3. ~/.env (home directory)
        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".env");
            if home_path.exists() {
                let _ = dotenvy::from_path(&home_path);
            }
        }

        // If none found, that's okay - environment variables might be set system-wide
    }
}

/// Split a comma-separated keyword list, lowercasing and dropping blanks.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

fn parse_var<T>(key: &str, value: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.hn_api_base, DEFAULT_HN_API_BASE);
        assert_eq!(config.max_stories, 100);
        assert_eq!(config.min_score, 10);
        assert_eq!(config.port, 8000);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.openai_model, DEFAULT_OPENAI_MODEL);
        assert!(config.keywords.is_empty());
        assert!(config.openai_api_key.is_none());
        assert!(config.require_openai_key().is_err());
    }

    #[test]
    fn keywords_are_trimmed_and_lowercased() {
        let config = config_from(&[("KEYWORDS", " AI, LLM ,, Machine Learning ")]).unwrap();
        assert_eq!(config.keywords, vec!["ai", "llm", "machine learning"]);
    }

    #[test]
    fn numeric_overrides_are_parsed() {
        let config = config_from(&[
            ("HN_MAX_STORIES", "25"),
            ("SCRAPE_MIN_SCORE", "42"),
            ("PORT", "9090"),
            ("OPENAI_API_KEY", "sk-test"),
        ])
        .unwrap();
        assert_eq!(config.max_stories, 25);
        assert_eq!(config.min_score, 42);
        assert_eq!(config.port, 9090);
        assert_eq!(config.require_openai_key().unwrap(), "sk-test");
    }

    #[test]
    fn invalid_number_names_the_variable() {
        let err = config_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
