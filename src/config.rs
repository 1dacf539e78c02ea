use crate::error::{Error, Result};

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_TMDB_URL: &str = "https://api.themoviedb.org/3";
const DEFAULT_DB_PATH: &str = "chatdb";

/// Process settings. Secrets only ever come from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_url: String,
    pub openai_model: String,
    pub tmdb_api_key: String,
    pub tmdb_url: String,
    pub db_path: String,
}

impl Config {
    pub fn from_env() -> Result<Config> {
        Config::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Config> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("{} is not set", key)))
        };
        let optional = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());
        Ok(Config {
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_url: optional("OPENAI_API_URL", DEFAULT_OPENAI_URL),
            openai_model: optional("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
            tmdb_api_key: required("TMDB_API_KEY")?,
            tmdb_url: optional("TMDB_API_URL", DEFAULT_TMDB_URL),
            db_path: optional("FLIXCHAT_DB", DEFAULT_DB_PATH),
        })
    }
}
