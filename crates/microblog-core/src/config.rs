//! Centralized configuration for the microblog core.
//!
//! Static tuning lives in constant structs; runtime settings that differ per
//! deployment are read from the environment into [`BlogConfig`].

use crate::error::{BlogError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Primary store tuning.
pub struct StoreConfig;

impl StoreConfig {
    pub const BUSY_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_DATABASE_FILE: &'static str = "app.db";
    pub const SQLITE_URL_PREFIX: &'static str = "sqlite:///";
}

/// Search index tuning.
pub struct SearchConfig;

impl SearchConfig {
    pub const FTS5_TOKENIZER: &'static str = "unicode61 remove_diacritics 1";
    pub const DEFAULT_PER_PAGE: u32 = 10;
    pub const MAX_PER_PAGE: u32 = 100;
}

/// Environment variable names read by [`BlogConfig::from_env`].
pub struct EnvVars;

impl EnvVars {
    pub const DATABASE_URL: &'static str = "DATABASE_URL";
    pub const SEARCH_INDEX_PATH: &'static str = "SEARCH_INDEX_PATH";
    pub const POSTS_PER_PAGE: &'static str = "POSTS_PER_PAGE";
}

/// Runtime configuration for a microblog instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlogConfig {
    /// Path of the primary SQLite database.
    pub database_path: PathBuf,
    /// Path of the FTS5 search index database. `None` runs without an index.
    pub search_index_path: Option<PathBuf>,
    /// Page size used for timelines when the caller does not pick one.
    pub posts_per_page: u32,
}

impl Default for BlogConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(StoreConfig::DEFAULT_DATABASE_FILE),
            search_index_path: None,
            posts_per_page: SearchConfig::DEFAULT_PER_PAGE,
        }
    }
}

impl BlogConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = non_empty(lookup(EnvVars::DATABASE_URL)) {
            let path = url
                .strip_prefix(StoreConfig::SQLITE_URL_PREFIX)
                .unwrap_or(&url);
            config.database_path = PathBuf::from(path);
        }

        config.search_index_path = non_empty(lookup(EnvVars::SEARCH_INDEX_PATH)).map(PathBuf::from);

        if let Some(raw) = non_empty(lookup(EnvVars::POSTS_PER_PAGE)) {
            config.posts_per_page = match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(BlogError::Config {
                        message: format!(
                            "{} must be a positive integer, got {:?}",
                            EnvVars::POSTS_PER_PAGE,
                            raw
                        ),
                    })
                }
            };
        }

        Ok(config)
    }

    /// True when a search index backend should be opened.
    pub fn search_enabled(&self) -> bool {
        self.search_index_path.is_some()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
