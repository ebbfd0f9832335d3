//! Layered configuration.
//!
//! Sources, later overriding earlier:
//! 1. Built-in defaults
//! 2. XDG config file (`~/.config/allsomojo/config.toml` on Linux)
//! 3. `./allsomojo.toml`
//! 4. Environment variables prefixed `ALLSOMOJO__`, with `__` between
//!    section and key (e.g. `ALLSOMOJO__GITHUB__TOKEN`)
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "sqlite:///srv/allsomojo/catalog.db?mode=rwc"
//!
//! [github]
//! token = "ghp_..."
//! requests_per_minute = 30
//!
//! [search]
//! terms = ["mojo"]
//! window_days = 20
//!
//! [git]
//! repos_base_dir = "/srv/allsomojo/repos"
//! max_git_io = 5
//!
//! [stats]
//! window_days = 30
//! ```

use std::path::PathBuf;

use chrono::NaiveDate;
use config::{Config as ConfigBuilder, ConfigError, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::github::DEFAULT_API_URL;

const APP_NAME: &str = "allsomojo";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub github: GitHubSettings,
    pub search: SearchSettings,
    pub git: GitSettings,
    pub stats: StatsSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// `sqlite://` or `postgres://` URL. Defaults to a SQLite file in the
    /// XDG state directory.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubSettings {
    /// API token. Unauthenticated search works but has a far smaller quota.
    pub token: Option<String>,
    pub api_url: String,
    /// Proactive pacing; 0 disables the limiter.
    pub requests_per_minute: u32,
    pub request_timeout_secs: u64,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            token: None,
            api_url: DEFAULT_API_URL.to_string(),
            requests_per_minute: 30,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Search-term variants; each is combined with every fork qualifier.
    pub terms: Vec<String>,
    /// Code-search queries.
    pub code_queries: Vec<String>,
    pub window_days: u32,
    /// Days subtracted from the newest `updated_at` when resuming.
    pub watermark_backoff_days: u32,
    /// First creation date searched when the catalog is empty.
    pub epoch: NaiveDate,
    pub per_page: u32,
    pub max_results: u32,
    pub throttle_pause_secs: u64,
    pub max_throttle_retries: usize,
    pub quota_margin_secs: u64,
    /// Bounded channel between the searcher and the catalog writer.
    pub channel_capacity: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            terms: vec!["mojo in:name,description,readme,topics".to_string()],
            code_queries: vec!["extension:mojo".to_string(), "extension:🔥".to_string()],
            window_days: 20,
            watermark_backoff_days: 1,
            epoch: NaiveDate::from_ymd_opt(2023, 5, 1).unwrap_or_default(),
            per_page: 100,
            max_results: 1000,
            throttle_pause_secs: 30 * 60,
            max_throttle_retries: 3,
            quota_margin_secs: 1,
            channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitSettings {
    /// Where mirrors live. Defaults to `<XDG data dir>/repos`.
    pub repos_base_dir: Option<PathBuf>,
    pub max_git_io: usize,
    pub stagger_ms: u64,
    pub pull_timeout_secs: u64,
    pub clone_timeout_secs: u64,
    pub clone_retries: u32,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            repos_base_dir: None,
            max_git_io: 5,
            stagger_ms: 250,
            pull_timeout_secs: 400,
            clone_timeout_secs: 600,
            clone_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatsSettings {
    /// Worker count; 0 means two thirds of the available CPUs.
    pub max_process: usize,
    pub window_days: u32,
    pub log_timeout_secs: u64,
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            max_process: 0,
            window_days: 30,
            log_timeout_secs: 120,
        }
    }
}

impl Settings {
    /// Load settings from every layered source.
    ///
    /// A broken source is logged and the built-in defaults are used instead,
    /// so a stray config file never prevents a run.
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = Self::default_config_path()
            && path.exists()
        {
            tracing::debug!(path = %path.display(), "loading config file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        let local = PathBuf::from(format!("{APP_NAME}.toml"));
        if local.exists() {
            tracing::debug!(path = %local.display(), "loading config file");
            builder =
                builder.add_source(File::from(local).format(FileFormat::Toml).required(false));
        }

        builder = builder.add_source(Self::environment());

        let loaded = builder.build().and_then(|c| c.try_deserialize());
        match loaded {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load configuration, using defaults");
                Settings::default()
            }
        }
    }

    /// Parse settings from a TOML string layered over the defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn environment() -> Environment {
        Environment::with_prefix("ALLSOMOJO")
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("search.terms")
            .with_list_parse_key("search.code_queries")
            .try_parsing(true)
    }

    /// The configured database URL, or a SQLite file in the state directory.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            let path = Self::default_state_dir()?.join(format!("{APP_NAME}.db"));
            Some(crate::db::sqlite_url(&path))
        })
    }

    /// The configured mirror directory, or `<data dir>/repos`.
    pub fn repos_base_dir(&self) -> Option<PathBuf> {
        self.git
            .repos_base_dir
            .clone()
            .or_else(|| Self::default_data_dir().map(|d| d.join("repos")))
    }

    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn default_data_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// `$XDG_STATE_HOME/allsomojo` on Linux, the data directory elsewhere.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.search.window_days, 20);
        assert_eq!(
            settings.search.epoch,
            NaiveDate::from_ymd_opt(2023, 5, 1).unwrap()
        );
        assert_eq!(settings.search.max_results, 1000);
        assert_eq!(settings.search.max_throttle_retries, 3);
        assert_eq!(settings.git.max_git_io, 5);
        assert_eq!(settings.git.pull_timeout_secs, 400);
        assert_eq!(settings.git.clone_timeout_secs, 600);
        assert_eq!(settings.git.clone_retries, 2);
        assert_eq!(settings.stats.window_days, 30);
        assert_eq!(settings.github.requests_per_minute, 30);
        assert!(settings.github.token.is_none());
    }

    #[test]
    fn partial_toml_overrides_only_named_keys() {
        let settings = Settings::from_toml(
            r#"
            [git]
            max_git_io = 2
            repos_base_dir = "/srv/mirrors"

            [search]
            epoch = "2024-01-01"
            terms = ["mojo in:name", "modular max"]
            "#,
        )
        .expect("valid toml");

        assert_eq!(settings.git.max_git_io, 2);
        assert_eq!(settings.git.stagger_ms, 250);
        assert_eq!(
            settings.repos_base_dir(),
            Some(PathBuf::from("/srv/mirrors"))
        );
        assert_eq!(
            settings.search.epoch,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert_eq!(settings.search.terms.len(), 2);
        assert_eq!(settings.search.window_days, 20);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(Settings::from_toml("[git\nmax_git_io = 2").is_err());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let settings = Settings::from_toml(
            r#"
            [stats]
            window_days = 7
            sheet_id = "ignored"
            "#,
        )
        .expect("valid toml");
        assert_eq!(settings.stats.window_days, 7);
    }

    #[test]
    fn database_url_defaults_to_state_dir() {
        let url = Settings::default()
            .database_url()
            .expect("home directory should resolve");
        assert!(url.starts_with("sqlite://"));
        assert!(url.contains("allsomojo.db"));
        assert!(url.ends_with("?mode=rwc"));
    }

    #[test]
    fn database_url_respects_configured_value() {
        let settings = Settings::from_toml(
            r#"
            [database]
            url = "postgres://localhost/allsomojo"
            "#,
        )
        .expect("valid toml");
        assert_eq!(
            settings.database_url(),
            Some("postgres://localhost/allsomojo".to_string())
        );
    }
}
