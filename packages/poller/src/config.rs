//! Runtime configuration.
//!
//! Command-line overrides, the process environment, and an optional
//! JSON config file are folded into one [`Config`] value at startup.
//! Precedence, highest first: overrides, environment, config file,
//! defaults.
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |---|---|
//! | `WAZE_API_URL` | Upstream feed URL |
//! | `UPDATE_INTERVAL_SECONDS` | Seconds between cycles (default 120) |
//! | `FETCH_TIMEOUT_SECONDS` | Upstream request timeout (default 30) |
//! | `GIST_ID` / `GITHUB_TOKEN` | Select the gist backend (both required) |
//! | `GIST_FILENAME` | File inside the gist (default `incidents_master.json`) |
//! | `MONGODB_URI` | Select the `MongoDB` backend |
//! | `MONGODB_DATABASE` | Database when the URI names none |
//! | `INCIDENTS_MASTER_PATH` | Local master file |
//! | `INCIDENTS_LATEST_PATH` | Local latest file |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use traffic_incidents_storage::{GistSettings, LocalFileSettings, MongoSettings, StorageSettings};

/// Config file read when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default seconds between poll cycles.
pub const DEFAULT_INTERVAL_SECS: u64 = 120;

/// Default upstream request timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Errors that can occur while assembling the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No upstream feed URL was configured anywhere.
    #[error("No API URL configured (set WAZE_API_URL, --url, or waze_api_url in {DEFAULT_CONFIG_FILE})")]
    MissingFeedUrl,

    /// A numeric setting did not parse or was zero.
    #[error("Invalid value for {name}: {value:?}")]
    InvalidNumber {
        /// Setting name.
        name: String,
        /// Offending value.
        value: String,
    },

    /// The config file exists but is not valid JSON.
    #[error("Invalid config file {path}: {source}")]
    ConfigFile {
        /// Config file path.
        path: PathBuf,
        /// Parse error.
        source: serde_json::Error,
    },

    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Values that take precedence over everything else, typically from
/// command-line flags.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Upstream feed URL.
    pub feed_url: Option<String>,
    /// Seconds between cycles.
    pub interval_secs: Option<u64>,
    /// Explicit config file. A missing explicit file is an error.
    pub config_file: Option<PathBuf>,
    /// Local master file.
    pub master_path: Option<PathBuf>,
    /// Local latest file.
    pub latest_path: Option<PathBuf>,
}

/// Keys recognized in the JSON config file.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    waze_api_url: Option<String>,
    update_interval_seconds: Option<u64>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream feed URL, if configured.
    pub feed_url: Option<String>,
    /// Time waited between cycles.
    pub interval: Duration,
    /// Bound on a single upstream request.
    pub fetch_timeout: Duration,
    /// Backend selection and credentials.
    pub storage: StorageSettings,
}

impl Config {
    /// Resolves configuration from `overrides` and the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a numeric setting is invalid or the
    /// config file cannot be read.
    pub fn load(overrides: &Overrides) -> Result<Self, ConfigError> {
        Self::resolve(overrides, |name| std::env::var(name).ok())
    }

    /// Resolves configuration using `env` in place of the process
    /// environment. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a numeric setting is invalid or the
    /// config file cannot be read.
    pub fn resolve<F>(overrides: &Overrides, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let file = read_config_file(overrides.config_file.as_deref())?;

        let feed_url = overrides
            .feed_url
            .clone()
            .or_else(|| env("WAZE_API_URL"))
            .or(file.waze_api_url)
            .filter(|url| !url.is_empty());

        let interval_secs = match overrides.interval_secs {
            Some(secs) => secs,
            None => match env("UPDATE_INTERVAL_SECONDS") {
                Some(raw) => parse_secs("UPDATE_INTERVAL_SECONDS", &raw)?,
                None => file.update_interval_seconds.unwrap_or(DEFAULT_INTERVAL_SECS),
            },
        };
        if interval_secs == 0 {
            return Err(ConfigError::InvalidNumber {
                name: "update interval".to_string(),
                value: "0".to_string(),
            });
        }

        let fetch_timeout_secs = env("FETCH_TIMEOUT_SECONDS")
            .map(|raw| parse_secs("FETCH_TIMEOUT_SECONDS", &raw))
            .transpose()?
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);

        let defaults = LocalFileSettings::default();
        let local = LocalFileSettings {
            master_path: overrides
                .master_path
                .clone()
                .or_else(|| env("INCIDENTS_MASTER_PATH").map(PathBuf::from))
                .unwrap_or(defaults.master_path),
            latest_path: overrides
                .latest_path
                .clone()
                .or_else(|| env("INCIDENTS_LATEST_PATH").map(PathBuf::from))
                .unwrap_or(defaults.latest_path),
        };

        let gist = match (env("GIST_ID"), env("GITHUB_TOKEN")) {
            (Some(gist_id), Some(token)) => {
                let mut gist = GistSettings::new(gist_id, token);
                if let Some(filename) = env("GIST_FILENAME") {
                    gist.filename = filename;
                }
                Some(gist)
            }
            _ => None,
        };

        let mongo = env("MONGODB_URI").map(|uri| {
            let mut mongo = MongoSettings::new(uri);
            if let Some(database) = env("MONGODB_DATABASE") {
                mongo.database = database;
            }
            mongo
        });

        Ok(Self {
            feed_url,
            interval: Duration::from_secs(interval_secs),
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            storage: StorageSettings { local, gist, mongo },
        })
    }

    /// Returns the feed URL, which the poll loop cannot start without.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingFeedUrl`] if none is configured.
    pub fn require_feed_url(&self) -> Result<&str, ConfigError> {
        self.feed_url.as_deref().ok_or(ConfigError::MissingFeedUrl)
    }
}

fn parse_secs(name: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .ok_or_else(|| ConfigError::InvalidNumber {
            name: name.to_string(),
            value: raw.to_string(),
        })
}

/// Reads the JSON config file. The default file may be absent; an
/// explicitly requested one may not.
fn read_config_file(explicit: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let path = explicit.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && explicit.is_none() => {
            return Ok(FileConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    log::debug!("Read configuration from {}", path.display());
    serde_json::from_str(&text).map_err(|source| ConfigError::ConfigFile {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use traffic_incidents_storage::BackendKind;

    use super::*;

    fn env_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    fn no_file() -> Overrides {
        Overrides {
            config_file: Some(std::env::temp_dir().join("traffic_incidents_no_such_config.json")),
            ..Overrides::default()
        }
    }

    fn with_file(name: &str, contents: &str) -> (PathBuf, Overrides) {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, contents).unwrap();
        let overrides = Overrides {
            config_file: Some(path),
            ..Overrides::default()
        };
        (dir, overrides)
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let err = Config::resolve(&no_file(), env_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn environment_overrides_config_file() {
        let (dir, overrides) = with_file(
            "traffic_incidents_config_env",
            r#"{"waze_api_url": "http://file", "update_interval_seconds": 60}"#,
        );
        let config = Config::resolve(
            &overrides,
            env_from(&[("WAZE_API_URL", "http://env"), ("UPDATE_INTERVAL_SECONDS", "300")]),
        )
        .unwrap();

        assert_eq!(config.feed_url.as_deref(), Some("http://env"));
        assert_eq!(config.interval, Duration::from_secs(300));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn config_file_supplies_defaults() {
        let (dir, overrides) = with_file(
            "traffic_incidents_config_file",
            r#"{"waze_api_url": "http://file", "update_interval_seconds": 60}"#,
        );
        let config = Config::resolve(&overrides, env_from(&[])).unwrap();

        assert_eq!(config.require_feed_url().unwrap(), "http://file");
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.fetch_timeout, Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS));
        assert_eq!(config.storage.kind(), BackendKind::LocalFile);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn overrides_win_over_environment() {
        let (dir, mut overrides) = with_file("traffic_incidents_config_overrides", "{}");
        overrides.feed_url = Some("http://cli".to_string());
        overrides.interval_secs = Some(5);
        overrides.master_path = Some(PathBuf::from("/tmp/master.json"));

        let config = Config::resolve(
            &overrides,
            env_from(&[
                ("WAZE_API_URL", "http://env"),
                ("INCIDENTS_MASTER_PATH", "/env/master.json"),
            ]),
        )
        .unwrap();

        assert_eq!(config.feed_url.as_deref(), Some("http://cli"));
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.storage.local.master_path, PathBuf::from("/tmp/master.json"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_feed_url_is_reported() {
        let (dir, overrides) = with_file("traffic_incidents_config_no_url", "{}");
        let config = Config::resolve(&overrides, env_from(&[("WAZE_API_URL", "  ")])).unwrap();

        assert!(matches!(
            config.require_feed_url(),
            Err(ConfigError::MissingFeedUrl)
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_invalid_interval() {
        let (dir, overrides) = with_file("traffic_incidents_config_bad_interval", "{}");
        for raw in ["soon", "0", "-5"] {
            let err = Config::resolve(&overrides, env_from(&[("UPDATE_INTERVAL_SECONDS", raw)]))
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidNumber { .. }), "{raw}");
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let (dir, overrides) = with_file("traffic_incidents_config_malformed", "{not json");
        let err = Config::resolve(&overrides, env_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigFile { .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn gist_requires_both_id_and_token() {
        let (dir, overrides) = with_file("traffic_incidents_config_gist", "{}");

        let only_id = Config::resolve(
            &overrides,
            env_from(&[("GIST_ID", "abc"), ("MONGODB_URI", "mongodb://db/waze")]),
        )
        .unwrap();
        assert_eq!(only_id.storage.kind(), BackendKind::Mongo);

        let both = Config::resolve(
            &overrides,
            env_from(&[
                ("GIST_ID", "abc"),
                ("GITHUB_TOKEN", "t"),
                ("GIST_FILENAME", "waze.json"),
                ("MONGODB_URI", "mongodb://db/waze"),
            ]),
        )
        .unwrap();
        assert_eq!(both.storage.kind(), BackendKind::Gist);
        assert_eq!(both.storage.gist.unwrap().filename, "waze.json");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
