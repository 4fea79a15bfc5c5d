//! Search API credentials resolution

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

/// Environment variable for the API key
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";
/// Environment variable for the search engine identifier
pub const SEARCH_ENGINE_ID_ENV: &str = "GOOGLE_SEARCH_ENGINE_ID";

/// Config file name, in the user config directory
const CONFIG_FILENAME: &str = "config.json";

/// Search API credentials
#[derive(Clone)]
pub struct Credentials {
    /// API key
    pub api_key: String,
    /// Custom search engine identifier
    pub search_engine_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("search_engine_id", &self.search_engine_id)
            .finish()
    }
}

/// Credentials file content, all fields are optional because environment can complete them
#[derive(Debug, Default, serde::Deserialize)]
struct ConfigFile {
    google_api_key: Option<String>,
    search_engine_id: Option<String>,
}

/// Configuration error, always fatal
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A credential was found neither in environment nor in config file
    #[error(
        "Missing {name}, set it with environment variable {env_var} or key {file_key:?} in config file {}",
        display_path(.path.as_deref())
    )]
    MissingCredential {
        /// Human readable name
        name: &'static str,
        /// Environment variable that can provide it
        env_var: &'static str,
        /// Config file key that can provide it
        file_key: &'static str,
        /// Config file that was looked up
        path: Option<PathBuf>,
    },
    /// Config file could not be read
    #[error("Failed to read config file {path:?}: {err}")]
    Read {
        /// Config file path
        path: PathBuf,
        /// Error
        #[source]
        err: io::Error,
    },
    /// Config file is not valid
    #[error("Failed to parse config file {path:?}: {err}")]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Error
        #[source]
        err: serde_json::Error,
    },
}

/// Where to look for a config file
#[derive(Debug, Clone)]
pub enum ConfigLocation {
    /// Explicitly set by user, must be readable if needed
    Explicit(PathBuf),
    /// Default location, ignored if missing
    Default(Option<PathBuf>),
}

impl ConfigLocation {
    /// Use path if set, otherwise the default per user location
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) => Self::Explicit(path),
            None => Self::Default(default_config_path()),
        }
    }

    fn path(&self) -> Option<&Path> {
        match self {
            ConfigLocation::Explicit(path) => Some(path),
            ConfigLocation::Default(path) => path.as_deref(),
        }
    }

    /// Load config file if any
    fn load(&self) -> Result<ConfigFile, ConfigError> {
        let Some(path) = self.path() else {
            return Ok(ConfigFile::default());
        };
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err)
                if err.kind() == io::ErrorKind::NotFound
                    && matches!(self, ConfigLocation::Default(_)) =>
            {
                log::debug!("No config file at {path:?}");
                return Ok(ConfigFile::default());
            }
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    err,
                });
            }
        };
        log::debug!("Loading config file {path:?}");
        serde_json::from_slice(&data).map_err(|err| ConfigError::Parse {
            path: path.to_owned(),
            err,
        })
    }
}

fn display_path(path: Option<&Path>) -> String {
    path.map_or_else(|| "(none)".to_owned(), |p| format!("{p:?}"))
}

/// Default config file path, in user config directory
fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", env!("CARGO_PKG_NAME"))
        .map(|dirs| dirs.config_dir().join(CONFIG_FILENAME))
}

/// Resolve credentials, environment taking precedence over config file for each value.
/// The config file is only read if environment does not provide everything.
pub fn resolve_credentials<E>(location: &ConfigLocation, env: E) -> Result<Credentials, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let non_empty = |v: Option<String>| v.filter(|v| !v.trim().is_empty());

    let mut api_key = non_empty(env(API_KEY_ENV));
    let mut search_engine_id = non_empty(env(SEARCH_ENGINE_ID_ENV));

    if api_key.is_none() || search_engine_id.is_none() {
        let file = location.load()?;
        api_key = api_key.or_else(|| non_empty(file.google_api_key));
        search_engine_id = search_engine_id.or_else(|| non_empty(file.search_engine_id));
    }

    let missing = |name, env_var, file_key| ConfigError::MissingCredential {
        name,
        env_var,
        file_key,
        path: location.path().map(Path::to_path_buf),
    };
    Ok(Credentials {
        api_key: api_key.ok_or_else(|| missing("API key", API_KEY_ENV, "google_api_key"))?,
        search_engine_id: search_engine_id.ok_or_else(|| {
            missing(
                "search engine identifier",
                SEARCH_ENGINE_ID_ENV,
                "search_engine_id",
            )
        })?,
    })
}
