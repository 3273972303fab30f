//! Environment-driven configuration.
//!
//! All settings come from the process environment (optionally seeded from a
//! `.env` file by the bootstrap). Local file mode only needs the Claude
//! credential; server mode additionally needs the Dropbox credentials.

use thiserror::Error;

/// Placeholder watched folder used when `DROPBOX_FOLDER_PATH` is unset.
pub const DEFAULT_FOLDER_PATH: &str = "/監視対象フォルダパス";

/// Filename prefix that marks not-yet-processed scanner output.
/// Renamed files lose the prefix, which is what keeps them from
/// being picked up again.
pub const DEFAULT_FILE_PREFIX: &str = "BRWDCE";

const DEFAULT_PORT: u16 = 3003;

/// Errors raised while reading settings. Fatal: the process exits with
/// code 1 before doing any work.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variables: {0}")]
    MissingVars(String),

    #[error("Invalid PORT value: {0}")]
    InvalidPort(String),
}

/// Dropbox credentials and watch parameters (server mode only).
#[derive(Debug, Clone)]
pub struct DropboxSettings {
    pub app_key: String,
    pub app_secret: String,
    pub refresh_token: String,
    pub folder_path: String,
    pub file_prefix: String,
}

/// Process-wide settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub claude_api_key: String,
    pub port: u16,
    /// Present only when loaded for server mode.
    pub dropbox: Option<DropboxSettings>,
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// With `for_dropbox` set, the Dropbox credentials are required as
    /// well; local file mode skips them.
    pub fn from_env(for_dropbox: bool) -> Result<Self, ConfigError> {
        Self::from_lookup(for_dropbox, |name| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(for_dropbox: bool, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let mut required = vec!["CLAUDE_API_KEY"];
        if for_dropbox {
            required.extend(["DROPBOX_APP_KEY", "DROPBOX_APP_SECRET", "DROPBOX_REFRESH_TOKEN"]);
        }

        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|&name| get(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingVars(missing.join(", ")));
        }

        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(raw))?,
            None => DEFAULT_PORT,
        };

        let dropbox = for_dropbox.then(|| DropboxSettings {
            app_key: get("DROPBOX_APP_KEY").unwrap_or_default(),
            app_secret: get("DROPBOX_APP_SECRET").unwrap_or_default(),
            refresh_token: get("DROPBOX_REFRESH_TOKEN").unwrap_or_default(),
            folder_path: get("DROPBOX_FOLDER_PATH")
                .unwrap_or_else(|| DEFAULT_FOLDER_PATH.to_string()),
            file_prefix: get("FILE_PREFIX").unwrap_or_else(|| DEFAULT_FILE_PREFIX.to_string()),
        });

        Ok(Settings {
            claude_api_key: get("CLAUDE_API_KEY").unwrap_or_default(),
            port,
            dropbox,
        })
    }
}
