//! Configuration management for Vibes.
//!
//! Loads configuration from ${VIBES_HOME}/config.toml with sensible defaults,
//! then applies `VIBES_*` environment overrides.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Client id shipped in the default config. Must be replaced before signing in.
pub const PLACEHOLDER_CLIENT_ID: &str = "YOUR_CLIENT_ID";

/// Returns the default config template with comments.
///
/// Embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for Vibes configuration and state.
    //!
    //! VIBES_HOME resolution order:
    //! 1. VIBES_HOME environment variable (if set)
    //! 2. ~/.config/vibes (default)
    //! 3. ./.vibes when no home directory can be determined

    use std::path::PathBuf;

    /// Returns the Vibes home directory.
    pub fn vibes_home() -> PathBuf {
        if let Ok(home) = std::env::var("VIBES_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".vibes"),
            |h| h.join(".config").join("vibes"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        vibes_home().join("config.toml")
    }
}

/// Microsoft identity platform settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicrosoftConfig {
    /// Application (client) id from the Azure app registration
    pub client_id: String,
    /// Tenant segment of the authority (`common`, `organizations`, a tenant id)
    pub tenant: String,
    /// Redirect URI registered for this app
    pub redirect_uri: String,
    /// Requested scopes
    pub scopes: Vec<String>,
    /// Base URL of the login authority
    pub authority_url: String,
    /// Base URL of Microsoft Graph
    pub graph_url: String,
}

impl MicrosoftConfig {
    pub const DEFAULT_TENANT: &str = "common";
    pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8400/auth/callback";
    pub const DEFAULT_AUTHORITY_URL: &str = "https://login.microsoftonline.com";
    pub const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com";
    pub const DEFAULT_SCOPES: [&str; 4] = ["openid", "profile", "email", "User.Read"];

    /// Returns true if the client id was never replaced with a real one.
    pub fn has_placeholder_client_id(&self) -> bool {
        let id = self.client_id.trim();
        id.is_empty()
            || id == PLACEHOLDER_CLIENT_ID
            || (id.starts_with('<') && id.ends_with('>'))
    }

    /// Scopes joined by spaces, as the authorize and token endpoints expect.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

impl Default for MicrosoftConfig {
    fn default() -> Self {
        Self {
            client_id: PLACEHOLDER_CLIENT_ID.to_string(),
            tenant: Self::DEFAULT_TENANT.to_string(),
            redirect_uri: Self::DEFAULT_REDIRECT_URI.to_string(),
            scopes: Self::DEFAULT_SCOPES.iter().map(ToString::to_string).collect(),
            authority_url: Self::DEFAULT_AUTHORITY_URL.to_string(),
            graph_url: Self::DEFAULT_GRAPH_URL.to_string(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How long to wait for the browser redirect, in seconds
    pub callback_timeout_secs: u64,

    /// Microsoft identity platform settings
    pub microsoft: MicrosoftConfig,
}

impl Config {
    const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 120;
    const MAX_CALLBACK_TIMEOUT_SECS: u64 = 24 * 60 * 60;

    /// Loads configuration from the default config path, with env overrides.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&paths::config_path())?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Applies `VIBES_*` overrides looked up through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let ms = &mut self.microsoft;
        let targets: [(&str, &mut String); 5] = [
            ("VIBES_CLIENT_ID", &mut ms.client_id),
            ("VIBES_TENANT", &mut ms.tenant),
            ("VIBES_REDIRECT_URI", &mut ms.redirect_uri),
            ("VIBES_AUTHORITY_URL", &mut ms.authority_url),
            ("VIBES_GRAPH_URL", &mut ms.graph_url),
        ];
        for (key, target) in targets {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *target = value;
            }
        }
    }

    /// Redirect wait, capped at one day.
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(
            self.callback_timeout_secs
                .min(Self::MAX_CALLBACK_TIMEOUT_SECS),
        )
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            callback_timeout_secs: Self::DEFAULT_CALLBACK_TIMEOUT_SECS,
            microsoft: MicrosoftConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.microsoft.client_id, PLACEHOLDER_CLIENT_ID);
        assert_eq!(config.microsoft.tenant, "common");
        assert_eq!(config.callback_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_default_template_matches_rust_defaults() {
        let parsed: Config = toml::from_str(default_config_template()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            "[microsoft]\nclient_id = \"11111111-2222-3333-4444-555555555555\"\n",
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(
            config.microsoft.client_id,
            "11111111-2222-3333-4444-555555555555"
        );
        assert_eq!(
            config.microsoft.redirect_uri,
            MicrosoftConfig::DEFAULT_REDIRECT_URI
        );
        assert_eq!(config.microsoft.scope_string(), "openid profile email User.Read");
    }

    #[test]
    fn test_huge_callback_timeout_is_capped() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "callback_timeout_secs = 9223372036854775807\n").unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.callback_timeout(), Duration::from_secs(24 * 60 * 60));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "callback_timeout_secs = \"soon\"").unwrap();

        let err = Config::load_from(&config_path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config"));
    }

    #[test]
    fn test_env_overrides_replace_non_empty_values() {
        let env: HashMap<&str, &str> = [
            ("VIBES_CLIENT_ID", "abc"),
            ("VIBES_GRAPH_URL", "http://127.0.0.1:9999"),
            ("VIBES_TENANT", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_overrides(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.microsoft.client_id, "abc");
        assert_eq!(config.microsoft.graph_url, "http://127.0.0.1:9999");
        assert_eq!(config.microsoft.tenant, "common");
    }

    #[test]
    fn test_placeholder_client_ids() {
        let mut ms = MicrosoftConfig::default();
        assert!(ms.has_placeholder_client_id());

        ms.client_id = String::new();
        assert!(ms.has_placeholder_client_id());

        ms.client_id = "<your-client-id>".to_string();
        assert!(ms.has_placeholder_client_id());

        ms.client_id = "0f3c6a4e-real".to_string();
        assert!(!ms.has_placeholder_client_id());
    }

    #[test]
    fn test_init_writes_template_once() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nested").join("config.toml");

        Config::init(&config_path).unwrap();
        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("client_id"));

        let err = Config::init(&config_path).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
