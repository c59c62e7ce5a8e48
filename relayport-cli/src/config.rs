use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::sys;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    profile: HashMap<String, ProfileConfig>,
}

/// Relay settings for one profile; command-line flags take precedence.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct ProfileConfig {
    pub url: Option<String>,
    /// `Name: Value` lines sent with the WebSocket handshake.
    #[serde(default)]
    pub headers: Vec<String>,
    pub bind_host: Option<String>,
}

const USER_PATH: &str = "relayport/config.toml";

impl Config {
    pub fn user_path<'a>() -> &'a Path {
        Path::new(USER_PATH)
    }

    pub fn path() -> Option<PathBuf> {
        sys::config_dir().map(|config_dir| config_dir.join(USER_PATH))
    }

    /// Load the user config. No config directory or no file yields the default.
    pub fn load() -> Result<Self> {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        ::config::Config::builder()
            .add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .with_context(|| format!("Failed to read config file {}", path.display()))
    }

    pub fn get_profile(&self, name: &str) -> Option<&ProfileConfig> {
        self.profile.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_config(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("relayport-config-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_profiles() {
        let path = write_config(
            "profiles",
            r#"
[profile.default]
url = "wss://relay.example.com/tunnel"
headers = ["Authorization: Bearer abc"]

[profile.staging]
url = "ws://127.0.0.1:9000/tunnel"
bind_host = "0.0.0.0"
"#,
        );

        let config = Config::load_from(&path).unwrap();
        let default = config.get_profile("default").unwrap();
        assert_eq!(default.url.as_deref(), Some("wss://relay.example.com/tunnel"));
        assert_eq!(default.headers, vec!["Authorization: Bearer abc".to_string()]);
        assert_eq!(default.bind_host, None);

        let staging = config.get_profile("staging").unwrap();
        assert!(staging.headers.is_empty());
        assert_eq!(staging.bind_host.as_deref(), Some("0.0.0.0"));

        assert!(config.get_profile("missing").is_none());
    }

    #[test]
    fn test_missing_file_is_empty_config() {
        let path = std::env::temp_dir().join("relayport-config-does-not-exist.toml");
        let config = Config::load_from(&path).unwrap();
        assert!(config.get_profile("default").is_none());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let path = write_config("malformed", "[profile.default\nurl = ");
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().starts_with("Failed to read config file"));
    }

    #[test]
    fn test_user_path_ends_with_app_dir() {
        assert!(Config::user_path().starts_with("relayport"));
        if let Some(path) = Config::path() {
            assert!(path.ends_with(USER_PATH));
        }
    }
}
