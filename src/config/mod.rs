use anyhow::{Context, Result};
use keyring::Entry;
use std::fs;
use std::path::PathBuf;

use airt::DEFAULT_SERVER_URL;

const SERVICE_NAME: &str = "airt-cli";
const TOKEN_ENTRY: &str = "access_token";
const CONFIG_FILE: &str = "config.toml";

pub const SERVER_URL_ENV: &str = "AIRT_SERVER_URL";
pub const SERVICE_TOKEN_ENV: &str = "AIRT_SERVICE_TOKEN";
pub const SERVICE_USERNAME_ENV: &str = "AIRT_SERVICE_USERNAME";
pub const SERVICE_PASSWORD_ENV: &str = "AIRT_SERVICE_PASSWORD";
pub const CLIENT_DB_USERNAME_ENV: &str = "AIRT_CLIENT_DB_USERNAME";
pub const CLIENT_DB_PASSWORD_ENV: &str = "AIRT_CLIENT_DB_PASSWORD";
pub const CLICKHOUSE_USERNAME_ENV: &str = "CLICKHOUSE_USERNAME";
pub const CLICKHOUSE_PASSWORD_ENV: &str = "CLICKHOUSE_PASSWORD";
pub const AWS_ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";

/// CLI settings: `config.toml` in the user config directory plus the
/// session token kept in the OS keyring.
#[derive(Debug, Clone)]
pub struct Config {
    config_dir: PathBuf,
    pub server_url: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Self::get_config_dir()?)
    }

    pub fn load_from(config_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        let mut config = Self {
            config_dir,
            server_url: None,
        };
        config.server_url = config.get("server.url")?;
        Ok(config)
    }

    pub fn get_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|d| d.join("airt"))
            .context("Failed to determine config directory")
    }

    /// `--server`/`AIRT_SERVER_URL` first, then the config file, then the
    /// public service.
    pub fn resolve_server_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.server_url.clone())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
    }

    fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    fn read_table(&self) -> Result<toml::Table> {
        let config_file = self.config_file();
        if !config_file.exists() {
            return Ok(toml::Table::new());
        }
        let content = fs::read_to_string(&config_file).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    pub fn get_token(&self) -> Result<Option<String>> {
        let entry = Entry::new(SERVICE_NAME, TOKEN_ENTRY)?;
        match entry.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow::anyhow!("Failed to read the stored token: {}", e)),
        }
    }

    pub fn set_token(&self, token: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, TOKEN_ENTRY)?;
        entry.set_password(token).context("Failed to store token")?;
        Ok(())
    }

    pub fn remove_token(&self) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, TOKEN_ENTRY)?;
        match entry.delete_password() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::anyhow!("Failed to remove token: {}", e)),
        }
    }

    /// Sets `key` or `section.key`.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut config = self.read_table()?;
        let value = toml::Value::String(value.to_string());

        match key.split_once('.') {
            Some((section, subkey)) => {
                config
                    .entry(section.to_string())
                    .or_insert_with(|| toml::Value::Table(toml::Table::new()))
                    .as_table_mut()
                    .with_context(|| format!("'{}' is not a section", section))?
                    .insert(subkey.to_string(), value);
            }
            None => {
                config.insert(key.to_string(), value);
            }
        }

        let content = toml::to_string_pretty(&config).context("Failed to serialize config")?;
        fs::write(self.config_file(), content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let config = self.read_table()?;
        let value = match key.split_once('.') {
            Some((section, subkey)) => config
                .get(section)
                .and_then(|s| s.as_table())
                .and_then(|t| t.get(subkey)),
            None => config.get(key),
        };
        Ok(value.and_then(|v| v.as_str()).map(|s| s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_url_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().to_path_buf()).unwrap();
        assert_eq!(config.server_url, None);
        assert_eq!(config.resolve_server_url(None), DEFAULT_SERVER_URL);

        config.set("server.url", "http://localhost:6006").unwrap();

        let config = Config::load_from(dir.path().to_path_buf()).unwrap();
        assert_eq!(config.server_url.as_deref(), Some("http://localhost:6006"));
        assert_eq!(config.resolve_server_url(None), "http://localhost:6006");
        assert_eq!(
            config.resolve_server_url(Some("https://staging.airt.ai".into())),
            "https://staging.airt.ai"
        );
    }

    #[test]
    fn top_level_and_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().to_path_buf()).unwrap();
        config.set("format", "{uuid}").unwrap();
        assert_eq!(config.get("format").unwrap().as_deref(), Some("{uuid}"));
        assert_eq!(config.get("server.url").unwrap(), None);
        assert_eq!(config.get("nothing").unwrap(), None);
    }

    #[test]
    fn scalar_cannot_become_section() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().to_path_buf()).unwrap();
        config.set("server", "x").unwrap();
        assert!(config.set("server.url", "y").is_err());
    }
}
