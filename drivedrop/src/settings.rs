use serde_derive::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use log::debug;

use crate::credentials::{CLIENT_SECRET_FILE, REFRESH_TOKEN_FILE};
use crate::error::{Error, Result};
use crate::http::RetryPolicy;
use crate::API_BASE_URL;

pub const DEFAULT_CONFIG_FILE_PATH: &str = "config.yaml";
pub const DEFAULT_SOURCE_FOLDER: &str = "/source";
pub const DEFAULT_DESTINATION_PATH: &str = "PowerBI";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
/// Configuration file struct
pub struct Settings {
    /// Folder whose files are uploaded
    pub source_folder: String,
    /// SharePoint host, e.g. `contoso.sharepoint.com`. Empty means personal drive only.
    pub hostname: String,
    /// Server relative site path, e.g. `/sites/Finance`
    pub site_path: String,
    /// Folder below the drive root that receives the files
    pub destination_path: String,
    pub client_secret_path: String,
    pub refresh_token_path: String,
    pub graph_base_url: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Port of the local redirect URI used by `login`
    pub redirect_port: u16,
}

/// `Settings` implements `Default`
impl ::std::default::Default for Settings {
    fn default() -> Self {
        Self {
            source_folder: String::from(DEFAULT_SOURCE_FOLDER),
            hostname: String::new(),
            site_path: String::new(),
            destination_path: String::from(DEFAULT_DESTINATION_PATH),
            client_secret_path: String::from(CLIENT_SECRET_FILE),
            refresh_token_path: String::from(REFRESH_TOKEN_FILE),
            graph_base_url: String::from(API_BASE_URL),
            request_timeout_secs: 60,
            max_retries: 2,
            retry_base_delay_ms: 500,
            redirect_port: crate::bootstrap::DEFAULT_REDIRECT_PORT,
        }
    }
}

impl Settings {
    /// Loads the YAML config file. A missing file is created with the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings: Settings = confy::load_path(path)
            .map_err(|err| Error::Config(format!("unable to load {} - {}", path.display(), err)))?;
        debug!("Loaded settings from {}: {:?}", path.display(), settings);
        Ok(settings)
    }

    /// Graph base URL with a guaranteed trailing `/`.
    pub fn graph_base_url(&self) -> String {
        if self.graph_base_url.ends_with('/') {
            self.graph_base_url.clone()
        } else {
            format!("{}/", self.graph_base_url)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    /// Fills `hostname` and `site_path` from `DRIVEDROP_HOSTNAME` and
    /// `DRIVEDROP_SITE_PATH` when the config file left them empty.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.hostname.is_empty() {
            self.hostname = lookup("DRIVEDROP_HOSTNAME").unwrap_or_default();
        }
        if self.site_path.is_empty() {
            self.site_path = lookup("DRIVEDROP_SITE_PATH").unwrap_or_default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(dir.path().join("config.yaml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "hostname: contoso.sharepoint.com\nsite_path: /sites/Finance\nmax_retries: 0\n").unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.hostname, "contoso.sharepoint.com");
        assert_eq!(settings.site_path, "/sites/Finance");
        assert_eq!(settings.max_retries, 0);
        assert_eq!(settings.destination_path, DEFAULT_DESTINATION_PATH);
    }

    #[test]
    fn test_unparseable_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "max_retries: [not, a, number]\n").unwrap();
        assert!(matches!(Settings::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_graph_base_url_trailing_slash() {
        let mut settings = Settings::default();
        assert_eq!(settings.graph_base_url(), API_BASE_URL);
        settings.graph_base_url = String::from("http://127.0.0.1:9000/v1.0");
        assert_eq!(settings.graph_base_url(), "http://127.0.0.1:9000/v1.0/");
    }

    #[test]
    fn test_env_only_fills_empty_values() {
        let mut settings = Settings {
            site_path: String::from("/sites/Ops"),
            ..Settings::default()
        };
        settings.apply_env(|key| match key {
            "DRIVEDROP_HOSTNAME" => Some(String::from("contoso.sharepoint.com")),
            "DRIVEDROP_SITE_PATH" => Some(String::from("/sites/Finance")),
            _ => None,
        });
        assert_eq!(settings.hostname, "contoso.sharepoint.com");
        assert_eq!(settings.site_path, "/sites/Ops");
    }

    #[test]
    fn test_retry_policy_from_settings() {
        let settings = Settings::default();
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
        assert_eq!(settings.request_timeout(), Duration::from_secs(60));
    }
}
