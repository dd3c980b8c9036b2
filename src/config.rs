use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::db::Database;
use crate::lifecycle::Generations;
use crate::strategy::Routes;

/// Environment variable overriding `app.cache_version`
pub const CACHE_VERSION_ENV: &str = "SHELTER_CACHE_VERSION";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub app: AppConfig,
  #[serde(default)]
  pub api: ApiConfig,
  /// Asset paths written to the static generation at install time
  #[serde(default = "default_precache")]
  pub precache: Vec<String>,
  #[serde(default)]
  pub connectivity: ConnectivityConfig,
  #[serde(default)]
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Origin the cached application is served from
  pub origin: Url,
  #[serde(default = "default_cache_prefix")]
  pub cache_prefix: String,
  pub cache_version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Host of the remote data service (defaults to the host of `base_url`)
  pub host: Option<String>,
  #[serde(default = "default_api_prefix")]
  pub path_prefix: String,
  /// REST root the offline queue is replayed against
  pub base_url: Option<Url>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      host: None,
      path_prefix: default_api_prefix(),
      base_url: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectivityConfig {
  /// URL probed with HEAD requests (defaults to the app origin)
  pub probe_url: Option<Url>,
  #[serde(default = "default_interval_secs")]
  pub interval_secs: u64,
}

impl Default for ConnectivityConfig {
  fn default() -> Self {
    Self {
      probe_url: None,
      interval_secs: default_interval_secs(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  pub path: Option<PathBuf>,
}

fn default_precache() -> Vec<String> {
  vec!["/".to_string()]
}

fn default_cache_prefix() -> String {
  "shelter".to_string()
}

fn default_api_prefix() -> String {
  "/api/".to_string()
}

fn default_interval_secs() -> u64 {
  15
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shelter.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shelter/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        return Err(eyre!(
          "No configuration file found. Create one at ~/.config/shelter/config.yaml\n\
                 See shelter.example.yaml for the format."
        ))
      }
    };

    if let Ok(version) = std::env::var(CACHE_VERSION_ENV) {
      config.override_cache_version(version);
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("shelter.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shelter").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.app.cache_version.trim().is_empty() {
      return Err(eyre!("app.cache_version must not be empty"));
    }
    if !matches!(self.app.origin.scheme(), "http" | "https") {
      return Err(eyre!("app.origin must be an http(s) URL: {}", self.app.origin));
    }
    Ok(())
  }

  fn override_cache_version(&mut self, version: String) {
    let version = version.trim();
    if !version.is_empty() {
      self.app.cache_version = version.to_string();
    }
  }

  pub fn generations(&self) -> Generations {
    Generations::new(&self.app.cache_prefix, &self.app.cache_version)
  }

  pub fn routes(&self) -> Routes {
    let api_host = self.api.host.clone().or_else(|| {
      self
        .api
        .base_url
        .as_ref()
        .and_then(|u| u.host_str())
        .map(str::to_string)
    });

    Routes {
      api_host,
      api_prefix: self.api.path_prefix.clone(),
    }
  }

  /// REST root for queue replay, falling back to `{origin}{api.path_prefix}`.
  pub fn remote_base(&self) -> Result<Url> {
    match &self.api.base_url {
      Some(url) => Ok(url.clone()),
      None => self
        .app
        .origin
        .join(&self.api.path_prefix)
        .map_err(|e| eyre!("Failed to derive API base URL: {}", e)),
    }
  }

  pub fn probe_url(&self) -> Url {
    self
      .connectivity
      .probe_url
      .clone()
      .unwrap_or_else(|| self.app.origin.clone())
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.connectivity.interval_secs.max(1))
  }

  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.storage.path {
      Some(path) => Ok(path.clone()),
      None => Database::default_path(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const MINIMAL: &str = r#"
app:
  origin: https://app.test/
  cache_version: v3
"#;

  #[test]
  fn test_defaults() {
    let config = Config::from_yaml(MINIMAL).unwrap();
    assert_eq!(config.precache, vec!["/"]);
    assert_eq!(config.app.cache_prefix, "shelter");
    assert_eq!(config.generations().static_name(), "shelter-static-v3");
    assert_eq!(config.probe_interval(), Duration::from_secs(15));
    assert_eq!(config.probe_url().as_str(), "https://app.test/");
    assert_eq!(
      config.routes(),
      Routes {
        api_host: None,
        api_prefix: "/api/".to_string()
      }
    );
    assert_eq!(config.remote_base().unwrap().as_str(), "https://app.test/api/");
  }

  #[test]
  fn test_api_host_from_base_url() {
    let config = Config::from_yaml(
      r#"
app:
  origin: https://app.test/
  cache_version: v1
api:
  base_url: https://data.remote.test/rest/v1/
precache: ["/", "/app.js", "/style.css"]
connectivity:
  interval_secs: 5
storage:
  path: /tmp/shelter-test.db
"#,
    )
    .unwrap();

    assert_eq!(config.routes().api_host.as_deref(), Some("data.remote.test"));
    assert_eq!(
      config.remote_base().unwrap().as_str(),
      "https://data.remote.test/rest/v1/"
    );
    assert_eq!(config.precache.len(), 3);
    assert_eq!(config.probe_interval(), Duration::from_secs(5));
    assert_eq!(
      config.database_path().unwrap(),
      PathBuf::from("/tmp/shelter-test.db")
    );
  }

  #[test]
  fn test_version_override() {
    let mut config = Config::from_yaml(MINIMAL).unwrap();
    config.override_cache_version("  ".to_string());
    assert_eq!(config.app.cache_version, "v3");
    config.override_cache_version("v4".to_string());
    assert_eq!(config.generations().dynamic_name(), "shelter-dynamic-v4");
  }

  #[test]
  fn test_rejects_invalid() {
    assert!(Config::from_yaml("app:\n  origin: https://app.test/\n  cache_version: ''\n").is_err());
    assert!(Config::from_yaml("app:\n  origin: ftp://app.test/\n  cache_version: v1\n").is_err());
    assert!(Config::from_yaml("app:\n  origin: not a url\n  cache_version: v1\n").is_err());
  }

  #[test]
  fn test_load_missing_explicit_path() {
    let err = Config::load(Some(Path::new("/nonexistent/shelter.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shelter.yaml");
    std::fs::write(&path, MINIMAL).unwrap();
    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.app.origin.as_str(), "https://app.test/");
  }
}
