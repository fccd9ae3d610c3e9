use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub server: ServerConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  /// Override for the local data directory (databases, logs)
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Storefront origin, e.g. https://shop.freshmeat.example
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Cache generation version; bumping it on deployment is the only
  /// supported cache-invalidation mechanism.
  pub version: String,
  /// Network race timeout for network-first reads, in milliseconds
  pub network_timeout_ms: u64,
  /// Disable to run without a response cache (every read hits the network)
  pub enabled: bool,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: "1.0.0".to_string(),
      network_timeout_ms: 3000,
      enabled: true,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// How often the connectivity probe runs, in seconds
  pub probe_interval_secs: u64,
  /// How often a background sync fires while online, in seconds
  pub background_sync_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: 30,
      background_sync_secs: 300,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./freshsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/freshsync/config.yaml
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/freshsync/config.yaml\n\
                 with at least:\n  server:\n    url: https://shop.freshmeat.example"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("freshsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("freshsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// The active cache generation name.
  pub fn generation(&self) -> String {
    format!("fresh-meat-v{}", self.cache.version)
  }

  pub fn network_timeout(&self) -> Duration {
    Duration::from_millis(self.cache.network_timeout_ms)
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.sync.probe_interval_secs)
  }

  pub fn background_sync(&self) -> Duration {
    Duration::from_secs(self.sync.background_sync_secs)
  }

  /// Local data directory for databases and logs.
  pub fn data_path(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("freshsync"))
  }

  /// Get the storefront session cookie from the environment.
  ///
  /// Optional: anonymous browsing works without one, but wishlist and order
  /// calls will come back login-required.
  pub fn session_cookie() -> Option<String> {
    std::env::var("FRESHSYNC_SESSION").ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_gets_defaults() {
    let config = Config::parse("server:\n  url: https://shop.freshmeat.example\n").unwrap();

    assert_eq!(config.cache.version, "1.0.0");
    assert_eq!(config.cache.network_timeout_ms, 3000);
    assert!(config.cache.enabled);
    assert_eq!(config.sync.probe_interval_secs, 30);
    assert_eq!(config.generation(), "fresh-meat-v1.0.0");
  }

  #[test]
  fn test_version_bump_changes_generation() {
    let config = Config::parse(
      "server:\n  url: https://shop.freshmeat.example\ncache:\n  version: 1.1.0\n",
    )
    .unwrap();

    assert_eq!(config.generation(), "fresh-meat-v1.1.0");
  }

  #[test]
  fn test_missing_server_is_an_error() {
    assert!(Config::parse("cache:\n  version: 1.0.0\n").is_err());
  }
}
