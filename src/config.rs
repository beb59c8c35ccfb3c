use std::path::PathBuf;
use std::{env, fmt};

use async_trait::async_trait;
use dashmap::DashMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::error::BridgeError;
use crate::view::ViewConfig;

/// Only keys with this prefix are ours.
pub const KEY_PREFIX: &str = "VIEWHOST_";

pub const SERVER_URL: &str = "VIEWHOST_SERVER_URL";
pub const API_TOKEN: &str = "VIEWHOST_API_TOKEN";
pub const DOCUMENT_SET_ID: &str = "VIEWHOST_DOCUMENT_SET_ID";
pub const VIEW_ID: &str = "VIEWHOST_VIEW_ID";
pub const PLUGIN_URL: &str = "VIEWHOST_PLUGIN_URL";
pub const LOG_LEVEL: &str = "VIEWHOST_LOG_LEVEL";
pub const LOG_DIR: &str = "VIEWHOST_LOG_DIR";

const DEFAULT_LOG_LEVEL: &str = "info";

#[async_trait]
#[typetag::serde]
pub trait ConfigManagerType: Send + Sync {
    async fn as_vec(&self) -> Vec<(String, String)> {
        let mut config = vec![];
        for key in self.keys().await {
            if let Some(value) = self.get(&key).await {
                config.push((key, value));
            }
        }
        config
    }
    async fn keys(&self) -> Vec<String>;
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str) -> Result<(), String>;
    fn clone_box(&self) -> Box<dyn ConfigManagerType>;
    fn debug_box(&self) -> String;
}

#[derive(Serialize, Deserialize)]
pub struct ConfigManager(pub Box<dyn ConfigManagerType>);

impl ConfigManager {
    pub fn into_inner(self) -> Box<dyn ConfigManagerType> {
        self.0
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).await.filter(|v| !v.trim().is_empty())
    }

    /// A map-backed copy of our own keys, with `overrides` applied on top.
    pub async fn with_overrides(&self, overrides: &[(&str, String)]) -> ConfigManager {
        let layered = MapConfigManager::new();
        for (key, value) in self.0.as_vec().await {
            if key.starts_with(KEY_PREFIX) {
                layered.map.insert(key, value);
            }
        }
        for (key, value) in overrides {
            layered.map.insert(key.to_string(), value.clone());
        }
        ConfigManager(layered)
    }

    async fn require(&self, key: &str) -> Result<String, BridgeError> {
        self.get(key)
            .await
            .ok_or_else(|| BridgeError::Config(format!("{key} is not set")))
    }
}

impl Clone for ConfigManager {
    fn clone(&self) -> Self {
        ConfigManager(self.0.clone_box())
    }
}

impl fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.debug_box())
    }
}

/// Reads the process environment, after loading `env_file` into it when it
/// exists. Read-only: the environment belongs to whoever launched us.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvConfigManager {
    env_file: PathBuf,
}

impl EnvConfigManager {
    pub fn new(env_file: PathBuf) -> Box<Self> {
        if env_file.exists() {
            match dotenvy::from_path(&env_file) {
                Ok(()) => info!("Loaded .env from {}", env_file.display()),
                Err(err) => warn!("could not load .env from {}: {err}", env_file.display()),
            }
        }
        Box::new(Self { env_file })
    }
}

#[typetag::serde]
#[async_trait]
impl ConfigManagerType for EnvConfigManager {
    async fn keys(&self) -> Vec<String> {
        env::vars().map(|(k, _)| k).collect()
    }

    async fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }

    async fn set(&self, key: &str, _value: &str) -> Result<(), String> {
        Err(format!("cannot set {key}: environment configuration is read-only"))
    }

    fn clone_box(&self) -> Box<dyn ConfigManagerType> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        format!("EnvConfigManager({})", self.env_file.display())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MapConfigManager {
    #[schemars(with = "std::collections::HashMap<String, String>")]
    map: DashMap<String, String>,
}

impl MapConfigManager {
    pub fn new() -> Box<Self> {
        Box::new(Self::default())
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Box<Self> {
        let map = pairs.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Box::new(Self { map })
    }
}

#[typetag::serde]
#[async_trait]
impl ConfigManagerType for MapConfigManager {
    async fn keys(&self) -> Vec<String> {
        self.map.iter().map(|entry| entry.key().clone()).collect()
    }

    async fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).map(|v| v.clone())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ConfigManagerType> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        format!("MapConfigManager({} entries)", self.map.len())
    }
}

/// Everything the binary needs: the view to open and where to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub view: ViewConfig,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

impl HostConfig {
    pub async fn from_config(config: &ConfigManager) -> Result<Self, BridgeError> {
        let view = ViewConfig {
            server: parse_url(SERVER_URL, &config.require(SERVER_URL).await?)?,
            api_token: config.require(API_TOKEN).await?,
            document_set_id: parse_id(DOCUMENT_SET_ID, &config.require(DOCUMENT_SET_ID).await?)?,
            view_id: parse_id(VIEW_ID, &config.require(VIEW_ID).await?)?,
            plugin_url: parse_url(PLUGIN_URL, &config.require(PLUGIN_URL).await?)?,
        };
        Ok(Self {
            view,
            log_level: config.get(LOG_LEVEL).await.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_dir: config.get(LOG_DIR).await.map(PathBuf::from),
        })
    }
}

fn parse_url(key: &str, value: &str) -> Result<Url, BridgeError> {
    Url::parse(value).map_err(|e| BridgeError::Config(format!("{key}: `{value}` is not a URL: {e}")))
}

fn parse_id(key: &str, value: &str) -> Result<i64, BridgeError> {
    value
        .trim()
        .parse()
        .map_err(|e| BridgeError::Config(format!("{key}: `{value}` is not an id: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;
    use tempfile::tempdir;

    fn full() -> ConfigManager {
        ConfigManager(MapConfigManager::from_pairs([
            (SERVER_URL, "http://localhost:9000"),
            (API_TOKEN, "tok"),
            (DOCUMENT_SET_ID, "1010101"),
            (VIEW_ID, "3"),
            (PLUGIN_URL, "http://plugin.test:3333/show"),
        ]))
    }

    #[tokio::test]
    async fn test_map_config_manager_basic() {
        let mgr = MapConfigManager::new();
        mgr.set("foo", "bar").await.unwrap();
        assert_eq!(mgr.get("foo").await, Some("bar".to_string()));

        mgr.set("foo", "baz").await.unwrap();
        assert_eq!(mgr.get("foo").await, Some("baz".to_string()));
        assert_eq!(mgr.keys().await, vec!["foo".to_string()]);
    }

    #[tokio::test]
    async fn host_config_from_keys() {
        let cfg = HostConfig::from_config(&full()).await.unwrap();
        assert_eq!(cfg.view.document_set_id, 1010101);
        assert_eq!(cfg.view.view_id, 3);
        assert_eq!(cfg.view.plugin_url.as_str(), "http://plugin.test:3333/show");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.log_dir, None);
    }

    #[tokio::test]
    async fn missing_and_invalid_values_are_config_errors() {
        let cfg = full();
        cfg.0.set(DOCUMENT_SET_ID, "abc").await.unwrap();
        let err = HostConfig::from_config(&cfg).await.unwrap_err();
        assert!(matches!(err, BridgeError::Config(msg) if msg.contains(DOCUMENT_SET_ID)));

        let empty = ConfigManager(MapConfigManager::new());
        let err = HostConfig::from_config(&empty).await.unwrap_err();
        assert!(matches!(err, BridgeError::Config(msg) if msg.contains(SERVER_URL)));
    }

    #[tokio::test]
    async fn overrides_win_and_foreign_keys_are_dropped() {
        let base = full();
        base.0.set("UNRELATED", "x").await.unwrap();
        let layered = base.with_overrides(&[(VIEW_ID, "9".to_string())]).await;

        assert_eq!(layered.get("UNRELATED").await, None);
        let cfg = HostConfig::from_config(&layered).await.unwrap();
        assert_eq!(cfg.view.view_id, 9);
        assert_eq!(cfg.view.api_token, "tok");
    }

    #[tokio::test]
    async fn test_env_config_manager_loads_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");
        write(&path, "VIEWHOST_TEST_ONLY_KEY=from_file\n").unwrap();

        let mgr = EnvConfigManager::new(path);
        assert_eq!(mgr.get("VIEWHOST_TEST_ONLY_KEY").await, Some("from_file".to_string()));
        assert!(mgr.keys().await.contains(&"VIEWHOST_TEST_ONLY_KEY".to_string()));
        assert!(mgr.set("VIEWHOST_TEST_ONLY_KEY", "x").await.is_err());
    }

    #[tokio::test]
    async fn config_manager_round_trips_through_typetag() {
        let cfg = ConfigManager(MapConfigManager::from_pairs([("a", "1")]));
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ConfigManager = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("a").await, Some("1".to_string()));
    }
}
