use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::storage::StoreSettings;

/// 持久化配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedConfig {
    pub store: StoreSettings,
    /// 日志过滤规则，格式同 RUST_LOG
    pub log_level: String,
    /// 日志目录，未设置时使用平台默认目录
    pub log_dir: Option<PathBuf>,
}

impl Default for PersistedConfig {
    fn default() -> Self {
        Self {
            store: StoreSettings::default(),
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// 配置部分更新，None 表示保持不变
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    pub store: Option<StoreSettings>,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
}

pub struct SettingsManager {
    path: PathBuf,
    data: RwLock<PersistedConfig>,
}

impl SettingsManager {
    pub async fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let initial = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => match serde_json::from_slice::<PersistedConfig>(&bytes) {
                Ok(config) => config,
                Err(e) => {
                    warn!("配置文件解析失败，使用默认配置: {:?} - {}", path, e);
                    PersistedConfig::default()
                }
            },
            _ => {
                let default = PersistedConfig::default();
                let json = serde_json::to_string_pretty(&default)?;
                tokio::fs::write(&path, json)
                    .await
                    .with_context(|| format!("写入默认配置失败: {:?}", path))?;
                default
            }
        };

        Ok(Self {
            path,
            data: RwLock::new(initial),
        })
    }

    pub async fn get(&self) -> PersistedConfig {
        self.data.read().await.clone()
    }

    /// 实际使用的存储配置（环境变量优先）
    pub async fn effective_store_settings(&self) -> StoreSettings {
        self.data.read().await.store.clone().with_env_overrides()
    }

    pub async fn update(&self, update: ConfigUpdate) -> Result<PersistedConfig> {
        let mut config = self.data.write().await;

        if let Some(store) = update.store {
            config.store = store;
        }
        if let Some(level) = update.log_level {
            config.log_level = level;
        }
        if let Some(dir) = update.log_dir {
            config.log_dir = Some(dir);
        }

        self.save(&config).await?;
        Ok(config.clone())
    }

    async fn save(&self, config: &PersistedConfig) -> Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_run_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let manager = SettingsManager::new(path.clone()).await.unwrap();
        assert_eq!(manager.get().await, PersistedConfig::default());

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"log_level\": \"info\""));
        assert!(written.contains("shift_reports"));
    }

    #[tokio::test]
    async fn test_partial_update_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let manager = SettingsManager::new(path.clone()).await.unwrap();
        let store = StoreSettings {
            connection_string: Some("sqlite:data/production.db".to_string()),
            ..StoreSettings::default()
        };
        let updated = manager
            .update(ConfigUpdate {
                store: Some(store.clone()),
                ..ConfigUpdate::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.store, store);
        assert_eq!(updated.log_level, "info");

        let reloaded = SettingsManager::new(path).await.unwrap();
        assert_eq!(reloaded.get().await.store, store);
    }

    #[tokio::test]
    async fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let manager = SettingsManager::new(path).await.unwrap();
        assert_eq!(manager.get().await, PersistedConfig::default());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: PersistedConfig = serde_json::from_str(r#"{"log_level":"debug"}"#).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.store, StoreSettings::default());
        assert!(config.log_dir.is_none());
    }
}
