// 生产线班次统计 - 核算与指标主库

// 声明模块
pub mod domains;
pub mod logger;
pub mod models;
pub mod settings;
pub mod storage;
pub mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

pub use domains::ProductionService;
pub use models::*;
pub use settings::{ConfigUpdate, PersistedConfig, SettingsManager};
pub use storage::{StoreGateway, StoreSettings, StoreStatus};

/// 应用状态
///
/// - 生产服务：班次报告、小时记录和指标查询
/// - 设置管理：持久化配置
#[derive(Clone)]
pub struct AppState {
    pub production: Arc<ProductionService>,
    pub settings: Arc<SettingsManager>,
}

impl AppState {
    /// 加载配置并创建服务，数据库在第一次使用时连接
    pub async fn new(config_path: PathBuf) -> Result<Self> {
        let settings = Arc::new(SettingsManager::new(config_path).await?);
        let store = settings.effective_store_settings().await;
        info!(
            "存储配置: {}",
            if store.connection_string().is_some() {
                "已配置连接串"
            } else {
                "未配置连接串"
            }
        );

        Ok(Self {
            production: Arc::new(ProductionService::from_settings(store)),
            settings,
        })
    }

    /// 日志目录（配置优先，否则使用平台默认目录）
    pub async fn log_dir(&self) -> PathBuf {
        self.settings
            .get()
            .await
            .log_dir
            .unwrap_or_else(logger::default_log_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_state_connects_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(dir.path().join("config.json")).await.unwrap();
        assert_eq!(state.production.store_status(), StoreStatus::Uninitialized);

        state
            .settings
            .update(ConfigUpdate {
                log_dir: Some(dir.path().join("logs")),
                ..ConfigUpdate::default()
            })
            .await
            .unwrap();
        assert_eq!(state.log_dir().await, dir.path().join("logs"));
    }
}
