// 存储配置定义

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 连接串环境变量
pub const ENV_DB_URL: &str = "PRODUCTION_TRACKER_DB_URL";
/// 数据库名环境变量（仅 MariaDB 使用）
pub const ENV_DB_NAME: &str = "PRODUCTION_TRACKER_DB_NAME";

/// 存储初始化失败原因
///
/// 只在一次性初始化时产生，之后被网关记录为降级状态，不会返回给业务调用方。
#[derive(Debug, Error)]
pub enum StoreInitError {
    #[error("缺少数据库连接串 (PRODUCTION_TRACKER_DB_URL)，以降级模式运行")]
    MissingConnectionString,
    #[error("不支持的连接串协议: {0}")]
    UnsupportedScheme(String),
    #[error("非法表名: {0}")]
    InvalidTableName(String),
    #[error("连接 {backend} 失败: {message}")]
    Connect {
        backend: &'static str,
        message: String,
    },
}

/// 数据库后端类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// SQLite，值为完整连接串
    SQLite { url: String },
    /// MariaDB / MySQL，值为服务器连接串（库名另行指定）
    MariaDB { url: String, database: String },
}

impl StoreBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::SQLite { .. } => "sqlite",
            StoreBackend::MariaDB { .. } => "mariadb",
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// 连接串，`sqlite:` 或 `mysql:`/`mariadb:` 开头
    pub connection_string: Option<String>,
    /// 数据库名
    pub database_name: String,
    /// 班次报告表名
    pub shift_reports_table: String,
    /// 小时记录表名
    pub hourly_entries_table: String,
    /// 连接超时（秒）
    pub connect_timeout_secs: u64,
    /// 连接池上限
    pub max_connections: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            connection_string: None,
            database_name: "production_tracker".to_string(),
            shift_reports_table: "shift_reports".to_string(),
            hourly_entries_table: "hourly_entries".to_string(),
            connect_timeout_secs: 15,
            max_connections: 10,
        }
    }
}

impl StoreSettings {
    /// 从环境变量读取，其余字段使用默认值
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 环境变量优先于配置文件
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(url) = non_blank_env(ENV_DB_URL) {
            self.connection_string = Some(url);
        }
        if let Some(name) = non_blank_env(ENV_DB_NAME) {
            self.database_name = name;
        }
        self
    }

    /// 有效连接串（空白视为未配置）
    pub fn connection_string(&self) -> Option<&str> {
        self.connection_string
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// 根据连接串协议选择后端
    pub fn backend(&self) -> Result<StoreBackend, StoreInitError> {
        let url = self
            .connection_string()
            .ok_or(StoreInitError::MissingConnectionString)?;

        for table in [&self.shift_reports_table, &self.hourly_entries_table] {
            if !is_valid_identifier(table) {
                return Err(StoreInitError::InvalidTableName(table.clone()));
            }
        }

        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "sqlite" => Ok(StoreBackend::SQLite {
                url: url.to_string(),
            }),
            "mysql" => Ok(StoreBackend::MariaDB {
                url: url.to_string(),
                database: self.database_name.clone(),
            }),
            // sqlx 只认 mysql 协议
            "mariadb" => Ok(StoreBackend::MariaDB {
                url: format!("mysql{}", &url["mariadb".len()..]),
                database: self.database_name.clone(),
            }),
            other => Err(StoreInitError::UnsupportedScheme(other.to_string())),
        }
    }
}

fn non_blank_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 表名会拼进 SQL，只允许字母、数字和下划线
fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

/// 日志里显示的主机部分，去掉账号密码和参数
pub fn display_host(url: &str) -> String {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let rest = rest.rsplit_once('@').map(|(_, r)| r).unwrap_or(rest);
    rest.split(['/', '?']).next().unwrap_or_default().to_string()
}
