// 存储网关 - 懒加载数据库连接，存储不可用时以降级模式返回空结果
//
// 初始化在进程内最多尝试一次，结果（成功或失败）被缓存，失败后不自动重试。
// 降级模式下：读操作返回空列表 / None，写操作返回 false，不向调用方报错。
// 初始化成功后，数据库错误照常向上传递。

use super::config::{display_host, StoreBackend, StoreInitError, StoreSettings};
use super::models::DateRange;
use super::repository::mariadb::MariaDbRepository;
use super::repository::sqlite::SqliteRepository;
use super::repository::ProductionRepository;
use crate::models::{BinTippingEntry, HourlyEntry, ProductionMetrics, ShiftReport, ShiftTotals};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

/// 对外暴露的存储状态，用于区分"没有数据"和"存储不可用"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StoreStatus {
    /// 尚未尝试连接
    Uninitialized,
    /// 已连接
    Ready { backend: String },
    /// 初始化失败，降级运行
    Failed { reason: String },
}

impl StoreStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, StoreStatus::Failed { .. })
    }
}

enum StoreState {
    Ready(Arc<dyn ProductionRepository>),
    Failed(String),
}

/// 存储网关
pub struct StoreGateway {
    settings: StoreSettings,
    state: OnceCell<StoreState>,
}

impl StoreGateway {
    /// 创建网关，此时不连接数据库
    pub fn new(settings: StoreSettings) -> Self {
        Self {
            settings,
            state: OnceCell::new(),
        }
    }

    /// 使用已就绪的仓库创建网关
    pub fn with_repository(repository: Arc<dyn ProductionRepository>) -> Self {
        Self {
            settings: StoreSettings::default(),
            state: OnceCell::new_with(Some(StoreState::Ready(repository))),
        }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// 确保已尝试初始化，返回可用的仓库
    ///
    /// 并发调用方会等待同一次初始化，之后只读取缓存结果。
    pub async fn ensure_ready(&self) -> Option<Arc<dyn ProductionRepository>> {
        match self.state.get_or_init(|| self.initialize()).await {
            StoreState::Ready(repository) => Some(Arc::clone(repository)),
            StoreState::Failed(_) => None,
        }
    }

    /// 当前状态
    pub fn status(&self) -> StoreStatus {
        match self.state.get() {
            None => StoreStatus::Uninitialized,
            Some(StoreState::Ready(repository)) => StoreStatus::Ready {
                backend: repository.db_type().to_string(),
            },
            Some(StoreState::Failed(reason)) => StoreStatus::Failed {
                reason: reason.clone(),
            },
        }
    }

    async fn initialize(&self) -> StoreState {
        info!("开始初始化存储（懒加载）...");
        match connect(&self.settings).await {
            Ok(repository) => {
                info!("存储初始化成功，类型: {}", repository.db_type());
                StoreState::Ready(repository)
            }
            Err(e @ StoreInitError::MissingConnectionString) => {
                warn!("{}", e);
                StoreState::Failed(e.to_string())
            }
            Err(e) => {
                error!("存储初始化失败，以降级模式运行: {}", e);
                StoreState::Failed(e.to_string())
            }
        }
    }

    // ========== 班次报告查询 ==========

    pub async fn find_all_shift_reports(&self) -> Result<Vec<ShiftReport>> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(Vec::new());
        };
        repo.find_all_shift_reports().await
    }

    pub async fn find_shift_report(&self, id: &str) -> Result<Option<ShiftReport>> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(None);
        };
        repo.find_shift_report(id).await
    }

    pub async fn find_shift_reports_in_range(&self, range: &DateRange) -> Result<Vec<ShiftReport>> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(Vec::new());
        };
        repo.find_shift_reports_in_range(range).await
    }

    pub async fn find_shift_reports_by_manager(&self, line_manager: &str) -> Result<Vec<ShiftReport>> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(Vec::new());
        };
        repo.find_shift_reports_by_manager(line_manager).await
    }

    pub async fn shift_report_exists(
        &self,
        date: NaiveDate,
        shift: &str,
        line_manager: &str,
    ) -> Result<bool> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(false);
        };
        repo.shift_report_exists(date, shift, line_manager).await
    }

    pub async fn distinct_line_managers(&self) -> Result<Vec<String>> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(Vec::new());
        };
        repo.distinct_line_managers().await
    }

    // ========== 班次报告写入 ==========

    /// 插入报告，降级时返回 false
    pub async fn insert_shift_report(&self, report: &ShiftReport) -> Result<bool> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(false);
        };
        repo.insert_shift_report(report).await?;
        Ok(true)
    }

    pub async fn replace_shift_report(&self, id: &str, report: &ShiftReport) -> Result<bool> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(false);
        };
        repo.replace_shift_report(id, report).await
    }

    pub async fn append_bin_tipping(
        &self,
        id: &str,
        entry: &BinTippingEntry,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(false);
        };
        repo.append_bin_tipping(id, entry, updated_at).await
    }

    pub async fn replace_bin_tipping(
        &self,
        id: &str,
        index: usize,
        entry: &BinTippingEntry,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(false);
        };
        repo.replace_bin_tipping(id, index, entry, updated_at).await
    }

    pub async fn update_totals(
        &self,
        id: &str,
        entry_count: usize,
        totals: &ShiftTotals,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(false);
        };
        repo.update_totals(id, entry_count, totals, updated_at).await
    }

    pub async fn delete_shift_report(&self, id: &str) -> Result<bool> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(false);
        };
        repo.delete_shift_report(id).await
    }

    // ========== 汇总 ==========

    pub async fn production_metrics(&self, range: &DateRange) -> Result<Vec<ProductionMetrics>> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(Vec::new());
        };
        repo.production_metrics(range).await
    }

    // ========== 小时记录 ==========

    pub async fn find_hourly_entries_in_range(&self, range: &DateRange) -> Result<Vec<HourlyEntry>> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(Vec::new());
        };
        repo.find_hourly_entries_in_range(range).await
    }

    pub async fn find_hourly_entries_by_shift(
        &self,
        shift: &str,
        date: NaiveDate,
    ) -> Result<Vec<HourlyEntry>> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(Vec::new());
        };
        repo.find_hourly_entries_by_shift(shift, date).await
    }

    pub async fn find_hourly_entry(&self, id: &str) -> Result<Option<HourlyEntry>> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(None);
        };
        repo.find_hourly_entry(id).await
    }

    /// 插入小时记录，降级时返回 false
    pub async fn insert_hourly_entry(&self, entry: &HourlyEntry) -> Result<bool> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(false);
        };
        repo.insert_hourly_entry(entry).await?;
        Ok(true)
    }

    pub async fn replace_hourly_entry(&self, id: &str, entry: &HourlyEntry) -> Result<bool> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(false);
        };
        repo.replace_hourly_entry(id, entry).await
    }

    pub async fn delete_hourly_entry(&self, id: &str) -> Result<bool> {
        let Some(repo) = self.ensure_ready().await else {
            return Ok(false);
        };
        repo.delete_hourly_entry(id).await
    }
}

/// 按配置连接数据库，超时时间为连接超时的两倍（MariaDB 需要两次连接）
pub async fn connect(
    settings: &StoreSettings,
) -> Result<Arc<dyn ProductionRepository>, StoreInitError> {
    let backend = settings.backend()?;
    let backend_name = backend.name();
    let limit = Duration::from_secs(settings.connect_timeout_secs.saturating_mul(2).max(1));

    let attempt = async {
        let repository: Arc<dyn ProductionRepository> = match &backend {
            StoreBackend::SQLite { url } => Arc::new(SqliteRepository::new(url, settings).await?),
            StoreBackend::MariaDB { url, database } => {
                info!("连接 MariaDB: {}", display_host(url));
                Arc::new(MariaDbRepository::new(url, database, settings).await?)
            }
        };
        anyhow::Ok(repository)
    };

    match tokio::time::timeout(limit, attempt).await {
        Ok(Ok(repository)) => Ok(repository),
        Ok(Err(e)) => Err(StoreInitError::Connect {
            backend: backend_name,
            message: format!("{:#}", e),
        }),
        Err(_) => Err(StoreInitError::Connect {
            backend: backend_name,
            message: format!("连接超时（{} 秒）", limit.as_secs()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateShiftReport;
    use chrono::NaiveTime;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()
    }

    fn entry() -> BinTippingEntry {
        BinTippingEntry {
            time: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            bins_tipped: 10,
            average_bin_weight: 100.0,
            down_time: 0,
            reason_for_not_achieving_target: String::new(),
            is_lunch_break: false,
        }
    }

    fn hourly() -> HourlyEntry {
        HourlyEntry {
            id: "h1".to_string(),
            date: day(),
            time: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            line_manager: "Aroha".to_string(),
            shift: "Day".to_string(),
            production_line: String::new(),
            bins_tipped: 1,
            average_bin_weight: 1.0,
            down_time: 0,
            reasons_notes: String::new(),
            is_lunch_break: false,
            created_at: Utc::now(),
        }
    }

    /// 降级模式下所有操作都不报错
    async fn assert_fully_degraded(gateway: &StoreGateway) {
        let report = ShiftReport::new(&CreateShiftReport::new(day(), "Aroha", "Day"));
        let range = DateRange::day(day());

        assert!(gateway.find_all_shift_reports().await.unwrap().is_empty());
        assert!(gateway.find_shift_report(&report.id).await.unwrap().is_none());
        assert!(gateway.find_shift_reports_in_range(&range).await.unwrap().is_empty());
        assert!(gateway.find_shift_reports_by_manager("Aroha").await.unwrap().is_empty());
        assert!(!gateway.shift_report_exists(day(), "Day", "Aroha").await.unwrap());
        assert!(gateway.distinct_line_managers().await.unwrap().is_empty());
        assert!(gateway.production_metrics(&range).await.unwrap().is_empty());

        assert!(!gateway.insert_shift_report(&report).await.unwrap());
        assert!(!gateway.replace_shift_report(&report.id, &report).await.unwrap());
        assert!(!gateway.append_bin_tipping(&report.id, &entry(), Utc::now()).await.unwrap());
        assert!(!gateway
            .replace_bin_tipping(&report.id, 0, &entry(), Utc::now())
            .await
            .unwrap());
        assert!(!gateway
            .update_totals(&report.id, 0, &ShiftTotals::default(), Utc::now())
            .await
            .unwrap());
        assert!(!gateway.delete_shift_report(&report.id).await.unwrap());

        assert!(gateway.find_hourly_entries_in_range(&range).await.unwrap().is_empty());
        assert!(gateway.find_hourly_entries_by_shift("Day", day()).await.unwrap().is_empty());
        assert!(gateway.find_hourly_entry("h1").await.unwrap().is_none());
        assert!(!gateway.insert_hourly_entry(&hourly()).await.unwrap());
        assert!(!gateway.replace_hourly_entry("h1", &hourly()).await.unwrap());
        assert!(!gateway.delete_hourly_entry("h1").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_connection_string_degrades() {
        let gateway = StoreGateway::new(StoreSettings::default());
        assert_eq!(gateway.status(), StoreStatus::Uninitialized);

        assert_fully_degraded(&gateway).await;

        let status = gateway.status();
        assert!(status.is_degraded(), "应进入降级模式: {:?}", status);
    }

    #[tokio::test]
    async fn test_unsupported_scheme_degrades() {
        let gateway = StoreGateway::new(StoreSettings {
            connection_string: Some("mongodb://cluster0.example.net".to_string()),
            ..StoreSettings::default()
        });

        assert_fully_degraded(&gateway).await;

        match gateway.status() {
            StoreStatus::Failed { reason } => assert!(reason.contains("mongodb")),
            other => panic!("未收到预期状态: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_failure_degrades_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        // 父路径是普通文件，无法创建数据库
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let gateway = StoreGateway::new(StoreSettings {
            connection_string: Some(format!("sqlite:{}", blocker.join("sub/db.sqlite").display())),
            ..StoreSettings::default()
        });

        assert!(gateway.ensure_ready().await.is_none());
        let failed = gateway.status();
        match &failed {
            StoreStatus::Failed { reason } => assert!(reason.contains("连接 sqlite 失败"), "{}", reason),
            other => panic!("未收到预期状态: {:?}", other),
        }

        // 障碍移除后也不会重新连接
        std::fs::remove_file(&blocker).unwrap();
        std::fs::create_dir_all(blocker.join("sub")).unwrap();

        assert_fully_degraded(&gateway).await;
        assert_eq!(gateway.status(), failed);
        assert!(!blocker.join("sub/db.sqlite").exists());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(StoreGateway::new(StoreSettings {
            connection_string: Some(format!("sqlite:{}", dir.path().join("gw.db").display())),
            ..StoreSettings::default()
        }));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gateway = Arc::clone(&gateway);
            handles.push(tokio::spawn(async move { gateway.ensure_ready().await.is_some() }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        assert_eq!(
            gateway.status(),
            StoreStatus::Ready {
                backend: "sqlite".to_string()
            }
        );

        let report = ShiftReport::new(&CreateShiftReport::new(day(), "Aroha", "Day"));
        assert!(gateway.insert_shift_report(&report).await.unwrap());
        assert!(gateway.find_shift_report(&report.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_with_repository_is_ready_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("ready.db").display());
        let repo = SqliteRepository::new(&url, &StoreSettings::default()).await.unwrap();
        let gateway = StoreGateway::with_repository(Arc::new(repo));

        assert!(matches!(gateway.status(), StoreStatus::Ready { .. }));
    }
}
