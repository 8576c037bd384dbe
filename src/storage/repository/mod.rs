// Repository 抽象层 - 定义生产数据存储接口

pub mod mariadb;
pub mod sqlite;

use super::models::DateRange;
use crate::models::{BinTippingEntry, HourlyEntry, ProductionMetrics, ShiftReport, ShiftTotals};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// 数据库操作接口 - 所有数据库实现必须实现此 trait
#[async_trait]
pub trait ProductionRepository: Send + Sync {
    // ========== 班次报告查询 ==========

    /// 获取全部报告，按日期倒序
    async fn find_all_shift_reports(&self) -> Result<Vec<ShiftReport>> {
        self.find_shift_reports_in_range(&DateRange::default()).await
    }

    /// 按 ID 获取报告
    async fn find_shift_report(&self, id: &str) -> Result<Option<ShiftReport>>;

    /// 按闭区间日期获取报告，按日期倒序，同日按创建时间先后
    async fn find_shift_reports_in_range(&self, range: &DateRange) -> Result<Vec<ShiftReport>>;

    /// 按线长获取报告，按日期倒序，同日按创建时间先后
    async fn find_shift_reports_by_manager(&self, line_manager: &str) -> Result<Vec<ShiftReport>>;

    /// 是否已存在 (日期, 班次, 线长) 的报告
    async fn shift_report_exists(
        &self,
        date: NaiveDate,
        shift: &str,
        line_manager: &str,
    ) -> Result<bool>;

    /// 去重后的线长列表，升序
    async fn distinct_line_managers(&self) -> Result<Vec<String>>;

    // ========== 班次报告写入 ==========

    /// 插入新报告
    async fn insert_shift_report(&self, report: &ShiftReport) -> Result<()>;

    /// 整体替换报告，返回是否命中
    async fn replace_shift_report(&self, id: &str, report: &ShiftReport) -> Result<bool>;

    /// 在倒箱记录数组末尾追加一条（不读取整条报告）
    async fn append_bin_tipping(
        &self,
        id: &str,
        entry: &BinTippingEntry,
        updated_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// 替换指定下标的倒箱记录，下标越界时不生效
    async fn replace_bin_tipping(
        &self,
        id: &str,
        index: usize,
        entry: &BinTippingEntry,
        updated_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// 只写回三项合计，倒箱记录数不等于 `entry_count` 时不生效
    async fn update_totals(
        &self,
        id: &str,
        entry_count: usize,
        totals: &ShiftTotals,
        updated_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// 删除报告
    async fn delete_shift_report(&self, id: &str) -> Result<bool>;

    // ========== 汇总 ==========

    /// 日期区间汇总：每条报告一行，效率按固定班次时长在数据库中计算，按日期升序
    async fn production_metrics(&self, range: &DateRange) -> Result<Vec<ProductionMetrics>>;

    // ========== 小时记录 ==========

    /// 按闭区间日期获取，按日期、时间倒序
    async fn find_hourly_entries_in_range(&self, range: &DateRange) -> Result<Vec<HourlyEntry>>;

    /// 按班次和日历日期获取，按时间升序
    async fn find_hourly_entries_by_shift(
        &self,
        shift: &str,
        date: NaiveDate,
    ) -> Result<Vec<HourlyEntry>>;

    async fn find_hourly_entry(&self, id: &str) -> Result<Option<HourlyEntry>>;

    async fn insert_hourly_entry(&self, entry: &HourlyEntry) -> Result<()>;

    async fn replace_hourly_entry(&self, id: &str, entry: &HourlyEntry) -> Result<bool>;

    async fn delete_hourly_entry(&self, id: &str) -> Result<bool>;

    // ========== 数据库初始化和元数据 ==========

    /// 初始化数据库表结构
    async fn initialize_tables(&self) -> Result<()>;

    /// 获取数据库类型标识
    fn db_type(&self) -> &str;
}

/// 倒箱记录数组中某个下标的 JSON 路径
pub(crate) fn entry_path(index: usize) -> String {
    format!("$[{}]", index)
}
