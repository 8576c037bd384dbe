// 生产服务 - 对外的服务边界
//
// 组合存储网关、核算引擎和指标引擎。
// 存储不可用时所有读操作返回空结果，写操作返回 false（创建操作回显输入）。

use super::{accounting, metrics};
use crate::models::{
    BinTippingEntry, CreateShiftReport, HourlyEntry, ProductionMetrics, ShiftReport, ShiftSummary,
};
use crate::storage::{DateRange, StoreGateway, StoreSettings, StoreStatus};
use crate::utils::validation;
use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 合计写入冲突时的最大尝试次数
const TOTALS_REFRESH_ATTEMPTS: usize = 3;

/// 生产数据服务
#[derive(Clone)]
pub struct ProductionService {
    gateway: Arc<StoreGateway>,
}

impl ProductionService {
    pub fn new(gateway: Arc<StoreGateway>) -> Self {
        Self { gateway }
    }

    /// 按存储配置创建服务，连接在第一次调用时建立
    pub fn from_settings(settings: StoreSettings) -> Self {
        Self::new(Arc::new(StoreGateway::new(settings)))
    }

    /// 存储状态，用于区分"没有数据"和"存储不可用"
    pub fn store_status(&self) -> StoreStatus {
        self.gateway.status()
    }

    /// 主动触发一次初始化（可选，所有操作都会懒加载）
    pub async fn warm_up(&self) -> StoreStatus {
        self.gateway.ensure_ready().await;
        self.gateway.status()
    }

    // ========== 班次报告 ==========

    /// 创建空班次报告
    ///
    /// 存储不可用时返回未持久化的报告。
    pub async fn create_shift_report(&self, request: CreateShiftReport) -> Result<ShiftReport> {
        validation::validate_create_request(&request).map_err(|e| anyhow!(e))?;

        let report = ShiftReport::new(&request);
        let applied = self
            .gateway
            .insert_shift_report(&report)
            .await
            .context("创建班次报告失败")?;

        if applied {
            info!(
                "创建班次报告: {} ({} / {} / {})",
                report.id, report.date, report.shift, report.line_manager
            );
        } else {
            warn!("存储不可用，班次报告未保存: {}", report.id);
        }
        Ok(report)
    }

    pub async fn get_all_shift_reports(&self) -> Result<Vec<ShiftReport>> {
        self.gateway.find_all_shift_reports().await
    }

    pub async fn get_shift_report(&self, id: &str) -> Result<Option<ShiftReport>> {
        self.gateway.find_shift_report(id).await
    }

    /// 闭区间日期内的报告，按日期倒序
    pub async fn get_shift_reports_in_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ShiftReport>> {
        self.gateway
            .find_shift_reports_in_range(&DateRange::between(from, to))
            .await
    }

    pub async fn get_shift_reports_by_manager(&self, line_manager: &str) -> Result<Vec<ShiftReport>> {
        self.gateway.find_shift_reports_by_manager(line_manager).await
    }

    /// 班次摘要，可选日期过滤
    pub async fn get_shift_summaries(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<ShiftSummary>> {
        let reports = self
            .gateway
            .find_shift_reports_in_range(&DateRange { from, to })
            .await?;
        Ok(reports.iter().map(metrics::summarize).collect())
    }

    /// 整体替换报告
    ///
    /// 派生合计在写入前按倒箱记录重新计算，id 以参数为准，更新时间取当前时间。
    pub async fn update_shift_report(&self, id: &str, report: ShiftReport) -> Result<bool> {
        let mut report = accounting::recompute(report);
        report.id = id.to_string();
        report.updated_at = Utc::now();

        let applied = self
            .gateway
            .replace_shift_report(id, &report)
            .await
            .with_context(|| format!("更新班次报告失败: {}", id))?;
        if applied {
            info!("更新班次报告: {}", id);
        }
        Ok(applied)
    }

    /// 追加倒箱记录并重新计算合计
    ///
    /// 追加和重算是两次写入，第二次失败时记录已追加但合计未更新，错误会返回给调用方。
    /// 重算只写合计列，不会覆盖并发追加的记录。
    pub async fn add_bin_tipping(&self, id: &str, entry: BinTippingEntry) -> Result<bool> {
        validation::validate_bin_tipping(&entry).map_err(|e| anyhow!(e))?;

        debug!("追加倒箱记录: 报告 {}, 时段 {}", id, entry.time);
        let applied = self
            .gateway
            .append_bin_tipping(id, &entry, Utc::now())
            .await
            .with_context(|| format!("追加倒箱记录失败: {}", id))?;
        if !applied {
            warn!("追加倒箱记录未生效: {}", id);
            return Ok(false);
        }

        info!("已追加倒箱记录: {}", id);
        self.refresh_totals(id).await?;
        Ok(true)
    }

    /// 替换指定下标的倒箱记录并重新计算合计，下标越界时返回 false
    pub async fn update_bin_tipping(
        &self,
        id: &str,
        index: usize,
        entry: BinTippingEntry,
    ) -> Result<bool> {
        validation::validate_bin_tipping(&entry).map_err(|e| anyhow!(e))?;

        let applied = self
            .gateway
            .replace_bin_tipping(id, index, &entry, Utc::now())
            .await
            .with_context(|| format!("更新倒箱记录失败: {}[{}]", id, index))?;
        if !applied {
            warn!("更新倒箱记录未生效: {}[{}]", id, index);
            return Ok(false);
        }

        info!("已更新倒箱记录: {}[{}]", id, index);
        self.refresh_totals(id).await?;
        Ok(true)
    }

    // 重新读取报告、计算合计并只写回合计列
    //
    // 写入以读到的倒箱记录数为条件，期间有并发追加时重新读取。
    async fn refresh_totals(&self, id: &str) -> Result<()> {
        for attempt in 1..=TOTALS_REFRESH_ATTEMPTS {
            let Some(report) = self.gateway.find_shift_report(id).await? else {
                // 追加之后报告已被删除
                warn!("重新计算合计时报告不存在: {}", id);
                return Ok(());
            };

            let totals = accounting::totals_for(&report.bin_tippings);
            let written = self
                .gateway
                .update_totals(id, report.bin_tippings.len(), &totals, Utc::now())
                .await;
            match written {
                Ok(true) => {
                    debug!(
                        "合计已更新: {} tipped={} downtime={}",
                        id, totals.total_tipped, totals.total_downtime
                    );
                    return Ok(());
                }
                Ok(false) => {
                    debug!(
                        "倒箱记录在重算期间发生变化，重试 ({}/{}): {}",
                        attempt, TOTALS_REFRESH_ATTEMPTS, id
                    );
                }
                Err(e) => {
                    error!("倒箱记录已写入但合计更新失败: {} - {:#}", id, e);
                    return Err(e.context(format!("合计更新失败，报告 {} 的合计可能已过期", id)));
                }
            }
        }

        // 最后一个完成的写入方会写入最新合计
        warn!("合计更新多次冲突，交由并发写入方完成: {}", id);
        Ok(())
    }

    pub async fn delete_shift_report(&self, id: &str) -> Result<bool> {
        let deleted = self
            .gateway
            .delete_shift_report(id)
            .await
            .with_context(|| format!("删除班次报告失败: {}", id))?;
        if deleted {
            info!("删除班次报告: {}", id);
        }
        Ok(deleted)
    }

    pub async fn shift_report_exists(
        &self,
        date: NaiveDate,
        shift: &str,
        line_manager: &str,
    ) -> Result<bool> {
        self.gateway.shift_report_exists(date, shift, line_manager).await
    }

    /// 去重并排序的线长列表
    pub async fn active_line_managers(&self) -> Result<Vec<String>> {
        self.gateway.distinct_line_managers().await
    }

    // ========== 小时记录 ==========

    pub async fn get_hourly_entries_in_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<HourlyEntry>> {
        self.gateway
            .find_hourly_entries_in_range(&DateRange::between(from, to))
            .await
    }

    pub async fn get_hourly_entries_by_shift(
        &self,
        shift: &str,
        date: NaiveDate,
    ) -> Result<Vec<HourlyEntry>> {
        self.gateway.find_hourly_entries_by_shift(shift, date).await
    }

    pub async fn get_hourly_entry(&self, id: &str) -> Result<Option<HourlyEntry>> {
        self.gateway.find_hourly_entry(id).await
    }

    /// 创建小时记录，返回记录 id
    ///
    /// 没有 id 时生成新的 id；存储不可用时只返回 id，不保存。
    pub async fn create_hourly_entry(&self, mut entry: HourlyEntry) -> Result<String> {
        if entry.id.trim().is_empty() {
            entry.id = uuid::Uuid::new_v4().to_string();
        }
        entry.created_at = Utc::now();

        let applied = self
            .gateway
            .insert_hourly_entry(&entry)
            .await
            .context("创建小时记录失败")?;
        if applied {
            info!("创建小时记录: {} ({} {})", entry.id, entry.date, entry.time);
        } else {
            warn!("存储不可用，小时记录未保存: {}", entry.id);
        }
        Ok(entry.id)
    }

    pub async fn update_hourly_entry(&self, id: &str, mut entry: HourlyEntry) -> Result<bool> {
        entry.id = id.to_string();
        self.gateway
            .replace_hourly_entry(id, &entry)
            .await
            .with_context(|| format!("更新小时记录失败: {}", id))
    }

    pub async fn delete_hourly_entry(&self, id: &str) -> Result<bool> {
        self.gateway
            .delete_hourly_entry(id)
            .await
            .with_context(|| format!("删除小时记录失败: {}", id))
    }

    // ========== 指标 ==========

    /// 区间汇总：数据库侧按固定班次时长计算效率，按日期升序
    pub async fn get_production_metrics(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ProductionMetrics>> {
        self.gateway
            .production_metrics(&DateRange::between(from, to))
            .await
    }

    /// 趋势序列，与区间汇总相同
    pub async fn get_production_trends(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ProductionMetrics>> {
        self.get_production_metrics(from, to).await
    }

    /// 某一天的合并指标，没有报告时为零值
    pub async fn get_production_metrics_for_date(&self, date: NaiveDate) -> Result<ProductionMetrics> {
        let reports = self
            .gateway
            .find_shift_reports_in_range(&DateRange::day(date))
            .await?;
        Ok(metrics::metrics_for_date(date, &reports))
    }

    pub async fn get_efficiency_by_manager(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeMap<String, f64>> {
        let reports = self.get_shift_reports_in_range(from, to).await?;
        Ok(metrics::efficiency_by_manager(&reports))
    }

    pub async fn get_top_performing_shifts(&self, count: usize) -> Result<Vec<ShiftReport>> {
        let reports = self.gateway.find_all_shift_reports().await?;
        Ok(metrics::top_performing(reports, count))
    }

    pub async fn get_shift_reports_by_efficiency_range(
        &self,
        min: f64,
        max: f64,
    ) -> Result<Vec<ShiftReport>> {
        let reports = self.gateway.find_all_shift_reports().await?;
        Ok(metrics::within_efficiency_range(reports, min, max))
    }

    pub async fn get_average_efficiency_by_shift_type(
        &self,
        shift: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<f64> {
        let reports = self.get_shift_reports_in_range(from, to).await?;
        Ok(metrics::average_efficiency_for_shift(&reports, shift))
    }

    /// 停机原因分析
    pub async fn get_downtime_analysis(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeMap<String, u64>> {
        let reports = self.get_shift_reports_in_range(from, to).await?;
        Ok(metrics::downtime_by_reason(&reports))
    }

    /// 线长表现序列，每条报告一个点
    pub async fn get_line_manager_performance(
        &self,
        line_manager: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ProductionMetrics>> {
        let reports = self.gateway.find_shift_reports_by_manager(line_manager).await?;
        Ok(metrics::performance_series(&reports, &DateRange::between(from, to)))
    }

    pub async fn get_production_volume_by_date(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, u64>> {
        let reports = self.get_shift_reports_in_range(from, to).await?;
        Ok(metrics::volume_by_date(&reports))
    }
}
