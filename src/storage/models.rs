// 存储行结构 - 数据库记录与领域模型之间的转换
//
// 倒箱记录和包装计数以 JSON 文本存在报告行里，读取时一次性校验并转换

use crate::models::{BinTippingEntry, CartonCounts, HourlyEntry, ProductionMetrics, ShiftReport};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// 班次报告行
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShiftReportRow {
    pub id: String,
    pub date: NaiveDate,
    pub line_manager: String,
    pub shift: String,
    pub bin_tippings: String, // JSON数组
    pub total_tipped: i64,
    pub average_weight: f64,
    pub total_downtime: i64,
    pub carton_counts: String, // JSON对象
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShiftReportRow {
    pub fn from_report(report: &ShiftReport) -> Result<Self> {
        Ok(Self {
            id: report.id.clone(),
            date: report.date,
            line_manager: report.line_manager.clone(),
            shift: report.shift.clone(),
            bin_tippings: serde_json::to_string(&report.bin_tippings)?,
            total_tipped: i64::from(report.total_tipped),
            average_weight: report.average_weight,
            total_downtime: i64::from(report.total_downtime),
            carton_counts: serde_json::to_string(&report.carton_counts)?,
            created_at: report.created_at,
            updated_at: report.updated_at,
        })
    }
}

impl TryFrom<ShiftReportRow> for ShiftReport {
    type Error = anyhow::Error;

    fn try_from(row: ShiftReportRow) -> Result<Self> {
        let bin_tippings: Vec<BinTippingEntry> = serde_json::from_str(&row.bin_tippings)
            .with_context(|| format!("报告 {} 的倒箱记录格式错误", row.id))?;
        let carton_counts: CartonCounts = if row.carton_counts.trim().is_empty() {
            CartonCounts::default()
        } else {
            serde_json::from_str(&row.carton_counts)
                .with_context(|| format!("报告 {} 的包装计数格式错误", row.id))?
        };

        Ok(ShiftReport {
            total_tipped: to_u32(row.total_tipped, "total_tipped")?,
            total_downtime: to_u32(row.total_downtime, "total_downtime")?,
            id: row.id,
            date: row.date,
            line_manager: row.line_manager,
            shift: row.shift,
            bin_tippings,
            average_weight: row.average_weight,
            carton_counts,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// 小时记录行
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HourlyEntryRow {
    pub id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub line_manager: String,
    pub shift: String,
    pub production_line: String,
    pub bins_tipped: i64,
    pub average_bin_weight: f64,
    pub down_time: i64,
    pub reasons_notes: String,
    pub is_lunch_break: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&HourlyEntry> for HourlyEntryRow {
    fn from(entry: &HourlyEntry) -> Self {
        Self {
            id: entry.id.clone(),
            date: entry.date,
            time: entry.time,
            line_manager: entry.line_manager.clone(),
            shift: entry.shift.clone(),
            production_line: entry.production_line.clone(),
            bins_tipped: i64::from(entry.bins_tipped),
            average_bin_weight: entry.average_bin_weight,
            down_time: i64::from(entry.down_time),
            reasons_notes: entry.reasons_notes.clone(),
            is_lunch_break: entry.is_lunch_break,
            created_at: entry.created_at,
        }
    }
}

impl TryFrom<HourlyEntryRow> for HourlyEntry {
    type Error = anyhow::Error;

    fn try_from(row: HourlyEntryRow) -> Result<Self> {
        Ok(HourlyEntry {
            bins_tipped: to_u32(row.bins_tipped, "bins_tipped")?,
            down_time: to_u32(row.down_time, "down_time")?,
            id: row.id,
            date: row.date,
            time: row.time,
            line_manager: row.line_manager,
            shift: row.shift,
            production_line: row.production_line,
            average_bin_weight: row.average_bin_weight,
            reasons_notes: row.reasons_notes,
            is_lunch_break: row.is_lunch_break,
            created_at: row.created_at,
        })
    }
}

/// 日期区间汇总查询的结果行，效率由数据库按固定班次时长计算
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MetricsRow {
    pub date: NaiveDate,
    pub line_manager: String,
    pub total_tipped: i64,
    pub average_weight: f64,
    pub total_downtime: i64,
    pub efficiency: f64,
}

impl TryFrom<MetricsRow> for ProductionMetrics {
    type Error = anyhow::Error;

    fn try_from(row: MetricsRow) -> Result<Self> {
        if !row.efficiency.is_finite() {
            anyhow::bail!("汇总效率不是有效数字: {}", row.efficiency);
        }
        Ok(ProductionMetrics {
            date: row.date,
            total_bins_tipped: u64::from(to_u32(row.total_tipped, "total_tipped")?),
            average_weight: row.average_weight,
            total_downtime: u64::from(to_u32(row.total_downtime, "total_downtime")?),
            efficiency_percentage: row.efficiency,
            line_manager: row.line_manager,
        })
    }
}

fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).with_context(|| format!("字段 {} 超出范围: {}", field, value))
}

/// 可选的闭区间日期过滤
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn day(date: NaiveDate) -> Self {
        Self::between(date, date)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }

    /// 生成 WHERE 条件片段，参数按 from、to 顺序绑定
    pub(crate) fn sql_conditions(&self, column: &str) -> String {
        let mut clauses = Vec::new();
        if self.from.is_some() {
            clauses.push(format!("{} >= ?", column));
        }
        if self.to.is_some() {
            clauses.push(format!("{} <= ?", column));
        }
        if clauses.is_empty() {
            "1 = 1".to_string()
        } else {
            clauses.join(" AND ")
        }
    }
}
