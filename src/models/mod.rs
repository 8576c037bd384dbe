// 数据模型模块 - 班次报告、倒箱记录、小时记录以及派生投影

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// 每小时目标倒箱数
pub const TARGET_BINS_PER_HOUR: u32 = 65;

/// 固定班次时长（分钟），8 小时
pub const FIXED_SHIFT_MINUTES: u32 = 480;

/// 未填写原因的停机归类键
pub const UNSPECIFIED_REASON: &str = "Unspecified";

/// 单个小时时段的倒箱记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinTippingEntry {
    /// 时段时间
    pub time: NaiveTime,
    /// 倒箱数量
    pub bins_tipped: u32,
    /// 平均箱重
    pub average_bin_weight: f64,
    /// 停机时长（分钟）
    pub down_time: u32,
    /// 未达标原因，空字符串表示未记录
    #[serde(default)]
    pub reason_for_not_achieving_target: String,
    /// 午休时段不计入产量和重量平均，但计入停机
    #[serde(default)]
    pub is_lunch_break: bool,
}

impl BinTippingEntry {
    /// 是否为工作时段（非午休）
    pub fn is_working(&self) -> bool {
        !self.is_lunch_break
    }
}

/// 二次包装计数，与倒箱计算无关
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartonCounts {
    pub winscan_cartons: u32,
    pub packers: u32,
    pub div_per_hour: f64,
}

/// 班次报告 - 每个 (日期, 班次, 线长) 一条
///
/// `total_tipped`、`average_weight`、`total_downtime` 是缓存的派生字段，
/// 只能由核算引擎根据 `bin_tippings` 写入。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftReport {
    pub id: String,
    /// 业务日期（本地日历日期，不做时区换算）
    pub date: NaiveDate,
    pub line_manager: String,
    pub shift: String,
    #[serde(default)]
    pub bin_tippings: Vec<BinTippingEntry>,
    #[serde(default)]
    pub total_tipped: u32,
    #[serde(default)]
    pub average_weight: f64,
    #[serde(default)]
    pub total_downtime: u32,
    #[serde(default)]
    pub carton_counts: CartonCounts,
    /// 审计时间戳，始终为 UTC
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShiftReport {
    /// 根据创建请求生成一条空报告
    ///
    /// 日期只保留日历日期部分，时间和偏移全部丢弃。
    pub fn new(request: &CreateShiftReport) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date: request.civil_date(),
            line_manager: request.line_manager.clone(),
            shift: request.shift.clone(),
            bin_tippings: Vec::new(),
            total_tipped: 0,
            average_weight: 0.0,
            total_downtime: 0,
            carton_counts: CartonCounts::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// 工作时段（非午休）
    pub fn working_entries(&self) -> impl Iterator<Item = &BinTippingEntry> {
        self.bin_tippings.iter().filter(|entry| entry.is_working())
    }

    pub fn working_entry_count(&self) -> usize {
        self.working_entries().count()
    }
}

/// 由倒箱记录得出的三项合计
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShiftTotals {
    pub total_tipped: u32,
    pub average_weight: f64,
    pub total_downtime: u32,
}

impl ShiftTotals {
    /// 报告当前缓存的合计
    pub fn of(report: &ShiftReport) -> Self {
        Self {
            total_tipped: report.total_tipped,
            average_weight: report.average_weight,
            total_downtime: report.total_downtime,
        }
    }
}

/// 创建班次报告请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShiftReport {
    /// 前端提交的日期，可能带时间或时区偏移
    #[serde(deserialize_with = "deserialize_wall_clock")]
    pub date: NaiveDateTime,
    pub line_manager: String,
    pub shift: String,
}

impl CreateShiftReport {
    pub fn new(date: NaiveDate, line_manager: impl Into<String>, shift: impl Into<String>) -> Self {
        Self {
            date: date.and_time(NaiveTime::MIN),
            line_manager: line_manager.into(),
            shift: shift.into(),
        }
    }

    /// 截断为日历日期
    pub fn civil_date(&self) -> NaiveDate {
        self.date.date()
    }
}

/// 独立持久化的小时记录，与班次报告之间没有引用约束
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyEntry {
    #[serde(default)]
    pub id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub line_manager: String,
    pub shift: String,
    #[serde(default)]
    pub production_line: String,
    pub bins_tipped: u32,
    pub average_bin_weight: f64,
    pub down_time: u32,
    #[serde(default)]
    pub reasons_notes: String,
    #[serde(default)]
    pub is_lunch_break: bool,
    pub created_at: DateTime<Utc>,
}

/// 列表/看板用的班次摘要（读取时计算，不持久化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftSummary {
    pub id: String,
    pub date: NaiveDate,
    pub line_manager: String,
    pub shift: String,
    pub total_tipped: u32,
    pub average_weight: f64,
    pub total_downtime: u32,
    pub efficiency: f64,
}

/// 看板图表用的生产指标（读取时计算，不持久化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionMetrics {
    pub date: NaiveDate,
    pub total_bins_tipped: u64,
    pub average_weight: f64,
    pub total_downtime: u64,
    pub efficiency_percentage: f64,
    pub line_manager: String,
}

impl ProductionMetrics {
    /// 没有任何报告时的零值指标
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_bins_tipped: 0,
            average_weight: 0.0,
            total_downtime: 0,
            efficiency_percentage: 0.0,
            line_manager: String::new(),
        }
    }
}

/// 常见停机原因
///
/// 存储仍使用自由文本，这里只提供标准选项和显示名。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DowntimeReason {
    None,
    RotationFromJumbleFillers,
    PucVarietyExchange,
    PucExchange,
    Lunch,
    WaitingForPackingInstruction,
    CleaningForNextShift,
    MachineBreakdown,
    MaterialShortage,
    QualityIssue,
    Other,
}

impl DowntimeReason {
    pub const ALL: [DowntimeReason; 11] = [
        Self::None,
        Self::RotationFromJumbleFillers,
        Self::PucVarietyExchange,
        Self::PucExchange,
        Self::Lunch,
        Self::WaitingForPackingInstruction,
        Self::CleaningForNextShift,
        Self::MachineBreakdown,
        Self::MaterialShortage,
        Self::QualityIssue,
        Self::Other,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::RotationFromJumbleFillers => "Rotation from jumble fillers",
            Self::PucVarietyExchange => "PUC variety exchange",
            Self::PucExchange => "PUC exchange",
            Self::Lunch => "Lunch",
            Self::WaitingForPackingInstruction => "Waiting for packing instruction",
            Self::CleaningForNextShift => "Cleaning for next shift",
            Self::MachineBreakdown => "Machine breakdown",
            Self::MaterialShortage => "Material shortage",
            Self::QualityIssue => "Quality issue",
            Self::Other => "Other",
        }
    }

    /// 按显示名匹配（忽略大小写和首尾空白）
    pub fn from_display_name(text: &str) -> Option<Self> {
        let text = text.trim();
        Self::ALL
            .into_iter()
            .find(|reason| reason.display_name().eq_ignore_ascii_case(text))
    }
}

// 自定义反序列化：接受 "YYYY-MM-DD"、不带时区的日期时间或 RFC3339
// 带偏移的值只取其墙上时间，不做时区换算
fn deserialize_wall_clock<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_wall_clock(&s).map_err(serde::de::Error::custom)
}

pub fn parse_wall_clock(s: &str) -> Result<NaiveDateTime, String> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_local());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(dt);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN))
        .map_err(|e| format!("日期格式错误: {} ({})", s, e))
}
