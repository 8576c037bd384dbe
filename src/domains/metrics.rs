// 指标与分析引擎 - 基于班次报告的纯函数，不做任何持久化
//
// 两个效率公式同时存在，分别命名、分别测试：
// - 吞吐效率：按工作时段的每小时倒箱数对比目标值，封顶 100
// - 在线效率：按固定 480 分钟班次扣除停机时长，仅用于数据库侧的区间汇总
//
// 所有函数对空输入返回空集合或 0，不返回错误。

use crate::models::{
    ProductionMetrics, ShiftReport, ShiftSummary, FIXED_SHIFT_MINUTES, TARGET_BINS_PER_HOUR,
    UNSPECIFIED_REASON,
};
use crate::storage::DateRange;
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// 吞吐效率（百分比）
///
/// `working_entries` 至少按 1 计算，结果封顶 100。
pub fn throughput_efficiency(total_tipped: u32, working_entries: usize) -> f64 {
    let hours = working_entries.max(1) as f64;
    let per_hour = f64::from(total_tipped) / hours;
    (per_hour / f64::from(TARGET_BINS_PER_HOUR) * 100.0).min(100.0)
}

/// 单条报告的吞吐效率
pub fn report_efficiency(report: &ShiftReport) -> f64 {
    throughput_efficiency(report.total_tipped, report.working_entry_count())
}

/// 在线效率（百分比）：固定班次时长中未被停机占用的比例
///
/// 与数据库汇总查询中的计算一致，不做截断，停机超过班次时长时为负数。
pub fn uptime_efficiency(total_downtime: u64) -> f64 {
    let shift = f64::from(FIXED_SHIFT_MINUTES);
    (shift - total_downtime as f64) / shift * 100.0
}

/// 算术平均，空输入为 0
pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// 报告摘要
pub fn summarize(report: &ShiftReport) -> ShiftSummary {
    ShiftSummary {
        id: report.id.clone(),
        date: report.date,
        line_manager: report.line_manager.clone(),
        shift: report.shift.clone(),
        total_tipped: report.total_tipped,
        average_weight: report.average_weight,
        total_downtime: report.total_downtime,
        efficiency: report_efficiency(report),
    }
}

/// 单条报告对应的指标点
pub fn report_metrics(report: &ShiftReport) -> ProductionMetrics {
    ProductionMetrics {
        date: report.date,
        total_bins_tipped: u64::from(report.total_tipped),
        average_weight: report.average_weight,
        total_downtime: u64::from(report.total_downtime),
        efficiency_percentage: report_efficiency(report),
        line_manager: report.line_manager.clone(),
    }
}

/// 某一天的合并指标
///
/// 倒箱和停机求和，平均重量和效率取各报告的平均，线长取第一条报告的线长。
pub fn metrics_for_date(date: NaiveDate, reports: &[ShiftReport]) -> ProductionMetrics {
    let Some(first) = reports.first() else {
        return ProductionMetrics::empty(date);
    };

    ProductionMetrics {
        date,
        total_bins_tipped: reports.iter().map(|r| u64::from(r.total_tipped)).sum(),
        average_weight: mean(reports.iter().map(|r| r.average_weight)),
        total_downtime: reports.iter().map(|r| u64::from(r.total_downtime)).sum(),
        efficiency_percentage: mean(reports.iter().map(report_efficiency)),
        line_manager: first.line_manager.clone(),
    }
}

/// 按线长分组，组内取吞吐效率平均
pub fn efficiency_by_manager(reports: &[ShiftReport]) -> BTreeMap<String, f64> {
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for report in reports {
        groups
            .entry(report.line_manager.clone())
            .or_default()
            .push(report_efficiency(report));
    }
    groups
        .into_iter()
        .map(|(manager, values)| (manager, mean(values)))
        .collect()
}

/// 按吞吐效率降序取前 N 条，效率相同的保持原顺序
pub fn top_performing(mut reports: Vec<ShiftReport>, count: usize) -> Vec<ShiftReport> {
    reports.sort_by(|a, b| compare_efficiency(b, a));
    reports.truncate(count);
    reports
}

fn compare_efficiency(a: &ShiftReport, b: &ShiftReport) -> Ordering {
    report_efficiency(a).total_cmp(&report_efficiency(b))
}

/// 吞吐效率落在闭区间 [min, max] 内的报告
pub fn within_efficiency_range(reports: Vec<ShiftReport>, min: f64, max: f64) -> Vec<ShiftReport> {
    reports
        .into_iter()
        .filter(|report| {
            let efficiency = report_efficiency(report);
            efficiency >= min && efficiency <= max
        })
        .collect()
}

/// 某一班次类型的平均吞吐效率，没有匹配报告时为 0
pub fn average_efficiency_for_shift(reports: &[ShiftReport], shift: &str) -> f64 {
    mean(
        reports
            .iter()
            .filter(|report| report.shift == shift)
            .map(report_efficiency),
    )
}

/// 按未达标原因汇总停机分钟数
///
/// 只统计停机大于 0 的时段，原因为空的归入 "Unspecified"。
pub fn downtime_by_reason(reports: &[ShiftReport]) -> BTreeMap<String, u64> {
    let mut analysis: BTreeMap<String, u64> = BTreeMap::new();
    for entry in reports
        .iter()
        .flat_map(|report| report.bin_tippings.iter())
        .filter(|entry| entry.down_time > 0)
    {
        let reason = match entry.reason_for_not_achieving_target.as_str() {
            "" => UNSPECIFIED_REASON,
            reason => reason,
        };
        *analysis.entry(reason.to_string()).or_insert(0) += u64::from(entry.down_time);
    }
    analysis
}

/// 按日历日期汇总倒箱数
pub fn volume_by_date(reports: &[ShiftReport]) -> BTreeMap<NaiveDate, u64> {
    let mut volume: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for report in reports {
        *volume.entry(report.date).or_insert(0) += u64::from(report.total_tipped);
    }
    volume
}

/// 线长在日期区间内的表现序列，每条报告一个点，保持输入顺序
pub fn performance_series(reports: &[ShiftReport], range: &DateRange) -> Vec<ProductionMetrics> {
    reports
        .iter()
        .filter(|report| range.contains(report.date))
        .map(report_metrics)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::accounting;
    use crate::models::{BinTippingEntry, CreateShiftReport};
    use chrono::NaiveTime;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn entry(bins: u32, weight: f64, down: u32, lunch: bool, reason: &str) -> BinTippingEntry {
        BinTippingEntry {
            time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            bins_tipped: bins,
            average_bin_weight: weight,
            down_time: down,
            reason_for_not_achieving_target: reason.to_string(),
            is_lunch_break: lunch,
        }
    }

    fn report(date: NaiveDate, manager: &str, shift: &str, entries: Vec<BinTippingEntry>) -> ShiftReport {
        let mut report = ShiftReport::new(&CreateShiftReport::new(date, manager, shift));
        report.bin_tippings = entries;
        accounting::recompute(report)
    }

    fn lunch_report() -> ShiftReport {
        report(
            day(2),
            "Aroha",
            "Day",
            vec![
                entry(50, 300.0, 0, false, ""),
                entry(0, 0.0, 30, true, "Lunch"),
                entry(60, 310.0, 0, false, ""),
            ],
        )
    }

    #[test]
    fn test_throughput_efficiency_for_two_working_hours() {
        let efficiency = report_efficiency(&lunch_report());
        let expected = (110.0 / 2.0) / 65.0 * 100.0;
        assert!((efficiency - expected).abs() < 1e-9);
        assert!((efficiency - 84.615).abs() < 0.01);
    }

    #[test]
    fn test_throughput_efficiency_is_capped_and_floored() {
        assert_eq!(throughput_efficiency(200, 1), 100.0);
        assert_eq!(throughput_efficiency(65, 1), 100.0);
        assert_eq!(throughput_efficiency(0, 0), 0.0);
        // 没有工作时段时按 1 小时计算
        assert_eq!(throughput_efficiency(13, 0), throughput_efficiency(13, 1));
    }

    #[test]
    fn test_throughput_efficiency_is_monotonic() {
        let mut previous = 0.0;
        for bins in 0..400 {
            let efficiency = throughput_efficiency(bins, 3);
            assert!(efficiency >= previous);
            assert!(efficiency <= 100.0);
            previous = efficiency;
        }
        assert_eq!(previous, 100.0);
    }

    #[test]
    fn test_uptime_efficiency_is_linear() {
        assert_eq!(uptime_efficiency(0), 100.0);
        assert_eq!(uptime_efficiency(480), 0.0);
        assert_eq!(uptime_efficiency(240), 50.0);
        assert_eq!(uptime_efficiency(120), 75.0);
    }

    #[test]
    fn test_downtime_by_reason_buckets_unspecified() {
        let reports = vec![
            report(
                day(1),
                "Aroha",
                "Day",
                vec![
                    entry(40, 300.0, 15, false, ""),
                    entry(40, 300.0, 0, false, "Machine breakdown"),
                    entry(40, 300.0, 20, false, "Machine breakdown"),
                ],
            ),
            report(
                day(2),
                "Wiremu",
                "Night",
                vec![entry(40, 300.0, 5, false, ""), entry(0, 0.0, 30, true, "Lunch")],
            ),
        ];

        let analysis = downtime_by_reason(&reports);
        assert_eq!(analysis.len(), 3);
        assert_eq!(analysis[UNSPECIFIED_REASON], 20);
        assert_eq!(analysis["Machine breakdown"], 20);
        assert_eq!(analysis["Lunch"], 30);
    }

    #[test]
    fn test_downtime_without_minutes_never_appears() {
        let reports = vec![report(day(1), "Aroha", "Day", vec![entry(40, 300.0, 0, false, "Quality issue")])];
        assert!(downtime_by_reason(&reports).is_empty());
    }

    #[test]
    fn test_volume_by_date_sums_same_day() {
        let reports = vec![
            report(day(3), "Aroha", "Day", vec![entry(40, 300.0, 0, false, "")]),
            report(day(3), "Wiremu", "Night", vec![entry(60, 300.0, 0, false, "")]),
        ];
        let volume = volume_by_date(&reports);
        assert_eq!(volume.len(), 1);
        assert_eq!(volume[&day(3)], 100);
    }

    #[test]
    fn test_manager_and_shift_averages() {
        let full = report(day(1), "Aroha", "Day", vec![entry(65, 300.0, 0, false, "")]);
        let half = report(day(2), "Aroha", "Night", vec![entry(13, 300.0, 0, false, "")]);
        let other = report(day(2), "Wiremu", "Day", vec![entry(26, 300.0, 0, false, "")]);
        let reports = vec![full, half, other];

        let by_manager = efficiency_by_manager(&reports);
        assert!((by_manager["Aroha"] - 60.0).abs() < 1e-9);
        assert!((by_manager["Wiremu"] - 40.0).abs() < 1e-9);

        assert!((average_efficiency_for_shift(&reports, "Day") - 70.0).abs() < 1e-9);
        assert_eq!(average_efficiency_for_shift(&reports, "Swing"), 0.0);
    }

    #[test]
    fn test_top_performing_and_range_filter() {
        let low = report(day(1), "A", "Day", vec![entry(13, 1.0, 0, false, "")]);
        let high = report(day(2), "B", "Day", vec![entry(65, 1.0, 0, false, "")]);
        let mid = report(day(3), "C", "Day", vec![entry(39, 1.0, 0, false, "")]);
        let reports = vec![low.clone(), high.clone(), mid.clone()];

        let top = top_performing(reports.clone(), 2);
        assert_eq!(top, vec![high.clone(), mid.clone()]);
        assert_eq!(top_performing(reports.clone(), 10).len(), 3);

        let in_range = within_efficiency_range(reports, 19.5, 60.5);
        assert_eq!(in_range, vec![low, mid]);
    }

    #[test]
    fn test_metrics_for_date() {
        let reports = vec![
            report(day(4), "Aroha", "Day", vec![entry(65, 300.0, 10, false, "")]),
            report(day(4), "Wiremu", "Night", vec![entry(13, 200.0, 20, false, "")]),
        ];
        let metrics = metrics_for_date(day(4), &reports);
        assert_eq!(metrics.total_bins_tipped, 78);
        assert_eq!(metrics.total_downtime, 30);
        assert!((metrics.average_weight - 250.0).abs() < 1e-9);
        assert!((metrics.efficiency_percentage - 60.0).abs() < 1e-9);
        assert_eq!(metrics.line_manager, "Aroha");
    }

    #[test]
    fn test_performance_series_filters_by_range() {
        let reports = vec![
            report(day(9), "Aroha", "Day", vec![entry(65, 300.0, 0, false, "")]),
            report(day(5), "Aroha", "Day", vec![entry(13, 300.0, 0, false, "")]),
            report(day(1), "Aroha", "Day", vec![entry(13, 300.0, 0, false, "")]),
        ];
        let series = performance_series(&reports, &DateRange::between(day(4), day(9)));
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date, day(9));
        assert_eq!(series[0].efficiency_percentage, 100.0);
        assert_eq!(series[1].total_bins_tipped, 13);
    }

    #[test]
    fn test_empty_input_is_total() {
        assert_eq!(mean(Vec::new()), 0.0);
        assert_eq!(metrics_for_date(day(1), &[]), ProductionMetrics::empty(day(1)));
        assert!(efficiency_by_manager(&[]).is_empty());
        assert!(top_performing(Vec::new(), 5).is_empty());
        assert!(downtime_by_reason(&[]).is_empty());
        assert!(volume_by_date(&[]).is_empty());
        assert!(performance_series(&[], &DateRange::default()).is_empty());
    }

    #[test]
    fn test_summary_uses_report_efficiency() {
        let summary = summarize(&lunch_report());
        assert_eq!(summary.total_tipped, 110);
        assert_eq!(summary.total_downtime, 30);
        assert!((summary.efficiency - report_efficiency(&lunch_report())).abs() < 1e-12);
    }
}
