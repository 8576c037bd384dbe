// 核算引擎 - 根据倒箱记录重新计算班次报告的缓存合计
//
// 三条规则：
// - 倒箱合计只统计非午休时段
// - 平均重量取非午休时段平均箱重的算术平均，没有工作时段时为 0
// - 停机合计统计全部时段，包括午休

use crate::models::{BinTippingEntry, ShiftReport};

pub use crate::models::ShiftTotals;

/// 计算一组倒箱记录的合计
pub fn totals_for(entries: &[BinTippingEntry]) -> ShiftTotals {
    let mut total_tipped: u32 = 0;
    let mut weight_sum = 0.0;
    let mut working = 0usize;
    let mut total_downtime: u32 = 0;

    for entry in entries {
        total_downtime = total_downtime.saturating_add(entry.down_time);
        if entry.is_working() {
            total_tipped = total_tipped.saturating_add(entry.bins_tipped);
            weight_sum += entry.average_bin_weight;
            working += 1;
        }
    }

    let average_weight = if working == 0 {
        0.0
    } else {
        weight_sum / working as f64
    };

    ShiftTotals {
        total_tipped,
        average_weight,
        total_downtime,
    }
}

/// 覆盖报告的派生字段并返回
pub fn recompute(mut report: ShiftReport) -> ShiftReport {
    recompute_in_place(&mut report);
    report
}

pub fn recompute_in_place(report: &mut ShiftReport) {
    let totals = totals_for(&report.bin_tippings);
    report.total_tipped = totals.total_tipped;
    report.average_weight = totals.average_weight;
    report.total_downtime = totals.total_downtime;
}

/// 缓存的合计是否与倒箱记录一致
pub fn is_consistent(report: &ShiftReport) -> bool {
    ShiftTotals::of(report) == totals_for(&report.bin_tippings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateShiftReport;
    use chrono::{NaiveDate, NaiveTime};

    fn entry(bins: u32, weight: f64, down: u32, lunch: bool) -> BinTippingEntry {
        BinTippingEntry {
            time: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            bins_tipped: bins,
            average_bin_weight: weight,
            down_time: down,
            reason_for_not_achieving_target: String::new(),
            is_lunch_break: lunch,
        }
    }

    fn report_with(entries: Vec<BinTippingEntry>) -> ShiftReport {
        let request = CreateShiftReport::new(NaiveDate::from_ymd_opt(2025, 4, 7).unwrap(), "Hemi", "Day");
        let mut report = ShiftReport::new(&request);
        report.bin_tippings = entries;
        report
    }

    #[test]
    fn test_lunch_counts_toward_downtime_only() {
        let report = recompute(report_with(vec![
            entry(50, 300.0, 0, false),
            entry(0, 0.0, 30, true),
            entry(60, 310.0, 0, false),
        ]));

        assert_eq!(report.total_tipped, 110);
        assert!((report.average_weight - 305.0).abs() < 1e-9);
        assert_eq!(report.total_downtime, 30);
        assert!(is_consistent(&report));
    }

    #[test]
    fn test_no_working_entries_means_zero_average() {
        let totals = totals_for(&[entry(20, 500.0, 45, true)]);
        assert_eq!(totals.total_tipped, 0);
        assert_eq!(totals.average_weight, 0.0);
        assert_eq!(totals.total_downtime, 45);

        assert_eq!(totals_for(&[]), ShiftTotals::default());
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let once = recompute(report_with(vec![
            entry(41, 287.5, 12, false),
            entry(3, 10.0, 60, true),
            entry(58, 301.25, 0, false),
        ]));
        let twice = recompute(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_stale_totals_are_overwritten() {
        let mut report = report_with(vec![entry(10, 100.0, 5, false)]);
        report.total_tipped = 999;
        report.total_downtime = 0;
        assert!(!is_consistent(&report));

        recompute_in_place(&mut report);
        assert_eq!(report.total_tipped, 10);
        assert_eq!(report.total_downtime, 5);
    }

    #[test]
    fn test_append_matches_rebuild_from_scratch() {
        let mut incremental = recompute(report_with(vec![entry(50, 300.0, 0, false)]));
        incremental.bin_tippings.push(entry(0, 0.0, 30, true));
        recompute_in_place(&mut incremental);
        incremental.bin_tippings.push(entry(60, 310.0, 0, false));
        recompute_in_place(&mut incremental);

        let rebuilt = totals_for(&[
            entry(50, 300.0, 0, false),
            entry(0, 0.0, 30, true),
            entry(60, 310.0, 0, false),
        ]);
        assert_eq!(ShiftTotals::of(&incremental), rebuilt);
    }
}
