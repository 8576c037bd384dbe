//! 输入验证工具函数
//!
//! 创建请求和条目的字段校验，失败时返回可直接展示的错误信息

use crate::models::{BinTippingEntry, CreateShiftReport};

/// 线长名称最大长度（字符）
pub const MAX_LINE_MANAGER_LEN: usize = 100;

/// 班次名称最大长度（字符）
pub const MAX_SHIFT_LEN: usize = 50;

/// 验证必填文本字段：去除首尾空白后非空，且不超过长度上限
///
/// # 参数
/// - `field`: 字段名，用于错误信息
/// - `value`: 字段值
/// - `max_len`: 最大字符数
pub fn validate_required_text(field: &str, value: &str, max_len: usize) -> Result<(), String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{} 不能为空", field));
    }
    let len = trimmed.chars().count();
    if len > max_len {
        return Err(format!("{} 长度超过上限 {}（当前 {}）", field, max_len, len));
    }
    Ok(())
}

/// 验证创建班次报告请求
pub fn validate_create_request(request: &CreateShiftReport) -> Result<(), String> {
    validate_required_text("lineManager", &request.line_manager, MAX_LINE_MANAGER_LEN)?;
    validate_required_text("shift", &request.shift, MAX_SHIFT_LEN)?;
    Ok(())
}

/// 验证倒箱记录的平均箱重为有效的非负数
pub fn validate_bin_tipping(entry: &BinTippingEntry) -> Result<(), String> {
    if !entry.average_bin_weight.is_finite() || entry.average_bin_weight < 0.0 {
        return Err(format!("无效的平均箱重: {}", entry.average_bin_weight));
    }
    Ok(())
}
