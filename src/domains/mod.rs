// 领域模块 - 用于组织应用的业务逻辑
//
// 包含3个部分:核算、指标分析、生产服务

pub mod accounting;
pub mod metrics;
pub mod production;

pub use accounting::ShiftTotals;
pub use production::ProductionService;
