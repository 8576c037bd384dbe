// 存储模块 - 统一的数据库抽象层

// 子模块
pub mod config;
pub mod gateway;
pub mod models;
pub mod repository;

// 重新导出主要类型
pub use config::{StoreBackend, StoreInitError, StoreSettings};
pub use gateway::{StoreGateway, StoreStatus};
pub use models::DateRange;
pub use repository::ProductionRepository;

// 重新导出具体实现（可选，用于高级用法）
pub use repository::mariadb::MariaDbRepository;
pub use repository::sqlite::SqliteRepository;
