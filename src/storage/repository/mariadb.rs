// MariaDB 数据库实现

use super::{entry_path, ProductionRepository};
use crate::models::{
    BinTippingEntry, HourlyEntry, ProductionMetrics, ShiftReport, ShiftTotals, FIXED_SHIFT_MINUTES,
};
use crate::storage::config::{display_host, StoreSettings};
use crate::storage::models::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::str::FromStr;
use tracing::info;

const REPORT_COLUMNS: &str = "id, date, line_manager, shift, bin_tippings, total_tipped, \
     average_weight, total_downtime, carton_counts, created_at, updated_at";

const HOURLY_COLUMNS: &str = "id, date, time, line_manager, shift, production_line, bins_tipped, \
     average_bin_weight, down_time, reasons_notes, is_lunch_break, created_at";

/// MariaDB 数据库实现
pub struct MariaDbRepository {
    pool: MySqlPool,
    reports_table: String,
    hourly_table: String,
}

impl MariaDbRepository {
    /// 创建新的 MariaDB 数据库连接
    pub async fn new(url: &str, database: &str, settings: &StoreSettings) -> Result<Self> {
        let host = display_host(url);
        info!("初始化 MariaDB 数据库: {}/{}", host, database);

        if !database
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            anyhow::bail!("非法数据库名: {}", database);
        }

        let timeout = std::time::Duration::from_secs(settings.connect_timeout_secs);
        let server_options = MySqlConnectOptions::from_str(url)?;

        // 先连接到服务器（不指定数据库），检查并创建数据库
        info!("连接到 MariaDB 服务器检查数据库是否存在...");
        let server_pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(timeout)
            .connect_with(server_options.clone())
            .await
            .map_err(|e| anyhow::anyhow!("连接 MariaDB 服务器失败 ({}): {}", host, e))?;

        let db_exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.schemata WHERE schema_name = ?",
        )
        .bind(database)
        .fetch_one(&server_pool)
        .await?;

        if db_exists == 0 {
            info!("数据库 '{}' 不存在，正在创建...", database);
            sqlx::query(&format!(
                "CREATE DATABASE `{}` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci",
                database
            ))
            .execute(&server_pool)
            .await?;
        }

        // 关闭临时连接
        server_pool.close().await;

        // 创建连接池
        let pool = MySqlPoolOptions::new()
            .max_connections(settings.max_connections.max(1))
            .idle_timeout(std::time::Duration::from_secs(180))
            .max_lifetime(std::time::Duration::from_secs(1800))
            .acquire_timeout(timeout)
            .connect_with(server_options.database(database))
            .await
            .map_err(|e| {
                anyhow::anyhow!("创建 MariaDB 连接池失败 ({}/{}): {}", host, database, e)
            })?;

        info!("MariaDB 连接池创建成功");

        let repo = Self {
            pool,
            reports_table: settings.shift_reports_table.clone(),
            hourly_table: settings.hourly_entries_table.clone(),
        };

        repo.initialize_tables().await?;

        Ok(repo)
    }
}

fn into_reports(rows: Vec<ShiftReportRow>) -> Result<Vec<ShiftReport>> {
    rows.into_iter().map(ShiftReport::try_from).collect()
}

fn into_hourly(rows: Vec<HourlyEntryRow>) -> Result<Vec<HourlyEntry>> {
    rows.into_iter().map(HourlyEntry::try_from).collect()
}

#[async_trait]
impl ProductionRepository for MariaDbRepository {
    // ========== 班次报告查询 ==========

    async fn find_shift_report(&self, id: &str) -> Result<Option<ShiftReport>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?",
            REPORT_COLUMNS, self.reports_table
        );
        let row = sqlx::query_as::<_, ShiftReportRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ShiftReport::try_from).transpose()
    }

    async fn find_shift_reports_in_range(&self, range: &DateRange) -> Result<Vec<ShiftReport>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY date DESC, created_at ASC",
            REPORT_COLUMNS,
            self.reports_table,
            range.sql_conditions("date")
        );
        let mut query = sqlx::query_as::<_, ShiftReportRow>(&sql);
        if let Some(from) = range.from {
            query = query.bind(from);
        }
        if let Some(to) = range.to {
            query = query.bind(to);
        }

        into_reports(query.fetch_all(&self.pool).await?)
    }

    async fn find_shift_reports_by_manager(&self, line_manager: &str) -> Result<Vec<ShiftReport>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE line_manager = ? ORDER BY date DESC, created_at ASC",
            REPORT_COLUMNS, self.reports_table
        );
        let rows = sqlx::query_as::<_, ShiftReportRow>(&sql)
            .bind(line_manager)
            .fetch_all(&self.pool)
            .await?;

        into_reports(rows)
    }

    async fn shift_report_exists(
        &self,
        date: NaiveDate,
        shift: &str,
        line_manager: &str,
    ) -> Result<bool> {
        let sql = format!(
            "SELECT id FROM {} WHERE date = ? AND shift = ? AND line_manager = ? LIMIT 1",
            self.reports_table
        );
        let found: Option<String> = sqlx::query_scalar(&sql)
            .bind(date)
            .bind(shift)
            .bind(line_manager)
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }

    async fn distinct_line_managers(&self) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT line_manager FROM {} ORDER BY line_manager",
            self.reports_table
        );
        let managers: Vec<String> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(managers)
    }

    // ========== 班次报告写入 ==========

    async fn insert_shift_report(&self, report: &ShiftReport) -> Result<()> {
        let row = ShiftReportRow::from_report(report)?;
        let sql = format!(
            "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.reports_table, REPORT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&row.id)
            .bind(row.date)
            .bind(&row.line_manager)
            .bind(&row.shift)
            .bind(&row.bin_tippings)
            .bind(row.total_tipped)
            .bind(row.average_weight)
            .bind(row.total_downtime)
            .bind(&row.carton_counts)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn replace_shift_report(&self, id: &str, report: &ShiftReport) -> Result<bool> {
        let row = ShiftReportRow::from_report(report)?;
        let sql = format!(
            r#"
            UPDATE {} SET date = ?, line_manager = ?, shift = ?, bin_tippings = ?,
                   total_tipped = ?, average_weight = ?, total_downtime = ?,
                   carton_counts = ?, created_at = ?, updated_at = ?
            WHERE id = ?
            "#,
            self.reports_table
        );
        let result = sqlx::query(&sql)
            .bind(row.date)
            .bind(&row.line_manager)
            .bind(&row.shift)
            .bind(&row.bin_tippings)
            .bind(row.total_tipped)
            .bind(row.average_weight)
            .bind(row.total_downtime)
            .bind(&row.carton_counts)
            .bind(row.created_at)
            .bind(row.updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_bin_tipping(
        &self,
        id: &str,
        entry: &BinTippingEntry,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        // JSON_EXTRACT 保证追加的是对象而不是字符串
        let sql = format!(
            "UPDATE {} SET bin_tippings = JSON_ARRAY_APPEND(bin_tippings, '$', JSON_EXTRACT(?, '$')), updated_at = ? WHERE id = ?",
            self.reports_table
        );
        let result = sqlx::query(&sql)
            .bind(serde_json::to_string(entry)?)
            .bind(updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn replace_bin_tipping(
        &self,
        id: &str,
        index: usize,
        entry: &BinTippingEntry,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let sql = format!(
            r#"
            UPDATE {} SET bin_tippings = JSON_REPLACE(bin_tippings, ?, JSON_EXTRACT(?, '$')), updated_at = ?
            WHERE id = ? AND JSON_LENGTH(bin_tippings) > ?
            "#,
            self.reports_table
        );
        let index_bound = i64::try_from(index).context("倒箱记录下标过大")?;
        let result = sqlx::query(&sql)
            .bind(entry_path(index))
            .bind(serde_json::to_string(entry)?)
            .bind(updated_at)
            .bind(id)
            .bind(index_bound)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_totals(
        &self,
        id: &str,
        entry_count: usize,
        totals: &ShiftTotals,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let sql = format!(
            r#"
            UPDATE {} SET total_tipped = ?, average_weight = ?, total_downtime = ?, updated_at = ?
            WHERE id = ? AND JSON_LENGTH(bin_tippings) = ?
            "#,
            self.reports_table
        );
        let count = i64::try_from(entry_count).context("倒箱记录数过大")?;
        let result = sqlx::query(&sql)
            .bind(i64::from(totals.total_tipped))
            .bind(totals.average_weight)
            .bind(i64::from(totals.total_downtime))
            .bind(updated_at)
            .bind(id)
            .bind(count)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_shift_report(&self, id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.reports_table);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    // ========== 汇总 ==========

    async fn production_metrics(&self, range: &DateRange) -> Result<Vec<ProductionMetrics>> {
        // E0 后缀让 MariaDB 按 DOUBLE 计算，避免返回 DECIMAL
        let sql = format!(
            r#"
            SELECT date, line_manager, total_tipped, average_weight, total_downtime,
                   (({minutes}E0 - total_downtime) / {minutes}E0) * 100E0 AS efficiency
            FROM {table}
            WHERE {conditions}
            ORDER BY date ASC, created_at ASC
            "#,
            minutes = FIXED_SHIFT_MINUTES,
            table = self.reports_table,
            conditions = range.sql_conditions("date"),
        );
        let mut query = sqlx::query_as::<_, MetricsRow>(&sql);
        if let Some(from) = range.from {
            query = query.bind(from);
        }
        if let Some(to) = range.to {
            query = query.bind(to);
        }

        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(ProductionMetrics::try_from)
            .collect()
    }

    // ========== 小时记录 ==========

    async fn find_hourly_entries_in_range(&self, range: &DateRange) -> Result<Vec<HourlyEntry>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY date DESC, time DESC",
            HOURLY_COLUMNS,
            self.hourly_table,
            range.sql_conditions("date")
        );
        let mut query = sqlx::query_as::<_, HourlyEntryRow>(&sql);
        if let Some(from) = range.from {
            query = query.bind(from);
        }
        if let Some(to) = range.to {
            query = query.bind(to);
        }

        into_hourly(query.fetch_all(&self.pool).await?)
    }

    async fn find_hourly_entries_by_shift(
        &self,
        shift: &str,
        date: NaiveDate,
    ) -> Result<Vec<HourlyEntry>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE shift = ? AND date = ? ORDER BY time ASC",
            HOURLY_COLUMNS, self.hourly_table
        );
        let rows = sqlx::query_as::<_, HourlyEntryRow>(&sql)
            .bind(shift)
            .bind(date)
            .fetch_all(&self.pool)
            .await?;

        into_hourly(rows)
    }

    async fn find_hourly_entry(&self, id: &str) -> Result<Option<HourlyEntry>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?",
            HOURLY_COLUMNS, self.hourly_table
        );
        let row = sqlx::query_as::<_, HourlyEntryRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(HourlyEntry::try_from).transpose()
    }

    async fn insert_hourly_entry(&self, entry: &HourlyEntry) -> Result<()> {
        let row = HourlyEntryRow::from(entry);
        let sql = format!(
            "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.hourly_table, HOURLY_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&row.id)
            .bind(row.date)
            .bind(row.time)
            .bind(&row.line_manager)
            .bind(&row.shift)
            .bind(&row.production_line)
            .bind(row.bins_tipped)
            .bind(row.average_bin_weight)
            .bind(row.down_time)
            .bind(&row.reasons_notes)
            .bind(row.is_lunch_break)
            .bind(row.created_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn replace_hourly_entry(&self, id: &str, entry: &HourlyEntry) -> Result<bool> {
        let row = HourlyEntryRow::from(entry);
        let sql = format!(
            r#"
            UPDATE {} SET date = ?, time = ?, line_manager = ?, shift = ?, production_line = ?,
                   bins_tipped = ?, average_bin_weight = ?, down_time = ?, reasons_notes = ?,
                   is_lunch_break = ?, created_at = ?
            WHERE id = ?
            "#,
            self.hourly_table
        );
        let result = sqlx::query(&sql)
            .bind(row.date)
            .bind(row.time)
            .bind(&row.line_manager)
            .bind(&row.shift)
            .bind(&row.production_line)
            .bind(row.bins_tipped)
            .bind(row.average_bin_weight)
            .bind(row.down_time)
            .bind(&row.reasons_notes)
            .bind(row.is_lunch_break)
            .bind(row.created_at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_hourly_entry(&self, id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.hourly_table);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    // ========== 数据库初始化和元数据 ==========

    async fn initialize_tables(&self) -> Result<()> {
        let reports = &self.reports_table;
        let hourly = &self.hourly_table;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {reports} (
                id VARCHAR(36) PRIMARY KEY,
                date DATE NOT NULL,
                line_manager VARCHAR(255) NOT NULL,
                shift VARCHAR(255) NOT NULL,
                bin_tippings LONGTEXT NOT NULL,
                total_tipped BIGINT NOT NULL DEFAULT 0,
                average_weight DOUBLE NOT NULL DEFAULT 0,
                total_downtime BIGINT NOT NULL DEFAULT 0,
                carton_counts LONGTEXT NOT NULL,
                created_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NOT NULL,
                INDEX idx_{reports}_date (date),
                INDEX idx_{reports}_manager (line_manager),
                INDEX idx_{reports}_lookup (date, shift, line_manager)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {hourly} (
                id VARCHAR(36) PRIMARY KEY,
                date DATE NOT NULL,
                time TIME NOT NULL,
                line_manager VARCHAR(255) NOT NULL,
                shift VARCHAR(255) NOT NULL,
                production_line VARCHAR(255) NOT NULL DEFAULT '',
                bins_tipped BIGINT NOT NULL DEFAULT 0,
                average_bin_weight DOUBLE NOT NULL DEFAULT 0,
                down_time BIGINT NOT NULL DEFAULT 0,
                reasons_notes TEXT NOT NULL,
                is_lunch_break BOOLEAN NOT NULL DEFAULT FALSE,
                created_at DATETIME(6) NOT NULL,
                INDEX idx_{hourly}_date (date),
                INDEX idx_{hourly}_shift_date (shift, date)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci
        "#
        ))
        .execute(&self.pool)
        .await?;

        info!("MariaDB 表初始化完成");
        Ok(())
    }

    fn db_type(&self) -> &str {
        "mariadb"
    }
}
