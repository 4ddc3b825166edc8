use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::FromRow;

use crate::error::ReportError;
use crate::report::aggregation::{OverviewQuery, PlannedQuery};
use crate::report::models::{
    BatchRow, BatchSummaryRow, ExceptionDetail, FuzzResultRow, HomeReport, OverviewRow,
    PackageRow, TopologyRow,
};
use crate::report::pagination::Page;
use crate::report::query_builder::ListQuery;
use crate::DatabaseConfig;

/// Read side of the dashboard. Handlers only ever see this trait.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn list_batches(&self, query: &ListQuery) -> Result<Page<BatchRow>, ReportError>;

    async fn list_batch_summaries(
        &self,
        query: &ListQuery,
    ) -> Result<Page<BatchSummaryRow>, ReportError>;

    async fn list_packages(&self, query: &ListQuery) -> Result<Page<PackageRow>, ReportError>;

    /// All three home-view reads. Either every read succeeds or the whole
    /// report fails.
    async fn overview(&self, query: &OverviewQuery) -> Result<HomeReport, ReportError>;
}

/// `ReportSource` backed by a bounded MySQL connection pool.
///
/// Constructed once by the process entry point and closed explicitly on
/// shutdown. When every connection is busy, callers wait for one.
#[derive(Clone)]
pub struct MySqlReportStore {
    pool: MySqlPool,
}

impl MySqlReportStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, ReportError> {
        let options = match &config.url {
            Some(url) => url.parse::<MySqlConnectOptions>()?,
            None => MySqlConnectOptions::new()
                .host(&config.host)
                .port(config.port)
                .username(&config.user)
                .password(&config.password)
                .database(&config.database),
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(60 * 60))
            .connect_with(options)
            .await?;
        log::info!(
            "Connected to MySQL (pool size {})",
            config.max_connections.max(1)
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
        log::info!("MySQL pool closed");
    }

    async fn fetch_page<T>(&self, query: &ListQuery) -> Result<Page<T>, ReportError>
    where
        T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
    {
        let stmt = query.statement();
        let table = query.table();

        let mut rows = sqlx::query_as::<_, T>(&stmt.rows_sql);
        let mut count = sqlx::query_scalar::<_, i64>(&stmt.count_sql);
        for value in &stmt.filters {
            rows = rows.bind(value.as_str());
            count = count.bind(value.as_str());
        }
        rows = rows.bind(stmt.limit).bind(stmt.offset);

        let (rows, total) = futures::try_join!(rows.fetch_all(&self.pool), count.fetch_one(&self.pool))
            .map_err(|e| ReportError::from_sqlx(e, table))?;

        Ok(Page::new(rows, total.max(0) as u64, query.page))
    }

    async fn fetch_planned<T>(
        &self,
        planned: &PlannedQuery,
        table: &'static str,
    ) -> Result<Vec<T>, ReportError>
    where
        T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
    {
        let mut q = sqlx::query_as::<_, T>(&planned.sql);
        for value in &planned.binds {
            q = q.bind(value.as_str());
        }
        q.fetch_all(&self.pool)
            .await
            .map_err(|e| ReportError::from_sqlx(e, table))
    }
}

#[async_trait]
impl ReportSource for MySqlReportStore {
    async fn list_batches(&self, query: &ListQuery) -> Result<Page<BatchRow>, ReportError> {
        self.fetch_page(query).await
    }

    async fn list_batch_summaries(
        &self,
        query: &ListQuery,
    ) -> Result<Page<BatchSummaryRow>, ReportError> {
        self.fetch_page(query).await
    }

    async fn list_packages(&self, query: &ListQuery) -> Result<Page<PackageRow>, ReportError> {
        self.fetch_page(query).await
    }

    async fn overview(&self, query: &OverviewQuery) -> Result<HomeReport, ReportError> {
        let overview_sql = query.batch_overview();
        let topology_sql = query.topology_rollup();
        let detail_sql = query.exception_detail();

        let (overview, topologies, results) = futures::try_join!(
            self.fetch_planned::<OverviewRow>(&overview_sql, "batch_summaries"),
            self.fetch_planned::<TopologyRow>(&topology_sql, "topologies"),
            self.fetch_planned::<FuzzResultRow>(&detail_sql, "fuzz_results"),
        )?;

        Ok(HomeReport {
            overview,
            topologies,
            exceptions: results.into_iter().map(ExceptionDetail::from).collect(),
        })
    }
}
