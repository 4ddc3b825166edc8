//! The three multi-table reads behind the home view.
//!
//! Each read groups by the natural identity of its output row so that the
//! fan-out of the joins never yields duplicate rows.

use crate::report::query_builder::resolve_sort;
use crate::report::{contains_pattern, non_empty, ReportParams, SortOrder, LIKE_ESCAPE};

const OVERVIEW_SORTABLE: &[&str] = &["package_name", "start_time", "stop_time", "discovered_methods"];
const OVERVIEW_DEFAULT_SORT: &str = "package_name";

/// Parameterized SQL plus its positional bind values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedQuery {
    pub sql: String,
    pub binds: Vec<String>,
}

/// Validated parameters for the home view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewQuery {
    pub package_name: Option<String>,
    pub batch_job_id: Option<String>,
    pub sort: &'static str,
    pub order: SortOrder,
}

impl Default for OverviewQuery {
    fn default() -> Self {
        Self {
            package_name: None,
            batch_job_id: None,
            sort: OVERVIEW_DEFAULT_SORT,
            order: SortOrder::Desc,
        }
    }
}

impl OverviewQuery {
    pub fn from_params(params: &ReportParams) -> Self {
        Self {
            package_name: params.package_name().map(str::to_string),
            batch_job_id: params.batch_job_id().map(str::to_string),
            sort: resolve_sort(
                OVERVIEW_SORTABLE,
                OVERVIEW_DEFAULT_SORT,
                non_empty(params.sort.as_deref()),
            ),
            order: SortOrder::parse(params.order.as_deref()),
        }
    }

    /// Latest batch per package, left-joined to its package record and
    /// inner-joined to its exception summaries.
    pub fn batch_overview(&self) -> PlannedQuery {
        let mut sql = String::from(
            "SELECT b.batch_job_id, b.package_name, \
             COALESCE(pr.version, 'Unknown') AS version, \
             b.start_time, b.stop_time, b.batch_status, \
             b.discovered_methods, b.discovered_methods_date, \
             pr.home_page, pr.project_url, pr.project_urls, \
             GROUP_CONCAT(bs.exception_type \
             ORDER BY bs.exception_occurences DESC, bs.batch_summary_id ASC SEPARATOR ', ') AS exceptions, \
             GROUP_CONCAT(CONCAT(bs.exception_type, '(', COALESCE(bs.exception_occurences, 0), ')') \
             ORDER BY bs.exception_occurences DESC, bs.batch_summary_id ASC SEPARATOR ', ') AS exception_count \
             FROM batches b \
             JOIN batch_summaries bs \
             ON b.batch_job_id = bs.batch_job_id AND b.package_name = bs.package_name \
             LEFT JOIN package_records pr \
             ON b.batch_job_id = pr.batch_job_id AND b.package_name = pr.name \
             WHERE b.start_time = (\
             SELECT MAX(b2.start_time) FROM batches b2 WHERE b2.package_name = b.package_name)",
        );
        let mut binds = Vec::new();
        self.push_filters(&mut sql, &mut binds, true);
        sql.push_str(
            " GROUP BY b.batch_job_id, b.package_name, b.start_time, b.stop_time, \
             b.batch_status, b.discovered_methods, b.discovered_methods_date, \
             pr.version, pr.home_page, pr.project_url, pr.project_urls",
        );
        sql.push_str(&format!(
            " ORDER BY b.{} {}, b.batch_job_id ASC",
            self.sort,
            self.order.as_sql()
        ));
        PlannedQuery { sql, binds }
    }

    /// Distinct module/class/method counts and lists per batch.
    pub fn topology_rollup(&self) -> PlannedQuery {
        let mut sql = String::from(
            "SELECT b.batch_job_id, b.package_name, \
             COALESCE(pr.name, 'Unknown') AS resolved_name, \
             COUNT(DISTINCT t.module_name) AS modules_count, \
             GROUP_CONCAT(DISTINCT t.module_name ORDER BY t.module_name DESC SEPARATOR ', ') AS modules, \
             COUNT(DISTINCT t.class_name) AS classes_count, \
             GROUP_CONCAT(DISTINCT t.class_name ORDER BY t.class_name DESC SEPARATOR ', ') AS classes, \
             COUNT(DISTINCT t.method_name) AS methods_count, \
             GROUP_CONCAT(DISTINCT t.method_name ORDER BY t.method_name DESC SEPARATOR ', ') AS methods \
             FROM batches b \
             LEFT JOIN package_records pr \
             ON b.batch_job_id = pr.batch_job_id AND b.package_name = pr.name \
             LEFT JOIN topologies t \
             ON b.batch_job_id = t.batch_job_id AND b.package_name = t.package_name",
        );
        let mut binds = Vec::new();
        self.push_filters(&mut sql, &mut binds, false);
        sql.push_str(
            " GROUP BY b.batch_job_id, b.package_name, pr.name \
             ORDER BY MAX(b.start_time) DESC, b.batch_job_id ASC",
        );
        PlannedQuery { sql, binds }
    }

    /// Fuzz results flagged as genuine Python exceptions.
    pub fn exception_detail(&self) -> PlannedQuery {
        let mut sql = String::from(
            "SELECT fr.record_id, b.batch_job_id, b.package_name, \
             pr.name AS record_name, fr.method_name, \
             fr.encoded_source, fr.improved_source, fr.exception_traceback, \
             fr.exception AS exception_message, fr.inputs, fr.exception_type, \
             fr.is_python_exception \
             FROM batches b \
             LEFT JOIN package_records pr \
             ON b.batch_job_id = pr.batch_job_id AND b.package_name = pr.name \
             LEFT JOIN fuzz_results fr \
             ON b.batch_job_id = fr.batch_job_id AND b.package_name = fr.package_name \
             WHERE fr.is_python_exception = 1",
        );
        let mut binds = Vec::new();
        self.push_filters(&mut sql, &mut binds, true);
        sql.push_str(
            " GROUP BY fr.record_id, b.batch_job_id, b.package_name, pr.name, \
             fr.method_name, fr.exception, fr.inputs, fr.encoded_source, \
             fr.improved_source, fr.exception_traceback, fr.exception_type, \
             fr.is_python_exception \
             ORDER BY fr.method_name DESC, fr.record_id ASC",
        );
        PlannedQuery { sql, binds }
    }

    fn push_filters(&self, sql: &mut String, binds: &mut Vec<String>, has_where: bool) {
        let mut keyword = if has_where { " AND" } else { " WHERE" };
        if let Some(name) = &self.package_name {
            sql.push_str(&format!("{} b.package_name LIKE ? ESCAPE '{}'", keyword, LIKE_ESCAPE));
            binds.push(contains_pattern(name));
            keyword = " AND";
        }
        if let Some(id) = &self.batch_job_id {
            sql.push_str(&format!("{} b.batch_job_id = ?", keyword));
            binds.push(id.clone());
        }
    }
}
