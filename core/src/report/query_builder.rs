use crate::report::pagination::PageRequest;
use crate::report::{contains_pattern, non_empty, ReportParams, SortOrder, View, LIKE_ESCAPE};

/// Static description of one list view. Only the strings in here ever reach
/// the SQL text; request values are bound as parameters.
#[derive(Debug)]
pub struct ViewSpec {
    pub table: &'static str,
    pub columns: &'static [&'static str],
    pub sortable: &'static [&'static str],
    pub default_sort: &'static str,
    /// Column matched by the `package_name` "contains" filter.
    pub name_column: &'static str,
    /// Appended to every ORDER BY so paging is deterministic.
    pub tie_breaker: &'static str,
}

const BATCHES: ViewSpec = ViewSpec {
    table: "batches",
    columns: &[
        "batch_job_id",
        "package_name",
        "start_time",
        "stop_time",
        "batch_status",
        "discovered_methods",
        "discovered_methods_date",
    ],
    sortable: &[
        "batch_job_id",
        "package_name",
        "start_time",
        "stop_time",
        "batch_status",
        "discovered_methods",
        "discovered_methods_date",
    ],
    default_sort: "discovered_methods",
    name_column: "package_name",
    tie_breaker: "batch_job_id",
};

const BATCH_SUMMARIES: ViewSpec = ViewSpec {
    table: "batch_summaries",
    columns: &[
        "batch_summary_id",
        "batch_job_id",
        "package_name",
        "exception_type",
        "exception_occurences",
        "exception_occurences_date",
    ],
    sortable: &[
        "batch_job_id",
        "package_name",
        "exception_type",
        "exception_occurences",
        "exception_occurences_date",
    ],
    default_sort: "exception_occurences",
    name_column: "package_name",
    tie_breaker: "batch_summary_id",
};

const PACKAGES: ViewSpec = ViewSpec {
    table: "package_records",
    columns: &[
        "id",
        "batch_job_id",
        "name",
        "version",
        "author",
        "summary",
        "description",
        "home_page",
        "license",
        "keywords",
        "project_url",
        "project_urls",
    ],
    sortable: &["name", "version", "author", "home_page", "license", "batch_job_id"],
    default_sort: "name",
    name_column: "name",
    tie_breaker: "id",
};

impl View {
    pub fn spec(&self) -> &'static ViewSpec {
        match self {
            View::Batches => &BATCHES,
            View::BatchSummaries => &BATCH_SUMMARIES,
            View::Packages => &PACKAGES,
        }
    }
}

/// Looks `raw` up in an allow-list and returns the list's own string, so the
/// caller's value is never what gets formatted into SQL.
pub(crate) fn resolve_sort(
    allowed: &'static [&'static str],
    default: &'static str,
    raw: Option<&str>,
) -> &'static str {
    raw.and_then(|r| allowed.iter().copied().find(|col| *col == r))
        .unwrap_or(default)
}

/// A fully validated request against one list view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub view: View,
    pub batch_job_id: Option<String>,
    pub package_name: Option<String>,
    pub sort: &'static str,
    pub order: SortOrder,
    pub page: PageRequest,
}

/// Parameterized SQL for one page of a list view plus its match count.
///
/// Bind `filters` in order to both statements; the row statement then
/// takes `limit` and `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListStatement {
    pub rows_sql: String,
    pub count_sql: String,
    pub filters: Vec<String>,
    pub limit: i64,
    pub offset: i64,
}

impl ListQuery {
    pub fn from_params(view: View, params: &ReportParams) -> Self {
        let spec = view.spec();
        Self {
            view,
            batch_job_id: params.batch_job_id().map(str::to_string),
            package_name: params.package_name().map(str::to_string),
            sort: resolve_sort(spec.sortable, spec.default_sort, non_empty(params.sort.as_deref())),
            order: SortOrder::parse(params.order.as_deref()),
            page: PageRequest::resolve(params.page.as_deref(), params.limit.as_deref()),
        }
    }

    pub fn table(&self) -> &'static str {
        self.view.spec().table
    }

    pub fn statement(&self) -> ListStatement {
        let spec = self.view.spec();

        let mut conditions = Vec::new();
        let mut filters = Vec::new();
        if let Some(id) = &self.batch_job_id {
            conditions.push("batch_job_id = ?".to_string());
            filters.push(id.clone());
        }
        if let Some(name) = &self.package_name {
            conditions.push(format!("{} LIKE ? ESCAPE '{}'", spec.name_column, LIKE_ESCAPE));
            filters.push(contains_pattern(name));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let rows_sql = format!(
            "SELECT {} FROM {}{} ORDER BY {} {}, {} ASC LIMIT ? OFFSET ?",
            spec.columns.join(", "),
            spec.table,
            where_clause,
            self.sort,
            self.order.as_sql(),
            spec.tie_breaker,
        );
        let count_sql = format!("SELECT COUNT(*) FROM {}{}", spec.table, where_clause);

        ListStatement {
            rows_sql,
            count_sql,
            filters,
            limit: i64::try_from(self.page.limit).unwrap_or(i64::MAX),
            offset: i64::try_from(self.page.offset()).unwrap_or(i64::MAX),
        }
    }
}
