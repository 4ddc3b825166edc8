pub mod aggregation;
pub mod models;
pub mod pagination;
pub mod query_builder;
pub mod store;

/// The paginated list views the dashboard serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Batches,
    BatchSummaries,
    Packages,
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            View::Batches => write!(f, "batches"),
            View::BatchSummaries => write!(f, "batch_summaries"),
            View::Packages => write!(f, "packages"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Accepts `asc`/`ASC`/`desc`/`DESC`; anything else is `Desc`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("asc") | Some("ASC") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn flipped(&self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Raw, untrusted request parameters shared by every report view.
///
/// Everything is kept as a string so that malformed numbers degrade to
/// defaults instead of rejecting the request.
#[derive(Debug, Clone, Default)]
pub struct ReportParams {
    pub batch_job_id: Option<String>,
    pub package_name: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub package_to_scan: Option<String>,
    pub record_id: Option<String>,
}

impl ReportParams {
    pub fn batch_job_id(&self) -> Option<&str> {
        non_empty(self.batch_job_id.as_deref())
    }

    pub fn package_name(&self) -> Option<&str> {
        non_empty(self.package_name.as_deref())
    }

    pub fn package_to_scan(&self) -> Option<&str> {
        non_empty(self.package_to_scan.as_deref())
    }

    pub fn record_id(&self) -> Option<&str> {
        non_empty(self.record_id.as_deref())
    }

    /// Builds parameters from decoded key/value pairs. A repeated key keeps
    /// its last value; unknown keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = ReportParams::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "batch_job_id" => &mut params.batch_job_id,
                "package_name" => &mut params.package_name,
                "sort" => &mut params.sort,
                "order" => &mut params.order,
                "page" => &mut params.page,
                "limit" => &mut params.limit,
                "package_to_scan" => &mut params.package_to_scan,
                "record_id" => &mut params.record_id,
                _ => continue,
            };
            *slot = Some(value.into());
        }
        params
    }

    /// Field-wise merge where non-empty values in `other` win.
    pub fn overlay(self, other: ReportParams) -> ReportParams {
        fn pick(base: Option<String>, over: Option<String>) -> Option<String> {
            match over {
                Some(v) if !v.trim().is_empty() => Some(v),
                _ => base,
            }
        }
        ReportParams {
            batch_job_id: pick(self.batch_job_id, other.batch_job_id),
            package_name: pick(self.package_name, other.package_name),
            sort: pick(self.sort, other.sort),
            order: pick(self.order, other.order),
            page: pick(self.page, other.page),
            limit: pick(self.limit, other.limit),
            package_to_scan: pick(self.package_to_scan, other.package_to_scan),
            record_id: pick(self.record_id, other.record_id),
        }
    }
}

/// Trims and drops empty values; HTML forms submit blank fields as "".
pub(crate) fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Escape character for LIKE patterns; independent of `NO_BACKSLASH_ESCAPES`.
pub(crate) const LIKE_ESCAPE: char = '!';

/// Escapes LIKE wildcards so a filter value only ever matches literally.
pub(crate) fn contains_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_accepts_only_exact_spellings() {
        assert_eq!(SortOrder::parse(Some("asc")), SortOrder::Asc);
        assert_eq!(SortOrder::parse(Some("ASC")), SortOrder::Asc);
        assert_eq!(SortOrder::parse(Some("desc")), SortOrder::Desc);
        assert_eq!(SortOrder::parse(Some("DESC")), SortOrder::Desc);
        for raw in ["Asc", " asc", "ascending", "1", "ASC; DROP TABLE batches", ""] {
            assert_eq!(SortOrder::parse(Some(raw)), SortOrder::Desc, "{raw:?}");
        }
        assert_eq!(SortOrder::parse(None), SortOrder::Desc);
    }

    #[test]
    fn test_blank_filters_are_absent() {
        let params = ReportParams {
            batch_job_id: Some("   ".into()),
            package_name: Some(" numpy ".into()),
            ..Default::default()
        };
        assert_eq!(params.batch_job_id(), None);
        assert_eq!(params.package_name(), Some("numpy"));
    }

    #[test]
    fn test_overlay_prefers_non_empty_values() {
        let query = ReportParams {
            batch_job_id: Some("b-1".into()),
            sort: Some("package_name".into()),
            ..Default::default()
        };
        let form = ReportParams {
            package_name: Some("foo".into()),
            sort: Some("".into()),
            ..Default::default()
        };
        let merged = query.overlay(form);
        assert_eq!(merged.batch_job_id(), Some("b-1"));
        assert_eq!(merged.package_name(), Some("foo"));
        assert_eq!(merged.sort.as_deref(), Some("package_name"));
    }

    #[test]
    fn test_repeated_keys_keep_last_value() {
        let params = ReportParams::from_pairs([
            ("sort", "a"),
            ("sort", "start_time"),
            ("page", "1"),
            ("page", "2"),
            ("unknown", "x"),
        ]);
        assert_eq!(params.sort.as_deref(), Some("start_time"));
        assert_eq!(params.page.as_deref(), Some("2"));
        assert_eq!(params.order, None);
    }

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("foo"), "%foo%");
        assert_eq!(contains_pattern("50%_off!"), "%50!%!_off!!%");
    }
}
