//! Row shapes read from the fuzzer's database. Nothing here is ever written
//! back; the external tool owns every table.

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;

use crate::utils::artifact::{decode_artifact, ArtifactKind};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BatchRow {
    pub batch_job_id: String,
    pub package_name: String,
    pub start_time: NaiveDateTime,
    pub stop_time: Option<NaiveDateTime>,
    pub batch_status: String,
    pub discovered_methods: Option<i32>,
    pub discovered_methods_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BatchSummaryRow {
    pub batch_summary_id: String,
    pub batch_job_id: Option<String>,
    pub package_name: String,
    pub exception_type: String,
    pub exception_occurences: Option<i32>,
    pub exception_occurences_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PackageRow {
    pub id: String,
    pub batch_job_id: Option<String>,
    pub name: String,
    pub version: String,
    pub author: Option<String>,
    pub summary: Option<String>,
    /// Markdown, as published on the package index.
    pub description: Option<String>,
    pub home_page: Option<String>,
    pub license: Option<String>,
    pub keywords: Option<String>,
    pub project_url: Option<String>,
    pub project_urls: Option<String>,
}

/// Latest batch per package with its exception summary rolled up.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OverviewRow {
    pub batch_job_id: String,
    pub package_name: String,
    pub version: String,
    pub start_time: NaiveDateTime,
    pub stop_time: Option<NaiveDateTime>,
    pub batch_status: String,
    pub discovered_methods: Option<i32>,
    pub discovered_methods_date: Option<NaiveDateTime>,
    pub home_page: Option<String>,
    pub project_url: Option<String>,
    pub project_urls: Option<String>,
    /// e.g. `ValueError, TypeError`
    pub exceptions: Option<String>,
    /// e.g. `ValueError(3), TypeError(1)`
    pub exception_count: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TopologyRow {
    pub batch_job_id: String,
    pub package_name: String,
    pub resolved_name: String,
    pub modules_count: i64,
    pub modules: Option<String>,
    pub classes_count: i64,
    pub classes: Option<String>,
    pub methods_count: i64,
    pub methods: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FuzzResultRow {
    pub record_id: String,
    pub batch_job_id: String,
    pub package_name: String,
    pub record_name: Option<String>,
    pub method_name: String,
    pub encoded_source: Option<String>,
    pub improved_source: Option<String>,
    pub exception_traceback: Option<String>,
    pub exception_message: Option<String>,
    pub inputs: Option<String>,
    pub exception_type: Option<String>,
    pub is_python_exception: bool,
}

/// A fuzz result ready for display: artifacts decoded and HTML-escaped.
#[derive(Debug, Clone, Serialize)]
pub struct ExceptionDetail {
    pub record_id: String,
    pub batch_job_id: String,
    pub package_name: String,
    pub method_name: String,
    pub exception_type: Option<String>,
    pub exception_message: Option<String>,
    pub inputs: Option<String>,
    pub source_html: String,
    pub improved_source_html: String,
    pub traceback_html: String,
}

impl From<FuzzResultRow> for ExceptionDetail {
    fn from(row: FuzzResultRow) -> Self {
        Self {
            source_html: decode_artifact(ArtifactKind::Source, row.encoded_source.as_deref()),
            improved_source_html: decode_artifact(
                ArtifactKind::ImprovedSource,
                row.improved_source.as_deref(),
            ),
            traceback_html: decode_artifact(
                ArtifactKind::Traceback,
                row.exception_traceback.as_deref(),
            ),
            record_id: row.record_id,
            batch_job_id: row.batch_job_id,
            package_name: row.package_name,
            method_name: row.method_name,
            exception_type: row.exception_type,
            exception_message: row.exception_message,
            inputs: row.inputs,
        }
    }
}

/// Everything the home view shows; only ever built when all three reads
/// succeeded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HomeReport {
    pub overview: Vec<OverviewRow>,
    pub topologies: Vec<TopologyRow>,
    pub exceptions: Vec<ExceptionDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fuzz_row() -> FuzzResultRow {
        FuzzResultRow {
            record_id: "r-1".into(),
            batch_job_id: "b-1".into(),
            package_name: "foo".into(),
            record_name: Some("foo".into()),
            method_name: "foo.parse".into(),
            // "<b>x</b>"
            encoded_source: Some("PGI+eDwvYj4=".into()),
            improved_source: None,
            exception_traceback: Some("!!not base64!!".into()),
            exception_message: Some("bad".into()),
            inputs: Some("('a',)".into()),
            exception_type: Some("ValueError".into()),
            is_python_exception: true,
        }
    }

    #[test]
    fn test_exception_detail_decodes_each_artifact() {
        let detail = ExceptionDetail::from(fuzz_row());
        assert_eq!(detail.source_html, "&lt;b&gt;x&lt;/b&gt;");
        assert_eq!(detail.improved_source_html, "No Improved Source Available");
        assert_eq!(detail.traceback_html, "Full Traceback Unknown");
        assert_eq!(detail.method_name, "foo.parse");
    }
}
