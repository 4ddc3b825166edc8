use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use fyzzdash_core::{
    ListQuery, OverviewQuery, Page, ReportError, ReportParams, ReportSource, ScanBridge,
    ScanCommand, ScanError, ScanStatus, View,
};

use url::form_urlencoded;

use crate::views::{self, ScanBanner};

const MISSING_PR_PARAMS: &str = "record_id or package_name was not provided.";

/// Shared handles every request handler works with.
#[derive(Clone)]
pub struct AppState {
    pub reports: Arc<dyn ReportSource>,
    pub scans: Arc<ScanBridge>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/batches", get(batches_get).post(batches_post))
        .route("/batches/summaries", get(summaries_get).post(summaries_post))
        .route("/packages", get(packages))
        .route("/pull_requests/new", get(pull_request))
        .route("/about", get(about))
        .route("/healthz", get(healthz))
        .fallback(not_found)
        .with_state(state)
}

/// Logs the full error and keeps only the user-facing text.
fn report_failure<T>(view: View, err: ReportError, query: &ListQuery) -> (Page<T>, String) {
    log::error!("{} query failed: {}", view, err);
    (Page::empty(query.page), err.user_message())
}

/// Runs the tool and turns every non-input failure into a danger banner.
/// Invalid arguments are returned so the caller can answer 400.
async fn run_scan(scans: &ScanBridge, command: ScanCommand) -> Result<ScanBanner, ScanError> {
    let command_line = command.command_line(scans.display_name());
    match scans.run(&command).await {
        Ok(outcome) => Ok(ScanBanner {
            status: outcome.status(),
            command_line: outcome.command_line.clone(),
            message: outcome.message().to_string(),
        }),
        Err(err) if err.is_invalid_input() => Err(err),
        Err(err) => {
            log::error!("{} failed: {}", command_line, err);
            Ok(ScanBanner { status: ScanStatus::Danger, command_line, message: err.to_string() })
        }
    }
}

/// Decodes a query string or form body. Parsing never fails: undecodable
/// bytes are replaced and a repeated key keeps its last value.
fn parse_params(raw: &[u8]) -> ReportParams {
    ReportParams::from_pairs(form_urlencoded::parse(raw))
}

fn query_params(raw: Option<String>) -> ReportParams {
    parse_params(raw.as_deref().unwrap_or_default().as_bytes())
}

/// Query string overlaid with the form body; the body's content type is
/// not checked.
fn merged_params(raw: Option<String>, body: &Bytes) -> ReportParams {
    query_params(raw).overlay(parse_params(body))
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Html(views::render_server_error(message))).into_response()
}

async fn home(State(state): State<AppState>, RawQuery(raw): RawQuery) -> Response {
    let query = OverviewQuery::from_params(&query_params(raw));
    match state.reports.overview(&query).await {
        Ok(report) => Html(views::render_home(&report, &query)).into_response(),
        Err(err) => {
            log::error!("home overview failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(views::render_server_error(&err.user_message())),
            )
                .into_response()
        }
    }
}

async fn batches_get(State(state): State<AppState>, RawQuery(raw): RawQuery) -> Response {
    batches(state, query_params(raw)).await
}

async fn batches_post(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
    body: Bytes,
) -> Response {
    batches(state, merged_params(raw, &body)).await
}

/// Batch list, optionally preceded by a scan of `package_to_scan`. The scan
/// finishes before the list is read so a new batch shows up immediately.
async fn batches(state: AppState, params: ReportParams) -> Response {
    let banner = match params.package_to_scan() {
        Some(package) => {
            let scanned = match ScanCommand::scan(package) {
                Ok(command) => run_scan(&state.scans, command).await,
                Err(err) => Err(err),
            };
            match scanned {
                Ok(banner) => Some(banner),
                Err(err) => return bad_request(&err.to_string()),
            }
        }
        None => None,
    };

    let query = ListQuery::from_params(View::Batches, &params);
    let (page, error) = match state.reports.list_batches(&query).await {
        Ok(page) => (page, None),
        Err(err) => {
            let (page, message) = report_failure(View::Batches, err, &query);
            (page, Some(message))
        }
    };
    Html(views::render_batches(&page, &query, banner.as_ref(), error.as_deref())).into_response()
}

async fn summaries_get(State(state): State<AppState>, RawQuery(raw): RawQuery) -> Response {
    summaries(state, query_params(raw)).await
}

async fn summaries_post(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
    body: Bytes,
) -> Response {
    summaries(state, merged_params(raw, &body)).await
}

async fn summaries(state: AppState, params: ReportParams) -> Response {
    let query = ListQuery::from_params(View::BatchSummaries, &params);
    let (page, error) = match state.reports.list_batch_summaries(&query).await {
        Ok(page) => (page, None),
        Err(err) => {
            let (page, message) = report_failure(View::BatchSummaries, err, &query);
            (page, Some(message))
        }
    };
    Html(views::render_batch_summaries(&page, &query, error.as_deref())).into_response()
}

async fn packages(State(state): State<AppState>, RawQuery(raw): RawQuery) -> Response {
    let query = ListQuery::from_params(View::Packages, &query_params(raw));
    let (page, error) = match state.reports.list_packages(&query).await {
        Ok(page) => (page, None),
        Err(err) => {
            let (page, message) = report_failure(View::Packages, err, &query);
            (page, Some(message))
        }
    };
    Html(views::render_packages(&page, &query, error.as_deref())).into_response()
}

async fn pull_request(State(state): State<AppState>, RawQuery(raw): RawQuery) -> Response {
    let params = query_params(raw);
    let (Some(package), Some(record_id)) = (params.package_name(), params.record_id()) else {
        return bad_request(MISSING_PR_PARAMS);
    };
    let command = match ScanCommand::pull_request(package, record_id) {
        Ok(command) => command,
        Err(err) => return bad_request(&err.to_string()),
    };
    match run_scan(&state.scans, command).await {
        Ok(banner) => Html(views::render_scan_result("Pull Request Results", &banner)).into_response(),
        Err(err) => bad_request(&err.to_string()),
    }
}

async fn about() -> Html<String> {
    Html(views::render_about())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Html(views::render_not_found())).into_response()
}
