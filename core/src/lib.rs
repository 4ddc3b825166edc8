pub mod error;
pub mod modules;
pub mod report;
pub mod utils;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

pub use crate::error::{ReportError, ScanError};
pub use crate::modules::pyfyzz::{ScanBridge, ScanCommand, ScanOutcome, ScanPhase, ScanStatus};
pub use crate::report::models::{
    BatchRow, BatchSummaryRow, ExceptionDetail, FuzzResultRow, HomeReport, OverviewRow,
    PackageRow, TopologyRow,
};
pub use crate::report::pagination::{Page, PageRequest};
pub use crate::report::query_builder::{ListQuery, ListStatement};
pub use crate::report::aggregation::OverviewQuery;
pub use crate::report::store::{MySqlReportStore, ReportSource};
pub use crate::report::{ReportParams, SortOrder, View};
pub use crate::utils::artifact::{decode_artifact, html_escape, ArtifactKind};
pub use crate::utils::markdown::render_markdown;

/// Connection settings for the MySQL database the fuzzer writes into.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the discrete fields.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            database: "pyfyzz".to_string(),
            max_connections: 10,
        }
    }
}

/// Settings for invoking the external analysis tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanBridgeConfig {
    pub tool: String,
    pub timeout_secs: u64,
    pub max_concurrent: usize,
}

impl Default for ScanBridgeConfig {
    fn default() -> Self {
        Self {
            tool: "pyfyzz".to_string(),
            timeout_secs: 300,
            max_concurrent: 4,
        }
    }
}

/// Top-level dashboard configuration shared by the binary and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardConfig {
    pub listen: String,
    pub database: DatabaseConfig,
    pub scan: ScanBridgeConfig,
    pub verbose: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3000".to_string(),
            database: DatabaseConfig::default(),
            scan: ScanBridgeConfig::default(),
            verbose: false,
        }
    }
}

impl DashboardConfig {
    /// Reads a JSON config file; missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("invalid config file {}", path.display()))
    }
}

/// Which stream of the child process a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Output abstraction for the scan bridge.
/// The binary logs through `LogSink`; tests record what they receive.
pub trait ScanEventSink: Send + Sync {
    fn on_phase(&self, command: &ScanCommand, phase: &ScanPhase);
    fn on_output(&self, command: &ScanCommand, stream: OutputStream, line: &str);
}

pub type SinkRef = Arc<dyn ScanEventSink>;

/// Forwards scan lifecycle and output to the `log` facade.
pub struct LogSink;

impl LogSink {
    pub fn new_ref() -> SinkRef {
        Arc::new(Self)
    }
}

impl ScanEventSink for LogSink {
    fn on_phase(&self, command: &ScanCommand, phase: &ScanPhase) {
        match phase {
            ScanPhase::Failed(reason) => {
                log::error!("[{}] scan failed: {}", command.package(), reason)
            }
            ScanPhase::Completed(code) => {
                log::info!("[{}] process exited with code {:?}", command.package(), code)
            }
            other => log::debug!("[{}] {:?}", command.package(), other),
        }
    }

    fn on_output(&self, command: &ScanCommand, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => log::info!("[{}] {}", command.package(), line),
            OutputStream::Stderr => log::warn!("[{}] {}", command.package(), line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_values() {
        let config = DashboardConfig::default();
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.scan.tool, "pyfyzz");
        assert_eq!(config.listen, "0.0.0.0:3000");
    }

    #[test]
    fn test_load_partial_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"listen": "127.0.0.1:8080", "scan": {{"maxConcurrent": 2}}}}"#
        )
        .unwrap();

        let config = DashboardConfig::load(file.path()).unwrap();
        assert_eq!(config.listen, "127.0.0.1:8080");
        assert_eq!(config.scan.max_concurrent, 2);
        assert_eq!(config.scan.timeout_secs, 300);
        assert_eq!(config.database.database, "pyfyzz");
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();
        assert!(DashboardConfig::load(file.path()).is_err());
    }
}
