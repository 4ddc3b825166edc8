use std::time::Duration;

use thiserror::Error;

/// SQLSTATE MySQL reports for `ER_NO_SUCH_TABLE` (1146).
const SQLSTATE_NO_SUCH_TABLE: &str = "42S02";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("table `{table}` does not exist")]
    SchemaMissing {
        table: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ReportError {
    /// Classifies a driver error raised while reading `table`. For a missing
    /// table the name reported by the server wins over `table`.
    pub fn from_sqlx(err: sqlx::Error, table: &str) -> Self {
        let missing = match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(SQLSTATE_NO_SUCH_TABLE) => {
                Some(missing_table_name(db.message()).unwrap_or(table).to_string())
            }
            _ => None,
        };
        match missing {
            Some(table) => ReportError::SchemaMissing { table, source: err },
            None => ReportError::Database(err),
        }
    }

    pub fn is_schema_missing(&self) -> bool {
        matches!(self, ReportError::SchemaMissing { .. })
    }

    /// Text safe to show to a dashboard user. Never contains driver output.
    pub fn user_message(&self) -> String {
        match self {
            ReportError::SchemaMissing { table, .. } => format!(
                "Database table \"{}\" does not exist. Please check your database schema.",
                table
            ),
            ReportError::Database(_) => "Something went wrong!".to_string(),
        }
    }
}

/// Extracts `name` from `Table 'schema.name' doesn't exist`.
fn missing_table_name(message: &str) -> Option<&str> {
    let quoted = message.split('\'').nth(1)?;
    let name = quoted.rsplit('.').next()?;
    (!name.is_empty()).then_some(name)
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid {field}: {value:?}")]
    InvalidArgument { field: &'static str, value: String },
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("i/o error while reading tool output: {0}")]
    Io(#[from] std::io::Error),
    #[error("scan did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("scan queue is closed")]
    QueueClosed,
}

impl ScanError {
    /// Errors caused by the caller's input rather than the tool.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, ScanError::InvalidArgument { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_database_error_hides_details() {
        let err = ReportError::from_sqlx(sqlx::Error::PoolTimedOut, "batches");
        assert!(!err.is_schema_missing());
        assert_eq!(err.user_message(), "Something went wrong!");
    }

    #[test]
    fn test_schema_missing_message_names_table() {
        let err = ReportError::SchemaMissing {
            table: "package_records".to_string(),
            source: sqlx::Error::RowNotFound,
        };
        assert_eq!(
            err.user_message(),
            "Database table \"package_records\" does not exist. Please check your database schema."
        );
    }

    #[test]
    fn test_missing_table_name_from_server_message() {
        assert_eq!(
            missing_table_name("Table 'pyfyzz.topologies' doesn't exist"),
            Some("topologies")
        );
        assert_eq!(missing_table_name("Table 'batches' doesn't exist"), Some("batches"));
        assert_eq!(missing_table_name("no quotes here"), None);
    }

    #[test]
    fn test_invalid_argument_is_input_error() {
        let err = ScanError::InvalidArgument { field: "package name", value: "-x".into() };
        assert!(err.is_invalid_input());
        assert!(!ScanError::TimedOut(Duration::from_secs(1)).is_invalid_input());
    }
}
