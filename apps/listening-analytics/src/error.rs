use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("schema violation in {source_name} at line {line}: field `{field}` {reason}")]
    SchemaViolation {
        source_name: String,
        line: u64,
        field: String,
        reason: String,
    },
    #[error("missing input source {source_name} ({}): {reason}", .path.display())]
    MissingSource {
        source_name: String,
        path: PathBuf,
        reason: String,
    },
    #[error("failed to write output {location}: {reason}")]
    Sink { location: String, reason: String },
}

impl AnalyticsError {
    pub fn schema(
        source_name: &str,
        line: u64,
        field: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self::SchemaViolation {
            source_name: source_name.to_string(),
            line,
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing(source_name: &str, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MissingSource {
            source_name: source_name.to_string(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn sink(location: &str, reason: impl ToString) -> Self {
        Self::Sink {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AnalyticsError::SchemaViolation { .. } => "schema_violation",
            AnalyticsError::MissingSource { .. } => "missing_source",
            AnalyticsError::Sink { .. } => "sink_failed",
        }
    }
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

#[cfg(test)]
mod tests {
    use super::AnalyticsError;

    #[test]
    fn schema_violation_names_source_row_and_field() {
        let err = AnalyticsError::schema("listening_logs", 7, "duration_sec", "expected a non-negative integer, got \"abc\"");
        let message = err.to_string();
        assert!(message.contains("listening_logs"));
        assert!(message.contains("line 7"));
        assert!(message.contains("duration_sec"));
        assert_eq!(err.code(), "schema_violation");
    }

    #[test]
    fn missing_source_includes_path() {
        let err = AnalyticsError::missing("songs_metadata", "/nope/songs.csv", "No such file or directory");
        assert!(err.to_string().contains("/nope/songs.csv"));
        assert_eq!(err.code(), "missing_source");
    }
}
