use std::sync::Arc;

use thiserror::Error;

/// Failure reported by a backend driver.
///
/// Drivers never know which SQL text the core was running; the core wraps a
/// `BackendError` into [`GdslError::SqlExecution`] or
/// [`GdslError::MetadataUnavailable`] and attaches that context itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    /// Native error text from the backend.
    pub message: String,
    /// Native error code, when the backend exposes one.
    pub code: Option<i32>,
    /// Coarse classification used for recovery decisions.
    pub kind: BackendErrorKind,
}

/// What went wrong at the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
    /// The backend rejected a statement (syntax, constraint, missing object).
    Statement,
    /// The backend could not be reached or is unusable (I/O, lock, open failure).
    Connectivity,
    /// The connection was closed by the caller.
    Closed,
}

impl BackendError {
    /// Create a statement-level backend error.
    pub fn statement(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            kind: BackendErrorKind::Statement,
        }
    }

    /// Create a connectivity backend error.
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            kind: BackendErrorKind::Connectivity,
        }
    }

    /// The error raised by every operation on a closed connection.
    pub fn closed() -> Self {
        Self {
            message: "connection is closed".to_owned(),
            code: None,
            kind: BackendErrorKind::Closed,
        }
    }

    /// Attach a native error code.
    #[must_use]
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Whether the backend itself is unreachable rather than the statement wrong.
    pub const fn is_connectivity(&self) -> bool {
        matches!(
            self.kind,
            BackendErrorKind::Connectivity | BackendErrorKind::Closed
        )
    }
}

/// Primary error type for gdsl operations.
#[derive(Error, Debug, Clone)]
pub enum GdslError {
    // === Structural Errors ===
    /// Illegal builder transition or a repeated terminal clause.
    #[error("invalid builder state: {detail}")]
    BuilderState { detail: String },

    /// Malformed table or column identifier.
    #[error("invalid identifier '{identifier}': {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    /// Template placeholders and supplied values disagree.
    #[error("template has {placeholders} placeholders but {values} values")]
    TemplateArity { placeholders: usize, values: usize },

    /// A script references `${name}` without a binding for it.
    #[error("unbound script variable: {name}")]
    UnboundVariable { name: String },

    // === Backend Errors ===
    /// A statement failed at the backend.
    #[error("failed to execute '{sql}': {source}")]
    SqlExecution {
        sql: String,
        #[source]
        source: BackendError,
    },

    /// Backend metadata could not be fetched.
    #[error("metadata unavailable for {target}: {source}")]
    MetadataUnavailable {
        target: String,
        #[source]
        source: BackendError,
    },

    /// The connection has been closed.
    #[error("connection is closed")]
    ConnectionClosed,

    /// No such table.
    #[error("no such table: {name}")]
    NoSuchTable { name: String },

    // === Spatial Errors ===
    /// A spatial accessor was used on a result without geometry columns.
    #[error("not a spatial table: {name}")]
    NotSpatial { name: String },

    /// A cell could not be decoded as a geometry.
    #[error("invalid geometry: {detail}")]
    InvalidGeometry { detail: String },

    // === Cursor Errors ===
    /// Random-access navigation on a forward-only cursor.
    #[error("{operation} is not supported on a forward-only cursor")]
    UnsupportedNavigation { operation: &'static str },

    /// Cell access while the cursor is not on a row.
    #[error("cursor is not positioned on a row")]
    NoCurrentRow,

    /// Access after the cursor was closed.
    #[error("cursor is closed")]
    CursorClosed,

    // === Data Errors ===
    /// No such column.
    #[error("no such column: {name}")]
    NoSuchColumn { name: String },

    /// Type mismatch in cell access.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    // === Usage Errors ===
    /// Unknown or read-only named attribute.
    #[error("unknown attribute: {name}")]
    UnknownAttribute { name: String },

    /// Configuration rejected by validation or parsing.
    #[error("invalid configuration: {detail}")]
    InvalidConfig { detail: String },

    /// A SQL script could not be read.
    #[error("failed to read script: {source}")]
    ScriptRead {
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Recovery-oriented grouping of [`GdslError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The query or identifier is structurally invalid; nothing was sent.
    Structural,
    /// The database rejected the request or could not be reached.
    Backend,
    /// The result has no spatial data.
    NotSpatial,
    /// Cursor positioning or lifecycle misuse.
    Navigation,
    /// Cell-level decoding failures.
    Data,
    /// Misuse of the API surface or configuration.
    Usage,
}

impl GdslError {
    /// Classify this error for caller-side recovery.
    #[allow(clippy::match_same_arms)]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::BuilderState { .. }
            | Self::InvalidIdentifier { .. }
            | Self::TemplateArity { .. }
            | Self::UnboundVariable { .. } => ErrorCategory::Structural,
            Self::SqlExecution { .. }
            | Self::MetadataUnavailable { .. }
            | Self::ConnectionClosed
            | Self::NoSuchTable { .. } => ErrorCategory::Backend,
            Self::NotSpatial { .. } => ErrorCategory::NotSpatial,
            Self::UnsupportedNavigation { .. } | Self::NoCurrentRow | Self::CursorClosed => {
                ErrorCategory::Navigation
            }
            Self::NoSuchColumn { .. } | Self::TypeMismatch { .. } | Self::InvalidGeometry { .. } => {
                ErrorCategory::Data
            }
            Self::UnknownAttribute { .. }
            | Self::InvalidConfig { .. }
            | Self::ScriptRead { .. }
            | Self::Internal(_) => ErrorCategory::Usage,
        }
    }

    /// Whether the error was raised before any statement reached the backend.
    pub const fn is_structural(&self) -> bool {
        matches!(self.category(), ErrorCategory::Structural)
    }

    /// Whether retrying with a fresh connection may succeed.
    pub const fn is_connectivity(&self) -> bool {
        match self {
            Self::ConnectionClosed => true,
            Self::SqlExecution { source, .. } | Self::MetadataUnavailable { source, .. } => {
                source.is_connectivity()
            }
            _ => false,
        }
    }

    /// The SQL text that failed, for backend execution errors.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::SqlExecution { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NotSpatial { .. } => Some("Request a plain table instead of a spatial one"),
            Self::UnsupportedNavigation { .. } => {
                Some("Use next() only, or open the table on a scrollable cursor")
            }
            Self::BuilderState { .. } => Some("Start a new builder chain from select()"),
            Self::MetadataUnavailable { .. } | Self::ConnectionClosed => {
                Some("Check the connection and retry")
            }
            Self::NoCurrentRow => Some("Advance the cursor with next() before reading cells"),
            _ => None,
        }
    }

    /// Wrap a backend failure with the SQL text that triggered it.
    pub fn execution(sql: impl Into<String>, source: BackendError) -> Self {
        if matches!(source.kind, BackendErrorKind::Closed) {
            return Self::ConnectionClosed;
        }
        Self::SqlExecution {
            sql: sql.into(),
            source,
        }
    }

    /// Create a builder state error.
    pub fn builder_state(detail: impl Into<String>) -> Self {
        Self::BuilderState {
            detail: detail.into(),
        }
    }

    /// Create an invalid identifier error.
    pub fn invalid_identifier(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an invalid geometry error.
    pub fn invalid_geometry(detail: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            detail: detail.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<std::io::Error> for GdslError {
    fn from(source: std::io::Error) -> Self {
        Self::ScriptRead {
            source: Arc::new(source),
        }
    }
}

/// Result type alias using `GdslError`.
pub type Result<T> = std::result::Result<T, GdslError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = GdslError::builder_state("LIMIT already set");
        assert_eq!(err.to_string(), "invalid builder state: LIMIT already set");
    }

    #[test]
    fn execution_error_keeps_sql() {
        let err = GdslError::execution("SELECT * FROM nope", BackendError::statement("no such table: nope"));
        assert_eq!(err.sql(), Some("SELECT * FROM nope"));
        assert_eq!(
            err.to_string(),
            "failed to execute 'SELECT * FROM nope': no such table: nope"
        );
        assert_eq!(err.category(), ErrorCategory::Backend);
    }

    #[test]
    fn execution_on_closed_connection() {
        let err = GdslError::execution("SELECT 1", BackendError::closed());
        assert!(matches!(err, GdslError::ConnectionClosed));
        assert!(err.is_connectivity());
    }

    #[test]
    fn categories_branch_recovery() {
        assert!(GdslError::builder_state("x").is_structural());
        assert!(GdslError::invalid_identifier("a b", "space").is_structural());
        assert_eq!(
            GdslError::NotSpatial { name: "t".into() }.category(),
            ErrorCategory::NotSpatial
        );
        assert_eq!(
            GdslError::UnsupportedNavigation { operation: "absolute" }.category(),
            ErrorCategory::Navigation
        );
        assert_eq!(
            GdslError::type_mismatch("integer", "text").category(),
            ErrorCategory::Data
        );
        assert!(GdslError::UnboundVariable { name: "srid".into() }.is_structural());
        let io = std::io::Error::new(std::io::ErrorKind::InvalidData, "stream did not contain valid UTF-8");
        let err = GdslError::from(io);
        assert_eq!(err.category(), ErrorCategory::Usage);
        assert!(err.to_string().contains("valid UTF-8"));
    }

    #[test]
    fn metadata_unavailable_is_connectivity() {
        let err = GdslError::MetadataUnavailable {
            target: "main.t".into(),
            source: BackendError::connectivity("disk I/O error").with_code(10),
        };
        assert!(err.is_connectivity());
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn backend_error_codes() {
        let err = BackendError::statement("syntax error").with_code(1);
        assert_eq!(err.code, Some(1));
        assert!(!err.is_connectivity());
        assert_eq!(err.to_string(), "syntax error");
    }
}
