//! Error types for CSV adapter with context

use thiserror::Error;

/// Errors that can occur when decoding CSV
#[derive(Error, Debug, Clone)]
pub enum CsvError {
    /// CSV read error with context
    #[error("CSV read error at line {line}: {message}")]
    Read { line: usize, message: String },

    /// Field bytes are not valid UTF-8
    #[error("Invalid UTF-8 at line {line}: {message}")]
    Utf8 { line: usize, message: String },

    /// I/O error
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CsvError {
    /// Create a read error at a specific line
    pub fn read_at(line: usize, message: impl Into<String>) -> Self {
        Self::Read {
            line,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Get the line number if available
    pub fn line_number(&self) -> Option<usize> {
        match self {
            Self::Read { line, .. } | Self::Utf8 { line, .. } if *line > 0 => Some(*line),
            _ => None,
        }
    }

    /// Whether the error came from the underlying byte source rather than the CSV text
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

impl From<std::io::Error> for CsvError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<csv::Error> for CsvError {
    fn from(e: csv::Error) -> Self {
        let line = e
            .position()
            .map_or(0, |pos| usize::try_from(pos.line()).unwrap_or(usize::MAX));
        match e.into_kind() {
            csv::ErrorKind::Io(io) => Self::Io(io.to_string()),
            csv::ErrorKind::Utf8 { pos, err } => Self::Utf8 {
                line: pos.map_or(line, |p| usize::try_from(p.line()).unwrap_or(usize::MAX)),
                message: err.to_string(),
            },
            other => Self::Read {
                line,
                message: format!("{other:?}"),
            },
        }
    }
}

/// Result type alias for CSV operations
pub type CsvResult<T> = std::result::Result<T, CsvError>;
