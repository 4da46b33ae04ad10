//! Error types for the processor module generator.
//!
//! Fatal conditions are modeled here; recoverable combine conflicts are
//! not errors at all; they are [`crate::types::Diagnostic`] values
//! carried alongside the generated model.

use thiserror::Error;

/// Primary error type for the generator.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid run configuration.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Register catalog construction failure.
    #[error("Register catalog error: {message}")]
    RegisterInit { message: String },

    /// Malformed line in the opcode listing.
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Serializer-side failure while writing the module directory.
    #[error("Output error writing {path}: {message}")]
    Output { path: String, message: String },
}

impl GeneratorError {
    /// Build a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        GeneratorError::Config {
            message: message.into(),
        }
    }

    /// Build a register-catalog error.
    pub fn register_init(message: impl Into<String>) -> Self {
        GeneratorError::RegisterInit {
            message: message.into(),
        }
    }

    /// Build a parse error for a 1-based input line.
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        GeneratorError::Parse {
            line,
            message: message.into(),
        }
    }

    /// Build a serializer error for a filesystem path.
    pub fn output(path: impl Into<String>, message: impl Into<String>) -> Self {
        GeneratorError::Output {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for generator operations.
pub type Result<T> = std::result::Result<T, GeneratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = GeneratorError::parse(42, "missing '|' separator");
        let msg = err.to_string();
        assert!(msg.contains("42"));
        assert!(msg.contains("missing '|'"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: GeneratorError = io.into();
        assert!(err.to_string().contains("gone"));
    }
}
