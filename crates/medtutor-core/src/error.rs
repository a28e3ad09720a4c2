use thiserror::Error;

/// Top-level error type for the MedTutor system.
///
/// Subsystem crates define their own error types and implement
/// `From<MedtutorError>` (or the reverse) so that `?` works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MedtutorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Payload too large: {size} bytes exceeds {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
}

impl From<toml::de::Error> for MedtutorError {
    fn from(err: toml::de::Error) -> Self {
        MedtutorError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for MedtutorError {
    fn from(err: toml::ser::Error) -> Self {
        MedtutorError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for MedtutorError {
    fn from(err: serde_json::Error) -> Self {
        MedtutorError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for MedTutor operations.
pub type Result<T> = std::result::Result<T, MedtutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(MedtutorError, &str)> = vec![
            (
                MedtutorError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                MedtutorError::Storage("disk full".to_string()),
                "Storage error: disk full",
            ),
            (
                MedtutorError::Transport("connection reset".to_string()),
                "Transport error: connection reset",
            ),
            (
                MedtutorError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
            (
                MedtutorError::PayloadTooLarge {
                    size: 100,
                    limit: 50,
                },
                "Payload too large: 100 bytes exceeds 50 bytes",
            ),
            (
                MedtutorError::UnsupportedMediaType("text/plain".to_string()),
                "Unsupported media type: text/plain",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: MedtutorError = io_err.into();
        assert!(matches!(err, MedtutorError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let converted: MedtutorError = err.unwrap_err().into();
        assert!(matches!(converted, MedtutorError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ invalid }");
        let converted: MedtutorError = err.unwrap_err().into();
        assert!(matches!(converted, MedtutorError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
