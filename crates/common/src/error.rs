//! Configuration-time error types

use thiserror::Error;

/// Errors raised while loading client configuration and initial tokens.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("missing token: set {var} or {file_key}")]
    MissingToken {
        var: &'static str,
        file_key: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = Error::Config("timeout_secs must be greater than 0".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: timeout_secs must be greater than 0"
        );
    }

    #[test]
    fn missing_token_names_both_sources() {
        let err = Error::MissingToken {
            var: "API_ACCESS_TOKEN",
            file_key: "access_token_file",
        };
        let msg = err.to_string();
        assert!(msg.contains("API_ACCESS_TOKEN"), "got: {msg}");
        assert!(msg.contains("access_token_file"), "got: {msg}");
    }

    #[test]
    fn io_error_converts() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(err.to_string().starts_with("I/O error:"), "got: {err}");
    }
}
