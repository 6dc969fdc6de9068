use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal pipeline errors. Compiler degradations are not errors; they are
/// absorbed into the script-only outcome (see `compiler::CompileOutcome`).
#[derive(Debug, Error)]
pub enum Error {
    /// No credential configured for the selected provider. Raised before any
    /// network call is attempted.
    #[error("no credential configured for the {provider} provider: set {env_var} or pass --api-key")]
    Authentication {
        provider: &'static str,
        env_var: &'static str,
    },

    /// The completion service was unreachable or returned an error. A
    /// generation request is attempted exactly once; there is no retry.
    #[error("completion request failed: {message}")]
    Service { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn authentication_display_names_the_env_var() {
        let err = Error::Authentication {
            provider: "openai",
            env_var: "OPENAI_API_KEY",
        };
        assert_eq!(
            err.to_string(),
            "no credential configured for the openai provider: set OPENAI_API_KEY or pass --api-key"
        );
    }

    #[test]
    fn service_display_carries_the_message() {
        let err = Error::Service {
            message: "gateway returned HTTP 503".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "completion request failed: gateway returned HTTP 503"
        );
    }

    #[test]
    fn io_errors_convert_via_from() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::from(io);
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("denied"));
    }
}
