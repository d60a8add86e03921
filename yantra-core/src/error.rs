use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy of the service.
///
/// The first group is client-facing validation, the second not-found lookups,
/// the third sandbox timeouts that are recorded on rows rather than surfaced,
/// and the rest infrastructure failures that propagate untouched. The HTTP
/// adapter maps these onto status codes; `Display` strings double as the
/// `detail` field of error responses.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Compiler with id '{0}' already exists")]
    DuplicateCompiler(String),
    #[error("Template with id '{0}' already exists")]
    DuplicateTemplate(String),
    #[error("No fields to update")]
    NothingToUpdate,
    #[error("Language '{0}' not found")]
    LanguageNotFound(String),
    #[error("Language '{0}' is disabled")]
    LanguageDisabled(String),
    #[error("Language '{language}' is not ready (status: {status})")]
    LanguageNotReady { language: String, status: String },
    #[error("Too many files. Maximum {max} files allowed.")]
    TooManyFiles { max: usize },
    #[error("File '{0}' is empty.")]
    EmptyFile(String),
    #[error("Total file size exceeds {max_mib}MB limit.")]
    SizeLimitExceeded { max_mib: u64 },
    #[error("File extension not allowed for '{0}'")]
    ExtensionNotAllowed(String),

    #[error("Compiler '{0}' not found")]
    CompilerNotFound(String),
    #[error("Template '{0}' not found")]
    TemplateNotFound(String),

    #[error("Build timed out after {seconds} seconds")]
    BuildTimeout { seconds: u64 },
    #[error("Execution timed out after {seconds} seconds.")]
    ExecTimeout { seconds: u64 },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Queue(#[from] redis::RedisError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Validation errors abort a request before any row or stage
    /// materializes; everything else is either a lookup miss or infra.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::DuplicateCompiler(_)
                | Error::DuplicateTemplate(_)
                | Error::NothingToUpdate
                | Error::LanguageNotFound(_)
                | Error::LanguageDisabled(_)
                | Error::LanguageNotReady { .. }
                | Error::TooManyFiles { .. }
                | Error::EmptyFile(_)
                | Error::SizeLimitExceeded { .. }
                | Error::ExtensionNotAllowed(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::CompilerNotFound(_) | Error::TemplateNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn timeout_message_matches_recorded_stderr() {
        let err = Error::ExecTimeout { seconds: 2 };
        assert_eq!(err.to_string(), "Execution timed out after 2 seconds.");
    }

    #[test]
    fn validation_errors_are_classified() {
        assert!(Error::NothingToUpdate.is_validation());
        assert!(Error::TooManyFiles { max: 10 }.is_validation());
        assert!(!Error::CompilerNotFound("x".into()).is_validation());
        assert!(Error::CompilerNotFound("x".into()).is_not_found());
        assert!(!Error::BuildTimeout { seconds: 600 }.is_validation());
    }
}
