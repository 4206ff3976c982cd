use thiserror::Error;

#[derive(Error, Debug)]
pub enum CanonError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Taxonomy error: {message}")]
    TaxonomyError { message: String },

    #[error("Precondition violated: {message}")]
    Precondition { message: String },

    #[error("No text content found in response envelope")]
    AbsentContent,

    #[error("{message}. Content: {preview}")]
    MalformedContent { message: String, preview: String },

    #[error("Validation failed: {message}")]
    ValidationError { message: String },

    #[error("Transport failure ({kind}): {message}")]
    Transport { kind: String, message: String },
}

/// 錯誤分類，CLI 用來決定退出碼
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Content,
    Transport,
    Internal,
}

impl CanonError {
    /// Short machine tag, recorded as the `kind` of a raised job.
    pub fn kind(&self) -> &'static str {
        match self {
            CanonError::ApiError(e) if e.is_timeout() => "timeout",
            CanonError::ApiError(e) if e.is_decode() => "decode",
            CanonError::ApiError(_) => "network",
            CanonError::CsvError(_) => "csv",
            CanonError::IoError(_) => "io",
            CanonError::SerializationError(_) => "serialization",
            CanonError::ConfigValidationError { .. }
            | CanonError::InvalidConfigValueError { .. }
            | CanonError::MissingConfigError { .. } => "config",
            CanonError::TaxonomyError { .. } => "taxonomy",
            CanonError::Precondition { .. } => "precondition",
            CanonError::AbsentContent => "absent_content",
            CanonError::MalformedContent { .. } => "malformed_content",
            CanonError::ValidationError { .. } => "validation",
            CanonError::Transport { kind, .. } => match kind.as_str() {
                "timeout" => "timeout",
                "decode" => "decode",
                "http_status" => "http_status",
                _ => "network",
            },
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            CanonError::ConfigValidationError { .. }
            | CanonError::InvalidConfigValueError { .. }
            | CanonError::MissingConfigError { .. }
            | CanonError::TaxonomyError { .. }
            | CanonError::Precondition { .. } => ErrorCategory::Configuration,
            CanonError::AbsentContent
            | CanonError::MalformedContent { .. }
            | CanonError::ValidationError { .. }
            | CanonError::CsvError(_)
            | CanonError::SerializationError(_) => ErrorCategory::Content,
            CanonError::ApiError(_) | CanonError::Transport { .. } => ErrorCategory::Transport,
            CanonError::IoError(_) => ErrorCategory::Internal,
        }
    }

    /// True for failures of the content returned by the model, which the batch
    /// runner reports as validation failures rather than raised jobs.
    pub fn is_content_failure(&self) -> bool {
        matches!(
            self,
            CanonError::AbsentContent
                | CanonError::MalformedContent { .. }
                | CanonError::ValidationError { .. }
        )
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Content => format!("Unusable model response: {}", self),
            ErrorCategory::Transport => format!("Could not reach the generation API: {}", self),
            ErrorCategory::Internal => format!("Unexpected failure: {}", self),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => "Check the TOML configuration and the taxonomy document",
            ErrorCategory::Content => "Inspect the stored interaction and re-run the affected input",
            ErrorCategory::Transport => "Check network access, the API key and the endpoint, then retry",
            ErrorCategory::Internal => "Check file permissions and available disk space",
        }
    }
}

pub type Result<T> = std::result::Result<T, CanonError>;
