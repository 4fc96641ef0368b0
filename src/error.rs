//! Error types shared by the retrieval pipeline

use thiserror::Error;

/// Error codes AWS returns for missing, expired or unauthorized credentials
const CREDENTIAL_ERROR_CODES: &[&str] = &[
    "UnrecognizedClientException",
    "InvalidClientTokenId",
    "ExpiredToken",
    "ExpiredTokenException",
    "AccessDenied",
    "AccessDeniedException",
    "SignatureDoesNotMatch",
    "MissingAuthenticationToken",
];

#[derive(Error, Debug)]
pub enum CostError {
    /// The provider client is not compiled in or cannot be constructed
    #[error("AWS integration unavailable: {0}")]
    IntegrationUnavailable(String),

    /// Authentication or authorization failure, rendered with remediation steps
    #[error(
        "AWS credentials not found. Please configure credentials:\n\
         1. Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables, or\n\
         2. Configure ~/.aws/credentials file, or\n\
         3. Use AWS IAM role if running on EC2\n\nDetails: {0}"
    )]
    Credentials(String),

    /// Any other provider call failure
    #[error("AWS API error: {0}")]
    Api(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CostError {
    /// Classify a failed provider call from its service error code and rendered message
    pub fn from_provider_failure(code: Option<&str>, message: &str) -> Self {
        let credential_code = code.is_some_and(|code| CREDENTIAL_ERROR_CODES.contains(&code));
        let lowered = message.to_lowercase();
        if credential_code || lowered.contains("credential") || lowered.contains("nocredentials") {
            return Self::Credentials(message.to_string());
        }
        match code {
            Some(code) => Self::Api(format!("{code}: {message}")),
            None => Self::Api(message.to_string()),
        }
    }

    pub fn is_credentials(&self) -> bool {
        matches!(self, Self::Credentials(_))
    }

    pub fn is_integration_unavailable(&self) -> bool {
        matches!(self, Self::IntegrationUnavailable(_))
    }

    /// Failures that come from the provider rather than local setup
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            Self::IntegrationUnavailable(_) | Self::Credentials(_) | Self::Api(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CostError>;
