use serde::Deserialize;
use serde::Serialize;
use serde::Serializer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ProviderUnavailable,
    UserRejected,
    ConnectionError,
    NotConnected,
    InvalidArguments,
    RegistryReverted,
    SubmissionRejected,
    TransactionReverted,
    NetworkError,
    MalformedResponse,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::ProviderUnavailable => "provider-unavailable",
            Self::UserRejected => "user-rejected",
            Self::ConnectionError => "connection-error",
            Self::NotConnected => "not-connected",
            Self::InvalidArguments => "invalid-arguments",
            Self::RegistryReverted => "registry-reverted",
            Self::SubmissionRejected => "submission-rejected",
            Self::TransactionReverted => "transaction-reverted",
            Self::NetworkError => "network-error",
            Self::MalformedResponse => "malformed-response",
        }
    }

    /// Detected before any network interaction.
    pub fn is_local(self) -> bool {
        matches!(self, Self::NotConnected | Self::InvalidArguments)
    }
}

/// Every failure the session manager surfaces to its caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no wallet provider is installed")]
    ProviderUnavailable,

    #[error("request rejected by user: {0}")]
    UserRejected(String),

    #[error("wallet connection failed: {0}")]
    ConnectionError(String),

    #[error("please connect your wallet first")]
    NotConnected,

    #[error("invalid arguments for {operation}: {reason}")]
    InvalidArguments { operation: String, reason: String },

    #[error("registry reverted the call: {0}")]
    RegistryReverted(String),

    #[error("transaction rejected before broadcast: {0}")]
    SubmissionRejected(String),

    #[error("transaction reverted on-chain: {0}")]
    TransactionReverted(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("malformed registry response: {0}")]
    MalformedResponse(String),
}

impl SessionError {
    pub fn invalid_arguments(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed(expected: &str, found: impl std::fmt::Display) -> Self {
        Self::MalformedResponse(format!("expected {expected}, found {found}"))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProviderUnavailable => ErrorKind::ProviderUnavailable,
            Self::UserRejected(_) => ErrorKind::UserRejected,
            Self::ConnectionError(_) => ErrorKind::ConnectionError,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            Self::RegistryReverted(_) => ErrorKind::RegistryReverted,
            Self::SubmissionRejected(_) => ErrorKind::SubmissionRejected,
            Self::TransactionReverted(_) => ErrorKind::TransactionReverted,
            Self::NetworkError(_) => ErrorKind::NetworkError,
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
        }
    }
}

/// Wire shape of a `SessionError`: stable kind plus the rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SessionError> for ErrorInfo {
    fn from(error: &SessionError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl Serialize for SessionError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ErrorInfo::from(self).serialize(serializer)
    }
}

/// Text input that could not be read as a typed value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field}: `{input}`")]
pub struct ParseValueError {
    pub field: &'static str,
    pub input: String,
}

impl ParseValueError {
    pub fn new(field: &'static str, input: impl Into<String>) -> Self {
        Self {
            field,
            input: input.into(),
        }
    }
}
