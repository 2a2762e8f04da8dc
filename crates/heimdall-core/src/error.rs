//! Unified error kinds and status-code mapping.

use heimdall_cyclonedx::CycloneDxError;
use heimdall_extract::ExtractError;
use heimdall_graph::GraphError;
use heimdall_sign::SignError;
use heimdall_spdx::SpdxError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum HeimdallError {
    #[error("io error: {0}")]
    IoError(String),
    #[error("unrecognized artifact format")]
    UnsupportedFormat,
    #[error("header or section offsets out of bounds")]
    Truncated,
    #[error("dangling reference: {0}")]
    DanglingReference(String),
    #[error("operation was cancelled")]
    Cancelled,
    #[error("file or section exceeds the configured size cap")]
    TooLarge,
    #[error("signing key error: {0}")]
    KeyError(String),
    #[error("invalid hash digest for {algorithm}")]
    InvalidHash { algorithm: String },
    #[error("no session exists for this handle")]
    UnknownHandle,
    #[error("the document is not in the required lifecycle state for this operation")]
    InvalidState,
    #[error("output path has not been configured")]
    OutputPathNotSet,
    #[error("set_format has not been called for this session")]
    FormatNotSet,
}

impl HeimdallError {
    /// A stable kind string for `last_error`, independent of the rendered
    /// message (which may vary across platforms/inputs).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IoError(_) => "IoError",
            Self::UnsupportedFormat => "UnsupportedFormat",
            Self::Truncated => "Truncated",
            Self::DanglingReference(_) => "DanglingReference",
            Self::Cancelled => "Cancelled",
            Self::TooLarge => "TooLarge",
            Self::KeyError(_) => "KeyError",
            Self::InvalidHash { .. } => "InvalidHash",
            Self::UnknownHandle => "UnknownHandle",
            Self::InvalidState => "InvalidState",
            Self::OutputPathNotSet => "OutputPathNotSet",
            Self::FormatNotSet => "FormatNotSet",
        }
    }

    /// Every API function returns this as its integer status (0 = OK).
    pub fn status_code(&self) -> i32 {
        match self {
            Self::IoError(_) => 1,
            Self::UnsupportedFormat => 2,
            Self::Truncated => 3,
            Self::DanglingReference(_) => 4,
            Self::Cancelled => 5,
            Self::TooLarge => 6,
            Self::KeyError(_) => 7,
            Self::InvalidHash { .. } => 8,
            Self::UnknownHandle => 9,
            Self::InvalidState => 10,
            Self::OutputPathNotSet => 11,
            Self::FormatNotSet => 12,
        }
    }
}

impl From<ExtractError> for HeimdallError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Io(msg) => Self::IoError(msg),
            ExtractError::UnsupportedFormat => Self::UnsupportedFormat,
            ExtractError::Cancelled => Self::Cancelled,
            ExtractError::TooLarge => Self::TooLarge,
        }
    }
}

impl From<GraphError> for HeimdallError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::RootExtraction(inner) => inner.into(),
        }
    }
}

impl From<SpdxError> for HeimdallError {
    fn from(err: SpdxError) -> Self {
        match err {
            SpdxError::WrongSpec => Self::UnsupportedFormat,
            SpdxError::DanglingReference(id) => Self::DanglingReference(id),
        }
    }
}

impl From<CycloneDxError> for HeimdallError {
    fn from(err: CycloneDxError) -> Self {
        match err {
            CycloneDxError::WrongSpec => Self::UnsupportedFormat,
            CycloneDxError::DanglingReference(id) => Self::DanglingReference(id),
            CycloneDxError::InvalidHash { algorithm, .. } => Self::InvalidHash {
                algorithm: algorithm.to_string(),
            },
        }
    }
}

impl From<SignError> for HeimdallError {
    fn from(err: SignError) -> Self {
        match err {
            SignError::KeyError(msg) => Self::KeyError(msg),
            SignError::AlgorithmMismatch(msg) => Self::KeyError(msg.to_string()),
        }
    }
}
