use std::fmt;

use crate::value::ColumnType;

/// Error codes returned by the service.
///
/// Only codes the retry logic inspects are listed here.
pub mod codes {
    pub const ROW_OPERATION_CONFLICT: &str = "OTSRowOperationConflict";
    pub const NOT_ENOUGH_CAPACITY_UNIT: &str = "OTSNotEnoughCapacityUnit";
    pub const TABLE_NOT_READY: &str = "OTSTableNotReady";
    pub const PARTITION_UNAVAILABLE: &str = "OTSPartitionUnavailable";
    pub const SERVER_BUSY: &str = "OTSServerBusy";
    pub const QUOTA_EXHAUSTED: &str = "OTSQuotaExhausted";
    pub const INTERNAL_SERVER_ERROR: &str = "OTSInternalServerError";
    pub const TIMEOUT: &str = "OTSTimeout";
    pub const SERVER_UNAVAILABLE: &str = "OTSServerUnavailable";
    pub const PARAMETER_INVALID: &str = "OTSParameterInvalid";
    pub const OBJECT_NOT_EXIST: &str = "OTSObjectNotExist";
    pub const CONDITION_CHECK_FAIL: &str = "OTSConditionCheckFail";

    /// The only `OTSQuotaExhausted` message that is safe to retry.
    pub const TOO_FREQUENT_TABLE_OPERATIONS: &str = "Too frequent table operations.";
}

/// Local validation failure. Indicates a caller bug, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("type mismatch: cannot compare {left} with {right}")]
    TypeMismatch { left: String, right: String },

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("{0} has no successor")]
    NoSuccessor(String),

    #[error("type {0} cannot be used in a primary key")]
    InvalidPrimaryKeyType(ColumnType),

    #[error("primary key must contain at least one column")]
    EmptyPrimaryKey,

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("range iterator has no more rows")]
    IteratorExhausted,

    #[error("table '{0}' not found")]
    TableNotFound(String),
}

impl ValueError {
    pub(crate) fn type_mismatch(left: impl fmt::Display, right: impl fmt::Display) -> Self {
        Self::TypeMismatch {
            left: left.to_string(),
            right: right.to_string(),
        }
    }
}

/// Failure observed without a server response (connect, read timeout, reset).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error classified by the service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[{http_status}] {code}: {message}")]
pub struct ServiceError {
    pub code: String,
    pub message: String,
    pub http_status: u16,
    pub request_id: Option<String>,
}

impl ServiceError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, http_status: u16) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            http_status,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.http_status)
    }
}

/// A batch where some sub-operations failed. One entry per failed item,
/// in request order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[{http_status}] {} of the batch operations failed", errors.len())]
pub struct PartialBatchError {
    pub http_status: u16,
    pub errors: Vec<ServiceError>,
}

impl PartialBatchError {
    pub fn new(http_status: u16, errors: Vec<ServiceError>) -> Self {
        Self {
            http_status,
            errors,
        }
    }
}

/// Error surfaced by any remote call, plus local validation failures.
///
/// The retry layer inspects this by pattern matching; it never wraps or
/// rewrites it, so the value a caller finally sees is the one last observed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    PartialBatch(#[from] PartialBatchError),

    #[error(transparent)]
    Local(#[from] ValueError),
}

impl ClientError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(TransportError::new(message))
    }

    pub fn service(code: impl Into<String>, message: impl Into<String>, http_status: u16) -> Self {
        Self::Service(ServiceError::new(code, message, http_status))
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::Local(ValueError::InvalidArgument(message.into()))
    }

    /// Service error code, if the server answered with a single error.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Service(e) => Some(&e.code),
            _ => None,
        }
    }

    /// HTTP status carried by the server response, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ClientError::Service(e) => Some(e.http_status),
            ClientError::PartialBatch(e) => Some(e.http_status),
            ClientError::Transport(_) | ClientError::Local(_) => None,
        }
    }
}

/// Row integrity check failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChecksumError {
    #[error("checksum mismatch: expected {expected:#04x}, computed {actual:#04x}")]
    Mismatch { expected: u8, actual: u8 },
}
