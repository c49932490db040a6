//! Decides whether a failed call may be sent again.
//!
//! Two questions are answered separately: is the operation idempotent, and
//! did this particular failure leave the service in a state where sending
//! the request again is safe.

use std::fmt;
use std::str::FromStr;

use tablestore_api::error::codes;
use tablestore_api::{ClientError, ServiceError};

use crate::error::EngineError;

macro_rules! operations {
    ($($variant:ident => $name:literal, idempotent = $idem:literal;)+) => {
        /// Remote operation names understood by the service.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Operation {
            $($variant,)+
        }

        impl Operation {
            pub const ALL: &'static [Operation] = &[$(Operation::$variant,)+];

            /// Wire name of the operation.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Operation::$variant => $name,)+
                }
            }

            /// Pure reads. Executing them twice has the same end state as once.
            pub fn is_idempotent(self) -> bool {
                match self {
                    $(Operation::$variant => $idem,)+
                }
            }
        }

        impl FromStr for Operation {
            type Err = EngineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Operation::$variant),)+
                    other => Err(EngineError::UnknownOperation(other.to_string())),
                }
            }
        }
    };
}

operations! {
    CreateTable => "CreateTable", idempotent = false;
    ListTable => "ListTable", idempotent = true;
    DeleteTable => "DeleteTable", idempotent = false;
    DescribeTable => "DescribeTable", idempotent = true;
    UpdateTable => "UpdateTable", idempotent = false;
    GetRow => "GetRow", idempotent = true;
    PutRow => "PutRow", idempotent = false;
    UpdateRow => "UpdateRow", idempotent = false;
    DeleteRow => "DeleteRow", idempotent = false;
    BatchGetRow => "BatchGetRow", idempotent = true;
    BatchWriteRow => "BatchWriteRow", idempotent = false;
    GetRange => "GetRange", idempotent = true;
    BulkImport => "BulkImport", idempotent = false;
    ComputeSplitPointsBySize => "ComputeSplitPointsBySize", idempotent = true;
    ListStream => "ListStream", idempotent = true;
    DescribeStream => "DescribeStream", idempotent = true;
    GetShardIterator => "GetShardIterator", idempotent = true;
    GetStreamRecord => "GetStreamRecord", idempotent = true;
    CreateIndex => "CreateIndex", idempotent = false;
    DropIndex => "DropIndex", idempotent = false;
    CreateSearchIndex => "CreateSearchIndex", idempotent = false;
    DeleteSearchIndex => "DeleteSearchIndex", idempotent = false;
    ListSearchIndex => "ListSearchIndex", idempotent = true;
    DescribeSearchIndex => "DescribeSearchIndex", idempotent = true;
    Search => "Search", idempotent = true;
    StartLocalTransaction => "StartLocalTransaction", idempotent = false;
    CommitTransaction => "CommitTransaction", idempotent = false;
    AbortTransaction => "AbortTransaction", idempotent = false;
    CreateTunnel => "CreateTunnel", idempotent = false;
    DeleteTunnel => "DeleteTunnel", idempotent = false;
    ListTunnel => "ListTunnel", idempotent = true;
    DescribeTunnel => "DescribeTunnel", idempotent = true;
    ReadRecords => "ReadRecords", idempotent = true;
    Checkpoint => "Checkpoint", idempotent = false;
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors after which the service guarantees the request had no effect.
/// These are retryable for any operation.
pub fn is_no_effect_error(code: &str, message: &str) -> bool {
    matches!(
        code,
        codes::ROW_OPERATION_CONFLICT
            | codes::NOT_ENOUGH_CAPACITY_UNIT
            | codes::TABLE_NOT_READY
            | codes::PARTITION_UNAVAILABLE
            | codes::SERVER_BUSY
    ) || (code == codes::QUOTA_EXHAUSTED && message == codes::TOO_FREQUENT_TABLE_OPERATIONS)
}

/// Errors where the request may or may not have been applied.
fn is_server_side_error(e: &ServiceError) -> bool {
    matches!(
        e.code.as_str(),
        codes::INTERNAL_SERVER_ERROR | codes::TIMEOUT | codes::SERVER_UNAVAILABLE
    ) || e.is_server_error()
}

fn is_service_error_retryable(op: Operation, e: &ServiceError, retry_writes: bool) -> bool {
    if is_no_effect_error(&e.code, &e.message) {
        return true;
    }
    is_server_side_error(e) && (op.is_idempotent() || retry_writes)
}

/// Whether `err` from `op` may be retried.
///
/// `retry_writes` opts non-idempotent operations into retrying server-side
/// failures whose outcome is unknown.
pub fn is_retryable(op: Operation, err: &ClientError, retry_writes: bool) -> bool {
    match err {
        ClientError::Transport(_) => op.is_idempotent(),
        ClientError::Service(e) => is_service_error_retryable(op, e, retry_writes),
        // One failure that cannot be retried makes the whole batch final.
        ClientError::PartialBatch(batch) => {
            !batch.errors.is_empty()
                && batch
                    .errors
                    .iter()
                    .all(|e| is_service_error_retryable(op, e, retry_writes))
        }
        ClientError::Local(_) => false,
    }
}
