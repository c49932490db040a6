pub mod checksum;
pub mod error;
pub mod filter;
pub mod range;
pub mod record;
pub mod value;

pub use error::{ChecksumError, ClientError, PartialBatchError, ServiceError, TransportError, ValueError};
pub use filter::{ColumnCondition, CompareOp, LogicalOp};
pub use range::{CapacityUnit, Direction, RangeRequest, RangeResponse, RangeScan, TimeRange};
pub use record::{Cell, PrimaryKey, PrimaryKeyBuilder, PrimaryKeyColumn, Row};
pub use value::{ColumnType, ColumnValue, PrimaryKeyValue};
