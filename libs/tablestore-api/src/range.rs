use crate::error::ClientError;
use crate::filter::ColumnCondition;
use crate::record::{PrimaryKey, Row};

/// Scan direction of a range read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Ascending keys: `start <= pk < end`.
    #[default]
    Forward,
    /// Descending keys: `end < pk <= start`.
    Backward,
}

/// Version time window `[start_ms, end_ms)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeRange {
    pub fn contains(&self, ts: i64) -> bool {
        self.start_ms <= ts && ts < self.end_ms
    }
}

/// Read / write capacity reported by the service for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapacityUnit {
    pub read: u64,
    pub write: u64,
}

impl std::ops::AddAssign for CapacityUnit {
    fn add_assign(&mut self, rhs: Self) {
        self.read += rhs.read;
        self.write += rhs.write;
    }
}

/// One `GetRange` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeRequest {
    pub table_name: String,
    pub direction: Direction,
    pub inclusive_start: PrimaryKey,
    pub exclusive_end: PrimaryKey,
    /// Columns to return. Empty means all.
    pub columns_to_get: Vec<String>,
    /// Versions per column to return. `None` means the newest only.
    pub max_versions: Option<u32>,
    pub time_range: Option<TimeRange>,
    pub filter: Option<ColumnCondition>,
    /// Row limit for this page. `None` lets the server choose.
    pub limit: Option<usize>,
}

impl RangeRequest {
    pub fn new(
        table_name: impl Into<String>,
        direction: Direction,
        inclusive_start: PrimaryKey,
        exclusive_end: PrimaryKey,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            direction,
            inclusive_start,
            exclusive_end,
            columns_to_get: Vec::new(),
            max_versions: None,
            time_range: None,
            filter: None,
            limit: None,
        }
    }
}

/// Result of one `GetRange` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeResponse {
    pub rows: Vec<Row>,
    /// Where the next page starts. `None` or a zero-column key means the
    /// range is exhausted.
    pub next_start_primary_key: Option<PrimaryKey>,
    pub consumed: CapacityUnit,
}

impl RangeResponse {
    /// Continuation key, if the range has more data.
    pub fn continuation(&self) -> Option<&PrimaryKey> {
        self.next_start_primary_key
            .as_ref()
            .filter(|pk| !pk.is_empty())
    }
}

/// Remote range-scan operation.
///
/// Implemented by the transport layer; the range iterator only knows this
/// trait. One call is one server round-trip.
pub trait RangeScan: Send + Sync {
    fn get_range(&self, request: &RangeRequest) -> Result<RangeResponse, ClientError>;
}

impl<T: RangeScan + ?Sized> RangeScan for &T {
    fn get_range(&self, request: &RangeRequest) -> Result<RangeResponse, ClientError> {
        (**self).get_range(request)
    }
}

impl<T: RangeScan + ?Sized> RangeScan for std::sync::Arc<T> {
    fn get_range(&self, request: &RangeRequest) -> Result<RangeResponse, ClientError> {
        (**self).get_range(request)
    }
}
