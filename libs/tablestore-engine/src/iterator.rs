use std::collections::VecDeque;

use tablestore_api::{
    CapacityUnit, ClientError, ColumnCondition, Direction, PrimaryKey, RangeRequest, RangeScan,
    Row, TimeRange, ValueError,
};

/// What a range iterator should read.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeIteratorParameter {
    pub table_name: String,
    pub direction: Direction,
    pub inclusive_start: PrimaryKey,
    pub exclusive_end: PrimaryKey,
    pub columns_to_get: Vec<String>,
    pub max_versions: Option<u32>,
    pub time_range: Option<TimeRange>,
    pub filter: Option<ColumnCondition>,
    /// Total rows to return. `None` reads the whole range.
    pub max_count: Option<usize>,
    /// Rows requested per round-trip. `None` asks for `max_count` or lets the
    /// server choose.
    pub buffer_size: Option<usize>,
}

impl RangeIteratorParameter {
    pub fn new(
        table_name: impl Into<String>,
        inclusive_start: PrimaryKey,
        exclusive_end: PrimaryKey,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            direction: Direction::Forward,
            inclusive_start,
            exclusive_end,
            columns_to_get: Vec::new(),
            max_versions: None,
            time_range: None,
            filter: None,
            max_count: None,
            buffer_size: None,
        }
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn columns_to_get<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns_to_get = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_versions(mut self, versions: u32) -> Self {
        self.max_versions = Some(versions);
        self
    }

    pub fn time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn filter(mut self, filter: ColumnCondition) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn max_count(mut self, count: usize) -> Self {
        self.max_count = Some(count);
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    fn validate(&self) -> Result<(), ValueError> {
        if self.table_name.is_empty() {
            return Err(ValueError::InvalidArgument("table name is empty".into()));
        }
        if self.inclusive_start.is_empty() {
            return Err(ValueError::EmptyPrimaryKey);
        }
        self.inclusive_start.check_same_schema(&self.exclusive_end)?;
        let boundary_has_placeholder = self
            .inclusive_start
            .columns()
            .iter()
            .chain(self.exclusive_end.columns())
            .any(|c| c.value.is_auto_increment());
        if boundary_has_placeholder {
            return Err(ValueError::InvalidArgument(
                "range boundary cannot contain AUTO_INCREMENT".into(),
            ));
        }
        if self.max_count == Some(0) {
            return Err(ValueError::InvalidArgument("max_count must be positive".into()));
        }
        if self.buffer_size == Some(0) {
            return Err(ValueError::InvalidArgument("buffer_size must be positive".into()));
        }
        if self.max_versions == Some(0) {
            return Err(ValueError::InvalidArgument("max_versions must be positive".into()));
        }
        Ok(())
    }
}

/// Outcome of one explicit page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// A round-trip was made and `rows` rows were buffered.
    Page { rows: usize, more_available: bool },
    /// Nothing left to fetch; no round-trip was made.
    Exhausted,
}

/// Pull-based cursor over a multi-page range read.
///
/// Each page resumes at the continuation key of the previous one; the end
/// key never changes. A failed fetch leaves the cursor untouched, so the
/// caller can apply its retry policy and simply pull again.
pub struct RangeIterator<S> {
    client: S,
    request: RangeRequest,
    /// Start of the next page. `None` once the server reported the end.
    next_start: Option<PrimaryKey>,
    /// Rows still allowed. `None` when unbounded.
    remaining: Option<usize>,
    buffer_size: Option<usize>,
    buffer: VecDeque<Row>,
    fetches: usize,
    rows_returned: usize,
    consumed: CapacityUnit,
}

impl<S> std::fmt::Debug for RangeIterator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeIterator")
            .field("table", &self.request.table_name)
            .field("next_start", &self.next_start)
            .field("remaining", &self.remaining)
            .field("buffered", &self.buffer.len())
            .field("fetches", &self.fetches)
            .finish()
    }
}

impl<S: RangeScan> RangeIterator<S> {
    /// Validate `param` and fetch the first page.
    pub fn new(client: S, param: RangeIteratorParameter) -> Result<Self, ClientError> {
        let mut iter = Self::prepare(client, param)?;
        iter.fetch_next_page()?;
        Ok(iter)
    }

    /// Validate `param` without any round-trip.
    pub fn prepare(client: S, param: RangeIteratorParameter) -> Result<Self, ClientError> {
        param.validate()?;
        let RangeIteratorParameter {
            table_name,
            direction,
            inclusive_start,
            exclusive_end,
            columns_to_get,
            max_versions,
            time_range,
            filter,
            max_count,
            buffer_size,
        } = param;

        let mut request = RangeRequest::new(
            table_name,
            direction,
            inclusive_start.clone(),
            exclusive_end,
        );
        request.columns_to_get = columns_to_get;
        request.max_versions = max_versions;
        request.time_range = time_range;
        request.filter = filter;

        Ok(Self {
            client,
            request,
            next_start: Some(inclusive_start),
            remaining: max_count,
            buffer_size,
            buffer: VecDeque::new(),
            fetches: 0,
            rows_returned: 0,
            consumed: CapacityUnit::default(),
        })
    }

    /// No more round-trips will be made. Buffered rows may remain.
    pub fn is_terminal(&self) -> bool {
        self.next_start.is_none() || self.remaining == Some(0)
    }

    fn page_limit(&self) -> Option<usize> {
        match (self.buffer_size, self.remaining) {
            (Some(size), Some(left)) => Some(size.min(left)),
            (Some(size), None) => Some(size),
            (None, left) => left,
        }
    }

    /// Make one round-trip for the next page and buffer its rows.
    pub fn fetch_next_page(&mut self) -> Result<PageOutcome, ClientError> {
        if self.is_terminal() {
            return Ok(PageOutcome::Exhausted);
        }
        let Some(start) = self.next_start.clone() else {
            return Ok(PageOutcome::Exhausted);
        };
        self.request.inclusive_start = start;
        self.request.limit = self.page_limit();

        let response = self.client.get_range(&self.request)?;

        self.fetches += 1;
        self.consumed += response.consumed;
        let continuation = response.continuation().cloned();
        let mut rows = response.rows;
        if let Some(left) = self.remaining {
            rows.truncate(left);
            self.remaining = Some(left - rows.len());
        }
        self.next_start = continuation;

        let count = rows.len();
        self.buffer.extend(rows);
        tracing::debug!(
            table = %self.request.table_name,
            fetch = self.fetches,
            rows = count,
            more = !self.is_terminal(),
            "fetched range page"
        );
        Ok(PageOutcome::Page {
            rows: count,
            more_available: !self.is_terminal(),
        })
    }

    /// Whether another row is available, fetching pages as needed.
    pub fn has_next(&mut self) -> Result<bool, ClientError> {
        while self.buffer.is_empty() {
            if self.fetch_next_page()? == PageOutcome::Exhausted {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Next row, or `IteratorExhausted` when the range is done.
    pub fn next_row(&mut self) -> Result<Row, ClientError> {
        if self.has_next()? {
            if let Some(row) = self.buffer.pop_front() {
                self.rows_returned += 1;
                return Ok(row);
            }
        }
        Err(ValueError::IteratorExhausted.into())
    }
}

impl<S> RangeIterator<S> {
    /// Round-trips made so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches
    }

    pub fn rows_returned(&self) -> usize {
        self.rows_returned
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn consumed(&self) -> CapacityUnit {
        self.consumed
    }

    pub fn next_start_primary_key(&self) -> Option<&PrimaryKey> {
        self.next_start.as_ref()
    }
}

impl<S: RangeScan> Iterator for RangeIterator<S> {
    type Item = Result<Row, ClientError>;

    /// A fetch error is yielded once; pulling again retries the same page.
    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => {
                let row = self.buffer.pop_front()?;
                self.rows_returned += 1;
                Some(Ok(row))
            }
            Ok(false) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
