use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::ops::Range;
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tablestore_api::{
    CapacityUnit, Cell, ClientError, Direction, PrimaryKey, RangeRequest, RangeResponse,
    RangeScan, Row, ValueError,
};

/// Bytes covered by one read capacity unit.
const READ_UNIT_BYTES: usize = 4 * 1024;

// ═══════════════════════════════════════════════════════════════
//  MemoryStoreConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_rows_per_page() -> usize {
    5_000
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct MemoryStoreConfig {
    /// Upper bound on rows returned by one range call, whatever the limit.
    #[serde(default = "default_max_rows_per_page")]
    pub max_rows_per_page: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_rows_per_page: default_max_rows_per_page(),
        }
    }
}

impl MemoryStoreConfig {
    /// Parse a JSON config blob. `"{}"` and the empty string give defaults.
    pub fn from_json(config_json: &str) -> Result<Self, serde_json::Error> {
        if config_json.trim().is_empty() || config_json == "{}" {
            return Ok(Self::default());
        }
        serde_json::from_str(config_json)
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryStore
// ═══════════════════════════════════════════════════════════════

struct Table {
    pk_names: Vec<String>,
    /// Sorted by primary key, ascending.
    rows: Vec<Row>,
}

impl Table {
    fn check_key(&self, pk: &PrimaryKey) -> Result<(), ValueError> {
        PrimaryKey::inf_min(self.pk_names.as_slice())?.check_same_schema(pk)
    }

    /// Binary search by key. `Ok` is an exact hit, `Err` the insert point.
    fn locate(&self, pk: &PrimaryKey) -> Result<Result<usize, usize>, ValueError> {
        let (mut lo, mut hi) = (0, self.rows.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.rows[mid].primary_key().compare(pk)? {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(Ok(mid)),
            }
        }
        Ok(Err(lo))
    }

    /// Index of the first row with key `>= pk` (`> pk` when `strict`).
    fn lower_bound(&self, pk: &PrimaryKey, strict: bool) -> Result<usize, ValueError> {
        Ok(match self.locate(pk)? {
            Ok(i) if strict => i + 1,
            Ok(i) | Err(i) => i,
        })
    }

    /// Row indices covered by the request, ascending.
    fn scan_range(&self, request: &RangeRequest) -> Result<Range<usize>, ValueError> {
        let (from, to) = match request.direction {
            Direction::Forward => (
                self.lower_bound(&request.inclusive_start, false)?,
                self.lower_bound(&request.exclusive_end, false)?,
            ),
            Direction::Backward => (
                self.lower_bound(&request.exclusive_end, true)?,
                self.lower_bound(&request.inclusive_start, true)?,
            ),
        };
        Ok(from..to.max(from))
    }

    /// Row indices covered by the request, in scan order. Lazy, so a page
    /// only walks the rows it returns plus one.
    fn scan_indices(
        &self,
        request: &RangeRequest,
    ) -> Result<Box<dyn Iterator<Item = usize>>, ValueError> {
        let range = self.scan_range(request)?;
        Ok(match request.direction {
            Direction::Forward => Box::new(range),
            Direction::Backward => Box::new(range.rev()),
        })
    }
}

/// Apply version selection and projection to a stored row.
fn project(row: &Row, request: &RangeRequest) -> Row {
    let max_versions = request.max_versions.unwrap_or(1) as usize;
    let mut cells: Vec<Cell> = Vec::new();
    for name in row.column_names() {
        if !request.columns_to_get.is_empty() && !request.columns_to_get.iter().any(|c| c == name)
        {
            continue;
        }
        let versions = row
            .columns(name)
            .iter()
            .filter(|cell| match (request.time_range, cell.timestamp) {
                (Some(range), Some(ts)) => range.contains(ts),
                (Some(_), None) => false,
                (None, _) => true,
            })
            .take(max_versions)
            .cloned();
        cells.extend(versions);
    }
    Row::new(row.primary_key().clone(), cells)
}

fn read_units(bytes: usize) -> u64 {
    bytes.div_ceil(READ_UNIT_BYTES).max(1) as u64
}

/// In-memory tables answering range reads the way the service does:
/// bounded pages, continuation keys, and consumed capacity.
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    failures: Mutex<VecDeque<ClientError>>,
    max_rows_per_page: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

impl MemoryStore {
    pub fn new(config: MemoryStoreConfig) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            failures: Mutex::new(VecDeque::new()),
            max_rows_per_page: config.max_rows_per_page.max(1),
        }
    }

    fn read_tables(&self) -> RwLockReadGuard<'_, HashMap<String, Table>> {
        match self.tables.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("memory store read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_tables(&self) -> RwLockWriteGuard<'_, HashMap<String, Table>> {
        match self.tables.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("memory store write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn create_table<S: AsRef<str>>(&self, name: &str, pk_names: &[S]) -> Result<(), ClientError> {
        // Validates the schema: non-empty, no duplicate names.
        PrimaryKey::inf_min(pk_names)?;
        let mut tables = self.write_tables();
        if tables.contains_key(name) {
            return Err(ValueError::InvalidArgument(format!("table '{name}' already exists")).into());
        }
        tables.insert(
            name.to_string(),
            Table {
                pk_names: pk_names.iter().map(|n| n.as_ref().to_string()).collect(),
                rows: Vec::new(),
            },
        );
        tracing::debug!(table = %name, "created table");
        Ok(())
    }

    /// Insert or replace a row.
    pub fn put_row(&self, table: &str, row: Row) -> Result<(), ClientError> {
        if row.primary_key().columns().iter().any(|c| c.value.is_marker()) {
            return Err(ValueError::InvalidArgument(
                "stored keys cannot contain INF_MIN, INF_MAX or AUTO_INCREMENT".into(),
            )
            .into());
        }
        let mut tables = self.write_tables();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| ValueError::TableNotFound(table.to_string()))?;
        t.check_key(row.primary_key())?;
        match t.locate(row.primary_key())? {
            Ok(i) => t.rows[i] = row,
            Err(i) => t.rows.insert(i, row),
        }
        Ok(())
    }

    pub fn get_row(&self, table: &str, pk: &PrimaryKey) -> Result<Option<Row>, ClientError> {
        let tables = self.read_tables();
        let t = tables
            .get(table)
            .ok_or_else(|| ValueError::TableNotFound(table.to_string()))?;
        t.check_key(pk)?;
        Ok(t.locate(pk)?.ok().map(|i| t.rows[i].clone()))
    }

    pub fn row_count(&self, table: &str) -> Result<usize, ClientError> {
        let tables = self.read_tables();
        let t = tables
            .get(table)
            .ok_or_else(|| ValueError::TableNotFound(table.to_string()))?;
        Ok(t.rows.len())
    }

    /// Queue an error to be returned by an upcoming range call instead of
    /// data. Queued errors are served first in, first out.
    pub fn inject_failure(&self, err: ClientError) {
        let mut failures = match self.failures.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        failures.push_back(err);
    }

    fn take_failure(&self) -> Option<ClientError> {
        match self.failures.lock() {
            Ok(mut g) => g.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        }
    }
}

impl RangeScan for MemoryStore {
    fn get_range(&self, request: &RangeRequest) -> Result<RangeResponse, ClientError> {
        if let Some(err) = self.take_failure() {
            tracing::debug!(table = %request.table_name, error = %err, "serving injected failure");
            return Err(err);
        }
        if request.limit == Some(0) {
            return Err(ValueError::InvalidArgument("limit must be positive".into()).into());
        }

        let tables = self.read_tables();
        let t = tables
            .get(&request.table_name)
            .ok_or_else(|| ValueError::TableNotFound(request.table_name.clone()))?;
        t.check_key(&request.inclusive_start)?;
        t.check_key(&request.exclusive_end)?;

        let page = request
            .limit
            .map_or(self.max_rows_per_page, |l| l.min(self.max_rows_per_page));
        let mut rows = Vec::new();
        let mut next_start = None;
        let mut bytes = 0;
        for i in t.scan_indices(request)? {
            let stored = &t.rows[i];
            if rows.len() == page {
                next_start = Some(stored.primary_key().clone());
                break;
            }
            let row = project(stored, request);
            if row.is_empty() && !stored.is_empty() {
                continue;
            }
            if let Some(filter) = &request.filter {
                if !filter.evaluate(&row)? {
                    continue;
                }
            }
            bytes += row.data_size();
            rows.push(row);
        }

        tracing::debug!(
            table = %request.table_name,
            rows = rows.len(),
            more = next_start.is_some(),
            "served range page"
        );
        Ok(RangeResponse {
            rows,
            next_start_primary_key: next_start,
            consumed: CapacityUnit {
                read: read_units(bytes),
                write: 0,
            },
        })
    }
}
