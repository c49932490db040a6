use std::cmp::Ordering;

use crate::error::ValueError;
use crate::value::{ColumnValue, PrimaryKeyValue};

// ---------------------------------------------------------------------------
// Primary key
// ---------------------------------------------------------------------------

/// One named column of a primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimaryKeyColumn {
    pub name: String,
    pub value: PrimaryKeyValue,
}

impl PrimaryKeyColumn {
    pub fn new(name: impl Into<String>, value: impl Into<PrimaryKeyValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered primary key.
///
/// Column order and names follow the table's key schema. A key with no
/// columns is only produced by a range scan to mark its last page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PrimaryKey {
    columns: Vec<PrimaryKeyColumn>,
}

impl PrimaryKey {
    /// Build a key, rejecting duplicate column names and empty input.
    pub fn new(columns: Vec<PrimaryKeyColumn>) -> Result<Self, ValueError> {
        if columns.is_empty() {
            return Err(ValueError::EmptyPrimaryKey);
        }
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(ValueError::DuplicateColumn(col.name.clone()));
            }
        }
        Ok(Self { columns })
    }

    pub fn builder() -> PrimaryKeyBuilder {
        PrimaryKeyBuilder::default()
    }

    /// The zero-column key a range scan returns on its final page.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Lowest key of a schema: every column set to `InfMin`.
    pub fn inf_min<S: AsRef<str>>(names: &[S]) -> Result<Self, ValueError> {
        Self::filled(names, PrimaryKeyValue::InfMin)
    }

    /// Highest key of a schema: every column set to `InfMax`.
    pub fn inf_max<S: AsRef<str>>(names: &[S]) -> Result<Self, ValueError> {
        Self::filled(names, PrimaryKeyValue::InfMax)
    }

    fn filled<S: AsRef<str>>(names: &[S], value: PrimaryKeyValue) -> Result<Self, ValueError> {
        Self::new(
            names
                .iter()
                .map(|n| PrimaryKeyColumn::new(n.as_ref(), value.clone()))
                .collect(),
        )
    }

    pub fn columns(&self) -> &[PrimaryKeyColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&PrimaryKeyValue> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.value)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Check that `other` has the same arity and column names, in order.
    pub fn check_same_schema(&self, other: &PrimaryKey) -> Result<(), ValueError> {
        if self.len() != other.len() {
            return Err(ValueError::SchemaMismatch(format!(
                "key has {} columns, other has {}",
                self.len(),
                other.len()
            )));
        }
        for (a, b) in self.columns.iter().zip(&other.columns) {
            if a.name != b.name {
                return Err(ValueError::SchemaMismatch(format!(
                    "column '{}' does not match '{}'",
                    a.name, b.name
                )));
            }
        }
        Ok(())
    }

    /// Column-wise lexicographic comparison of two keys of the same schema.
    pub fn compare(&self, other: &PrimaryKey) -> Result<Ordering, ValueError> {
        self.check_same_schema(other)?;
        for (a, b) in self.columns.iter().zip(&other.columns) {
            match a.value.compare(&b.value)? {
                Ordering::Equal => continue,
                ord => return Ok(ord),
            }
        }
        Ok(Ordering::Equal)
    }

    /// Smallest key strictly greater than `self`: the last column is
    /// replaced by its successor.
    pub fn successor(&self) -> Result<PrimaryKey, ValueError> {
        let Some((last, head)) = self.columns.split_last() else {
            return Err(ValueError::EmptyPrimaryKey);
        };
        let mut columns = head.to_vec();
        columns.push(PrimaryKeyColumn {
            name: last.name.clone(),
            value: last.value.successor()?,
        });
        Ok(PrimaryKey { columns })
    }

    pub fn data_size(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.name.len() + c.value.data_size())
            .sum()
    }
}

impl PartialOrd for PrimaryKey {
    /// `None` when the keys are of different schemas or types.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other).ok()
    }
}

impl<'a> IntoIterator for &'a PrimaryKey {
    type Item = &'a PrimaryKeyColumn;
    type IntoIter = std::slice::Iter<'a, PrimaryKeyColumn>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

/// Incremental construction of a [`PrimaryKey`].
#[derive(Debug, Default)]
pub struct PrimaryKeyBuilder {
    columns: Vec<PrimaryKeyColumn>,
}

impl PrimaryKeyBuilder {
    pub fn add(mut self, name: impl Into<String>, value: impl Into<PrimaryKeyValue>) -> Self {
        self.columns.push(PrimaryKeyColumn::new(name, value));
        self
    }

    pub fn build(self) -> Result<PrimaryKey, ValueError> {
        PrimaryKey::new(self.columns)
    }
}

// ---------------------------------------------------------------------------
// Cell
// ---------------------------------------------------------------------------

/// A single versioned attribute of a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cell {
    pub name: String,
    pub value: ColumnValue,
    /// Version timestamp in milliseconds. `None` lets the server assign one.
    pub timestamp: Option<i64>,
}

impl Cell {
    pub fn new(name: impl Into<String>, value: impl Into<ColumnValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Compare by value. Cells of different declared types do not compare.
    pub fn compare(&self, other: &Cell) -> Result<Ordering, ValueError> {
        self.value.compare(&other.value)
    }

    pub fn data_size(&self) -> usize {
        self.name.len() + self.value.data_size() + self.timestamp.map_or(0, |_| 8)
    }
}

/// Row order of cells: name ascending, then newest version first.
/// Cells without a timestamp sort after timestamped versions.
fn cell_order(a: &Cell, b: &Cell) -> Ordering {
    a.name
        .cmp(&b.name)
        .then_with(|| match (a.timestamp, b.timestamp) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// Primary key plus its cells in row order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    primary_key: PrimaryKey,
    cells: Vec<Cell>,
}

impl Row {
    /// Assemble a row from cells in any order.
    pub fn new(primary_key: PrimaryKey, mut cells: Vec<Cell>) -> Self {
        cells.sort_by(cell_order);
        Self { primary_key, cells }
    }

    pub fn primary_key(&self) -> &PrimaryKey {
        &self.primary_key
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn into_parts(self) -> (PrimaryKey, Vec<Cell>) {
        (self.primary_key, self.cells)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// All versions of a column, newest first.
    pub fn columns(&self, name: &str) -> &[Cell] {
        let start = self.cells.partition_point(|c| c.name.as_str() < name);
        let len = self.cells[start..].partition_point(|c| c.name == name);
        &self.cells[start..start + len]
    }

    /// Newest version of a column.
    pub fn latest(&self, name: &str) -> Option<&Cell> {
        self.columns(name).first()
    }

    pub fn contains(&self, name: &str) -> bool {
        !self.columns(name).is_empty()
    }

    /// Distinct column names, ascending.
    pub fn column_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.cells.iter().map(|c| c.name.as_str()).collect();
        names.dedup();
        names
    }

    pub fn data_size(&self) -> usize {
        self.primary_key.data_size() + self.cells.iter().map(Cell::data_size).sum::<usize>()
    }
}
