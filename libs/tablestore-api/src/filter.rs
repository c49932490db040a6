use std::cmp::Ordering;

use crate::error::ValueError;
use crate::record::Row;
use crate::value::ColumnValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
}

impl CompareOp {
    fn accepts(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Equal => ord == Ordering::Equal,
            CompareOp::NotEqual => ord != Ordering::Equal,
            CompareOp::GreaterThan => ord == Ordering::Greater,
            CompareOp::GreaterEqual => ord != Ordering::Less,
            CompareOp::LessThan => ord == Ordering::Less,
            CompareOp::LessEqual => ord != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    /// Exactly one sub-condition.
    Not,
}

/// Server-side row filter attached to a read.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnCondition {
    /// Compare one column against a constant.
    Single {
        column: String,
        op: CompareOp,
        value: ColumnValue,
        /// Result when the row has no such column.
        pass_if_missing: bool,
        /// Only test the newest version instead of any version.
        latest_version_only: bool,
    },
    Composite {
        op: LogicalOp,
        conditions: Vec<ColumnCondition>,
    },
}

impl ColumnCondition {
    /// `column <op> value`, passing rows without the column, newest version only.
    pub fn single(column: impl Into<String>, op: CompareOp, value: impl Into<ColumnValue>) -> Self {
        ColumnCondition::Single {
            column: column.into(),
            op,
            value: value.into(),
            pass_if_missing: true,
            latest_version_only: true,
        }
    }

    pub fn and(conditions: Vec<ColumnCondition>) -> Self {
        ColumnCondition::Composite {
            op: LogicalOp::And,
            conditions,
        }
    }

    pub fn or(conditions: Vec<ColumnCondition>) -> Self {
        ColumnCondition::Composite {
            op: LogicalOp::Or,
            conditions,
        }
    }

    pub fn not(condition: ColumnCondition) -> Self {
        ColumnCondition::Composite {
            op: LogicalOp::Not,
            conditions: vec![condition],
        }
    }

    /// Set `pass_if_missing` on a single-column condition. No-op on composites.
    pub fn pass_if_missing(mut self, pass: bool) -> Self {
        if let ColumnCondition::Single {
            pass_if_missing, ..
        } = &mut self
        {
            *pass_if_missing = pass;
        }
        self
    }

    /// Set `latest_version_only` on a single-column condition. No-op on composites.
    pub fn latest_version_only(mut self, latest: bool) -> Self {
        if let ColumnCondition::Single {
            latest_version_only,
            ..
        } = &mut self
        {
            *latest_version_only = latest;
        }
        self
    }

    /// Whether `row` passes the condition.
    pub fn evaluate(&self, row: &Row) -> Result<bool, ValueError> {
        match self {
            ColumnCondition::Single {
                column,
                op,
                value,
                pass_if_missing,
                latest_version_only,
            } => {
                let versions = row.columns(column);
                if versions.is_empty() {
                    return Ok(*pass_if_missing);
                }
                let candidates = if *latest_version_only {
                    &versions[..1]
                } else {
                    versions
                };
                for cell in candidates {
                    if op.accepts(cell.value.compare(value)?) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            ColumnCondition::Composite { op, conditions } => match op {
                LogicalOp::And => {
                    for c in conditions {
                        if !c.evaluate(row)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                LogicalOp::Or => {
                    for c in conditions {
                        if c.evaluate(row)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                LogicalOp::Not => match conditions.as_slice() {
                    [only] => Ok(!only.evaluate(row)?),
                    _ => Err(ValueError::InvalidArgument(format!(
                        "NOT takes exactly one condition, got {}",
                        conditions.len()
                    ))),
                },
            },
        }
    }
}
