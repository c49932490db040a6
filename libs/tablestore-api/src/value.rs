use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::ValueError;

/// Declared type of a column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Integer,
    Binary,
    Double,
    Boolean,
    /// Microseconds since the Unix epoch.
    DateTime,
}

impl ColumnType {
    /// Whether values of this type may appear in a primary key.
    pub fn is_primary_key_type(self) -> bool {
        matches!(
            self,
            ColumnType::String | ColumnType::Integer | ColumnType::Binary | ColumnType::DateTime
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::String => f.write_str("STRING"),
            ColumnType::Integer => f.write_str("INTEGER"),
            ColumnType::Binary => f.write_str("BINARY"),
            ColumnType::Double => f.write_str("DOUBLE"),
            ColumnType::Boolean => f.write_str("BOOLEAN"),
            ColumnType::DateTime => f.write_str("DATETIME"),
        }
    }
}

// ---------------------------------------------------------------------------
// ColumnValue: data columns
// ---------------------------------------------------------------------------

/// Value of a data column (attribute).
///
/// The variant is the declared type; comparing two values of different
/// variants is a [`ValueError::TypeMismatch`].
#[derive(Debug, Clone)]
pub enum ColumnValue {
    String(String),
    Integer(i64),
    Binary(Vec<u8>),
    Double(f64),
    Boolean(bool),
    /// Microseconds since the Unix epoch.
    DateTime(i64),
}

impl ColumnValue {
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnValue::String(_) => ColumnType::String,
            ColumnValue::Integer(_) => ColumnType::Integer,
            ColumnValue::Binary(_) => ColumnType::Binary,
            ColumnValue::Double(_) => ColumnType::Double,
            ColumnValue::Boolean(_) => ColumnType::Boolean,
            ColumnValue::DateTime(_) => ColumnType::DateTime,
        }
    }

    /// Total order within one declared type.
    ///
    /// Strings compare by UTF-8 bytes, doubles by IEEE total order.
    pub fn compare(&self, other: &ColumnValue) -> Result<Ordering, ValueError> {
        match (self, other) {
            (ColumnValue::String(a), ColumnValue::String(b)) => Ok(a.as_bytes().cmp(b.as_bytes())),
            (ColumnValue::Integer(a), ColumnValue::Integer(b)) => Ok(a.cmp(b)),
            (ColumnValue::Binary(a), ColumnValue::Binary(b)) => Ok(a.cmp(b)),
            (ColumnValue::Double(a), ColumnValue::Double(b)) => Ok(a.total_cmp(b)),
            (ColumnValue::Boolean(a), ColumnValue::Boolean(b)) => Ok(a.cmp(b)),
            (ColumnValue::DateTime(a), ColumnValue::DateTime(b)) => Ok(a.cmp(b)),
            _ => Err(ValueError::type_mismatch(
                self.column_type(),
                other.column_type(),
            )),
        }
    }

    /// Approximate payload size, used for capacity accounting.
    pub fn data_size(&self) -> usize {
        match self {
            ColumnValue::String(s) => s.len(),
            ColumnValue::Binary(b) => b.len(),
            ColumnValue::Boolean(_) => 1,
            ColumnValue::Integer(_) | ColumnValue::Double(_) | ColumnValue::DateTime(_) => 8,
        }
    }
}

impl PartialEq for ColumnValue {
    fn eq(&self, other: &Self) -> bool {
        matches!(self.compare(other), Ok(Ordering::Equal))
    }
}

impl Eq for ColumnValue {}

impl PartialOrd for ColumnValue {
    /// `None` when the declared types differ.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other).ok()
    }
}

impl Hash for ColumnValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.column_type().hash(state);
        match self {
            ColumnValue::String(s) => s.as_bytes().hash(state),
            ColumnValue::Integer(v) | ColumnValue::DateTime(v) => v.hash(state),
            ColumnValue::Binary(b) => b.hash(state),
            // total_cmp equality is bit equality
            ColumnValue::Double(v) => v.to_bits().hash(state),
            ColumnValue::Boolean(v) => v.hash(state),
        }
    }
}

impl From<&str> for ColumnValue {
    fn from(v: &str) -> Self {
        ColumnValue::String(v.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(v: String) -> Self {
        ColumnValue::String(v)
    }
}

impl From<i64> for ColumnValue {
    fn from(v: i64) -> Self {
        ColumnValue::Integer(v)
    }
}

impl From<i32> for ColumnValue {
    fn from(v: i32) -> Self {
        ColumnValue::Integer(i64::from(v))
    }
}

impl From<Vec<u8>> for ColumnValue {
    fn from(v: Vec<u8>) -> Self {
        ColumnValue::Binary(v)
    }
}

impl From<f64> for ColumnValue {
    fn from(v: f64) -> Self {
        ColumnValue::Double(v)
    }
}

impl From<bool> for ColumnValue {
    fn from(v: bool) -> Self {
        ColumnValue::Boolean(v)
    }
}

// ---------------------------------------------------------------------------
// PrimaryKeyValue: key columns and range boundaries
// ---------------------------------------------------------------------------

/// Value of a primary-key column.
///
/// Besides the concrete key types it carries three markers with no declared
/// type: `InfMin` and `InfMax` bound a range scan, `AutoIncrement` asks the
/// server to generate the column on write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrimaryKeyValue {
    InfMin,
    InfMax,
    AutoIncrement,
    String(String),
    Integer(i64),
    Binary(Vec<u8>),
    /// Microseconds since the Unix epoch.
    DateTime(i64),
}

impl PrimaryKeyValue {
    /// Declared type. `None` for the markers.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            PrimaryKeyValue::InfMin | PrimaryKeyValue::InfMax | PrimaryKeyValue::AutoIncrement => {
                None
            }
            PrimaryKeyValue::String(_) => Some(ColumnType::String),
            PrimaryKeyValue::Integer(_) => Some(ColumnType::Integer),
            PrimaryKeyValue::Binary(_) => Some(ColumnType::Binary),
            PrimaryKeyValue::DateTime(_) => Some(ColumnType::DateTime),
        }
    }

    pub fn is_inf_min(&self) -> bool {
        matches!(self, PrimaryKeyValue::InfMin)
    }

    pub fn is_inf_max(&self) -> bool {
        matches!(self, PrimaryKeyValue::InfMax)
    }

    pub fn is_auto_increment(&self) -> bool {
        matches!(self, PrimaryKeyValue::AutoIncrement)
    }

    /// Any of the three untyped markers.
    pub fn is_marker(&self) -> bool {
        self.column_type().is_none()
    }

    fn kind_name(&self) -> String {
        match self {
            PrimaryKeyValue::InfMin => "INF_MIN".to_string(),
            PrimaryKeyValue::InfMax => "INF_MAX".to_string(),
            PrimaryKeyValue::AutoIncrement => "AUTO_INCREMENT".to_string(),
            other => other
                .column_type()
                .map(|t| t.to_string())
                .unwrap_or_default(),
        }
    }

    /// Total order with `InfMin` below and `InfMax` above every concrete value.
    ///
    /// `AutoIncrement` only equals itself; ordering it against anything
    /// else is a type mismatch.
    pub fn compare(&self, other: &PrimaryKeyValue) -> Result<Ordering, ValueError> {
        use PrimaryKeyValue::*;

        match (self, other) {
            (AutoIncrement, AutoIncrement) => Ok(Ordering::Equal),
            (AutoIncrement, _) | (_, AutoIncrement) => Err(ValueError::type_mismatch(
                self.kind_name(),
                other.kind_name(),
            )),
            (InfMin, InfMin) | (InfMax, InfMax) => Ok(Ordering::Equal),
            (InfMin, _) | (_, InfMax) => Ok(Ordering::Less),
            (InfMax, _) | (_, InfMin) => Ok(Ordering::Greater),
            (String(a), String(b)) => Ok(a.as_bytes().cmp(b.as_bytes())),
            (Integer(a), Integer(b)) => Ok(a.cmp(b)),
            (Binary(a), Binary(b)) => Ok(a.cmp(b)),
            (DateTime(a), DateTime(b)) => Ok(a.cmp(b)),
            _ => Err(ValueError::type_mismatch(
                self.kind_name(),
                other.kind_name(),
            )),
        }
    }

    /// Smallest value strictly greater than `self` within its type.
    ///
    /// Saturates to `InfMax` when the type has no larger value.
    pub fn successor(&self) -> Result<PrimaryKeyValue, ValueError> {
        match self {
            PrimaryKeyValue::Integer(v) => Ok(v
                .checked_add(1)
                .map(PrimaryKeyValue::Integer)
                .unwrap_or(PrimaryKeyValue::InfMax)),
            PrimaryKeyValue::DateTime(v) => Ok(v
                .checked_add(1)
                .map(PrimaryKeyValue::DateTime)
                .unwrap_or(PrimaryKeyValue::InfMax)),
            PrimaryKeyValue::String(s) => {
                let mut next = s.clone();
                next.push('\0');
                Ok(PrimaryKeyValue::String(next))
            }
            PrimaryKeyValue::Binary(b) => {
                let mut next = b.clone();
                next.push(0);
                Ok(PrimaryKeyValue::Binary(next))
            }
            marker => Err(ValueError::NoSuccessor(marker.kind_name())),
        }
    }

    pub fn data_size(&self) -> usize {
        match self {
            PrimaryKeyValue::String(s) => s.len(),
            PrimaryKeyValue::Binary(b) => b.len(),
            PrimaryKeyValue::Integer(_) | PrimaryKeyValue::DateTime(_) => 8,
            _ => 0,
        }
    }
}

impl PartialOrd for PrimaryKeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other).ok()
    }
}

impl TryFrom<ColumnValue> for PrimaryKeyValue {
    type Error = ValueError;

    fn try_from(value: ColumnValue) -> Result<Self, Self::Error> {
        match value {
            ColumnValue::String(s) => Ok(PrimaryKeyValue::String(s)),
            ColumnValue::Integer(v) => Ok(PrimaryKeyValue::Integer(v)),
            ColumnValue::Binary(b) => Ok(PrimaryKeyValue::Binary(b)),
            ColumnValue::DateTime(v) => Ok(PrimaryKeyValue::DateTime(v)),
            other => Err(ValueError::InvalidPrimaryKeyType(other.column_type())),
        }
    }
}

impl From<&str> for PrimaryKeyValue {
    fn from(v: &str) -> Self {
        PrimaryKeyValue::String(v.to_string())
    }
}

impl From<String> for PrimaryKeyValue {
    fn from(v: String) -> Self {
        PrimaryKeyValue::String(v)
    }
}

impl From<i64> for PrimaryKeyValue {
    fn from(v: i64) -> Self {
        PrimaryKeyValue::Integer(v)
    }
}

impl From<i32> for PrimaryKeyValue {
    fn from(v: i32) -> Self {
        PrimaryKeyValue::Integer(i64::from(v))
    }
}

impl From<Vec<u8>> for PrimaryKeyValue {
    fn from(v: Vec<u8>) -> Self {
        PrimaryKeyValue::Binary(v)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    fn concrete_key_value() -> impl Strategy<Value = PrimaryKeyValue> {
        prop_oneof![
            any::<i64>().prop_map(PrimaryKeyValue::Integer),
            "[a-c]{0,4}".prop_map(PrimaryKeyValue::String),
            proptest::collection::vec(any::<u8>(), 0..4).prop_map(PrimaryKeyValue::Binary),
            any::<i64>().prop_map(PrimaryKeyValue::DateTime),
        ]
    }

    fn integer_or_bound() -> impl Strategy<Value = PrimaryKeyValue> {
        prop_oneof![
            1 => Just(PrimaryKeyValue::InfMin),
            1 => Just(PrimaryKeyValue::InfMax),
            6 => (-5i64..5).prop_map(PrimaryKeyValue::Integer),
        ]
    }

    #[test]
    fn markers_bound_concrete_values() {
        for v in [
            PrimaryKeyValue::Integer(i64::MIN),
            PrimaryKeyValue::Integer(i64::MAX),
            PrimaryKeyValue::String(String::new()),
            PrimaryKeyValue::Binary(vec![0xff; 8]),
            PrimaryKeyValue::DateTime(0),
        ] {
            assert_eq!(PrimaryKeyValue::InfMin.compare(&v), Ok(Ordering::Less));
            assert_eq!(PrimaryKeyValue::InfMax.compare(&v), Ok(Ordering::Greater));
            assert_eq!(v.compare(&PrimaryKeyValue::InfMin), Ok(Ordering::Greater));
            assert_eq!(v.compare(&PrimaryKeyValue::InfMax), Ok(Ordering::Less));
        }
        assert_eq!(
            PrimaryKeyValue::InfMin.compare(&PrimaryKeyValue::InfMax),
            Ok(Ordering::Less)
        );
        assert_eq!(
            PrimaryKeyValue::InfMax.compare(&PrimaryKeyValue::InfMax),
            Ok(Ordering::Equal)
        );
    }

    #[test]
    fn mixed_types_do_not_compare() {
        let err = PrimaryKeyValue::from("a")
            .compare(&PrimaryKeyValue::Integer(97))
            .unwrap_err();
        assert!(matches!(err, ValueError::TypeMismatch { .. }));
        assert!(ColumnValue::Double(1.0).compare(&ColumnValue::Integer(1)).is_err());
        assert_eq!(
            ColumnValue::Boolean(true).partial_cmp(&ColumnValue::Integer(1)),
            None
        );
    }

    #[test]
    fn auto_increment_only_equals_itself() {
        assert_eq!(
            PrimaryKeyValue::AutoIncrement.compare(&PrimaryKeyValue::AutoIncrement),
            Ok(Ordering::Equal)
        );
        assert!(PrimaryKeyValue::AutoIncrement.compare(&PrimaryKeyValue::InfMin).is_err());
        assert!(PrimaryKeyValue::Integer(1).compare(&PrimaryKeyValue::AutoIncrement).is_err());
    }

    #[test]
    fn successor_per_type() {
        assert_eq!(PrimaryKeyValue::Integer(7).successor(), Ok(PrimaryKeyValue::Integer(8)));
        assert_eq!(PrimaryKeyValue::Integer(i64::MAX).successor(), Ok(PrimaryKeyValue::InfMax));
        assert_eq!(PrimaryKeyValue::DateTime(i64::MAX).successor(), Ok(PrimaryKeyValue::InfMax));
        assert_eq!(
            PrimaryKeyValue::from("ab").successor(),
            Ok(PrimaryKeyValue::from("ab\0"))
        );
        assert_eq!(
            PrimaryKeyValue::Binary(vec![1, 2]).successor(),
            Ok(PrimaryKeyValue::Binary(vec![1, 2, 0]))
        );
        for marker in [
            PrimaryKeyValue::InfMin,
            PrimaryKeyValue::InfMax,
            PrimaryKeyValue::AutoIncrement,
        ] {
            assert!(matches!(marker.successor(), Err(ValueError::NoSuccessor(_))));
        }
    }

    #[test]
    fn binary_equality_is_by_content() {
        let a = ColumnValue::Binary(vec![1, 2, 3]);
        let b = ColumnValue::Binary(vec![1, 2, 3]);
        assert_eq!(a, b);
        let set: HashSet<ColumnValue> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn doubles_use_total_order() {
        let nan = ColumnValue::Double(f64::NAN);
        assert_eq!(nan, nan.clone());
        assert_eq!(
            ColumnValue::Double(-0.0).compare(&ColumnValue::Double(0.0)),
            Ok(Ordering::Less)
        );
        assert_eq!(
            ColumnValue::Boolean(false).compare(&ColumnValue::Boolean(true)),
            Ok(Ordering::Less)
        );
    }

    #[test]
    fn double_and_boolean_are_not_key_types() {
        assert_eq!(
            PrimaryKeyValue::try_from(ColumnValue::Double(1.5)),
            Err(ValueError::InvalidPrimaryKeyType(ColumnType::Double))
        );
        assert_eq!(
            PrimaryKeyValue::try_from(ColumnValue::DateTime(5)),
            Ok(PrimaryKeyValue::DateTime(5))
        );
    }

    proptest! {
        #[test]
        fn compare_is_antisymmetric(a in integer_or_bound(), b in integer_or_bound()) {
            let ab = a.compare(&b).unwrap();
            let ba = b.compare(&a).unwrap();
            prop_assert_eq!(ab, ba.reverse());
            prop_assert_eq!(ab == Ordering::Equal, a == b);
        }

        #[test]
        fn compare_is_transitive(
            a in integer_or_bound(),
            b in integer_or_bound(),
            c in integer_or_bound(),
        ) {
            let ab = a.compare(&b).unwrap();
            let bc = b.compare(&c).unwrap();
            if ab != Ordering::Greater && bc != Ordering::Greater {
                prop_assert_ne!(a.compare(&c).unwrap(), Ordering::Greater);
            }
        }

        #[test]
        fn successor_is_strictly_greater(v in concrete_key_value()) {
            let next = v.successor().unwrap();
            prop_assert_eq!(next.compare(&v).unwrap(), Ordering::Greater);
        }

        #[test]
        fn successor_is_injective_below_saturation(a in -1000i64..1000, b in -1000i64..1000) {
            let sa = PrimaryKeyValue::Integer(a).successor().unwrap();
            let sb = PrimaryKeyValue::Integer(b).successor().unwrap();
            prop_assert_eq!(sa == sb, a == b);
        }
    }
}
