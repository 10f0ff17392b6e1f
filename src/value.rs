use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use rust_decimal::Decimal;

/// A decoded host value.
///
/// Variants mirror the engine's logical types. Map entries are a pair list:
/// keys are decoded values, so maps with non-hashable key types (doubles,
/// rows) stay representable.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    Decimal(Decimal),
    Varchar(String),
    Char(String),
    Varbinary(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampWithTimeZone(DateTime<FixedOffset>),
    IntervalYearToMonth(IntervalYearToMonth),
    IntervalDayToSecond(TimeDelta),
    Uuid(uuid::Uuid),
    IpAddress(String),
    Json(serde_json::Value),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Row(Vec<Value>),
}

/// Signed year-month interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntervalYearToMonth {
    pub years: i32,
    pub months: i32,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// String content of `varchar`, `char`, and `ipaddress` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Varchar(s) | Self::Char(s) | Self::IpAddress(s) => Some(s),
            _ => None,
        }
    }

    /// Integral value widened to 64 bits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::TinyInt(v) => Some((*v).into()),
            Self::SmallInt(v) => Some((*v).into()),
            Self::Integer(v) => Some((*v).into()),
            Self::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Floating-point value widened to 64 bits.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some((*v).into()),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::BigInt(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Varchar(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Varchar(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Varbinary(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::TimestampWithTimeZone(value)
    }
}

impl From<TimeDelta> for Value {
    fn from(value: TimeDelta) -> Self {
        Self::IntervalDayToSecond(value)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(value: uuid::Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

#[cfg(test)]
mod tests {
    use super::Value;

    #[test]
    fn integral_widening() {
        assert_eq!(Value::TinyInt(-3).as_i64(), Some(-3));
        assert_eq!(Value::SmallInt(300).as_i64(), Some(300));
        assert_eq!(Value::BigInt(1 << 40).as_i64(), Some(1 << 40));
        assert_eq!(Value::Varchar("1".to_owned()).as_i64(), None);
    }

    #[test]
    fn string_access_covers_char_and_ipaddress() {
        assert_eq!(Value::Char("ab".to_owned()).as_str(), Some("ab"));
        assert_eq!(Value::IpAddress("::1".to_owned()).as_str(), Some("::1"));
        assert_eq!(Value::BigInt(1).as_str(), None);
    }

    #[test]
    fn from_impls() {
        assert_eq!(Value::from(7i64), Value::BigInt(7));
        assert_eq!(Value::from("kit"), Value::Varchar("kit".to_owned()));
        assert!(Value::Null.is_null());
    }
}
