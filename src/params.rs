//! Bound-parameter support for prepared `EXECUTE` statements.
//!
//! The protocol has no parameter channel: the original SQL travels in a
//! prepared-statement header under a fresh name, and the POST body becomes
//! `EXECUTE <name> USING <literal, …>` with every host value rendered as a
//! SQL literal.

use crate::{Value, value::IntervalYearToMonth};

/// Positional SQL parameters bound to `?` placeholders.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params(Vec<Value>);

impl Params {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn positional(values: impl Into<Vec<Value>>) -> Self {
        Self(values.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn values(&self) -> &[Value] {
        &self.0
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl<const N: usize> From<[Value; N]> for Params {
    fn from(values: [Value; N]) -> Self {
        Self(values.into())
    }
}

/// Generates the statement name registered through the prepared-statement
/// header: a fixed prefix plus a 128-bit random token without separators.
pub(crate) fn fresh_statement_name() -> String {
    format!("statement{}", uuid::Uuid::new_v4().simple())
}

/// Renders the `EXECUTE` body for a prepared statement.
pub(crate) fn build_execute_sql(name: &str, params: &Params) -> String {
    let literals = params
        .values()
        .iter()
        .map(encode_literal)
        .collect::<Vec<_>>()
        .join(", ");
    format!("EXECUTE {name} USING {literals}")
}

/// Renders one host value as a SQL literal expression.
pub(crate) fn encode_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_owned(),
        Value::Boolean(true) => "TRUE".to_owned(),
        Value::Boolean(false) => "FALSE".to_owned(),
        Value::TinyInt(v) => v.to_string(),
        Value::SmallInt(v) => v.to_string(),
        Value::Integer(v) => v.to_string(),
        Value::BigInt(v) => v.to_string(),
        Value::Real(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Decimal(v) => v.to_string(),
        Value::Varchar(v) | Value::Char(v) | Value::IpAddress(v) => quote(v),
        Value::Varbinary(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
            format!("X'{hex}'")
        }
        Value::Date(v) => format!("DATE '{}'", v.format("%Y-%m-%d")),
        Value::Time(v) => format!("TIME '{}'", v.format("%H:%M:%S%.3f")),
        Value::Timestamp(v) => {
            format!("timestamp '{}'", v.format("%Y-%m-%d %H:%M:%S%.3f"))
        }
        Value::TimestampWithTimeZone(v) => format!(
            "\"timestamp with time zone\" '{}'",
            v.format("%Y-%m-%d %H:%M:%S%.3f %:z")
        ),
        Value::IntervalYearToMonth(v) => quote(&format_year_month(v)),
        Value::IntervalDayToSecond(v) => quote(&format_day_second(*v)),
        Value::Uuid(v) => quote(&v.to_string()),
        Value::Json(v) => quote(&v.to_string()),
        Value::Array(items) | Value::Row(items) => {
            let inner = items.iter().map(encode_literal).collect::<Vec<_>>().join(", ");
            format!("({inner})")
        }
        Value::Map(entries) => {
            let keys = entries
                .iter()
                .map(|(k, _)| encode_literal(k))
                .collect::<Vec<_>>()
                .join(", ");
            let values = entries
                .iter()
                .map(|(_, v)| encode_literal(v))
                .collect::<Vec<_>>()
                .join(", ");
            format!("MAP(ARRAY[{keys}], ARRAY[{values}])")
        }
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn format_year_month(interval: &IntervalYearToMonth) -> String {
    let sign = if interval.years < 0 || interval.months < 0 {
        "-"
    } else {
        ""
    };
    format!("{sign}{}-{}", interval.years.abs(), interval.months.abs())
}

fn format_day_second(delta: chrono::TimeDelta) -> String {
    let (sign, delta) = if delta < chrono::TimeDelta::zero() {
        ("-", -delta)
    } else {
        ("", delta)
    };
    let days = delta.num_days();
    let hours = delta.num_hours() - days * 24;
    let minutes = delta.num_minutes() - delta.num_hours() * 60;
    let seconds = delta.num_seconds() - delta.num_minutes() * 60;
    let millis = delta.num_milliseconds() - delta.num_seconds() * 1000;
    format!("{sign}{days} {hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

#[cfg(test)]
mod tests {
    use super::{build_execute_sql, encode_literal, fresh_statement_name, Params};
    use crate::value::IntervalYearToMonth;
    use crate::Value;
    use chrono::{FixedOffset, NaiveDate, TimeDelta, TimeZone};

    #[test]
    fn execute_body_for_datetime_parameters() {
        let local = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let instant = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .unwrap();
        let params = Params::positional([Value::from(local), Value::from(instant)]);

        assert_eq!(
            build_execute_sql("stmt1", &params),
            "EXECUTE stmt1 USING timestamp '2024-01-01 00:00:00.000', \
             \"timestamp with time zone\" '2024-01-01 00:00:00.000 +00:00'"
        );
    }

    #[test]
    fn quotes_and_doubles_single_quotes() {
        assert_eq!(encode_literal(&Value::from("it's")), "'it''s'");
    }

    #[test]
    fn encodes_scalar_literals() {
        assert_eq!(encode_literal(&Value::Null), "NULL");
        assert_eq!(encode_literal(&Value::Boolean(true)), "TRUE");
        assert_eq!(encode_literal(&Value::BigInt(-5)), "-5");
        assert_eq!(
            encode_literal(&Value::Varbinary(vec![0x01, 0xAB])),
            "X'01AB'"
        );
        assert_eq!(
            encode_literal(&Value::Uuid(uuid::Uuid::from_u128(1))),
            "'00000000-0000-0000-0000-000000000001'"
        );
    }

    #[test]
    fn encodes_date_and_time_literals() {
        assert_eq!(
            encode_literal(&Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())),
            "DATE '2024-02-29'"
        );
    }

    #[test]
    fn encodes_intervals() {
        assert_eq!(
            encode_literal(&Value::IntervalYearToMonth(IntervalYearToMonth {
                years: -1,
                months: -2
            })),
            "'-1-2'"
        );
        let delta = TimeDelta::days(1)
            + TimeDelta::hours(2)
            + TimeDelta::minutes(3)
            + TimeDelta::seconds(4)
            + TimeDelta::milliseconds(5);
        assert_eq!(encode_literal(&Value::IntervalDayToSecond(delta)), "'1 02:03:04.005'");
        assert_eq!(
            encode_literal(&Value::IntervalDayToSecond(TimeDelta::seconds(-90))),
            "'-0 00:01:30.000'"
        );
    }

    #[test]
    fn encodes_sequences_recursively() {
        let value = Value::Array(vec![
            Value::BigInt(1),
            Value::Array(vec![Value::from("a"), Value::Null]),
        ]);
        assert_eq!(encode_literal(&value), "(1, ('a', NULL))");
    }

    #[test]
    fn encodes_map_as_constructor() {
        let value = Value::Map(vec![(Value::from("k"), Value::BigInt(1))]);
        assert_eq!(encode_literal(&value), "MAP(ARRAY['k'], ARRAY[1])");
    }

    #[test]
    fn fresh_names_are_unique_and_separator_free() {
        let a = fresh_statement_name();
        let b = fresh_statement_name();
        assert_ne!(a, b);
        assert!(a.starts_with("statement"));
        assert!(a["statement".len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
