//! Decodes the server's JSON-encoded values into typed host values.
//!
//! Every column carries a raw declared type string such as
//! `array(map(varchar, decimal(24,10)))`. [`parse_type`] resolves that string
//! into a [`TrinoType`]; [`decode_value`] then converts one raw JSON cell.

use base64::Engine as _;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::value::IntervalYearToMonth;
use crate::{Result, TrinoError, Value};

/// Host-resolved logical type.
#[derive(Clone, Debug, PartialEq)]
pub enum TrinoType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal { precision: u32, scale: u32 },
    Varchar,
    Char { length: usize },
    Varbinary,
    Date,
    Time,
    TimeWithTimeZone,
    Timestamp { precision: Option<u32> },
    TimestampWithTimeZone { precision: Option<u32> },
    IntervalYearToMonth,
    IntervalDayToSecond,
    Uuid,
    IpAddress,
    Json,
    Array(Box<TrinoType>),
    Map(Box<TrinoType>, Box<TrinoType>),
    Row(Vec<(Option<String>, TrinoType)>),
    /// Unrecognized declared type; values pass through undecoded.
    Unknown(String),
}

/// Parses a declared type string.
///
/// The grammar is `base ( params )? suffix?`: the parameter block is the
/// substring between the first `(` and the last `)`, and any text after the
/// last `)` belongs to the base (`timestamp(3) with time zone`).
pub fn parse_type(raw: &str) -> Result<TrinoType> {
    let raw = raw.trim();
    let (base, params) = match raw.find('(') {
        None => (raw.to_owned(), None),
        Some(open) => {
            let close = raw.rfind(')').ok_or_else(|| {
                TrinoError::Decode(format!("unbalanced parentheses in type '{raw}'"))
            })?;
            if close < open {
                return Err(TrinoError::Decode(format!(
                    "unbalanced parentheses in type '{raw}'"
                )));
            }
            let mut base = raw[..open].trim().to_owned();
            let suffix = raw[close + 1..].trim();
            if !suffix.is_empty() {
                base.push(' ');
                base.push_str(suffix);
            }
            (base, Some(&raw[open + 1..close]))
        }
    };

    match base.as_str() {
        "boolean" => Ok(TrinoType::Boolean),
        "tinyint" => Ok(TrinoType::TinyInt),
        "smallint" => Ok(TrinoType::SmallInt),
        "integer" | "int" => Ok(TrinoType::Integer),
        "bigint" => Ok(TrinoType::BigInt),
        "real" => Ok(TrinoType::Real),
        "double" => Ok(TrinoType::Double),
        "decimal" => {
            let params = params.ok_or_else(|| {
                TrinoError::Decode("decimal type requires precision".to_owned())
            })?;
            let mut parts = split_top_level(params).into_iter();
            let precision = parse_type_number(raw, parts.next())?;
            let scale = match parts.next() {
                Some(part) => parse_type_number(raw, Some(part))?,
                None => 0,
            };
            Ok(TrinoType::Decimal { precision, scale })
        }
        "varchar" => Ok(TrinoType::Varchar),
        "char" => {
            let length = match params {
                None => 1,
                Some(part) => parse_type_number(raw, Some(part))? as usize,
            };
            Ok(TrinoType::Char { length })
        }
        "varbinary" => Ok(TrinoType::Varbinary),
        "date" => Ok(TrinoType::Date),
        "time" => Ok(TrinoType::Time),
        "time with time zone" => Ok(TrinoType::TimeWithTimeZone),
        "timestamp" => Ok(TrinoType::Timestamp {
            precision: parse_optional_number(raw, params)?,
        }),
        "timestamp with time zone" => Ok(TrinoType::TimestampWithTimeZone {
            precision: parse_optional_number(raw, params)?,
        }),
        "interval year to month" => Ok(TrinoType::IntervalYearToMonth),
        "interval day to second" => Ok(TrinoType::IntervalDayToSecond),
        "uuid" => Ok(TrinoType::Uuid),
        "ipaddress" => Ok(TrinoType::IpAddress),
        "json" => Ok(TrinoType::Json),
        "array" => {
            let params = params
                .ok_or_else(|| TrinoError::Decode("array type requires an element".to_owned()))?;
            Ok(TrinoType::Array(Box::new(parse_type(params)?)))
        }
        "map" => {
            let params = params
                .ok_or_else(|| TrinoError::Decode("map type requires key and value".to_owned()))?;
            let parts = split_top_level(params);
            if parts.len() != 2 {
                return Err(TrinoError::Decode(format!(
                    "map type '{raw}' must have exactly two parameters"
                )));
            }
            Ok(TrinoType::Map(
                Box::new(parse_type(parts[0])?),
                Box::new(parse_type(parts[1])?),
            ))
        }
        "row" => {
            let params = params
                .ok_or_else(|| TrinoError::Decode("row type requires fields".to_owned()))?;
            let fields = split_top_level(params)
                .into_iter()
                .map(parse_row_field)
                .collect::<Result<Vec<_>>>()?;
            Ok(TrinoType::Row(fields))
        }
        _ => Ok(TrinoType::Unknown(raw.to_owned())),
    }
}

/// Splits a parameter block on commas outside nested parentheses.
fn split_top_level(params: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, ch) in params.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(params[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    let tail = params[start..].trim();
    if !tail.is_empty() {
        parts.push(tail);
    }
    parts
}

/// Row fields may carry a leading name: `row(x bigint, timestamp with time zone)`.
fn parse_row_field(field: &str) -> Result<(Option<String>, TrinoType)> {
    if let Ok(parsed) = parse_type(field) {
        if !matches!(parsed, TrinoType::Unknown(_)) {
            return Ok((None, parsed));
        }
    }
    match field.split_once(' ') {
        Some((name, rest)) => {
            let name = name.trim_matches('"').to_owned();
            Ok((Some(name), parse_type(rest)?))
        }
        None => Ok((None, parse_type(field)?)),
    }
}

fn parse_type_number(raw: &str, part: Option<&str>) -> Result<u32> {
    let part = part
        .ok_or_else(|| TrinoError::Decode(format!("missing numeric parameter in type '{raw}'")))?;
    part.trim().parse::<u32>().map_err(|err| {
        TrinoError::Decode(format!("invalid numeric parameter in type '{raw}': {err}"))
    })
}

fn parse_optional_number(raw: &str, params: Option<&str>) -> Result<Option<u32>> {
    match params {
        None => Ok(None),
        Some(part) => Ok(Some(parse_type_number(raw, Some(part))?)),
    }
}

/// Decodes one raw JSON cell according to its declared type.
pub fn decode_value(raw: &serde_json::Value, ty: &TrinoType) -> Result<Value> {
    if raw.is_null() {
        return Ok(Value::Null);
    }
    match ty {
        TrinoType::Boolean => raw
            .as_bool()
            .map(Value::Boolean)
            .ok_or_else(|| mismatch("boolean", raw)),
        TrinoType::TinyInt => Ok(Value::TinyInt(decode_integral(raw, "tinyint")?)),
        TrinoType::SmallInt => Ok(Value::SmallInt(decode_integral(raw, "smallint")?)),
        TrinoType::Integer => Ok(Value::Integer(decode_integral(raw, "integer")?)),
        TrinoType::BigInt => Ok(Value::BigInt(decode_integral(raw, "bigint")?)),
        TrinoType::Real => Ok(Value::Real(decode_float(raw, "real")? as f32)),
        TrinoType::Double => Ok(Value::Double(decode_float(raw, "double")?)),
        TrinoType::Decimal { .. } => {
            let text = raw.as_str().map(str::to_owned).unwrap_or_else(|| raw.to_string());
            Decimal::from_str(&text).map(Value::Decimal).map_err(|err| {
                TrinoError::Decode(format!("decimal '{text}' out of range or malformed: {err}"))
            })
        }
        TrinoType::Varchar => expect_str(raw, "varchar").map(|s| Value::Varchar(s.to_owned())),
        TrinoType::Char { length } => {
            let text = expect_str(raw, "char")?;
            Ok(Value::Char(text.chars().take(*length).collect()))
        }
        TrinoType::Varbinary => {
            let text = expect_str(raw, "varbinary")?;
            base64::engine::general_purpose::STANDARD
                .decode(text)
                .map(Value::Varbinary)
                .map_err(|err| TrinoError::Decode(format!("invalid base64 varbinary: {err}")))
        }
        TrinoType::Date => {
            let text = expect_str(raw, "date")?;
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|err| TrinoError::Decode(format!("invalid date '{text}': {err}")))
        }
        TrinoType::Time => {
            let text = expect_str(raw, "time")?;
            NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
                .map(Value::Time)
                .map_err(|err| TrinoError::Decode(format!("invalid time '{text}': {err}")))
        }
        // No host equivalent is mandated; the textual form passes through.
        TrinoType::TimeWithTimeZone => {
            expect_str(raw, "time with time zone").map(|s| Value::Varchar(s.to_owned()))
        }
        TrinoType::Timestamp { precision } => {
            let text = expect_str(raw, "timestamp")?;
            let (naive, zone) = parse_datetime(text, *precision)?;
            if zone.is_some() {
                return Err(TrinoError::Decode(format!(
                    "unexpected zone in timestamp '{text}'"
                )));
            }
            Ok(Value::Timestamp(naive))
        }
        TrinoType::TimestampWithTimeZone { precision } => {
            let text = expect_str(raw, "timestamp with time zone")?;
            decode_timestamp_tz(text, *precision).map(Value::TimestampWithTimeZone)
        }
        TrinoType::IntervalYearToMonth => {
            let text = expect_str(raw, "interval year to month")?;
            decode_interval_year_month(text).map(Value::IntervalYearToMonth)
        }
        TrinoType::IntervalDayToSecond => {
            let text = expect_str(raw, "interval day to second")?;
            decode_interval_day_second(text).map(Value::IntervalDayToSecond)
        }
        TrinoType::Uuid => {
            let text = expect_str(raw, "uuid")?;
            uuid::Uuid::parse_str(text)
                .map(Value::Uuid)
                .map_err(|err| TrinoError::Decode(format!("invalid uuid '{text}': {err}")))
        }
        TrinoType::IpAddress => {
            expect_str(raw, "ipaddress").map(|s| Value::IpAddress(s.to_owned()))
        }
        TrinoType::Json => Ok(Value::Json(raw.clone())),
        TrinoType::Array(element) => {
            let items = raw.as_array().ok_or_else(|| mismatch("array", raw))?;
            items
                .iter()
                .map(|item| decode_value(item, element))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }
        TrinoType::Map(key_ty, value_ty) => {
            let object = raw.as_object().ok_or_else(|| mismatch("map", raw))?;
            let mut entries = Vec::with_capacity(object.len());
            for (key, value) in object {
                entries.push((decode_map_key(key, key_ty)?, decode_value(value, value_ty)?));
            }
            Ok(Value::Map(entries))
        }
        TrinoType::Row(fields) => decode_row(raw, fields),
        TrinoType::Unknown(_) => match raw.as_str() {
            Some(text) => Ok(Value::Varchar(text.to_owned())),
            None => Ok(Value::Json(raw.clone())),
        },
    }
}

fn mismatch(expected: &str, raw: &serde_json::Value) -> TrinoError {
    TrinoError::Decode(format!("expected {expected}, got {raw}"))
}

fn expect_str<'a>(raw: &'a serde_json::Value, expected: &str) -> Result<&'a str> {
    raw.as_str().ok_or_else(|| mismatch(expected, raw))
}

fn decode_integral<T: TryFrom<i64>>(raw: &serde_json::Value, name: &str) -> Result<T> {
    let wide = raw.as_i64().ok_or_else(|| mismatch(name, raw))?;
    T::try_from(wide)
        .map_err(|_| TrinoError::Decode(format!("{name} value {wide} out of range")))
}

fn decode_float(raw: &serde_json::Value, name: &str) -> Result<f64> {
    if let Some(value) = raw.as_f64() {
        return Ok(value);
    }
    match raw.as_str() {
        Some("NaN") => Ok(f64::NAN),
        Some("Infinity") => Ok(f64::INFINITY),
        Some("-Infinity") => Ok(f64::NEG_INFINITY),
        _ => Err(mismatch(name, raw)),
    }
}

fn datetime_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\d{4})-(\d{2})-(\d{2})[ T](\d{2}):(\d{2}):(\d{2})(?:\.(\d+))?(?: (.+))?$",
        )
        .expect("datetime pattern must compile")
    })
}

/// Parses `YYYY-MM-DD hh:mm:ss[.fff…][ zone]`, rounding the fraction half-up
/// to the declared precision. Returns the zone token untouched.
fn parse_datetime(text: &str, precision: Option<u32>) -> Result<(NaiveDateTime, Option<String>)> {
    let captures = datetime_regex()
        .captures(text)
        .ok_or_else(|| TrinoError::Decode(format!("invalid datetime '{text}'")))?;
    let field = |idx: usize| -> u32 {
        captures
            .get(idx)
            .map(|m| m.as_str().parse().unwrap_or(0))
            .unwrap_or(0)
    };

    let fraction = captures.get(7).map(|m| m.as_str()).unwrap_or("");
    if fraction.len() > 7 {
        return Err(TrinoError::Decode(format!(
            "fractional seconds beyond 7 digits in '{text}'"
        )));
    }
    let (nanos, carry) = round_fraction_nanos(fraction, precision);

    let date = NaiveDate::from_ymd_opt(field(1) as i32, field(2), field(3))
        .ok_or_else(|| TrinoError::Decode(format!("invalid calendar date in '{text}'")))?;
    let naive = date
        .and_hms_nano_opt(field(4), field(5), field(6), nanos)
        .ok_or_else(|| TrinoError::Decode(format!("invalid time of day in '{text}'")))?
        + TimeDelta::seconds(carry);

    Ok((naive, captures.get(8).map(|m| m.as_str().to_owned())))
}

/// Converts a fraction to nanoseconds, rounding half-up at `precision`
/// digits. A fraction that rounds up to a whole second carries into it.
fn round_fraction_nanos(fraction: &str, precision: Option<u32>) -> (u32, i64) {
    let mut nanos: u64 = 0;
    for (idx, digit) in fraction.bytes().take(9).enumerate() {
        nanos += u64::from(digit - b'0') * 10u64.pow(8 - idx as u32);
    }
    if let Some(p) = precision {
        if p < 9 {
            let unit = 10u64.pow(9 - p);
            nanos = (nanos + unit / 2) / unit * unit;
        }
    }
    if nanos >= 1_000_000_000 {
        (0, 1)
    } else {
        (nanos as u32, 0)
    }
}

/// Parses an instant with offset. Offsets are `±HH:MM` or the literal `UTC`.
fn decode_timestamp_tz(text: &str, precision: Option<u32>) -> Result<DateTime<FixedOffset>> {
    let (naive, zone) = parse_datetime(text, precision)?;
    let zone = zone
        .ok_or_else(|| TrinoError::Decode(format!("missing zone in '{text}'")))?;
    let offset = parse_zone_offset(&zone)
        .ok_or_else(|| TrinoError::Decode(format!("unsupported zone '{zone}' in '{text}'")))?;
    match naive.and_local_timezone(offset) {
        chrono::LocalResult::Single(instant) => Ok(instant),
        _ => Err(TrinoError::Decode(format!("unrepresentable instant '{text}'"))),
    }
}

fn parse_zone_offset(zone: &str) -> Option<FixedOffset> {
    if zone == "UTC" {
        return FixedOffset::east_opt(0);
    }
    let sign = match zone.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let (hours, minutes) = zone[1..].split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn decode_interval_year_month(text: &str) -> Result<IntervalYearToMonth> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^(-)?(\d+)-(\d+)$").expect("interval pattern must compile")
    });
    let captures = re
        .captures(text)
        .ok_or_else(|| TrinoError::Decode(format!("invalid year-month interval '{text}'")))?;
    let sign: i32 = if captures.get(1).is_some() { -1 } else { 1 };
    let years: i32 = captures[2]
        .parse()
        .map_err(|err| TrinoError::Decode(format!("invalid interval '{text}': {err}")))?;
    let months: i32 = captures[3]
        .parse()
        .map_err(|err| TrinoError::Decode(format!("invalid interval '{text}': {err}")))?;
    Ok(IntervalYearToMonth {
        years: sign * years,
        months: sign * months,
    })
}

fn decode_interval_day_second(text: &str) -> Result<TimeDelta> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^(-)?(\d+) (\d{2}):(\d{2}):(\d{2})(?:\.(\d+))?$")
            .expect("interval pattern must compile")
    });
    let captures = re
        .captures(text)
        .ok_or_else(|| TrinoError::Decode(format!("invalid day-second interval '{text}'")))?;
    let number = |idx: usize| -> i64 {
        captures
            .get(idx)
            .map(|m| m.as_str().parse().unwrap_or(0))
            .unwrap_or(0)
    };
    let fraction = captures.get(6).map(|m| m.as_str()).unwrap_or("");
    let mut nanos: i64 = 0;
    for (idx, digit) in fraction.bytes().take(9).enumerate() {
        nanos += i64::from(digit - b'0') * 10i64.pow(8 - idx as u32);
    }

    let magnitude = TimeDelta::days(number(2))
        + TimeDelta::hours(number(3))
        + TimeDelta::minutes(number(4))
        + TimeDelta::seconds(number(5))
        + TimeDelta::nanoseconds(nanos);
    Ok(if captures.get(1).is_some() {
        -magnitude
    } else {
        magnitude
    })
}

/// Map keys arrive as JSON object property names; numeric and boolean key
/// types are re-parsed from the textual form before decoding.
fn decode_map_key(key: &str, ty: &TrinoType) -> Result<Value> {
    let as_json = match ty {
        TrinoType::Boolean => serde_json::Value::Bool(key.parse().map_err(|_| {
            TrinoError::Decode(format!("invalid boolean map key '{key}'"))
        })?),
        TrinoType::TinyInt
        | TrinoType::SmallInt
        | TrinoType::Integer
        | TrinoType::BigInt => serde_json::Value::Number(
            key.parse::<i64>()
                .map_err(|err| TrinoError::Decode(format!("invalid map key '{key}': {err}")))?
                .into(),
        ),
        TrinoType::Real | TrinoType::Double => {
            let number = key
                .parse::<f64>()
                .map_err(|err| TrinoError::Decode(format!("invalid map key '{key}': {err}")))?;
            serde_json::Number::from_f64(number)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(key.to_owned()))
        }
        _ => serde_json::Value::String(key.to_owned()),
    };
    decode_value(&as_json, ty)
}

fn decode_row(raw: &serde_json::Value, fields: &[(Option<String>, TrinoType)]) -> Result<Value> {
    match raw {
        serde_json::Value::Array(items) => {
            if items.len() != fields.len() {
                return Err(TrinoError::Decode(format!(
                    "row arity mismatch: {} fields declared, {} values",
                    fields.len(),
                    items.len()
                )));
            }
            items
                .iter()
                .zip(fields)
                .map(|(item, (_, ty))| decode_value(item, ty))
                .collect::<Result<Vec<_>>>()
                .map(Value::Row)
        }
        serde_json::Value::Object(entries) => fields
            .iter()
            .map(|(name, ty)| {
                let name = name.as_deref().ok_or_else(|| {
                    TrinoError::Decode("row value keyed by name but field is unnamed".to_owned())
                })?;
                let item = entries.get(name).unwrap_or(&serde_json::Value::Null);
                decode_value(item, ty)
            })
            .collect::<Result<Vec<_>>>()
            .map(Value::Row),
        _ => Err(mismatch("row", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_value, parse_type, TrinoType};
    use crate::value::IntervalYearToMonth;
    use crate::Value;
    use chrono::{FixedOffset, NaiveDate, TimeDelta, TimeZone, Timelike};
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;

    fn decode(raw: serde_json::Value, ty: &str) -> Value {
        decode_value(&raw, &parse_type(ty).expect("type must parse")).expect("must decode")
    }

    #[test]
    fn parses_nested_types() {
        let ty = parse_type("array(map(varchar, decimal(24,10)))").expect("must parse");
        assert_eq!(
            ty,
            TrinoType::Array(Box::new(TrinoType::Map(
                Box::new(TrinoType::Varchar),
                Box::new(TrinoType::Decimal {
                    precision: 24,
                    scale: 10
                }),
            )))
        );
    }

    #[test]
    fn parses_precision_suffix_types() {
        assert_eq!(
            parse_type("timestamp(3) with time zone").expect("must parse"),
            TrinoType::TimestampWithTimeZone { precision: Some(3) }
        );
        assert_eq!(
            parse_type("time with time zone").expect("must parse"),
            TrinoType::TimeWithTimeZone
        );
    }

    #[test]
    fn parses_row_with_named_fields() {
        let ty = parse_type("row(x bigint, ts timestamp with time zone, varchar)")
            .expect("must parse");
        let TrinoType::Row(fields) = ty else {
            panic!("expected row type");
        };
        assert_eq!(fields[0].0.as_deref(), Some("x"));
        assert_eq!(fields[0].1, TrinoType::BigInt);
        assert_eq!(
            fields[1].1,
            TrinoType::TimestampWithTimeZone { precision: None }
        );
        assert_eq!(fields[2].0, None);
        assert_eq!(fields[2].1, TrinoType::Varchar);
    }

    #[test]
    fn unknown_type_passes_strings_through() {
        assert_eq!(
            decode(json!("a/b"), "Geometry"),
            Value::Varchar("a/b".to_owned())
        );
    }

    #[test]
    fn decodes_integral_family_with_range_checks() {
        assert_eq!(decode(json!(1), "bigint"), Value::BigInt(1));
        assert_eq!(decode(json!(-7), "tinyint"), Value::TinyInt(-7));
        let err = decode_value(&json!(400), &parse_type("tinyint").unwrap());
        assert!(err.is_err());
    }

    #[test]
    fn decodes_real_max_float() {
        assert_eq!(
            decode(json!(3.402823466e38), "real"),
            Value::Real(f32::MAX)
        );
    }

    #[test]
    fn decodes_double_special_tokens() {
        assert!(matches!(decode(json!("NaN"), "double"), Value::Double(v) if v.is_nan()));
        assert_eq!(
            decode(json!("-Infinity"), "double"),
            Value::Double(f64::NEG_INFINITY)
        );
    }

    #[test]
    fn decodes_decimal_preserving_sign() {
        assert_eq!(
            decode(json!("-0.5"), "decimal(3,1)"),
            Value::Decimal(Decimal::from_str("-0.5").unwrap())
        );
        assert_eq!(
            decode(json!("123456789000.1234005"), "decimal(24,10)"),
            Value::Decimal(Decimal::from_str("123456789000.1234005").unwrap())
        );
    }

    #[test]
    fn decimal_overflow_is_a_decode_error() {
        let huge = "9".repeat(40);
        let err = decode_value(&json!(huge), &parse_type("decimal(38,0)").unwrap());
        assert!(err.is_err());
    }

    #[test]
    fn char_truncates_to_declared_length() {
        assert_eq!(
            decode(json!("0123456789abc"), "char(10)"),
            Value::Char("0123456789".to_owned())
        );
    }

    #[test]
    fn decodes_varbinary_from_base64() {
        assert_eq!(
            decode(json!("AQID"), "varbinary"),
            Value::Varbinary(vec![1, 2, 3])
        );
    }

    #[test]
    fn decodes_date_and_time() {
        assert_eq!(
            decode(json!("2024-01-31"), "date"),
            Value::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap())
        );
        let Value::Time(t) = decode(json!("01:02:03.004"), "time(3)") else {
            panic!("expected time");
        };
        assert_eq!(t.nanosecond(), 4_000_000);
    }

    #[test]
    fn timestamp_tz_rounds_to_declared_precision() {
        let Value::TimestampWithTimeZone(ts) =
            decode(json!("2023-04-04 01:02:03.004567 UTC"), "timestamp(3) with time zone")
        else {
            panic!("expected timestamp with time zone");
        };
        let expected = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2023, 4, 4, 1, 2, 3)
            .unwrap()
            + TimeDelta::milliseconds(5);
        assert_eq!(ts, expected);
    }

    #[test]
    fn timestamp_tz_parses_numeric_offset() {
        let Value::TimestampWithTimeZone(ts) =
            decode(json!("2024-01-01 00:00:00.000 +05:30"), "timestamp with time zone")
        else {
            panic!("expected timestamp with time zone");
        };
        assert_eq!(ts.offset().local_minus_utc(), 5 * 3600 + 30 * 60);
    }

    #[test]
    fn timestamp_tz_rejects_more_than_seven_fraction_digits() {
        let err = decode_value(
            &json!("2024-01-01 00:00:00.12345678 UTC"),
            &parse_type("timestamp with time zone").unwrap(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn fraction_rounding_can_carry_into_seconds() {
        let Value::Timestamp(ts) = decode(json!("2024-01-01 00:00:59.9999"), "timestamp(3)")
        else {
            panic!("expected timestamp");
        };
        assert_eq!(ts.to_string(), "2024-01-01 00:01:00");
    }

    #[test]
    fn decodes_intervals() {
        assert_eq!(
            decode(json!("-3-6"), "interval year to month"),
            Value::IntervalYearToMonth(IntervalYearToMonth {
                years: -3,
                months: -6
            })
        );
        assert_eq!(
            decode(json!("1 02:03:04.005"), "interval day to second"),
            Value::IntervalDayToSecond(
                TimeDelta::days(1)
                    + TimeDelta::hours(2)
                    + TimeDelta::minutes(3)
                    + TimeDelta::seconds(4)
                    + TimeDelta::milliseconds(5)
            )
        );
        assert_eq!(
            decode(json!("-0 00:00:01"), "interval day to second"),
            Value::IntervalDayToSecond(TimeDelta::seconds(-1))
        );
    }

    #[test]
    fn decodes_map_with_integer_keys() {
        assert_eq!(
            decode(json!({"2": "b", "1": "a"}), "map(integer, varchar)"),
            Value::Map(vec![
                (Value::Integer(1), Value::Varchar("a".to_owned())),
                (Value::Integer(2), Value::Varchar("b".to_owned())),
            ])
        );
    }

    #[test]
    fn decodes_nested_array_of_maps() {
        let value = decode(
            json!([{"k": "1.5"}, {}]),
            "array(map(varchar, decimal(4,2)))",
        );
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Map(vec![(
                    Value::Varchar("k".to_owned()),
                    Value::Decimal(Decimal::from_str("1.5").unwrap())
                )]),
                Value::Map(vec![]),
            ])
        );
    }

    #[test]
    fn decodes_row_values() {
        assert_eq!(
            decode(json!([1, "x"]), "row(a bigint, b varchar)"),
            Value::Row(vec![Value::BigInt(1), Value::Varchar("x".to_owned())])
        );
        assert_eq!(
            decode(json!({"a": 1, "b": "x"}), "row(a bigint, b varchar)"),
            Value::Row(vec![Value::BigInt(1), Value::Varchar("x".to_owned())])
        );
    }

    #[test]
    fn null_decodes_to_null_for_any_type() {
        assert_eq!(decode(json!(null), "bigint"), Value::Null);
        assert_eq!(decode(json!(null), "array(varchar)"), Value::Null);
    }

    #[test]
    fn decodes_uuid_and_ipaddress() {
        assert_eq!(
            decode(json!("00000000-0000-0000-0000-000000000001"), "uuid"),
            Value::Uuid(uuid::Uuid::from_u128(1))
        );
        assert_eq!(
            decode(json!("10.0.0.1"), "ipaddress"),
            Value::IpAddress("10.0.0.1".to_owned())
        );
    }
}
