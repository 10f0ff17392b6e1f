//! Wire types for the paged statement protocol.

use serde::{Deserialize, Serialize};

/// One page of the continuation chain.
///
/// `next_uri` absent means this is the terminal page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResults {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<Column>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Vec<serde_json::Value>>>,
    pub stats: StatementStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<QueryError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_count: Option<u64>,
}

impl QueryResults {
    /// Number of rows carried by this page.
    pub fn row_count(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }
}

/// Result-set column: name plus the raw declared type string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_signature: Option<serde_json::Value>,
}

/// Statement progress counters, updated on every page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatementStats {
    pub state: String,
    pub queued: bool,
    pub scheduled: bool,
    pub nodes: u64,
    pub total_splits: u64,
    pub queued_splits: u64,
    pub running_splits: u64,
    pub completed_splits: u64,
    pub cpu_time_millis: u64,
    pub wall_time_millis: u64,
    pub queued_time_millis: u64,
    pub elapsed_time_millis: u64,
    pub processed_rows: u64,
    pub processed_bytes: u64,
    pub peak_memory_bytes: u64,
    pub spilled_bytes: u64,
    /// NaN until the engine starts reporting progress; the wire encodes the
    /// NaN case as the JSON string `"NaN"`.
    #[serde(default = "nan", with = "nan_fraction")]
    pub progress_percentage: f64,
}

impl Default for StatementStats {
    fn default() -> Self {
        Self {
            state: String::new(),
            queued: false,
            scheduled: false,
            nodes: 0,
            total_splits: 0,
            queued_splits: 0,
            running_splits: 0,
            completed_splits: 0,
            cpu_time_millis: 0,
            wall_time_millis: 0,
            queued_time_millis: 0,
            elapsed_time_millis: 0,
            processed_rows: 0,
            processed_bytes: 0,
            peak_memory_bytes: 0,
            spilled_bytes: 0,
            progress_percentage: f64::NAN,
        }
    }
}

fn nan() -> f64 {
    f64::NAN
}

mod nan_fraction {
    use serde::de::{self, Unexpected};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        struct Visitor;

        impl de::Visitor<'_> for Visitor {
            type Value = f64;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a number or the string \"NaN\"")
            }

            fn visit_f64<E: de::Error>(self, value: f64) -> Result<f64, E> {
                Ok(value)
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<f64, E> {
                Ok(value as f64)
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<f64, E> {
                Ok(value as f64)
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<f64, E> {
                match value {
                    "NaN" => Ok(f64::NAN),
                    "Infinity" => Ok(f64::INFINITY),
                    "-Infinity" => Ok(f64::NEG_INFINITY),
                    other => Err(E::invalid_value(Unexpected::Str(other), &self)),
                }
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

/// Server-side error payload carried on a failing page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_state: Option<String>,
    #[serde(default)]
    pub error_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_location: Option<ErrorLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_info: Option<FailureInfo>,
}

/// Line/column position inside the statement text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLocation {
    pub line_number: i32,
    pub column_number: i32,
}

/// Remote failure tree: causes and suppressed failures reference the same
/// shape, so the structure serializes as a tagged tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureInfo {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<FailureInfo>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suppressed: Vec<FailureInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_location: Option<ErrorLocation>,
}

/// Response of `GET /v1/info`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub node_version: NodeVersion,
    pub environment: String,
    pub coordinator: bool,
    #[serde(default)]
    pub starting: bool,
    #[serde(default)]
    pub uptime: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct NodeVersion {
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::{QueryResults, StatementStats};
    use serde_json::json;

    #[test]
    fn page_with_absent_next_uri_is_terminal() {
        let page: QueryResults = serde_json::from_value(json!({
            "id": "20240101_000000_00000_aaaaa",
            "stats": { "state": "FINISHED" }
        }))
        .expect("must parse");
        assert!(page.next_uri.is_none());
        assert!(page.columns.is_none());
        assert_eq!(page.row_count(), 0);
        assert!(page.stats.progress_percentage.is_nan());
    }

    #[test]
    fn progress_percentage_nan_round_trips_as_string() {
        let stats: StatementStats =
            serde_json::from_value(json!({ "state": "QUEUED", "progressPercentage": "NaN" }))
                .expect("must parse");
        assert!(stats.progress_percentage.is_nan());

        let back = serde_json::to_value(&stats).expect("must serialize");
        assert_eq!(back["progressPercentage"], json!("NaN"));
    }

    #[test]
    fn progress_percentage_accepts_numbers() {
        let stats: StatementStats =
            serde_json::from_value(json!({ "state": "RUNNING", "progressPercentage": 42.5 }))
                .expect("must parse");
        assert_eq!(stats.progress_percentage, 42.5);

        let back = serde_json::to_value(&stats).expect("must serialize");
        assert_eq!(back["progressPercentage"], json!(42.5));
    }

    #[test]
    fn failure_info_parses_nested_causes() {
        let page: QueryResults = serde_json::from_value(json!({
            "id": "q",
            "stats": { "state": "FAILED" },
            "error": {
                "message": "division by zero",
                "errorCode": 65540,
                "errorName": "DIVISION_BY_ZERO",
                "errorType": "USER_ERROR",
                "errorLocation": { "lineNumber": 1, "columnNumber": 8 },
                "failureInfo": {
                    "type": "io.trino.spi.TrinoException",
                    "message": "division by zero",
                    "cause": { "type": "java.lang.ArithmeticException", "message": "/ by zero" },
                    "suppressed": [ { "message": "cleanup failed" } ],
                    "stack": [ "at io.trino..." ]
                }
            }
        }))
        .expect("must parse");

        let error = page.error.expect("must carry error");
        assert_eq!(error.error_code, 65540);
        let failure = error.failure_info.expect("must carry failure info");
        assert_eq!(
            failure.cause.as_ref().and_then(|c| c.message.as_deref()),
            Some("/ by zero")
        );
        assert_eq!(failure.suppressed.len(), 1);
        let location = error.error_location.expect("must carry location");
        assert_eq!((location.line_number, location.column_number), (1, 8));
    }
}
