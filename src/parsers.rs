//! Turning unwrapped payloads into analysis-friendly shapes.
//!
//! [`Parser::Json`] hands the payload back untouched. [`Parser::Scientific`]
//! flattens records into a metadata [`Table`] and splits off each record's
//! event data.

use chrono::DateTime;
use serde::Serialize;
use serde_json::{Map, Value};

/// Record fields that hold the time series / event part of a result.
const DATA_TYPE_FIELDS: [&str; 3] = ["events", "data", "percentiles"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScientificOptions {
    /// Separator between nested keys in flattened column names.
    pub sep: String,
    /// Convert millisecond timestamp columns to RFC 3339 strings.
    pub convert_timestamps: bool,
}

impl Default for ScientificOptions {
    fn default() -> Self {
        Self {
            sep: "__".to_string(),
            convert_timestamps: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parser {
    Json,
    Scientific(ScientificOptions),
}

impl Default for Parser {
    fn default() -> Self {
        Parser::Scientific(ScientificOptions::default())
    }
}

impl Parser {
    pub fn scientific() -> Self {
        Parser::Scientific(ScientificOptions::default())
    }

    pub fn parse(&self, payload: Value) -> Parsed {
        match self {
            Parser::Json => Parsed::Json(payload),
            Parser::Scientific(opts) => Parsed::Scientific(scientific(payload, opts)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Parsed {
    Json(Value),
    Scientific(Scientific),
}

impl Parsed {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Parsed::Json(v) => Some(v),
            Parsed::Scientific(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Parsed::Json(v) => Some(v),
            Parsed::Scientific(_) => None,
        }
    }

    pub fn as_scientific(&self) -> Option<&Scientific> {
        match self {
            Parsed::Scientific(s) => Some(s),
            Parsed::Json(_) => None,
        }
    }
}

/// Metadata table plus one data entry per metadata row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Scientific {
    pub metadata: Table,
    pub data: Vec<EventData>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventData {
    Empty,
    /// A list of event records.
    Table(Table),
    /// A list of value rows, as returned for raster curves and arrays.
    Array(Vec<Value>),
}

/// Column-oriented view of a list of flat records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Columns are the union of record keys in first-seen order; missing
    /// cells are `null`.
    pub fn from_records(records: &[Map<String, Value>]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Rewrites integer millisecond timestamps in `*timestamp`, `start` and
    /// `end` columns as RFC 3339 strings.
    pub fn convert_timestamps(&mut self) {
        let time_columns: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.ends_with("timestamp") || c.as_str() == "start" || c.as_str() == "end")
            .map(|(i, _)| i)
            .collect();

        for row in &mut self.rows {
            for &i in &time_columns {
                if let Some(ms) = row[i].as_i64() {
                    if let Some(dt) = DateTime::from_timestamp_millis(ms) {
                        row[i] = Value::String(dt.to_rfc3339());
                    }
                }
            }
        }
    }
}

/// Flattens nested objects, joining keys with `sep`. Arrays are kept as is.
pub fn flatten_dict(record: &Map<String, Value>, sep: &str) -> Map<String, Value> {
    let mut out = Map::new();
    flatten_into(record, "", sep, &mut out);
    out
}

fn flatten_into(record: &Map<String, Value>, parent: &str, sep: &str, out: &mut Map<String, Value>) {
    for (k, v) in record {
        let key = if parent.is_empty() {
            k.clone()
        } else {
            format!("{}{}{}", parent, sep, k)
        };
        match v {
            Value::Object(inner) => flatten_into(inner, &key, sep, out),
            other => {
                out.insert(key, other.clone());
            }
        }
    }
}

/// Splits a record into flattened metadata and its first non-empty event field.
pub fn flatten_result(mut record: Map<String, Value>, sep: &str) -> (Map<String, Value>, Value) {
    let mut events = Value::Null;
    for field in DATA_TYPE_FIELDS {
        if let Some(v) = record.remove(field) {
            if !is_empty_value(&v) {
                events = v;
                break;
            }
        }
    }
    (flatten_dict(&record, sep), events)
}

/// Collects `key` from every record that has it.
pub fn list_on_key(results: &Value, key: &str) -> Vec<Value> {
    results
        .as_array()
        .map(|items| items.iter().filter_map(|r| r.get(key).cloned()).collect())
        .unwrap_or_default()
}

/// Record identifiers; organisations use `unique_id` instead of `uuid`.
pub fn uuids(results: &Value, endpoint: Option<&str>) -> Vec<Value> {
    let key = if endpoint == Some("organisations") {
        "unique_id"
    } else {
        "uuid"
    };
    list_on_key(results, key)
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn scientific(payload: Value, opts: &ScientificOptions) -> Scientific {
    let records = match payload {
        Value::Array(items) => {
            // A bare list of rows is returned as one array.
            if matches!(items.first(), Some(Value::Array(_))) {
                return Scientific {
                    metadata: Table::default(),
                    data: vec![EventData::Array(items)],
                };
            }
            items
        }
        Value::Object(_) => vec![payload],
        _ => Vec::new(),
    };

    let flattened: Vec<(Map<String, Value>, Value)> = records
        .into_iter()
        .filter_map(|r| match r {
            Value::Object(map) => Some(flatten_result(map, &opts.sep)),
            _ => None,
        })
        .collect();

    let metadata_rows: Vec<Map<String, Value>> =
        flattened.iter().map(|(meta, _)| meta.clone()).collect();
    let mut metadata = Table::from_records(&metadata_rows);
    if opts.convert_timestamps {
        metadata.convert_timestamps();
    }

    let data = flattened
        .into_iter()
        .map(|(_, events)| event_data(events, opts))
        .collect();

    Scientific { metadata, data }
}

fn event_data(events: Value, opts: &ScientificOptions) -> EventData {
    let Value::Array(items) = events else {
        return EventData::Empty;
    };
    if items.is_empty() {
        return EventData::Empty;
    }
    if matches!(items[0], Value::Array(_)) {
        return EventData::Array(items);
    }

    let records: Vec<Map<String, Value>> = items
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(map) => Some(flatten_dict(&map, &opts.sep)),
            _ => None,
        })
        .collect();
    let mut table = Table::from_records(&records);
    if opts.convert_timestamps {
        table.convert_timestamps();
    }
    EventData::Table(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn flatten_joins_nested_keys() {
        let flat = flatten_dict(
            &obj(json!({
                "a": 1,
                "c": {"a": 2, "b": {"x": 5, "y": 10}},
                "d": [1, 2, 3]
            })),
            "__",
        );
        assert_eq!(
            Value::Object(flat),
            json!({"a": 1, "c__a": 2, "c__b__x": 5, "c__b__y": 10, "d": [1, 2, 3]})
        );
    }

    #[test]
    fn flatten_result_takes_first_non_empty_event_field() {
        let (meta, events) = flatten_result(
            obj(json!({"uuid": "u", "events": [], "data": [[1, 2.0]]})),
            "__",
        );
        assert_eq!(events, json!([[1, 2.0]]));
        assert!(!meta.contains_key("events"));
        assert!(!meta.contains_key("data"));
    }

    #[test]
    fn json_parser_is_identity() {
        let payload = json!([{"uuid": 1}]);
        assert_eq!(Parser::Json.parse(payload.clone()), Parsed::Json(payload));
    }

    #[test]
    fn scientific_splits_metadata_and_events() {
        let payload = json!([
            {
                "uuid": "a",
                "location": {"name": "well 1"},
                "last_value_timestamp": 0,
                "events": [{"timestamp": 1000, "value": 1.5}]
            },
            {"uuid": "b", "events": null}
        ]);
        let parsed = Parser::scientific().parse(payload);
        let sci = parsed.as_scientific().unwrap();

        assert_eq!(
            sci.metadata.columns,
            vec!["last_value_timestamp", "location__name", "uuid"]
        );
        assert_eq!(sci.metadata.rows.len(), 2);
        assert_eq!(
            sci.metadata.column("last_value_timestamp").unwrap()[0],
            &json!("1970-01-01T00:00:00+00:00")
        );
        assert_eq!(sci.metadata.column("location__name").unwrap()[1], &Value::Null);

        match &sci.data[0] {
            EventData::Table(t) => {
                assert_eq!(t.column("timestamp").unwrap()[0], &json!("1970-01-01T00:00:01+00:00"));
                assert_eq!(t.column("value").unwrap()[0], &json!(1.5));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(sci.data[1], EventData::Empty);
    }

    #[test]
    fn list_of_lists_is_one_array() {
        let parsed = Parser::scientific().parse(json!([[1, 2], [3, 4]]));
        let sci = parsed.as_scientific().unwrap();
        assert!(sci.metadata.is_empty());
        assert_eq!(sci.data, vec![EventData::Array(vec![json!([1, 2]), json!([3, 4])])]);
    }

    #[test]
    fn detail_record_becomes_single_row() {
        let parsed = Parser::scientific().parse(json!({"uuid": "x", "data": [[0, 1]]}));
        let sci = parsed.as_scientific().unwrap();
        assert_eq!(sci.metadata.rows.len(), 1);
        assert!(matches!(sci.data[0], EventData::Array(_)));
    }

    #[test]
    fn timestamps_can_stay_numeric() {
        let parser = Parser::Scientific(ScientificOptions {
            sep: ".".into(),
            convert_timestamps: false,
        });
        let parsed = parser.parse(json!([{"start": 5, "a": {"b": 1}}]));
        let sci = parsed.as_scientific().unwrap();
        assert_eq!(sci.metadata.columns, vec!["a.b", "start"]);
        assert_eq!(sci.metadata.column("start").unwrap()[0], &json!(5));
    }

    #[test]
    fn uuid_helpers() {
        let results = json!([{"uuid": 1, "unique_id": "o1"}, {"uuid": 2}]);
        assert_eq!(uuids(&results, None), vec![json!(1), json!(2)]);
        assert_eq!(uuids(&results, Some("organisations")), vec![json!("o1")]);
    }
}
