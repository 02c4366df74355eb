//! Query parameter accumulation.
//!
//! A [`QueryParams`] collects parameters from query strings, JSON objects and
//! explicit key/value pairs. Later writes to the same key win.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::{Error, Result};

/// A single query parameter value, already rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryValue(String);

impl QueryValue {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryValue {
    fn from(v: &str) -> Self {
        QueryValue(v.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(v: String) -> Self {
        QueryValue(v)
    }
}

impl From<&String> for QueryValue {
    fn from(v: &String) -> Self {
        QueryValue(v.clone())
    }
}

impl From<bool> for QueryValue {
    fn from(v: bool) -> Self {
        QueryValue(if v { "true" } else { "false" }.to_string())
    }
}

macro_rules! query_value_from_display {
    ($($t:ty),*) => {
        $(
            impl From<$t> for QueryValue {
                fn from(v: $t) -> Self {
                    QueryValue(v.to_string())
                }
            }
        )*
    };
}

query_value_from_display!(i32, i64, u32, u64, usize, f32, f64);

impl<T: Into<QueryValue>> From<Vec<T>> for QueryValue {
    fn from(v: Vec<T>) -> Self {
        QueryValue(commaify(v))
    }
}

impl<T: Into<QueryValue> + Clone> From<&[T]> for QueryValue {
    fn from(v: &[T]) -> Self {
        QueryValue(commaify(v.iter().cloned()))
    }
}

/// Joins values with commas, the list syntax Lizard filters accept.
pub fn commaify<I, T>(values: I) -> String
where
    I: IntoIterator<Item = T>,
    T: Into<QueryValue>,
{
    values
        .into_iter()
        .map(|v| v.into().0)
        .collect::<Vec<_>>()
        .join(",")
}

/// One input to [`QueryParams::update`].
#[derive(Debug, Clone)]
pub enum QuerySource {
    /// A URL query string, with or without the leading `?`.
    Text(String),
    /// An already built parameter set.
    Params(QueryParams),
    /// A JSON value. Only objects are accepted; strings are parsed as query strings.
    Json(Value),
}

impl From<&str> for QuerySource {
    fn from(v: &str) -> Self {
        QuerySource::Text(v.to_string())
    }
}

impl From<String> for QuerySource {
    fn from(v: String) -> Self {
        QuerySource::Text(v)
    }
}

impl From<QueryParams> for QuerySource {
    fn from(v: QueryParams) -> Self {
        QuerySource::Params(v)
    }
}

impl From<&QueryParams> for QuerySource {
    fn from(v: &QueryParams) -> Self {
        QuerySource::Params(v.clone())
    }
}

impl From<Value> for QuerySource {
    fn from(v: Value) -> Self {
        QuerySource::Json(v)
    }
}

/// Canonical parameter set for one logical request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    params: BTreeMap<String, QueryValue>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a URL query string (leading `?` is ignored).
    pub fn parse(query: &str) -> Self {
        let mut q = Self::new();
        q.merge_query_string(query);
        q
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> &mut Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(QueryValue::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<QueryValue> {
        self.params.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merges one source key by key, overwriting existing keys.
    ///
    /// Fails with [`Error::ImproperQuery`] for JSON values that are neither
    /// an object nor a string.
    pub fn update(&mut self, source: impl Into<QuerySource>) -> Result<&mut Self> {
        match source.into() {
            QuerySource::Text(text) => self.merge_query_string(&text),
            QuerySource::Params(other) => self.params.extend(other.params),
            QuerySource::Json(Value::String(text)) => self.merge_query_string(&text),
            QuerySource::Json(Value::Object(map)) => {
                for (k, v) in map {
                    let value = json_query_value(&k, v)?;
                    self.params.insert(k, value);
                }
            }
            QuerySource::Json(other) => {
                return Err(Error::ImproperQuery(format!(
                    "query {} is not a dictionary or a string",
                    other
                )));
            }
        }
        Ok(self)
    }

    /// Merges every source in order, then the named parameters last.
    pub fn update_all<I, S, K, V>(&mut self, sources: I, named: &[(K, V)]) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<QuerySource>,
        K: AsRef<str>,
        V: Into<QueryValue> + Clone,
    {
        for source in sources {
            self.update(source)?;
        }
        for (k, v) in named {
            self.set(k.as_ref(), v.clone());
        }
        Ok(self)
    }

    /// URL-encoded representation without the leading `?`.
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.iter())
            .finish()
    }

    fn merge_query_string(&mut self, text: &str) {
        let text = text.trim().trim_start_matches('?');
        for (k, v) in url::form_urlencoded::parse(text.as_bytes()) {
            self.params.insert(k.into_owned(), QueryValue(v.into_owned()));
        }
    }
}

impl fmt::Display for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

impl<K: Into<String>, V: Into<QueryValue>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut q = QueryParams::new();
        for (k, v) in iter {
            q.set(k, v);
        }
        q
    }
}

fn json_query_value(key: &str, v: Value) -> Result<QueryValue> {
    Ok(match v {
        Value::String(s) => QueryValue(s),
        Value::Bool(b) => b.into(),
        Value::Number(n) => QueryValue(n.to_string()),
        Value::Array(items) => {
            let parts = items
                .into_iter()
                .map(|item| json_query_value(key, item).map(|v| v.0))
                .collect::<Result<Vec<_>>>()?;
            QueryValue(parts.join(","))
        }
        Value::Null | Value::Object(_) => {
            return Err(Error::ImproperQuery(format!(
                "value {} for query key {} is not a scalar or a list",
                v, key
            )));
        }
    })
}
