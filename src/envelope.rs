use serde_json::Value;

use crate::error::{Error, Result};

/// The `results` / `count` / `next` facets of one decoded response.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// `results` when present, otherwise the whole body.
    pub payload: Value,
    /// Total number of results across all pages, when the server reports it.
    pub count: Option<u64>,
    /// URL of the following page. `None` once exhausted.
    pub next: Option<String>,
}

impl Envelope {
    pub fn unwrap(mut response: Value) -> Self {
        let Some(obj) = response.as_object_mut() else {
            return Self {
                payload: response,
                count: None,
                next: None,
            };
        };

        let count = obj.get("count").and_then(Value::as_u64);
        let next = obj
            .get("next")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let payload = match obj.remove("results") {
            Some(results) => results,
            None => response,
        };

        Self {
            payload,
            count,
            next,
        }
    }

    /// Fails when the reported count exceeds `max`. A missing count counts as 0.
    pub fn check_max_results(&self, max: Option<u64>) -> Result<()> {
        match max {
            Some(max) if self.count.unwrap_or(0) > max => Err(Error::TooManyResults {
                count: self.count.unwrap_or(0),
                max,
            }),
            _ => Ok(()),
        }
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_paged_response() {
        let env = Envelope::unwrap(json!({
            "count": 10,
            "next": "https://demo.lizard.net/api/v3/timeseries/?page=2",
            "results": [{"uuid": 1}]
        }));
        assert_eq!(env.payload, json!([{"uuid": 1}]));
        assert_eq!(env.count, Some(10));
        assert!(env.has_next());
    }

    #[test]
    fn body_without_results_is_the_payload() {
        let body = json!({"uuid": "abc", "name": "x"});
        let env = Envelope::unwrap(body.clone());
        assert_eq!(env.payload, body);
        assert_eq!(env.count, None);
        assert_eq!(env.next, None);
    }

    #[test]
    fn null_or_empty_next_means_exhausted() {
        let env = Envelope::unwrap(json!({"next": null, "results": []}));
        assert!(!env.has_next());
        let env = Envelope::unwrap(json!({"next": "", "results": []}));
        assert!(!env.has_next());
    }

    #[test]
    fn non_object_bodies_pass_through() {
        let env = Envelope::unwrap(json!([[1, 2], [3, 4]]));
        assert_eq!(env.payload, json!([[1, 2], [3, 4]]));
    }

    #[test]
    fn max_results_policy() {
        let env = Envelope::unwrap(json!({"count": 1500, "results": []}));
        assert!(env.check_max_results(None).is_ok());
        assert!(env.check_max_results(Some(1500)).is_ok());
        match env.check_max_results(Some(1000)) {
            Err(Error::TooManyResults { count, max }) => {
                assert_eq!((count, max), (1500, 1000));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let uncounted = Envelope::unwrap(json!({"results": []}));
        assert!(uncounted.check_max_results(Some(0)).is_ok());
    }
}
