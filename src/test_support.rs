use reqwest::StatusCode;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::error::{TransportError, status_error};
use crate::transport::Transport;

/// Replays queued JSON replies per URL and records every request.
/// URLs without a queued reply answer HTTP 404.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Value>>>,
    recorded: Mutex<Vec<(String, Option<Value>)>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(&self, url: &str, body: Value) {
        self.replies
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(body);
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.recorded
            .lock()
            .unwrap()
            .iter()
            .map(|(u, _)| u.clone())
            .collect()
    }

    pub(crate) fn bodies(&self) -> Vec<Option<Value>> {
        self.recorded
            .lock()
            .unwrap()
            .iter()
            .map(|(_, b)| b.clone())
            .collect()
    }

    pub(crate) fn requests_to(&self, url: &str) -> usize {
        self.urls().iter().filter(|u| u.as_str() == url).count()
    }
}

impl Transport for ScriptedTransport {
    fn perform_request(&self, url: &str, data: Option<&Value>) -> Result<Value, TransportError> {
        self.recorded
            .lock()
            .unwrap()
            .push((url.to_string(), data.cloned()));
        self.replies
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| status_error(StatusCode::NOT_FOUND, url, r#"{"detail": "Not found."}"#))
    }
}
