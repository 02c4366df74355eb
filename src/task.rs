//! Server-side asynchronous tasks.
//!
//! A query submitted with `async=true` answers with a task handle instead of
//! results. The handle is polled until the task succeeds (its `result_url`
//! is then fetched) or ends in any other state.
//!
//! By default there is no limit on the number of polls: a task that stays
//! `PENDING` is polled forever, with a growing interval. Set
//! [`PollConfig::max_polls`] to bound it.

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::fmt;
use std::thread;
use std::time::Duration;

use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::util::backoff;

pub const ASYNC_POLL_TIME: Duration = Duration::from_secs(1);
pub const ASYNC_POLL_TIME_INCREASE: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Sleep before the second poll.
    pub initial_interval: Duration,
    /// Factor applied to the interval after every pending poll. Values
    /// below 1 are treated as 1.
    pub growth: f64,
    /// Upper bound for a single sleep.
    pub max_interval: Option<Duration>,
    /// Give up with [`Error::AsyncTaskTimeout`] after this many polls.
    pub max_polls: Option<usize>,
    /// Show a spinner with the task status while polling.
    pub progress: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: ASYNC_POLL_TIME,
            growth: ASYNC_POLL_TIME_INCREASE,
            max_interval: None,
            max_polls: None,
            progress: false,
        }
    }
}

/// Sleep schedule between polls. The interval carries over from one poll
/// to the next, so it keeps growing for the lifetime of the task.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    growth: f64,
    max: Option<Duration>,
}

impl Backoff {
    pub fn new(config: &PollConfig) -> Self {
        Self {
            current: config.initial_interval,
            growth: config.growth,
            max: config.max_interval,
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let sleep = self.current;
        self.current = backoff(self.current, self.growth, self.max);
        Some(sleep)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Success,
    /// Any other status is terminal.
    Failure(String),
}

impl TaskStatus {
    pub fn from_status(status: &str) -> Self {
        match status {
            "PENDING" => TaskStatus::Pending,
            "SUCCESS" => TaskStatus::Success,
            other => TaskStatus::Failure(other.to_string()),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => f.write_str("PENDING"),
            TaskStatus::Success => f.write_str("SUCCESS"),
            TaskStatus::Failure(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct TaskSubmission {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct TaskPoll {
    #[serde(default)]
    task_status: Option<String>,
    #[serde(default)]
    result_url: Option<String>,
}

/// Drives one async task from submission to its result payload.
pub struct AsyncTask<'a> {
    transport: &'a dyn Transport,
    config: &'a PollConfig,
    sleep: fn(Duration),
}

impl<'a> AsyncTask<'a> {
    pub fn new(transport: &'a dyn Transport, config: &'a PollConfig) -> Self {
        Self {
            transport,
            config,
            sleep: thread::sleep,
        }
    }

    #[cfg(test)]
    fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    /// Submits `submit_url` (which must carry `async=true`) and returns the
    /// task handle URL.
    pub fn submit(&self, submit_url: &str) -> Result<String> {
        let reply = self.transport.perform_request(submit_url, None)?;
        let reply = Envelope::unwrap(reply).payload;
        let submission: TaskSubmission = serde_json::from_value(reply).map_err(|e| {
            Error::MalformedResponse(format!("async submission to {}: {}", submit_url, e))
        })?;
        submission.url.ok_or_else(|| {
            Error::MalformedResponse(format!(
                "async submission to {} returned no task url",
                submit_url
            ))
        })
    }

    /// Polls `task_url` until a terminal status and returns the unwrapped
    /// result payload.
    pub fn wait(&self, task_url: &str) -> Result<Value> {
        let pb = self.spinner();
        let mut sleeps = Backoff::new(self.config);
        let mut last_status: Option<TaskStatus> = None;
        let mut polls = 0usize;

        let result = loop {
            let poll = self.poll(task_url)?;
            polls += 1;

            let status = TaskStatus::from_status(poll.task_status.as_deref().unwrap_or(""));
            if last_status.as_ref() != Some(&status) {
                tracing::info!(task_url, %status, "Task status");
                if let Some(pb) = &pb {
                    pb.set_message(format!("task {}", status));
                }
                last_status = Some(status.clone());
            }

            match status {
                TaskStatus::Pending => {
                    if self.config.max_polls.is_some_and(|max| polls >= max) {
                        break Err(Error::AsyncTaskTimeout {
                            polls,
                            task_url: task_url.to_string(),
                        });
                    }
                    if let Some(interval) = sleeps.next() {
                        (self.sleep)(interval);
                    }
                }
                TaskStatus::Success => {
                    let result_url = poll.result_url.ok_or_else(|| {
                        Error::MalformedResponse(format!(
                            "task {} succeeded without a result_url",
                            task_url
                        ))
                    });
                    break result_url.and_then(|url| self.fetch_result(&url));
                }
                TaskStatus::Failure(status) => {
                    break Err(Error::AsyncTaskFailure {
                        status,
                        task_url: task_url.to_string(),
                    });
                }
            }
        };

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        result
    }

    /// [`submit`](Self::submit) followed by [`wait`](Self::wait).
    pub fn run(&self, submit_url: &str) -> Result<Value> {
        let task_url = self.submit(submit_url)?;
        self.wait(&task_url)
    }

    fn poll(&self, task_url: &str) -> Result<TaskPoll> {
        let reply = self.transport.perform_request(task_url, None)?;
        let reply = Envelope::unwrap(reply).payload;
        serde_json::from_value(reply)
            .map_err(|e| Error::MalformedResponse(format!("task poll {}: {}", task_url, e)))
    }

    fn fetch_result(&self, result_url: &str) -> Result<Value> {
        let reply = self.transport.perform_request(result_url, None)?;
        Ok(Envelope::unwrap(reply).payload)
    }

    fn spinner(&self) -> Option<ProgressBar> {
        if !self.config.progress {
            return None;
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg} ({elapsed})") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTransport;
    use serde_json::json;
    use std::cell::RefCell;

    thread_local! {
        static SLEPT: RefCell<Vec<Duration>> = const { RefCell::new(Vec::new()) };
    }

    fn record_sleep(d: Duration) {
        SLEPT.with(|s| s.borrow_mut().push(d));
    }

    fn fast() -> PollConfig {
        PollConfig {
            initial_interval: Duration::from_millis(1),
            ..PollConfig::default()
        }
    }

    #[test]
    fn backoff_compounds_across_polls() {
        let sleeps: Vec<Duration> = Backoff::new(&PollConfig::default()).take(4).collect();
        assert_eq!(
            sleeps,
            vec![
                Duration::from_secs_f64(1.0),
                Duration::from_secs_f64(1.5),
                Duration::from_secs_f64(2.25),
                Duration::from_secs_f64(3.375),
            ]
        );
    }

    #[test]
    fn backoff_respects_max_interval() {
        let config = PollConfig {
            max_interval: Some(Duration::from_secs(2)),
            ..PollConfig::default()
        };
        let last = Backoff::new(&config).nth(5).unwrap();
        assert_eq!(last, Duration::from_secs(2));
    }

    #[test]
    fn pending_twice_then_success() {
        let t = ScriptedTransport::new();
        t.reply("https://x/submit", json!({"url": "https://x/task/1"}));
        t.reply("https://x/task/1", json!({"task_status": "PENDING"}));
        t.reply("https://x/task/1", json!({"task_status": "PENDING"}));
        t.reply(
            "https://x/task/1",
            json!({"task_status": "SUCCESS", "result_url": "https://x/result"}),
        );
        t.reply("https://x/result", json!({"count": 1, "results": [{"v": 1}]}));

        let config = fast();
        let result = AsyncTask::new(&t, &config).run("https://x/submit").unwrap();

        assert_eq!(result, json!([{"v": 1}]));
        assert_eq!(t.requests_to("https://x/task/1"), 3);
        assert_eq!(t.requests_to("https://x/result"), 1);
    }

    #[test]
    fn interval_grows_between_polls_of_one_task() {
        let t = ScriptedTransport::new();
        t.reply("https://x/task/4", json!({"task_status": "PENDING"}));
        t.reply("https://x/task/4", json!({"task_status": "PENDING"}));
        t.reply(
            "https://x/task/4",
            json!({"task_status": "SUCCESS", "result_url": "https://x/result"}),
        );
        t.reply("https://x/result", json!([]));

        let config = PollConfig::default();
        AsyncTask::new(&t, &config)
            .with_sleep(record_sleep)
            .wait("https://x/task/4")
            .unwrap();

        let slept = SLEPT.with(|s| s.take());
        assert_eq!(
            slept,
            vec![Duration::from_secs_f64(1.0), Duration::from_secs_f64(1.5)]
        );
    }

    #[test]
    fn failure_is_terminal_and_skips_result() {
        let t = ScriptedTransport::new();
        t.reply("https://x/task/2", json!({"task_status": "FAILURE"}));

        let config = fast();
        let err = AsyncTask::new(&t, &config).wait("https://x/task/2").unwrap_err();
        match err {
            Error::AsyncTaskFailure { status, task_url } => {
                assert_eq!(status, "FAILURE");
                assert_eq!(task_url, "https://x/task/2");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(t.urls(), vec!["https://x/task/2"]);
    }

    #[test]
    fn max_polls_bounds_pending_tasks() {
        let t = ScriptedTransport::new();
        for _ in 0..3 {
            t.reply("https://x/task/3", json!({"task_status": "PENDING"}));
        }
        let config = PollConfig {
            max_polls: Some(2),
            ..fast()
        };
        let err = AsyncTask::new(&t, &config).wait("https://x/task/3").unwrap_err();
        assert!(matches!(err, Error::AsyncTaskTimeout { polls: 2, .. }));
        assert_eq!(t.requests_to("https://x/task/3"), 2);
    }

    #[test]
    fn submission_without_url_is_malformed() {
        let t = ScriptedTransport::new();
        t.reply("https://x/submit", json!({"detail": "nope"}));
        let config = fast();
        let err = AsyncTask::new(&t, &config).submit("https://x/submit").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn transport_errors_during_poll_are_not_retried() {
        let t = ScriptedTransport::new();
        let config = fast();
        let err = AsyncTask::new(&t, &config).wait("https://x/task/missing").unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(t.urls().len(), 1);
    }
}
