use std::time::Duration;

use crate::error::{Error, Result};

/// Next poll interval: `current * growth`, capped at `max` when given.
///
/// The interval never shrinks: a growth below 1 (or NaN) keeps it as is, and
/// an overflowing product saturates.
pub(crate) fn backoff(current: Duration, growth: f64, max: Option<Duration>) -> Duration {
    let secs = current.as_secs_f64() * growth.max(1.0);
    let next = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
    match max {
        Some(max) if next > max => max,
        _ => next,
    }
}

/// Joins a path segment onto a base URL, keeping exactly one `/` between them.
/// Absolute URLs in `path` are returned unchanged.
pub(crate) fn urljoin(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{}/{}", base, path)
}

/// Ensures a trailing slash, which the Lizard API requires on collection URLs.
pub(crate) fn with_trailing_slash(url: String) -> String {
    if url.ends_with('/') { url } else { url + "/" }
}

/// Appends percent-encoded path segments to `base`, ending with a `/`.
pub(crate) fn join_segments(base: &str, segments: &[&str]) -> Result<String> {
    let invalid = || Error::InvalidUrl {
        url: base.to_string(),
    };
    let mut url = url::Url::parse(base).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(segments)
        .push("");
    Ok(url.into())
}

pub(crate) fn append_query(url: &str, query: &str) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, sep, query)
}
