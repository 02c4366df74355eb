use reqwest::StatusCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while talking to a Lizard API.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid base url {url}: base should start with https (or point to localhost)")]
    InvalidUrl { url: String },

    #[error("improper query: {0}")]
    ImproperQuery(String),

    #[error(
        "the Lizard API reports {count} result(s), more than the configured maximum of {max}; \
         use `download_paginated` or `download_async`, or raise `max_results`"
    )]
    TooManyResults { count: u64, max: u64 },

    #[error(
        "the Lizard API returned more than one result page (next: {next}); \
         use `download_paginated` or `download_async`, or increase `page_size`"
    )]
    UnfetchedPages { next: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("async task {task_url} ended with status {status}")]
    AsyncTaskFailure { status: String, task_url: String },

    #[error("async task {task_url} still pending after {polls} poll(s)")]
    AsyncTaskTimeout { polls: usize, task_url: String },

    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("malformed API response: {0}")]
    MalformedResponse(String),
}

/// Failure of a single HTTP exchange.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("API request failed: HTTP {status} for url ({url}){}", fmt_body(.body))]
    Status {
        status: StatusCode,
        url: String,
        body: String,
    },

    #[error("failed to parse API JSON (url={url}): {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode request body for {url}: {source}")]
    Encode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl TransportError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn fmt_body(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!("\n{}", body)
    }
}

// Django REST framework answers with {"detail": ...}; some views use {"message": ...}.
#[derive(Debug, serde::Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Builds the error for a non-2xx response, keeping only the server's
/// message when the body is a recognisable JSON error document.
pub(crate) fn status_error(status: StatusCode, url: &str, text: &str) -> TransportError {
    let body = match serde_json::from_str::<ApiErrorResponse>(text) {
        Ok(ApiErrorResponse {
            detail: Some(detail),
            ..
        }) => detail,
        Ok(ApiErrorResponse {
            message: Some(message),
            ..
        }) => message,
        _ => text.trim().to_string(),
    };

    let body = if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        format!(
            "{}\n- Check LIZARD_USERNAME / LIZARD_PASSWORD or the .lizardrc credentials",
            body
        )
    } else {
        body
    };

    TransportError::Status {
        status,
        url: url.to_string(),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_prefers_detail_field() {
        let err = status_error(
            StatusCode::NOT_FOUND,
            "https://demo.lizard.net/api/v3/nope/",
            r#"{"detail": "Not found."}"#,
        );
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        let msg = err.to_string();
        assert!(msg.contains("HTTP 404"));
        assert!(msg.ends_with("Not found."));
    }

    #[test]
    fn status_error_keeps_plain_bodies() {
        let err = status_error(StatusCode::BAD_GATEWAY, "https://x", "upstream down\n");
        assert!(err.to_string().ends_with("\nupstream down"));
    }

    #[test]
    fn auth_failures_mention_credentials() {
        let err = status_error(StatusCode::UNAUTHORIZED, "https://x", "");
        assert!(err.to_string().contains("LIZARD_USERNAME"));
    }

    #[test]
    fn too_many_results_names_count_and_limit() {
        let msg = Error::TooManyResults {
            count: 2500,
            max: 1000,
        }
        .to_string();
        assert!(msg.contains("2500"));
        assert!(msg.contains("1000"));
        assert!(msg.contains("download_paginated"));
    }
}
