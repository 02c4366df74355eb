use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::error::{TransportError, status_error};

/// Static username/password pair sent as request headers.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Both parts are required; a missing one disables the credential header.
    pub fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        match (username, password) {
            (Some(username), Some(password)) => Some(Self { username, password }),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// A single HTTP exchange with the API.
///
/// `data == None` is a GET; otherwise the data is POSTed as JSON. Returns the
/// decoded JSON body, `Value::Null` for an empty body.
pub trait Transport: Send + Sync {
    fn perform_request(&self, url: &str, data: Option<&Value>) -> Result<Value, TransportError>;
}

/// Blocking `reqwest` transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    credentials: Option<Credentials>,
    http: HttpClient,
}

impl HttpTransport {
    pub fn new(credentials: Option<Credentials>) -> Result<Self, TransportError> {
        Self::with_timeout(credentials, Duration::from_secs(60))
    }

    pub fn with_timeout(
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("lizard-connector-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("lizard-connector-rs")),
        );

        let http = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .map_err(|source| TransportError::Request {
                url: String::new(),
                source,
            })?;

        Ok(Self { credentials, http })
    }

    /// Whether requests carry the credential headers.
    pub fn use_header(&self) -> bool {
        self.credentials.is_some()
    }

    fn apply_auth(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(c) => req
                .header("username", c.username.as_str())
                .header("password", c.password.as_str()),
            None => req,
        }
    }
}

impl Transport for HttpTransport {
    fn perform_request(&self, url: &str, data: Option<&Value>) -> Result<Value, TransportError> {
        let req = match data {
            Some(data) => {
                let body = serde_json::to_vec(data).map_err(|source| TransportError::Encode {
                    url: url.to_string(),
                    source,
                })?;
                tracing::debug!(%url, "POST");
                self.http
                    .post(url)
                    .header(CONTENT_TYPE, "application/json")
                    .body(body)
            }
            None => {
                tracing::debug!(%url, "GET");
                self.http.get(url)
            }
        };

        let resp = self
            .apply_auth(req)
            .send()
            .map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        // `text` honours the declared charset and falls back to UTF-8.
        let text = resp.text().map_err(|source| TransportError::Request {
            url: url.to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(status_error(status, url, &text));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|source| TransportError::Decode {
            url: url.to_string(),
            source,
        })
    }
}
