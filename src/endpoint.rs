use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::paginate::Pages;
use crate::parsers::{Parsed, Parser};
use crate::query::QueryParams;
use crate::task::{AsyncTask, PollConfig};
use crate::transport::Transport;
use crate::util::{append_query, join_segments, urljoin, with_trailing_slash};

pub const DEFAULT_API_VERSION: &str = "3";
pub const DEFAULT_PAGE_SIZE: u64 = 1000;
pub const DEFAULT_PAGINATED_PAGE_SIZE: u64 = 100;

/// Lock shared between async downloads to serialise their callbacks.
pub type CallbackLock = Arc<Mutex<()>>;

/// One API resource collection, e.g. `timeseries` under
/// `https://demo.lizard.net/api/v3/timeseries/`.
///
/// A *detail* endpoint addresses the data of a single record instead:
/// queries must carry a `uuid`, which moves into the path
/// (`timeseries/<uuid>/data/`).
#[derive(Clone)]
pub struct Endpoint {
    name: String,
    base_url: String,
    detail: bool,
    parser: Parser,
    max_results: Option<u64>,
    poll: PollConfig,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("detail", &self.detail)
            .field("parser", &self.parser)
            .field("max_results", &self.max_results)
            .finish_non_exhaustive()
    }
}

/// Rejects plain-http bases unless they point at `localhost`.
pub(crate) fn validate_base(base: &str) -> Result<url::Url> {
    let invalid = || Error::InvalidUrl {
        url: base.to_string(),
    };
    let parsed = url::Url::parse(base.trim_end_matches('/')).map_err(|_| invalid())?;
    match (parsed.scheme(), parsed.host_str()) {
        ("https", Some(_)) => Ok(parsed),
        (_, Some("localhost")) => Ok(parsed),
        _ => Err(invalid()),
    }
}

impl Endpoint {
    /// `name` is the resource path segment; an empty name addresses the API root.
    pub fn new(
        name: &str,
        base: &str,
        version: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        validate_base(base)?;
        let api = format!("api/v{}", version);
        let mut base_url = with_trailing_slash(urljoin(base, &api));
        if !name.is_empty() {
            base_url = with_trailing_slash(urljoin(&base_url, name));
        }

        Ok(Self {
            name: name.to_string(),
            base_url,
            detail: false,
            parser: Parser::default(),
            max_results: None,
            poll: PollConfig::default(),
            transport,
        })
    }

    pub fn with_parser(mut self, parser: Parser) -> Self {
        self.parser = parser;
        self
    }

    /// Single-page downloads fail when the server reports more results.
    pub fn with_max_results(mut self, max_results: Option<u64>) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// The detail (`<uuid>/data/`) variant of this endpoint.
    pub fn data(&self) -> Self {
        Self {
            detail: true,
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_detail(&self) -> bool {
        self.detail
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    pub fn parse(&self, payload: Value) -> Parsed {
        self.parser.parse(payload)
    }

    /// Full request URL. `page_size` applies unless the query sets its own.
    pub fn build_url(&self, page_size: u64, query: &QueryParams) -> Result<String> {
        let mut q = QueryParams::new()
            .with("page_size", page_size)
            .with("format", "json");
        q.update(query)?;

        let base = if self.detail {
            let uuid = q.remove("uuid").ok_or_else(|| {
                Error::ImproperQuery("Missing `uuid` in query parameters.".to_string())
            })?;
            join_segments(&self.base_url, &[uuid.as_str(), "data"])?
        } else {
            self.base_url.clone()
        };

        Ok(append_query(&base, &q.to_query_string()))
    }

    pub fn perform_request(&self, url: &str, data: Option<&Value>) -> Result<Value> {
        Ok(self.transport.perform_request(url, data)?)
    }

    /// GETs `url` and returns its unwrapped payload.
    ///
    /// Fails when the count exceeds `max_results`, and, with
    /// `raise_on_next_url`, when further pages exist.
    pub fn get(&self, url: &str, raise_on_next_url: bool) -> Result<Value> {
        let env = Envelope::unwrap(self.perform_request(url, None)?);
        env.check_max_results(self.max_results)?;
        if raise_on_next_url {
            if let Some(next) = env.next {
                return Err(Error::UnfetchedPages { next });
            }
        }
        Ok(env.payload)
    }

    /// Downloads a single page and parses it.
    ///
    /// Collection endpoints fail with [`Error::UnfetchedPages`] rather than
    /// silently dropping further pages.
    pub fn download(&self, query: &QueryParams) -> Result<Parsed> {
        self.download_raw(query).map(|payload| self.parse(payload))
    }

    /// [`download`](Self::download) without the parser.
    pub fn download_raw(&self, query: &QueryParams) -> Result<Value> {
        let url = self.build_url(DEFAULT_PAGE_SIZE, query)?;
        self.get(&url, !self.detail)
    }

    /// Lazily iterates over all pages of `page_size` results.
    pub fn download_paginated(&self, page_size: u64, query: &QueryParams) -> Result<Pages> {
        let url = self.build_url(page_size, query)?;
        Ok(Pages::new(self.clone(), url))
    }

    fn async_url(&self, query: &QueryParams) -> Result<String> {
        let query = query.clone().with("async", "true");
        self.build_url(0, &query)
    }

    /// Runs the query as a server-side task on the calling thread and
    /// returns the parsed result once the task succeeds.
    pub fn download_async_blocking(&self, query: &QueryParams) -> Result<Parsed> {
        let url = self.async_url(query)?;
        let payload = AsyncTask::new(self.transport.as_ref(), &self.poll).run(&url)?;
        Ok(self.parse(payload))
    }

    /// Runs [`download_async_blocking`](Self::download_async_blocking) on a
    /// background thread and hands the result to `callback`.
    ///
    /// Query errors are returned immediately. Failures of the task itself
    /// are logged and returned through the join handle; the callback is not
    /// called for them. With `lock`, the callback runs while holding it.
    pub fn download_async<F>(
        &self,
        query: &QueryParams,
        callback: F,
        lock: Option<CallbackLock>,
    ) -> Result<JoinHandle<Result<()>>>
    where
        F: FnOnce(Parsed) + Send + 'static,
    {
        // Surface query errors before spawning.
        self.async_url(query)?;

        let endpoint = self.clone();
        let query = query.clone();
        Ok(thread::spawn(move || {
            let result = match endpoint.download_async_blocking(&query) {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(endpoint = endpoint.name(), error = %e, "Async download failed");
                    return Err(e);
                }
            };
            match lock {
                Some(lock) => {
                    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
                    callback(result);
                }
                None => callback(result),
            }
            Ok(())
        }))
    }

    /// POSTs `data` to the endpoint, or to `<uuid>/<sub_endpoint>/` when a
    /// uuid is given. `sub_endpoint` defaults to `data`.
    pub fn upload(
        &self,
        uuid: Option<&str>,
        sub_endpoint: Option<&str>,
        data: &Value,
    ) -> Result<Value> {
        let url = match uuid {
            Some(uuid) => {
                let sub_endpoint = sub_endpoint.unwrap_or("data");
                join_segments(&self.base_url, &[uuid, sub_endpoint])?
            }
            None => self.base_url.clone(),
        };
        self.perform_request(&url, Some(data))
    }
}
