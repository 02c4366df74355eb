use anyhow::Context;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use crate::config::{ClientConfig, load_config};
use crate::endpoint::{Endpoint, validate_base};
use crate::error::{Error, Result};
use crate::parsers::Parser;
use crate::query::QueryParams;
use crate::task::PollConfig;
use crate::transport::{Credentials, HttpTransport, Transport};

/// Endpoints not listed on the v3 API root that still exist.
pub const ADDITIONAL_ENDPOINTS_V3: &[&str] = &["raster_aggregates"];

/// Endpoints with a per-record `<uuid>/data/` view.
pub const DETAIL_ENDPOINTS: &[&str] = &["rasters", "timeseries", "opticalfibers"];

#[derive(Debug)]
struct Catalogue {
    endpoints: BTreeMap<String, Endpoint>,
    details: BTreeMap<String, Endpoint>,
}

/// Entry point to one Lizard portal.
///
/// The endpoint catalogue is fetched from the API root on first use and kept
/// for the lifetime of the client. Endpoint names use `_` where the API
/// uses `-` (`raster_aggregates` for `raster-aggregates`).
pub struct Client {
    base: String,
    version: String,

    parser: Parser,
    max_results: Option<u64>,
    poll: PollConfig,

    transport: Arc<dyn Transport>,
    catalogue: OnceLock<Catalogue>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base", &self.base)
            .field("version", &self.version)
            .field("parser", &self.parser)
            .field("max_results", &self.max_results)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client from environment variables and/or `.lizardrc`.
    ///
    /// This is equivalent to `Client::new(None, None, None)`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(None, None, None)
    }

    /// Creates a client using (in order of precedence):
    /// - explicit arguments
    /// - environment variables `LIZARD_URL` / `LIZARD_USERNAME` / `LIZARD_PASSWORD`
    /// - config file from `LIZARD_RC` or `.lizardrc`
    /// - `https://demo.lizard.net`, anonymous
    pub fn new(
        url: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> anyhow::Result<Self> {
        let cfg = load_config(url, username, password)?;
        Self::from_config(cfg)
    }

    pub fn from_config(cfg: ClientConfig) -> anyhow::Result<Self> {
        let credentials = Credentials::from_parts(cfg.username, cfg.password);
        let transport = HttpTransport::with_timeout(credentials, cfg.timeout)
            .context("failed to build HTTP client")?;
        Ok(Self::with_transport(&cfg.url, &cfg.version, Arc::new(transport))?)
    }

    /// Client over any [`Transport`].
    pub fn with_transport(base: &str, version: &str, transport: Arc<dyn Transport>) -> Result<Self> {
        validate_base(base)?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            version: version.to_string(),
            parser: Parser::default(),
            max_results: None,
            poll: PollConfig::default(),
            transport,
            catalogue: OnceLock::new(),
        })
    }

    pub fn with_parser(mut self, parser: Parser) -> Self {
        self.parser = parser;
        self.catalogue = OnceLock::new();
        self
    }

    pub fn with_max_results(mut self, max_results: Option<u64>) -> Self {
        self.max_results = max_results;
        self.catalogue = OnceLock::new();
        self
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self.catalogue = OnceLock::new();
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.poll.progress = progress;
        self.catalogue = OnceLock::new();
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// An endpoint configured like this client's endpoints, by API path name.
    pub fn make_endpoint(&self, name: &str) -> Result<Endpoint> {
        Ok(Endpoint::new(name, &self.base, &self.version, self.transport.clone())?
            .with_parser(self.parser.clone())
            .with_max_results(self.max_results)
            .with_poll_config(self.poll.clone()))
    }

    /// Resource names advertised by the API root.
    pub fn discover(&self) -> Result<Vec<String>> {
        let root = self.make_endpoint("")?.with_max_results(None);
        let url = root.build_url(0, &QueryParams::new())?;
        let listing = root.get(&url, false)?;

        let Value::Object(map) = listing else {
            return Err(Error::MalformedResponse(format!(
                "API root {} did not return an endpoint listing",
                url
            )));
        };

        let mut names: Vec<String> = map.keys().map(|k| k.replace('-', "_")).collect();
        if self.version == "3" {
            names.extend(ADDITIONAL_ENDPOINTS_V3.iter().map(|s| s.to_string()));
        }
        names.sort();
        names.dedup();
        tracing::debug!(count = names.len(), "Discovered endpoints");
        Ok(names)
    }

    fn catalogue(&self) -> Result<&Catalogue> {
        if let Some(c) = self.catalogue.get() {
            return Ok(c);
        }

        let mut endpoints = BTreeMap::new();
        let mut details = BTreeMap::new();
        for name in self.discover()? {
            let endpoint = self.make_endpoint(&name.replace('_', "-"))?;
            if DETAIL_ENDPOINTS.contains(&name.as_str()) {
                details.insert(name.clone(), endpoint.data());
            }
            endpoints.insert(name, endpoint);
        }

        // A concurrent caller may have won the race; either catalogue is fine.
        let _ = self.catalogue.set(Catalogue { endpoints, details });
        self.catalogue
            .get()
            .ok_or_else(|| Error::MalformedResponse("endpoint catalogue unavailable".to_string()))
    }

    /// All known endpoints, keyed by name.
    pub fn endpoints(&self) -> Result<&BTreeMap<String, Endpoint>> {
        Ok(&self.catalogue()?.endpoints)
    }

    pub fn endpoint_names(&self) -> Result<Vec<&str>> {
        Ok(self.endpoints()?.keys().map(String::as_str).collect())
    }

    /// Looks up an endpoint by name; `-` and `_` are interchangeable.
    pub fn endpoint(&self, name: &str) -> Result<&Endpoint> {
        let key = name.replace('-', "_");
        self.endpoints()?
            .get(&key)
            .ok_or_else(|| Error::UnknownEndpoint(name.to_string()))
    }

    /// The `<uuid>/data/` variant of a detail endpoint.
    pub fn data_endpoint(&self, name: &str) -> Result<&Endpoint> {
        let key = name.replace('-', "_");
        self.catalogue()?
            .details
            .get(&key)
            .ok_or_else(|| Error::UnknownEndpoint(format!("{} (data)", name)))
    }
}
