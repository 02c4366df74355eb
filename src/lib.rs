//! A Rust client for the Lizard geospatial and time-series API.
//!
//! This crate builds Lizard queries, downloads single pages, iterates
//! lazily over paginated results and drives server-side async tasks to
//! completion, then parses the payload into plain JSON or tables.
//!
//! ## Quick start
//! - Configure the portal and credentials via environment variables
//!   (`LIZARD_URL`, `LIZARD_USERNAME`, `LIZARD_PASSWORD`) or a `.lizardrc`
//!   file (current directory or home directory). Without any configuration
//!   the public demo portal is used anonymously.
//! - Look up an endpoint on the [`Client`] and download from it.
//!
//! ```no_run
//! use lizard_connector::{Client, QueryParams, queries};
//!
//! fn main() -> anyhow::Result<()> {
//!     let client = Client::from_env()?;
//!     let timeseries = client.endpoint("timeseries")?;
//!
//!     let mut query = QueryParams::new();
//!     query.update(queries::in_bbox((52.0, 4.0), (52.5, 5.0), Some("timeseries")))?;
//!     query.update("name__icontains=waterstand")?;
//!
//!     for page in timeseries.download_paginated(100, &query)? {
//!         println!("{:?}", page?);
//!     }
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

pub mod callbacks;
mod client;
mod config;
mod endpoint;
mod envelope;
mod error;
mod paginate;
pub mod parsers;
pub mod queries;
mod query;
mod task;
mod transport;
mod util;

#[cfg(test)]
mod test_support;

pub use client::{ADDITIONAL_ENDPOINTS_V3, Client, DETAIL_ENDPOINTS};
pub use config::{ClientConfig, DEFAULT_BASE_URL};
pub use endpoint::{
    CallbackLock, DEFAULT_API_VERSION, DEFAULT_PAGE_SIZE, DEFAULT_PAGINATED_PAGE_SIZE, Endpoint,
};
pub use envelope::Envelope;
pub use error::{Error, Result, TransportError};
pub use paginate::Pages;
pub use parsers::{Parsed, Parser};
pub use query::{QueryParams, QuerySource, QueryValue, commaify};
pub use task::{
    ASYNC_POLL_TIME, ASYNC_POLL_TIME_INCREASE, AsyncTask, Backoff, PollConfig, TaskStatus,
};
pub use transport::{Credentials, HttpTransport, Transport};
