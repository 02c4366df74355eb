use std::iter::FusedIterator;

use crate::endpoint::Endpoint;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::parsers::Parsed;

/// Lazy, forward-only sequence of result pages.
///
/// Each call to `next` performs one request against the current `next` URL
/// and yields that page's parsed payload. The total count is known once the
/// first page has been fetched. A failed request ends the sequence; build a
/// new one with [`Endpoint::download_paginated`] to start over.
///
/// ```no_run
/// # fn demo(endpoint: &lizard_connector::Endpoint) -> lizard_connector::Result<()> {
/// use lizard_connector::QueryParams;
///
/// let mut pages = endpoint.download_paginated(100, &QueryParams::new())?;
/// assert_eq!(pages.total_count(), None);
/// let first = pages.next().transpose()?;
/// println!("{:?} results in total", pages.total_count());
/// for page in pages {
///     let _page = page?;
/// }
/// # let _ = first;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Pages {
    endpoint: Endpoint,
    next_url: Option<String>,
    count: Option<u64>,
    fetched: usize,
}

impl Pages {
    pub(crate) fn new(endpoint: Endpoint, url: String) -> Self {
        Self {
            endpoint,
            next_url: Some(url),
            count: None,
            fetched: 0,
        }
    }

    /// Total result count reported by the last fetched page.
    pub fn total_count(&self) -> Option<u64> {
        self.count
    }

    pub fn has_next(&self) -> bool {
        self.next_url.is_some()
    }

    pub fn next_url(&self) -> Option<&str> {
        self.next_url.as_deref()
    }

    pub fn pages_fetched(&self) -> usize {
        self.fetched
    }

    /// Fetches the next page without parsing it.
    pub fn next_raw(&mut self) -> Option<Result<serde_json::Value>> {
        let url = self.next_url.take()?;
        let reply = match self.endpoint.perform_request(&url, None) {
            Ok(reply) => reply,
            Err(e) => return Some(Err(e)),
        };

        let env = Envelope::unwrap(reply);
        self.fetched += 1;
        self.count = env.count;
        self.next_url = env.next;
        tracing::debug!(
            endpoint = self.endpoint.name(),
            page = self.fetched,
            count = ?self.count,
            next = ?self.next_url,
            "Fetched page"
        );
        Some(Ok(env.payload))
    }
}

impl Iterator for Pages {
    type Item = Result<Parsed>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_raw()
            .map(|page| page.map(|payload| self.endpoint.parse(payload)))
    }
}

impl FusedIterator for Pages {}
