//! Retrying page fetcher for the DataCite `/dois` endpoint
//!
//! One call = one page. Transient failures are absorbed by
//! [`retry_with_backoff`]; what comes out is either a parsed page or a fatal
//! [`FetchError`].

use std::time::Duration;

use doiharvest_core::{FetchError, RetryPolicy, Transport, retry_with_backoff};
use serde::Deserialize;
use serde_json::Value;

use crate::params::{PAGE_CURSOR, QueryParams};

/// One parsed JSON:API page.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Raw items; mapping to rows happens downstream
    pub data: Vec<Value>,
    /// `meta.total`, when the server reports it
    pub total: Option<u64>,
    /// Cursor extracted from `links.next`; `None` on the last page
    pub next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<Vec<Value>>,
    #[serde(default)]
    meta: Option<Meta>,
    #[serde(default)]
    links: Option<Links>,
}

#[derive(Deserialize)]
struct Meta {
    #[serde(default)]
    total: Option<u64>,
}

#[derive(Deserialize)]
struct Links {
    #[serde(default)]
    next: Option<String>,
}

/// Parse a response body into a [`Page`].
pub fn parse_page(body: &str) -> Result<Page, FetchError> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    Ok(Page {
        data: envelope.data.unwrap_or_default(),
        total: envelope.meta.and_then(|m| m.total),
        next_cursor: envelope
            .links
            .and_then(|l| l.next)
            .as_deref()
            .and_then(parse_next_cursor),
    })
}

/// Extract the `page[cursor]` value from a `links.next` URL.
pub fn parse_next_cursor(next_url: &str) -> Option<String> {
    let url = url::Url::parse(next_url).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == PAGE_CURSOR)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Blocking sleep used between retries.
fn thread_sleep(d: Duration) {
    std::thread::sleep(d);
}

/// Page fetcher bound to one endpoint and retry policy.
pub struct Fetcher<T: Transport> {
    transport: T,
    endpoint: String,
    policy: RetryPolicy,
    sleep: Box<dyn Fn(Duration)>,
}

impl<T: Transport> std::fmt::Debug for Fetcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("endpoint", &self.endpoint)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, endpoint: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            policy,
            sleep: Box::new(thread_sleep),
        }
    }

    /// Replace the backoff sleeper (tests record delays instead of sleeping).
    pub fn with_sleeper(mut self, sleep: impl Fn(Duration) + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    /// Fetch one page, retrying transient failures.
    pub fn fetch(&self, params: &QueryParams) -> Result<Page, FetchError> {
        let query = params.to_query();
        let label = format!("page cursor={}", params.cursor().unwrap_or("-"));
        retry_with_backoff(&label, &self.policy, self.sleep.as_ref(), || {
            self.fetch_once(&query)
        })
    }

    fn fetch_once(&self, query: &[(String, String)]) -> Result<Page, FetchError> {
        let resp = self.transport.get(&self.endpoint, query)?;
        if !resp.is_success() {
            return Err(resp.into_error());
        }
        parse_page(&resp.body)
    }

    /// Zero-size request that only reads `meta.total`.
    pub fn probe_total(&self, params: &QueryParams) -> Result<u64, FetchError> {
        let probe = params.probe();
        let query = probe.to_query();
        retry_with_backoff("probe", &self.policy, self.sleep.as_ref(), || {
            self.fetch_once(&query)
        })
        .map(|page| page.total.unwrap_or(0))
    }
}
