//! Blocking HTTP transport for paginated JSON APIs.
//!
//! Uses async reqwest internally on a shared runtime but presents a sync
//! interface: the harvest loop is strictly sequential, one request at a time.

use std::sync::LazyLock;
use std::time::Duration;

use crate::error::FetchError;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum response body excerpt kept in error messages
const ERROR_BODY_EXCERPT: usize = 800;

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Raw response: status code plus body text.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into a [`FetchError::Http`] with a body excerpt.
    pub fn into_error(self) -> FetchError {
        let mut message = self.body;
        if message.len() > ERROR_BODY_EXCERPT {
            let mut cut = ERROR_BODY_EXCERPT;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }
        FetchError::Http {
            status: self.status,
            message,
        }
    }
}

/// One GET request. Implementations return `Err` only for network-level
/// failures; any HTTP status, including errors, comes back as `Ok`.
pub trait Transport {
    fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, FetchError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, FetchError> {
        (**self).get(url, query)
    }
}

/// Outbound identity and timeouts, threaded explicitly into the transport.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Sent as `User-Agent`; public APIs use it as a rate-limit courtesy contact
    pub user_agent: String,
    /// `Accept` header value
    pub accept: String,
    /// Whole-request timeout
    pub timeout: Duration,
}

impl HttpSettings {
    /// User agent in the `Name/version (mailto:addr)` convention of polite pools.
    pub fn polite(product: &str, mailto: &str) -> Self {
        Self {
            user_agent: format!("{product} (mailto:{mailto})"),
            ..Self::default()
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: concat!("doiharvest/", env!("CARGO_PKG_VERSION")).to_string(),
            accept: "application/json".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// reqwest-backed [`Transport`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    accept: String,
}

impl ReqwestTransport {
    pub fn new(settings: &HttpSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(settings.timeout)
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self {
            client,
            accept: settings.accept.clone(),
        })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, FetchError> {
        SHARED_RUNTIME.handle().block_on(async {
            let resp = self
                .client
                .get(url)
                .header(reqwest::header::ACCEPT, &self.accept)
                .query(query)
                .send()
                .await
                // Strip URL from error to keep query strings out of logs
                .map_err(|e| FetchError::Network(e.without_url().to_string()))?;
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .await
                .map_err(|e| FetchError::Network(e.without_url().to_string()))?;
            Ok(HttpResponse { status, body })
        })
    }
}
