//! Fetch error taxonomy shared by every paginated API client

/// Whether a failed request may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Retryable: rate limit, 5xx, network
    Transient,
    /// Anything retrying cannot fix; aborts the current pass
    Fatal,
}

/// Error from a single page request.
#[derive(Debug)]
pub enum FetchError {
    /// Non-2xx response
    Http { status: u16, message: String },
    /// Connection refused, reset, timed out, ...
    Network(String),
    /// 2xx response whose body is not the expected JSON document
    Malformed(String),
    /// Transient failures until the attempt ceiling was reached
    Exhausted {
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http { status, message } => write!(f, "HTTP {status}: {message}"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Malformed(msg) => write!(f, "malformed response: {msg}"),
            Self::Exhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Exhausted { last, .. } => Some(last.as_ref()),
            _ => None,
        }
    }
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Http { status, .. } if *status == 429 || (500..=599).contains(status) => {
                FetchErrorKind::Transient
            }
            Self::Network(_) => FetchErrorKind::Transient,
            _ => FetchErrorKind::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == FetchErrorKind::Transient
    }

    /// HTTP status of the underlying failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}
