//! doiharvest core - shared infrastructure for catalog harvesting
//!
//! Fetch error taxonomy, retry with exponential backoff, the blocking HTTP
//! transport seam, Parquet sinks, logging and progress plumbing used by the
//! harvest and merge crates.

pub mod accumulator;
pub mod error;
pub mod http;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod shutdown;
pub mod sink;

// Re-exports for convenience
pub use accumulator::Accumulator;
pub use error::{FetchError, FetchErrorKind};
pub use http::{HttpResponse, HttpSettings, ReqwestTransport, SHARED_RUNTIME, Transport};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use shutdown::{install_signal_handlers, is_shutdown_requested, request_shutdown};
pub use sink::{ParquetSink, cleanup_tmp_files, is_valid_parquet, tmp_path_for};
