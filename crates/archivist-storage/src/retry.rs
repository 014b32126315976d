use std::fmt;
use std::time::Duration;

use crate::RetryConfig;

/// Run `f` until it succeeds, fails permanently, or the retry budget is
/// spent. The delay doubles per attempt up to the configured cap, with
/// random jitter added so simultaneous retries spread out.
pub(crate) fn with_backoff<T, E: fmt::Display>(
    config: &RetryConfig,
    op: &str,
    transient: impl Fn(&E) -> bool,
    f: impl Fn() -> std::result::Result<T, E>,
) -> std::result::Result<T, E> {
    let mut delay_ms = config.retry_delay_ms;
    let mut attempt = 0;
    loop {
        match f() {
            Ok(val) => return Ok(val),
            Err(e) if attempt < config.max_retries && transient(&e) => {
                attempt += 1;
                tracing::warn!(
                    "{op}: transient failure (attempt {attempt}/{}), retrying: {e}",
                    config.max_retries,
                );
                let jitter = rand::random::<u64>() % delay_ms.max(1);
                std::thread::sleep(Duration::from_millis(delay_ms + jitter));
                delay_ms = (delay_ms * 2).min(config.retry_max_delay_ms);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Transport problems and throttling/server-side statuses are worth
/// retrying; anything else is the caller's problem.
pub(crate) fn transient_http(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::Transport(_) => true,
        ureq::Error::Status(code, _) => *code == 429 || *code >= 500,
    }
}

fn transient_io(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted
    )
}

/// Failure of one presigned-request round trip: the HTTP call itself, or
/// reading the response body afterwards. Kept separate so a connection
/// dropped mid-body counts as transient too.
pub(crate) enum RequestFailure {
    Http(Box<ureq::Error>),
    Body(std::io::Error),
}

impl RequestFailure {
    pub(crate) fn http(e: ureq::Error) -> Self {
        // Boxed to keep the enum small.
        RequestFailure::Http(Box::new(e))
    }

    pub(crate) fn is_transient(&self) -> bool {
        match self {
            RequestFailure::Http(e) => transient_http(e),
            RequestFailure::Body(e) => transient_io(e),
        }
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestFailure::Http(e) => write!(f, "{e}"),
            RequestFailure::Body(e) => write!(f, "body read error: {e}"),
        }
    }
}
