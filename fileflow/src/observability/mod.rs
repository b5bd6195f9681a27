//! Tracing setup and span timing helpers.

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber from `RUST_LOG`.
///
/// Defaults to `info` when no filter is set. Safe to call once per process;
/// a second call reports the subscriber conflict instead of panicking.
pub fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}

/// Returns the current time as an RFC3339 timestamp.
#[must_use]
pub fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Wall-clock duration capture for task reports.
///
/// Captures the start instant; the caller reads the elapsed time whenever it
/// assembles its report, so one timer can feed both the log line and the
/// report field.
#[derive(Debug, Clone, Copy)]
pub struct SpanTimer {
    started: std::time::Instant,
}

impl SpanTimer {
    /// Starts timing now.
    #[must_use]
    pub fn start() -> Self {
        Self {
            started: std::time::Instant::now(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}
