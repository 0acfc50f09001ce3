use futures_util::future::BoxFuture;

/// Yield point used by long-running loops to hand control back to the host.
pub trait Scheduler: Send + Sync {
    fn yield_now(&self) -> BoxFuture<'_, ()>;
}

/// Yields to the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn yield_now(&self) -> BoxFuture<'_, ()> {
        Box::pin(tokio::task::yield_now())
    }
}

/// Tracks how long a loop has run since it last yielded.
#[derive(Debug, Clone, Copy)]
pub struct TimeSlice {
    length: core::time::Duration,
    started: std::time::Instant,
}

impl TimeSlice {
    #[must_use]
    pub fn new(length: core::time::Duration) -> Self {
        Self {
            length,
            started: std::time::Instant::now(),
        }
    }

    #[must_use]
    pub fn expired(&self) -> bool {
        self.started.elapsed() >= self.length
    }

    pub fn restart(&mut self) {
        self.started = std::time::Instant::now();
    }
}
