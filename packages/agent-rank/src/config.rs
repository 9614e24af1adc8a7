use std::time::Duration;

/// Backoff applied before retrying a page the upstream refused.
///
/// Injectable as a function of the attempt number so tests run with
/// millisecond intervals and callers can trade fixed pacing for a ramp.
#[derive(Debug, Clone, Copy)]
pub enum BackoffPolicy {
    /// Same interval between every attempt.
    Fixed(Duration),
    /// `base * attempt` between attempts.
    Linear { base: Duration },
}

impl BackoffPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(interval) => *interval,
            Self::Linear { base } => *base * attempt,
        }
    }
}

/// Tuning knobs for one collector instance.
///
/// Defaults match the upstream feed's published tolerance: at most ~25
/// concurrent requests, with enough pacing to stay under the per-minute
/// quota in steady state.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Token pool capacity: maximum simultaneously in-flight fetches.
    pub concurrency: usize,
    /// Fixed delay between acquiring a token and dispatching the request.
    pub pace: Duration,
    /// Delay schedule between retries of a refused page.
    pub backoff: BackoffPolicy,
    /// Attempt budget per page before it is dropped from the run.
    pub max_attempts: u32,
    /// Per-request timeout applied by the HTTP source.
    pub request_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            concurrency: 25,
            pace: Duration::from_secs(2),
            backoff: BackoffPolicy::Fixed(Duration::from_secs(20)),
            max_attempts: 5,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl CollectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Clamped to at least 1: a zero budget would drop every page
    /// without a single fetch.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Zero-delay variant used throughout the test suites.
    #[cfg(test)]
    pub(crate) fn immediate() -> Self {
        Self::default()
            .with_pace(Duration::ZERO)
            .with_backoff(BackoffPolicy::Fixed(Duration::ZERO))
    }
}
