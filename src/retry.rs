use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::DomainError;

/// Classification of a single attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// 2xx.
    Success,
    /// 4xx other than 429, and any leftover non-2xx status.
    ClientError,
    /// 429.
    RateLimited,
    /// 5xx.
    ServerError,
    /// No response: DNS, connect, reset or timeout.
    TransportError,
}

impl Outcome {
    /// Classifies an HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            _ => Self::ClientError,
        }
    }

    /// Rate limits, server errors and transport errors.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError | Self::TransportError
        )
    }

    /// Kebab-case name used in log records.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ClientError => "client-error",
            Self::RateLimited => "rate-limited",
            Self::ServerError => "server-error",
            Self::TransportError => "transport-error",
        }
    }
}

/// Bounded exponential backoff with jitter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: usize,
    /// Delay before the first retry, and the exclusive upper bound of jitter.
    pub base: Duration,
    /// Cap applied to every computed delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// `attempt` is the 1-based number of the attempt that just failed.
    pub fn should_retry(&self, outcome: Outcome, attempt: usize) -> bool {
        outcome.is_retryable() && attempt <= self.max_retries
    }

    /// `min(max_delay, base * 2^(attempt-1) + jitter)`, raised to the
    /// provider's retry hint when one was sent (still capped).
    pub fn delay_for<R: Rng + ?Sized>(
        &self,
        attempt: usize,
        hint: Option<Duration>,
        rng: &mut R,
    ) -> Duration {
        let computed = self.backoff(attempt, self.jitter(rng));
        match hint {
            Some(hint) => hint.max(computed).min(self.max_delay),
            None => computed,
        }
    }

    pub(crate) fn backoff(&self, attempt: usize, jitter: Duration) -> Duration {
        let exp = attempt.saturating_sub(1).min(16) as u32;
        self.base
            .saturating_mul(1u32 << exp)
            .saturating_add(jitter)
            .min(self.max_delay)
    }

    fn jitter<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let bound = u64::try_from(self.base.as_nanos()).unwrap_or(u64::MAX);
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rng.gen_range(0..bound))
    }
}

/// Progress of one logical call through its retry loop.
#[derive(Debug, Default)]
pub struct RetryState {
    /// 1-based number of the attempt in flight.
    pub attempt: usize,
    pub last_error: Option<DomainError>,
    pub delay: Duration,
}

impl RetryState {
    /// State before the first attempt.
    pub fn new() -> Self {
        Self {
            attempt: 1,
            ..Self::default()
        }
    }

    pub(crate) fn schedule_retry(&mut self, error: DomainError, delay: Duration) {
        self.last_error = Some(error);
        self.delay = delay;
        self.attempt += 1;
    }
}

/// Reads a delta-seconds `Retry-After` header. HTTP-date values are ignored.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::{rngs::StdRng, SeedableRng};
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    use super::{retry_after, Outcome, RetryPolicy};

    fn policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
        }
    }

    #[test]
    fn classifies_statuses() {
        assert_eq!(Outcome::from_status(201), Outcome::Success);
        assert_eq!(Outcome::from_status(400), Outcome::ClientError);
        assert_eq!(Outcome::from_status(404), Outcome::ClientError);
        assert_eq!(Outcome::from_status(429), Outcome::RateLimited);
        assert_eq!(Outcome::from_status(503), Outcome::ServerError);
        assert_eq!(Outcome::from_status(304), Outcome::ClientError);
    }

    #[test]
    fn client_errors_are_never_retried() {
        assert!(!policy(5).should_retry(Outcome::ClientError, 1));
        assert!(policy(5).should_retry(Outcome::ServerError, 1));
    }

    #[test]
    fn retry_stops_after_max_retries() {
        let policy = policy(2);
        assert!(policy.should_retry(Outcome::TransportError, 1));
        assert!(policy.should_retry(Outcome::TransportError, 2));
        assert!(!policy.should_retry(Outcome::TransportError, 3));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = policy(10);
        assert_eq!(policy.backoff(1, Duration::ZERO), Duration::from_millis(100));
        assert_eq!(policy.backoff(2, Duration::ZERO), Duration::from_millis(200));
        assert_eq!(policy.backoff(3, Duration::ZERO), Duration::from_millis(400));
        assert_eq!(policy.backoff(5, Duration::ZERO), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(60, Duration::ZERO), Duration::from_millis(1_000));
    }

    #[test]
    fn jitter_stays_below_one_base_unit() {
        let policy = policy(10);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let delay = policy.delay_for(1, None, &mut rng);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay < Duration::from_millis(200));
        }
    }

    #[test]
    fn zero_base_means_no_delay() {
        let policy = RetryPolicy {
            max_retries: 3,
            base: Duration::ZERO,
            max_delay: Duration::from_secs(1),
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(policy.delay_for(3, None, &mut rng), Duration::ZERO);
    }

    #[test]
    fn retry_hint_raises_delay_but_respects_cap() {
        let policy = policy(3);
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_millis(700)), &mut rng),
            Duration::from_millis(700)
        );
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(30)), &mut rng),
            Duration::from_millis(1_000)
        );
    }

    #[test]
    fn parses_delta_seconds_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(2)));
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }
}
