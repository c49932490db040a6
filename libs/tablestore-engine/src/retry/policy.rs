use std::time::{Duration, Instant};

use rand::Rng;

use tablestore_api::ClientError;

use super::classifier::{self, Operation};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const ALWAYS_INITIAL_BASE_MS: u64 = 10;
const ALWAYS_MAX_BASE_MS: u64 = 5_000;
const DEFAULT_INITIAL_BASE_MS: u64 = 4;
const DEFAULT_MAX_BASE_MS: u64 = 1_000;
const CUSTOM_INITIAL_BASE_MS: u64 = 10;
const CUSTOM_MAX_BASE_MS: u64 = 2_000;

/// Retries every error, ignoring idempotency, until the count runs out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlwaysRetryConfig {
    pub max_retries: u32,
    pub initial_base: Duration,
    pub max_base: Duration,
}

impl Default for AlwaysRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_base: Duration::from_millis(ALWAYS_INITIAL_BASE_MS),
            max_base: Duration::from_millis(ALWAYS_MAX_BASE_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultRetryConfig {
    pub max_retries: u32,
    /// Wall-clock budget from the first attempt.
    pub timeout: Duration,
}

impl Default for DefaultRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomRetryConfig {
    pub max_retries: u32,
    pub timeout: Duration,
    /// Also retry non-idempotent writes after server-side failures whose
    /// outcome is unknown. May apply a write twice.
    pub retry_writes_on_server_error: bool,
    pub initial_base: Duration,
    pub max_base: Duration,
}

impl Default for CustomRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            retry_writes_on_server_error: false,
            initial_base: Duration::from_millis(CUSTOM_INITIAL_BASE_MS),
            max_base: Duration::from_millis(CUSTOM_MAX_BASE_MS),
        }
    }
}

/// How a pause is drawn from the current backoff window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Jitter {
    /// Uniform in `[0, min(base, remaining)]`.
    Full,
    /// Uniform in `[base / 2, base]`, then capped by the remaining time.
    UpperHalf,
}

/// Immutable retry configuration. Share freely; per-request progress lives
/// in [`RetryState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryPolicy {
    AlwaysRetry(AlwaysRetryConfig),
    Default(DefaultRetryConfig),
    Custom(CustomRetryConfig),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Default(DefaultRetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn always(max_retries: u32) -> Self {
        RetryPolicy::AlwaysRetry(AlwaysRetryConfig {
            max_retries,
            ..Default::default()
        })
    }

    pub fn default_with(max_retries: u32, timeout: Duration) -> Self {
        RetryPolicy::Default(DefaultRetryConfig {
            max_retries,
            timeout,
        })
    }

    pub fn custom(config: CustomRetryConfig) -> Self {
        RetryPolicy::Custom(config)
    }

    pub fn max_retries(&self) -> u32 {
        match self {
            RetryPolicy::AlwaysRetry(c) => c.max_retries,
            RetryPolicy::Default(c) => c.max_retries,
            RetryPolicy::Custom(c) => c.max_retries,
        }
    }

    fn timeout(&self) -> Option<Duration> {
        match self {
            RetryPolicy::AlwaysRetry(_) => None,
            RetryPolicy::Default(c) => Some(c.timeout),
            RetryPolicy::Custom(c) => Some(c.timeout),
        }
    }

    fn backoff_bounds_ms(&self) -> (u64, u64) {
        match self {
            RetryPolicy::AlwaysRetry(c) => (millis(c.initial_base), millis(c.max_base)),
            RetryPolicy::Default(_) => (DEFAULT_INITIAL_BASE_MS, DEFAULT_MAX_BASE_MS),
            RetryPolicy::Custom(c) => (millis(c.initial_base), millis(c.max_base)),
        }
    }

    fn jitter(&self) -> Jitter {
        match self {
            RetryPolicy::Default(_) => Jitter::Full,
            RetryPolicy::AlwaysRetry(_) | RetryPolicy::Custom(_) => Jitter::UpperHalf,
        }
    }

    /// Fresh state for a new logical request, with the deadline counted
    /// from now.
    pub fn start(&self) -> RetryState {
        self.start_at(Instant::now())
    }

    pub fn start_at(&self, now: Instant) -> RetryState {
        let (initial, max) = self.backoff_bounds_ms();
        let max_base_ms = max.max(1);
        RetryState {
            retries: 0,
            base_ms: initial.clamp(1, max_base_ms),
            deadline: self.timeout().and_then(|t| now.checked_add(t)),
            max_retries: self.max_retries(),
            max_base_ms,
        }
    }

    /// Whether `err` from `op` is worth another attempt, ignoring budget.
    ///
    /// Local validation failures are never retried, whatever the variant.
    pub fn should_retry(&self, op: Operation, err: &ClientError) -> bool {
        if matches!(err, ClientError::Local(_)) {
            return false;
        }
        match self {
            RetryPolicy::AlwaysRetry(_) => true,
            RetryPolicy::Default(_) => classifier::is_retryable(op, err, false),
            RetryPolicy::Custom(c) => {
                classifier::is_retryable(op, err, c.retry_writes_on_server_error)
            }
        }
    }

    /// Pause before the next attempt. Zero means give up and surface `err`.
    pub fn next_pause(&self, state: &mut RetryState, op: Operation, err: &ClientError) -> Duration {
        self.next_pause_at(state, op, err, Instant::now())
    }

    pub fn next_pause_at(
        &self,
        state: &mut RetryState,
        op: Operation,
        err: &ClientError,
        now: Instant,
    ) -> Duration {
        if state.is_exhausted_at(now) {
            return Duration::ZERO;
        }
        let remaining_ms = state
            .deadline
            .map(|deadline| millis(deadline.saturating_duration_since(now)));
        if !self.should_retry(op, err) {
            return Duration::ZERO;
        }

        let base = state.base_ms;
        let mut rng = rand::thread_rng();
        let pause_ms = match self.jitter() {
            Jitter::Full => {
                let cap = remaining_ms.map_or(base, |r| r.min(base));
                rng.gen_range(0..=cap)
            }
            Jitter::UpperHalf => {
                let sampled = rng.gen_range(base / 2..=base);
                remaining_ms.map_or(sampled, |r| r.min(sampled))
            }
        };

        state.retries += 1;
        state.base_ms = base.saturating_mul(2).min(state.max_base_ms);
        // a zero pause would read as "give up"
        Duration::from_millis(pause_ms.max(1))
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Progress of one logical request through its retries.
///
/// Not shared between requests: every request starts its own from
/// [`RetryPolicy::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    retries: u32,
    base_ms: u64,
    deadline: Option<Instant>,
    max_retries: u32,
    max_base_ms: u64,
}

impl RetryState {
    pub fn retry_count(&self) -> u32 {
        self.retries
    }

    /// Current backoff window before jitter.
    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// No further pause will be granted at `now`, whatever the error.
    ///
    /// Less than a millisecond before the deadline counts as reached, since
    /// the shortest pause is one millisecond.
    pub fn is_exhausted_at(&self, now: Instant) -> bool {
        self.retries >= self.max_retries
            || self
                .deadline
                .is_some_and(|d| d.saturating_duration_since(now) < Duration::from_millis(1))
    }

    pub fn is_exhausted(&self) -> bool {
        self.is_exhausted_at(Instant::now())
    }
}

/// A policy bundled with the state of one request.
///
/// Convenience for call sites that want a single stateful object; `fresh`
/// starts a new request with the same configuration.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    policy: RetryPolicy,
    state: RetryState,
}

impl RetryStrategy {
    pub fn new(policy: RetryPolicy) -> Self {
        let state = policy.start();
        Self { policy, state }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn should_retry(&self, op: Operation, err: &ClientError) -> bool {
        self.policy.should_retry(op, err)
    }

    pub fn next_pause(&mut self, op: Operation, err: &ClientError) -> Duration {
        self.policy.next_pause(&mut self.state, op, err)
    }

    /// Pause in milliseconds; `0` means do not retry.
    pub fn next_pause_millis(&mut self, op: Operation, err: &ClientError) -> u64 {
        millis(self.next_pause(op, err))
    }

    pub fn retry_count(&self) -> u32 {
        self.state.retry_count()
    }

    /// Same configuration, counters reset.
    pub fn fresh(&self) -> Self {
        Self::new(self.policy.clone())
    }
}

impl From<RetryPolicy> for RetryStrategy {
    fn from(policy: RetryPolicy) -> Self {
        Self::new(policy)
    }
}

#[cfg(test)]
mod tests {
    use tablestore_api::ValueError;
    use tablestore_api::error::codes;

    use super::*;

    fn busy() -> ClientError {
        ClientError::service(codes::SERVER_BUSY, "server is busy", 503)
    }

    fn invalid() -> ClientError {
        ClientError::service(codes::PARAMETER_INVALID, "bad request", 400)
    }

    #[test]
    fn default_grants_max_retries_then_stops() {
        let policy = RetryPolicy::default_with(3, Duration::from_secs(10));
        let start = Instant::now();
        let mut state = policy.start_at(start);

        let mut windows = Vec::new();
        for _ in 0..3 {
            let window = state.base();
            let pause = policy.next_pause_at(&mut state, Operation::GetRow, &busy(), start);
            assert!(pause > Duration::ZERO);
            assert!(pause <= window.max(Duration::from_millis(1)));
            windows.push(window);
        }
        assert!(windows.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(
            policy.next_pause_at(&mut state, Operation::GetRow, &busy(), start),
            Duration::ZERO
        );
        assert_eq!(state.retry_count(), 3);
        assert!(state.is_exhausted_at(start));
    }

    #[test]
    fn backoff_window_doubles_up_to_ceiling() {
        let policy = RetryPolicy::default_with(20, Duration::from_secs(3600));
        let start = Instant::now();
        let mut state = policy.start_at(start);
        assert_eq!(state.base(), Duration::from_millis(DEFAULT_INITIAL_BASE_MS));
        for _ in 0..20 {
            policy.next_pause_at(&mut state, Operation::GetRange, &busy(), start);
        }
        assert_eq!(state.base(), Duration::from_millis(DEFAULT_MAX_BASE_MS));
    }

    #[test]
    fn deadline_elapsed_stops_regardless_of_count() {
        let policy = RetryPolicy::default_with(10, Duration::from_millis(50));
        let start = Instant::now();
        let mut state = policy.start_at(start);
        let later = start + Duration::from_millis(50);
        assert_eq!(
            policy.next_pause_at(&mut state, Operation::GetRow, &busy(), later),
            Duration::ZERO
        );
        assert_eq!(state.retry_count(), 0);
    }

    #[test]
    fn pause_never_exceeds_remaining_time() {
        let policy = RetryPolicy::custom(CustomRetryConfig {
            max_retries: 5,
            timeout: Duration::from_millis(100),
            initial_base: Duration::from_millis(1_000),
            ..Default::default()
        });
        let start = Instant::now();
        let mut state = policy.start_at(start);
        let now = start + Duration::from_millis(90);
        let pause = policy.next_pause_at(&mut state, Operation::GetRow, &busy(), now);
        assert!(pause > Duration::ZERO);
        assert!(pause <= Duration::from_millis(10));
    }

    #[test]
    fn default_pause_is_capped_by_remaining_time() {
        let policy = RetryPolicy::default_with(5, Duration::from_millis(100));
        let start = Instant::now();
        let mut state = policy.start_at(start);
        for _ in 0..3 {
            policy.next_pause_at(&mut state, Operation::GetRow, &busy(), start);
        }
        assert!(state.base() > Duration::from_millis(5));

        let now = start + Duration::from_millis(95);
        for _ in 0..50 {
            let mut attempt = state.clone();
            let pause = policy.next_pause_at(&mut attempt, Operation::GetRow, &busy(), now);
            assert!(pause > Duration::ZERO);
            assert!(pause <= Duration::from_millis(5), "{pause:?}");
        }
    }

    #[test]
    fn under_a_millisecond_left_counts_as_deadline_reached() {
        let policy = RetryPolicy::default_with(5, Duration::from_millis(50));
        let start = Instant::now();
        let mut state = policy.start_at(start);
        let now = start + Duration::from_micros(49_500);
        assert!(state.is_exhausted_at(now));
        assert_eq!(
            policy.next_pause_at(&mut state, Operation::GetRow, &busy(), now),
            Duration::ZERO
        );
        assert_eq!(state.retry_count(), 0);
    }

    #[test]
    fn initial_window_never_exceeds_ceiling() {
        let policy = RetryPolicy::custom(CustomRetryConfig {
            max_base: Duration::from_millis(5),
            ..Default::default()
        });
        let start = Instant::now();
        let mut state = policy.start_at(start);
        assert_eq!(state.base(), Duration::from_millis(5));
        let pause = policy.next_pause_at(&mut state, Operation::GetRow, &busy(), start);
        assert!(pause <= Duration::from_millis(5));
        assert_eq!(state.base(), Duration::from_millis(5));
    }

    #[test]
    fn local_errors_are_never_retried_even_by_always() {
        let mismatch = ClientError::Local(ValueError::SchemaMismatch("id vs pk".into()));
        for policy in [
            RetryPolicy::always(3),
            RetryPolicy::default(),
            RetryPolicy::custom(CustomRetryConfig {
                retry_writes_on_server_error: true,
                ..Default::default()
            }),
        ] {
            assert!(!policy.should_retry(Operation::GetRange, &mismatch));
            let mut state = policy.start();
            assert_eq!(
                policy.next_pause(&mut state, Operation::GetRange, &mismatch),
                Duration::ZERO
            );
            assert_eq!(state.retry_count(), 0);
        }
    }

    #[test]
    fn non_retryable_error_yields_zero_without_counting() {
        let policy = RetryPolicy::default();
        let mut state = policy.start();
        assert_eq!(
            policy.next_pause(&mut state, Operation::GetRow, &invalid()),
            Duration::ZERO
        );
        assert_eq!(state.retry_count(), 0);
    }

    #[test]
    fn always_retry_ignores_classification() {
        let policy = RetryPolicy::always(2);
        let start = Instant::now();
        let mut state = policy.start_at(start);
        assert!(policy.should_retry(Operation::PutRow, &invalid()));
        for _ in 0..2 {
            let window = state.base();
            let pause = policy.next_pause_at(&mut state, Operation::PutRow, &invalid(), start);
            assert!(pause >= window / 2 && pause <= window);
        }
        assert_eq!(
            policy.next_pause_at(&mut state, Operation::PutRow, &invalid(), start),
            Duration::ZERO
        );
        assert!(state.deadline().is_none());
    }

    #[test]
    fn custom_opt_in_retries_writes_on_server_errors() {
        let timeout = ClientError::service(codes::TIMEOUT, "timed out", 500);
        let strict = RetryPolicy::custom(CustomRetryConfig::default());
        assert!(!strict.should_retry(Operation::PutRow, &timeout));

        let relaxed = RetryPolicy::custom(CustomRetryConfig {
            retry_writes_on_server_error: true,
            ..Default::default()
        });
        assert!(relaxed.should_retry(Operation::PutRow, &timeout));
        assert!(!RetryPolicy::default().should_retry(Operation::PutRow, &timeout));
    }

    #[test]
    fn strategy_fresh_resets_count_keeps_config() {
        let mut strategy = RetryStrategy::new(RetryPolicy::default_with(1, Duration::from_secs(10)));
        assert!(strategy.next_pause_millis(Operation::GetRow, &busy()) > 0);
        assert_eq!(strategy.next_pause_millis(Operation::GetRow, &busy()), 0);
        assert_eq!(strategy.retry_count(), 1);

        let fresh = strategy.fresh();
        assert_eq!(fresh.retry_count(), 0);
        assert_eq!(fresh.policy(), strategy.policy());
    }
}
