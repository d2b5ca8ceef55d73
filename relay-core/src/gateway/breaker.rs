//! Hystrix-style circuit breaker (§4.4.3): trips open once a rolling window
//! sees enough volume and too high an error rate, then stays open for a
//! sleep window before allowing a single probe request through.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub timeout: Duration,
    pub max_concurrent_requests: u32,
    pub request_volume_threshold: u32,
    pub sleep_window: Duration,
    pub error_percent_threshold: u8,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfig {
            timeout: Duration::from_millis(1000),
            max_concurrent_requests: 10,
            request_volume_threshold: 20,
            sleep_window: Duration::from_millis(5000),
            error_percent_threshold: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Outcome {
    at: Instant,
    failed: bool,
}

struct Inner {
    state: State,
    opened_at: Option<Instant>,
    window: VecDeque<Outcome>,
    in_flight: u32,
}

/// One breaker instance per gated API/service. Cloning is cheap (the shared
/// state lives behind the inner mutex); hand out `Arc<CircuitBreaker>` to
/// concurrent callers.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    Allow,
    RejectOpen,
    RejectConcurrency,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        CircuitBreaker {
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                opened_at: None,
                window: VecDeque::new(),
                in_flight: 0,
            }),
        }
    }

    /// Called before dispatching a request. Must be paired with exactly one
    /// `record_success`/`record_failure` unless it returned a rejection.
    pub fn try_admit(&self) -> Admission {
        let mut inner = self.inner.lock().unwrap();
        self.prune(&mut inner);

        if inner.state == State::Open {
            let opened_at = inner.opened_at.unwrap_or_else(Instant::now);
            if opened_at.elapsed() >= self.config.sleep_window {
                inner.state = State::HalfOpen;
            } else {
                return Admission::RejectOpen;
            }
        }

        if inner.in_flight >= self.config.max_concurrent_requests {
            return Admission::RejectConcurrency;
        }

        inner.in_flight += 1;
        Admission::Allow
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        inner.window.push_back(Outcome { at: Instant::now(), failed: false });
        if inner.state == State::HalfOpen {
            inner.state = State::Closed;
            inner.opened_at = None;
            inner.window.clear();
        }
        self.evaluate(&mut inner);
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        inner.window.push_back(Outcome { at: Instant::now(), failed: true });
        if inner.state == State::HalfOpen {
            inner.state = State::Open;
            inner.opened_at = Some(Instant::now());
            return;
        }
        self.evaluate(&mut inner);
    }

    fn prune(&self, inner: &mut Inner) {
        let cutoff = Instant::now() - self.config.timeout.max(Duration::from_secs(10));
        while matches!(inner.window.front(), Some(o) if o.at < cutoff) {
            inner.window.pop_front();
        }
    }

    fn evaluate(&self, inner: &mut Inner) {
        if inner.state != State::Closed {
            return;
        }
        let total = inner.window.len() as u32;
        if total < self.config.request_volume_threshold {
            return;
        }
        let failed = inner.window.iter().filter(|o| o.failed).count() as u32;
        let error_pct = (failed * 100) / total;
        if error_pct >= self.config.error_percent_threshold as u32 {
            inner.state = State::Open;
            inner.opened_at = Some(Instant::now());
        }
    }
}
