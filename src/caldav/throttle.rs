//! Request pacing.
//!
//! Some servers rate-limit aggressively or serve searches from an index that
//! lags behind writes. A [`Throttle`] is handed to the HTTP client when it is
//! built and is consulted before every request.

use std::time::Duration;

use tracing::trace;

/// What a request does, for pacing purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Read,
    Write,
    Search,
}

/// Pacing strategy consulted before each request.
pub trait Throttle {
    /// Block as long as needed before a request of this kind.
    fn before_request(&self, kind: RequestKind);
}

/// No pacing at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl Throttle for NoDelay {
    fn before_request(&self, _kind: RequestKind) {}
}

/// Sleep a fixed time before each request, with a separate delay for searches.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FixedDelay {
    pub request: Duration,
    pub search: Duration,
}

impl FixedDelay {
    pub fn new(request: Duration, search: Duration) -> Self {
        Self { request, search }
    }

    /// Delay applied before a request of this kind.
    pub fn delay_for(&self, kind: RequestKind) -> Duration {
        match kind {
            RequestKind::Search => self.request + self.search,
            RequestKind::Read | RequestKind::Write => self.request,
        }
    }
}

impl Throttle for FixedDelay {
    fn before_request(&self, kind: RequestKind) {
        let delay = self.delay_for(kind);
        if !delay.is_zero() {
            trace!(?kind, ?delay, "Pacing request");
            std::thread::sleep(delay);
        }
    }
}

/// Pick a strategy from the configured delays.
pub fn from_delays(request_delay: Duration, search_delay: Duration) -> Box<dyn Throttle> {
    if request_delay.is_zero() && search_delay.is_zero() {
        Box::new(NoDelay)
    } else {
        Box::new(FixedDelay::new(request_delay, search_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn search_delay_adds_to_request_delay() {
        let throttle = FixedDelay::new(Duration::from_millis(5), Duration::from_millis(20));
        assert_eq!(throttle.delay_for(RequestKind::Read), Duration::from_millis(5));
        assert_eq!(throttle.delay_for(RequestKind::Write), Duration::from_millis(5));
        assert_eq!(throttle.delay_for(RequestKind::Search), Duration::from_millis(25));
    }

    #[test]
    fn fixed_delay_sleeps() {
        let throttle = FixedDelay::new(Duration::from_millis(10), Duration::ZERO);
        let started = Instant::now();
        throttle.before_request(RequestKind::Read);
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn zero_delays_pick_no_delay() {
        let started = Instant::now();
        let throttle = from_delays(Duration::ZERO, Duration::ZERO);
        throttle.before_request(RequestKind::Search);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
