use ahash::AHashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Request may proceed.
    Admitted,
    /// The source exhausted its window; `current` is the number of
    /// admissions still inside it.
    Limited { current: usize },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Per-source-IP sliding-window rate limiter.
///
/// Every source keeps a ledger of admission instants. `admit` prunes
/// entries that fell out of the window, rejects when the remainder has
/// reached the limit, and records the arrival otherwise, all under one
/// short lock. No more than `max_requests` admissions succeed for a
/// single IP within any interval of the window length; after a full
/// quiet window the source starts fresh.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    ledger: Mutex<AHashMap<IpAddr, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self { max_requests, window, ledger: Mutex::new(AHashMap::new()) }
    }

    pub fn admit(&self, ip: IpAddr) -> Admission {
        self.admit_at(ip, Instant::now())
    }

    fn admit_at(&self, ip: IpAddr, now: Instant) -> Admission {
        let mut ledger = self
            .ledger
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let arrivals = ledger.entry(ip).or_default();
        arrivals.retain(|t| now.saturating_duration_since(*t) < self.window);
        if arrivals.len() >= self.max_requests {
            return Admission::Limited { current: arrivals.len() };
        }
        arrivals.push(now);
        Admission::Admitted
    }
}
