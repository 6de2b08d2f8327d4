use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;

use crate::clock::Clock;
use crate::error::{ConfigError, GatewayError};
use crate::metrics::{RATE_LIMIT_ADMITTED, RATE_LIMIT_REJECTED, TRACKED_IDENTITIES};

// Named endpoint families, each with its own limiter
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    Chat,
    Quiz,
    Process,
}

impl Policy {
    pub const ALL: [Policy; 3] = [Policy::Chat, Policy::Quiz, Policy::Process];

    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::Chat => "chat",
            Policy::Quiz => "quiz",
            Policy::Process => "process",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// At most `limit` admissions inside any trailing `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    limit: u32,
    window: Duration,
}

impl LimiterConfig {
    pub fn new(limit: u32, window: Duration) -> Result<Self, ConfigError> {
        if limit == 0 {
            return Err(ConfigError::InvalidLimiter("limit must be greater than zero".into()));
        }
        if window.is_zero() {
            return Err(ConfigError::InvalidLimiter("window must be greater than zero".into()));
        }
        Ok(Self { limit, window })
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

// Accepted timestamps for one identity, oldest first
#[derive(Debug, Default)]
pub struct RateWindow {
    hits: VecDeque<Instant>,
}

impl RateWindow {
    // Drop the prefix strictly older than now - window
    fn purge(&mut self, now: Instant, window: Duration) {
        let Some(cutoff) = now.checked_sub(window) else {
            return;
        };
        while self.hits.front().is_some_and(|&oldest| oldest < cutoff) {
            self.hits.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Outcome of a successful admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub limit: u32,
    pub remaining: u32,
}

/// Sliding-window limiter for one policy.
///
/// Each identity gets its own window. Purge, check and append for an
/// identity run under the map's entry guard, so concurrent events for the
/// same identity can never be admitted past `limit`.
#[derive(Debug)]
pub struct RateLimiter {
    policy: &'static str,
    config: LimiterConfig,
    windows: DashMap<String, RateWindow>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(policy: &'static str, config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            config,
            windows: DashMap::new(),
            clock,
        }
    }

    pub fn config(&self) -> LimiterConfig {
        self.config
    }

    /// Admit or reject one event for `identity`. Rejections record nothing.
    pub fn check(&self, identity: &str) -> Result<Admission, GatewayError> {
        let now = self.clock.now();
        let window = self.config.window;
        let limit = self.config.limit as usize;

        let mut created = false;
        let mut entry = match self.windows.entry(identity.to_string()) {
            Entry::Occupied(o) => o.into_ref(),
            Entry::Vacant(v) => {
                created = true;
                v.insert(RateWindow::default())
            }
        };
        entry.purge(now, window);

        if entry.len() >= limit {
            // The next slot frees once the oldest hit ages out
            let retry_after = entry
                .hits
                .front()
                .map(|&oldest| {
                    oldest
                        .checked_add(window)
                        .map_or(window, |free_at| free_at.saturating_duration_since(now))
                })
                .unwrap_or_default();
            drop(entry);
            RATE_LIMIT_REJECTED.with_label_values(&[self.policy]).inc();
            return Err(GatewayError::RateLimitExceeded {
                policy: self.policy,
                retry_after,
            });
        }

        entry.hits.push_back(now);
        let remaining = (limit - entry.len()) as u32;
        drop(entry);

        // len() takes every shard lock, so only after the guard is gone
        if created {
            TRACKED_IDENTITIES
                .with_label_values(&[self.policy])
                .set(self.windows.len() as f64);
        }
        RATE_LIMIT_ADMITTED.with_label_values(&[self.policy]).inc();
        Ok(Admission {
            limit: self.config.limit,
            remaining,
        })
    }

    /// Purge every window and evict the ones left empty.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let window = self.config.window;
        let before = self.windows.len();
        self.windows.retain(|_, w| {
            w.purge(now, window);
            !w.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    #[cfg(test)]
    fn hits(&self, identity: &str) -> Option<Vec<Instant>> {
        self.windows
            .get(identity)
            .map(|w| w.hits.iter().copied().collect())
    }
}

// Per-policy configuration handed to the registry at startup
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub chat: LimiterConfig,
    pub quiz: LimiterConfig,
    pub process: LimiterConfig,
}

impl Limits {
    pub fn get(&self, policy: Policy) -> LimiterConfig {
        match policy {
            Policy::Chat => self.chat,
            Policy::Quiz => self.quiz,
            Policy::Process => self.process,
        }
    }
}

/// One independent limiter per policy, built once and shared via AppState.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    chat: RateLimiter,
    quiz: RateLimiter,
    process: RateLimiter,
}

impl RateLimiterRegistry {
    pub fn new(limits: Limits, clock: Arc<dyn Clock>) -> Self {
        Self {
            chat: RateLimiter::new(Policy::Chat.as_str(), limits.get(Policy::Chat), Arc::clone(&clock)),
            quiz: RateLimiter::new(Policy::Quiz.as_str(), limits.get(Policy::Quiz), Arc::clone(&clock)),
            process: RateLimiter::new(Policy::Process.as_str(), limits.get(Policy::Process), clock),
        }
    }

    pub fn get(&self, policy: Policy) -> &RateLimiter {
        match policy {
            Policy::Chat => &self.chat,
            Policy::Quiz => &self.quiz,
            Policy::Process => &self.process,
        }
    }

    pub fn check(&self, policy: Policy, identity: &str) -> Result<Admission, GatewayError> {
        self.get(policy).check(identity)
    }

    // Sweep all policies, refreshing the identity gauges
    pub fn sweep(&self) -> usize {
        Policy::ALL
            .iter()
            .map(|&policy| {
                let limiter = self.get(policy);
                let evicted = limiter.sweep();
                TRACKED_IDENTITIES
                    .with_label_values(&[policy.as_str()])
                    .set(limiter.tracked() as f64);
                evicted
            })
            .sum()
    }

    pub fn tracked(&self, policy: Policy) -> usize {
        self.get(policy).tracked()
    }
}

// Background eviction of empty windows
pub async fn sweeper(registry: Arc<RateLimiterRegistry>, every: Duration) {
    let mut interval = interval(every);

    tracing::info!(interval = ?every, "rate limit sweeper started");

    loop {
        interval.tick().await;

        let evicted = registry.sweep();
        if evicted > 0 {
            let tracked: usize = Policy::ALL.iter().map(|&p| registry.tracked(p)).sum();
            tracing::debug!(evicted, tracked, "evicted idle rate limit windows");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Barrier;
    use std::thread;

    fn limiter(limit: u32, window_secs: u64) -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new());
        let config = LimiterConfig::new(limit, Duration::from_secs(window_secs)).unwrap();
        let limiter = RateLimiter::new("test", config, clock.clone());
        (clock, limiter)
    }

    #[test]
    fn config_rejects_zero_limit_and_window() {
        assert!(LimiterConfig::new(0, Duration::from_secs(60)).is_err());
        assert!(LimiterConfig::new(5, Duration::ZERO).is_err());
        let config = LimiterConfig::new(5, Duration::from_secs(60)).unwrap();
        assert_eq!(config.limit(), 5);
        assert_eq!(config.window(), Duration::from_secs(60));
    }

    #[test]
    fn sixth_event_in_window_is_rejected() {
        let (clock, limiter) = limiter(5, 60);

        for i in 0..5 {
            let admission = limiter.check("alice").expect("within limit");
            assert_eq!(admission.remaining, 4 - i);
            clock.advance(Duration::from_secs(1));
        }

        let err = limiter.check("alice").unwrap_err();
        assert!(matches!(err, GatewayError::RateLimitExceeded { policy: "test", .. }));
    }

    #[test]
    fn admits_again_once_oldest_ages_out() {
        let (clock, limiter) = limiter(5, 60);

        limiter.check("alice").unwrap();
        clock.advance(Duration::from_secs(10));
        for _ in 0..4 {
            limiter.check("alice").unwrap();
        }
        assert!(limiter.check("alice").is_err());

        // Exactly at the boundary the oldest hit is still in the window
        clock.advance(Duration::from_secs(50));
        assert!(limiter.check("alice").is_err());

        clock.advance(Duration::from_millis(1));
        assert!(limiter.check("alice").is_ok());
        assert_eq!(limiter.hits("alice").unwrap().len(), 5);
    }

    #[test]
    fn retry_after_counts_down_to_oldest_expiry() {
        let (clock, limiter) = limiter(2, 60);

        limiter.check("bob").unwrap();
        clock.advance(Duration::from_secs(15));
        limiter.check("bob").unwrap();
        clock.advance(Duration::from_secs(5));

        match limiter.check("bob") {
            Err(GatewayError::RateLimitExceeded { retry_after, .. }) => {
                assert_eq!(retry_after, Duration::from_secs(40));
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
    }

    #[test]
    fn huge_window_rejects_without_overflow() {
        let clock = Arc::new(ManualClock::new());
        let window = Duration::from_secs(u64::MAX);
        let limiter = RateLimiter::new("test", LimiterConfig::new(1, window).unwrap(), clock.clone());

        limiter.check("a").unwrap();
        clock.advance(Duration::from_secs(5));
        match limiter.check("a") {
            Err(GatewayError::RateLimitExceeded { retry_after, .. }) => {
                assert_eq!(retry_after, window);
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
        assert_eq!(limiter.hits("a").unwrap().len(), 1);
    }

    #[test]
    fn new_identities_update_tracked_gauge_on_admission() {
        let clock = Arc::new(ManualClock::new());
        let config = LimiterConfig::new(2, Duration::from_secs(60)).unwrap();
        let limiter = RateLimiter::new("gauge-test", config, clock);
        let gauge = TRACKED_IDENTITIES.with_label_values(&["gauge-test"]);

        limiter.check("one").unwrap();
        assert_eq!(gauge.get(), 1.0);
        limiter.check("two").unwrap();
        limiter.check("two").unwrap();
        assert_eq!(gauge.get(), 2.0);
    }

    #[test]
    fn identities_do_not_share_state() {
        let (_clock, limiter) = limiter(3, 60);

        for _ in 0..3 {
            limiter.check("a").unwrap();
        }
        assert!(limiter.check("a").is_err());

        for _ in 0..3 {
            limiter.check("b").unwrap();
        }
        assert_eq!(limiter.tracked(), 2);
    }

    #[test]
    fn rejection_leaves_window_untouched() {
        let (clock, limiter) = limiter(2, 60);

        limiter.check("carol").unwrap();
        clock.advance(Duration::from_secs(1));
        limiter.check("carol").unwrap();
        let before = limiter.hits("carol").unwrap();

        for _ in 0..3 {
            assert!(limiter.check("carol").is_err());
        }
        assert_eq!(limiter.hits("carol").unwrap(), before);
    }

    #[test]
    fn concurrent_burst_admits_exactly_limit() {
        const LIMIT: u32 = 10;
        const THREADS: usize = 64;

        let (_clock, limiter) = limiter(LIMIT, 60);
        let barrier = Barrier::new(THREADS);
        let (limiter, barrier) = (&limiter, &barrier);

        let admitted: usize = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(move || {
                        barrier.wait();
                        limiter.check("shared").is_ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(admitted, LIMIT as usize);
        assert_eq!(limiter.hits("shared").unwrap().len(), LIMIT as usize);
    }

    #[test]
    fn sweep_evicts_only_idle_windows() {
        let (clock, limiter) = limiter(5, 60);

        limiter.check("idle").unwrap();
        clock.advance(Duration::from_secs(30));
        limiter.check("busy").unwrap();
        clock.advance(Duration::from_secs(31));

        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked(), 1);
        assert!(limiter.hits("idle").is_none());
        assert_eq!(limiter.hits("busy").unwrap().len(), 1);
    }

    #[test]
    fn registry_keeps_policies_independent() {
        let clock = Arc::new(ManualClock::new());
        let limits = Limits {
            chat: LimiterConfig::new(30, Duration::from_secs(60)).unwrap(),
            quiz: LimiterConfig::new(10, Duration::from_secs(60)).unwrap(),
            process: LimiterConfig::new(1, Duration::from_secs(60)).unwrap(),
        };
        let registry = RateLimiterRegistry::new(limits, clock.clone());

        registry.check(Policy::Process, "key").unwrap();
        assert!(registry.check(Policy::Process, "key").is_err());
        assert!(registry.check(Policy::Chat, "key").is_ok());
        assert_eq!(registry.get(Policy::Quiz).config().limit(), 10);

        clock.advance(Duration::from_secs(61));
        assert_eq!(registry.sweep(), 2);
        assert_eq!(registry.tracked(Policy::Chat), 0);
    }

    #[test]
    fn policy_parses_lowercase_names() {
        let p: Policy = serde_json::from_str("\"quiz\"").unwrap();
        assert_eq!(p, Policy::Quiz);
        assert_eq!(Policy::Process.to_string(), "process");
        assert!(serde_json::from_str::<Policy>("\"upload\"").is_err());
    }
}
