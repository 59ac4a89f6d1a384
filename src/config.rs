//! Limiter configuration.
//!
//! [`Limits`] is a plain value; [`LiveLimits`] is the shared handle a limiter reads on
//! every decision, so operators can tighten or relax limits without rebuilding it.
//! Reads are lock-free through `arc-swap`; the `rwlock-limits` feature swaps in a
//! `std::sync::RwLock`.

use std::sync::Arc;
use std::time::Duration;

#[cfg(not(feature = "rwlock-limits"))]
use arc_swap::ArcSwap;
#[cfg(feature = "rwlock-limits")]
use std::sync::RwLock;

/// Default number of admitted actions per client inside one window.
pub const MAX_ACTIONS_PER_MINUTE: u32 = 50;
/// Default window length in milliseconds.
pub const WINDOW_MS: i64 = 60_000;

/// Threshold and window length shared by every client of a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    max_actions: u32,
    window_ms: i64,
}

impl Default for Limits {
    fn default() -> Self {
        Self { max_actions: MAX_ACTIONS_PER_MINUTE, window_ms: WINDOW_MS }
    }
}

impl Limits {
    pub fn builder() -> LimitsBuilder {
        LimitsBuilder::default()
    }

    /// Maximum admitted actions per window.
    pub fn max_actions(&self) -> u32 {
        self.max_actions
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms as u64)
    }
}

/// Shared, replaceable [`Limits`]. Clones observe each other's updates.
///
/// A decision takes one snapshot up front; an update never changes a decision
/// already in flight.
#[derive(Debug, Clone)]
pub struct LiveLimits {
    #[cfg(not(feature = "rwlock-limits"))]
    current: Arc<ArcSwap<Limits>>,
    #[cfg(feature = "rwlock-limits")]
    current: Arc<RwLock<Limits>>,
}

impl LiveLimits {
    pub fn new(limits: Limits) -> Self {
        #[cfg(not(feature = "rwlock-limits"))]
        let current = Arc::new(ArcSwap::from_pointee(limits));
        #[cfg(feature = "rwlock-limits")]
        let current = Arc::new(RwLock::new(limits));
        Self { current }
    }

    /// Snapshot of the limits in force.
    pub fn load(&self) -> Limits {
        #[cfg(not(feature = "rwlock-limits"))]
        {
            **self.current.load()
        }
        #[cfg(feature = "rwlock-limits")]
        {
            *self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }

    pub fn store(&self, limits: Limits) {
        #[cfg(not(feature = "rwlock-limits"))]
        self.current.store(Arc::new(limits));
        #[cfg(feature = "rwlock-limits")]
        {
            *self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = limits;
        }
    }

    /// Derive new limits from the current ones and install them, returning what was
    /// installed. Concurrent updates are applied one after another, never lost; `f`
    /// may run more than once.
    pub fn update(&self, mut f: impl FnMut(Limits) -> Limits) -> Limits {
        #[cfg(not(feature = "rwlock-limits"))]
        {
            let mut next = self.load();
            self.current.rcu(|current| {
                next = f(**current);
                next
            });
            next
        }
        #[cfg(feature = "rwlock-limits")]
        {
            let mut current = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            *current = f(*current);
            *current
        }
    }
}

impl Default for LiveLimits {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

/// Errors returned by [`LimitsBuilder::build`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// `max_actions` must be > 0.
    #[error("max_actions must be > 0 (got {0})")]
    InvalidMaxActions(u32),
    /// The window must be at least one millisecond and fit in an `i64`.
    #[error("window must be between 1ms and i64::MAX ms (got {0:?})")]
    InvalidWindow(Duration),
    /// `CompareAndSet` needs at least one attempt.
    #[error("compare-and-set max_attempts must be > 0")]
    InvalidAttempts,
}

/// Builder for [`Limits`] starting from the 50-per-minute defaults.
#[derive(Debug, Clone)]
pub struct LimitsBuilder {
    max_actions: u32,
    window: Duration,
}

impl Default for LimitsBuilder {
    fn default() -> Self {
        Self {
            max_actions: MAX_ACTIONS_PER_MINUTE,
            window: Duration::from_millis(WINDOW_MS as u64),
        }
    }
}

impl LimitsBuilder {
    pub fn max_actions(mut self, max_actions: u32) -> Self {
        self.max_actions = max_actions;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn build(self) -> Result<Limits, BuildError> {
        if self.max_actions == 0 {
            return Err(BuildError::InvalidMaxActions(0));
        }
        let window_ms = i64::try_from(self.window.as_millis())
            .map_err(|_| BuildError::InvalidWindow(self.window))?;
        if window_ms == 0 {
            return Err(BuildError::InvalidWindow(self.window));
        }
        Ok(Limits { max_actions: self.max_actions, window_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fifty_per_minute() {
        let limits = Limits::default();
        assert_eq!(limits.max_actions(), 50);
        assert_eq!(limits.window_ms(), 60_000);
        assert_eq!(limits.window(), Duration::from_secs(60));
        assert_eq!(Limits::builder().build().unwrap(), limits);
    }

    #[test]
    fn builder_rejects_zero_threshold() {
        let err = Limits::builder().max_actions(0).build();
        assert_eq!(err, Err(BuildError::InvalidMaxActions(0)));
    }

    #[test]
    fn builder_rejects_sub_millisecond_window() {
        let err = Limits::builder().window(Duration::from_micros(500)).build();
        assert!(matches!(err, Err(BuildError::InvalidWindow(_))));
    }

    fn raised(limits: Limits) -> Limits {
        Limits { max_actions: limits.max_actions + 1, ..limits }
    }

    #[test]
    fn live_limits_are_shared_between_clones() {
        let live = LiveLimits::default();
        let other = live.clone();
        let tight = Limits::builder().max_actions(1).build().unwrap();
        live.store(tight);
        assert_eq!(other.load(), tight);
        assert_eq!(other.update(raised).max_actions(), 2);
        assert_eq!(live.load().max_actions(), 2);
        assert_eq!(live.load().window_ms(), WINDOW_MS);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let live = LiveLimits::new(Limits::builder().max_actions(1).build().unwrap());
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..250 {
                        live.update(raised);
                    }
                });
            }
        });
        assert_eq!(live.load().max_actions(), 1_001);
    }

    #[test]
    fn builder_accepts_custom_values() {
        let limits =
            Limits::builder().max_actions(3).window(Duration::from_secs(1)).build().unwrap();
        assert_eq!(limits.max_actions(), 3);
        assert_eq!(limits.window_ms(), 1_000);
    }
}
