//! Time-bounded cache for slow sensor reads.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ReadingCache<T: Copy> {
    ttl: Duration,
    entry: Option<(Instant, T)>,
}

impl<T: Copy> ReadingCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    /// Cached value if it was stored less than `ttl` before `now`.
    pub fn get(&self, now: Instant) -> Option<T> {
        match self.entry {
            Some((at, v)) if now.saturating_duration_since(at) < self.ttl => Some(v),
            _ => None,
        }
    }

    pub fn store(&mut self, now: Instant, value: T) -> T {
        self.entry = Some((now, value));
        value
    }

    pub fn get_or_refresh(&mut self, now: Instant, refresh: impl FnOnce() -> T) -> T {
        match self.get(now) {
            Some(v) => v,
            None => self.store(now, refresh()),
        }
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_after_ttl() {
        let t0 = Instant::now();
        let mut c = ReadingCache::new(Duration::from_secs(10));
        assert_eq!(c.get_or_refresh(t0, || 1), 1);
        assert_eq!(c.get_or_refresh(t0 + Duration::from_secs(9), || 2), 1);
        assert_eq!(c.get_or_refresh(t0 + Duration::from_secs(10), || 3), 3);
        c.invalidate();
        assert_eq!(c.get(t0 + Duration::from_secs(10)), None);
    }
}
