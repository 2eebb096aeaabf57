use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Time source for lease arithmetic and for waits between attempts.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;

    async fn sleep(&self, duration: Duration);
}

/// Wall-clock milliseconds anchored at construction and advanced by the
/// tokio timer, so paused test runtimes move it forward too.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeClock {
    origin: Instant,
    origin_millis: u64,
}

impl RuntimeClock {
    pub fn new() -> Self {
        let origin_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        Self::starting_at(origin_millis)
    }

    pub fn starting_at(origin_millis: u64) -> Self {
        Self {
            origin: Instant::now(),
            origin_millis,
        }
    }
}

impl Default for RuntimeClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for RuntimeClock {
    fn now_millis(&self) -> u64 {
        let elapsed = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.origin_millis.saturating_add(elapsed)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn advances_with_paused_runtime() {
        let clock = RuntimeClock::starting_at(1_000);
        assert_eq!(clock.now_millis(), 1_000);

        clock.sleep(Duration::from_millis(250)).await;
        assert_eq!(clock.now_millis(), 1_250);
    }
}
