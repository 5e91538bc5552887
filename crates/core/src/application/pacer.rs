use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Spaces consecutive ESP create calls inside one pass so a burst of small
/// segments does not trip the minute limit on its own.
#[derive(Debug)]
pub struct Pacer {
    min_interval: Duration,
    last_call: Option<Instant>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: None,
        }
    }

    /// Wait until at least `min_interval` has passed since the previous
    /// call. The first call never waits.
    pub async fn pace(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        self.last_call = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_does_not_wait() {
        let mut pacer = Pacer::new(Duration::from_millis(1_500));
        let before = Instant::now();
        pacer.pace().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_waits_out_the_interval() {
        let mut pacer = Pacer::new(Duration::from_millis(1_500));
        let start = Instant::now();
        pacer.pace().await;
        pacer.pace().await;
        assert!(start.elapsed() >= Duration::from_millis(1_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_time_counts_toward_the_interval() {
        let mut pacer = Pacer::new(Duration::from_millis(1_500));
        let start = Instant::now();
        pacer.pace().await;
        tokio::time::advance(Duration::from_millis(1_000)).await;
        pacer.pace().await;
        // Only the remaining 500ms should have been slept.
        assert_eq!(start.elapsed(), Duration::from_millis(1_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_never_waits() {
        let mut pacer = Pacer::new(Duration::ZERO);
        let start = Instant::now();
        pacer.pace().await;
        pacer.pace().await;
        pacer.pace().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
