use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Runs tasks one at a time, keeping at least `spacing` between the end of one
/// task and the start of the next. The first task starts immediately.
#[derive(Debug)]
pub struct PacedQueue {
    spacing: Duration,
    last_finished: Option<Instant>,
}

impl PacedQueue {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last_finished: None,
        }
    }

    pub async fn run<F, Fut, T>(&mut self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(last) = self.last_finished {
            let next = last + self.spacing;
            if next > Instant::now() {
                log::debug!("Pacing: waiting {:?}", next - Instant::now());
            }
            sleep_until(next).await;
        }
        let output = task().await;
        self.last_finished = Some(Instant::now());
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_task_is_immediate_then_spaced() {
        let mut queue = PacedQueue::new(Duration::from_secs(5));
        let origin = Instant::now();
        let mut starts = Vec::new();

        for _ in 0..3 {
            let started = queue.run(|| async { Instant::now() }).await;
            starts.push(started - origin);
        }

        assert_eq!(starts[0], Duration::ZERO);
        assert_eq!(starts[1], Duration::from_secs(5));
        assert_eq!(starts[2], Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spacing_counts_from_task_end() {
        let mut queue = PacedQueue::new(Duration::from_secs(5));
        let origin = Instant::now();

        queue
            .run(|| async { tokio::time::sleep(Duration::from_secs(3)).await })
            .await;
        let second = queue.run(|| async { Instant::now() }).await;

        assert_eq!(second - origin, Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_when_spacing_already_elapsed() {
        let mut queue = PacedQueue::new(Duration::from_secs(2));
        queue.run(|| async {}).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        let before = Instant::now();
        let started = queue.run(|| async { Instant::now() }).await;
        assert_eq!(started, before);
    }
}
