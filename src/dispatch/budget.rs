//! Fixed-window request budget shared by every dispatch worker.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct Window {
    start: Instant,
    used: u32,
}

/// At most `max_per_window` request starts per `window_length`.
///
/// The check and the increment happen under one lock. A caller that finds
/// the window full releases the lock before sleeping until the window ends.
#[derive(Debug)]
pub struct RateBudget {
    max_per_window: u32,
    window_length: Duration,
    window: Mutex<Window>,
}

impl RateBudget {
    pub fn new(max_per_window: u32, window_length: Duration) -> Self {
        Self {
            max_per_window: max_per_window.max(1),
            window_length,
            window: Mutex::new(Window {
                start: Instant::now(),
                used: 0,
            }),
        }
    }

    pub fn max_per_window(&self) -> u32 {
        self.max_per_window
    }

    pub fn window_length(&self) -> Duration {
        self.window_length
    }

    /// Take one slot, waiting for the next window if this one is spent.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();

                if now.duration_since(window.start) >= self.window_length {
                    window.start = now;
                    window.used = 0;
                }

                if window.used < self.max_per_window {
                    window.used += 1;
                    return;
                }

                (window.start + self.window_length).saturating_duration_since(now)
            };

            debug!("Rate budget exhausted, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Slots left in the current window.
    pub async fn remaining(&self) -> u32 {
        let window = self.window.lock().await;
        if window.start.elapsed() >= self.window_length {
            self.max_per_window
        } else {
            self.max_per_window - window.used
        }
    }
}
