//! Sliding-window limiter for outbound indexing API calls.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct LimiterState {
    /// Admission instants still inside the window, oldest first.
    admitted: VecDeque<Instant>,
    /// Admissions since the session started (or was last reset).
    total: u64,
}

/// Bounds calls to at most `max_calls_per_window` in any trailing window and,
/// optionally, to `max_session_calls` overall.
///
/// Check-and-increment happens under one lock, so the limiter can be shared
/// (behind an `Arc`) by concurrent callers.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls_per_window: usize,
    window: Duration,
    max_session_calls: Option<u64>,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_calls_per_window: config.max_calls_per_window.max(1),
            window: config.window,
            max_session_calls: config.max_session_calls,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Wait until a call is admitted.
    ///
    /// Every admission counts against the session total, whatever the outcome
    /// of the call it guards.
    pub async fn acquire(&self) -> Result<()> {
        loop {
            let wait = {
                let mut state = self.state.lock().await;

                if let Some(max) = self.max_session_calls {
                    if state.total >= max {
                        return Err(Error::RateLimitExceeded {
                            made: state.total,
                            allowed: max,
                        });
                    }
                }

                let now = Instant::now();
                while let Some(&oldest) = state.admitted.front() {
                    if now.duration_since(oldest) >= self.window {
                        state.admitted.pop_front();
                    } else {
                        break;
                    }
                }

                if state.admitted.len() < self.max_calls_per_window {
                    state.admitted.push_back(now);
                    state.total += 1;
                    return Ok(());
                }

                match state.admitted.front() {
                    Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            tracing::warn!(
                "At rate limit ({} calls per {:?}), waiting {:?}",
                self.max_calls_per_window,
                self.window,
                wait
            );
            tokio::time::sleep(wait).await;
        }
    }

    pub async fn total_calls(&self) -> u64 {
        self.state.lock().await.total
    }

    /// Calls left before the session ceiling; `None` when unlimited.
    pub async fn remaining_calls(&self) -> Option<u64> {
        let total = self.total_calls().await;
        self.max_session_calls.map(|max| max.saturating_sub(total))
    }

    pub async fn reset_session(&self) {
        let mut state = self.state.lock().await;
        state.total = 0;
    }
}
