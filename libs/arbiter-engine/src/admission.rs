//! Rate Limiter / Admission Gate
//!
//! Two bounds, both checked before any work reaches the dispatcher:
//! - per-user: at most `limit_per_window` admissions per sliding window
//! - global: at most `max_in_flight` evaluations running at once
//!
//! Rejection is decided entirely in-process; it never touches the execution
//! backend and never creates a submission record. Rejected attempts do not
//! consume window capacity, and neither do admitted requests that are handed
//! back through `refund` before any work was dispatched.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use arbiter_common::Config;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The user exhausted their window
    UserRateLimited,
    /// The global in-flight ceiling is reached
    Saturated,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::UserRateLimited => "user_rate_limited",
            RejectReason::Saturated => "saturated",
        }
    }
}

/// Held for the lifetime of one admitted evaluation; dropping it frees an in-flight slot
#[derive(Debug)]
pub struct AdmissionPermit {
    admitted_at: Instant,
    _slot: OwnedSemaphorePermit,
}

#[derive(Debug)]
pub enum Admission {
    Allow(AdmissionPermit),
    Reject {
        retry_after: Duration,
        reason: RejectReason,
    },
}

#[derive(Debug)]
pub struct AdmissionGate {
    limit_per_window: u32,
    window: Duration,
    max_in_flight: usize,
    in_flight: Arc<Semaphore>,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl AdmissionGate {
    /// `limit_per_window == 0` disables the per-user bound
    pub fn new(limit_per_window: u32, window: Duration, max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            limit_per_window,
            window,
            max_in_flight,
            in_flight: Arc::new(Semaphore::new(max_in_flight)),
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.rate_limit_per_window,
            Duration::from_secs(config.rate_limit_window_secs),
            config.max_in_flight,
        )
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admit or reject one attempt by `user_id`
    pub async fn admit(&self, user_id: &str) -> Admission {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let stamps = windows.entry(user_id.to_string()).or_default();

        while stamps
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            stamps.pop_front();
        }

        if self.limit_per_window > 0 && stamps.len() >= self.limit_per_window as usize {
            let retry_after = stamps
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            debug!(user_id, retry_after_ms = retry_after.as_millis() as u64, "Admission rejected: rate limited");
            return Admission::Reject {
                retry_after,
                reason: RejectReason::UserRateLimited,
            };
        }

        let slot = match Arc::clone(&self.in_flight).try_acquire_owned() {
            Ok(slot) => slot,
            Err(_) => {
                debug!(user_id, "Admission rejected: backend saturated");
                return Admission::Reject {
                    retry_after: Duration::from_secs(1),
                    reason: RejectReason::Saturated,
                };
            }
        };

        stamps.push_back(now);
        Admission::Allow(AdmissionPermit {
            admitted_at: now,
            _slot: slot,
        })
    }

    /// Give back an admission that never reached the backend
    ///
    /// Removes the permit's stamp from the user's window and frees its slot.
    pub async fn refund(&self, user_id: &str, permit: AdmissionPermit) {
        let mut windows = self.windows.lock().await;
        if let Some(stamps) = windows.get_mut(user_id) {
            if let Some(pos) = stamps.iter().rposition(|t| *t == permit.admitted_at) {
                stamps.remove(pos);
            }
            if stamps.is_empty() {
                windows.remove(user_id);
            }
        }
        debug!(user_id, "Admission refunded");
    }

    /// Evaluations currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.in_flight.available_permits()
    }

    /// Drop expired timestamps and forget users with none left
    pub async fn prune(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, stamps| {
            stamps.retain(|t| now.duration_since(*t) < self.window);
            !stamps.is_empty()
        });
        before - windows.len()
    }

    pub async fn tracked_users(&self) -> usize {
        self.windows.lock().await.len()
    }
}

/// Periodically prune idle user windows
pub fn spawn_prune_task(gate: Arc<AdmissionGate>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;
            let removed = gate.prune().await;
            if removed > 0 {
                info!(removed, "Pruned idle rate-limit windows");
            }
        }
    })
}
