//! Named countdown timers
//!
//! Each timer is an independent [`ScheduledTask`]. On expiry it announces
//! itself downstream and leaves the registry; cancelled timers leave
//! silently. Every registry mutation happens under one lock, and the expiry
//! path re-checks its own entry under that lock, so cancellation and
//! expiry never both take effect for one timer.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::events::{Event, EventSender};
use crate::schedule::ScheduledTask;

/// User-facing timer failures
///
/// The display strings are spoken back to the user as-is.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimerError {
    /// Zero, negative or non-finite duration
    #[error("Timer duration must be a positive number of minutes, got {0}.")]
    InvalidDuration(f64),

    /// A live timer already uses this name
    #[error("A timer named '{0}' already exists. Please cancel it first or choose a different name.")]
    AlreadyExists(String),

    /// No live timer has this name
    #[error("No timer named '{0}' found.")]
    NotFound(String),
}

#[derive(Debug)]
struct NamedTimer {
    id: u64,
    duration: Duration,
    started_at: Instant,
    task: ScheduledTask,
}

impl NamedTimer {
    fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.started_at.elapsed())
    }
}

type Registry = Arc<Mutex<HashMap<String, NamedTimer>>>;

/// Registry of named countdown timers
#[derive(Debug, Clone)]
pub struct TimerService {
    timers: Registry,
    announcements: EventSender,
    next_id: Arc<AtomicU64>,
}

impl TimerService {
    /// Create a service announcing expiries on `announcements`
    #[must_use]
    pub fn new(announcements: EventSender) -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            announcements,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start a countdown of `minutes`
    ///
    /// Without a name the timer is called "{minutes} minute timer".
    ///
    /// # Errors
    ///
    /// Returns `InvalidDuration` for non-positive durations and
    /// `AlreadyExists` if a live timer has the same name
    pub async fn set_timer(&self, minutes: f64, name: Option<&str>) -> Result<String, TimerError> {
        if !minutes.is_finite() || minutes <= 0.0 {
            return Err(TimerError::InvalidDuration(minutes));
        }
        let duration =
            Duration::try_from_secs_f64(minutes * 60.0).map_err(|_| TimerError::InvalidDuration(minutes))?;

        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => format!("{minutes} minute timer"),
        };

        let mut timers = self.timers.lock().await;
        if timers.contains_key(&name) {
            tracing::debug!(name, "duplicate timer rejected");
            return Err(TimerError::AlreadyExists(name));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let task = {
            let registry = Arc::clone(&self.timers);
            let announcements = self.announcements.clone();
            let name = name.clone();
            ScheduledTask::spawn(duration, move |token| {
                expire(registry, announcements, name, id, token)
            })
        };

        timers.insert(
            name.clone(),
            NamedTimer {
                id,
                duration,
                started_at: Instant::now(),
                task,
            },
        );

        tracing::info!(name, minutes, "timer set");
        Ok(format!("Timer '{name}' set for {minutes} minutes."))
    }

    /// Cancel a live timer without announcing it
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no live timer has this name
    pub async fn cancel_timer(&self, name: &str) -> Result<String, TimerError> {
        let removed = self.timers.lock().await.remove(name);
        let Some(timer) = removed else {
            return Err(TimerError::NotFound(name.to_string()));
        };

        timer.task.cancel();
        tracing::info!(name, "timer cancelled");
        Ok(format!("Timer '{name}' cancelled."))
    }

    /// Describe every live timer, oldest first
    ///
    /// Timers whose time has run out but whose expiry has not been processed
    /// yet are left out.
    pub async fn list_timers(&self) -> String {
        let timers = self.timers.lock().await;

        let mut live: Vec<(&String, &NamedTimer)> = timers
            .iter()
            .filter(|(_, timer)| !timer.remaining().is_zero())
            .collect();
        live.sort_by_key(|(_, timer)| timer.id);

        if live.is_empty() {
            return "No active timers.".to_string();
        }

        let entries: Vec<String> = live
            .iter()
            .map(|(name, timer)| {
                format!(
                    "'{name}': {:.1} minutes remaining",
                    timer.remaining().as_secs_f64() / 60.0
                )
            })
            .collect();
        format!("Active timers: {}", entries.join(", "))
    }

    /// Describe one timer
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no live timer has this name
    pub async fn get_timer_status(&self, name: &str) -> Result<String, TimerError> {
        let timers = self.timers.lock().await;
        let timer = timers
            .get(name)
            .ok_or_else(|| TimerError::NotFound(name.to_string()))?;

        let remaining = timer.remaining();
        if remaining.is_zero() {
            Ok(format!("Timer '{name}' should have expired by now."))
        } else {
            Ok(format!(
                "Timer '{name}' has {:.1} minutes remaining.",
                remaining.as_secs_f64() / 60.0
            ))
        }
    }

    /// Cancel every live timer, returning how many there were
    pub async fn cancel_all(&self) -> usize {
        let mut timers = self.timers.lock().await;
        let count = timers.len();
        for (_, timer) in timers.drain() {
            timer.task.cancel();
        }
        tracing::info!(count, "cancelled all timers");
        count
    }

    /// Names of live timers, oldest first
    pub async fn names(&self) -> Vec<String> {
        let timers = self.timers.lock().await;
        let mut entries: Vec<(&String, u64)> = timers.iter().map(|(n, t)| (n, t.id)).collect();
        entries.sort_by_key(|(_, id)| *id);
        entries.into_iter().map(|(n, _)| n.clone()).collect()
    }

    /// Number of live timers
    pub async fn len(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Whether no timers are live
    pub async fn is_empty(&self) -> bool {
        self.timers.lock().await.is_empty()
    }
}

async fn expire(registry: Registry, announcements: EventSender, name: String, id: u64, token: CancellationToken) {
    let mut timers = registry.lock().await;

    // Lost the race to a cancel, or the name now belongs to a newer timer
    if token.is_cancelled() || timers.get(&name).is_none_or(|t| t.id != id) {
        return;
    }
    timers.remove(&name);

    tracing::info!(name, "timer expired");
    let text = format!("Your timer '{name}' is done!");
    if announcements.send(Event::TimerAnnouncement { text }).is_err() {
        tracing::warn!(name, "downstream closed, timer announcement dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;

    #[tokio::test(start_paused = true)]
    async fn set_and_expire_announces_once() {
        let (tx, mut rx) = events::channel();
        let timers = TimerService::new(tx);

        let reply = timers.set_timer(1.0, Some("pasta")).await.unwrap();
        assert_eq!(reply, "Timer 'pasta' set for 1 minutes.");

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(
            rx.try_recv().unwrap(),
            Event::TimerAnnouncement {
                text: "Your timer 'pasta' is done!".to_string()
            }
        );
        assert!(rx.try_recv().is_err());
        assert!(timers.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn default_name_from_duration() {
        let (tx, _rx) = events::channel();
        let timers = TimerService::new(tx);

        let reply = timers.set_timer(5.0, None).await.unwrap();
        assert_eq!(reply, "Timer '5 minute timer' set for 5 minutes.");

        let reply = timers.set_timer(1.5, Some("  ")).await.unwrap();
        assert_eq!(reply, "Timer '1.5 minute timer' set for 1.5 minutes.");
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_name_rejected() {
        let (tx, _rx) = events::channel();
        let timers = TimerService::new(tx);

        timers.set_timer(2.0, Some("tea")).await.unwrap();
        let err = timers.set_timer(3.0, Some("tea")).await.unwrap_err();
        assert_eq!(err, TimerError::AlreadyExists("tea".to_string()));
        assert_eq!(
            err.to_string(),
            "A timer named 'tea' already exists. Please cancel it first or choose a different name."
        );
        assert_eq!(timers.len().await, 1);
        assert_eq!(
            timers.get_timer_status("tea").await.unwrap(),
            "Timer 'tea' has 2.0 minutes remaining."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_durations_rejected() {
        let (tx, _rx) = events::channel();
        let timers = TimerService::new(tx);

        for minutes in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                timers.set_timer(minutes, Some("bad")).await,
                Err(TimerError::InvalidDuration(_))
            ));
        }
        assert!(timers.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_silent() {
        let (tx, mut rx) = events::channel();
        let timers = TimerService::new(tx);

        timers.set_timer(1.0, Some("eggs")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(timers.cancel_timer("eggs").await.unwrap(), "Timer 'eggs' cancelled.");
        assert_eq!(
            timers.cancel_timer("eggs").await.unwrap_err().to_string(),
            "No timer named 'eggs' found."
        );

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reused_name_after_cancel_keeps_new_timer() {
        let (tx, mut rx) = events::channel();
        let timers = TimerService::new(tx);

        timers.set_timer(1.0, Some("nap")).await.unwrap();
        timers.cancel_timer("nap").await.unwrap();
        timers.set_timer(2.0, Some("nap")).await.unwrap();

        tokio::time::sleep(Duration::from_secs(90)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(timers.names().await, vec!["nap"]);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(matches!(rx.try_recv(), Ok(Event::TimerAnnouncement { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn list_formats_remaining_minutes() {
        let (tx, _rx) = events::channel();
        let timers = TimerService::new(tx);
        assert_eq!(timers.list_timers().await, "No active timers.");

        timers.set_timer(2.0, Some("tea")).await.unwrap();
        timers.set_timer(10.0, Some("laundry")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(
            timers.list_timers().await,
            "Active timers: 'tea': 1.5 minutes remaining, 'laundry': 9.5 minutes remaining"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_clears_registry() {
        let (tx, mut rx) = events::channel();
        let timers = TimerService::new(tx);

        timers.set_timer(1.0, Some("a")).await.unwrap();
        timers.set_timer(1.0, Some("b")).await.unwrap();
        assert_eq!(timers.cancel_all().await, 2);
        assert_eq!(timers.cancel_all().await, 0);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(timers.list_timers().await, "No active timers.");
    }
}
