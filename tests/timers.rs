//! Timer service integration tests

use std::time::Duration;

use tokio_test::{assert_err, assert_ok};
use wakegate::events::{self, Event};
use wakegate::timers::{TimerError, TimerService};

mod common;

use common::advance;

#[tokio::test(start_paused = true)]
async fn test_pasta_timer_lifecycle() {
    let (tx, mut rx) = events::channel();
    let timers = TimerService::new(tx);

    let reply = timers.set_timer(10.0, Some("pasta")).await.unwrap();
    assert_eq!(reply, "Timer 'pasta' set for 10 minutes.");
    assert_eq!(
        timers.list_timers().await,
        "Active timers: 'pasta': 10.0 minutes remaining"
    );

    advance(Duration::from_secs(150)).await;
    assert_eq!(
        timers.get_timer_status("pasta").await.unwrap(),
        "Timer 'pasta' has 7.5 minutes remaining."
    );
    assert!(rx.try_recv().is_err());

    advance(Duration::from_secs(451)).await;
    assert_eq!(
        rx.try_recv().unwrap(),
        Event::TimerAnnouncement {
            text: "Your timer 'pasta' is done!".to_string(),
        }
    );
    assert!(rx.try_recv().is_err());
    assert_eq!(
        timers.get_timer_status("pasta").await,
        Err(TimerError::NotFound("pasta".to_string()))
    );
    assert_eq!(timers.list_timers().await, "No active timers.");
}

#[tokio::test(start_paused = true)]
async fn test_lapsed_timer_reported_before_cleanup() {
    let (tx, mut rx) = events::channel();
    let timers = TimerService::new(tx);

    assert_ok!(timers.set_timer(1.0, Some("pasta")).await);

    // Deadline reached, expiry task not run yet
    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(
        timers.get_timer_status("pasta").await,
        Ok("Timer 'pasta' should have expired by now.".to_string())
    );
    assert_eq!(timers.list_timers().await, "No active timers.");

    common::settle().await;
    assert_eq!(
        rx.try_recv().unwrap(),
        Event::TimerAnnouncement {
            text: "Your timer 'pasta' is done!".to_string(),
        }
    );
    assert!(timers.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_name_leaves_one_timer() {
    let (tx, _rx) = events::channel();
    let timers = TimerService::new(tx);

    timers.set_timer(5.0, Some("eggs")).await.unwrap();
    let err = assert_err!(timers.set_timer(3.0, Some("eggs")).await);

    assert_eq!(err, TimerError::AlreadyExists("eggs".to_string()));
    assert_eq!(
        err.to_string(),
        "A timer named 'eggs' already exists. Please cancel it first or choose a different name."
    );
    assert_eq!(timers.len().await, 1);
    assert_eq!(
        timers.get_timer_status("eggs").await.unwrap(),
        "Timer 'eggs' has 5.0 minutes remaining."
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_is_silent_and_idempotent() {
    let (tx, mut rx) = events::channel();
    let timers = TimerService::new(tx);

    timers.set_timer(1.0, Some("tea")).await.unwrap();
    assert_eq!(timers.cancel_timer("tea").await.unwrap(), "Timer 'tea' cancelled.");
    assert_eq!(
        timers.cancel_timer("tea").await,
        Err(TimerError::NotFound("tea".to_string()))
    );

    advance(Duration::from_secs(120)).await;
    assert!(rx.try_recv().is_err());

    // The name is free again
    assert_ok!(timers.set_timer(1.0, Some("tea")).await);
    assert_eq!(timers.names().await, ["tea"]);
}

#[tokio::test(start_paused = true)]
async fn test_unnamed_timers_and_listing_order() {
    let (tx, _rx) = events::channel();
    let timers = TimerService::new(tx);

    assert_eq!(
        timers.set_timer(1.5, None).await.unwrap(),
        "Timer '1.5 minute timer' set for 1.5 minutes."
    );
    timers.set_timer(5.0, Some("workout")).await.unwrap();
    timers.set_timer(2.0, Some("  ")).await.unwrap();

    assert_eq!(
        timers.names().await,
        ["1.5 minute timer", "workout", "2 minute timer"]
    );
    assert_eq!(
        timers.list_timers().await,
        "Active timers: '1.5 minute timer': 1.5 minutes remaining, \
         'workout': 5.0 minutes remaining, '2 minute timer': 2.0 minutes remaining"
    );
}

#[tokio::test]
async fn test_invalid_durations_rejected() {
    let (tx, _rx) = events::channel();
    let timers = TimerService::new(tx);

    for minutes in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        assert!(matches!(
            timers.set_timer(minutes, Some("bad")).await,
            Err(TimerError::InvalidDuration(_))
        ));
    }
    assert!(timers.is_empty().await);
    assert_eq!(
        TimerError::InvalidDuration(0.0).to_string(),
        "Timer duration must be a positive number of minutes, got 0."
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_all_stops_every_timer() {
    let (tx, mut rx) = events::channel();
    let timers = TimerService::new(tx);

    assert_ok!(timers.set_timer(0.5, Some("a")).await);
    assert_ok!(timers.set_timer(1.0, Some("b")).await);
    assert_eq!(timers.cancel_all().await, 2);
    assert_eq!(timers.cancel_all().await, 0);

    advance(Duration::from_secs(90)).await;
    assert!(rx.try_recv().is_err());
}
