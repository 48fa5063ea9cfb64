//! Per-request structured events.
//!
//! A cursor only talks to the [`Event`] trait: it starts a timer named after
//! the operation on `click`, bumps `<operation>.ERROR` (or `_ERROR`) when an
//! error is observed and stops the timer on `release`. [`RequestEvent`] is an
//! in-memory implementation that collects everything for one request and
//! logs it as a single JSON line when finished.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Structured event sink shared by every span of one request.
pub trait Event: Send + Sync + fmt::Debug {
    fn set_counter(&self, name: &str, value: i64);
    fn inc_counter(&self, name: &str, delta: i64);
    fn start_timer(&self, name: &str);
    fn end_timer(&self, name: &str);
    fn add_pair(&self, key: &str, value: &str);
}

/// Accumulated statistics for one named timer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimerStat {
    /// Completed start/end pairs
    pub count: u64,
    /// Total elapsed time of completed pairs in nanoseconds
    pub elapsed_nanos: u128,
}

#[derive(Debug, Default)]
struct EventState {
    counters: BTreeMap<String, i64>,
    timers: BTreeMap<String, TimerStat>,
    /// Start instants of timers still running; overlapping spans stack up
    running: BTreeMap<String, Vec<Instant>>,
    pairs: BTreeMap<String, String>,
}

/// Point-in-time copy of a [`RequestEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSnapshot {
    pub event_id: Uuid,
    pub operation: String,
    pub start_time: DateTime<Utc>,
    pub counters: BTreeMap<String, i64>,
    pub timers: BTreeMap<String, TimerStat>,
    pub pairs: BTreeMap<String, String>,
}

/// In-memory structured event for one request.
#[derive(Debug)]
pub struct RequestEvent {
    event_id: Uuid,
    operation: String,
    start_time: DateTime<Utc>,
    started: Instant,
    state: Mutex<EventState>,
}

impl RequestEvent {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            operation: operation.into(),
            start_time: Utc::now(),
            started: Instant::now(),
            state: Mutex::new(EventState::default()),
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn counter(&self, name: &str) -> Option<i64> {
        self.lock().counters.get(name).copied()
    }

    pub fn timer(&self, name: &str) -> Option<TimerStat> {
        self.lock().timers.get(name).cloned()
    }

    pub fn is_timer_running(&self, name: &str) -> bool {
        self.lock()
            .running
            .get(name)
            .is_some_and(|starts| !starts.is_empty())
    }

    pub fn pair(&self, key: &str) -> Option<String> {
        self.lock().pairs.get(key).cloned()
    }

    pub fn snapshot(&self) -> EventSnapshot {
        let state = self.lock();
        EventSnapshot {
            event_id: self.event_id,
            operation: self.operation.clone(),
            start_time: self.start_time,
            counters: state.counters.clone(),
            timers: state.timers.clone(),
            pairs: state.pairs.clone(),
        }
    }

    /// Log the collected event and return its final snapshot.
    ///
    /// Timers still running are left out.
    pub fn finish(self) -> EventSnapshot {
        let elapsed = self.started.elapsed();
        let snapshot = self.snapshot();
        match serde_json::to_string(&snapshot) {
            Ok(json) => info!(
                event_id = %snapshot.event_id,
                elapsed_ms = elapsed.as_millis() as u64,
                event = %json,
                "Request event finished"
            ),
            Err(e) => info!(
                event_id = %snapshot.event_id,
                error = %e,
                "Request event finished, serialization failed"
            ),
        }
        snapshot
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EventState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Event for RequestEvent {
    fn set_counter(&self, name: &str, value: i64) {
        self.lock().counters.insert(name.to_string(), value);
    }

    fn inc_counter(&self, name: &str, delta: i64) {
        let mut state = self.lock();
        let counter = state.counters.entry(name.to_string()).or_insert(0);
        *counter = counter.saturating_add(delta);
    }

    fn start_timer(&self, name: &str) {
        self.lock()
            .running
            .entry(name.to_string())
            .or_default()
            .push(Instant::now());
    }

    fn end_timer(&self, name: &str) {
        let mut state = self.lock();
        let Some(starts) = state.running.get_mut(name) else {
            return;
        };
        let Some(started) = starts.pop() else {
            return;
        };
        if starts.is_empty() {
            state.running.remove(name);
        }
        let elapsed: Duration = started.elapsed();
        let timer = state.timers.entry(name.to_string()).or_default();
        timer.count += 1;
        timer.elapsed_nanos += elapsed.as_nanos();
    }

    fn add_pair(&self, key: &str, value: &str) {
        self.lock().pairs.insert(key.to_string(), value.to_string());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let event = RequestEvent::new("GET /orders");
        event.inc_counter("hits", 2);
        event.inc_counter("hits", 3);
        assert_eq!(event.counter("hits"), Some(5));

        event.set_counter("hits", 1);
        assert_eq!(event.counter("hits"), Some(1));
        assert_eq!(event.counter("missing"), None);
    }

    #[test]
    fn test_timer_start_end() {
        let event = RequestEvent::new("op");
        event.start_timer("load");
        assert!(event.is_timer_running("load"));
        event.end_timer("load");
        assert!(!event.is_timer_running("load"));

        event.start_timer("load");
        event.end_timer("load");

        let stat = event.timer("load").unwrap();
        assert_eq!(stat.count, 2);
    }

    #[test]
    fn test_overlapping_timers_with_same_name() {
        let event = RequestEvent::new("op");
        event.start_timer("load");
        event.start_timer("load");
        event.end_timer("load");
        assert!(event.is_timer_running("load"));
        event.end_timer("load");
        assert!(!event.is_timer_running("load"));

        assert_eq!(event.timer("load").unwrap().count, 2);
    }

    #[test]
    fn test_concurrent_spans_share_one_event() {
        let event = std::sync::Arc::new(RequestEvent::new("op"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let event = event.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        event.start_timer("save");
                        event.end_timer("save");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(event.timer("save").unwrap().count, 200);
        assert!(!event.is_timer_running("save"));
    }

    #[test]
    fn test_end_timer_without_start_is_ignored() {
        let event = RequestEvent::new("op");
        event.end_timer("never-started");
        assert!(event.timer("never-started").is_none());
    }

    #[test]
    fn test_pairs_and_snapshot() {
        let event = RequestEvent::new("op");
        event.add_pair("user", "42");
        event.inc_counter("op.ERROR", 1);

        let snapshot = event.snapshot();
        assert_eq!(snapshot.operation, "op");
        assert_eq!(snapshot.event_id, event.event_id());
        assert_eq!(snapshot.pairs.get("user").map(String::as_str), Some("42"));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["counters"]["op.ERROR"], 1);
        assert_eq!(json["pairs"]["user"], "42");
    }

    #[test]
    fn test_finish_returns_final_snapshot() {
        let event = RequestEvent::new("op");
        event.start_timer("done");
        event.end_timer("done");
        event.start_timer("still-running");

        let snapshot = event.finish();
        assert_eq!(snapshot.timers.len(), 1);
        assert!(snapshot.timers.contains_key("done"));
    }
}
