//! Call duration timer.
//!
//! A single repeating 1-second task, started on connect and stopped on
//! session reset, writing formatted elapsed time into the store. Uses the
//! tokio monotonic clock so host suspension never produces negative or
//! jumping durations.

use crate::store::{CallKey, Store, StoreName, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Formats elapsed whole seconds as `MM:SS`, or `HH:MM:SS` once the hour
/// is nonzero.
pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Owns the at-most-one running duration task.
#[derive(Default)]
pub struct DurationTimer {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DurationTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the repeating task. A no-op while a task is already running.
    pub fn start(&self, store: Arc<Store>) {
        let mut guard = self.handle.lock().expect("timer lock poisoned");
        if guard.is_some() {
            return;
        }
        let started = Instant::now();
        let task = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(started + Duration::from_secs(1), Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let elapsed_secs = started.elapsed().as_secs_f64().round() as u64;
                store.update(
                    StoreName::Call,
                    CallKey::CallDuration,
                    Value::Text(format_duration(elapsed_secs)),
                );
            }
        });
        *guard = Some(task);
    }

    /// Stops the task and invalidates the handle. The last stored duration
    /// string is left untouched.
    pub fn stop(&self) {
        if let Some(task) = self.handle.lock().expect("timer lock poisoned").take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().expect("timer lock poisoned").is_some()
    }
}

impl Drop for DurationTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(5), "00:05");
        assert_eq!(format_duration(65), "01:05");
        assert_eq!(format_duration(3599), "59:59");
        assert_eq!(format_duration(3600), "01:00:00");
        assert_eq!(format_duration(3725), "01:02:05");
    }

    async fn advance_secs(secs: u64) {
        for _ in 0..secs {
            tokio::time::advance(Duration::from_secs(1)).await;
            tokio::task::yield_now().await;
        }
    }

    fn stored_duration(store: &Store) -> String {
        match store.get_data(StoreName::Call, CallKey::CallDuration) {
            Value::Text(text) => text,
            other => panic!("unexpected duration value: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_writes_formatted_elapsed_time() {
        let store = Store::new();
        let timer = DurationTimer::new();
        timer.start(store.clone());

        advance_secs(65).await;
        assert_eq!(stored_duration(&store), "01:05");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_freezes_the_stored_duration() {
        let store = Store::new();
        let timer = DurationTimer::new();
        timer.start(store.clone());

        advance_secs(10).await;
        assert_eq!(stored_duration(&store), "00:10");

        timer.stop();
        assert!(!timer.is_running());
        advance_secs(30).await;
        assert_eq!(stored_duration(&store), "00:10");
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_while_running() {
        let store = Store::new();
        let timer = DurationTimer::new();
        timer.start(store.clone());
        advance_secs(5).await;

        // A second start must not restart the elapsed-time origin.
        timer.start(store.clone());
        advance_secs(5).await;
        assert_eq!(stored_duration(&store), "00:10");
    }
}
