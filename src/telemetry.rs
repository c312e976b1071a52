use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::protocol::Request;

/// Event type used for batched pointer motion.
pub const POINTER_EVENT: &str = "mouse_move";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Period between batch flushes.
    pub flush_interval_ms: u64,
    /// The sampling window reopens this often.
    pub track_interval_ms: u64,
    /// How long the sampling window stays open each time.
    pub track_window_ms: u64,
    /// Send a batch even when nothing was captured.
    pub flush_empty: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            flush_interval_ms: 10_000,
            track_interval_ms: 250,
            track_window_ms: 250,
            flush_empty: false,
        }
    }
}

/// One pointer position. `time` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerSample {
    pub time: i64,
    pub x: f64,
    pub y: f64,
}

/// Repeating capture window: open for `open_for` at the start of every `interval`.
#[derive(Debug, Clone, Copy)]
pub struct SamplingWindow {
    origin: Instant,
    interval: Duration,
    open_for: Duration,
}

impl SamplingWindow {
    pub fn new(origin: Instant, interval: Duration, open_for: Duration) -> Self {
        SamplingWindow {
            origin,
            interval,
            open_for,
        }
    }

    pub fn is_open(&self, now: Instant) -> bool {
        if self.open_for >= self.interval {
            return true;
        }
        let elapsed = now.saturating_duration_since(self.origin).as_nanos();
        elapsed % self.interval.as_nanos() < self.open_for.as_nanos()
    }
}

/// Append-only buffer of pointer samples, swapped out whole on flush.
///
/// Clones share the same buffer, so producers on other threads can hold
/// their own handle.
#[derive(Debug, Clone, Default)]
pub struct TelemetryBatcher {
    buffer: Arc<Mutex<Vec<PointerSample>>>,
    flush_empty: bool,
}

impl TelemetryBatcher {
    pub fn new(flush_empty: bool) -> Self {
        TelemetryBatcher {
            buffer: Arc::default(),
            flush_empty,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PointerSample>> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, sample: PointerSample) {
        self.lock().push(sample);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swap the buffer for an empty one and return what was in it.
    pub fn take(&self) -> Vec<PointerSample> {
        std::mem::take(&mut *self.lock())
    }

    /// Take the accumulated samples as one EVENT request.
    ///
    /// Returns `None` for an empty batch unless `flush_empty` is set.
    pub fn flush(&self, at: DateTime<Utc>) -> Option<Request> {
        let positions = self.take();
        if positions.is_empty() && !self.flush_empty {
            return None;
        }
        log::debug!("Flushing {} pointer sample(s)", positions.len());
        Some(Request::event(
            POINTER_EVENT,
            json!({ "positions": positions }),
            at,
        ))
    }
}

/// Feeds pointer motion into a batcher while the sampling window is open.
#[derive(Debug, Clone)]
pub struct PointerTracker {
    window: SamplingWindow,
    batcher: TelemetryBatcher,
}

impl PointerTracker {
    pub fn new(window: SamplingWindow, batcher: TelemetryBatcher) -> Self {
        PointerTracker { window, batcher }
    }

    pub fn from_config(config: &TelemetryConfig, origin: Instant) -> Self {
        PointerTracker::new(
            SamplingWindow::new(
                origin,
                Duration::from_millis(config.track_interval_ms),
                Duration::from_millis(config.track_window_ms),
            ),
            TelemetryBatcher::new(config.flush_empty),
        )
    }

    pub fn batcher(&self) -> &TelemetryBatcher {
        &self.batcher
    }

    /// Returns whether the sample was captured.
    pub fn record(&self, now: Instant, at: DateTime<Utc>, x: f64, y: f64) -> bool {
        if !self.window.is_open(now) {
            return false;
        }
        self.batcher.push(PointerSample {
            time: at.timestamp_millis(),
            x,
            y,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EventData;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn sample(i: i64) -> PointerSample {
        PointerSample {
            time: 1_000 + i,
            x: i as f64,
            y: (i * 2) as f64,
        }
    }

    fn event_data(req: Request) -> EventData {
        match req {
            Request::Event(data) => data,
            other => panic!("expected EVENT, got {other:?}"),
        }
    }

    #[test]
    fn flush_emits_all_samples_in_order() {
        let batcher = TelemetryBatcher::new(false);
        for i in 0..5 {
            batcher.push(sample(i));
        }

        let data = event_data(batcher.flush(at()).unwrap());
        assert_eq!(data.event_type, POINTER_EVENT);
        let positions: Vec<PointerSample> =
            serde_json::from_value(data.event_data["positions"].clone()).unwrap();
        assert_eq!(positions, (0..5).map(sample).collect::<Vec<_>>());
        assert!(batcher.is_empty());
    }

    #[test]
    fn empty_batches_are_skipped_by_default() {
        let batcher = TelemetryBatcher::new(false);
        assert!(batcher.flush(at()).is_none());

        let eager = TelemetryBatcher::new(true);
        let data = event_data(eager.flush(at()).unwrap());
        assert_eq!(data.event_data, json!({"positions": []}));
    }

    #[test]
    fn concurrent_pushes_are_neither_lost_nor_duplicated() {
        const THREADS: i64 = 4;
        const PER_THREAD: i64 = 2_000;

        let batcher = TelemetryBatcher::new(false);
        let producers: Vec<_> = (0..THREADS)
            .map(|t| {
                let batcher = batcher.clone();
                std::thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        batcher.push(PointerSample {
                            time: i,
                            x: t as f64,
                            y: i as f64,
                        });
                    }
                })
            })
            .collect();

        let mut collected = Vec::new();
        while producers.iter().any(|p| !p.is_finished()) {
            collected.extend(batcher.take());
        }
        for p in producers {
            p.join().unwrap();
        }
        collected.extend(batcher.take());

        assert_eq!(collected.len() as i64, THREADS * PER_THREAD);
        for t in 0..THREADS {
            let ys: Vec<f64> = collected
                .iter()
                .filter(|s| s.x == t as f64)
                .map(|s| s.y)
                .collect();
            // Per-producer order survives every swap.
            assert_eq!(ys, (0..PER_THREAD).map(|i| i as f64).collect::<Vec<_>>());
        }
    }

    #[test]
    fn window_opens_periodically() {
        let origin = Instant::now();
        let window = SamplingWindow::new(
            origin,
            Duration::from_millis(250),
            Duration::from_millis(100),
        );
        assert!(window.is_open(origin));
        assert!(window.is_open(origin + Duration::from_millis(99)));
        assert!(!window.is_open(origin + Duration::from_millis(100)));
        assert!(!window.is_open(origin + Duration::from_millis(249)));
        assert!(window.is_open(origin + Duration::from_millis(260)));

        let always = SamplingWindow::new(
            origin,
            Duration::from_millis(250),
            Duration::from_millis(250),
        );
        assert!(always.is_open(origin + Duration::from_millis(249)));
    }

    #[test]
    fn tracker_only_records_inside_window() {
        let origin = Instant::now();
        let tracker = PointerTracker::new(
            SamplingWindow::new(origin, Duration::from_millis(100), Duration::from_millis(10)),
            TelemetryBatcher::new(false),
        );

        assert!(tracker.record(origin + Duration::from_millis(5), at(), 1.0, 2.0));
        assert!(!tracker.record(origin + Duration::from_millis(50), at(), 3.0, 4.0));
        assert_eq!(tracker.batcher().len(), 1);
        assert_eq!(tracker.batcher().take()[0].time, at().timestamp_millis());
    }
}
