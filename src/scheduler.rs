use std::time::{Duration, Instant};

/// The periodic activities of a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Animation,
    Flush,
}

#[derive(Debug, Clone)]
struct Timer {
    kind: TimerKind,
    period: Duration,
    next_due: Instant,
}

/// Table of periodic timers polled by the event loop.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    timers: Vec<Timer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// First firing is one `period` after `now`. A zero period is ignored.
    pub fn add(&mut self, kind: TimerKind, period: Duration, now: Instant) {
        if period.is_zero() {
            log::warn!("Ignoring {kind:?} timer with zero period");
            return;
        }
        self.timers.push(Timer {
            kind,
            period,
            next_due: now + period,
        });
    }

    /// Kinds due at `now`, each at most once. Missed periods are skipped.
    pub fn poll(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due = Vec::new();
        for timer in &mut self.timers {
            if now < timer.next_due {
                continue;
            }
            due.push(timer.kind);
            let behind = now.duration_since(timer.next_due).as_nanos() / timer.period.as_nanos();
            let skip = u32::try_from(behind + 1).unwrap_or(u32::MAX);
            timer.next_due += timer.period * skip;
        }
        due
    }

    /// Time until the earliest timer fires, if any.
    pub fn until_next(&self, now: Instant) -> Option<Duration> {
        self.timers
            .iter()
            .map(|t| t.next_due.saturating_duration_since(now))
            .min()
    }

    pub fn cancel_all(&mut self) {
        self.timers.clear();
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
