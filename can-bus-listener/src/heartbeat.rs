//! Message counters and heartbeat cadence
//!
//! The tracker is owned by the processor and only ever mutated from the
//! receive loop, so it needs no locking.

use std::time::{Duration, Instant};

/// Default time between heartbeats
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Point-in-time liveness statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSnapshot {
    /// Time since the tracker was created
    pub uptime: Duration,
    /// Frames received so far, decoded or not
    pub messages_received: u64,
    /// Time since the last frame (or since start if none arrived)
    pub quiet: Duration,
}

impl HeartbeatSnapshot {
    /// Uptime as `HH:MM:SS`; hours are not wrapped
    pub fn uptime_hms(&self) -> String {
        let total = self.uptime.as_secs();
        let hours = total / 3600;
        let minutes = (total % 3600) / 60;
        let seconds = total % 60;
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }

    /// Whole seconds of bus silence
    pub fn quiet_seconds(&self) -> u64 {
        self.quiet.as_secs()
    }
}

/// Processing state: start time, message count, last message and last heartbeat
#[derive(Debug, Clone)]
pub struct HeartbeatTracker {
    interval: Duration,
    start_time: Instant,
    last_message_time: Instant,
    total_received: u64,
    last_heartbeat_time: Instant,
}

impl HeartbeatTracker {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    /// Create a tracker whose clock starts at `now`
    pub fn starting_at(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            start_time: now,
            last_message_time: now,
            total_received: 0,
            last_heartbeat_time: now,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn messages_received(&self) -> u64 {
        self.total_received
    }

    /// Record a received frame, decoded or not
    pub fn on_message_received(&mut self) {
        self.on_message_received_at(Instant::now());
    }

    pub fn on_message_received_at(&mut self, now: Instant) {
        self.total_received = self.total_received.saturating_add(1);
        self.last_message_time = now;
    }

    /// True once `interval` has elapsed since the last heartbeat
    pub fn heartbeat_due(&self) -> bool {
        self.heartbeat_due_at(Instant::now())
    }

    pub fn heartbeat_due_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_heartbeat_time) >= self.interval
    }

    pub fn snapshot(&self) -> HeartbeatSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> HeartbeatSnapshot {
        HeartbeatSnapshot {
            uptime: now.saturating_duration_since(self.start_time),
            messages_received: self.total_received,
            quiet: now.saturating_duration_since(self.last_message_time),
        }
    }

    /// Restart the heartbeat interval
    pub fn mark_emitted(&mut self) {
        self.mark_emitted_at(Instant::now());
    }

    pub fn mark_emitted_at(&mut self, now: Instant) {
        self.last_heartbeat_time = now;
    }
}

impl Default for HeartbeatTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_INTERVAL)
    }
}
