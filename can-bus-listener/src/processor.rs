//! Frame processing and heartbeat emission
//!
//! Couples the stateless decoder with the tracker state and a record sink.

use crate::heartbeat::HeartbeatTracker;
use crate::publisher::{RecordSink, StatusRecord};
use pgn_decoder::{DecodedReading, PgnDecoder, RawFrame};
use std::time::Instant;

/// Processes received frames and emits periodic heartbeats
pub struct CanProcessor<S: RecordSink> {
    decoder: PgnDecoder,
    tracker: HeartbeatTracker,
    sink: S,
}

impl<S: RecordSink> CanProcessor<S> {
    pub fn new(decoder: PgnDecoder, tracker: HeartbeatTracker, sink: S) -> Self {
        Self {
            decoder,
            tracker,
            sink,
        }
    }

    pub fn tracker(&self) -> &HeartbeatTracker {
        &self.tracker
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Count, decode and publish one frame
    pub fn process_frame(&mut self, frame: &RawFrame) -> DecodedReading {
        self.process_frame_at(frame, Instant::now())
    }

    pub fn process_frame_at(&mut self, frame: &RawFrame, now: Instant) -> DecodedReading {
        self.tracker.on_message_received_at(now);

        let reading = self.decoder.decode_reading(frame);
        match reading {
            DecodedReading::Known { ref name, value } => {
                log::trace!("{}: {:.2}", name, value);
            }
            DecodedReading::Unknown { arbitration_id } => {
                log::warn!("Unknown PGN: {}", arbitration_id);
            }
        }

        self.sink.publish(&StatusRecord::from_reading(&reading));
        reading
    }

    /// Publish a heartbeat if one is due; returns true if one was emitted
    pub fn check_heartbeat(&mut self) -> bool {
        self.check_heartbeat_at(Instant::now())
    }

    pub fn check_heartbeat_at(&mut self, now: Instant) -> bool {
        if !self.tracker.heartbeat_due_at(now) {
            return false;
        }

        let snapshot = self.tracker.snapshot_at(now);
        log::debug!(
            "Heartbeat: uptime {}, {} messages, quiet {}s",
            snapshot.uptime_hms(),
            snapshot.messages_received,
            snapshot.quiet_seconds()
        );
        self.sink.publish(&StatusRecord::from_snapshot(&snapshot));
        self.tracker.mark_emitted_at(now);
        true
    }
}
