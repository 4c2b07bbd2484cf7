//! Measurement bridges.
//!
//! External relays (motion capture, vision pipelines) run on their own
//! threads or processes and publish into a [`MeasurementBridge`].  Each
//! control element owns the matching [`MeasurementInbox`] and drains it at
//! the start of a tick with `try_recv`, so a missing or slow source can never
//! stall the control loop.
//!
//! # Example
//!
//! ```rust
//! use gaitplan_perception::bridge::{Measurement, MeasurementBridge};
//! use gaitplan_types::{Pose2, Tick};
//!
//! let bridge = MeasurementBridge::new("mocap-0");
//! let mut inbox = bridge.subscribe();
//!
//! bridge.publish(Measurement::new(Pose2::new(0.1, 0.0, 0.0), Tick(3)));
//! bridge.publish(Measurement::new(Pose2::new(0.2, 0.0, 0.0), Tick(4)));
//!
//! let latest = inbox.drain_latest().unwrap();
//! assert_eq!(latest.stamp, Tick(4));
//! assert!(inbox.drain_latest().is_none());
//! ```

use gaitplan_types::{Pose2, Tick};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::debug;

/// Number of measurements buffered per bridge before the oldest are dropped.
const DEFAULT_CAPACITY: usize = 64;

/// One pose reading from an external source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub pose: Pose2,
    /// Tick at which the source produced the reading.
    pub stamp: Tick,
}

impl Measurement {
    pub fn new(pose: Pose2, stamp: Tick) -> Self {
        Self { pose, stamp }
    }
}

/// Publishing side.  Clone it freely; every clone feeds the same inboxes.
#[derive(Clone, Debug)]
pub struct MeasurementBridge {
    source: String,
    sender: broadcast::Sender<Measurement>,
}

impl MeasurementBridge {
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_capacity(source, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(source: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            source: source.into(),
            sender,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Publish a measurement.  Returns `false` when no inbox is attached.
    pub fn publish(&self, measurement: Measurement) -> bool {
        match self.sender.send(measurement) {
            Ok(_) => true,
            Err(broadcast::error::SendError(_)) => {
                debug!(source = %self.source, "measurement dropped: no inbox attached");
                false
            }
        }
    }

    /// Attach a new inbox.  It only sees measurements published from now on.
    pub fn subscribe(&self) -> MeasurementInbox {
        MeasurementInbox {
            source: self.source.clone(),
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiving side, owned by a single control element.
#[derive(Debug)]
pub struct MeasurementInbox {
    source: String,
    receiver: broadcast::Receiver<Measurement>,
}

impl MeasurementInbox {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Drain every pending measurement and return the newest one.
    ///
    /// Never blocks.  A lagged receiver only means newer data exists, so it
    /// keeps draining; a closed bridge simply yields nothing.
    pub fn drain_latest(&mut self) -> Option<Measurement> {
        let mut latest: Option<Measurement> = None;
        loop {
            match self.receiver.try_recv() {
                Ok(m) => {
                    if latest.is_none_or(|l| m.stamp >= l.stamp) {
                        latest = Some(m);
                    }
                }
                Err(TryRecvError::Lagged(n)) => {
                    debug!(source = %self.source, skipped = n, "inbox lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: f64, stamp: u64) -> Measurement {
        Measurement::new(Pose2::new(x, 0.0, 0.0), Tick(stamp))
    }

    #[test]
    fn empty_inbox_yields_nothing() {
        let bridge = MeasurementBridge::new("mocap");
        let mut inbox = bridge.subscribe();
        assert!(inbox.drain_latest().is_none());
    }

    #[test]
    fn publish_without_inbox_reports_drop() {
        let bridge = MeasurementBridge::new("mocap");
        assert!(!bridge.publish(at(1.0, 1)));
    }

    #[test]
    fn drain_keeps_newest_stamp() {
        let bridge = MeasurementBridge::new("mocap");
        let mut inbox = bridge.subscribe();
        bridge.publish(at(1.0, 5));
        bridge.publish(at(2.0, 3)); // out of order
        bridge.publish(at(3.0, 4));
        let m = inbox.drain_latest().unwrap();
        assert_eq!(m.stamp, Tick(5));
        assert_eq!(m.pose.x, 1.0);
    }

    #[test]
    fn lagged_inbox_still_returns_latest() {
        let bridge = MeasurementBridge::with_capacity("vision", 2);
        let mut inbox = bridge.subscribe();
        for i in 0..10 {
            bridge.publish(at(i as f64, i));
        }
        let m = inbox.drain_latest().unwrap();
        assert_eq!(m.stamp, Tick(9));
    }

    #[test]
    fn closed_bridge_is_not_an_error() {
        let bridge = MeasurementBridge::new("vision");
        let mut inbox = bridge.subscribe();
        bridge.publish(at(1.0, 1));
        drop(bridge);
        assert_eq!(inbox.drain_latest().unwrap().stamp, Tick(1));
        assert!(inbox.drain_latest().is_none());
    }

    #[test]
    fn clones_feed_the_same_inbox() {
        let bridge = MeasurementBridge::new("mocap");
        let mut inbox = bridge.subscribe();
        let relay = bridge.clone();
        relay.publish(at(7.0, 2));
        assert_eq!(inbox.drain_latest().unwrap().pose.x, 7.0);
        assert_eq!(inbox.source(), "mocap");
    }
}
