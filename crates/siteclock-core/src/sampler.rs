//! Location acquisition as a cancellable stream of position readings.
//!
//! Platform location callbacks are push-based; this module abstracts them
//! as a subscription yielding `Position` values over a bounded channel,
//! with explicit stop semantics instead of ambient event registration.
//! Real GPS backends are platform glue and live outside this crate; the
//! `ReplaySource` here drives the controller from a recorded trace.

use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{CoreError, LocationError};
use crate::model::Position;

/// A pluggable source of continuous position readings.
pub trait PositionSource: Send + Sync {
    /// Begin continuous acquisition. Each call starts an independent
    /// stream; dropping or stopping the subscription cancels it.
    fn subscribe(&self) -> Result<PositionSubscription, LocationError>;
}

/// An active position stream. Dropping it cancels the underlying
/// acquisition; `stop` does so explicitly.
pub struct PositionSubscription {
    rx: mpsc::Receiver<Position>,
}

impl PositionSubscription {
    /// Channel-backed subscription; the producing side feeds positions
    /// through the returned sender and observes cancellation as a closed
    /// channel.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Position>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }

    /// Next position, or `None` once the source has ended.
    pub async fn next(&mut self) -> Option<Position> {
        self.rx.recv().await
    }

    /// Like [`next`](Self::next), but fails if no position arrives within
    /// `timeout`. The subscription stays usable afterwards.
    pub async fn next_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Position>, LocationError> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .map_err(|_| LocationError::Timeout {
                timeout_secs: timeout.as_secs(),
            })
    }

    /// Cancel the subscription. The producer sees the closed channel on
    /// its next send and stops.
    pub fn stop(mut self) {
        self.rx.close();
    }
}

/// Plays back a recorded position trace at a fixed interval.
pub struct ReplaySource {
    trace: Vec<Position>,
    interval: Duration,
}

impl ReplaySource {
    pub fn new(trace: Vec<Position>, interval: Duration) -> Self {
        Self { trace, interval }
    }

    /// Load a trace from a JSON-lines file, one `Position` per line.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or a line does not
    /// parse.
    pub fn from_jsonl(path: &Path, interval: Duration) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        let mut trace = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            trace.push(serde_json::from_str(line)?);
        }
        Ok(Self::new(trace, interval))
    }

    pub fn len(&self) -> usize {
        self.trace.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trace.is_empty()
    }
}

impl PositionSource for ReplaySource {
    fn subscribe(&self) -> Result<PositionSubscription, LocationError> {
        if self.trace.is_empty() {
            return Err(LocationError::Unavailable("replay trace is empty".into()));
        }
        let (tx, subscription) = PositionSubscription::channel(16);
        let trace = self.trace.clone();
        let interval = self.interval;
        tokio::spawn(async move {
            for position in trace {
                if tx.send(position).await.is_err() {
                    debug!("replay subscription cancelled");
                    return;
                }
                tokio::time::sleep(interval).await;
            }
        });
        Ok(subscription)
    }
}
