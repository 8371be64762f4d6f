//! Run state, progress events and cancellation.
//!
//! Events of one run arrive in order: `Stage` transitions, then `Tile` events
//! whose `percent` never decreases, then exactly one terminal `Finished` or
//! `Failed`. Observers that only care about the newest value can call
//! [`ProgressReceiver::latest`]; dropping intermediate events is harmless.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::error::Error;

/// Orchestrator state machine.
///
/// An orchestrator exists only once its operators are loaded, so it starts in
/// `Ready`; `LoadingModel` is reported through progress events by
/// [`Orchestrator::load`](super::Orchestrator::load) while that happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    LoadingModel,
    Ready,
    EncodingStyle,
    EncodingContent,
    Blending,
    /// `done` of `total` tiles transferred so far.
    Transferring { done: usize, total: usize },
    Reconstructing,
    Done,
    Error,
}

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The pipeline entered a new state.
    Stage(PipelineState),
    /// Tile `index` (0-based) of `total` is complete.
    Tile {
        index: usize,
        total: usize,
        percent: u8,
    },
    /// The run produced an image.
    Finished,
    /// The run failed; no image is produced.
    Failed(String),
}

impl ProgressEvent {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed(_))
    }
}

/// Sending half of a progress channel.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: Sender<ProgressEvent>,
}

impl ProgressSender {
    /// Deliver `event`. A receiver that has gone away is not an error.
    pub fn send(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// Receiving half of a progress channel.
#[derive(Debug, Clone)]
pub struct ProgressReceiver {
    rx: Receiver<ProgressEvent>,
}

impl ProgressReceiver {
    /// Block until the next event, or `None` once every sender is gone.
    #[must_use]
    pub fn recv(&self) -> Option<ProgressEvent> {
        self.rx.recv().ok()
    }

    #[must_use]
    pub fn try_recv(&self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain everything queued and return the newest event.
    #[must_use]
    pub fn latest(&self) -> Option<ProgressEvent> {
        self.rx.try_iter().last()
    }

    /// Blocking iterator over events, ending when every sender is gone.
    pub fn iter(&self) -> impl Iterator<Item = ProgressEvent> + '_ {
        self.rx.iter()
    }
}

/// Create a connected progress sender/receiver pair.
#[must_use]
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (ProgressSender { tx }, ProgressReceiver { rx })
}

/// Cooperative cancellation flag, checked between tiles.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Per-run event emitter enforcing the ordering guarantees.
pub(crate) struct Reporter<'a> {
    sender: Option<&'a ProgressSender>,
    last_percent: u8,
}

impl<'a> Reporter<'a> {
    pub(crate) const fn new(sender: Option<&'a ProgressSender>) -> Self {
        Self {
            sender,
            last_percent: 0,
        }
    }

    pub(crate) fn stage(&self, state: PipelineState) {
        self.emit(ProgressEvent::Stage(state));
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn tile(&mut self, index: usize, total: usize) {
        // Safe: index < total, so the percentage is at most 100
        let percent = ((index + 1) * 100 / total.max(1)).min(100) as u8;
        self.last_percent = self.last_percent.max(percent);
        self.emit(ProgressEvent::Tile {
            index,
            total,
            percent: self.last_percent,
        });
    }

    pub(crate) fn finished(&self) {
        self.emit(ProgressEvent::Finished);
    }

    pub(crate) fn failed(&self, err: &Error) {
        self.emit(ProgressEvent::Failed(err.to_string()));
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = self.sender {
            sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_percentages() {
        let (tx, rx) = progress_channel();
        let mut reporter = Reporter::new(Some(&tx));
        for i in 0..6 {
            reporter.tile(i, 6);
        }
        reporter.finished();
        drop(tx);

        let percents: Vec<u8> = rx
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Tile { percent, .. } => Some(percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![16, 33, 50, 66, 83, 100]);
    }

    #[test]
    fn test_latest_drains() {
        let (tx, rx) = progress_channel();
        tx.send(ProgressEvent::Stage(PipelineState::Blending));
        tx.send(ProgressEvent::Finished);
        assert_eq!(rx.latest(), Some(ProgressEvent::Finished));
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn test_send_without_receiver_is_silent() {
        let (tx, rx) = progress_channel();
        drop(rx);
        tx.send(ProgressEvent::Finished);
    }

    #[test]
    fn test_cancellation_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_terminal_events() {
        assert!(ProgressEvent::Finished.is_terminal());
        assert!(ProgressEvent::Failed("x".into()).is_terminal());
        assert!(!ProgressEvent::Stage(PipelineState::Done).is_terminal());
    }
}
