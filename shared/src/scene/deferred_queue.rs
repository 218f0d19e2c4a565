use std::collections::VecDeque;

use crate::PeerId;

/// An entity-creation notification received mid-transition, kept as raw bytes
/// so it can be decoded later exactly as it arrived
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeferredCreation {
    pub sender: PeerId,
    pub payload: Box<[u8]>,
}

/// Buffers entity creations while a segment transition is in progress, so
/// nothing is instantiated into a segment that is about to be torn down
pub struct DeferredQueue {
    entries: VecDeque<DeferredCreation>,
    transitioning: bool,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            transitioning: false,
        }
    }

    pub fn begin_transition(&mut self) {
        self.transitioning = true;
    }

    pub fn is_transitioning(&self) -> bool {
        self.transitioning
    }

    /// Returns false and keeps nothing if no transition is in progress, the
    /// caller should apply the creation immediately instead
    pub fn defer(&mut self, sender: PeerId, payload: &[u8]) -> bool {
        if !self.transitioning {
            return false;
        }
        self.entries.push_back(DeferredCreation {
            sender,
            payload: payload.into(),
        });
        true
    }

    /// Ends the transition and hands every buffered creation to `replay` in
    /// arrival order. Does nothing when no transition is in progress.
    pub fn end_transition<F: FnMut(DeferredCreation)>(&mut self, mut replay: F) {
        if !self.transitioning {
            return;
        }
        self.transitioning = false;
        while let Some(entry) = self.entries.pop_front() {
            replay(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DeferredQueue {
    fn default() -> Self {
        Self::new()
    }
}
