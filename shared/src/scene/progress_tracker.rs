use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use log::debug;

use crate::{Instant, InstantOffset, OperationId, OperationKind, PeerId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressStatus {
    InProgress,
    /// Every remaining expected peer finished and the local side is done
    Finished,
    /// Deadline reached first, pending peers are reported as timed out
    TimedOut,
}

/// Tracks one in-flight load or unload across the peers expected to apply it.
///
/// The expected set is a snapshot taken at construction. A peer's entry only
/// moves from pending to finished, except when the peer disconnects, which
/// removes the entry and reports the peer as timed out.
pub struct ProgressTracker {
    operation: OperationId,
    kind: OperationKind,
    peers: BTreeMap<PeerId, bool>,
    disconnected: BTreeSet<PeerId>,
    local_done: bool,
    deadline: Instant,
    status: ProgressStatus,
}

impl ProgressTracker {
    pub fn new<I: IntoIterator<Item = PeerId>>(
        operation: OperationId,
        kind: OperationKind,
        connected: I,
        initiator: &PeerId,
        now: &Instant,
        timeout: Duration,
    ) -> Self {
        let peers = connected
            .into_iter()
            .filter(|peer| peer != initiator)
            .map(|peer| (peer, false))
            .collect();

        Self {
            operation,
            kind,
            peers,
            disconnected: BTreeSet::new(),
            local_done: false,
            deadline: now.offset(timeout),
            status: ProgressStatus::InProgress,
        }
    }

    pub fn status(&self) -> ProgressStatus {
        self.status
    }

    pub fn is_finished(&self) -> bool {
        self.status != ProgressStatus::InProgress
    }

    /// Some(true) once finished, Some(false) while pending, None if the peer
    /// was never expected or has disconnected
    pub fn peer_status(&self, peer: &PeerId) -> Option<bool> {
        self.peers.get(peer).copied()
    }

    /// Idempotent. Returns true if the acknowledgement was recorded, false if
    /// the peer is not expected or the operation already finished.
    pub fn mark_peer_finished(&mut self, peer: &PeerId) -> bool {
        if self.is_finished() {
            return false;
        }
        let Some(finished) = self.peers.get_mut(peer) else {
            debug!(
                "ignoring completion from {:?} for {:?}, peer not expected",
                peer, self.operation
            );
            return false;
        };
        *finished = true;
        self.check_finished();
        true
    }

    pub fn on_peer_disconnected(&mut self, peer: &PeerId) {
        if self.peers.remove(peer).is_none() {
            return;
        }
        self.disconnected.insert(*peer);
        if !self.is_finished() {
            self.check_finished();
        }
    }

    pub fn set_local_done(&mut self) {
        self.local_done = true;
        self.check_finished();
    }

    pub fn is_local_done(&self) -> bool {
        self.local_done
    }

    /// Periodic check. Returns true once the operation is finished, either by
    /// completion or by reaching its deadline.
    pub fn update(&mut self, now: &Instant) -> bool {
        if self.is_finished() {
            return true;
        }

        self.check_finished();

        if !self.is_finished() && !self.deadline.is_after(now) {
            debug!("{} operation {:?} reached its deadline", self.kind.name(), self.operation);
            self.status = ProgressStatus::TimedOut;
        }

        self.is_finished()
    }

    fn check_finished(&mut self) {
        if self.status != ProgressStatus::InProgress {
            return;
        }
        if self.local_done && self.peers.values().all(|finished| *finished) {
            self.status = ProgressStatus::Finished;
        }
    }

    /// Peers still connected and expected to apply the operation
    pub fn expected_peers(&self) -> impl Iterator<Item = &PeerId> {
        self.peers.keys()
    }

    pub fn completed_peers(&self) -> Vec<PeerId> {
        self.peers
            .iter()
            .filter(|(_, finished)| **finished)
            .map(|(peer, _)| *peer)
            .collect()
    }

    /// Peers that never finished, disconnected peers included. Together with
    /// `completed_peers` this partitions the expected set.
    pub fn timed_out_peers(&self) -> Vec<PeerId> {
        let mut output: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, finished)| !**finished)
            .map(|(peer, _)| *peer)
            .chain(self.disconnected.iter().copied())
            .collect();
        output.sort();
        output
    }
}
