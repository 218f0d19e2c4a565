use std::{
    collections::{HashMap, HashSet, VecDeque},
    time::Duration,
};

use log::{info, warn};

use crate::{
    messages::payload::{EntitySnapshot, SyncSegment},
    Instant, InstantOffset, LoadMode, NetworkId, OperationId, PeerId, SceneError, SegmentHandle,
};

// Observer side

/// The ordered steps a joining peer walks through to reach parity with the
/// authority. Steps complete strictly in list order.
pub struct SyncSequence {
    operation: OperationId,
    authority: PeerId,
    mode: LoadMode,
    steps: Vec<SyncSegment>,
    cursor: usize,
    global: Vec<EntitySnapshot>,
    deadline: Instant,
    used: Vec<SegmentHandle>,
}

impl SyncSequence {
    pub fn new(
        operation: OperationId,
        authority: PeerId,
        mode: LoadMode,
        steps: Vec<SyncSegment>,
        global: Vec<EntitySnapshot>,
        now: &Instant,
        timeout: Duration,
    ) -> Self {
        Self {
            operation,
            authority,
            mode,
            steps,
            cursor: 0,
            global,
            deadline: now.offset(timeout),
            used: Vec::new(),
        }
    }

    pub fn operation(&self) -> OperationId {
        self.operation
    }

    pub fn authority(&self) -> PeerId {
        self.authority
    }

    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    pub fn is_expired(&self, now: &Instant) -> bool {
        !self.deadline.is_after(now)
    }

    pub fn completed_steps(&self) -> usize {
        self.cursor
    }

    pub fn step(&self, index: usize) -> Option<&SyncSegment> {
        self.steps.get(index)
    }

    pub fn current_step(&self) -> Option<(usize, &SyncSegment)> {
        self.steps.get(self.cursor).map(|step| (self.cursor, step))
    }

    /// In `Single` mode the first segment replaces whatever the peer had
    /// loaded, every later segment is loaded next to it
    pub fn step_mode(&self, index: usize) -> LoadMode {
        if self.mode == LoadMode::Single && index == 0 {
            LoadMode::Single
        } else {
            LoadMode::Additive
        }
    }

    /// Marks step `index` applied, with `local` as the segment that now
    /// backs it. Any step other than the pending one is a protocol violation.
    pub fn complete_step(&mut self, index: usize, local: SegmentHandle) -> Result<(), SceneError> {
        if index != self.cursor {
            return Err(SceneError::ProtocolViolation {
                peer: self.authority,
                message: "Synchronize",
                reason: format!(
                    "step {} applied while step {} is pending in {:?}",
                    index, self.cursor, self.operation
                ),
            });
        }
        self.used.push(local);
        self.cursor += 1;
        Ok(())
    }

    /// Moves the entity payload of step `index` out, leaving its content and
    /// handle in place
    pub fn take_payload(&mut self, index: usize) -> Option<SyncSegment> {
        let step = self.steps.get_mut(index)?;
        Some(SyncSegment {
            content: step.content,
            handle: step.handle,
            placed: std::mem::take(&mut step.placed),
            entities: std::mem::take(&mut step.entities),
        })
    }

    /// Local segments backing a completed step
    pub fn uses(&self, local: &SegmentHandle) -> bool {
        self.used.contains(local)
    }

    pub fn take_global(&mut self) -> Vec<EntitySnapshot> {
        std::mem::take(&mut self.global)
    }
}

// Authority side

pub struct InFlightSync {
    pub operation: OperationId,
    deadline: Instant,
    entities: HashSet<NetworkId>,
    pub despawned: Vec<NetworkId>,
}

/// Joining peers waiting for, or going through, synchronization. With
/// `serialize` set only one synchronization is in flight at a time and the
/// others wait in arrival order.
pub struct SyncQueue {
    pending: VecDeque<PeerId>,
    in_flight: HashMap<PeerId, InFlightSync>,
    serialize: bool,
}

impl SyncQueue {
    pub fn new(serialize: bool) -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: HashMap::new(),
            serialize,
        }
    }

    /// Returns false if the peer is already queued or synchronizing
    pub fn enqueue(&mut self, peer: PeerId) -> bool {
        if self.pending.contains(&peer) || self.in_flight.contains_key(&peer) {
            return false;
        }
        self.pending.push_back(peer);
        true
    }

    /// Forgets the peer wherever it is. Returns true if it was known.
    pub fn remove_peer(&mut self, peer: &PeerId) -> bool {
        let queued = match self.pending.iter().position(|queued| queued == peer) {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        };
        let in_flight = self.in_flight.remove(peer).is_some();
        queued || in_flight
    }

    fn can_start(&self) -> bool {
        !self.pending.is_empty() && (!self.serialize || self.in_flight.is_empty())
    }

    pub fn pop_next(&mut self) -> Option<PeerId> {
        if !self.can_start() {
            return None;
        }
        self.pending.pop_front()
    }

    /// `entities` are the network ids sent in the peer's Synchronize message,
    /// their despawns are recorded until the peer completes
    pub fn start<I: IntoIterator<Item = NetworkId>>(
        &mut self,
        peer: PeerId,
        operation: OperationId,
        now: &Instant,
        timeout: Duration,
        entities: I,
    ) {
        self.in_flight.insert(
            peer,
            InFlightSync {
                operation,
                deadline: now.offset(timeout),
                entities: entities.into_iter().collect(),
                despawned: Vec::new(),
            },
        );
    }

    fn in_flight_operation(&self, peer: &PeerId) -> Option<OperationId> {
        self.in_flight.get(peer).map(|sync| sync.operation)
    }

    /// Ends the peer's synchronization if `operation` matches the one in flight
    pub fn complete(&mut self, peer: &PeerId, operation: &OperationId) -> Option<InFlightSync> {
        if self.in_flight_operation(peer) != Some(*operation) {
            return None;
        }
        self.in_flight.remove(peer)
    }

    pub fn record_despawn(&mut self, network_id: &NetworkId) {
        for sync in self.in_flight.values_mut() {
            if sync.entities.remove(network_id) {
                sync.despawned.push(*network_id);
            }
        }
    }

    /// Drops and returns every synchronization past its deadline
    pub fn expire(&mut self, now: &Instant) -> Vec<(PeerId, OperationId)> {
        let expired: Vec<(PeerId, OperationId)> = self
            .in_flight
            .iter()
            .filter(|(_, sync)| !sync.deadline.is_after(now))
            .map(|(peer, sync)| (*peer, sync.operation))
            .collect();

        for (peer, operation) in &expired {
            warn!("synchronization {:?} of {:?} expired", operation, peer);
            self.in_flight.remove(peer);
        }

        expired
    }

    pub fn clear(&mut self) {
        if !self.pending.is_empty() || !self.in_flight.is_empty() {
            info!(
                "dropping {} queued and {} in-flight synchronizations",
                self.pending.len(),
                self.in_flight.len()
            );
        }
        self.pending.clear();
        self.in_flight.clear();
    }

    pub fn is_syncing(&self) -> bool {
        !self.in_flight.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
