use std::{mem, vec::IntoIter};

use crate::{
    ContentId, LoadMode, NetworkId, OperationId, OperationKind, PeerId, SceneError, SegmentHandle,
};

/// A load or unload began on this peer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationStarted {
    pub operation: OperationId,
    pub content: ContentId,
    pub mode: LoadMode,
    pub initiator: PeerId,
}

/// One peer finished its side of a load or unload. `segment` is the local
/// handle when the completing peer is this one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerCompletion {
    pub operation: OperationId,
    pub peer: PeerId,
    pub content: ContentId,
    pub segment: Option<SegmentHandle>,
}

/// Final partition of an operation's expected peers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationSummary {
    pub operation: OperationId,
    pub kind: OperationKind,
    pub content: ContentId,
    pub completed: Vec<PeerId>,
    pub timed_out: Vec<PeerId>,
}

pub struct SceneEvents {
    loads: Vec<OperationStarted>,
    unloads: Vec<OperationStarted>,
    load_completes: Vec<PeerCompletion>,
    unload_completes: Vec<PeerCompletion>,
    load_summaries: Vec<OperationSummary>,
    unload_summaries: Vec<OperationSummary>,
    synchronizations: Vec<(PeerId, OperationId)>,
    synchronization_completes: Vec<(PeerId, OperationId)>,
    resynchronizations: Vec<(PeerId, Vec<NetworkId>)>,
    active_segment_changes: Vec<SegmentHandle>,
    object_segment_changes: Vec<(NetworkId, SegmentHandle)>,
    errors: Vec<SceneError>,

    empty: bool,
}

impl SceneEvents {
    pub(crate) fn new() -> Self {
        Self {
            loads: Vec::new(),
            unloads: Vec::new(),
            load_completes: Vec::new(),
            unload_completes: Vec::new(),
            load_summaries: Vec::new(),
            unload_summaries: Vec::new(),
            synchronizations: Vec::new(),
            synchronization_completes: Vec::new(),
            resynchronizations: Vec::new(),
            active_segment_changes: Vec::new(),
            object_segment_changes: Vec::new(),
            errors: Vec::new(),

            empty: true,
        }
    }

    // Public

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn read<V: SceneEvent>(&mut self) -> V::Iter {
        V::iter(self)
    }

    pub fn has<V: SceneEvent>(&self) -> bool {
        V::has(self)
    }

    // Crate-public

    pub(crate) fn push_started(&mut self, kind: OperationKind, started: OperationStarted) {
        match kind {
            OperationKind::Load => self.loads.push(started),
            _ => self.unloads.push(started),
        }
        self.empty = false;
    }

    pub(crate) fn push_peer_completion(&mut self, kind: OperationKind, completion: PeerCompletion) {
        match kind {
            OperationKind::Load => self.load_completes.push(completion),
            _ => self.unload_completes.push(completion),
        }
        self.empty = false;
    }

    pub(crate) fn push_summary(&mut self, summary: OperationSummary) {
        match summary.kind {
            OperationKind::Load => self.load_summaries.push(summary),
            _ => self.unload_summaries.push(summary),
        }
        self.empty = false;
    }

    pub(crate) fn push_synchronization(&mut self, peer: PeerId, operation: OperationId) {
        self.synchronizations.push((peer, operation));
        self.empty = false;
    }

    pub(crate) fn push_synchronization_complete(&mut self, peer: PeerId, operation: OperationId) {
        self.synchronization_completes.push((peer, operation));
        self.empty = false;
    }

    pub(crate) fn push_resynchronization(&mut self, peer: PeerId, despawned: Vec<NetworkId>) {
        self.resynchronizations.push((peer, despawned));
        self.empty = false;
    }

    pub(crate) fn push_active_segment_change(&mut self, segment: SegmentHandle) {
        self.active_segment_changes.push(segment);
        self.empty = false;
    }

    pub(crate) fn push_object_segment_change(&mut self, network_id: NetworkId, segment: SegmentHandle) {
        self.object_segment_changes.push((network_id, segment));
        self.empty = false;
    }

    pub(crate) fn push_error(&mut self, error: SceneError) {
        error.log();
        self.errors.push(error);
        self.empty = false;
    }
}

impl Default for SceneEvents {
    fn default() -> Self {
        Self::new()
    }
}

// Event Trait
pub trait SceneEvent {
    type Iter;

    fn iter(events: &mut SceneEvents) -> Self::Iter;

    fn has(events: &SceneEvents) -> bool;
}

macro_rules! scene_event {
    ($(#[$meta:meta])* $name:ident, $field:ident, $item:ty) => {
        $(#[$meta])*
        pub struct $name;
        impl SceneEvent for $name {
            type Iter = IntoIter<$item>;

            fn iter(events: &mut SceneEvents) -> Self::Iter {
                let list = mem::take(&mut events.$field);
                IntoIterator::into_iter(list)
            }

            fn has(events: &SceneEvents) -> bool {
                !events.$field.is_empty()
            }
        }
    };
}

scene_event!(
    /// A load started on this peer
    LoadEvent, loads, OperationStarted
);
scene_event!(
    /// An unload started on this peer
    UnloadEvent, unloads, OperationStarted
);
scene_event!(LoadCompleteEvent, load_completes, PeerCompletion);
scene_event!(UnloadCompleteEvent, unload_completes, PeerCompletion);
scene_event!(
    /// Every expected peer finished the load or timed out
    LoadOperationCompletedEvent, load_summaries, OperationSummary
);
scene_event!(UnloadOperationCompletedEvent, unload_summaries, OperationSummary);
scene_event!(
    /// Synchronization began, with the joining peer on the authority and the
    /// authority on the joining peer
    SynchronizeEvent, synchronizations, (PeerId, OperationId)
);
scene_event!(SynchronizeCompleteEvent, synchronization_completes, (PeerId, OperationId));
scene_event!(
    /// Entities despawned while this peer was synchronizing
    ReSynchronizeEvent, resynchronizations, (PeerId, Vec<NetworkId>)
);
scene_event!(ActiveSegmentChangedEvent, active_segment_changes, SegmentHandle);
scene_event!(ObjectSegmentChangedEvent, object_segment_changes, (NetworkId, SegmentHandle));
scene_event!(ErrorEvent, errors, SceneError);
