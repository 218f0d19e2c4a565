use std::{
    collections::{BTreeSet, HashSet, VecDeque},
    fmt::Debug,
    hash::Hash,
    mem,
};

use log::{debug, info, warn};

use crate::{
    catalog::SegmentCatalog,
    messages::{
        payload::{EntitySnapshot, PlacedEntityState, SyncSegment},
        scene_message::SceneMessage,
    },
    scene::{
        deferred_queue::DeferredQueue,
        events::{OperationStarted, OperationSummary, PeerCompletion, SceneEvents},
        handle_table::HandleTable,
        loader::{AsyncSegmentOp, AsyncStatus, SegmentLoader},
        placement_registry::PlacementRegistry,
        progress_tracker::{ProgressStatus, ProgressTracker},
        sync_sequencer::{SyncQueue, SyncSequence},
        world::SceneWorld,
    },
    ContentId, Instant, InstantOffset, LoadMode, NetworkId, OperationId, OperationKind, PeerId,
    SceneConfig, SceneError, SegmentHandle, Timer,
};

/// What the validation hook is asked to accept or reject
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidationRequest {
    pub kind: OperationKind,
    pub content: ContentId,
    pub mode: LoadMode,
}

pub type ValidationFn = Box<dyn Fn(&ValidationRequest) -> bool>;

enum Phase {
    /// `Single` loads unload every additive segment before the load begins
    TearingDown(Vec<(SegmentHandle, Box<dyn AsyncSegmentOp>)>),
    Loading(Box<dyn AsyncSegmentOp>),
    Unloading(Box<dyn AsyncSegmentOp>),
    /// Local side done, waiting on acknowledgements or on the summary
    Awaiting,
}

struct LiveOperation {
    operation: OperationId,
    kind: OperationKind,
    content: ContentId,
    mode: LoadMode,
    initiator: PeerId,
    session: SegmentHandle,
    local: SegmentHandle,
    placed: Vec<PlacedEntityState>,
    phase: Phase,
    /// Only set when this peer runs the operation as authority
    tracker: Option<ProgressTracker>,
    deadline: Instant,
}

impl LiveOperation {
    fn is_awaiting(&self) -> bool {
        matches!(self.phase, Phase::Awaiting)
    }
}

enum SequenceWork {
    Loading {
        index: usize,
        work: Box<dyn AsyncSegmentOp>,
    },
    CleaningUp {
        local: SegmentHandle,
        work: Box<dyn AsyncSegmentOp>,
    },
}

/// Engine work that outlived the operation that started it. Still polled so
/// the handle table matches what the engine actually has loaded.
struct DetachedOp {
    work: Box<dyn AsyncSegmentOp>,
    content: ContentId,
    mode: LoadMode,
    session: SegmentHandle,
    unloading: Option<SegmentHandle>,
    /// Holding-area entities wait for this load to land
    rehome: bool,
}

/// Per-peer state machine driving segment loads, unloads and
/// synchronization of joining peers.
///
/// Everything here runs on the caller's tick: requests return immediately,
/// engine work is polled from `update`, and messages are handed in through
/// `receive_message`. Outgoing messages and events are queued and drained by
/// the host with `take_outgoing_messages` and `take_events`.
pub struct OperationCoordinator<E: Copy + Eq + Hash + Debug> {
    config: SceneConfig,
    catalog: SegmentCatalog,
    loader: Box<dyn SegmentLoader>,
    validation: Option<ValidationFn>,
    local_peer: PeerId,
    authority: Option<PeerId>,
    connected: BTreeSet<PeerId>,
    synchronized: BTreeSet<PeerId>,
    handles: HandleTable,
    placements: PlacementRegistry<E>,
    deferred: DeferredQueue,
    active_segment: Option<SegmentHandle>,
    next_operation: u32,
    active: Option<LiveOperation>,
    backlog: VecDeque<(PeerId, SceneMessage)>,
    sync_queue: SyncQueue,
    sequence: Option<SyncSequence>,
    sequence_work: Option<SequenceWork>,
    relocation_pending: bool,
    detached: Vec<DetachedOp>,
    check_timer: Option<Timer>,
    outbox: Vec<(PeerId, SceneMessage)>,
    events: SceneEvents,
}

impl<E: Copy + Eq + Hash + Debug> OperationCoordinator<E> {
    pub fn new(
        config: SceneConfig,
        mut catalog: SegmentCatalog,
        loader: Box<dyn SegmentLoader>,
        local_peer: PeerId,
        authority: Option<PeerId>,
    ) -> Self {
        if !catalog.is_locked() {
            catalog.lock();
        }
        let sync_queue = SyncQueue::new(config.serialize_synchronization);

        Self {
            config,
            catalog,
            loader,
            validation: None,
            local_peer,
            authority,
            connected: BTreeSet::new(),
            synchronized: BTreeSet::new(),
            handles: HandleTable::new(),
            placements: PlacementRegistry::new(),
            deferred: DeferredQueue::new(),
            active_segment: None,
            next_operation: 1,
            active: None,
            backlog: VecDeque::new(),
            sync_queue,
            sequence: None,
            sequence_work: None,
            relocation_pending: false,
            detached: Vec::new(),
            check_timer: None,
            outbox: Vec::new(),
            events: SceneEvents::new(),
        }
    }

    /// Installs the hook consulted before every load, unload and
    /// synchronization step. Returning false rejects the request.
    pub fn set_validation<F: Fn(&ValidationRequest) -> bool + 'static>(&mut self, validation: F) {
        self.validation = Some(Box::new(validation));
    }

    // Accessors

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SegmentCatalog {
        &self.catalog
    }

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    pub fn authority(&self) -> Option<PeerId> {
        self.authority
    }

    pub fn is_authority(&self) -> bool {
        self.authority == Some(self.local_peer)
    }

    pub fn active_segment(&self) -> Option<SegmentHandle> {
        self.active_segment
    }

    /// Id and kind of the load or unload currently holding this peer's lock
    pub fn active_operation(&self) -> Option<(OperationId, OperationKind)> {
        self.active.as_ref().map(|live| (live.operation, live.kind))
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub fn placements(&self) -> &PlacementRegistry<E> {
        &self.placements
    }

    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.connected.contains(peer)
    }

    pub fn is_synchronized(&self, peer: &PeerId) -> bool {
        self.synchronized.contains(peer)
    }

    pub fn synchronized_peers(&self) -> impl Iterator<Item = &PeerId> {
        self.synchronized.iter()
    }

    /// True on a joining peer while its synchronization sequence runs
    pub fn is_synchronizing(&self) -> bool {
        self.sequence.is_some()
    }

    /// True on the authority while any peer's synchronization is in flight
    pub fn is_onboarding(&self) -> bool {
        self.sync_queue.is_syncing()
    }

    pub fn queued_synchronizations(&self) -> usize {
        self.sync_queue.pending_len()
    }

    pub fn deferred_creations(&self) -> usize {
        self.deferred.len()
    }

    pub fn take_outgoing_messages(&mut self) -> Vec<(PeerId, SceneMessage)> {
        mem::take(&mut self.outbox)
    }

    pub fn take_events(&mut self) -> SceneEvents {
        mem::take(&mut self.events)
    }

    // Requests

    /// Starts loading `content` on the authority. Observers follow once the
    /// authority's local load is done.
    pub fn request_load<W: SceneWorld<E>>(
        &mut self,
        content: ContentId,
        mode: LoadMode,
        now: &Instant,
        world: &mut W,
    ) -> Result<OperationId, SceneError> {
        self.check_can_start(OperationKind::Load)?;

        if !self.catalog.contains(&content) {
            return Err(rejected(SceneError::InvalidTarget {
                content,
                reason: "segment is not in the catalog",
            }));
        }
        if !self.validate(OperationKind::Load, content, mode) {
            return Err(rejected(SceneError::FailedValidation {
                kind: OperationKind::Load,
                content,
                mode,
            }));
        }

        let operation = self.next_operation_id();
        let live = self.authority_operation(operation, OperationKind::Load, content, mode, now);
        info!("starting load {:?} of {:?} ({:?})", operation, content, mode);
        self.push_started(&live);

        if let Err(error) = self.start_load(live, world) {
            error.log();
            self.try_start_synchronizations(now, world);
            return Err(error);
        }
        Ok(operation)
    }

    pub fn request_load_by_name<W: SceneWorld<E>>(
        &mut self,
        name: &str,
        mode: LoadMode,
        now: &Instant,
        world: &mut W,
    ) -> Result<OperationId, SceneError> {
        match self.catalog.content_id(name) {
            Some(content) => self.request_load(content, mode, now, world),
            None => Err(rejected(SceneError::InvalidTarget {
                content: ContentId::from_name(name),
                reason: "segment is not in the catalog",
            })),
        }
    }

    /// Starts unloading the segment instance known locally as `local`
    pub fn request_unload<W: SceneWorld<E>>(
        &mut self,
        local: SegmentHandle,
        now: &Instant,
        world: &mut W,
    ) -> Result<OperationId, SceneError> {
        self.check_can_start(OperationKind::Unload)?;

        let Some(instance) = self.handles.instance(&local) else {
            return Err(rejected(SceneError::NotLoaded { handle: local }));
        };
        let (content, mode, session) = (instance.content, instance.mode, instance.session);

        if self.active_segment == Some(local) {
            return Err(rejected(SceneError::InvalidTarget {
                content,
                reason: "cannot unload the active segment",
            }));
        }
        if !self.validate(OperationKind::Unload, content, mode) {
            return Err(rejected(SceneError::FailedValidation {
                kind: OperationKind::Unload,
                content,
                mode,
            }));
        }

        let operation = self.next_operation_id();
        let mut live = self.authority_operation(operation, OperationKind::Unload, content, mode, now);
        live.session = session;
        live.local = local;
        info!("starting unload {:?} of {:?}", operation, local);
        self.push_started(&live);

        if let Err(error) = self.start_unload(live, world) {
            error.log();
            self.try_start_synchronizations(now, world);
            return Err(error);
        }
        Ok(operation)
    }

    /// Makes `local` the primary segment on every peer
    pub fn set_active_segment(&mut self, local: SegmentHandle) -> Result<(), SceneError> {
        self.check_can_start(OperationKind::ActiveSegmentChanged)?;

        let Some(instance) = self.handles.instance(&local) else {
            return Err(rejected(SceneError::NotLoaded { handle: local }));
        };
        let message = SceneMessage::ActiveSegmentChanged {
            content: instance.content,
            handle: instance.session,
        };

        self.active_segment = Some(local);
        self.broadcast(&message);
        self.events.push_active_segment_change(local);
        Ok(())
    }

    /// Moves a network entity into the segment known locally as `local`, on
    /// this peer and every synchronized observer
    pub fn move_entity_to_segment<W: SceneWorld<E>>(
        &mut self,
        network_id: NetworkId,
        local: SegmentHandle,
        world: &mut W,
    ) -> Result<(), SceneError> {
        self.check_can_start(OperationKind::ObjectMigrated)?;

        let Some(instance) = self.handles.instance(&local) else {
            return Err(rejected(SceneError::NotLoaded { handle: local }));
        };
        let (content, session) = (instance.content, instance.session);

        if !world.move_entity_to_segment(network_id, local) {
            return Err(rejected(SceneError::InvalidTarget {
                content,
                reason: "entity to migrate does not exist",
            }));
        }

        self.broadcast(&SceneMessage::ObjectSegmentChanged {
            network_id,
            handle: session,
        });
        self.events.push_object_segment_change(network_id, local);
        Ok(())
    }

    /// Declares a segment this peer loaded on its own, so synchronization can
    /// reuse it instead of loading the same content again
    pub fn track_local_segment(
        &mut self,
        content: ContentId,
        local: SegmentHandle,
        mode: LoadMode,
    ) -> Result<(), SceneError> {
        if !self.catalog.contains(&content) {
            return Err(rejected(SceneError::InvalidTarget {
                content,
                reason: "segment is not in the catalog",
            }));
        }
        if local.is_none() {
            return Err(rejected(SceneError::InvalidTarget {
                content,
                reason: "reserved segment handle",
            }));
        }

        self.handles.track_local(local, content, mode);
        if self.is_authority() {
            self.bind_tracked_segments();
        }
        if mode == LoadMode::Single || self.active_segment.is_none() {
            self.active_segment = Some(local);
        }
        Ok(())
    }

    // Peers

    pub fn peer_connected(&mut self, peer: PeerId) {
        if peer == self.local_peer {
            return;
        }
        self.connected.insert(peer);
    }

    /// Counts a connected peer as synchronized without sending it anything
    pub fn admit_peer(&mut self, peer: PeerId) {
        self.peer_connected(peer);
        if peer != self.local_peer {
            self.synchronized.insert(peer);
        }
    }

    /// Queues `peer` to be brought up to date with the authority's segments.
    /// It receives live operations only once its synchronization completes.
    pub fn synchronize_peer<W: SceneWorld<E>>(
        &mut self,
        peer: PeerId,
        now: &Instant,
        world: &mut W,
    ) -> Result<(), SceneError> {
        if !self.is_authority() {
            return Err(rejected(SceneError::NotAuthority {
                kind: OperationKind::Synchronize,
            }));
        }
        if peer == self.local_peer {
            return Ok(());
        }

        self.peer_connected(peer);
        self.synchronized.remove(&peer);
        if self.sync_queue.enqueue(peer) {
            debug!("queued synchronization of {:?}", peer);
        }
        self.try_start_synchronizations(now, world);
        Ok(())
    }

    pub fn peer_disconnected<W: SceneWorld<E>>(&mut self, peer: PeerId, now: &Instant, world: &mut W) {
        self.connected.remove(&peer);
        self.synchronized.remove(&peer);

        if self.sync_queue.remove_peer(&peer) {
            info!("dropped synchronization of disconnected {:?}", peer);
        }
        if let Some(tracker) = self.active.as_mut().and_then(|live| live.tracker.as_mut()) {
            tracker.on_peer_disconnected(&peer);
        }
        self.settle_active(now, world);
        self.try_start_synchronizations(now, world);

        if Some(peer) == self.authority && !self.is_authority() {
            warn!("session authority {:?} disconnected", peer);
        }
    }

    /// Hands session authority to `peer`. Only the permission to start
    /// operations moves, every peer keeps its own tables.
    pub fn set_authority<W: SceneWorld<E>>(&mut self, peer: PeerId, now: &Instant, world: &mut W) {
        let was_authority = self.is_authority();
        self.authority = Some(peer);
        let is_authority = self.is_authority();

        if was_authority == is_authority {
            return;
        }

        if is_authority {
            info!("{:?} took over session authority", self.local_peer);
            if let Some(live) = self.active.take() {
                warn!("abandoning observed {:?} after authority handoff", live.operation);
                self.release_locally(live, world);
            }
            if let Some(operation) = self.sequence.as_ref().map(|sequence| sequence.operation()) {
                self.abort_sequence(
                    SceneError::InternalError {
                        operation: Some(operation),
                        kind: OperationKind::Synchronize,
                        context: "session authority changed during synchronization".to_string(),
                    },
                    world,
                );
            }
            self.backlog.clear();
            self.bind_tracked_segments();
            self.synchronized = self.connected.clone();
        } else {
            info!("{:?} handed session authority to {:?}", self.local_peer, peer);
            if let Some(live) = self.active.take() {
                self.finish_authority_operation(live, now, world);
            }
            self.sync_queue.clear();
            self.synchronized.clear();
        }
    }

    // Entity intake

    /// Applies an entity creation now, or holds it back until the current
    /// segment transition is done
    pub fn receive_entity_creation<W: SceneWorld<E>>(
        &mut self,
        sender: PeerId,
        payload: &[u8],
        world: &mut W,
    ) {
        if self.deferred.defer(sender, payload) {
            debug!("deferred entity creation from {:?}", sender);
            return;
        }
        world.create_entity(sender, payload);
    }

    /// Parks entities spawned while a `Single` load swaps segments out
    pub fn notify_entity_spawned<W: SceneWorld<E>>(&mut self, entity: &E, world: &mut W) {
        if self.relocation_pending {
            world.park_in_holding_area(entity);
        }
    }

    pub fn notify_entity_despawned(&mut self, network_id: &NetworkId) {
        self.sync_queue.record_despawn(network_id);
    }

    // Tick

    pub fn update<W: SceneWorld<E>>(&mut self, now: &Instant, world: &mut W) {
        self.poll_detached(world);
        self.poll_active(now, world);
        self.drive_sequence(world);

        let check = match self.check_timer.as_mut() {
            Some(timer) => {
                if timer.ringing(now) {
                    timer.reset(now);
                    true
                } else {
                    false
                }
            }
            None => {
                self.check_timer = Some(Timer::new(self.config.progress_check_interval, now));
                true
            }
        };
        if check {
            self.check_deadlines(now, world);
        }

        self.drain_backlog(now, world);
        self.try_start_synchronizations(now, world);
    }

    // Messages

    pub fn receive_message<W: SceneWorld<E>>(
        &mut self,
        sender: PeerId,
        message: SceneMessage,
        now: &Instant,
        world: &mut W,
    ) {
        if let Some(operation) = message.operation() {
            self.note_operation(operation);
        }

        let result = if self.is_authority() {
            self.receive_as_authority(sender, message, now, world)
        } else {
            self.receive_as_observer(sender, message, now, world)
        };
        if let Err(error) = result {
            self.events.push_error(error);
        }

        self.drain_backlog(now, world);
    }

    fn receive_as_authority<W: SceneWorld<E>>(
        &mut self,
        sender: PeerId,
        message: SceneMessage,
        now: &Instant,
        world: &mut W,
    ) -> Result<(), SceneError> {
        let name = message.name();
        if !self.connected.contains(&sender) {
            return Err(violation(sender, name, "sender is not connected"));
        }

        match message {
            SceneMessage::LoadComplete { operation, .. } => {
                self.acknowledge(sender, OperationKind::Load, operation, name, now, world)
            }
            SceneMessage::UnloadComplete { operation, .. } => {
                self.acknowledge(sender, OperationKind::Unload, operation, name, now, world)
            }
            SceneMessage::SynchronizeComplete { operation } => {
                let Some(sync) = self.sync_queue.complete(&sender, &operation) else {
                    return Err(violation(sender, name, "no matching synchronization in flight"));
                };

                self.synchronized.insert(sender);
                if self.config.resynchronize && !sync.despawned.is_empty() {
                    debug!(
                        "resynchronizing {:?} with {} despawned entities",
                        sender,
                        sync.despawned.len()
                    );
                    self.outbox.push((
                        sender,
                        SceneMessage::ReSynchronize {
                            operation,
                            despawned: sync.despawned,
                        },
                    ));
                }
                info!("{:?} completed synchronization {:?}", sender, operation);
                self.events.push_synchronization_complete(sender, operation);
                self.try_start_synchronizations(now, world);
                Ok(())
            }
            _ => Err(violation(sender, name, "only observers accept this message")),
        }
    }

    fn acknowledge<W: SceneWorld<E>>(
        &mut self,
        sender: PeerId,
        kind: OperationKind,
        operation: OperationId,
        name: &'static str,
        now: &Instant,
        world: &mut W,
    ) -> Result<(), SceneError> {
        let Some(live) = self.active.as_mut() else {
            debug!("late {} for {:?} from {:?}", name, operation, sender);
            return Ok(());
        };
        if live.operation != operation {
            if operation < live.operation {
                debug!("late {} for {:?} from {:?}", name, operation, sender);
                return Ok(());
            }
            return Err(violation(sender, name, format!("unknown operation {:?}", operation)));
        }
        if live.kind != kind {
            return Err(violation(
                sender,
                name,
                format!("{:?} is a {} operation", operation, live.kind.name()),
            ));
        }
        let Some(tracker) = live.tracker.as_mut() else {
            return Err(violation(sender, name, "operation is not run by this peer"));
        };

        if tracker.mark_peer_finished(&sender) {
            self.events.push_peer_completion(
                kind,
                PeerCompletion {
                    operation,
                    peer: sender,
                    content: live.content,
                    segment: None,
                },
            );
        }
        self.settle_active(now, world);
        Ok(())
    }

    fn receive_as_observer<W: SceneWorld<E>>(
        &mut self,
        sender: PeerId,
        message: SceneMessage,
        now: &Instant,
        world: &mut W,
    ) -> Result<(), SceneError> {
        let name = message.name();
        if self.authority != Some(sender) {
            return Err(violation(sender, name, "sender is not the session authority"));
        }

        if matches!(message, SceneMessage::Load { .. } | SceneMessage::Unload { .. }) {
            return self.accept_live_message(sender, message, now, world);
        }

        match message {
            SceneMessage::LoadOperationCompleted {
                operation,
                content,
                completed,
                timed_out,
                ..
            } => self.observe_summary(
                sender,
                name,
                OperationSummary {
                    operation,
                    kind: OperationKind::Load,
                    content,
                    completed,
                    timed_out,
                },
                now,
                world,
            ),
            SceneMessage::UnloadOperationCompleted {
                operation,
                content,
                completed,
                timed_out,
            } => self.observe_summary(
                sender,
                name,
                OperationSummary {
                    operation,
                    kind: OperationKind::Unload,
                    content,
                    completed,
                    timed_out,
                },
                now,
                world,
            ),
            SceneMessage::Synchronize {
                operation,
                mode,
                segments,
                global,
            } => self.observe_synchronize(sender, operation, mode, segments, global, now, world),
            SceneMessage::ReSynchronize { despawned, .. } => {
                for network_id in &despawned {
                    world.despawn_network_entity(*network_id);
                }
                self.events.push_resynchronization(sender, despawned);
                Ok(())
            }
            SceneMessage::ActiveSegmentChanged { handle, .. } => {
                let Some(local) = self.handles.session_to_local(&handle) else {
                    return Err(SceneError::NotLoaded { handle });
                };
                self.active_segment = Some(local);
                self.events.push_active_segment_change(local);
                Ok(())
            }
            SceneMessage::ObjectSegmentChanged { network_id, handle } => {
                let Some(local) = self.handles.session_to_local(&handle) else {
                    return Err(SceneError::NotLoaded { handle });
                };
                if !world.move_entity_to_segment(network_id, local) {
                    warn!("cannot migrate unknown entity {:?} to {:?}", network_id, local);
                }
                self.events.push_object_segment_change(network_id, local);
                Ok(())
            }
            _ => Err(violation(sender, name, "only the authority accepts this message")),
        }
    }

    /// Load or Unload from the authority. Held back while this peer is still
    /// applying the previous operation locally.
    fn accept_live_message<W: SceneWorld<E>>(
        &mut self,
        sender: PeerId,
        message: SceneMessage,
        now: &Instant,
        world: &mut W,
    ) -> Result<(), SceneError> {
        if self.sequence.is_some() {
            return Err(violation(sender, message.name(), "arrived during synchronization"));
        }
        if self.observer_busy() {
            debug!("holding back {} until the current operation is applied", message.name());
            self.backlog.push_back((sender, message));
            return Ok(());
        }
        if let Some(live) = self.active.take() {
            warn!("{:?} superseded before its summary arrived", live.operation);
            self.release_locally(live, world);
        }

        let deadline = now.offset(self.config.operation_timeout);
        match message {
            SceneMessage::Load {
                operation,
                content,
                mode,
                handle,
                placed,
            } => {
                if handle.is_none() {
                    return Err(violation(sender, "Load", "reserved segment handle"));
                }
                if !self.catalog.contains(&content) {
                    return Err(SceneError::InvalidTarget {
                        content,
                        reason: "segment is not in the catalog",
                    });
                }

                let live = LiveOperation {
                    operation,
                    kind: OperationKind::Load,
                    content,
                    mode,
                    initiator: sender,
                    session: handle,
                    local: SegmentHandle::NONE,
                    placed,
                    phase: Phase::Awaiting,
                    tracker: None,
                    deadline,
                };
                self.push_started(&live);
                self.start_load(live, world)
            }
            SceneMessage::Unload {
                operation,
                content,
                handle,
            } => {
                let mut live = LiveOperation {
                    operation,
                    kind: OperationKind::Unload,
                    content,
                    mode: LoadMode::Additive,
                    initiator: sender,
                    session: handle,
                    local: SegmentHandle::NONE,
                    placed: Vec::new(),
                    phase: Phase::Awaiting,
                    tracker: None,
                    deadline,
                };
                self.push_started(&live);

                let Some(local) = self.handles.session_to_local(&handle) else {
                    // nothing to unload here, acknowledge so the authority is not held up
                    self.outbox.push((
                        sender,
                        SceneMessage::UnloadComplete {
                            operation,
                            content,
                            handle,
                        },
                    ));
                    self.active = Some(live);
                    return Err(SceneError::NotLoaded { handle });
                };
                live.local = local;
                if let Some(instance) = self.handles.instance(&local) {
                    live.mode = instance.mode;
                }
                self.start_unload(live, world)
            }
            _ => Ok(()),
        }
    }

    fn observe_summary<W: SceneWorld<E>>(
        &mut self,
        sender: PeerId,
        name: &'static str,
        summary: OperationSummary,
        now: &Instant,
        world: &mut W,
    ) -> Result<(), SceneError> {
        let matches = self
            .active
            .as_ref()
            .map_or(false, |live| live.operation == summary.operation && live.tracker.is_none());
        if !matches {
            debug!("ignoring {} for {:?}, not in progress here", name, summary.operation);
            return Ok(());
        }

        let Some(live) = self.active.take() else {
            return Ok(());
        };
        if live.kind != summary.kind {
            let reason = format!("{:?} is a {} operation", live.operation, live.kind.name());
            self.active = Some(live);
            return Err(violation(sender, name, reason));
        }
        if !live.is_awaiting() {
            warn!(
                "{} for {:?} arrived before the local side finished",
                name, live.operation
            );
        }

        self.release_locally(live, world);
        self.events.push_summary(summary);
        self.drain_backlog(now, world);
        Ok(())
    }

    // Live operations

    fn check_can_start(&self, kind: OperationKind) -> Result<(), SceneError> {
        if !self.is_authority() {
            return Err(rejected(SceneError::NotAuthority { kind }));
        }
        if let Some(live) = &self.active {
            return Err(rejected(SceneError::OperationInProgress {
                requested: kind,
                active: live.kind,
            }));
        }
        if self.sync_queue.is_syncing() {
            return Err(rejected(SceneError::OperationInProgress {
                requested: kind,
                active: OperationKind::Synchronize,
            }));
        }
        Ok(())
    }

    fn validate(&self, kind: OperationKind, content: ContentId, mode: LoadMode) -> bool {
        match &self.validation {
            Some(validation) => validation(&ValidationRequest {
                kind,
                content,
                mode,
            }),
            None => true,
        }
    }

    fn next_operation_id(&mut self) -> OperationId {
        let operation = OperationId::new(self.next_operation);
        self.next_operation = self.next_operation.wrapping_add(1).max(1);
        operation
    }

    /// Keeps locally minted ids ahead of any seen so far, for authority handoff
    fn note_operation(&mut self, operation: OperationId) {
        if operation.value() >= self.next_operation {
            self.next_operation = operation.value().wrapping_add(1).max(1);
        }
    }

    fn authority_operation(
        &self,
        operation: OperationId,
        kind: OperationKind,
        content: ContentId,
        mode: LoadMode,
        now: &Instant,
    ) -> LiveOperation {
        let tracker = ProgressTracker::new(
            operation,
            kind,
            self.synchronized.iter().copied(),
            &self.local_peer,
            now,
            self.config.operation_timeout,
        );

        LiveOperation {
            operation,
            kind,
            content,
            mode,
            initiator: self.local_peer,
            session: SegmentHandle::NONE,
            local: SegmentHandle::NONE,
            placed: Vec::new(),
            phase: Phase::Awaiting,
            tracker: Some(tracker),
            deadline: now.offset(self.config.operation_timeout),
        }
    }

    fn push_started(&mut self, live: &LiveOperation) {
        self.events.push_started(
            live.kind,
            OperationStarted {
                operation: live.operation,
                content: live.content,
                mode: live.mode,
                initiator: live.initiator,
            },
        );
    }

    fn observer_busy(&self) -> bool {
        self.active
            .as_ref()
            .map_or(false, |live| live.tracker.is_some() || !live.is_awaiting())
    }

    fn start_load<W: SceneWorld<E>>(
        &mut self,
        mut live: LiveOperation,
        world: &mut W,
    ) -> Result<(), SceneError> {
        self.deferred.begin_transition();

        let mut result = Ok(());
        let mut teardown = Vec::new();

        if live.mode == LoadMode::Single {
            self.relocation_pending = true;
            if let Some(outgoing) = self.active_segment {
                world.despawn_segment_entities(outgoing);
                world.move_to_holding_area(outgoing);
            }

            let additive: Vec<SegmentHandle> = self
                .handles
                .tracked_segments()
                .filter(|tracked| tracked.mode == LoadMode::Additive)
                .map(|tracked| tracked.local)
                .collect();
            for local in additive {
                world.despawn_segment_entities(local);
                self.placements.remove_segment(&local);
                match self.loader.begin_unload(local) {
                    Ok(work) => teardown.push((local, work)),
                    Err(error) => {
                        result = Err(internal(Some(live.operation), live.kind, error.to_string()));
                        break;
                    }
                }
            }
        }

        if result.is_ok() && teardown.is_empty() {
            match self.begin_engine_load(&live, live.mode) {
                Ok(work) => live.phase = Phase::Loading(work),
                Err(error) => result = Err(error),
            }
        } else {
            live.phase = Phase::TearingDown(teardown);
        }

        if let Err(error) = result {
            self.release_locally(live, world);
            return Err(error);
        }
        self.active = Some(live);
        Ok(())
    }

    fn begin_engine_load(
        &mut self,
        live: &LiveOperation,
        mode: LoadMode,
    ) -> Result<Box<dyn AsyncSegmentOp>, SceneError> {
        let Some(segment) = self.catalog.get(&live.content) else {
            return Err(internal(
                Some(live.operation),
                live.kind,
                format!("{:?} missing from the catalog", live.content),
            ));
        };
        self.loader
            .begin_load(segment, mode)
            .map_err(|error| internal(Some(live.operation), live.kind, error.to_string()))
    }

    fn start_unload<W: SceneWorld<E>>(
        &mut self,
        mut live: LiveOperation,
        world: &mut W,
    ) -> Result<(), SceneError> {
        self.deferred.begin_transition();
        world.despawn_segment_entities(live.local);
        self.placements.remove_segment(&live.local);

        match self.loader.begin_unload(live.local) {
            Ok(work) => {
                live.phase = Phase::Unloading(work);
                self.active = Some(live);
                Ok(())
            }
            Err(error) => {
                let error = internal(Some(live.operation), live.kind, error.to_string());
                self.release_locally(live, world);
                Err(error)
            }
        }
    }

    fn poll_active<W: SceneWorld<E>>(&mut self, now: &Instant, world: &mut W) {
        let Some(mut live) = self.active.take() else {
            return;
        };

        if let Err(error) = self.advance(&mut live, world) {
            self.release_locally(live, world);
            self.events.push_error(error);
            self.try_start_synchronizations(now, world);
            return;
        }

        self.active = Some(live);
        self.settle_active(now, world);
    }

    fn advance<W: SceneWorld<E>>(
        &mut self,
        live: &mut LiveOperation,
        world: &mut W,
    ) -> Result<(), SceneError> {
        let (operation, kind) = (live.operation, live.kind);

        if let Phase::TearingDown(pending) = &mut live.phase {
            let mut index = 0;
            while index < pending.len() {
                match pending[index].1.poll() {
                    AsyncStatus::Pending => index += 1,
                    AsyncStatus::Unloaded => {
                        let (local, _) = pending.remove(index);
                        self.forget_segment(&local);
                    }
                    AsyncStatus::Loaded(_) => {
                        pending.remove(index);
                        return Err(internal(Some(operation), kind, "teardown unload reported a load"));
                    }
                    AsyncStatus::Failed(reason) => {
                        pending.remove(index);
                        return Err(internal(Some(operation), kind, reason));
                    }
                }
            }
            if !pending.is_empty() {
                return Ok(());
            }
            live.phase = Phase::Loading(self.begin_engine_load(live, LoadMode::Single)?);
        }

        let status = match &mut live.phase {
            Phase::Loading(work) | Phase::Unloading(work) => work.poll(),
            Phase::TearingDown(_) | Phase::Awaiting => return Ok(()),
        };

        match (status, kind) {
            (AsyncStatus::Pending, _) => Ok(()),
            (AsyncStatus::Loaded(local), OperationKind::Load) => {
                live.phase = Phase::Awaiting;
                self.finish_local_load(live, local, world)
            }
            (AsyncStatus::Unloaded, OperationKind::Unload) => {
                live.phase = Phase::Awaiting;
                self.finish_local_unload(live, world)
            }
            (AsyncStatus::Failed(reason), _) => {
                live.phase = Phase::Awaiting;
                Err(internal(Some(operation), kind, reason))
            }
            (status, _) => {
                live.phase = Phase::Awaiting;
                Err(internal(
                    Some(operation),
                    kind,
                    format!("engine reported {:?}", status),
                ))
            }
        }
    }

    fn finish_local_load<W: SceneWorld<E>>(
        &mut self,
        live: &mut LiveOperation,
        local: SegmentHandle,
        world: &mut W,
    ) -> Result<(), SceneError> {
        live.local = local;

        if live.mode == LoadMode::Single {
            // the engine replaced everything that was loaded before
            self.forget_all_except(&local);
            if self.relocation_pending {
                world.rehome_holding_area(local);
            }
        }
        self.relocation_pending = false;

        if live.tracker.is_some() {
            live.session = self.handles.mint_session_handle();
        }
        self.handles.track_local(local, live.content, live.mode);
        self.bind_segment(live.session, local, live.content, live.mode);
        if live.mode == LoadMode::Single || self.active_segment.is_none() {
            self.active_segment = Some(local);
        }

        let registered = self.register_placements(local, live.content, world);
        self.flush_deferred(world);
        registered?;

        match live.tracker.as_mut() {
            Some(tracker) => {
                let placed: Vec<PlacedEntityState> = self
                    .placements
                    .segment_entries(&local)
                    .into_iter()
                    .map(|(placement, entity)| PlacedEntityState {
                        placement,
                        snapshot: world.spawn_placed_entity(&entity),
                    })
                    .collect();
                let message = SceneMessage::Load {
                    operation: live.operation,
                    content: live.content,
                    mode: live.mode,
                    handle: live.session,
                    placed,
                };
                for peer in tracker.expected_peers() {
                    self.outbox.push((*peer, message.clone()));
                }
                tracker.set_local_done();
            }
            None => {
                for state in mem::take(&mut live.placed) {
                    match self.placements.resolve(&state.placement, &local) {
                        Some(entity) => world.apply_placed_entity(&entity, &state.snapshot),
                        None => warn!(
                            "no placed entity {:?} in {:?} for {:?}",
                            state.placement, local, live.operation
                        ),
                    }
                }
                self.outbox.push((
                    live.initiator,
                    SceneMessage::LoadComplete {
                        operation: live.operation,
                        content: live.content,
                        handle: live.session,
                    },
                ));
            }
        }

        debug!("{:?} loaded locally as {:?}", live.operation, local);
        self.events.push_peer_completion(
            OperationKind::Load,
            PeerCompletion {
                operation: live.operation,
                peer: self.local_peer,
                content: live.content,
                segment: Some(local),
            },
        );
        Ok(())
    }

    fn finish_local_unload<W: SceneWorld<E>>(
        &mut self,
        live: &mut LiveOperation,
        world: &mut W,
    ) -> Result<(), SceneError> {
        let local = live.local;
        if !self.forget_segment(&local) {
            return Err(internal(
                Some(live.operation),
                live.kind,
                format!("unloaded segment {:?} was not bound", local),
            ));
        }
        self.flush_deferred(world);

        match live.tracker.as_mut() {
            Some(tracker) => {
                let message = SceneMessage::Unload {
                    operation: live.operation,
                    content: live.content,
                    handle: live.session,
                };
                for peer in tracker.expected_peers() {
                    self.outbox.push((*peer, message.clone()));
                }
                tracker.set_local_done();
            }
            None => {
                self.outbox.push((
                    live.initiator,
                    SceneMessage::UnloadComplete {
                        operation: live.operation,
                        content: live.content,
                        handle: live.session,
                    },
                ));
            }
        }

        debug!("{:?} unloaded {:?} locally", live.operation, local);
        self.events.push_peer_completion(
            OperationKind::Unload,
            PeerCompletion {
                operation: live.operation,
                peer: self.local_peer,
                content: live.content,
                segment: Some(local),
            },
        );
        Ok(())
    }

    /// Finishes the authority's operation once its tracker says so
    fn settle_active<W: SceneWorld<E>>(&mut self, now: &Instant, world: &mut W) {
        let finished = self
            .active
            .as_ref()
            .and_then(|live| live.tracker.as_ref())
            .map_or(false, |tracker| tracker.is_finished());
        if !finished {
            return;
        }
        if let Some(live) = self.active.take() {
            self.finish_authority_operation(live, now, world);
        }
    }

    fn finish_authority_operation<W: SceneWorld<E>>(
        &mut self,
        live: LiveOperation,
        now: &Instant,
        world: &mut W,
    ) {
        let outcome = live.tracker.as_ref().map(|tracker| {
            (
                tracker.completed_peers(),
                tracker.timed_out_peers(),
                tracker.expected_peers().copied().collect::<Vec<PeerId>>(),
                tracker.status(),
                tracker.is_local_done(),
            )
        });
        let Some((completed, timed_out, expected, status, local_done)) = outcome else {
            self.release_locally(live, world);
            return;
        };
        let (operation, kind, content, mode) = (live.operation, live.kind, live.content, live.mode);

        self.release_locally(live, world);

        if !local_done {
            // the local side never finished, so no observer received the operation
            self.events.push_error(SceneError::Timeout {
                operation,
                kind,
                timed_out,
            });
            self.try_start_synchronizations(now, world);
            return;
        }

        let message = match kind {
            OperationKind::Load => SceneMessage::LoadOperationCompleted {
                operation,
                content,
                mode,
                completed: completed.clone(),
                timed_out: timed_out.clone(),
            },
            _ => SceneMessage::UnloadOperationCompleted {
                operation,
                content,
                completed: completed.clone(),
                timed_out: timed_out.clone(),
            },
        };
        for peer in expected {
            self.outbox.push((peer, message.clone()));
        }

        info!(
            "{} operation {:?} finished: {} completed, {} timed out",
            kind.name(),
            operation,
            completed.len(),
            timed_out.len()
        );
        if status != ProgressStatus::Finished && !timed_out.is_empty() {
            self.events.push_error(SceneError::Timeout {
                operation,
                kind,
                timed_out: timed_out.clone(),
            });
        }
        self.events.push_summary(OperationSummary {
            operation,
            kind,
            content,
            completed,
            timed_out,
        });

        self.try_start_synchronizations(now, world);
    }

    /// Drops the operation lock on this peer. Engine work still running is
    /// detached, and any transition it began is closed.
    fn release_locally<W: SceneWorld<E>>(&mut self, live: LiveOperation, world: &mut W) {
        let LiveOperation {
            operation,
            content,
            mode,
            session,
            local,
            phase,
            tracker,
            ..
        } = live;
        let session = if tracker.is_some() {
            SegmentHandle::NONE
        } else {
            session
        };
        let rehome = self.relocation_pending
            && mode == LoadMode::Single
            && matches!(phase, Phase::Loading(_));

        match phase {
            Phase::TearingDown(pending) => {
                for (target, work) in pending {
                    self.detached.push(DetachedOp {
                        work,
                        content,
                        mode,
                        session: SegmentHandle::NONE,
                        unloading: Some(target),
                        rehome: false,
                    });
                }
            }
            Phase::Loading(work) => self.detached.push(DetachedOp {
                work,
                content,
                mode,
                session,
                unloading: None,
                rehome,
            }),
            Phase::Unloading(work) => self.detached.push(DetachedOp {
                work,
                content,
                mode,
                session,
                unloading: Some(local),
                rehome: false,
            }),
            Phase::Awaiting => {}
        }

        if self.relocation_pending {
            self.relocation_pending = false;
            if !rehome {
                if let Some(active) = self.active_segment {
                    world.rehome_holding_area(active);
                }
            }
        }
        self.flush_deferred(world);
        debug!("released {:?}", operation);
    }

    fn check_deadlines<W: SceneWorld<E>>(&mut self, now: &Instant, world: &mut W) {
        if let Some(mut live) = self.active.take() {
            let finished = live.tracker.as_mut().map(|tracker| tracker.update(now));
            match finished {
                Some(true) => self.finish_authority_operation(live, now, world),
                Some(false) => self.active = Some(live),
                None if !live.deadline.is_after(now) => {
                    let error = SceneError::Timeout {
                        operation: live.operation,
                        kind: live.kind,
                        timed_out: vec![live.initiator],
                    };
                    self.release_locally(live, world);
                    self.events.push_error(error);
                }
                None => self.active = Some(live),
            }
        }

        let expired = self
            .sequence
            .as_ref()
            .filter(|sequence| sequence.is_expired(now))
            .map(|sequence| (sequence.operation(), sequence.authority()));
        if let Some((operation, authority)) = expired {
            self.abort_sequence(
                SceneError::Timeout {
                    operation,
                    kind: OperationKind::Synchronize,
                    timed_out: vec![authority],
                },
                world,
            );
        }

        for (peer, operation) in self.sync_queue.expire(now) {
            self.events.push_error(SceneError::Timeout {
                operation,
                kind: OperationKind::Synchronize,
                timed_out: vec![peer],
            });
        }
    }

    fn drain_backlog<W: SceneWorld<E>>(&mut self, now: &Instant, world: &mut W) {
        while !self.observer_busy() && self.sequence.is_none() {
            let Some((sender, message)) = self.backlog.pop_front() else {
                return;
            };
            if let Err(error) = self.receive_as_observer(sender, message, now, world) {
                self.events.push_error(error);
            }
        }
    }

    // Synchronization, authority side

    fn try_start_synchronizations<W: SceneWorld<E>>(&mut self, now: &Instant, world: &mut W) {
        if !self.is_authority() || self.active.is_some() {
            return;
        }

        while let Some(peer) = self.sync_queue.pop_next() {
            if !self.connected.contains(&peer) {
                continue;
            }

            let operation = self.next_operation_id();
            let (segments, global) = self.build_synchronization(world);

            let entities: Vec<NetworkId> = segments
                .iter()
                .flat_map(|segment| {
                    segment
                        .placed
                        .iter()
                        .map(|state| state.snapshot.network_id)
                        .chain(segment.entities.iter().map(|snapshot| snapshot.network_id))
                })
                .chain(global.iter().map(|snapshot| snapshot.network_id))
                .collect();
            self.sync_queue
                .start(peer, operation, now, self.config.operation_timeout, entities);

            info!(
                "synchronizing {:?} with {} segments as {:?}",
                peer,
                segments.len(),
                operation
            );
            self.outbox.push((
                peer,
                SceneMessage::Synchronize {
                    operation,
                    mode: self.config.sync_mode,
                    segments,
                    global,
                },
            ));
            self.events.push_synchronization(peer, operation);
        }
    }

    /// Active segment first, then every other bound segment in load order
    fn build_synchronization<W: SceneWorld<E>>(
        &self,
        world: &W,
    ) -> (Vec<SyncSegment>, Vec<EntitySnapshot>) {
        let mut order: Vec<SegmentHandle> = self.active_segment.into_iter().collect();
        order.extend(
            self.handles
                .tracked_segments()
                .map(|tracked| tracked.local)
                .filter(|local| Some(*local) != self.active_segment),
        );

        let mut segments = Vec::new();
        for local in order {
            let Some(instance) = self.handles.instance(&local) else {
                debug!("not synchronizing unbound segment {:?}", local);
                continue;
            };
            if !self.validate(OperationKind::Synchronize, instance.content, instance.mode) {
                warn!("validation rejected synchronizing {:?}", instance.content);
                continue;
            }

            let placed = self
                .placements
                .segment_entries(&local)
                .into_iter()
                .filter_map(|(placement, entity)| {
                    world
                        .placed_entity_snapshot(&entity)
                        .map(|snapshot| PlacedEntityState {
                            placement,
                            snapshot,
                        })
                })
                .collect();

            segments.push(SyncSegment {
                content: instance.content,
                handle: instance.session,
                placed,
                entities: world.segment_entity_snapshots(local),
            });
        }

        (segments, world.global_entity_snapshots())
    }

    // Synchronization, joining side

    #[allow(clippy::too_many_arguments)]
    fn observe_synchronize<W: SceneWorld<E>>(
        &mut self,
        sender: PeerId,
        operation: OperationId,
        mode: LoadMode,
        segments: Vec<SyncSegment>,
        global: Vec<EntitySnapshot>,
        now: &Instant,
        world: &mut W,
    ) -> Result<(), SceneError> {
        if self.sequence.is_some() {
            return Err(violation(sender, "Synchronize", "synchronization already in progress"));
        }

        let mut seen = HashSet::new();
        for step in &segments {
            if step.handle.is_none() || !seen.insert(step.handle) {
                return Err(violation(
                    sender,
                    "Synchronize",
                    format!("duplicate or reserved segment handle {:?}", step.handle),
                ));
            }
            if !self.catalog.contains(&step.content) {
                return Err(violation(
                    sender,
                    "Synchronize",
                    format!("unknown segment {:?}", step.content),
                ));
            }
        }

        if let Some(live) = self.active.take() {
            warn!("abandoning {:?} for synchronization", live.operation);
            self.release_locally(live, world);
        }
        self.backlog.clear();

        if self.handles.bound_len() > 0 {
            if !self.handles.begin_restore() {
                return Err(violation(sender, "Synchronize", "session restore already in progress"));
            }
            info!("restoring {} segment bindings", self.handles.bound_len());
        }

        info!(
            "synchronizing {} segments from {:?} as {:?}",
            segments.len(),
            sender,
            operation
        );
        self.deferred.begin_transition();
        self.sequence = Some(SyncSequence::new(
            operation,
            sender,
            mode,
            segments,
            global,
            now,
            self.config.operation_timeout,
        ));
        self.events.push_synchronization(sender, operation);

        self.drive_sequence(world);
        Ok(())
    }

    fn drive_sequence<W: SceneWorld<E>>(&mut self, world: &mut W) {
        while self.sequence.is_some() {
            match self.step_sequence(world) {
                Ok(true) => continue,
                Ok(false) => return,
                Err(error) => {
                    self.abort_sequence(error, world);
                    return;
                }
            }
        }
    }

    /// Returns true while progress can be made without waiting on the engine
    fn step_sequence<W: SceneWorld<E>>(&mut self, world: &mut W) -> Result<bool, SceneError> {
        let Some(operation) = self.sequence.as_ref().map(|sequence| sequence.operation()) else {
            return Ok(false);
        };

        if let Some(pending) = self.sequence_work.take() {
            return match pending {
                SequenceWork::Loading { index, mut work } => match work.poll() {
                    AsyncStatus::Pending => {
                        self.sequence_work = Some(SequenceWork::Loading { index, work });
                        Ok(false)
                    }
                    AsyncStatus::Loaded(local) => {
                        self.apply_sync_step(index, local, true, world)?;
                        Ok(true)
                    }
                    AsyncStatus::Failed(reason) => {
                        Err(internal(Some(operation), OperationKind::Synchronize, reason))
                    }
                    AsyncStatus::Unloaded => Err(internal(
                        Some(operation),
                        OperationKind::Synchronize,
                        "segment load reported an unload",
                    )),
                },
                SequenceWork::CleaningUp { local, mut work } => match work.poll() {
                    AsyncStatus::Pending => {
                        self.sequence_work = Some(SequenceWork::CleaningUp { local, work });
                        Ok(false)
                    }
                    AsyncStatus::Unloaded => {
                        self.forget_segment(&local);
                        Ok(true)
                    }
                    AsyncStatus::Failed(reason) => {
                        Err(internal(Some(operation), OperationKind::Synchronize, reason))
                    }
                    AsyncStatus::Loaded(_) => Err(internal(
                        Some(operation),
                        OperationKind::Synchronize,
                        "segment unload reported a load",
                    )),
                },
            };
        }

        let Some(sequence) = self.sequence.as_ref() else {
            return Ok(false);
        };

        if let Some((index, step)) = sequence.current_step() {
            let mode = sequence.step_mode(index);
            let (content, session) = (step.content, step.handle);

            // bound from a previous session
            if let Some(local) = self.handles.session_to_local(&session) {
                if self.handles.instance(&local).map(|instance| instance.content) == Some(content) {
                    self.apply_sync_step(index, local, false, world)?;
                    return Ok(true);
                }
            }
            if let Some(local) = self.handles.find_unbound(&content) {
                self.apply_sync_step(index, local, false, world)?;
                return Ok(true);
            }

            let Some(segment) = self.catalog.get(&content) else {
                return Err(internal(
                    Some(operation),
                    OperationKind::Synchronize,
                    format!("{:?} missing from the catalog", content),
                ));
            };
            if mode == LoadMode::Single {
                self.relocation_pending = true;
                if let Some(outgoing) = self.active_segment {
                    world.despawn_segment_entities(outgoing);
                    world.move_to_holding_area(outgoing);
                }
            }
            let work = self
                .loader
                .begin_load(segment, mode)
                .map_err(|error| internal(Some(operation), OperationKind::Synchronize, error.to_string()))?;
            self.sequence_work = Some(SequenceWork::Loading { index, work });
            return Ok(true);
        }

        // every step applied: drop segments the authority does not have
        let single = sequence.mode() == LoadMode::Single;
        let leftover = self
            .handles
            .tracked_segments()
            .map(|tracked| tracked.local)
            .find(|local| {
                !sequence.uses(local) && (single || self.handles.local_to_session(local).is_some())
            });
        if let Some(local) = leftover {
            world.despawn_segment_entities(local);
            self.placements.remove_segment(&local);
            let work = self
                .loader
                .begin_unload(local)
                .map_err(|error| internal(Some(operation), OperationKind::Synchronize, error.to_string()))?;
            self.sequence_work = Some(SequenceWork::CleaningUp { local, work });
            return Ok(true);
        }

        let Some(mut sequence) = self.sequence.take() else {
            return Ok(false);
        };
        for snapshot in sequence.take_global() {
            world.spawn_snapshot(None, &snapshot);
        }
        self.handles.end_restore();
        self.relocation_pending = false;
        self.flush_deferred(world);

        let authority = sequence.authority();
        info!(
            "synchronization {:?} complete after {} segments",
            operation,
            sequence.completed_steps()
        );
        self.outbox
            .push((authority, SceneMessage::SynchronizeComplete { operation }));
        self.events.push_synchronization_complete(authority, operation);
        Ok(false)
    }

    fn apply_sync_step<W: SceneWorld<E>>(
        &mut self,
        index: usize,
        local: SegmentHandle,
        loaded: bool,
        world: &mut W,
    ) -> Result<(), SceneError> {
        let Some(sequence) = self.sequence.as_mut() else {
            return Err(internal(None, OperationKind::Synchronize, "no synchronization in progress"));
        };
        let operation = sequence.operation();
        let mode = sequence.step_mode(index);
        sequence.complete_step(index, local)?;
        let Some(step) = sequence.take_payload(index) else {
            return Err(internal(
                Some(operation),
                OperationKind::Synchronize,
                format!("step {} missing", index),
            ));
        };

        if loaded && mode == LoadMode::Single {
            self.forget_all_except(&local);
            if self.relocation_pending {
                world.rehome_holding_area(local);
            }
            self.relocation_pending = false;
        }

        self.handles.track_local(local, step.content, mode);
        let mode = self
            .handles
            .tracked(&local)
            .map_or(mode, |tracked| tracked.mode);
        self.bind_segment(step.handle, local, step.content, mode);
        if index == 0 && (mode == LoadMode::Single || self.active_segment.is_none()) {
            self.active_segment = Some(local);
        }

        self.register_placements(local, step.content, world)?;
        for state in &step.placed {
            match self.placements.resolve(&state.placement, &local) {
                Some(entity) => world.apply_placed_entity(&entity, &state.snapshot),
                None => warn!("no placed entity {:?} in {:?}", state.placement, local),
            }
        }
        for snapshot in &step.entities {
            world.spawn_snapshot(Some(local), snapshot);
        }

        debug!(
            "synchronization step {} applied to {:?} ({})",
            index,
            local,
            if loaded { "loaded" } else { "reused" }
        );
        Ok(())
    }

    fn abort_sequence<W: SceneWorld<E>>(&mut self, error: SceneError, world: &mut W) {
        let sequence = self.sequence.take();
        let mut rehome = false;

        match self.sequence_work.take() {
            Some(SequenceWork::Loading { index, work }) => {
                let step = sequence
                    .as_ref()
                    .and_then(|sequence| Some((sequence.step(index)?, sequence.step_mode(index))));
                if let Some((step, mode)) = step {
                    rehome = self.relocation_pending && mode == LoadMode::Single;
                    self.detached.push(DetachedOp {
                        work,
                        content: step.content,
                        mode,
                        session: step.handle,
                        unloading: None,
                        rehome,
                    });
                }
            }
            Some(SequenceWork::CleaningUp { local, work }) => self.detached.push(DetachedOp {
                work,
                content: ContentId::new(0),
                mode: LoadMode::Additive,
                session: SegmentHandle::NONE,
                unloading: Some(local),
                rehome: false,
            }),
            None => {}
        }

        self.handles.end_restore();
        if self.relocation_pending {
            self.relocation_pending = false;
            if !rehome {
                if let Some(active) = self.active_segment {
                    world.rehome_holding_area(active);
                }
            }
        }
        self.flush_deferred(world);
        self.events.push_error(error);
    }

    // Table upkeep

    fn bind_segment(&mut self, session: SegmentHandle, local: SegmentHandle, content: ContentId, mode: LoadMode) {
        if self.handles.session_to_local(&session) == Some(local) {
            return;
        }
        if !self.handles.bind(session, local, content, mode) {
            self.events
                .push_error(SceneError::DuplicateHandleBinding { session, local });
        }
    }

    /// Gives every tracked segment without a session handle a fresh one, so
    /// the authority can synchronize, unload and activate it
    fn bind_tracked_segments(&mut self) {
        let unbound: Vec<(SegmentHandle, ContentId, LoadMode)> = self
            .handles
            .tracked_segments()
            .filter(|tracked| self.handles.local_to_session(&tracked.local).is_none())
            .map(|tracked| (tracked.local, tracked.content, tracked.mode))
            .collect();
        for (local, content, mode) in unbound {
            let session = self.handles.mint_session_handle();
            debug!("bound tracked segment {:?} as {:?}", local, session);
            self.bind_segment(session, local, content, mode);
        }
    }

    fn register_placements<W: SceneWorld<E>>(
        &mut self,
        local: SegmentHandle,
        content: ContentId,
        world: &mut W,
    ) -> Result<(), SceneError> {
        if self.placements.has_segment(&local) {
            return Ok(());
        }
        for (placement, entity) in world.placed_entities(local, content) {
            self.placements.register(placement, local, entity)?;
        }
        Ok(())
    }

    /// Removes every trace of a local segment. Returns false if it was
    /// neither tracked nor bound.
    fn forget_segment(&mut self, local: &SegmentHandle) -> bool {
        let mut known = false;
        if let Some(session) = self.handles.local_to_session(local) {
            known |= self.handles.unbind(session, *local);
        }
        known |= self.handles.untrack_local(local);
        self.placements.remove_segment(local);
        if self.active_segment == Some(*local) {
            self.active_segment = None;
        }
        known
    }

    fn forget_all_except(&mut self, keep: &SegmentHandle) {
        let replaced: Vec<SegmentHandle> = self
            .handles
            .tracked_segments()
            .map(|tracked| tracked.local)
            .filter(|local| local != keep)
            .collect();
        for local in replaced {
            self.forget_segment(&local);
        }
    }

    fn flush_deferred<W: SceneWorld<E>>(&mut self, world: &mut W) {
        self.deferred
            .end_transition(|entry| world.create_entity(entry.sender, &entry.payload));
    }

    fn poll_detached<W: SceneWorld<E>>(&mut self, world: &mut W) {
        let mut index = 0;
        while index < self.detached.len() {
            let status = self.detached[index].work.poll();
            if status == AsyncStatus::Pending {
                index += 1;
                continue;
            }

            let detached = self.detached.remove(index);
            match status {
                AsyncStatus::Loaded(local) => {
                    debug!("detached load finished as {:?}", local);
                    if detached.mode == LoadMode::Single {
                        // the engine replaced everything that was loaded before
                        self.forget_all_except(&local);
                    }
                    self.handles.track_local(local, detached.content, detached.mode);
                    if !detached.session.is_none() {
                        self.bind_segment(detached.session, local, detached.content, detached.mode);
                    } else if self.is_authority() {
                        self.bind_tracked_segments();
                    }
                    if detached.mode == LoadMode::Single || self.active_segment.is_none() {
                        self.active_segment = Some(local);
                    }
                    if detached.rehome {
                        world.rehome_holding_area(local);
                    }
                }
                AsyncStatus::Unloaded => {
                    if let Some(local) = detached.unloading {
                        debug!("detached unload of {:?} finished", local);
                        self.forget_segment(&local);
                    }
                }
                AsyncStatus::Failed(reason) => {
                    warn!("detached segment operation failed: {}", reason);
                    if detached.rehome {
                        if let Some(active) = self.active_segment {
                            world.rehome_holding_area(active);
                        }
                    }
                }
                AsyncStatus::Pending => {}
            }
        }
    }

    fn broadcast(&mut self, message: &SceneMessage) {
        for peer in &self.synchronized {
            self.outbox.push((*peer, message.clone()));
        }
    }
}

fn rejected(error: SceneError) -> SceneError {
    error.log();
    error
}

fn violation(peer: PeerId, message: &'static str, reason: impl Into<String>) -> SceneError {
    SceneError::ProtocolViolation {
        peer,
        message,
        reason: reason.into(),
    }
}

fn internal(operation: Option<OperationId>, kind: OperationKind, context: impl Into<String>) -> SceneError {
    SceneError::InternalError {
        operation,
        kind,
        context: context.into(),
    }
}
