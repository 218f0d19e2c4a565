use std::{fmt::Debug, hash::Hash, mem};

use log::{info, warn};

use scenesync_shared::{
    ContentId, Instant, LoadMode, NetworkId, OperationCoordinator, OperationId, PeerId,
    SceneError, SceneEvents, SceneMessage, SceneWorld, SegmentCatalog, SegmentHandle,
    SegmentLoader, ValidationRequest,
};

use crate::{
    events::MainEvents,
    transport::{PacketReceiver, PacketSender},
    SceneServerError, ServerConfig,
};

/// Session authority host. Owns the operation coordinator for the local
/// peer and moves its messages over the packet transport.
pub struct SceneServer<E: Copy + Eq + Hash + Debug> {
    config: ServerConfig,
    coordinator: OperationCoordinator<E>,
    io: Option<(Box<dyn PacketSender>, Box<dyn PacketReceiver>)>,
    incoming_events: MainEvents,
}

impl<E: Copy + Eq + Hash + Debug> SceneServer<E> {
    /// Create a new SceneServer. The local peer starts out as the session
    /// authority.
    pub fn new(
        server_config: ServerConfig,
        catalog: SegmentCatalog,
        loader: Box<dyn SegmentLoader>,
        local_peer: PeerId,
    ) -> Self {
        let coordinator = OperationCoordinator::new(
            server_config.scene.clone(),
            catalog,
            loader,
            local_peer,
            Some(local_peer),
        );

        Self {
            config: server_config,
            coordinator,
            io: None,
            incoming_events: MainEvents::new(),
        }
    }

    /// Attach the packet transport used to reach connected peers
    pub fn listen(&mut self, sender: Box<dyn PacketSender>, receiver: Box<dyn PacketReceiver>) {
        self.io = Some((sender, receiver));
    }

    pub fn is_listening(&self) -> bool {
        self.io.is_some()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Installs the hook consulted before every load, unload and
    /// synchronization step
    pub fn set_validation<F: Fn(&ValidationRequest) -> bool + 'static>(&mut self, validation: F) {
        self.coordinator.set_validation(validation);
    }

    pub fn coordinator(&self) -> &OperationCoordinator<E> {
        &self.coordinator
    }

    // Peers

    /// Accepts a peer into the session. It is synchronized with the loaded
    /// segments unless `synchronize_on_connect` is off.
    pub fn connect_peer<W: SceneWorld<E>>(
        &mut self,
        peer: PeerId,
        now: &Instant,
        world: &mut W,
    ) -> Result<(), SceneServerError> {
        if self.coordinator.is_connected(&peer) {
            return Ok(());
        }

        info!("peer {:?} connected", peer);
        self.incoming_events.push_connection(&peer);

        if self.config.synchronize_on_connect && self.coordinator.is_authority() {
            self.coordinator.synchronize_peer(peer, now, world)?;
        } else {
            self.coordinator.admit_peer(peer);
        }
        Ok(())
    }

    pub fn disconnect_peer<W: SceneWorld<E>>(&mut self, peer: PeerId, now: &Instant, world: &mut W) {
        if !self.coordinator.is_connected(&peer) {
            return;
        }

        info!("peer {:?} disconnected", peer);
        self.coordinator.peer_disconnected(peer, now, world);
        self.incoming_events.push_disconnection(&peer);
    }

    /// Hands session authority to another peer, or takes it back
    pub fn set_authority<W: SceneWorld<E>>(&mut self, peer: PeerId, now: &Instant, world: &mut W) {
        self.coordinator.set_authority(peer, now, world);
    }

    // Packets

    /// Reads every packet waiting on the transport and feeds the decoded
    /// messages to the coordinator
    pub fn receive_packets<W: SceneWorld<E>>(&mut self, now: &Instant, world: &mut W) {
        loop {
            let Some((_, receiver)) = self.io.as_mut() else {
                return;
            };
            let (peer, payload) = match receiver.receive() {
                Ok(Some(packet)) => packet,
                Ok(None) => return,
                Err(_) => {
                    self.incoming_events
                        .push_error(SceneServerError::ReceiveFailed);
                    return;
                }
            };

            if !self.coordinator.is_connected(&peer) {
                warn!("dropping packet from unknown peer {:?}", peer);
                self.incoming_events
                    .push_error(SceneServerError::UnknownPeer { peer });
                continue;
            }

            match SceneMessage::from_bytes(&payload) {
                Ok(message) => self.coordinator.receive_message(peer, message, now, world),
                Err(_) => {
                    warn!("dropping undecodable packet from {:?}", peer);
                    self.incoming_events
                        .push_error(SceneServerError::Decode { peer });
                }
            }
        }
    }

    /// Sends every message queued by the coordinator. Nothing is taken off
    /// the queue until the server is listening.
    pub fn send_all_packets(&mut self) {
        let Some((sender, _)) = self.io.as_ref() else {
            return;
        };

        for (peer, message) in self.coordinator.take_outgoing_messages() {
            let payload = message.to_bytes();
            if sender.send(&peer, message.delivery(), &payload).is_err() {
                warn!("failed to send {} to {:?}", message.name(), peer);
                self.incoming_events
                    .push_error(SceneServerError::SendFailed { peer });
            }
        }
    }

    /// Polls engine work and checks operation deadlines
    pub fn update<W: SceneWorld<E>>(&mut self, now: &Instant, world: &mut W) {
        self.coordinator.update(now, world);
    }

    // Operations

    pub fn request_load<W: SceneWorld<E>>(
        &mut self,
        content: ContentId,
        mode: LoadMode,
        now: &Instant,
        world: &mut W,
    ) -> Result<OperationId, SceneError> {
        self.coordinator.request_load(content, mode, now, world)
    }

    pub fn request_load_by_name<W: SceneWorld<E>>(
        &mut self,
        name: &str,
        mode: LoadMode,
        now: &Instant,
        world: &mut W,
    ) -> Result<OperationId, SceneError> {
        self.coordinator.request_load_by_name(name, mode, now, world)
    }

    pub fn request_unload<W: SceneWorld<E>>(
        &mut self,
        local: SegmentHandle,
        now: &Instant,
        world: &mut W,
    ) -> Result<OperationId, SceneError> {
        self.coordinator.request_unload(local, now, world)
    }

    pub fn set_active_segment(&mut self, local: SegmentHandle) -> Result<(), SceneError> {
        self.coordinator.set_active_segment(local)
    }

    pub fn move_entity_to_segment<W: SceneWorld<E>>(
        &mut self,
        network_id: NetworkId,
        local: SegmentHandle,
        world: &mut W,
    ) -> Result<(), SceneError> {
        self.coordinator.move_entity_to_segment(network_id, local, world)
    }

    pub fn track_local_segment(
        &mut self,
        content: ContentId,
        local: SegmentHandle,
        mode: LoadMode,
    ) -> Result<(), SceneError> {
        self.coordinator.track_local_segment(content, local, mode)
    }

    // Entities

    pub fn notify_entity_spawned<W: SceneWorld<E>>(&mut self, entity: &E, world: &mut W) {
        self.coordinator.notify_entity_spawned(entity, world);
    }

    pub fn notify_entity_despawned(&mut self, network_id: &NetworkId) {
        self.coordinator.notify_entity_despawned(network_id);
    }

    // Events

    pub fn take_main_events(&mut self) -> MainEvents {
        mem::take(&mut self.incoming_events)
    }

    pub fn take_scene_events(&mut self) -> SceneEvents {
        self.coordinator.take_events()
    }
}
