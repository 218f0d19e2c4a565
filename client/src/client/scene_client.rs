use std::{fmt::Debug, hash::Hash, mem};

use log::{info, warn};

use scenesync_shared::{
    ContentId, Instant, LoadMode, NetworkId, OperationCoordinator, OperationId, PeerId,
    SceneError, SceneEvents, SceneMessage, SceneWorld, SegmentCatalog, SegmentHandle,
    SegmentLoader, ValidationRequest,
};

use crate::{
    transport::{PacketReceiver, PacketSender},
    ClientConfig, SceneClientError,
};

/// Observer host. Applies the operations announced by the session authority
/// on this peer and reports back when each one is done locally.
pub struct SceneClient<E: Copy + Eq + Hash + Debug> {
    config: ClientConfig,
    server_peer: PeerId,
    coordinator: OperationCoordinator<E>,
    io: Option<(Box<dyn PacketSender>, Box<dyn PacketReceiver>)>,
    errors: Vec<SceneClientError>,
}

impl<E: Copy + Eq + Hash + Debug> SceneClient<E> {
    /// Create a new SceneClient that treats `server_peer` as the session
    /// authority until told otherwise
    pub fn new(
        client_config: ClientConfig,
        catalog: SegmentCatalog,
        loader: Box<dyn SegmentLoader>,
        local_peer: PeerId,
        server_peer: PeerId,
    ) -> Self {
        let mut coordinator = OperationCoordinator::new(
            client_config.scene.clone(),
            catalog,
            loader,
            local_peer,
            Some(server_peer),
        );
        coordinator.peer_connected(server_peer);

        Self {
            config: client_config,
            server_peer,
            coordinator,
            io: None,
            errors: Vec::new(),
        }
    }

    /// Attach the packet transport leading to the server relay
    pub fn connect(&mut self, sender: Box<dyn PacketSender>, receiver: Box<dyn PacketReceiver>) {
        self.io = Some((sender, receiver));
    }

    pub fn is_connected(&self) -> bool {
        self.io.is_some()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn server_peer(&self) -> PeerId {
        self.server_peer
    }

    pub fn local_peer(&self) -> PeerId {
        self.coordinator.local_peer()
    }

    pub fn coordinator(&self) -> &OperationCoordinator<E> {
        &self.coordinator
    }

    pub fn set_validation<F: Fn(&ValidationRequest) -> bool + 'static>(&mut self, validation: F) {
        self.coordinator.set_validation(validation);
    }

    // Peers

    /// Another peer joined the session. Only matters once this client holds
    /// session authority.
    pub fn peer_joined(&mut self, peer: PeerId) {
        self.coordinator.admit_peer(peer);
    }

    pub fn peer_left<W: SceneWorld<E>>(&mut self, peer: PeerId, now: &Instant, world: &mut W) {
        self.coordinator.peer_disconnected(peer, now, world);
    }

    /// Session authority moved to `peer`, which may be this client
    pub fn set_authority<W: SceneWorld<E>>(&mut self, peer: PeerId, now: &Instant, world: &mut W) {
        self.coordinator.set_authority(peer, now, world);
    }

    /// Takes over session authority from the server
    pub fn promote_to_authority<W: SceneWorld<E>>(&mut self, now: &Instant, world: &mut W) {
        let local_peer = self.coordinator.local_peer();
        info!("{:?} promoted to session authority", local_peer);
        self.coordinator.set_authority(local_peer, now, world);
    }

    pub fn is_authority(&self) -> bool {
        self.coordinator.is_authority()
    }

    // Packets

    pub fn receive_packets<W: SceneWorld<E>>(&mut self, now: &Instant, world: &mut W) {
        loop {
            let Some((_, receiver)) = self.io.as_mut() else {
                return;
            };
            let (peer, payload) = match receiver.receive() {
                Ok(Some(packet)) => packet,
                Ok(None) => return,
                Err(_) => {
                    self.errors.push(SceneClientError::ReceiveFailed);
                    return;
                }
            };

            match SceneMessage::from_bytes(&payload) {
                Ok(message) => self.coordinator.receive_message(peer, message, now, world),
                Err(_) => {
                    warn!("dropping undecodable packet from {:?}", peer);
                    self.errors.push(SceneClientError::Decode { peer });
                }
            }
        }
    }

    pub fn send_all_packets(&mut self) {
        let Some((sender, _)) = self.io.as_ref() else {
            return;
        };

        for (peer, message) in self.coordinator.take_outgoing_messages() {
            let payload = message.to_bytes();
            if sender.send(&peer, message.delivery(), &payload).is_err() {
                warn!("failed to send {} to {:?}", message.name(), peer);
                self.errors.push(SceneClientError::SendFailed { peer });
            }
        }
    }

    pub fn update<W: SceneWorld<E>>(&mut self, now: &Instant, world: &mut W) {
        self.coordinator.update(now, world);
    }

    // Segments

    /// Declares a segment this client loaded before joining, so
    /// synchronization can reuse it
    pub fn track_local_segment(
        &mut self,
        content: ContentId,
        local: SegmentHandle,
        mode: LoadMode,
    ) -> Result<(), SceneError> {
        self.coordinator.track_local_segment(content, local, mode)
    }

    pub fn active_segment(&self) -> Option<SegmentHandle> {
        self.coordinator.active_segment()
    }

    /// Local handle of the segment instance the session knows as `session`
    pub fn local_segment(&self, session: &SegmentHandle) -> Option<SegmentHandle> {
        self.coordinator.handles().session_to_local(session)
    }

    pub fn request_load<W: SceneWorld<E>>(
        &mut self,
        content: ContentId,
        mode: LoadMode,
        now: &Instant,
        world: &mut W,
    ) -> Result<OperationId, SceneError> {
        self.coordinator.request_load(content, mode, now, world)
    }

    pub fn request_unload<W: SceneWorld<E>>(
        &mut self,
        local: SegmentHandle,
        now: &Instant,
        world: &mut W,
    ) -> Result<OperationId, SceneError> {
        self.coordinator.request_unload(local, now, world)
    }

    // Entities

    /// Entity creation received from `sender`. Held back while a segment
    /// transition is running on this client.
    pub fn receive_entity_creation<W: SceneWorld<E>>(
        &mut self,
        sender: PeerId,
        payload: &[u8],
        world: &mut W,
    ) {
        self.coordinator.receive_entity_creation(sender, payload, world);
    }

    pub fn notify_entity_spawned<W: SceneWorld<E>>(&mut self, entity: &E, world: &mut W) {
        self.coordinator.notify_entity_spawned(entity, world);
    }

    pub fn notify_entity_despawned(&mut self, network_id: &NetworkId) {
        self.coordinator.notify_entity_despawned(network_id);
    }

    // Events

    pub fn take_scene_events(&mut self) -> SceneEvents {
        self.coordinator.take_events()
    }

    pub fn take_errors(&mut self) -> Vec<SceneClientError> {
        mem::take(&mut self.errors)
    }
}
