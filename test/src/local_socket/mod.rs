/// In-memory relay for E2E testing
/// Routes packets between the server and clients without network I/O

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use scenesync_client::transport::{
    PacketReceiver as ClientPacketReceiver, PacketSender as ClientPacketSender,
    RecvError as ClientRecvError, SendError as ClientSendError,
};
use scenesync_server::transport::{
    PacketReceiver as ServerPacketReceiver, PacketSender as ServerPacketSender,
    RecvError as ServerRecvError, SendError as ServerSendError,
};
use scenesync_shared::{Delivery, PeerId};

type Queues = Arc<Mutex<HashMap<PeerId, VecDeque<(PeerId, Box<[u8]>)>>>>;

/// Shared relay every test socket sends through. Each peer has one inbound
/// queue; packets are tagged with the peer that sent them.
#[derive(Clone, Default)]
pub struct LocalRelay {
    queues: Queues,
    disconnected: Arc<Mutex<HashSet<PeerId>>>,
    sent: Arc<Mutex<Vec<(PeerId, PeerId, Delivery)>>>,
}

impl LocalRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server_socket(
        &self,
        peer: PeerId,
    ) -> (Box<dyn ServerPacketSender>, Box<dyn ServerPacketReceiver>) {
        (Box::new(self.sender(peer)), Box::new(self.receiver(peer)))
    }

    pub fn client_socket(
        &self,
        peer: PeerId,
    ) -> (Box<dyn ClientPacketSender>, Box<dyn ClientPacketReceiver>) {
        (Box::new(self.sender(peer)), Box::new(self.receiver(peer)))
    }

    /// Cuts `peer` off: its queue is emptied and nothing reaches it anymore
    pub fn disconnect(&self, peer: PeerId) {
        self.disconnected.lock().unwrap().insert(peer);
        self.queues.lock().unwrap().remove(&peer);
    }

    /// Puts raw bytes on `to`'s queue as if `from` had sent them
    pub fn inject(&self, from: PeerId, to: PeerId, payload: &[u8]) {
        self.queues
            .lock()
            .unwrap()
            .entry(to)
            .or_default()
            .push_back((from, payload.into()));
    }

    pub fn pending(&self, peer: PeerId) -> usize {
        self.queues
            .lock()
            .unwrap()
            .get(&peer)
            .map_or(0, |queue| queue.len())
    }

    /// Every (from, to, delivery) routed so far
    pub fn sent(&self) -> Vec<(PeerId, PeerId, Delivery)> {
        self.sent.lock().unwrap().clone()
    }

    fn sender(&self, origin: PeerId) -> LocalSender {
        LocalSender {
            origin,
            relay: self.clone(),
        }
    }

    fn receiver(&self, peer: PeerId) -> LocalReceiver {
        LocalReceiver {
            peer,
            queues: self.queues.clone(),
        }
    }

    fn route(&self, origin: PeerId, peer: &PeerId, delivery: Delivery, payload: &[u8]) -> bool {
        {
            let disconnected = self.disconnected.lock().unwrap();
            if disconnected.contains(&origin) || disconnected.contains(peer) {
                return false;
            }
        }
        self.sent.lock().unwrap().push((origin, *peer, delivery));
        self.inject(origin, *peer, payload);
        true
    }
}

#[derive(Clone)]
struct LocalSender {
    origin: PeerId,
    relay: LocalRelay,
}

impl ServerPacketSender for LocalSender {
    fn send(&self, peer: &PeerId, delivery: Delivery, payload: &[u8]) -> Result<(), ServerSendError> {
        if self.relay.route(self.origin, peer, delivery, payload) {
            Ok(())
        } else {
            Err(ServerSendError)
        }
    }
}

impl ClientPacketSender for LocalSender {
    fn send(&self, peer: &PeerId, delivery: Delivery, payload: &[u8]) -> Result<(), ClientSendError> {
        if self.relay.route(self.origin, peer, delivery, payload) {
            Ok(())
        } else {
            Err(ClientSendError)
        }
    }
}

#[derive(Clone)]
struct LocalReceiver {
    peer: PeerId,
    queues: Queues,
}

impl LocalReceiver {
    fn next(&mut self) -> Option<(PeerId, Box<[u8]>)> {
        self.queues
            .lock()
            .unwrap()
            .get_mut(&self.peer)
            .and_then(|queue| queue.pop_front())
    }
}

impl ServerPacketReceiver for LocalReceiver {
    fn receive(&mut self) -> Result<Option<(PeerId, Box<[u8]>)>, ServerRecvError> {
        Ok(self.next())
    }
}

impl ClientPacketReceiver for LocalReceiver {
    fn receive(&mut self) -> Result<Option<(PeerId, Box<[u8]>)>, ClientRecvError> {
        Ok(self.next())
    }
}
