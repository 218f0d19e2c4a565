pub use inner::{PacketReceiver, PacketSender, RecvError, SendError};

mod inner {

    use scenesync_shared::{Delivery, PeerId};

    pub struct SendError;

    pub struct RecvError;

    pub trait PacketSender: Send + Sync {
        /// Sends a packet to the given peer. `delivery` tells the transport
        /// whether the payload may need fragmenting.
        fn send(&self, peer: &PeerId, delivery: Delivery, payload: &[u8]) -> Result<(), SendError>;
    }

    pub trait PacketReceiver: Send + Sync {
        /// Receives the next packet along with the peer that sent it
        fn receive(&mut self) -> Result<Option<(PeerId, Box<[u8]>)>, RecvError>;
    }
}
