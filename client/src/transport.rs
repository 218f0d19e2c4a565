pub use inner::{PacketReceiver, PacketSender, RecvError, SendError};

mod inner {

    use scenesync_shared::{Delivery, PeerId};

    pub struct SendError;

    pub struct RecvError;

    pub trait PacketSender: Send + Sync {
        /// Sends a packet through the relay to the given peer, usually the
        /// session authority
        fn send(&self, peer: &PeerId, delivery: Delivery, payload: &[u8]) -> Result<(), SendError>;
    }

    pub trait PacketReceiver: Send + Sync {
        /// Receives the next packet, tagged by the relay with its origin peer
        fn receive(&mut self) -> Result<Option<(PeerId, Box<[u8]>)>, RecvError>;
    }
}
