use thiserror::Error;

use scenesync_shared::PeerId;

/// Transport and decoding failures of the client host
#[derive(Debug, Error)]
pub enum SceneClientError {
    #[error("Failed to send packet to {peer:?}")]
    SendFailed { peer: PeerId },

    #[error("Failed to receive packets from the transport")]
    ReceiveFailed,

    #[error("Dropped undecodable packet from {peer:?}")]
    Decode { peer: PeerId },
}
