use thiserror::Error;

use scenesync_shared::{PeerId, SceneError};

/// Failures of the server host itself, as opposed to the scene operations it
/// drives
#[derive(Debug, Error)]
pub enum SceneServerError {
    #[error("Failed to send packet to {peer:?}")]
    SendFailed { peer: PeerId },

    #[error("Failed to receive packets from the transport")]
    ReceiveFailed,

    #[error("Dropped undecodable packet from {peer:?}")]
    Decode { peer: PeerId },

    #[error("Dropped packet from unknown peer {peer:?}")]
    UnknownPeer { peer: PeerId },

    #[error(transparent)]
    Scene(#[from] SceneError),
}
