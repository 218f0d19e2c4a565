//! # Scenesync Server
//! Hosts the session authority: starts segment load/unload operations,
//! waits on every synchronized peer to finish them, and brings late
//! joiners up to date with the segments already loaded.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

pub mod transport;
pub mod shared {
    pub use scenesync_shared::{
        BitReader, BitWrite, ContentId, FileBitWriter, Instant, InstantOffset, LoadMode, NetworkId,
        OperationId, PeerId, SceneConfig, SceneMessage, SegmentCatalog, SegmentHandle, Serde, SerdeErr,
    };
}

mod error;
mod events;
mod server;

pub use error::SceneServerError;
pub use events::{ConnectEvent, DisconnectEvent, MainEvent, MainEvents, ServerErrorEvent};
pub use server::{SceneServer, ServerConfig};
