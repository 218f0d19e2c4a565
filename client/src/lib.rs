//! # Scenesync Client
//! Follows the session authority's segment loads and unloads, keeps the
//! session/local handle translation for this peer, and holds back entity
//! creation while a segment transition is running.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

pub mod transport;
pub mod shared {
    pub use scenesync_shared::{
        BitReader, BitWrite, ContentId, Instant, InstantOffset, LoadMode, NetworkId, OperationId,
        PeerId, SceneConfig, SceneMessage, SegmentCatalog, SegmentHandle, Serde, SerdeErr,
    };
}

mod client;
mod error;

pub use client::{ClientConfig, SceneClient};
pub use error::SceneClientError;
