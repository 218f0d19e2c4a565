//! # Scenesync Shared
//! Scene load/unload coordination shared between scenesync-server &
//! scenesync-client crates: the operation coordinator, progress tracking,
//! handle translation, late-join synchronization and the wire messages
//! connecting them.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub use naia_serde::{BitReader, BitWrite, FileBitWriter, Serde, SerdeErr};

mod backends;
mod catalog;
mod config;
mod error;
mod messages;
mod scene;
mod types;

pub use backends::{Instant, InstantOffset, Timer};
pub use catalog::{error::CatalogError, SegmentCatalog, SegmentInfo};
pub use config::SceneConfig;
pub use error::SceneError;
pub use messages::{
    payload::{EntitySnapshot, PlacedEntityState, SyncSegment},
    scene_message::SceneMessage,
};
pub use scene::{
    coordinator::{OperationCoordinator, ValidationFn, ValidationRequest},
    deferred_queue::{DeferredCreation, DeferredQueue},
    events::{
        ActiveSegmentChangedEvent, ErrorEvent, LoadCompleteEvent, LoadEvent,
        LoadOperationCompletedEvent, ObjectSegmentChangedEvent, OperationStarted,
        OperationSummary, PeerCompletion, ReSynchronizeEvent, SceneEvent, SceneEvents,
        SynchronizeCompleteEvent, SynchronizeEvent, UnloadCompleteEvent, UnloadEvent,
        UnloadOperationCompletedEvent,
    },
    handle_table::{HandleTable, SegmentInstance, TrackedSegment},
    loader::{AsyncSegmentOp, AsyncStatus, LoaderError, SegmentLoader},
    placement_registry::PlacementRegistry,
    progress_tracker::{ProgressStatus, ProgressTracker},
    sync_sequencer::{InFlightSync, SyncQueue, SyncSequence},
    world::SceneWorld,
};
pub use types::{
    ContentId, Delivery, LoadMode, NetworkId, OperationId, OperationKind, PeerId, PlacementId,
    SegmentHandle,
};
