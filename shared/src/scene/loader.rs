use thiserror::Error;

use crate::{catalog::SegmentInfo, LoadMode, SegmentHandle};

/// State of an asynchronous load or unload, as reported by the engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AsyncStatus {
    Pending,
    /// Load finished, carrying the engine's local handle of the new instance
    Loaded(SegmentHandle),
    Unloaded,
    Failed(String),
}

/// A load or unload started by the engine. Polled once per tick until it
/// stops reporting `Pending`.
pub trait AsyncSegmentOp {
    fn poll(&mut self) -> AsyncStatus;
}

/// Engine-side segment load/unload primitive. Neither call may assume the
/// operation completes synchronously, even if it does.
pub trait SegmentLoader {
    fn begin_load(
        &mut self,
        segment: &SegmentInfo,
        mode: LoadMode,
    ) -> Result<Box<dyn AsyncSegmentOp>, LoaderError>;

    fn begin_unload(&mut self, local: SegmentHandle) -> Result<Box<dyn AsyncSegmentOp>, LoaderError>;
}

/// The engine refused to start a load or unload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoaderError {
    #[error("Segment '{name}' could not be loaded: {reason}")]
    LoadRejected { name: String, reason: String },

    #[error("Segment instance {local:?} could not be unloaded: {reason}")]
    UnloadRejected { local: SegmentHandle, reason: String },
}
