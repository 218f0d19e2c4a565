use log::{error, warn};
use thiserror::Error;

use crate::{ContentId, LoadMode, OperationId, OperationKind, PeerId, PlacementId, SegmentHandle};

/// Errors produced by scene operations
///
/// Request-time failures (authority, in-progress, target, validation) are
/// returned synchronously and never broadcast. Failures that happen while an
/// operation is running force-end that operation and are reported through the
/// error events instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    /// Only the session authority may start this operation
    #[error("Cannot start {kind:?} - this peer is not the session authority")]
    NotAuthority { kind: OperationKind },

    /// At most one operation may be active per peer
    #[error("Cannot start {requested:?} - a {active:?} operation is already in progress")]
    OperationInProgress {
        requested: OperationKind,
        active: OperationKind,
    },

    /// Target segment is unknown or cannot be used for this operation
    #[error("Invalid target segment {content:?}: {reason}")]
    InvalidTarget {
        content: ContentId,
        reason: &'static str,
    },

    /// The injected validation hook rejected the request
    #[error("{kind:?} of segment {content:?} ({mode:?}) rejected by validation")]
    FailedValidation {
        kind: OperationKind,
        content: ContentId,
        mode: LoadMode,
    },

    /// Segment instance is not loaded on this peer
    #[error("Segment instance {handle:?} is not loaded")]
    NotLoaded { handle: SegmentHandle },

    /// A handle pair could not be bound because either side is already bound
    #[error("Cannot bind session handle {session:?} to local handle {local:?} - one side is already bound")]
    DuplicateHandleBinding {
        session: SegmentHandle,
        local: SegmentHandle,
    },

    /// A placed entity was registered twice for the same segment instance
    #[error("Placed entity {placement:?} is already registered in segment {segment:?}")]
    DuplicateEntityPlacement {
        placement: PlacementId,
        segment: SegmentHandle,
    },

    /// A message arrived that is not valid for the current state, it was dropped
    #[error("Protocol violation from {peer:?} on {message}: {reason}")]
    ProtocolViolation {
        peer: PeerId,
        message: &'static str,
        reason: String,
    },

    /// The operation reached its deadline before every peer finished
    #[error("{kind:?} operation {operation:?} timed out waiting on {timed_out:?}")]
    Timeout {
        operation: OperationId,
        kind: OperationKind,
        timed_out: Vec<PeerId>,
    },

    /// Missing or inconsistent local state, the operation was force-ended
    #[error("Internal error during {kind:?} operation {operation:?}: {context}")]
    InternalError {
        operation: Option<OperationId>,
        kind: OperationKind,
        context: String,
    },
}

impl SceneError {
    /// Outcomes callers are expected to branch on. Everything else is a defect.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            SceneError::Timeout { .. } | SceneError::FailedValidation { .. }
        )
    }

    /// Defects that indicate corrupted state or a misbehaving peer
    pub fn is_severe(&self) -> bool {
        matches!(
            self,
            SceneError::DuplicateEntityPlacement { .. }
                | SceneError::ProtocolViolation { .. }
                | SceneError::InternalError { .. }
        )
    }

    pub fn log(&self) {
        if self.is_severe() {
            error!("Scene Error: {}", self);
        } else {
            warn!("Scene Error: {}", self);
        }
    }
}
