use thiserror::Error;

use crate::ContentId;

/// Errors that can occur while building a SegmentCatalog
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Catalog is locked and cannot be modified
    #[error("SegmentCatalog is already locked and cannot be modified")]
    AlreadyLocked,

    /// The same segment name was registered twice
    #[error("Segment '{name}' is already registered")]
    DuplicateSegment { name: String },

    /// Two different names hash to the same content id
    #[error("Segment '{name}' collides with '{existing}' on content id {content:?}")]
    ContentIdCollision {
        name: String,
        existing: String,
        content: ContentId,
    },
}
