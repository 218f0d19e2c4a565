use std::{default::Default, time::Duration};

use crate::LoadMode;

/// Contains Config properties which will be used by a peer's OperationCoordinator
#[derive(Clone, Debug)]
pub struct SceneConfig {
    /// How a joining peer applies the authority's segments: `Single` makes the
    /// authority's active segment replace whatever the peer had loaded and
    /// unloads leftovers afterwards, `Additive` keeps the peer's own segments
    pub sync_mode: LoadMode,
    /// Deadline for a load/unload/synchronize operation, measured from its start
    pub operation_timeout: Duration,
    /// How often in-flight operations are checked for completion and expiry
    pub progress_check_interval: Duration,
    /// Only one joining peer is synchronized at a time, the rest wait in FIFO
    /// order. Enable when all traffic goes through a shared relay.
    pub serialize_synchronization: bool,
    /// Tell freshly synchronized peers about entities despawned while their
    /// synchronization was in flight
    pub resynchronize: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            sync_mode: LoadMode::Single,
            operation_timeout: Duration::from_secs(10),
            progress_check_interval: Duration::from_millis(100),
            serialize_synchronization: false,
            resynchronize: true,
        }
    }
}
