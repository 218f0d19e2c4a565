use std::default::Default;

use scenesync_shared::SceneConfig;

/// Contains Config properties which will be used by the Server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Used to configure the scene operations run by this server
    pub scene: SceneConfig,
    /// Determines whether newly connected peers are synchronized with the
    /// loaded segments, or counted as already up to date.
    pub synchronize_on_connect: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            scene: SceneConfig::default(),
            synchronize_on_connect: true,
        }
    }
}
