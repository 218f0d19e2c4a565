use std::default::Default;

use scenesync_shared::SceneConfig;

/// Contains Config properties which will be used by a Client
#[derive(Clone, Debug, Default)]
pub struct ClientConfig {
    /// Used to configure how this client follows scene operations, and runs
    /// them if it is ever handed session authority
    pub scene: SceneConfig,
}
