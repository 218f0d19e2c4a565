pub mod helpers;
pub mod local_socket;
pub mod test_loader;
pub mod test_world;

pub use helpers::*;
pub use local_socket::LocalRelay;
pub use test_loader::TestLoader;
pub use test_world::{TestEntity, TestWorld};
