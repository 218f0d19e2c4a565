mod instant;
mod timer;

pub use instant::InstantOffset;
pub use naia_socket_shared::Instant;
pub use timer::Timer;
