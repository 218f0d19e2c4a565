pub mod assertions;
pub mod test_session;

pub use test_session::{client_peer, test_catalog, TestPeer, TestSession, SEGMENTS, SERVER_PEER};
