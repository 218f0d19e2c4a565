use std::time::Duration;

use scenesync_client::{ClientConfig, SceneClient};
use scenesync_server::{SceneServer, ServerConfig};
use scenesync_shared::{
    ContentId, Instant, InstantOffset, PeerId, SceneConfig, SegmentCatalog, SegmentHandle,
};

use crate::{LocalRelay, TestEntity, TestLoader, TestWorld};

pub const SERVER_PEER: PeerId = PeerId::new(1);

/// Segments every test peer knows about
pub const SEGMENTS: [&str; 4] = ["lobby", "arena", "forest", "caves"];

/// Simulated time that passes on every tick
const TICK: Duration = Duration::from_millis(50);

pub fn client_peer(index: usize) -> PeerId {
    PeerId::new(10 + index as u64)
}

pub fn test_catalog() -> SegmentCatalog {
    let mut catalog = SegmentCatalog::builder();
    for name in SEGMENTS {
        catalog.add_segment(name);
    }
    catalog.build()
}

/// One observer: the client host plus the engine doubles behind it
pub struct TestPeer {
    pub peer: PeerId,
    pub client: SceneClient<TestEntity>,
    pub world: TestWorld,
    pub loader: TestLoader,
    pub connected: bool,
}

impl TestPeer {
    /// Local handle this observer bound to the session handle `session`
    pub fn local(&self, session: &SegmentHandle) -> Option<SegmentHandle> {
        self.client.local_segment(session)
    }
}

/// A server and a fixed set of clients wired through one in-memory relay.
/// Local handles differ on every peer, so translation is always exercised.
pub struct TestSession {
    pub now: Instant,
    pub relay: LocalRelay,
    pub server: SceneServer<TestEntity>,
    pub server_world: TestWorld,
    pub server_loader: TestLoader,
    pub clients: Vec<TestPeer>,
}

impl TestSession {
    pub fn new(clients: usize) -> Self {
        Self::with_config(SceneConfig::default(), clients)
    }

    pub fn with_config(scene: SceneConfig, clients: usize) -> Self {
        let relay = LocalRelay::new();

        let server_loader = TestLoader::new(100);
        let mut server = SceneServer::new(
            ServerConfig {
                scene: scene.clone(),
                ..Default::default()
            },
            test_catalog(),
            server_loader.boxed(),
            SERVER_PEER,
        );
        let (sender, receiver) = relay.server_socket(SERVER_PEER);
        server.listen(sender, receiver);

        let clients = (0..clients)
            .map(|index| {
                let peer = client_peer(index);
                let loader = TestLoader::new(1000 * (index as u32 + 1));
                let mut client = SceneClient::new(
                    ClientConfig {
                        scene: scene.clone(),
                    },
                    test_catalog(),
                    loader.boxed(),
                    peer,
                    SERVER_PEER,
                );
                let (sender, receiver) = relay.client_socket(peer);
                client.connect(sender, receiver);

                TestPeer {
                    peer,
                    client,
                    world: TestWorld::new(),
                    loader,
                    connected: false,
                }
            })
            .collect();

        Self {
            now: Instant::now(),
            relay,
            server,
            server_world: TestWorld::new(),
            server_loader,
            clients,
        }
    }

    pub fn content(name: &str) -> ContentId {
        ContentId::from_name(name)
    }

    /// Lets the server accept client `index`, starting its synchronization
    pub fn connect(&mut self, index: usize) {
        let peer = self.clients[index].peer;
        self.server
            .connect_peer(peer, &self.now, &mut self.server_world)
            .expect("server should accept the peer");
        self.clients[index].connected = true;
    }

    pub fn connect_all(&mut self) {
        for index in 0..self.clients.len() {
            self.connect(index);
        }
    }

    /// Connects every client and runs ticks until all are synchronized
    pub fn connect_all_and_sync(&mut self) {
        self.connect_all();
        self.tick_n(4);
        for client in &self.clients {
            assert!(
                self.server.coordinator().is_synchronized(&client.peer),
                "{:?} should be synchronized",
                client.peer
            );
        }
    }

    pub fn disconnect(&mut self, index: usize) {
        let peer = self.clients[index].peer;
        self.relay.disconnect(peer);
        self.clients[index].connected = false;
        self.server
            .disconnect_peer(peer, &self.now, &mut self.server_world);
    }

    pub fn advance(&mut self, duration: Duration) {
        self.now = self.now.offset(duration);
    }

    /// One round: the server updates and sends, every connected client
    /// receives, updates and answers, then the server reads the answers
    pub fn tick(&mut self) {
        self.advance(TICK);

        self.server.update(&self.now, &mut self.server_world);
        self.server.send_all_packets();

        for peer in self.clients.iter_mut().filter(|peer| peer.connected) {
            peer.client.receive_packets(&self.now, &mut peer.world);
            peer.client.update(&self.now, &mut peer.world);
            peer.client.send_all_packets();
        }

        self.server.receive_packets(&self.now, &mut self.server_world);
        self.server.send_all_packets();
    }

    pub fn tick_n(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Local handle the server holds for the given session handle
    pub fn server_local(&self, session: &SegmentHandle) -> Option<SegmentHandle> {
        self.server.coordinator().handles().session_to_local(session)
    }

    /// Session handle the server minted for one of its local segments
    pub fn session_handle(&self, local: &SegmentHandle) -> Option<SegmentHandle> {
        self.server.coordinator().handles().local_to_session(local)
    }
}
