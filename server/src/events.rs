use std::{mem, vec::IntoIter};

use scenesync_shared::PeerId;

use crate::SceneServerError;

/// Connection bookkeeping and host-level failures. Scene operation events
/// are read separately through `SceneServer::take_scene_events()`.
pub struct MainEvents {
    connections: Vec<PeerId>,
    disconnections: Vec<PeerId>,
    errors: Vec<SceneServerError>,

    empty: bool,
}

impl Default for MainEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl MainEvents {
    pub(crate) fn new() -> Self {
        Self {
            connections: Vec::new(),
            disconnections: Vec::new(),
            errors: Vec::new(),

            empty: true,
        }
    }

    // Public

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn read<V: MainEvent>(&mut self) -> V::Iter {
        V::iter(self)
    }

    pub fn has<V: MainEvent>(&self) -> bool {
        V::has(self)
    }

    // Crate-public

    pub(crate) fn push_connection(&mut self, peer: &PeerId) {
        self.connections.push(*peer);
        self.empty = false;
    }

    pub(crate) fn push_disconnection(&mut self, peer: &PeerId) {
        self.disconnections.push(*peer);
        self.empty = false;
    }

    pub(crate) fn push_error(&mut self, error: SceneServerError) {
        self.errors.push(error);
        self.empty = false;
    }
}

// Event Trait
pub trait MainEvent {
    type Iter;

    fn iter(events: &mut MainEvents) -> Self::Iter;

    fn has(events: &MainEvents) -> bool;
}

// ConnectEvent
pub struct ConnectEvent;
impl MainEvent for ConnectEvent {
    type Iter = IntoIter<PeerId>;

    fn iter(events: &mut MainEvents) -> Self::Iter {
        let list = mem::take(&mut events.connections);
        IntoIterator::into_iter(list)
    }

    fn has(events: &MainEvents) -> bool {
        !events.connections.is_empty()
    }
}

// DisconnectEvent
pub struct DisconnectEvent;
impl MainEvent for DisconnectEvent {
    type Iter = IntoIter<PeerId>;

    fn iter(events: &mut MainEvents) -> Self::Iter {
        let list = mem::take(&mut events.disconnections);
        IntoIterator::into_iter(list)
    }

    fn has(events: &MainEvents) -> bool {
        !events.disconnections.is_empty()
    }
}

// ServerErrorEvent
pub struct ServerErrorEvent;
impl MainEvent for ServerErrorEvent {
    type Iter = IntoIter<SceneServerError>;

    fn iter(events: &mut MainEvents) -> Self::Iter {
        let list = mem::take(&mut events.errors);
        IntoIterator::into_iter(list)
    }

    fn has(events: &MainEvents) -> bool {
        !events.errors.is_empty()
    }
}
