use crate::{
    messages::payload::EntitySnapshot, ContentId, NetworkId, PeerId, PlacementId, SegmentHandle,
};

/// Engine-side entity hooks the coordinator drives while segments come and
/// go. All handles passed in are local handles of this peer.
pub trait SceneWorld<E> {
    // Segment lifecycle

    /// Despawns entities this peer owns that live in `segment`
    fn despawn_segment_entities(&mut self, segment: SegmentHandle);

    /// Moves entities of `segment` that must survive a segment swap into the
    /// holding area
    fn move_to_holding_area(&mut self, segment: SegmentHandle);

    /// Parks an entity spawned while a segment swap is in progress
    fn park_in_holding_area(&mut self, entity: &E);

    /// Moves every entity in the holding area into `segment`
    fn rehome_holding_area(&mut self, segment: SegmentHandle);

    // Placed entities

    /// Pre-placed entities found in a freshly loaded segment instance
    fn placed_entities(&mut self, segment: SegmentHandle, content: ContentId) -> Vec<(PlacementId, E)>;

    /// Network-spawns a placed entity on the authority, returning its state
    fn spawn_placed_entity(&mut self, entity: &E) -> EntitySnapshot;

    /// Current state of an already spawned placed entity, None if it is gone
    fn placed_entity_snapshot(&self, entity: &E) -> Option<EntitySnapshot>;

    /// Applies authority state onto the matching local placed entity
    fn apply_placed_entity(&mut self, entity: &E, snapshot: &EntitySnapshot);

    // Synchronization

    /// Network entities scoped to `segment`, excluding placed entities
    fn segment_entity_snapshots(&self, segment: SegmentHandle) -> Vec<EntitySnapshot>;

    /// Network entities living outside of any segment
    fn global_entity_snapshots(&self) -> Vec<EntitySnapshot>;

    /// Instantiates a network entity received during synchronization, in
    /// `segment` or globally when None
    fn spawn_snapshot(&mut self, segment: Option<SegmentHandle>, snapshot: &EntitySnapshot);

    /// Instantiates an entity from a raw creation notification
    fn create_entity(&mut self, sender: PeerId, payload: &[u8]);

    // Network entities

    fn despawn_network_entity(&mut self, network_id: NetworkId);

    /// Returns false if no such entity exists on this peer
    fn move_entity_to_segment(&mut self, network_id: NetworkId, segment: SegmentHandle) -> bool;
}
