/// Recording world for E2E testing
/// Keeps network entities per segment and logs every hook the coordinator
/// calls, so tests can assert on what happened to the engine side.

use std::collections::{BTreeMap, HashMap};

use scenesync_shared::{
    ContentId, EntitySnapshot, NetworkId, PeerId, PlacementId, SceneWorld, SegmentHandle,
};

// TestEntity - Simple u64-based entity
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TestEntity(u64);

impl TestEntity {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Default)]
pub struct TestWorld {
    next_entity: u64,
    /// Placements authored into each segment's content
    layouts: HashMap<ContentId, Vec<PlacementId>>,
    /// Network entities and the local segment they live in, None if global
    network: BTreeMap<NetworkId, Option<SegmentHandle>>,
    /// Placed entities network-spawned on this peer
    spawned_placed: HashMap<TestEntity, NetworkId>,

    pub placed: Vec<(TestEntity, SegmentHandle, PlacementId)>,
    pub applied: Vec<(TestEntity, EntitySnapshot)>,
    pub created: Vec<(PeerId, Vec<u8>)>,
    pub despawned: Vec<NetworkId>,
    pub cleared_segments: Vec<SegmentHandle>,
    pub evacuated: Vec<SegmentHandle>,
    pub holding_area: Vec<TestEntity>,
    pub rehomed: Vec<SegmentHandle>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every instance of `content` comes with placed entities `placements`
    pub fn author_placements(&mut self, content: ContentId, placements: &[u32]) {
        self.layouts.insert(
            content,
            placements.iter().copied().map(PlacementId::new).collect(),
        );
    }

    /// Spawns a network entity in `segment`, or globally when None
    pub fn spawn_network_entity(&mut self, network_id: NetworkId, segment: Option<SegmentHandle>) {
        self.network.insert(network_id, segment);
    }

    pub fn has_network_entity(&self, network_id: &NetworkId) -> bool {
        self.network.contains_key(network_id)
    }

    /// Some(None) for a global entity, None if it does not exist
    pub fn entity_segment(&self, network_id: &NetworkId) -> Option<Option<SegmentHandle>> {
        self.network.get(network_id).copied()
    }

    pub fn network_entities(&self) -> Vec<NetworkId> {
        self.network.keys().copied().collect()
    }

    /// Placed-entity snapshots applied so far, keyed by placement
    pub fn applied_placements(&self) -> Vec<(PlacementId, EntitySnapshot)> {
        self.applied
            .iter()
            .filter_map(|(entity, snapshot)| {
                self.placed
                    .iter()
                    .find(|(placed, _, _)| placed == entity)
                    .map(|(_, _, placement)| (*placement, snapshot.clone()))
            })
            .collect()
    }

    fn new_entity(&mut self) -> TestEntity {
        self.next_entity += 1;
        TestEntity(self.next_entity)
    }

    fn snapshots(&self, segment: Option<SegmentHandle>) -> Vec<EntitySnapshot> {
        self.network
            .iter()
            .filter(|(_, home)| **home == segment)
            .map(|(network_id, _)| {
                EntitySnapshot::new(*network_id, network_id.value().to_le_bytes().to_vec())
            })
            .collect()
    }
}

impl SceneWorld<TestEntity> for TestWorld {
    fn despawn_segment_entities(&mut self, segment: SegmentHandle) {
        self.cleared_segments.push(segment);
        self.network.retain(|_, home| *home != Some(segment));
    }

    fn move_to_holding_area(&mut self, segment: SegmentHandle) {
        self.evacuated.push(segment);
    }

    fn park_in_holding_area(&mut self, entity: &TestEntity) {
        self.holding_area.push(*entity);
    }

    fn rehome_holding_area(&mut self, segment: SegmentHandle) {
        self.rehomed.push(segment);
        self.holding_area.clear();
    }

    fn placed_entities(
        &mut self,
        segment: SegmentHandle,
        content: ContentId,
    ) -> Vec<(PlacementId, TestEntity)> {
        let placements = self.layouts.get(&content).cloned().unwrap_or_default();
        placements
            .into_iter()
            .map(|placement| {
                let entity = self.new_entity();
                self.placed.push((entity, segment, placement));
                (placement, entity)
            })
            .collect()
    }

    fn spawn_placed_entity(&mut self, entity: &TestEntity) -> EntitySnapshot {
        let network_id = NetworkId::new(10_000 + entity.id());
        self.spawned_placed.insert(*entity, network_id);
        EntitySnapshot::new(network_id, entity.id().to_le_bytes().to_vec())
    }

    fn placed_entity_snapshot(&self, entity: &TestEntity) -> Option<EntitySnapshot> {
        self.spawned_placed
            .get(entity)
            .map(|network_id| EntitySnapshot::new(*network_id, entity.id().to_le_bytes().to_vec()))
    }

    fn apply_placed_entity(&mut self, entity: &TestEntity, snapshot: &EntitySnapshot) {
        self.applied.push((*entity, snapshot.clone()));
    }

    fn segment_entity_snapshots(&self, segment: SegmentHandle) -> Vec<EntitySnapshot> {
        self.snapshots(Some(segment))
    }

    fn global_entity_snapshots(&self) -> Vec<EntitySnapshot> {
        self.snapshots(None)
    }

    fn spawn_snapshot(&mut self, segment: Option<SegmentHandle>, snapshot: &EntitySnapshot) {
        self.network.insert(snapshot.network_id, segment);
    }

    fn create_entity(&mut self, sender: PeerId, payload: &[u8]) {
        self.created.push((sender, payload.to_vec()));
    }

    fn despawn_network_entity(&mut self, network_id: NetworkId) {
        if self.network.remove(&network_id).is_some() {
            self.despawned.push(network_id);
        }
    }

    fn move_entity_to_segment(&mut self, network_id: NetworkId, segment: SegmentHandle) -> bool {
        match self.network.get_mut(&network_id) {
            Some(home) => {
                *home = Some(segment);
                true
            }
            None => false,
        }
    }
}
