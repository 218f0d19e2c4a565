use std::{collections::HashMap, fmt::Debug, hash::Hash};

use crate::{PlacementId, SceneError, SegmentHandle};

/// Pre-placed entities per loaded segment instance. Keyed by (placement,
/// local segment handle) so the same content loaded twice additively keeps
/// two distinct sets of entities.
pub struct PlacementRegistry<E: Copy + Eq + Hash> {
    placements: HashMap<(PlacementId, SegmentHandle), E>,
    segment_placements: HashMap<SegmentHandle, Vec<PlacementId>>,
}

impl<E: Copy + Eq + Hash + Debug> PlacementRegistry<E> {
    pub fn new() -> Self {
        Self {
            placements: HashMap::new(),
            segment_placements: HashMap::new(),
        }
    }

    /// Registers a placed entity. A second registration of the same key is a
    /// duplicate placement and is rejected, the first entity stays.
    pub fn register(
        &mut self,
        placement: PlacementId,
        segment: SegmentHandle,
        entity: E,
    ) -> Result<(), SceneError> {
        let key = (placement, segment);
        if self.placements.contains_key(&key) {
            return Err(SceneError::DuplicateEntityPlacement { placement, segment });
        }

        self.placements.insert(key, entity);
        self.segment_placements
            .entry(segment)
            .or_default()
            .push(placement);

        Ok(())
    }

    pub fn resolve(&self, placement: &PlacementId, segment: &SegmentHandle) -> Option<E> {
        self.placements.get(&(*placement, *segment)).copied()
    }

    pub fn has_segment(&self, segment: &SegmentHandle) -> bool {
        self.segment_placements.contains_key(segment)
    }

    /// Placed entities of one segment instance, in registration order
    pub fn segment_entries(&self, segment: &SegmentHandle) -> Vec<(PlacementId, E)> {
        let Some(placements) = self.segment_placements.get(segment) else {
            return Vec::new();
        };

        placements
            .iter()
            .filter_map(|placement| {
                self.placements
                    .get(&(*placement, *segment))
                    .map(|entity| (*placement, *entity))
            })
            .collect()
    }

    pub fn remove_segment(&mut self, segment: &SegmentHandle) -> Vec<(PlacementId, E)> {
        let Some(placements) = self.segment_placements.remove(segment) else {
            return Vec::new();
        };

        placements
            .into_iter()
            .filter_map(|placement| {
                self.placements
                    .remove(&(placement, *segment))
                    .map(|entity| (placement, entity))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

impl<E: Copy + Eq + Hash + Debug> Default for PlacementRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}
