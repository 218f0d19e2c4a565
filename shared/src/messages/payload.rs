use naia_serde::{BitReader, BitWrite, Serde, SerdeErr};

use crate::{ContentId, NetworkId, PlacementId, SegmentHandle};

/// Network identity plus opaque state bytes of one entity, produced and
/// consumed by the entity layer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntitySnapshot {
    pub network_id: NetworkId,
    pub state: Vec<u8>,
}

impl EntitySnapshot {
    pub fn new(network_id: NetworkId, state: Vec<u8>) -> Self {
        Self { network_id, state }
    }
}

impl Serde for EntitySnapshot {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.network_id.ser(writer);
        self.state.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let network_id = NetworkId::de(reader)?;
        let state = Vec::<u8>::de(reader)?;
        Ok(Self { network_id, state })
    }

    fn bit_length(&self) -> u32 {
        self.network_id.bit_length() + self.state.bit_length()
    }
}

/// Snapshot of a pre-placed entity, correlated on the receiving peer by
/// (placement, segment instance) rather than by network id
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacedEntityState {
    pub placement: PlacementId,
    pub snapshot: EntitySnapshot,
}

impl Serde for PlacedEntityState {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.placement.ser(writer);
        self.snapshot.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let placement = PlacementId::de(reader)?;
        let snapshot = EntitySnapshot::de(reader)?;
        Ok(Self {
            placement,
            snapshot,
        })
    }

    fn bit_length(&self) -> u32 {
        self.placement.bit_length() + self.snapshot.bit_length()
    }
}

/// One step of a synchronization sequence: a segment the joining peer must
/// have loaded, and the entities scoped to it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncSegment {
    pub content: ContentId,
    /// Session handle of the segment instance
    pub handle: SegmentHandle,
    pub placed: Vec<PlacedEntityState>,
    pub entities: Vec<EntitySnapshot>,
}

impl Serde for SyncSegment {
    fn ser(&self, writer: &mut dyn BitWrite) {
        self.content.ser(writer);
        self.handle.ser(writer);
        self.placed.ser(writer);
        self.entities.ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let content = ContentId::de(reader)?;
        let handle = SegmentHandle::de(reader)?;
        let placed = Vec::<PlacedEntityState>::de(reader)?;
        let entities = Vec::<EntitySnapshot>::de(reader)?;
        Ok(Self {
            content,
            handle,
            placed,
            entities,
        })
    }

    fn bit_length(&self) -> u32 {
        self.content.bit_length()
            + self.handle.bit_length()
            + self.placed.bit_length()
            + self.entities.bit_length()
    }
}
