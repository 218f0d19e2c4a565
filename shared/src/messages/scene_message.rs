use naia_serde::{BitReader, BitWrite, FileBitWriter, Serde, SerdeErr, UnsignedInteger};

use crate::{
    messages::payload::{EntitySnapshot, PlacedEntityState, SyncSegment},
    ContentId, Delivery, LoadMode, NetworkId, OperationId, PeerId, SegmentHandle,
};

/// Every message of the scene protocol. Handles are always session handles,
/// each peer translates them through its HandleTable on the way in and out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SceneMessage {
    /// Authority finished loading a segment, observers must load it too
    Load {
        operation: OperationId,
        content: ContentId,
        mode: LoadMode,
        handle: SegmentHandle,
        placed: Vec<PlacedEntityState>,
    },
    /// Authority finished unloading a segment, observers must unload it too
    Unload {
        operation: OperationId,
        content: ContentId,
        handle: SegmentHandle,
    },
    /// Observer finished its local load
    LoadComplete {
        operation: OperationId,
        content: ContentId,
        handle: SegmentHandle,
    },
    /// Observer finished its local unload
    UnloadComplete {
        operation: OperationId,
        content: ContentId,
        handle: SegmentHandle,
    },
    /// Authority summary once every expected observer finished or timed out
    LoadOperationCompleted {
        operation: OperationId,
        content: ContentId,
        mode: LoadMode,
        completed: Vec<PeerId>,
        timed_out: Vec<PeerId>,
    },
    UnloadOperationCompleted {
        operation: OperationId,
        content: ContentId,
        completed: Vec<PeerId>,
        timed_out: Vec<PeerId>,
    },
    /// Everything a joining peer needs, active segment first
    Synchronize {
        operation: OperationId,
        mode: LoadMode,
        segments: Vec<SyncSegment>,
        global: Vec<EntitySnapshot>,
    },
    SynchronizeComplete { operation: OperationId },
    /// Entities despawned while the peer was synchronizing
    ReSynchronize {
        operation: OperationId,
        despawned: Vec<NetworkId>,
    },
    ActiveSegmentChanged {
        content: ContentId,
        handle: SegmentHandle,
    },
    ObjectSegmentChanged {
        network_id: NetworkId,
        handle: SegmentHandle,
    },
}

impl SceneMessage {
    pub fn name(&self) -> &'static str {
        match self {
            SceneMessage::Load { .. } => "Load",
            SceneMessage::Unload { .. } => "Unload",
            SceneMessage::LoadComplete { .. } => "LoadComplete",
            SceneMessage::UnloadComplete { .. } => "UnloadComplete",
            SceneMessage::LoadOperationCompleted { .. } => "LoadOperationCompleted",
            SceneMessage::UnloadOperationCompleted { .. } => "UnloadOperationCompleted",
            SceneMessage::Synchronize { .. } => "Synchronize",
            SceneMessage::SynchronizeComplete { .. } => "SynchronizeComplete",
            SceneMessage::ReSynchronize { .. } => "ReSynchronize",
            SceneMessage::ActiveSegmentChanged { .. } => "ActiveSegmentChanged",
            SceneMessage::ObjectSegmentChanged { .. } => "ObjectSegmentChanged",
        }
    }

    pub fn operation(&self) -> Option<OperationId> {
        match self {
            SceneMessage::Load { operation, .. }
            | SceneMessage::Unload { operation, .. }
            | SceneMessage::LoadComplete { operation, .. }
            | SceneMessage::UnloadComplete { operation, .. }
            | SceneMessage::LoadOperationCompleted { operation, .. }
            | SceneMessage::UnloadOperationCompleted { operation, .. }
            | SceneMessage::Synchronize { operation, .. }
            | SceneMessage::SynchronizeComplete { operation }
            | SceneMessage::ReSynchronize { operation, .. } => Some(*operation),
            SceneMessage::ActiveSegmentChanged { .. }
            | SceneMessage::ObjectSegmentChanged { .. } => None,
        }
    }

    /// Messages carrying entity payloads may exceed a single packet
    pub fn delivery(&self) -> Delivery {
        match self {
            SceneMessage::Load { .. } | SceneMessage::Synchronize { .. } => {
                Delivery::ReliableFragmented
            }
            _ => Delivery::ReliableOrdered,
        }
    }

    /// Encodes without the MTU cap of the packet writer, synchronize payloads
    /// are fragmented by the transport
    pub fn to_bytes(&self) -> Box<[u8]> {
        let mut writer = FileBitWriter::new();
        self.ser(&mut writer);
        writer.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerdeErr> {
        let mut reader = BitReader::new(bytes);
        Self::de(&mut reader)
    }

    fn index(&self) -> u8 {
        match self {
            SceneMessage::Load { .. } => 0,
            SceneMessage::Unload { .. } => 1,
            SceneMessage::LoadComplete { .. } => 2,
            SceneMessage::UnloadComplete { .. } => 3,
            SceneMessage::LoadOperationCompleted { .. } => 4,
            SceneMessage::UnloadOperationCompleted { .. } => 5,
            SceneMessage::Synchronize { .. } => 6,
            SceneMessage::SynchronizeComplete { .. } => 7,
            SceneMessage::ReSynchronize { .. } => 8,
            SceneMessage::ActiveSegmentChanged { .. } => 9,
            SceneMessage::ObjectSegmentChanged { .. } => 10,
        }
    }
}

impl Serde for SceneMessage {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedInteger::<4>::new(self.index()).ser(writer);

        match self {
            SceneMessage::Load {
                operation,
                content,
                mode,
                handle,
                placed,
            } => {
                operation.ser(writer);
                content.ser(writer);
                mode.ser(writer);
                handle.ser(writer);
                placed.ser(writer);
            }
            SceneMessage::Unload {
                operation,
                content,
                handle,
            }
            | SceneMessage::LoadComplete {
                operation,
                content,
                handle,
            }
            | SceneMessage::UnloadComplete {
                operation,
                content,
                handle,
            } => {
                operation.ser(writer);
                content.ser(writer);
                handle.ser(writer);
            }
            SceneMessage::LoadOperationCompleted {
                operation,
                content,
                mode,
                completed,
                timed_out,
            } => {
                operation.ser(writer);
                content.ser(writer);
                mode.ser(writer);
                completed.ser(writer);
                timed_out.ser(writer);
            }
            SceneMessage::UnloadOperationCompleted {
                operation,
                content,
                completed,
                timed_out,
            } => {
                operation.ser(writer);
                content.ser(writer);
                completed.ser(writer);
                timed_out.ser(writer);
            }
            SceneMessage::Synchronize {
                operation,
                mode,
                segments,
                global,
            } => {
                operation.ser(writer);
                mode.ser(writer);
                segments.ser(writer);
                global.ser(writer);
            }
            SceneMessage::SynchronizeComplete { operation } => {
                operation.ser(writer);
            }
            SceneMessage::ReSynchronize {
                operation,
                despawned,
            } => {
                operation.ser(writer);
                despawned.ser(writer);
            }
            SceneMessage::ActiveSegmentChanged { content, handle } => {
                content.ser(writer);
                handle.ser(writer);
            }
            SceneMessage::ObjectSegmentChanged { network_id, handle } => {
                network_id.ser(writer);
                handle.ser(writer);
            }
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let index = UnsignedInteger::<4>::de(reader)?.get();

        match index {
            0 => Ok(SceneMessage::Load {
                operation: OperationId::de(reader)?,
                content: ContentId::de(reader)?,
                mode: LoadMode::de(reader)?,
                handle: SegmentHandle::de(reader)?,
                placed: Vec::<PlacedEntityState>::de(reader)?,
            }),
            1 => Ok(SceneMessage::Unload {
                operation: OperationId::de(reader)?,
                content: ContentId::de(reader)?,
                handle: SegmentHandle::de(reader)?,
            }),
            2 => Ok(SceneMessage::LoadComplete {
                operation: OperationId::de(reader)?,
                content: ContentId::de(reader)?,
                handle: SegmentHandle::de(reader)?,
            }),
            3 => Ok(SceneMessage::UnloadComplete {
                operation: OperationId::de(reader)?,
                content: ContentId::de(reader)?,
                handle: SegmentHandle::de(reader)?,
            }),
            4 => Ok(SceneMessage::LoadOperationCompleted {
                operation: OperationId::de(reader)?,
                content: ContentId::de(reader)?,
                mode: LoadMode::de(reader)?,
                completed: Vec::<PeerId>::de(reader)?,
                timed_out: Vec::<PeerId>::de(reader)?,
            }),
            5 => Ok(SceneMessage::UnloadOperationCompleted {
                operation: OperationId::de(reader)?,
                content: ContentId::de(reader)?,
                completed: Vec::<PeerId>::de(reader)?,
                timed_out: Vec::<PeerId>::de(reader)?,
            }),
            6 => Ok(SceneMessage::Synchronize {
                operation: OperationId::de(reader)?,
                mode: LoadMode::de(reader)?,
                segments: Vec::<SyncSegment>::de(reader)?,
                global: Vec::<EntitySnapshot>::de(reader)?,
            }),
            7 => Ok(SceneMessage::SynchronizeComplete {
                operation: OperationId::de(reader)?,
            }),
            8 => Ok(SceneMessage::ReSynchronize {
                operation: OperationId::de(reader)?,
                despawned: Vec::<NetworkId>::de(reader)?,
            }),
            9 => Ok(SceneMessage::ActiveSegmentChanged {
                content: ContentId::de(reader)?,
                handle: SegmentHandle::de(reader)?,
            }),
            10 => Ok(SceneMessage::ObjectSegmentChanged {
                network_id: NetworkId::de(reader)?,
                handle: SegmentHandle::de(reader)?,
            }),
            // Malformed or malicious input, never panic on it
            _ => Err(SerdeErr),
        }
    }

    fn bit_length(&self) -> u32 {
        let mut output = 4;

        output += match self {
            SceneMessage::Load {
                operation,
                content,
                mode,
                handle,
                placed,
            } => {
                operation.bit_length()
                    + content.bit_length()
                    + mode.bit_length()
                    + handle.bit_length()
                    + placed.bit_length()
            }
            SceneMessage::Unload {
                operation,
                content,
                handle,
            }
            | SceneMessage::LoadComplete {
                operation,
                content,
                handle,
            }
            | SceneMessage::UnloadComplete {
                operation,
                content,
                handle,
            } => operation.bit_length() + content.bit_length() + handle.bit_length(),
            SceneMessage::LoadOperationCompleted {
                operation,
                content,
                mode,
                completed,
                timed_out,
            } => {
                operation.bit_length()
                    + content.bit_length()
                    + mode.bit_length()
                    + completed.bit_length()
                    + timed_out.bit_length()
            }
            SceneMessage::UnloadOperationCompleted {
                operation,
                content,
                completed,
                timed_out,
            } => {
                operation.bit_length()
                    + content.bit_length()
                    + completed.bit_length()
                    + timed_out.bit_length()
            }
            SceneMessage::Synchronize {
                operation,
                mode,
                segments,
                global,
            } => {
                operation.bit_length()
                    + mode.bit_length()
                    + segments.bit_length()
                    + global.bit_length()
            }
            SceneMessage::SynchronizeComplete { operation } => operation.bit_length(),
            SceneMessage::ReSynchronize {
                operation,
                despawned,
            } => operation.bit_length() + despawned.bit_length(),
            SceneMessage::ActiveSegmentChanged { content, handle } => {
                content.bit_length() + handle.bit_length()
            }
            SceneMessage::ObjectSegmentChanged { network_id, handle } => {
                network_id.bit_length() + handle.bit_length()
            }
        };

        output
    }
}
