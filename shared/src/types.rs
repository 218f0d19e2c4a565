use naia_serde::{BitReader, BitWrite, Serde, SerdeErr, UnsignedInteger, UnsignedVariableInteger};

// PeerId
/// Identifies a connected peer in the session. The authority is a peer like
/// any other, only the "am I the authority" bit differs.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Serde for PeerId {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<7>::new(self.0).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let value = UnsignedVariableInteger::<7>::de(reader)?.get();
        u64::try_from(value).map(Self).map_err(|_| SerdeErr)
    }

    fn bit_length(&self) -> u32 {
        UnsignedVariableInteger::<7>::new(self.0).bit_length()
    }
}

// SegmentHandle
/// Opaque identifier of a loaded segment instance. Local handles are only
/// meaningful on the peer that produced them, session handles are minted by
/// the authority and are the only handles that ever go over the wire.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct SegmentHandle(u32);

impl SegmentHandle {
    /// Reserved "no segment" sentinel, never bound or minted
    pub const NONE: SegmentHandle = SegmentHandle(0);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl Serde for SegmentHandle {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<7>::new(self.0).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let value = UnsignedVariableInteger::<7>::de(reader)?.get();
        u32::try_from(value).map(Self).map_err(|_| SerdeErr)
    }

    fn bit_length(&self) -> u32 {
        UnsignedVariableInteger::<7>::new(self.0).bit_length()
    }
}

// ContentId
/// Stable identifier of a segment's content, identical on every peer
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct ContentId(u32);

impl ContentId {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// FNV-1a over the segment name, so all peers agree without negotiation
    pub fn from_name(name: &str) -> Self {
        let mut hash: u32 = 0x811c_9dc5;
        for byte in name.as_bytes() {
            hash ^= u32::from(*byte);
            hash = hash.wrapping_mul(0x0100_0193);
        }
        Self(hash)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl Serde for ContentId {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedInteger::<32>::new(self.0).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let value = UnsignedInteger::<32>::de(reader)?.get();
        u32::try_from(value).map(Self).map_err(|_| SerdeErr)
    }

    fn bit_length(&self) -> u32 {
        32
    }
}

// PlacementId
/// Stable identifier of a pre-placed entity within its segment's content
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct PlacementId(u32);

impl PlacementId {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl Serde for PlacementId {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<7>::new(self.0).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let value = UnsignedVariableInteger::<7>::de(reader)?.get();
        u32::try_from(value).map(Self).map_err(|_| SerdeErr)
    }

    fn bit_length(&self) -> u32 {
        UnsignedVariableInteger::<7>::new(self.0).bit_length()
    }
}

// NetworkId
/// Session-wide id of a network-spawned entity, assigned by the entity layer
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct NetworkId(u64);

impl NetworkId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Serde for NetworkId {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<7>::new(self.0).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let value = UnsignedVariableInteger::<7>::de(reader)?.get();
        u64::try_from(value).map(Self).map_err(|_| SerdeErr)
    }

    fn bit_length(&self) -> u32 {
        UnsignedVariableInteger::<7>::new(self.0).bit_length()
    }
}

// OperationId
/// Correlates every message of one operation with its progress tracker
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord)]
pub struct OperationId(u32);

impl OperationId {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl Serde for OperationId {
    fn ser(&self, writer: &mut dyn BitWrite) {
        UnsignedVariableInteger::<7>::new(self.0).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        let value = UnsignedVariableInteger::<7>::de(reader)?.get();
        u32::try_from(value).map(Self).map_err(|_| SerdeErr)
    }

    fn bit_length(&self) -> u32 {
        UnsignedVariableInteger::<7>::new(self.0).bit_length()
    }
}

// LoadMode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadMode {
    /// Replaces every loaded segment with the new one
    Single,
    /// Loads next to the segments already present
    Additive,
}

impl Serde for LoadMode {
    fn ser(&self, writer: &mut dyn BitWrite) {
        (*self == LoadMode::Additive).ser(writer);
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        if bool::de(reader)? {
            Ok(LoadMode::Additive)
        } else {
            Ok(LoadMode::Single)
        }
    }

    fn bit_length(&self) -> u32 {
        1
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Load,
    Unload,
    Synchronize,
    ActiveSegmentChanged,
    ObjectMigrated,
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Load => "load",
            OperationKind::Unload => "unload",
            OperationKind::Synchronize => "synchronize",
            OperationKind::ActiveSegmentChanged => "active segment change",
            OperationKind::ObjectMigrated => "object migration",
        }
    }
}

/// Delivery guarantee requested from the transport for an outgoing message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Delivery {
    ReliableOrdered,
    /// Same as `ReliableOrdered`, but the payload may exceed one packet
    ReliableFragmented,
}
