use bytemuck::{Pod, Zeroable};

/// The type of a node as stored in its hierarchy record.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum NodeType {
    /// An inner node holding a subsample of its subtree's points.
    Normal,

    /// A node without children.
    Leaf,

    /// A node whose subtree is described by a further hierarchy chunk.
    /// Its byte range points into `hierarchy.bin` instead of `octree.bin`.
    Proxy,

    Unknown(u8),
}

impl From<u8> for NodeType {
    fn from(value: u8) -> Self {
        match value {
            0 => NodeType::Normal,
            1 => NodeType::Leaf,
            2 => NodeType::Proxy,
            v => NodeType::Unknown(v),
        }
    }
}

impl From<NodeType> for u8 {
    fn from(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Normal => 0,
            NodeType::Leaf => 1,
            NodeType::Proxy => 2,
            NodeType::Unknown(v) => v,
        }
    }
}

/// A 22 byte node record in `hierarchy.bin`.
///
/// Layout: type (u8), child mask (u8), point count (u32), byte offset (u64), byte size (u64).
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct HierarchyRecord {
    node_type: u8,
    child_mask: u8,
    point_count: u32,
    byte_offset: u64,
    byte_size: u64,
}

impl HierarchyRecord {
    pub fn new(
        node_type: NodeType,
        child_mask: u8,
        point_count: u32,
        byte_offset: u64,
        byte_size: u64,
    ) -> Self {
        Self {
            node_type: node_type.into(),
            child_mask,
            point_count: point_count.to_le(),
            byte_offset: byte_offset.to_le(),
            byte_size: byte_size.to_le(),
        }
    }

    /// Reads a record from the first `HIERARCHY_RECORD_SIZE` bytes of `bytes`.
    ///
    /// # Panics
    /// If `bytes` is shorter than `HIERARCHY_RECORD_SIZE`.
    pub fn read(bytes: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(&bytes[..crate::HIERARCHY_RECORD_SIZE])
    }

    pub fn node_type(&self) -> NodeType {
        NodeType::from(self.node_type)
    }

    pub fn child_mask(&self) -> u8 {
        self.child_mask
    }

    pub fn point_count(&self) -> u32 {
        u32::from_le(self.point_count)
    }

    pub fn byte_offset(&self) -> u64 {
        u64::from_le(self.byte_offset)
    }

    pub fn byte_size(&self) -> u64 {
        u64::from_le(self.byte_size)
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// A 23 byte point record in `octree.bin`.
///
/// Coordinates are quantized, i.e., the world position of a point is `coordinate * scale + offset`
/// with `scale` and `offset` taken from the data set's metadata.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct PointRecord {
    x: i32,
    y: i32,
    z: i32,
    intensity: u16,
    classification: u8,
    gps_time: f64,
}

impl PointRecord {
    pub fn new(
        coordinates: [i32; 3],
        intensity: u16,
        classification: u8,
        gps_time: f64,
    ) -> Self {
        Self {
            x: coordinates[0].to_le(),
            y: coordinates[1].to_le(),
            z: coordinates[2].to_le(),
            intensity: intensity.to_le(),
            classification,
            gps_time: f64::from_bits(gps_time.to_bits().to_le()),
        }
    }

    /// Reads a record from the first `POINT_RECORD_SIZE` bytes of `bytes`.
    ///
    /// # Panics
    /// If `bytes` is shorter than `POINT_RECORD_SIZE`.
    pub fn read(bytes: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(&bytes[..crate::POINT_RECORD_SIZE])
    }

    pub fn coordinates(&self) -> [i32; 3] {
        [
            i32::from_le(self.x),
            i32::from_le(self.y),
            i32::from_le(self.z),
        ]
    }

    pub fn intensity(&self) -> u16 {
        u16::from_le(self.intensity)
    }

    pub fn classification(&self) -> u8 {
        self.classification
    }

    pub fn gps_time(&self) -> f64 {
        f64::from_bits(u64::from_le(self.gps_time.to_bits()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
