//! On-disk layout of a chunked point cloud octree.
//!
//! A data set consists of three files:
//!  - `metadata.json`: a [`MetadataDocument`] describing bounds, quantization and the hierarchy
//!  - `hierarchy.bin`: breadth-first sequences of [`HierarchyRecord`]s, split into chunks
//!  - `octree.bin`: the point payload of all nodes, each node a contiguous run of [`PointRecord`]s
//!
//! All multi-byte values are stored little endian.

pub mod metadata;
pub mod record;

pub use metadata::{BoundingBoxDocument, HierarchyDocument, MetadataDocument};
pub use record::{HierarchyRecord, NodeType, PointRecord};

pub const METADATA_FILE_NAME: &str = "metadata.json";
pub const HIERARCHY_FILE_NAME: &str = "hierarchy.bin";
pub const OCTREE_FILE_NAME: &str = "octree.bin";

/// The size of a single hierarchy record in bytes.
pub const HIERARCHY_RECORD_SIZE: usize = std::mem::size_of::<HierarchyRecord>();

/// The size of a single point record in bytes.
pub const POINT_RECORD_SIZE: usize = std::mem::size_of::<PointRecord>();

/// The number of octants a node's box is split into.
pub const NUM_OCTANTS: u8 = 8;
