pub mod decode;
pub mod fetch;
pub mod meta;
pub mod octree;

pub use decode::{PointArrays, PointDecoder};
pub use fetch::{ChunkFetcher, FileChunkFetcher, HttpChunkFetcher, MemoryChunkFetcher};
pub use meta::Metadata;
pub use octree::{HierarchyParser, NodeId, NodeIndex, OctreeNode};
