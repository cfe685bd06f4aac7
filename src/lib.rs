//! Progressive loading of octree point clouds.
//!
//! A [`PointCloudLoader`] walks the octree of a data set once per frame, picks the nodes that best
//! represent the point cloud at the current view under a point budget, and streams their points
//! into a [`NodeRenderer`].

pub mod cache;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod loader;
pub mod lod;
pub mod point_cloud;
pub mod settings;
pub mod timing;
pub mod util;
pub mod view;

pub use cache::{LoadTicket, NodeCache, NodeState};
pub use error::{BeginLoadError, DecodeError, LoadError, NetworkError, ParseError, SessionError};
pub use filter::{Filters, SpatialBounds, TimeRange};
pub use geometry::{Bounds3, DepthRange, Frustum};
pub use loader::{Dataset, NodeRenderer, PointCloudLoader};
pub use lod::{LoadDecision, LoadRequest, LodManager, UnloadRequest, UpdateResult};
pub use point_cloud::{
    ChunkFetcher, FileChunkFetcher, HierarchyParser, HttpChunkFetcher, MemoryChunkFetcher,
    Metadata, NodeId, NodeIndex, OctreeNode, PointArrays, PointDecoder,
};
pub use settings::{LoaderSettings, TraversalOrder};
pub use timing::{MonitoringDataFrame, PollDataFrame};
pub use view::ViewState;
