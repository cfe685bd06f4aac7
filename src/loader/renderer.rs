use crate::point_cloud::decode::PointArrays;
use crate::point_cloud::octree::{NodeId, OctreeNode};

/// The consumer of decoded nodes, e.g., a renderer uploading points to the GPU.
///
/// The renderer owns whatever resources it creates for a node behind its `Handle`. The loader keeps
/// the handle while the node is loaded and gives it back via `on_node_unloaded` once the node is
/// evicted.
pub trait NodeRenderer {
    type Handle;

    fn on_node_loaded(&mut self, id: NodeId, node: &OctreeNode, points: PointArrays)
        -> Self::Handle;

    fn on_node_unloaded(&mut self, id: NodeId, node: &OctreeNode, handle: Self::Handle);
}
