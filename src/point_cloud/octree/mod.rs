use crate::geometry::Bounds3;
use octree_format::{HierarchyRecord, NodeType};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

pub mod hierarchy;

pub use hierarchy::HierarchyParser;

/// The name of the root node. Child names append one octant digit per level.
pub const ROOT_NAME: &str = "r";

/// Nodes deeper than this can not be addressed by 32 bit quantized coordinates.
pub const MAX_DEPTH: u32 = 32;

/// An index into a [`NodeIndex`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct OctreeNode {
    name: String,
    level: u32,
    bounds: Bounds3,
    node_type: NodeType,
    child_mask: u8,
    point_count: u32,
    byte_offset: u64,
    byte_size: u64,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl OctreeNode {
    fn new(name: String, level: u32, bounds: Bounds3, parent: Option<NodeId>) -> Self {
        Self {
            name,
            level,
            bounds,
            node_type: NodeType::Leaf,
            child_mask: 0,
            point_count: 0,
            byte_offset: 0,
            byte_size: 0,
            parent,
            children: Vec::new(),
        }
    }

    fn apply_record(&mut self, record: &HierarchyRecord) {
        self.node_type = record.node_type();
        self.child_mask = record.child_mask();
        self.point_count = record.point_count();
        self.byte_offset = record.byte_offset();
        self.byte_size = record.byte_size();
    }

    /// The node's id string, e.g. `r` or `r31`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node's depth in the octree. The root has level 0.
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn bounds(&self) -> &Bounds3 {
        &self.bounds
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn child_mask(&self) -> u8 {
        self.child_mask
    }

    pub fn has_child(&self, octant: u8) -> bool {
        octant < 8 && self.child_mask & (1 << octant) != 0
    }

    pub fn point_count(&self) -> u32 {
        self.point_count
    }

    /// The offset of this node's point payload in `octree.bin`.
    pub fn byte_offset(&self) -> u64 {
        self.byte_offset
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// This node's children in ascending octant order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The octant of this node within its parent, or `None` for the root.
    pub fn octant(&self) -> Option<u8> {
        if self.level == 0 {
            None
        } else {
            self.name
                .as_bytes()
                .last()
                .map(|digit| digit.wrapping_sub(b'0'))
        }
    }
}

/// All nodes of an octree, stored in an arena in breadth-first insertion order.
/// Constructed once by [`HierarchyParser`] and read-only afterwards.
#[derive(Clone, Debug)]
pub struct NodeIndex {
    nodes: Vec<OctreeNode>,
    ids: HashMap<String, NodeId>,
}

impl NodeIndex {
    pub(crate) fn with_root(bounds: Bounds3) -> Self {
        let root = OctreeNode::new(ROOT_NAME.to_string(), 0, bounds, None);
        let mut ids = HashMap::new();
        ids.insert(root.name.clone(), NodeId::ROOT);
        Self {
            nodes: vec![root],
            ids,
        }
    }

    pub(crate) fn apply_record(&mut self, id: NodeId, record: &HierarchyRecord) {
        self.nodes[id.index()].apply_record(record);
    }

    /// Inserts the child of `parent` at `octant` or returns the existing one.
    /// Returns `None` if the child would exceed [`MAX_DEPTH`].
    pub(crate) fn insert_child(&mut self, parent: NodeId, octant: u8) -> Option<NodeId> {
        let p = &self.nodes[parent.index()];
        if p.level >= MAX_DEPTH {
            return None;
        }
        let name = format!("{}{}", p.name, octant);
        if let Some(&existing) = self.ids.get(&name) {
            return Some(existing);
        }
        let child = OctreeNode::new(
            name.clone(),
            p.level + 1,
            p.bounds.octant(octant),
            Some(parent),
        );
        let position = p
            .children
            .iter()
            .position(|c| self.nodes[c.index()].octant() > Some(octant))
            .unwrap_or(p.children.len());

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(child);
        self.ids.insert(name, id);
        self.nodes[parent.index()].children.insert(position, id);
        Some(id)
    }

    pub fn root(&self) -> &OctreeNode {
        &self.nodes[NodeId::ROOT.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&OctreeNode> {
        self.nodes.get(id.index())
    }

    /// Looks up a node by its name, e.g. `r31`.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.ids.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &OctreeNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn total_points(&self) -> u64 {
        self.nodes.iter().map(|n| n.point_count as u64).sum()
    }
}

impl std::ops::Index<NodeId> for NodeIndex {
    type Output = OctreeNode;

    fn index(&self, id: NodeId) -> &Self::Output {
        &self.nodes[id.index()]
    }
}
