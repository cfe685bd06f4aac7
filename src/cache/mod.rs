use crate::error::BeginLoadError;
use crate::point_cloud::octree::NodeId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Identifies a single load of a node.
///
/// Every call to [`NodeCache::begin_load`] creates a new ticket. A result can only be committed
/// with the ticket of the node's current load, so results of a load that was released in the
/// meantime never end up in the cache, even if the node is loading again.
#[derive(Clone, Debug)]
pub struct LoadTicket {
    node: NodeId,
    generation: u64,
    cancelled: Arc<AtomicBool>,
}

impl LoadTicket {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Checks if the node was released while this load was in flight.
    /// Pipelines can use this to skip work whose result would be discarded anyway.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl PartialEq for LoadTicket {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && self.generation == other.generation
    }
}

impl Eq for LoadTicket {}

#[derive(Debug)]
pub enum NodeState<H> {
    Unloaded,
    Loading {
        ticket: LoadTicket,
        /// The number of points reserved in the budget for this load.
        reserved: u32,
    },
    Loaded {
        point_count: u32,
        handle: H,
    },
    /// The last load failed. The node may be loaded again.
    Error,
}

impl<H> NodeState<H> {
    pub fn is_unloaded(&self) -> bool {
        matches!(self, NodeState::Unloaded)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, NodeState::Loading { .. })
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, NodeState::Loaded { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, NodeState::Error)
    }
}

/// Owns the load state of all nodes and keeps track of the number of resident points.
///
/// A node is `Loaded` iff the cache holds its render handle. The number of committed points is
/// always the sum of the point counts of all `Loaded` nodes.
#[derive(Debug)]
pub struct NodeCache<H> {
    states: Vec<NodeState<H>>,
    committed: u64,
    reserved: u64,
    next_generation: u64,
}

impl<H> NodeCache<H> {
    pub fn new(node_count: usize) -> Self {
        let mut states = Vec::with_capacity(node_count);
        states.resize_with(node_count, || NodeState::Unloaded);
        Self {
            states,
            committed: 0,
            reserved: 0,
            next_generation: 0,
        }
    }

    pub fn state(&self, node: NodeId) -> &NodeState<H> {
        &self.states[node.index()]
    }

    pub fn handle(&self, node: NodeId) -> Option<&H> {
        match self.state(node) {
            NodeState::Loaded { handle, .. } => Some(handle),
            _ => None,
        }
    }

    /// Starts a load of `node` and reserves `reserved` points for it.
    ///
    /// This is the only place where loads are started, so there is at most one load in flight per
    /// node. Nodes in the `Error` state may be loaded again.
    pub fn begin_load(
        &mut self,
        node: NodeId,
        reserved: u32,
    ) -> Result<LoadTicket, BeginLoadError> {
        let state = &mut self.states[node.index()];
        match state {
            NodeState::Loading { .. } => return Err(BeginLoadError::AlreadyInFlight),
            NodeState::Loaded { .. } => return Err(BeginLoadError::AlreadyLoaded),
            NodeState::Unloaded | NodeState::Error => {}
        }
        let ticket = LoadTicket {
            node,
            generation: self.next_generation,
            cancelled: Arc::new(AtomicBool::new(false)),
        };
        self.next_generation += 1;
        self.reserved += reserved as u64;
        *state = NodeState::Loading {
            ticket: ticket.clone(),
            reserved,
        };
        Ok(ticket)
    }

    /// Checks if `ticket` belongs to the current load of its node.
    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        matches!(self.state(ticket.node), NodeState::Loading { ticket: t, .. } if t == ticket)
    }

    /// Finishes the load identified by `ticket`.
    ///
    /// If the node was released or loaded again since the ticket was issued, the result is rejected
    /// and `handle` is given back to the caller.
    pub fn commit(&mut self, ticket: &LoadTicket, point_count: u32, handle: H) -> Result<(), H> {
        let state = &mut self.states[ticket.node.index()];
        let reserved = match &*state {
            NodeState::Loading { ticket: t, reserved } if t == ticket => *reserved,
            _ => return Err(handle),
        };
        self.reserved -= reserved as u64;
        self.committed += point_count as u64;
        *state = NodeState::Loaded {
            point_count,
            handle,
        };
        Ok(())
    }

    /// Marks the load identified by `ticket` as failed and cancels it.
    /// Returns `false` if the ticket is stale.
    pub fn fail(&mut self, ticket: &LoadTicket) -> bool {
        let state = &mut self.states[ticket.node.index()];
        let reserved = match &*state {
            NodeState::Loading { ticket: t, reserved } if t == ticket => *reserved,
            _ => return false,
        };
        ticket.cancel();
        self.reserved -= reserved as u64;
        *state = NodeState::Error;
        true
    }

    /// Resets `node` to `Unloaded` and returns its render handle if it was loaded.
    /// A load in flight is cancelled. Releasing an unloaded node does nothing.
    pub fn release(&mut self, node: NodeId) -> Option<H> {
        let state = std::mem::replace(&mut self.states[node.index()], NodeState::Unloaded);
        match state {
            NodeState::Loaded {
                point_count,
                handle,
            } => {
                self.committed -= point_count as u64;
                Some(handle)
            }
            NodeState::Loading { ticket, reserved } => {
                ticket.cancel();
                self.reserved -= reserved as u64;
                None
            }
            NodeState::Unloaded | NodeState::Error => None,
        }
    }

    /// The sum of the point counts of all loaded nodes.
    pub fn committed_points(&self) -> u64 {
        self.committed
    }

    /// The sum of the points reserved by loads in flight.
    pub fn reserved_points(&self) -> u64 {
        self.reserved
    }

    pub fn resident_points(&self) -> u64 {
        self.committed + self.reserved
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// All nodes that are not `Unloaded`.
    pub fn active(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ids().filter(|&id| !self.state(id).is_unloaded())
    }

    pub fn loaded(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ids().filter(|&id| self.state(id).is_loaded())
    }

    fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.states.len()).map(NodeId::from_index)
    }
}
