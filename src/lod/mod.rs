use crate::cache::{LoadTicket, NodeCache, NodeState};
use crate::filter::{Filters, SpatialBounds, TimeRange};
use crate::geometry::Bounds3;
use crate::point_cloud::decode::PointDecoder;
use crate::point_cloud::octree::{NodeId, NodeIndex};
use crate::settings::{LoaderSettings, TraversalOrder};
use crate::timing::MonitoringDataFrame;
use crate::view::ViewState;
use std::collections::HashSet;
use std::sync::Arc;

/// A node that should be fetched and decoded.
#[derive(Clone, Debug)]
pub struct LoadRequest {
    pub ticket: LoadTicket,
    pub node: NodeId,
    pub byte_offset: u64,
    pub byte_size: u64,

    /// The number of point records in the node's payload.
    pub point_count: u32,

    /// The number of points reserved in the budget for this node.
    pub reserved: u32,
}

/// A node that was released. Its handle, if any, has to be handed back to the renderer.
#[derive(Debug)]
pub struct UnloadRequest<H> {
    pub node: NodeId,
    pub handle: Option<H>,
}

#[derive(Debug)]
pub struct UpdateResult<H> {
    pub load_requests: Vec<LoadRequest>,
    pub unload_requests: Vec<UnloadRequest<H>>,
    pub monitoring: MonitoringDataFrame,
}

/// The outcome of gating a representative node against the cache and the point budget.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LoadDecision {
    Load,

    /// The node is loaded or a load is in flight.
    Resident,

    /// The node holds no points.
    Empty,

    /// Loading the node would exceed the point budget. It is retried next update.
    BudgetExceeded,

    /// The maximum number of loads for this update has been issued.
    Throttled,
}

/// Decides which nodes represent the point cloud at the current view and issues load and unload
/// requests accordingly.
///
/// An update walks the octree depth-first starting at the root. Nodes outside of the view frustum
/// or the spatial filter are culled together with their subtrees. A node whose screen-space error
/// exceeds the error threshold is refined, i.e., its children are visited instead. Otherwise the
/// node represents its subtree. Every resident node that does not represent its subtree after the
/// walk is released, before representatives are loaded in traversal order as long as the point
/// budget allows.
#[derive(Debug)]
pub struct LodManager {
    index: Arc<NodeIndex>,
    decoder: PointDecoder,
    lod_scale: f64,
    error_threshold: f64,
    traversal_order: TraversalOrder,
    max_loads_per_update: Option<usize>,
    last_filters: Option<Filters>,
}

impl LodManager {
    pub fn new(index: Arc<NodeIndex>, settings: &LoaderSettings) -> Self {
        Self {
            index,
            decoder: PointDecoder::from_settings(settings),
            lod_scale: settings.lod_scale,
            error_threshold: settings.error_threshold,
            traversal_order: settings.traversal_order,
            max_loads_per_update: settings.max_loads_per_update,
            last_filters: None,
        }
    }

    pub fn index(&self) -> &Arc<NodeIndex> {
        &self.index
    }

    /// The apparent size of `bounds` seen from the camera.
    pub fn screen_space_error(&self, view: &ViewState, bounds: &Bounds3) -> f64 {
        let distance = view.distance_to(bounds);
        if distance <= f64::EPSILON {
            f64::INFINITY
        } else {
            bounds.size() / distance * self.lod_scale
        }
    }

    pub fn update<H>(
        &mut self,
        cache: &mut NodeCache<H>,
        view: &ViewState,
        spatial_filter: Option<SpatialBounds>,
        time_filter: Option<TimeRange>,
        budget: u64,
    ) -> UpdateResult<H> {
        let mut monitoring = MonitoringDataFrame::default();
        monitoring.begin();

        let filters = Filters::new(spatial_filter, time_filter);
        let mut unload_requests = Vec::new();

        // decoded points depend on the filters, so nothing loaded under other filters is valid
        if self.last_filters.map_or(false, |last| last != filters) {
            log::debug!("filters changed, releasing all nodes");
            let active: Vec<NodeId> = cache.active().collect();
            for node in active {
                release(cache, node, &mut unload_requests);
            }
        }
        self.last_filters = Some(filters);

        let representatives = self.representatives(view, &filters, &mut monitoring);
        monitoring.representatives = representatives.len() as u32;

        let keep: HashSet<NodeId> = representatives.iter().copied().collect();
        let stale: Vec<NodeId> = cache.active().filter(|n| !keep.contains(n)).collect();
        for node in stale {
            release(cache, node, &mut unload_requests);
        }

        // a smaller budget than last update evicts the representatives visited last
        for &node in representatives.iter().rev() {
            if cache.resident_points() <= budget {
                break;
            }
            if !cache.state(node).is_unloaded() {
                log::debug!("evicting {} to meet budget {}", self.index[node].name(), budget);
                release(cache, node, &mut unload_requests);
            }
        }

        let mut load_requests = Vec::new();
        for &node in representatives.iter() {
            match self.decide(cache, node, budget, load_requests.len()) {
                LoadDecision::Load => {
                    let n = &self.index[node];
                    let reserved = self.decoder.estimate(n.point_count());
                    match cache.begin_load(node, reserved) {
                        Ok(ticket) => load_requests.push(LoadRequest {
                            ticket,
                            node,
                            byte_offset: n.byte_offset(),
                            byte_size: n.byte_size(),
                            point_count: n.point_count(),
                            reserved,
                        }),
                        Err(e) => log::warn!("could not load {}: {}", n.name(), e),
                    }
                }
                LoadDecision::BudgetExceeded => {
                    monitoring.budget_skips += 1;
                    log::debug!(
                        "skipping {} ({} points): budget of {} points exhausted",
                        self.index[node].name(),
                        self.index[node].point_count(),
                        budget
                    );
                }
                LoadDecision::Throttled => monitoring.throttled += 1,
                LoadDecision::Resident | LoadDecision::Empty => {}
            }
        }

        monitoring.loads = load_requests.len() as u32;
        monitoring.unloads = unload_requests.len() as u32;
        monitoring.resident_points = cache.resident_points();
        monitoring.committed_points = cache.committed_points();
        monitoring.end();

        UpdateResult {
            load_requests,
            unload_requests,
            monitoring,
        }
    }

    /// Gates a representative node against its load state, the load limit and the budget.
    pub fn decide<H>(
        &self,
        cache: &NodeCache<H>,
        node: NodeId,
        budget: u64,
        loads_issued: usize,
    ) -> LoadDecision {
        match cache.state(node) {
            NodeState::Loading { .. } | NodeState::Loaded { .. } => return LoadDecision::Resident,
            NodeState::Unloaded | NodeState::Error => {}
        }
        let point_count = self.index[node].point_count();
        if point_count == 0 {
            return LoadDecision::Empty;
        }
        if self
            .max_loads_per_update
            .map_or(false, |max| loads_issued >= max)
        {
            return LoadDecision::Throttled;
        }
        let estimate = self.decoder.estimate(point_count) as u64;
        if cache.resident_points() + estimate > budget {
            LoadDecision::BudgetExceeded
        } else {
            LoadDecision::Load
        }
    }

    /// Walks the octree and collects the nodes representing their subtree in traversal order.
    pub fn representatives(
        &self,
        view: &ViewState,
        filters: &Filters,
        monitoring: &mut MonitoringDataFrame,
    ) -> Vec<NodeId> {
        let mut representatives = Vec::new();
        self.visit(NodeId::ROOT, view, filters, monitoring, &mut representatives);
        representatives
    }

    fn visit(
        &self,
        node: NodeId,
        view: &ViewState,
        filters: &Filters,
        monitoring: &mut MonitoringDataFrame,
        representatives: &mut Vec<NodeId>,
    ) {
        monitoring.visited_nodes += 1;
        let n = &self.index[node];
        if !view.is_visible(n.bounds()) {
            monitoring.frustum_culled += 1;
            return;
        }
        if !filters.may_contain(n.bounds()) {
            monitoring.filter_culled += 1;
            return;
        }

        if !n.is_leaf() && self.screen_space_error(view, n.bounds()) > self.error_threshold {
            for child in self.ordered_children(node, view) {
                self.visit(child, view, filters, monitoring, representatives);
            }
        } else {
            representatives.push(node);
        }
    }

    fn ordered_children(&self, node: NodeId, view: &ViewState) -> Vec<NodeId> {
        let mut children = self.index[node].children().to_vec();
        if self.traversal_order == TraversalOrder::NearestFirst {
            // stable sort keeps digit order for ties
            children.sort_by(|a, b| {
                let da = view.distance_to(self.index[*a].bounds());
                let db = view.distance_to(self.index[*b].bounds());
                da.total_cmp(&db)
            });
        }
        children
    }
}

fn release<H>(cache: &mut NodeCache<H>, node: NodeId, unload_requests: &mut Vec<UnloadRequest<H>>) {
    let was_active = cache.state(node).is_loaded() || cache.state(node).is_loading();
    let handle = cache.release(node);
    if was_active {
        unload_requests.push(UnloadRequest { node, handle });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{DepthRange, Frustum};
    use crate::point_cloud::meta::Metadata;
    use crate::point_cloud::octree::HierarchyParser;
    use glam::{DMat4, DVec3};
    use octree_format::{HierarchyRecord, NodeType};

    fn index(records: &[HierarchyRecord]) -> Arc<NodeIndex> {
        let meta = Metadata::from_json_str(&format!(
            r#"{{
                "points": 0,
                "hierarchy": {{"firstChunkSize": {}, "depth": 3}},
                "scale": [0.001, 0.001, 0.001],
                "boundingBox": {{"min": [0.0, 0.0, 0.0], "max": [100.0, 100.0, 100.0]}}
            }}"#,
            records.len() * 22
        ))
        .unwrap();
        let bytes: Vec<u8> = records.iter().flat_map(|r| r.as_bytes().to_vec()).collect();
        Arc::new(HierarchyParser::new(&meta).parse(&bytes).unwrap())
    }

    fn node(child_mask: u8, point_count: u32) -> HierarchyRecord {
        let node_type = if child_mask == 0 {
            NodeType::Leaf
        } else {
            NodeType::Normal
        };
        HierarchyRecord::new(node_type, child_mask, point_count, 0, point_count as u64 * 23)
    }

    /// root with 8 children, each with 8 children
    fn full_tree(points: u32) -> Arc<NodeIndex> {
        let mut records = vec![node(0xff, points)];
        records.extend((0..8).map(|_| node(0xff, points)));
        records.extend((0..64).map(|_| node(0, points)));
        index(&records)
    }

    fn settings(error_threshold: f64) -> LoaderSettings {
        LoaderSettings {
            error_threshold,
            ..Default::default()
        }
    }

    fn names(index: &NodeIndex, ids: impl Iterator<Item = NodeId>) -> Vec<String> {
        ids.map(|id| index[id].name().to_string()).collect()
    }

    fn commit_all(cache: &mut NodeCache<String>, result: &UpdateResult<String>) {
        for request in result.load_requests.iter() {
            cache
                .commit(&request.ticket, request.reserved, format!("{}", request.node))
                .unwrap();
        }
    }

    #[test]
    fn far_camera_loads_root_only() {
        let index = full_tree(10);
        let mut lod = LodManager::new(index.clone(), &settings(100.));
        let mut cache = NodeCache::<String>::new(index.len());
        let view = ViewState::from_position(DVec3::splat(1e6));
        let result = lod.update(&mut cache, &view, None, None, 1_000_000);
        assert_eq!(names(&index, result.load_requests.iter().map(|r| r.node)), vec!["r"]);
        assert_eq!(result.monitoring.visited_nodes, 1);
    }

    #[test]
    fn near_camera_refines_and_releases_parent() {
        let index = full_tree(10);
        let mut lod = LodManager::new(index.clone(), &settings(100.));
        let mut cache = NodeCache::<String>::new(index.len());

        let far = ViewState::from_position(DVec3::splat(1e6));
        let result = lod.update(&mut cache, &far, None, None, 1_000_000);
        commit_all(&mut cache, &result);
        assert!(cache.state(NodeId::ROOT).is_loaded());

        // error threshold 0 refines down to the leaves
        let mut lod = LodManager::new(index.clone(), &settings(0.));
        let result = lod.update(&mut cache, &far, None, None, 1_000_000);
        assert_eq!(result.load_requests.len(), 64);
        assert_eq!(result.unload_requests.len(), 1);
        assert_eq!(result.unload_requests[0].node, NodeId::ROOT);
        assert_eq!(result.unload_requests[0].handle, Some(format!("{}", NodeId::ROOT)));
        assert!(cache.state(NodeId::ROOT).is_unloaded());
        assert_eq!(cache.committed_points(), 0);
        assert_eq!(cache.reserved_points(), 640);
    }

    #[test]
    fn screen_space_error() {
        let index = full_tree(1);
        let lod = LodManager::new(index, &LoaderSettings::default());
        let bounds = Bounds3::new(DVec3::ZERO, DVec3::new(3., 4., 0.));
        let view = ViewState::from_position(DVec3::new(1.5, 2., 50.));
        assert_eq!(lod.screen_space_error(&view, &bounds), 5. / 50. * 1000.);
        let inside = ViewState::from_position(bounds.center());
        assert_eq!(lod.screen_space_error(&inside, &bounds), f64::INFINITY);
    }

    #[test]
    fn budget_skip_keeps_running_count() {
        let index = index(&[node(0b11, 1), node(0, 499_900), node(0, 300)]);
        let mut lod = LodManager::new(index.clone(), &settings(0.));
        let mut cache = NodeCache::<String>::new(index.len());
        let view = ViewState::from_position(DVec3::splat(50.));

        let result = lod.update(&mut cache, &view, None, None, 500_000);
        assert_eq!(names(&index, result.load_requests.iter().map(|r| r.node)), vec!["r0"]);
        assert_eq!(result.monitoring.budget_skips, 1);
        commit_all(&mut cache, &result);
        assert_eq!(cache.committed_points(), 499_900);

        let result = lod.update(&mut cache, &view, None, None, 500_000);
        assert!(result.load_requests.is_empty());
        assert!(result.unload_requests.is_empty());
        assert_eq!(result.monitoring.budget_skips, 1);
        assert!(cache.state(index.find("r1").unwrap()).is_unloaded());
        assert_eq!(cache.committed_points(), 499_900);
    }

    #[test]
    fn budget_is_never_exceeded() {
        let index = full_tree(1000);
        let mut cache = NodeCache::<String>::new(index.len());
        let views = [
            ViewState::from_position(DVec3::splat(1e6)),
            ViewState::from_position(DVec3::splat(10.)),
            ViewState::from_position(DVec3::new(90., 10., 50.)),
            ViewState::from_position(DVec3::splat(400.)),
        ];
        let budgets = [50_000, 7_500, 20_000, 3_000];
        let mut lod = LodManager::new(index.clone(), &settings(30.));
        for (view, budget) in views.iter().zip(budgets) {
            let result = lod.update(&mut cache, view, None, None, budget);
            assert!(cache.resident_points() <= budget);
            commit_all(&mut cache, &result);
            assert!(cache.committed_points() <= budget);
            let sum: u64 = cache.loaded().map(|n| index[n].point_count() as u64).sum();
            assert_eq!(sum, cache.committed_points());
        }
    }

    #[test]
    fn shrinking_budget_evicts() {
        let index = full_tree(1000);
        let mut lod = LodManager::new(index.clone(), &settings(0.));
        let mut cache = NodeCache::<String>::new(index.len());
        let view = ViewState::from_position(DVec3::splat(1e6));
        let result = lod.update(&mut cache, &view, None, None, 64_000);
        assert_eq!(result.load_requests.len(), 64);
        commit_all(&mut cache, &result);

        let result = lod.update(&mut cache, &view, None, None, 10_000);
        assert_eq!(result.unload_requests.len(), 54);
        assert!(result.unload_requests.iter().all(|u| u.handle.is_some()));
        assert_eq!(cache.committed_points(), 10_000);
        // the first ten leaves in digit order survive
        let loaded = names(&index, cache.loaded());
        assert!(loaded.contains(&"r00".to_string()));
        assert!(loaded.contains(&"r11".to_string()));
        assert!(!loaded.contains(&"r12".to_string()));
    }

    #[test]
    fn spatial_filter_prunes_subtrees() {
        let index = full_tree(10);
        let mut lod = LodManager::new(index.clone(), &settings(0.));
        let mut cache = NodeCache::<String>::new(index.len());
        let view = ViewState::from_position(DVec3::splat(1e6));
        // the lower x quarter only
        let filter = SpatialBounds::from_axes(Some((0., 20.)), None, None);
        let result = lod.update(&mut cache, &view, Some(filter), None, 1_000_000);

        // four children of the root and four grandchildren of each remaining child
        assert_eq!(result.monitoring.filter_culled, 4 + 4 * 4);
        assert_eq!(result.load_requests.len(), 4 * 4);
        for request in result.load_requests.iter() {
            let n = &index[request.node];
            assert!(n.bounds().max().x <= 25.);
            let parent_octant = index[n.parent().unwrap()].octant().unwrap();
            assert_eq!(parent_octant & 1, 0);
        }
    }

    #[test]
    fn frustum_culls_subtrees() {
        let index = full_tree(10);
        let mut lod = LodManager::new(index.clone(), &settings(0.));
        let mut cache = NodeCache::<String>::new(index.len());
        // looking down the negative z axis at the upper z half from above
        let eye = DVec3::new(25., 25., 300.);
        let view = DMat4::look_at_rh(eye, DVec3::new(25., 25., 0.), DVec3::Y);
        let projection = DMat4::perspective_rh(0.1, 1.0, 1.0, 260.);
        let view = ViewState::from_view_projection(view, projection, DepthRange::ZeroToOne);
        let result = lod.update(&mut cache, &view, None, None, 1_000_000);
        assert!(result.monitoring.frustum_culled > 0);
        assert!(result.load_requests.len() < 64);
        for request in result.load_requests.iter() {
            let bounds = index[request.node].bounds();
            assert!(view.frustum.map(|f: Frustum| f.intersects(bounds)).unwrap());
        }
    }

    #[test]
    fn culled_nodes_are_unloaded() {
        let index = full_tree(10);
        let mut lod = LodManager::new(index.clone(), &settings(0.));
        let mut cache = NodeCache::<String>::new(index.len());
        let view = ViewState::from_position(DVec3::splat(1e6));
        let result = lod.update(&mut cache, &view, None, None, 1_000_000);
        commit_all(&mut cache, &result);
        assert_eq!(cache.committed_points(), 640);

        let filter = SpatialBounds::from_axes(Some((0., 20.)), None, None);
        let result = lod.update(&mut cache, &view, Some(filter), None, 1_000_000);
        // all nodes are released because the filters changed, the lower x quarter is loaded again
        assert_eq!(result.unload_requests.len(), 64);
        assert_eq!(result.load_requests.len(), 16);
        commit_all(&mut cache, &result);

        let result = lod.update(&mut cache, &view, Some(filter), None, 1_000_000);
        assert!(result.unload_requests.is_empty());
        assert!(result.load_requests.is_empty());
        assert_eq!(cache.committed_points(), 160);
    }

    #[test]
    fn nearest_first_changes_budget_preference() {
        let index = index(&[node(0b11, 1), node(0, 100), node(0, 100)]);
        let settings = LoaderSettings {
            error_threshold: 0.,
            traversal_order: TraversalOrder::NearestFirst,
            ..Default::default()
        };
        let mut lod = LodManager::new(index.clone(), &settings);
        let mut cache = NodeCache::<String>::new(index.len());
        // closer to the upper x half
        let view = ViewState::from_position(DVec3::new(200., 25., 25.));
        let result = lod.update(&mut cache, &view, None, None, 150);
        assert_eq!(names(&index, result.load_requests.iter().map(|r| r.node)), vec!["r1"]);
    }

    #[test]
    fn loads_are_throttled() {
        let index = full_tree(10);
        let settings = LoaderSettings {
            error_threshold: 0.,
            max_loads_per_update: Some(5),
            ..Default::default()
        };
        let mut lod = LodManager::new(index.clone(), &settings);
        let mut cache = NodeCache::<String>::new(index.len());
        let view = ViewState::from_position(DVec3::splat(1e6));
        let result = lod.update(&mut cache, &view, None, None, 1_000_000);
        assert_eq!(result.load_requests.len(), 5);
        assert_eq!(result.monitoring.throttled, 59);
        let result = lod.update(&mut cache, &view, None, None, 1_000_000);
        assert_eq!(result.load_requests.len(), 5);
    }

    #[test]
    fn failed_nodes_are_retried() {
        let index = full_tree(10);
        let mut lod = LodManager::new(index.clone(), &settings(100.));
        let mut cache = NodeCache::<String>::new(index.len());
        let view = ViewState::from_position(DVec3::splat(1e6));
        let result = lod.update(&mut cache, &view, None, None, 1_000_000);
        assert!(cache.fail(&result.load_requests[0].ticket));
        let result = lod.update(&mut cache, &view, None, None, 1_000_000);
        assert_eq!(result.load_requests.len(), 1);
        assert_eq!(result.load_requests[0].node, NodeId::ROOT);
    }

    #[test]
    fn subsampling_cap_limits_reservation() {
        let index = index(&[node(0, 50_000)]);
        let settings = LoaderSettings {
            max_points_per_node: Some(1000),
            ..Default::default()
        };
        let mut lod = LodManager::new(index.clone(), &settings);
        let mut cache = NodeCache::<String>::new(index.len());
        let view = ViewState::from_position(DVec3::splat(1e6));
        let result = lod.update(&mut cache, &view, None, None, 1500);
        assert_eq!(result.load_requests.len(), 1);
        assert_eq!(result.load_requests[0].reserved, 1000);
        assert_eq!(result.load_requests[0].point_count, 50_000);
        assert_eq!(cache.reserved_points(), 1000);
    }
}
