use crate::cache::{LoadTicket, NodeCache};
use crate::error::{LoadError, SessionError};
use crate::filter::{Filters, SpatialBounds, TimeRange};
use crate::lod::{LoadRequest, LodManager};
use crate::point_cloud::decode::{PointArrays, PointDecoder};
use crate::point_cloud::fetch::ChunkFetcher;
use crate::point_cloud::meta::Metadata;
use crate::point_cloud::octree::{NodeId, NodeIndex};
use crate::settings::LoaderSettings;
use crate::timing::{MonitoringDataFrame, PollDataFrame};
use crate::view::ViewState;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod dataset;
pub mod renderer;

pub use dataset::Dataset;
pub use renderer::NodeRenderer;

enum LoadOutcome {
    Decoded(PointArrays),
    Cancelled,
    Failed(LoadError),
}

struct LoadResponse {
    ticket: LoadTicket,
    outcome: LoadOutcome,
}

struct PendingLoad {
    ticket: LoadTicket,
    started: Instant,
}

/// Streams the nodes of a point cloud into a renderer under a point budget.
///
/// Each call to `update` decides which nodes should be resident for the given view and filters.
/// Released nodes are handed back to the renderer immediately, while new nodes are fetched and
/// decoded on a worker pool, one pipeline per node. Finished pipelines are collected by `poll`,
/// which passes decoded points to the renderer. All cache state is owned and mutated by the loader
/// itself; workers only communicate their results through a channel.
///
/// A load that did not report back within the fetch timeout fails like a network error. Its node
/// can be loaded again on the next update and a late result is discarded.
pub struct PointCloudLoader<R: NodeRenderer> {
    metadata: Arc<Metadata>,
    index: Arc<NodeIndex>,
    octree: Arc<dyn ChunkFetcher>,
    cache: NodeCache<R::Handle>,
    lod: LodManager,
    decoder: PointDecoder,
    pool: ThreadPool,
    sender: mpsc::Sender<LoadResponse>,
    receiver: mpsc::Receiver<LoadResponse>,
    pending: HashMap<(NodeId, u64), PendingLoad>,
    fetch_timeout: Duration,
}

impl<R: NodeRenderer> PointCloudLoader<R> {
    pub fn new(dataset: Dataset, settings: &LoaderSettings) -> Result<Self, SessionError> {
        let mut builder =
            ThreadPoolBuilder::new().thread_name(|i| format!("point-cloud-loader-{}", i));
        if let Some(threads) = settings.worker_threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build()?;

        let index = Arc::new(dataset.index);
        let (sender, receiver) = mpsc::channel();
        Ok(Self {
            metadata: Arc::new(dataset.metadata),
            cache: NodeCache::new(index.len()),
            lod: LodManager::new(index.clone(), settings),
            index,
            octree: dataset.octree,
            decoder: PointDecoder::from_settings(settings),
            pool,
            sender,
            receiver,
            pending: HashMap::new(),
            fetch_timeout: settings.fetch_timeout(),
        })
    }

    /// Opens the data set at `location` (a directory or an http(s) base URL).
    pub fn open(location: &str, settings: &LoaderSettings) -> Result<Self, SessionError> {
        Self::new(Dataset::open(location, settings)?, settings)
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    pub fn index(&self) -> &Arc<NodeIndex> {
        &self.index
    }

    pub fn cache(&self) -> &NodeCache<R::Handle> {
        &self.cache
    }

    /// The number of load pipelines whose result has neither been polled nor timed out yet.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Runs a traversal for the given view and filters, releases nodes that are no longer needed
    /// and starts loading new ones.
    pub fn update(
        &mut self,
        view: &ViewState,
        spatial_filter: Option<SpatialBounds>,
        time_filter: Option<TimeRange>,
        budget: u64,
        renderer: &mut R,
    ) -> MonitoringDataFrame {
        let mut expired = PollDataFrame::default();
        self.expire_stalled(&mut expired);

        let mut result = self
            .lod
            .update(&mut self.cache, view, spatial_filter, time_filter, budget);

        for unload in result.unload_requests {
            if let Some(handle) = unload.handle {
                renderer.on_node_unloaded(unload.node, &self.index[unload.node], handle);
            }
        }

        let filters = Filters::new(spatial_filter, time_filter);
        for request in result.load_requests {
            self.spawn_load(request, filters);
        }

        result.monitoring.timed_out = expired.timed_out;
        log::trace!("{:?}", result.monitoring);
        result.monitoring
    }

    fn spawn_load(&mut self, request: LoadRequest, filters: Filters) {
        let octree = self.octree.clone();
        let metadata = self.metadata.clone();
        let decoder = self.decoder;
        let sender = self.sender.clone();
        self.pending.insert(
            (request.node, request.ticket.generation()),
            PendingLoad {
                ticket: request.ticket.clone(),
                started: Instant::now(),
            },
        );
        self.pool.spawn(move || {
            let outcome = run_pipeline(&request, octree.as_ref(), &metadata, &decoder, &filters);
            // the loader may have been dropped in the meantime
            sender
                .send(LoadResponse {
                    ticket: request.ticket,
                    outcome,
                })
                .ok();
        });
    }

    /// Collects all finished load pipelines without blocking.
    pub fn poll(&mut self, renderer: &mut R) -> PollDataFrame {
        let mut frame = PollDataFrame::default();
        while let Ok(response) = self.receiver.try_recv() {
            self.process_response(response, renderer, &mut frame);
        }
        self.expire_stalled(&mut frame);
        frame
    }

    /// Collects finished load pipelines until none is in flight or `timeout` expired.
    pub fn wait(&mut self, renderer: &mut R, timeout: Duration) -> PollDataFrame {
        let deadline = Instant::now() + timeout;
        let mut frame = PollDataFrame::default();
        loop {
            self.expire_stalled(&mut frame);
            let next_expiry = self
                .pending
                .values()
                .map(|p| p.started.checked_add(self.fetch_timeout).unwrap_or(deadline))
                .min();
            let until = match next_expiry {
                Some(expiry) => expiry.min(deadline),
                None => break,
            };
            match self
                .receiver
                .recv_timeout(until.saturating_duration_since(Instant::now()))
            {
                Ok(response) => self.process_response(response, renderer, &mut frame),
                Err(mpsc::RecvTimeoutError::Timeout) if Instant::now() < deadline => {}
                Err(_) => break,
            }
        }
        frame
    }

    /// Fails all loads that have been in flight for longer than the fetch timeout.
    fn expire_stalled(&mut self, frame: &mut PollDataFrame) {
        let now = Instant::now();
        let timeout = self.fetch_timeout;
        let stalled: Vec<(NodeId, u64)> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.started) >= timeout)
            .map(|(&key, _)| key)
            .collect();
        for key in stalled {
            if let Some(load) = self.pending.remove(&key) {
                if self.cache.fail(&load.ticket) {
                    log::warn!(
                        "loading node {} timed out after {:?}",
                        self.index[key.0].name(),
                        timeout
                    );
                    frame.timed_out += 1;
                } else {
                    frame.discarded += 1;
                }
            }
        }
    }

    fn process_response(
        &mut self,
        response: LoadResponse,
        renderer: &mut R,
        frame: &mut PollDataFrame,
    ) {
        let ticket = response.ticket;
        let node = ticket.node();

        // a timed out load was already counted when it expired
        if self
            .pending
            .remove(&(node, ticket.generation()))
            .is_none()
        {
            return;
        }

        // results of released loads are dropped silently
        if !self.cache.is_current(&ticket) {
            frame.discarded += 1;
            return;
        }

        match response.outcome {
            LoadOutcome::Decoded(points) => {
                let point_count = points.len() as u32;
                let handle = renderer.on_node_loaded(node, &self.index[node], points);
                if let Err(handle) = self.cache.commit(&ticket, point_count, handle) {
                    renderer.on_node_unloaded(node, &self.index[node], handle);
                    frame.discarded += 1;
                } else {
                    frame.committed += 1;
                }
            }
            LoadOutcome::Cancelled => {
                // cancellation is only observed after a release, which makes the ticket stale
                frame.discarded += 1;
            }
            LoadOutcome::Failed(e) => {
                log::warn!("could not load node {}: {}", self.index[node].name(), e);
                self.cache.fail(&ticket);
                frame.failed += 1;
            }
        }
    }

    /// Releases all nodes. Results of loads still in flight are discarded when polled.
    pub fn shutdown(&mut self, renderer: &mut R) {
        let active: Vec<NodeId> = self.cache.active().collect();
        for node in active {
            if let Some(handle) = self.cache.release(node) {
                renderer.on_node_unloaded(node, &self.index[node], handle);
            }
        }
        log::info!("released all nodes, {} loads still in flight", self.pending.len());
    }
}

fn run_pipeline(
    request: &LoadRequest,
    octree: &dyn ChunkFetcher,
    metadata: &Metadata,
    decoder: &PointDecoder,
    filters: &Filters,
) -> LoadOutcome {
    if request.ticket.is_cancelled() {
        return LoadOutcome::Cancelled;
    }
    let buffer = match octree.fetch(request.byte_offset, request.byte_size) {
        Ok(buffer) => buffer,
        Err(e) => return LoadOutcome::Failed(e.into()),
    };
    if request.ticket.is_cancelled() {
        return LoadOutcome::Cancelled;
    }
    match decoder.decode_node(&buffer, request.point_count, metadata, filters) {
        Ok(points) => LoadOutcome::Decoded(points),
        Err(e) => LoadOutcome::Failed(e.into()),
    }
}
