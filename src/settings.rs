use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The order in which the children of a refined node are visited.
/// Budget exhaustion favors children that are visited first.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum TraversalOrder {
    /// Ascending octant digits.
    #[serde(rename = "digitOrder")]
    DigitOrder,

    /// Ascending distance between the camera and a child's center. Ties are broken by digit.
    #[serde(rename = "nearestFirst")]
    NearestFirst,
}

impl Default for TraversalOrder {
    fn default() -> Self {
        TraversalOrder::DigitOrder
    }
}

fn lod_scale() -> f64 {
    1000.0
}

fn error_threshold() -> f64 {
    100.0
}

fn decode_chunk_size() -> usize {
    16384
}

fn fetch_timeout_ms() -> u64 {
    30_000
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LoaderSettings {
    /// Scales a node's screen-space error.
    #[serde(rename = "lodScale", default = "lod_scale")]
    pub lod_scale: f64,

    /// Nodes with a screen-space error above this threshold are refined.
    #[serde(rename = "errorThreshold", default = "error_threshold")]
    pub error_threshold: f64,

    /// Nodes with more points than this are subsampled after filtering.
    #[serde(rename = "maxPointsPerNode", default)]
    pub max_points_per_node: Option<u32>,

    /// The number of points decoded by a single parallel task.
    #[serde(rename = "decodeChunkSize", default = "decode_chunk_size")]
    pub decode_chunk_size: usize,

    /// The number of threads running load pipelines. Uses rayon's default if not set.
    #[serde(rename = "workerThreads", default)]
    pub worker_threads: Option<usize>,

    #[serde(rename = "fetchTimeoutMs", default = "fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    #[serde(rename = "traversalOrder", default)]
    pub traversal_order: TraversalOrder,

    /// Limits the number of loads started by a single update.
    #[serde(rename = "maxLoadsPerUpdate", default)]
    pub max_loads_per_update: Option<usize>,
}

impl LoaderSettings {
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            lod_scale: lod_scale(),
            error_threshold: error_threshold(),
            max_points_per_node: None,
            decode_chunk_size: decode_chunk_size(),
            worker_threads: None,
            fetch_timeout_ms: fetch_timeout_ms(),
            traversal_order: TraversalOrder::default(),
            max_loads_per_update: None,
        }
    }
}
