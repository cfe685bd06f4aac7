use serde::Serialize;

/// Statistics of a single `update`.
#[derive(Copy, Clone, Debug, Default, Serialize)]
pub struct MonitoringDataFrame {
    pub traversal: f64,
    #[serde(rename = "traversalBegin")]
    pub traversal_begin: f64,
    #[serde(rename = "traversalEnd")]
    pub traversal_end: f64,

    #[serde(rename = "visitedNodes")]
    pub visited_nodes: u32,
    #[serde(rename = "frustumCulled")]
    pub frustum_culled: u32,
    #[serde(rename = "filterCulled")]
    pub filter_culled: u32,

    /// The number of nodes that represent their subtree at the current view.
    pub representatives: u32,

    pub loads: u32,
    pub unloads: u32,
    #[serde(rename = "budgetSkips")]
    pub budget_skips: u32,
    pub throttled: u32,
    /// Loads that were given up on because they exceeded the fetch timeout.
    #[serde(rename = "timedOut")]
    pub timed_out: u32,

    /// Committed points plus points reserved by loads in flight.
    #[serde(rename = "residentPoints")]
    pub resident_points: u64,
    #[serde(rename = "committedPoints")]
    pub committed_points: u64,
}

impl MonitoringDataFrame {
    pub fn begin(&mut self) {
        self.traversal_begin = instant::now();
    }

    pub fn end(&mut self) {
        self.traversal_end = instant::now();
        self.traversal = self.traversal_end - self.traversal_begin;
    }
}

/// Statistics of a single `poll`.
#[derive(Copy, Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct PollDataFrame {
    /// Results handed to the renderer and committed to the cache.
    pub committed: u32,

    /// Results of loads whose node was released while they were in flight.
    pub discarded: u32,

    pub failed: u32,

    #[serde(rename = "timedOut")]
    pub timed_out: u32,
}

impl PollDataFrame {
    pub fn is_empty(&self) -> bool {
        self.committed == 0 && self.discarded == 0 && self.failed == 0 && self.timed_out == 0
    }
}
