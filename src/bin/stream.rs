//! Streams a point cloud for a fixed camera and logs what the loader does each frame.

use clap::Parser;
use glam::{DMat4, DVec3};
use log::LevelFilter;
use point_cloud_streamer::util::init;
use point_cloud_streamer::{
    DepthRange, LoaderSettings, NodeId, NodeRenderer, OctreeNode, PointArrays, PointCloudLoader,
    SpatialBounds, TimeRange, ViewState,
};
use std::error::Error;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "stream")]
#[command(about = "Streams an octree point cloud under a point budget")]
struct Args {
    /// Directory or http(s) base URL containing metadata.json, hierarchy.bin and octree.bin.
    location: String,

    /// Camera position as x,y,z. Defaults to a position outside the data set's bounding box.
    #[arg(long, value_delimiter = ',', num_args = 3, allow_hyphen_values = true)]
    camera: Option<Vec<f64>>,

    /// Point the camera looks at as x,y,z. Enables frustum culling.
    #[arg(long, value_delimiter = ',', num_args = 3, allow_hyphen_values = true)]
    target: Option<Vec<f64>>,

    /// Vertical field of view in degrees.
    #[arg(long, default_value_t = 60.0)]
    fov: f64,

    #[arg(short, long, default_value_t = 1_000_000)]
    budget: u64,

    #[arg(short, long, default_value_t = 10)]
    frames: u32,

    /// Time filter as min,max.
    #[arg(long, value_delimiter = ',', num_args = 2, allow_hyphen_values = true)]
    time: Option<Vec<f64>>,

    /// Spatial filter as min_x,min_y,min_z,max_x,max_y,max_z.
    #[arg(long, value_delimiter = ',', num_args = 6, allow_hyphen_values = true)]
    bounds: Option<Vec<f64>>,

    /// JSON file with loader settings.
    #[arg(short, long)]
    settings: Option<String>,

    /// One of off, error, warn, info, debug, trace.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Default)]
struct PointCounter {
    points: usize,
    nodes: usize,
}

impl NodeRenderer for PointCounter {
    type Handle = usize;

    fn on_node_loaded(&mut self, _: NodeId, node: &OctreeNode, points: PointArrays) -> usize {
        log::debug!("loaded {} with {} points", node.name(), points.len());
        self.points += points.len();
        self.nodes += 1;
        points.len()
    }

    fn on_node_unloaded(&mut self, _: NodeId, node: &OctreeNode, handle: usize) {
        log::debug!("unloaded {}", node.name());
        self.points -= handle;
        self.nodes -= 1;
    }
}

fn vec3(values: &[f64]) -> DVec3 {
    DVec3::new(values[0], values[1], values[2])
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init::set_logger(Some(
        args.log_level.parse().unwrap_or(LevelFilter::Info),
    ));

    let settings = match &args.settings {
        Some(path) => LoaderSettings::from_json_str(&std::fs::read_to_string(path)?)?,
        None => LoaderSettings::default(),
    };

    let mut loader = PointCloudLoader::<PointCounter>::open(&args.location, &settings)?;
    let bounds = loader.metadata().bounds;

    let camera = args
        .camera
        .as_deref()
        .map(vec3)
        .unwrap_or_else(|| bounds.max() + bounds.diagonal());
    let view = match args.target.as_deref().map(vec3) {
        Some(target) => {
            let up = if (target - camera).cross(DVec3::Z).length() > f64::EPSILON {
                DVec3::Z
            } else {
                DVec3::Y
            };
            let far = (bounds.size() + camera.distance(bounds.center())) * 2.;
            ViewState::from_view_projection(
                DMat4::look_at_rh(camera, target, up),
                DMat4::perspective_rh(args.fov.to_radians(), 1.0, far * 1e-4, far),
                DepthRange::ZeroToOne,
            )
        }
        None => ViewState::from_position(camera),
    };
    let spatial_filter = args
        .bounds
        .as_deref()
        .map(|b| SpatialBounds::new(vec3(&b[..3]), vec3(&b[3..])));
    let time_filter = args.time.as_deref().map(|t| TimeRange::new(t[0], t[1]));

    let mut renderer = PointCounter::default();
    for frame in 0..args.frames {
        let monitoring = loader.update(
            &view,
            spatial_filter,
            time_filter,
            args.budget,
            &mut renderer,
        );
        let poll = loader.wait(&mut renderer, settings.fetch_timeout());
        log::info!(
            "frame {}: {} nodes visited, {} loads, {} unloads, {} budget skips, {} committed, {} failed, {} timed out, {} nodes / {} points resident",
            frame,
            monitoring.visited_nodes,
            monitoring.loads,
            monitoring.unloads,
            monitoring.budget_skips,
            poll.committed,
            poll.failed,
            poll.timed_out,
            renderer.nodes,
            renderer.points
        );
        log::debug!("{}", serde_json::to_string(&monitoring)?);
        if monitoring.loads == 0 && monitoring.unloads == 0 && poll.is_empty() {
            log::info!("working set is stable");
            break;
        }
    }

    loader.shutdown(&mut renderer);
    loader.wait(&mut renderer, Duration::from_secs(1));
    Ok(())
}
