pub mod bounds;
pub mod frustum;

pub use bounds::Bounds3;
pub use frustum::{DepthRange, Frustum};
