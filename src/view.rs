use crate::geometry::{Bounds3, DepthRange, Frustum};
use glam::{DMat4, DVec3};

/// The camera state a traversal is evaluated against.
#[derive(Copy, Clone, Debug)]
pub struct ViewState {
    pub camera_position: DVec3,

    /// Nodes outside of the frustum are culled. `None` means everything is visible.
    pub frustum: Option<Frustum>,
}

impl ViewState {
    pub fn new(camera_position: DVec3, frustum: Option<Frustum>) -> Self {
        Self {
            camera_position,
            frustum,
        }
    }

    /// A view without frustum culling.
    pub fn from_position(camera_position: DVec3) -> Self {
        Self::new(camera_position, None)
    }

    pub fn from_view_projection(
        view: DMat4,
        projection: DMat4,
        depth_range: DepthRange,
    ) -> Self {
        let camera_position = view.inverse().w_axis.truncate();
        Self::new(
            camera_position,
            Some(Frustum::from_view_projection(projection * view, depth_range)),
        )
    }

    pub fn is_visible(&self, bounds: &Bounds3) -> bool {
        self.frustum.map_or(true, |f| f.intersects(bounds))
    }

    /// The distance between the camera and the center of `bounds`.
    pub fn distance_to(&self, bounds: &Bounds3) -> f64 {
        self.camera_position.distance(bounds.center())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_position_from_view_matrix() {
        let eye = DVec3::new(3., -4., 12.);
        let view = DMat4::look_at_rh(eye, DVec3::ZERO, DVec3::Z);
        let projection = DMat4::perspective_rh(1.0, 1.0, 0.1, 100.);
        let state = ViewState::from_view_projection(view, projection, DepthRange::ZeroToOne);
        assert!(state.camera_position.distance(eye) < 1e-9);
        assert!(state.is_visible(&Bounds3::new(DVec3::splat(-1.), DVec3::splat(1.))));
    }

    #[test]
    fn no_frustum_sees_everything() {
        let state = ViewState::from_position(DVec3::ZERO);
        let far_away = Bounds3::new(DVec3::splat(1e9), DVec3::splat(1e9 + 1.));
        assert!(state.is_visible(&far_away));
        assert_eq!(
            state.distance_to(&Bounds3::new(DVec3::new(2., 0., 0.), DVec3::new(4., 0., 0.))),
            3.
        );
    }
}
