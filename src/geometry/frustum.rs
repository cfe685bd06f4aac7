use crate::geometry::bounds::Bounds3;
use glam::{DMat4, DVec3, DVec4};

/// The depth range a projection matrix maps to in clip space.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DepthRange {
    /// OpenGL style clip space: `-w <= z <= w`.
    NegativeOneToOne,

    /// WebGPU, Vulkan, and Direct3D style clip space: `0 <= z <= w`.
    ZeroToOne,
}

/// A view frustum given by six inward facing planes.
/// Each plane is stored as `(normal, distance)` s.t. `dot(normal, p) + distance >= 0` for all
/// points `p` on the inner side of the plane.
#[derive(Copy, Clone, Debug)]
pub struct Frustum {
    planes: [DVec4; 6],
}

impl Frustum {
    /// Extracts the frustum planes from a combined view-projection matrix.
    pub fn from_view_projection(view_projection: DMat4, depth_range: DepthRange) -> Self {
        let rows = view_projection.transpose();
        let (r0, r1, r2, r3) = (rows.x_axis, rows.y_axis, rows.z_axis, rows.w_axis);
        let near = match depth_range {
            DepthRange::NegativeOneToOne => r3 + r2,
            DepthRange::ZeroToOne => r2,
        };
        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, near, r3 - r2].map(normalize_plane);
        Self { planes }
    }

    pub fn contains_point(&self, point: DVec3) -> bool {
        self.planes
            .iter()
            .all(|p| p.truncate().dot(point) + p.w >= 0.0)
    }

    /// Conservative box test: returns `false` only if `bounds` lies completely outside of at
    /// least one plane.
    pub fn intersects(&self, bounds: &Bounds3) -> bool {
        self.planes.iter().all(|p| {
            let normal = p.truncate();
            let positive_vertex =
                DVec3::select(normal.cmpge(DVec3::ZERO), bounds.max(), bounds.min());
            normal.dot(positive_vertex) + p.w >= 0.0
        })
    }
}

fn normalize_plane(plane: DVec4) -> DVec4 {
    let length = plane.truncate().length();
    if length > f64::EPSILON {
        plane / length
    } else {
        plane
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frustum(depth_range: DepthRange) -> Frustum {
        let view = DMat4::look_at_rh(DVec3::new(0., 0., 10.), DVec3::ZERO, DVec3::Y);
        let projection = match depth_range {
            DepthRange::NegativeOneToOne => {
                DMat4::perspective_rh_gl(std::f64::consts::FRAC_PI_2, 1.0, 0.1, 100.0)
            }
            DepthRange::ZeroToOne => {
                DMat4::perspective_rh(std::f64::consts::FRAC_PI_2, 1.0, 0.1, 100.0)
            }
        };
        Frustum::from_view_projection(projection * view, depth_range)
    }

    #[test]
    fn box_in_front_of_camera_is_visible() {
        for depth_range in [DepthRange::NegativeOneToOne, DepthRange::ZeroToOne] {
            let f = frustum(depth_range);
            assert!(f.intersects(&Bounds3::new(DVec3::splat(-1.), DVec3::splat(1.))));
            assert!(f.contains_point(DVec3::ZERO));
        }
    }

    #[test]
    fn box_behind_camera_is_culled() {
        let f = frustum(DepthRange::ZeroToOne);
        let behind = Bounds3::new(DVec3::new(-1., -1., 20.), DVec3::new(1., 1., 22.));
        assert!(!f.intersects(&behind));
    }

    #[test]
    fn box_beyond_far_plane_is_culled() {
        let f = frustum(DepthRange::NegativeOneToOne);
        let far = Bounds3::new(DVec3::new(-1., -1., -200.), DVec3::new(1., 1., -150.));
        assert!(!f.intersects(&far));
    }

    #[test]
    fn box_off_to_the_side_is_culled() {
        let f = frustum(DepthRange::ZeroToOne);
        // at distance 10 the half width of a 90 degree frustum is 10
        let side = Bounds3::new(DVec3::new(30., -1., -1.), DVec3::new(32., 1., 1.));
        assert!(!f.intersects(&side));
    }

    #[test]
    fn box_straddling_a_plane_is_visible() {
        let f = frustum(DepthRange::ZeroToOne);
        let straddling = Bounds3::new(DVec3::new(5., -1., -1.), DVec3::new(50., 1., 1.));
        assert!(f.intersects(&straddling));
    }
}
