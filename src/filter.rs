use crate::geometry::Bounds3;
use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Restricts points to an axis-aligned region. Each axis may be left unrestricted.
/// Bounds are inclusive.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SpatialBounds {
    pub min: DVec3,
    pub max: DVec3,
}

impl SpatialBounds {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }

    /// Creates spatial bounds from optional per-axis `(min, max)` ranges.
    /// A `None` axis is unrestricted.
    pub fn from_axes(
        x: Option<(f64, f64)>,
        y: Option<(f64, f64)>,
        z: Option<(f64, f64)>,
    ) -> Self {
        let axis = |range: Option<(f64, f64)>| {
            range
                .map(|(a, b)| (a.min(b), a.max(b)))
                .unwrap_or((f64::NEG_INFINITY, f64::INFINITY))
        };
        let (x, y, z) = (axis(x), axis(y), axis(z));
        Self {
            min: DVec3::new(x.0, y.0, z.0),
            max: DVec3::new(x.1, y.1, z.1),
        }
    }

    pub fn contains(&self, point: DVec3) -> bool {
        self.min.cmple(point).all() && self.max.cmpge(point).all()
    }

    pub fn intersects(&self, bounds: &Bounds3) -> bool {
        self.min.cmple(bounds.max()).all() && self.max.cmpge(bounds.min()).all()
    }
}

/// Restricts points to an inclusive range of timestamps.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TimeRange {
    pub min: f64,
    pub max: f64,
}

impl TimeRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.min && time <= self.max
    }
}

/// A snapshot of the filters active during one update.
/// `None` means "no restriction".
#[derive(Copy, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Filters {
    pub spatial: Option<SpatialBounds>,
    pub time: Option<TimeRange>,
}

impl Filters {
    pub fn new(spatial: Option<SpatialBounds>, time: Option<TimeRange>) -> Self {
        Self { spatial, time }
    }

    pub fn is_active(&self) -> bool {
        self.spatial.is_some() || self.time.is_some()
    }

    pub fn accepts(&self, position: DVec3, time: f64) -> bool {
        self.spatial.map_or(true, |s| s.contains(position))
            && self.time.map_or(true, |t| t.contains(time))
    }

    /// Checks if points inside `bounds` can pass the spatial filter at all.
    pub fn may_contain(&self, bounds: &Bounds3) -> bool {
        self.spatial.map_or(true, |s| s.intersects(bounds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrestricted_axes_accept_everything() {
        let s = SpatialBounds::from_axes(Some((0., 10.)), None, None);
        assert!(s.contains(DVec3::new(5., -1e12, 1e12)));
        assert!(!s.contains(DVec3::new(10.5, 0., 0.)));
    }

    #[test]
    fn time_range_is_inclusive() {
        let t = TimeRange::new(100., 200.);
        assert!(t.contains(100.));
        assert!(t.contains(200.));
        assert!(!t.contains(99.999));
        assert!(!t.contains(200.001));
    }

    #[test]
    fn empty_filters_accept_everything() {
        let f = Filters::default();
        assert!(!f.is_active());
        assert!(f.accepts(DVec3::splat(1e9), f64::MAX));
        assert!(f.may_contain(&Bounds3::new(DVec3::ZERO, DVec3::ONE)));
    }

    #[test]
    fn spatial_filter_prunes_disjoint_boxes() {
        let f = Filters::new(
            Some(SpatialBounds::new(DVec3::ZERO, DVec3::splat(10.))),
            None,
        );
        assert!(f.may_contain(&Bounds3::new(DVec3::splat(9.), DVec3::splat(20.))));
        assert!(!f.may_contain(&Bounds3::new(DVec3::splat(11.), DVec3::splat(20.))));
    }
}
