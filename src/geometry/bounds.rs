use glam::DVec3;
use octree_format::BoundingBoxDocument;

/// An axis-aligned box in world space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bounds3 {
    min: DVec3,
    max: DVec3,
}

impl Bounds3 {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }

    pub fn min(&self) -> DVec3 {
        self.min
    }

    pub fn max(&self) -> DVec3 {
        self.max
    }

    pub fn diagonal(&self) -> DVec3 {
        self.max - self.min
    }

    pub fn center(&self) -> DVec3 {
        self.min + self.diagonal() * 0.5
    }

    /// The length of this box's diagonal.
    pub fn size(&self) -> f64 {
        self.diagonal().length()
    }

    /// Checks if `point` lies within this box. Points on the boundary are inside.
    pub fn contains(&self, point: DVec3) -> bool {
        self.min.cmple(point).all() && self.max.cmpge(point).all()
    }

    /// Checks if this box and `other` share at least one point. Touching boxes intersect.
    pub fn intersects(&self, other: &Bounds3) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Computes the box of one of the eight octants of this box.
    ///
    /// Bit 0 of `octant` selects the upper half on the x axis, bit 1 the upper half on the y axis
    /// and bit 2 the upper half on the z axis.
    pub fn octant(&self, octant: u8) -> Self {
        let center = self.center();
        let mut min = self.min;
        let mut max = center;
        if octant & 0b001 != 0 {
            min.x = center.x;
            max.x = self.max.x;
        }
        if octant & 0b010 != 0 {
            min.y = center.y;
            max.y = self.max.y;
        }
        if octant & 0b100 != 0 {
            min.z = center.z;
            max.z = self.max.z;
        }
        Self { min, max }
    }
}

impl From<&BoundingBoxDocument> for Bounds3 {
    fn from(document: &BoundingBoxDocument) -> Self {
        Self::new(
            DVec3::from_array(document.min),
            DVec3::from_array(document.max),
        )
    }
}
