use crate::error::ParseError;
use crate::geometry::Bounds3;
use glam::DVec3;
use octree_format::{MetadataDocument, HIERARCHY_RECORD_SIZE};

/// Validated data set wide information. Immutable after the session started.
#[readonly::make]
#[derive(Clone, Debug)]
pub struct Metadata {
    pub name: Option<String>,

    /// The bounding box of the whole data set, i.e., the root node's box.
    pub bounds: Bounds3,

    /// Multiplied with a point's integer coordinates before `offset` is added.
    pub scale: DVec3,

    pub offset: DVec3,

    /// The total number of points in the data set.
    pub points: u64,

    /// The number of levels in the octree.
    pub depth: u32,

    /// The size of the root hierarchy chunk in bytes.
    pub first_chunk_size: u64,

    pub spacing: f64,
}

impl Metadata {
    pub fn from_document(document: &MetadataDocument) -> Result<Self, ParseError> {
        let min = DVec3::from_array(document.bounding_box.min);
        let max = DVec3::from_array(document.bounding_box.max);
        if !min.is_finite() || !max.is_finite() {
            return Err(ParseError::InvalidMetadata(
                "bounding box must be finite".to_string(),
            ));
        }
        if min.cmpgt(max).any() {
            return Err(ParseError::InvalidMetadata(format!(
                "bounding box min {} exceeds max {}",
                min, max
            )));
        }

        let scale = DVec3::from_array(document.scale);
        if !scale.is_finite() || scale.cmple(DVec3::ZERO).any() {
            return Err(ParseError::InvalidMetadata(format!(
                "scale must be positive on all axes, got {}",
                scale
            )));
        }

        let offset = DVec3::from_array(document.offset);
        if !offset.is_finite() {
            return Err(ParseError::InvalidMetadata(
                "offset must be finite".to_string(),
            ));
        }

        let first_chunk_size = document.hierarchy.first_chunk_size;
        if first_chunk_size % HIERARCHY_RECORD_SIZE as u64 != 0 {
            return Err(ParseError::InvalidMetadata(format!(
                "first chunk size {} is not a multiple of {}",
                first_chunk_size, HIERARCHY_RECORD_SIZE
            )));
        }

        Ok(Self {
            name: document.name.clone(),
            bounds: Bounds3::from(&document.bounding_box),
            scale,
            offset,
            points: document.points,
            depth: document.hierarchy.depth,
            first_chunk_size,
            spacing: document.spacing,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, ParseError> {
        Self::from_document(&MetadataDocument::from_json_str(json)?)
    }

    /// Converts a point's quantized coordinates to world space.
    pub fn to_world(&self, coordinates: [i32; 3]) -> DVec3 {
        DVec3::new(
            coordinates[0] as f64,
            coordinates[1] as f64,
            coordinates[2] as f64,
        ) * self.scale
            + self.offset
    }
}
