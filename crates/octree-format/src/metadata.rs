use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct BoundingBoxDocument {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct HierarchyDocument {
    /// The size of the root hierarchy chunk in bytes.
    #[serde(rename = "firstChunkSize")]
    pub first_chunk_size: u64,

    /// The number of octree levels covered by a single hierarchy chunk.
    #[serde(rename = "stepSize", default)]
    pub step_size: u32,

    /// The number of levels in the octree.
    pub depth: u32,
}

/// The contents of `metadata.json`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct MetadataDocument {
    #[serde(default)]
    pub name: Option<String>,

    /// The total number of points in the data set.
    pub points: u64,

    pub hierarchy: HierarchyDocument,

    /// Added to a point's scaled integer coordinates to get its world position.
    #[serde(default)]
    pub offset: [f64; 3],

    /// Multiplied with a point's integer coordinates to get its world position.
    pub scale: [f64; 3],

    /// The minimum distance between points in the root node.
    #[serde(default)]
    pub spacing: f64,

    #[serde(rename = "boundingBox")]
    pub bounding_box: BoundingBoxDocument,
}

impl MetadataDocument {
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
