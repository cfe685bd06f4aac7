use crate::error::SessionError;
use crate::point_cloud::fetch::{ChunkFetcher, FileChunkFetcher, HttpChunkFetcher};
use crate::point_cloud::meta::Metadata;
use crate::point_cloud::octree::{HierarchyParser, NodeIndex};
use crate::settings::LoaderSettings;
use crate::util::io;
use octree_format::{HIERARCHY_FILE_NAME, METADATA_FILE_NAME, OCTREE_FILE_NAME};
use std::sync::Arc;

/// An opened data set: its metadata, the complete node index and a fetcher for point payloads.
#[derive(Debug)]
pub struct Dataset {
    pub metadata: Metadata,
    pub index: NodeIndex,
    pub octree: Arc<dyn ChunkFetcher>,
}

impl Dataset {
    /// Opens the data set at `location`, which is either a local directory or an http(s) base URL
    /// containing `metadata.json`, `hierarchy.bin` and `octree.bin`.
    pub fn open(location: &str, settings: &LoaderSettings) -> Result<Self, SessionError> {
        let timeout = settings.fetch_timeout();
        let metadata = Metadata::from_json_str(&io::load_file_as_string(
            &io::join(location, METADATA_FILE_NAME),
            timeout,
        )?)?;

        let hierarchy_location = io::join(location, HIERARCHY_FILE_NAME);
        let octree_location = io::join(location, OCTREE_FILE_NAME);
        let (hierarchy, octree): (Box<dyn ChunkFetcher>, Arc<dyn ChunkFetcher>) =
            if io::is_url(location) {
                (
                    Box::new(HttpChunkFetcher::new(&hierarchy_location, timeout)?),
                    Arc::new(HttpChunkFetcher::new(&octree_location, timeout)?),
                )
            } else {
                (
                    Box::new(FileChunkFetcher::new(&hierarchy_location)?),
                    Arc::new(FileChunkFetcher::new(&octree_location)?),
                )
            };

        log::info!(
            "opening {} ({} points, depth {})",
            metadata.name.as_deref().unwrap_or(location),
            metadata.points,
            metadata.depth
        );
        Self::from_parts(metadata, hierarchy.as_ref(), octree)
    }

    /// Builds the node index by reading `hierarchy` and pairs it with `octree`.
    pub fn from_parts(
        metadata: Metadata,
        hierarchy: &dyn ChunkFetcher,
        octree: Arc<dyn ChunkFetcher>,
    ) -> Result<Self, SessionError> {
        let index = HierarchyParser::new(&metadata).load(hierarchy)?;
        Ok(Self {
            metadata,
            index,
            octree,
        })
    }
}
