use crate::error::{ParseError, SessionError};
use crate::point_cloud::fetch::ChunkFetcher;
use crate::point_cloud::meta::Metadata;
use crate::point_cloud::octree::{NodeId, NodeIndex};
use octree_format::{HierarchyRecord, NodeType, HIERARCHY_RECORD_SIZE};
use std::collections::VecDeque;

/// Builds a [`NodeIndex`] from the binary hierarchy.
///
/// A hierarchy chunk is a breadth-first sequence of [`HierarchyRecord`]s. The first record of a
/// chunk describes the chunk's root, every following record describes the next child announced by
/// the child masks of the records before it. Children are visited in ascending octant order.
///
/// Records of type [`NodeType::Proxy`] do not describe their children. Instead their byte range
/// locates another chunk in `hierarchy.bin` whose first record re-describes the proxy node.
#[derive(Debug)]
pub struct HierarchyParser<'a> {
    metadata: &'a Metadata,
}

impl<'a> HierarchyParser<'a> {
    pub fn new(metadata: &'a Metadata) -> Self {
        Self { metadata }
    }

    /// Parses a single hierarchy chunk describing the root and its subtree.
    /// Proxy nodes in the chunk are kept as they are.
    pub fn parse(&self, buffer: &[u8]) -> Result<NodeIndex, ParseError> {
        let mut index = NodeIndex::with_root(self.metadata.bounds);
        parse_chunk(&mut index, NodeId::ROOT, buffer, false)?;
        Ok(index)
    }

    /// Reads the first hierarchy chunk from `hierarchy` and expands all proxy nodes, so that the
    /// resulting index describes the whole octree.
    pub fn load(&self, hierarchy: &dyn ChunkFetcher) -> Result<NodeIndex, SessionError> {
        let mut index = NodeIndex::with_root(self.metadata.bounds);
        let buffer = hierarchy.fetch(0, self.metadata.first_chunk_size)?;
        let mut proxies: VecDeque<NodeId> =
            parse_chunk(&mut index, NodeId::ROOT, &buffer, false)?.into();

        let mut chunks = 1;
        while let Some(proxy) = proxies.pop_front() {
            let (offset, size) = (index[proxy].byte_offset(), index[proxy].byte_size());
            log::trace!(
                "expanding proxy {} with hierarchy chunk {}+{}",
                index[proxy].name(),
                offset,
                size
            );
            let buffer = hierarchy.fetch(offset, size)?;
            proxies.extend(parse_chunk(&mut index, proxy, &buffer, true)?);
            chunks += 1;
        }

        log::info!(
            "parsed {} hierarchy chunks with {} nodes and {} points",
            chunks,
            index.len(),
            index.total_points()
        );
        Ok(index)
    }
}

/// Parses one chunk into `index` starting at `chunk_root` and returns the proxy nodes found in it.
fn parse_chunk(
    index: &mut NodeIndex,
    chunk_root: NodeId,
    buffer: &[u8],
    is_proxy_chunk: bool,
) -> Result<Vec<NodeId>, ParseError> {
    if buffer.len() % HIERARCHY_RECORD_SIZE != 0 {
        return Err(ParseError::InvalidHierarchyLength {
            len: buffer.len(),
            record_size: HIERARCHY_RECORD_SIZE,
        });
    }
    let records: Vec<HierarchyRecord> = buffer
        .chunks_exact(HIERARCHY_RECORD_SIZE)
        .map(HierarchyRecord::read)
        .collect();
    if records.is_empty() {
        return Err(ParseError::EmptyHierarchy);
    }

    let mut nodes = vec![chunk_root];
    let mut proxies = Vec::new();
    let mut i = 0;
    while i < nodes.len() {
        let id = nodes[i];
        let record = &records[i];
        index.apply_record(id, record);

        if record.node_type() == NodeType::Proxy {
            if i == 0 && is_proxy_chunk {
                return Err(ParseError::ProxyLoop(index[id].name().to_string()));
            }
            proxies.push(id);
            i += 1;
            continue;
        }

        let child_mask = record.child_mask();
        let required = nodes.len() + child_mask.count_ones() as usize;
        if required > records.len() {
            return Err(ParseError::MissingChildRecords {
                records: records.len(),
                missing: required - records.len(),
            });
        }
        for octant in 0..octree_format::NUM_OCTANTS {
            if child_mask & (1 << octant) != 0 {
                let child = index
                    .insert_child(id, octant)
                    .ok_or_else(|| ParseError::TooDeep(index[id].name().to_string()))?;
                nodes.push(child);
            }
        }
        i += 1;
    }

    if nodes.len() < records.len() {
        return Err(ParseError::TrailingRecords {
            trailing: records.len() - nodes.len(),
        });
    }
    Ok(proxies)
}
