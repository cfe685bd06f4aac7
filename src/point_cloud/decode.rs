use crate::error::DecodeError;
use crate::filter::Filters;
use crate::point_cloud::meta::Metadata;
use crate::settings::LoaderSettings;
use glam::DVec3;
use octree_format::{PointRecord, POINT_RECORD_SIZE};
use rayon::prelude::*;

/// Decoded points of one node. All arrays are index-aligned.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointArrays {
    pub positions: Vec<DVec3>,
    pub intensities: Vec<u16>,
    pub classifications: Vec<u8>,
    pub gps_times: Vec<f64>,
}

impl PointArrays {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            intensities: Vec::with_capacity(capacity),
            classifications: Vec::with_capacity(capacity),
            gps_times: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn push(&mut self, position: DVec3, record: &PointRecord) {
        self.positions.push(position);
        self.intensities.push(record.intensity());
        self.classifications.push(record.classification());
        self.gps_times.push(record.gps_time());
    }

    pub fn append(&mut self, other: &mut PointArrays) {
        self.positions.append(&mut other.positions);
        self.intensities.append(&mut other.intensities);
        self.classifications.append(&mut other.classifications);
        self.gps_times.append(&mut other.gps_times);
    }

    /// Selects `max_points` evenly spaced points. Returns `self` unchanged if it holds no more than
    /// `max_points` points.
    pub fn subsample(self, max_points: usize) -> Self {
        let len = self.len();
        if len <= max_points {
            return self;
        }
        let mut result = PointArrays::with_capacity(max_points);
        for i in 0..max_points {
            let j = (i as u128 * len as u128 / max_points as u128) as usize;
            result.positions.push(self.positions[j]);
            result.intensities.push(self.intensities[j]);
            result.classifications.push(self.classifications[j]);
            result.gps_times.push(self.gps_times[j]);
        }
        result
    }
}

/// Decodes point payloads, applies filters and caps the number of points per node.
///
/// Payloads are split into contiguous ranges of `chunk_size` points that are decoded in parallel.
#[derive(Copy, Clone, Debug)]
pub struct PointDecoder {
    chunk_size: usize,
    max_points: Option<u32>,
}

impl PointDecoder {
    pub fn new(chunk_size: usize, max_points: Option<u32>) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            max_points,
        }
    }

    pub fn from_settings(settings: &LoaderSettings) -> Self {
        Self::new(settings.decode_chunk_size, settings.max_points_per_node)
    }

    /// The number of points a node with `point_count` raw points holds at most after decoding.
    pub fn estimate(&self, point_count: u32) -> u32 {
        self.max_points.map_or(point_count, |cap| point_count.min(cap))
    }

    /// Decodes a buffer of point records.
    pub fn decode(
        &self,
        buffer: &[u8],
        metadata: &Metadata,
        filters: &Filters,
    ) -> Result<PointArrays, DecodeError> {
        if buffer.len() % POINT_RECORD_SIZE != 0 {
            return Err(DecodeError::InvalidLength {
                len: buffer.len(),
                record_size: POINT_RECORD_SIZE,
            });
        }
        let raw_count = buffer.len() / POINT_RECORD_SIZE;

        let mut parts: Vec<PointArrays> = buffer
            .par_chunks(self.chunk_size * POINT_RECORD_SIZE)
            .map(|chunk| decode_range(chunk, metadata, filters))
            .collect();

        let mut points =
            PointArrays::with_capacity(parts.iter().map(PointArrays::len).sum::<usize>());
        for part in parts.iter_mut() {
            points.append(part);
        }

        match self.max_points {
            Some(cap) if raw_count > cap as usize => Ok(points.subsample(cap as usize)),
            _ => Ok(points),
        }
    }

    /// Decodes a node's payload and checks that it holds `expected_points` records.
    pub fn decode_node(
        &self,
        buffer: &[u8],
        expected_points: u32,
        metadata: &Metadata,
        filters: &Filters,
    ) -> Result<PointArrays, DecodeError> {
        if buffer.len() % POINT_RECORD_SIZE == 0 {
            let actual = (buffer.len() / POINT_RECORD_SIZE) as u64;
            if actual != expected_points as u64 {
                return Err(DecodeError::PointCountMismatch {
                    expected: expected_points as u64,
                    actual,
                });
            }
        }
        self.decode(buffer, metadata, filters)
    }
}

impl Default for PointDecoder {
    fn default() -> Self {
        Self::from_settings(&LoaderSettings::default())
    }
}

fn decode_range(chunk: &[u8], metadata: &Metadata, filters: &Filters) -> PointArrays {
    let mut points = PointArrays::with_capacity(chunk.len() / POINT_RECORD_SIZE);
    for bytes in chunk.chunks_exact(POINT_RECORD_SIZE) {
        let record = PointRecord::read(bytes);
        let position = metadata.to_world(record.coordinates());
        if filters.accepts(position, record.gps_time()) {
            points.push(position, &record);
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{SpatialBounds, TimeRange};

    fn metadata() -> Metadata {
        Metadata::from_json_str(
            r#"{
                "points": 10,
                "hierarchy": {"firstChunkSize": 22, "depth": 1},
                "offset": [100.0, 0.0, 0.0],
                "scale": [0.5, 0.5, 0.5],
                "boundingBox": {"min": [100.0, 0.0, 0.0], "max": [200.0, 100.0, 100.0]}
            }"#,
        )
        .unwrap()
    }

    fn payload(times: &[f64]) -> Vec<u8> {
        times
            .iter()
            .enumerate()
            .flat_map(|(i, &t)| {
                let i = i as i32;
                PointRecord::new([2 * i, i, 0], i as u16 * 10, (i % 4) as u8, t)
                    .as_bytes()
                    .to_vec()
            })
            .collect()
    }

    #[test]
    fn decodes_all_fields() {
        let buffer = payload(&[1.0, 2.0, 3.0]);
        let points = PointDecoder::new(2, None)
            .decode(&buffer, &metadata(), &Filters::default())
            .unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points.positions[2], DVec3::new(102., 1., 0.));
        assert_eq!(points.intensities, vec![0, 10, 20]);
        assert_eq!(points.classifications, vec![0, 1, 2]);
        assert_eq!(points.gps_times, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn time_filter_keeps_arrays_aligned() {
        let times = [50., 100., 120., 150., 199., 200., 201., 130., 99., 170.];
        let buffer = payload(&times);
        let filters = Filters::new(None, Some(TimeRange::new(100., 200.)));
        for chunk_size in [1, 3, 16384] {
            let points = PointDecoder::new(chunk_size, None)
                .decode(&buffer, &metadata(), &filters)
                .unwrap();
            assert_eq!(points.len(), 7);
            assert_eq!(points.intensities.len(), 7);
            assert_eq!(points.classifications.len(), 7);
            assert_eq!(points.gps_times.len(), 7);
            for i in 0..points.len() {
                let source = (points.intensities[i] / 10) as usize;
                assert_eq!(points.gps_times[i], times[source]);
                assert_eq!(points.classifications[i], (source % 4) as u8);
                assert_eq!(points.positions[i].x, 100. + source as f64);
            }
        }
    }

    #[test]
    fn spatial_filter_drops_points_outside() {
        let buffer = payload(&[0.; 10]);
        // x = 100 + i, so points 0..=4 pass
        let filters = Filters::new(
            Some(SpatialBounds::from_axes(Some((100., 104.)), None, None)),
            None,
        );
        let points = PointDecoder::new(4, None)
            .decode(&buffer, &metadata(), &filters)
            .unwrap();
        assert_eq!(points.len(), 5);
        assert!(points.positions.iter().all(|p| p.x <= 104.));
    }

    #[test]
    fn subsampling_caps_points_after_filtering() {
        let buffer = payload(&(0..100).map(|t| t as f64).collect::<Vec<f64>>());
        let decoder = PointDecoder::new(7, Some(10));
        let points = decoder
            .decode(&buffer, &metadata(), &Filters::default())
            .unwrap();
        assert_eq!(points.len(), 10);
        assert_eq!(points.gps_times[0], 0.);
        assert_eq!(points.gps_times[1], 10.);
        assert_eq!(decoder.estimate(100), 10);
        assert_eq!(decoder.estimate(5), 5);

        // filtering already brings the node below the cap
        let filters = Filters::new(None, Some(TimeRange::new(0., 4.)));
        let points = decoder.decode(&buffer, &metadata(), &filters).unwrap();
        assert_eq!(points.len(), 5);
    }

    #[test]
    fn invalid_length() {
        let mut buffer = payload(&[1.0, 2.0]);
        buffer.pop();
        assert_eq!(
            PointDecoder::default().decode(&buffer, &metadata(), &Filters::default()),
            Err(DecodeError::InvalidLength {
                len: 45,
                record_size: 23
            })
        );
    }

    #[test]
    fn point_count_mismatch() {
        let buffer = payload(&[1.0, 2.0]);
        assert_eq!(
            PointDecoder::default().decode_node(&buffer, 3, &metadata(), &Filters::default()),
            Err(DecodeError::PointCountMismatch {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn empty_payload() {
        let points = PointDecoder::default()
            .decode_node(&[], 0, &metadata(), &Filters::default())
            .unwrap();
        assert!(points.is_empty());
    }
}
