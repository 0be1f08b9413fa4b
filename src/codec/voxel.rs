//! Voxel-grid downsampling

use std::collections::HashMap;

use tracing::debug;

use crate::error::CodecError;
use crate::types::{POINT_RECORD_SIZE, Point3D, point_records, serialize_points};

use super::Codec;

pub(super) const NAME: &str = "voxel";

/// Replaces all points in each occupied grid cell with their mean.
///
/// Cells are addressed by `floor(coord / voxel_size)` per axis, so negative
/// coordinates bucket consistently. Points with a non-finite coordinate, or one too
/// large to address, are discarded. Output order follows hash-map iteration and is
/// not stable between runs. Decompression is the identity: the quantization is not
/// reversible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelCodec {
    voxel_size: f32,
}

#[derive(Default)]
struct Accumulator {
    sum: [f64; 3],
    count: u32,
}

impl VoxelCodec {
    /// Create a codec; the voxel size must be finite and positive.
    pub fn new(voxel_size: f32) -> Result<Self, CodecError> {
        if !voxel_size.is_finite() || voxel_size <= 0.0 {
            return Err(CodecError::InvalidParameter {
                details: format!("voxel size must be finite and > 0, got {voxel_size}"),
            });
        }
        Ok(Self { voxel_size })
    }

    /// Cell edge length in metres
    pub fn voxel_size(&self) -> f32 {
        self.voxel_size
    }

    fn axis(&self, coord: f32) -> Option<i64> {
        // Cast saturates, so out-of-range cells would alias
        const LIMIT: f64 = i64::MAX as f64;
        let scaled = (coord as f64 / self.voxel_size as f64).floor();
        (scaled.is_finite() && scaled.abs() < LIMIT).then_some(scaled as i64)
    }

    fn cell(&self, point: &Point3D) -> Option<(i64, i64, i64)> {
        Some((self.axis(point.x)?, self.axis(point.y)?, self.axis(point.z)?))
    }

    /// Downsample a point set.
    pub fn downsample(&self, points: impl IntoIterator<Item = Point3D>) -> Vec<Point3D> {
        let mut cells: HashMap<(i64, i64, i64), Accumulator> = HashMap::new();
        let mut discarded = 0usize;

        for point in points {
            let Some(cell) = self.cell(&point) else {
                discarded += 1;
                continue;
            };
            let acc = cells.entry(cell).or_default();
            acc.sum[0] += point.x as f64;
            acc.sum[1] += point.y as f64;
            acc.sum[2] += point.z as f64;
            acc.count += 1;
        }
        if discarded > 0 {
            debug!(discarded, "Skipped points outside the voxel grid");
        }

        cells
            .into_values()
            .map(|acc| {
                let n = acc.count as f64;
                Point3D::new((acc.sum[0] / n) as f32, (acc.sum[1] / n) as f32, (acc.sum[2] / n) as f32)
            })
            .collect()
    }
}

impl Codec for VoxelCodec {
    fn name(&self) -> &'static str {
        NAME
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        if input.len() % POINT_RECORD_SIZE != 0 {
            return Err(CodecError::PointBuffer { len: input.len() });
        }
        Ok(serialize_points(&self.downsample(point_records(input))))
    }

    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(input.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::deserialize_points;

    fn sorted(mut points: Vec<Point3D>) -> Vec<Point3D> {
        points.sort_by(|a, b| {
            a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)).then(a.z.total_cmp(&b.z))
        });
        points
    }

    #[test]
    fn merges_points_sharing_a_cell() {
        let codec = VoxelCodec::new(1.0).unwrap();
        let points = vec![
            Point3D::new(0.2, 0.2, 0.2),
            Point3D::new(0.4, 0.6, 0.8),
            Point3D::new(5.5, 5.5, 5.5),
        ];
        let out = sorted(codec.downsample(points));

        assert_eq!(out.len(), 2);
        assert!((out[0].x - 0.3).abs() < 1e-6);
        assert!((out[0].y - 0.4).abs() < 1e-6);
        assert!((out[0].z - 0.5).abs() < 1e-6);
        assert_eq!(out[1], Point3D::new(5.5, 5.5, 5.5));
    }

    #[test]
    fn negative_coordinates_use_floor() {
        let codec = VoxelCodec::new(1.0).unwrap();
        // Truncation would put -0.5 and 0.5 in the same cell
        let out = codec.downsample(vec![Point3D::new(-0.5, 0.0, 0.0), Point3D::new(0.5, 0.0, 0.0)]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn non_finite_points_are_discarded() {
        let codec = VoxelCodec::new(1.0).unwrap();
        let out = codec.downsample(vec![
            Point3D::new(f32::NAN, 0.5, 0.5),
            Point3D::new(0.5, f32::INFINITY, 0.5),
            Point3D::new(0.5, 0.5, 0.5),
        ]);
        assert_eq!(out, vec![Point3D::new(0.5, 0.5, 0.5)]);
    }

    #[test]
    fn distant_points_keep_their_own_cells() {
        // Both would saturate to the same 32-bit cell
        let codec = VoxelCodec::new(0.05).unwrap();
        let out = codec.downsample(vec![Point3D::new(2.0e8, 0.0, 0.0), Point3D::new(3.0e8, 0.0, 0.0)]);
        assert_eq!(out.len(), 2);

        let codec = VoxelCodec::new(1.0e-30).unwrap();
        assert!(codec.downsample(vec![Point3D::new(1.0e10, 0.0, 0.0)]).is_empty());
    }

    #[test]
    fn compress_rejects_partial_records() {
        let codec = VoxelCodec::new(0.1).unwrap();
        assert!(matches!(codec.compress(&[0u8; 13]), Err(CodecError::PointBuffer { len: 13 })));
        assert!(codec.compress(&[]).unwrap().is_empty());
    }

    #[test]
    fn decompress_is_identity() {
        let codec = VoxelCodec::new(0.1).unwrap();
        let bytes = vec![1, 2, 3, 4, 5];
        assert_eq!(codec.decompress(&bytes).unwrap(), bytes);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_points() -> impl Strategy<Value = Vec<Point3D>> {
            prop::collection::vec(
                (-100.0f32..100.0, -100.0f32..100.0, -20.0f32..20.0)
                    .prop_map(|(x, y, z)| Point3D::new(x, y, z)),
                0..400,
            )
        }

        proptest! {
            #[test]
            fn every_centroid_shares_a_cell_with_an_input(
                points in arb_points(),
                voxel_size in 0.05f32..5.0,
            ) {
                let codec = VoxelCodec::new(voxel_size).unwrap();
                let out = codec.downsample(points.iter().copied());
                prop_assert!(out.len() <= points.len());

                for centroid in &out {
                    let cell = codec.cell(centroid);
                    prop_assert!(cell.is_some());
                    prop_assert!(
                        points.iter().any(|p| codec.cell(p) == cell),
                        "centroid {:?} left every contributing cell", centroid
                    );
                }
            }

            #[test]
            fn compress_is_idempotent(points in arb_points(), voxel_size in 0.05f32..5.0) {
                let codec = VoxelCodec::new(voxel_size).unwrap();
                let once = codec.compress(&serialize_points(&points)).unwrap();
                let twice = codec.compress(&once).unwrap();

                let once = sorted(deserialize_points(&once).unwrap());
                let twice = sorted(deserialize_points(&twice).unwrap());
                prop_assert_eq!(once.len(), twice.len());
                for (a, b) in once.iter().zip(&twice) {
                    prop_assert!((a.x - b.x).abs() < 1e-4);
                    prop_assert!((a.y - b.y).abs() < 1e-4);
                    prop_assert!((a.z - b.z).abs() < 1e-4);
                }
            }
        }
    }
}
