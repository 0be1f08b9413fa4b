//! Ordered codec chain

use tracing::trace;

use super::{Codec, CodecSpec};
use crate::error::Pass;
use crate::{DispatchError, Result};

/// An ordered, immutable list of codec stages.
///
/// [`Pipeline::compress`] applies stages in order; [`Pipeline::decompress`] applies
/// them in reverse. The first failing stage aborts the pass and no partial output
/// is returned. An empty pipeline passes buffers through unchanged.
#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Codec>>,
}

impl Pipeline {
    /// Build from already-constructed stages
    pub fn new(stages: Vec<Box<dyn Codec>>) -> Self {
        Self { stages }
    }

    /// Validate and build every stage from configuration.
    pub fn from_specs(specs: &[CodecSpec]) -> Result<Self> {
        let stages = specs
            .iter()
            .enumerate()
            .map(|(stage, spec)| {
                spec.build().map_err(|source| DispatchError::Codec {
                    stage,
                    codec: spec.name(),
                    pass: Pass::Compress,
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { stages })
    }

    /// Stage names in forward order
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline is the identity
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Forward pass, send path.
    pub fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut buf = input.to_vec();
        for (stage, codec) in self.stages.iter().enumerate() {
            buf = codec.compress(&buf).map_err(|source| DispatchError::Codec {
                stage,
                codec: codec.name(),
                pass: Pass::Compress,
                source,
            })?;
            trace!(stage, codec = codec.name(), bytes = buf.len(), "Compressed");
        }
        Ok(buf)
    }

    /// Reverse pass, receive path.
    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut buf = input.to_vec();
        for (stage, codec) in self.stages.iter().enumerate().rev() {
            buf = codec.decompress(&buf).map_err(|source| DispatchError::Codec {
                stage,
                codec: codec.name(),
                pass: Pass::Decompress,
                source,
            })?;
            trace!(stage, codec = codec.name(), bytes = buf.len(), "Decompressed");
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::types::{Point3D, deserialize_points, serialize_points};
    use std::sync::Arc;
    use std::sync::Mutex;

    /// Records the order stages run in.
    #[derive(Debug)]
    struct Tagging {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl Codec for Tagging {
        fn name(&self) -> &'static str {
            self.tag
        }

        fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
            self.log.lock().unwrap().push(format!("c:{}", self.tag));
            if self.fail {
                return Err(CodecError::InvalidParameter { details: "boom".into() });
            }
            let mut out = input.to_vec();
            out.extend_from_slice(self.tag.as_bytes());
            Ok(out)
        }

        fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
            self.log.lock().unwrap().push(format!("d:{}", self.tag));
            if self.fail {
                return Err(CodecError::InvalidParameter { details: "boom".into() });
            }
            let stripped = input
                .strip_suffix(self.tag.as_bytes())
                .ok_or(CodecError::InvalidParameter { details: "missing tag".into() })?;
            Ok(stripped.to_vec())
        }
    }

    fn tagging(log: &Arc<Mutex<Vec<String>>>, tags: &[(&'static str, bool)]) -> Pipeline {
        Pipeline::new(
            tags.iter()
                .map(|&(tag, fail)| Box::new(Tagging { tag, log: log.clone(), fail }) as Box<dyn Codec>)
                .collect(),
        )
    }

    #[test]
    fn stages_run_forward_then_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = tagging(&log, &[("a", false), ("b", false)]);

        let compressed = pipeline.compress(b"x").unwrap();
        assert_eq!(compressed, b"xab");
        assert_eq!(pipeline.decompress(&compressed).unwrap(), b"x");
        assert_eq!(*log.lock().unwrap(), vec!["c:a", "c:b", "d:b", "d:a"]);
    }

    #[test]
    fn failing_stage_aborts_remaining_stages() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = tagging(&log, &[("a", true), ("b", false)]);

        let err = pipeline.compress(b"x").unwrap_err();
        match err {
            DispatchError::Codec { stage, codec, pass, .. } => {
                assert_eq!((stage, codec, pass), (0, "a", Pass::Compress));
            }
            other => panic!("Expected codec error, got {other:?}"),
        }
        assert_eq!(*log.lock().unwrap(), vec!["c:a"]);
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let pipeline = Pipeline::default();
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.compress(b"abc").unwrap(), b"abc");
        assert_eq!(pipeline.decompress(b"abc").unwrap(), b"abc");
    }

    #[test]
    fn invalid_spec_reports_its_stage() {
        let err = Pipeline::from_specs(&[
            CodecSpec::Gzip { level: 6 },
            CodecSpec::Voxel { voxel_size: 0.0 },
        ])
        .unwrap_err();
        assert!(matches!(err, DispatchError::Codec { stage: 1, codec: "voxel", .. }));
    }

    #[test]
    fn voxel_then_gzip_reconstructs_centroids() {
        let pipeline = Pipeline::from_specs(&[
            CodecSpec::Voxel { voxel_size: 1.0 },
            CodecSpec::Gzip { level: 6 },
        ])
        .unwrap();

        let points = vec![Point3D::new(0.25, 0.25, 0.25), Point3D::new(0.75, 0.75, 0.75)];
        let payload = pipeline.compress(&serialize_points(&points)).unwrap();
        let restored = deserialize_points(&pipeline.decompress(&payload).unwrap()).unwrap();
        assert_eq!(restored, vec![Point3D::new(0.5, 0.5, 0.5)]);
    }

    #[test]
    fn mismatched_chain_fails_on_decompress() {
        let sender = Pipeline::from_specs(&[CodecSpec::Voxel { voxel_size: 0.1 }]).unwrap();
        let receiver = Pipeline::from_specs(&[CodecSpec::Gzip { level: 6 }]).unwrap();

        let payload = sender.compress(&serialize_points(&[Point3D::new(1.0, 2.0, 3.0)])).unwrap();
        let err = receiver.decompress(&payload).unwrap_err();
        assert!(matches!(err, DispatchError::Codec { pass: Pass::Decompress, codec: "gzip", .. }));
    }
}
