//! Error types for the lidar streaming pipeline.
//!
//! Every failure in the system falls into one of four categories:
//!
//! - **Malformed input**: a datagram of the wrong size, or a serialized frame whose
//!   length is not a whole number of point records
//! - **Codec**: a compression stage rejected its input (corrupt, truncated or
//!   produced by a different codec chain)
//! - **Transport**: connecting, binding, opening or reading a stream failed, or a
//!   message arrived truncated
//! - **Configuration**: invalid settings detected before the pipeline is built
//!
//! Backpressure drops are not errors and never surface here.
//!
//! ## Propagation
//!
//! Most errors are local to a single unit of work (one packet, one frame, one
//! stream): the caller logs them, discards the unit and moves on. A small set are
//! fatal to the process and should end it so that external supervision restarts it:
//!
//! ```rust
//! use lidarcast::DispatchError;
//!
//! let error = DispatchError::connect_failed("10.0.0.2:8081", "handshake timed out");
//! assert!(error.is_fatal());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//!
//! let error = DispatchError::Truncated { expected: 4096, received: 1000 };
//! assert!(!error.is_fatal());
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T, E = DispatchError> = std::result::Result<T, E>;

/// Direction a codec chain is being applied in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Send path: stages applied in configured order.
    Compress,
    /// Receive path: stages applied in reverse order.
    Decompress,
}

impl std::fmt::Display for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pass::Compress => f.write_str("compress"),
            Pass::Decompress => f.write_str("decompress"),
        }
    }
}

/// Error raised by a single codec stage.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CodecError {
    #[error("Point buffer of {len} bytes is not a multiple of 12")]
    PointBuffer { len: usize },

    #[error("Deflate stream error")]
    Stream(#[from] std::io::Error),

    #[error("Decompressed output exceeds {limit} bytes")]
    OutputLimit { limit: usize },

    #[error("Invalid codec parameter: {details}")]
    InvalidParameter { details: String },
}

/// Coarse classification used for logging and propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    MalformedInput,
    Codec,
    Transport,
    Configuration,
}

/// Main error type for the pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DispatchError {
    #[error("Malformed sensor packet: expected {expected} bytes, got {actual}")]
    PacketSize { expected: usize, actual: usize },

    #[error("Serialized frame of {len} bytes is not a multiple of 12")]
    FrameLength { len: usize },

    #[error("Codec stage {stage} ({codec}) failed to {pass}")]
    Codec {
        stage: usize,
        codec: &'static str,
        pass: Pass,
        #[source]
        source: CodecError,
    },

    #[error("Failed to connect to {addr}: {reason}")]
    Connect {
        addr: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error: {reason}")]
    Stream {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Message truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },

    #[error("Message of {len} bytes exceeds the {max} byte limit")]
    Oversized { len: usize, max: usize },

    #[error("{operation} timed out after {duration:?}")]
    Timeout { operation: &'static str, duration: Duration },

    #[error("TLS setup failed: {reason}")]
    Tls { reason: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Configuration file error: {}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Stage queue '{queue}' is closed")]
    QueueClosed { queue: &'static str },

    #[error("Pipeline task '{task}' aborted: {reason}")]
    TaskFailed { task: &'static str, reason: String },
}

impl DispatchError {
    /// Returns the taxonomy bucket this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            DispatchError::PacketSize { .. } => ErrorCategory::MalformedInput,
            DispatchError::FrameLength { .. } => ErrorCategory::MalformedInput,
            DispatchError::Codec { .. } => ErrorCategory::Codec,
            DispatchError::Connect { .. } => ErrorCategory::Transport,
            DispatchError::Bind { .. } => ErrorCategory::Transport,
            DispatchError::Stream { .. } => ErrorCategory::Transport,
            DispatchError::Truncated { .. } => ErrorCategory::Transport,
            DispatchError::Oversized { .. } => ErrorCategory::Transport,
            DispatchError::Timeout { .. } => ErrorCategory::Transport,
            DispatchError::QueueClosed { .. } => ErrorCategory::Transport,
            DispatchError::TaskFailed { .. } => ErrorCategory::Transport,
            DispatchError::Tls { .. } => ErrorCategory::Configuration,
            DispatchError::Config { .. } => ErrorCategory::Configuration,
            DispatchError::ConfigFile { .. } => ErrorCategory::Configuration,
            DispatchError::Parse { .. } => ErrorCategory::Configuration,
        }
    }

    /// Returns whether this error should terminate the process.
    ///
    /// Connection establishment, listener binding and configuration problems are
    /// fatal; everything else only costs the current packet, frame or stream.
    pub fn is_fatal(&self) -> bool {
        match self {
            DispatchError::Connect { .. } => true,
            DispatchError::Bind { .. } => true,
            DispatchError::Tls { .. } => true,
            DispatchError::Config { .. } => true,
            DispatchError::ConfigFile { .. } => true,
            DispatchError::Parse { .. } => true,
            DispatchError::TaskFailed { .. } => true,
            DispatchError::PacketSize { .. } => false,
            DispatchError::FrameLength { .. } => false,
            DispatchError::Codec { .. } => false,
            DispatchError::Stream { .. } => false,
            DispatchError::Truncated { .. } => false,
            DispatchError::Oversized { .. } => false,
            DispatchError::Timeout { .. } => false,
            DispatchError::QueueClosed { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            DispatchError::PacketSize { .. } => vec![
                "Check that the sensor is configured for single-return 1206-byte packets",
                "Verify nothing else is sending to the ingestion port",
            ],
            DispatchError::FrameLength { .. } | DispatchError::Codec { .. } => vec![
                "Verify both ends use the same codec chain in the same order",
                "Check for payload corruption between sender and receiver",
            ],
            DispatchError::Connect { .. } => vec![
                "Check that the receiver is running and reachable",
                "Verify the server address, port and TLS server name",
                "Check firewall rules for UDP traffic on the QUIC port",
            ],
            DispatchError::Bind { .. } => vec![
                "Check that no other process is bound to the address",
                "Verify the listen address exists on this host",
            ],
            DispatchError::Stream { .. }
            | DispatchError::Truncated { .. }
            | DispatchError::Timeout { .. } => vec![
                "Check link quality between sender and receiver",
                "Inspect the peer's logs for stream resets",
            ],
            DispatchError::Oversized { .. } => vec![
                "Raise max_message_size on the receiver",
                "Enable the voxel codec to shrink frames before transmission",
            ],
            DispatchError::Tls { .. } => vec![
                "Check certificate and key PEM files are readable and match",
                "Use insecure mode only for bench testing",
            ],
            DispatchError::Config { .. }
            | DispatchError::ConfigFile { .. }
            | DispatchError::Parse { .. } => vec![
                "Check the YAML configuration file syntax and values",
                "Check LIDARCAST_* environment overrides",
            ],
            DispatchError::QueueClosed { .. } => vec!["Check whether a downstream stage exited early"],
            DispatchError::TaskFailed { .. } => vec!["Check the logs for a panic in the named stage"],
        }
    }

    /// Helper constructor for connection failures.
    pub fn connect_failed(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        DispatchError::Connect { addr: addr.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for connection failures with source.
    pub fn connect_failed_with_source(
        addr: impl Into<String>,
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DispatchError::Connect {
            addr: addr.into(),
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Helper constructor for per-stream failures.
    pub fn stream_error(reason: impl Into<String>) -> Self {
        DispatchError::Stream { reason: reason.into(), source: None }
    }

    /// Helper constructor for per-stream failures with source.
    pub fn stream_error_with_source(
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DispatchError::Stream { reason: reason.into(), source: Some(Box::new(source)) }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        DispatchError::Config { reason: reason.into() }
    }

    /// Helper constructor for TLS errors.
    pub fn tls(reason: impl std::fmt::Display) -> Self {
        DispatchError::Tls { reason: reason.to_string() }
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        DispatchError::Stream { reason: err.to_string(), source: Some(Box::new(err)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn error_messages_carry_their_context(
                reason in ".*",
                addr in "[a-z0-9.]{1,20}:[0-9]{1,5}",
                expected in 1usize..1_000_000,
                received in 0usize..1_000_000,
                len in 0usize..100_000,
            ) {
                let connect = DispatchError::connect_failed(addr.clone(), reason.clone());
                let msg = connect.to_string();
                prop_assert!(msg.contains(&addr));
                prop_assert!(msg.contains(&reason));

                let truncated = DispatchError::Truncated { expected, received };
                let msg = truncated.to_string();
                prop_assert!(msg.contains(&expected.to_string()));
                prop_assert!(msg.contains(&received.to_string()));

                let frame = DispatchError::FrameLength { len };
                prop_assert!(frame.to_string().contains(&len.to_string()));
            }

            #[test]
            fn codec_errors_chain_to_their_source(len in 0usize..100_000, stage in 0usize..8) {
                let err = DispatchError::Codec {
                    stage,
                    codec: "voxel",
                    pass: Pass::Compress,
                    source: CodecError::PointBuffer { len },
                };

                let source = std::error::Error::source(&err).expect("codec error has a source");
                prop_assert!(source.to_string().contains(&len.to_string()));
                prop_assert_eq!(err.category(), ErrorCategory::Codec);
                prop_assert!(!err.is_fatal());
            }
        }
    }

    #[test]
    fn fatal_errors_match_propagation_policy() {
        assert!(DispatchError::connect_failed("host:1", "refused").is_fatal());
        assert!(
            DispatchError::Bind {
                addr: "0.0.0.0:1".into(),
                source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
            }
            .is_fatal()
        );
        assert!(DispatchError::config("bad").is_fatal());

        assert!(!DispatchError::PacketSize { expected: 1206, actual: 10 }.is_fatal());
        assert!(!DispatchError::stream_error("reset").is_fatal());
        assert!(!DispatchError::Truncated { expected: 10, received: 9 }.is_fatal());
        assert!(!DispatchError::QueueClosed { queue: "ingest" }.is_fatal());
    }

    #[test]
    fn categories_follow_taxonomy() {
        assert_eq!(
            DispatchError::PacketSize { expected: 1206, actual: 1 }.category(),
            ErrorCategory::MalformedInput
        );
        assert_eq!(DispatchError::FrameLength { len: 13 }.category(), ErrorCategory::MalformedInput);
        assert_eq!(
            DispatchError::Truncated { expected: 2, received: 1 }.category(),
            ErrorCategory::Transport
        );
        assert_eq!(DispatchError::config("x").category(), ErrorCategory::Configuration);
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<DispatchError>();
        assert_send_sync_static::<CodecError>();
    }

    #[test]
    fn recovery_suggestions_are_never_empty() {
        let errors = vec![
            DispatchError::PacketSize { expected: 1206, actual: 0 },
            DispatchError::FrameLength { len: 1 },
            DispatchError::connect_failed("a", "b"),
            DispatchError::stream_error("x"),
            DispatchError::Oversized { len: 10, max: 5 },
            DispatchError::tls("bad key"),
            DispatchError::config("bad"),
            DispatchError::QueueClosed { queue: "frames" },
            DispatchError::TaskFailed { task: "ingest", reason: "panicked".into() },
        ];
        for error in errors {
            assert!(!error.recovery_suggestions().is_empty(), "{error:?}");
        }
    }

    #[test]
    fn io_errors_become_stream_errors() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset");
        let err: DispatchError = io_err.into();
        match err {
            DispatchError::Stream { reason, source } => {
                assert!(reason.contains("peer reset"));
                assert!(source.is_some());
            }
            other => panic!("Expected Stream error, got {other:?}"),
        }
    }
}
