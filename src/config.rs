//! YAML and environment configuration
//!
//! Both ends are configured from an optional YAML document in which every field
//! has a default, then from `LIDARCAST_*` environment variables, then validated
//! once before any stage is built:
//!
//! ```yaml
//! # sender
//! listen: 0.0.0.0:2368
//! server: receiver.local:8081
//! filter_radius: 0.5
//! codecs:
//!   - type: voxel
//!     voxel_size: 0.05
//!   - type: gzip
//!     level: 6
//! ca_cert: /etc/lidarcast/ca.pem
//! ```
//!
//! The codec chain must be identical, in the same order, on both ends.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec::CodecSpec;
use crate::transport::wire::{
    DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_READ_CHUNK, DEFAULT_STAGING_CAPACITY, DEFAULT_WRITE_CHUNK,
};
use crate::transport::{ClientTrust, ReceiverOptions, SenderOptions, ServerIdentity};
use crate::{DispatchError, Result};

/// Environment variable naming the config file when no path is given.
pub const CONFIG_ENV: &str = "LIDARCAST_CONFIG";

fn default_codecs() -> Vec<CodecSpec> {
    vec![CodecSpec::Voxel { voxel_size: 0.05 }, CodecSpec::Gzip { level: 6 }]
}

/// Capture replay in place of the live UDP socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaySettings {
    pub path: PathBuf,
    #[serde(default)]
    pub looping: bool,
}

/// Sender QUIC tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderTransport {
    pub connect_timeout_ms: u64,
    pub open_timeout_ms: u64,
    /// 0 disables keep-alives
    pub keep_alive_ms: u64,
    pub idle_timeout_ms: u64,
    pub write_chunk: usize,
    pub staging_capacity: usize,
}

impl Default for SenderTransport {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            open_timeout_ms: 5_000,
            keep_alive_ms: 1_000,
            idle_timeout_ms: 600_000,
            write_chunk: DEFAULT_WRITE_CHUNK,
            staging_capacity: DEFAULT_STAGING_CAPACITY,
        }
    }
}

/// Sender process configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// UDP address the sensor sends to
    pub listen: SocketAddr,
    /// Receiver `host:port`
    pub server: String,
    /// TLS name expected on the receiver's certificate
    pub server_name: String,
    /// Near-origin filter cube half-width in metres; 0 disables
    pub filter_radius: f32,
    pub codecs: Vec<CodecSpec>,
    pub queue_capacity: usize,
    /// Skip server certificate verification
    pub insecure: bool,
    pub ca_cert: Option<PathBuf>,
    pub replay: Option<ReplaySettings>,
    pub transport: SenderTransport,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 2368)),
            server: "localhost:8081".to_string(),
            server_name: "localhost".to_string(),
            filter_radius: 0.5,
            codecs: default_codecs(),
            queue_capacity: 1024,
            insecure: false,
            ca_cert: None,
            replay: None,
            transport: SenderTransport::default(),
        }
    }
}

/// Receiver QUIC tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverTransport {
    pub accept_timeout_ms: u64,
    /// 0 disables keep-alives
    pub keep_alive_ms: u64,
    pub idle_timeout_ms: u64,
    pub read_chunk: usize,
    pub accumulation_capacity: usize,
    pub max_message_size: usize,
}

impl Default for ReceiverTransport {
    fn default() -> Self {
        Self {
            accept_timeout_ms: 5_000,
            keep_alive_ms: 1_000,
            idle_timeout_ms: 600_000,
            read_chunk: DEFAULT_READ_CHUNK,
            accumulation_capacity: DEFAULT_STAGING_CAPACITY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Receiver process configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// QUIC listen address
    pub listen: SocketAddr,
    pub codecs: Vec<CodecSpec>,
    pub queue_capacity: usize,
    /// Frames buffered per fan-out subscriber
    pub hub_capacity: usize,
    /// Expected frame rate, used to normalize subscription rates
    pub source_hz: f64,
    /// Serve an ephemeral self-signed certificate
    pub insecure: bool,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    /// Allowed origin for an external fan-out layer; unused by the pipeline
    pub cors_origin: String,
    pub transport: ReceiverTransport,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8081)),
            codecs: default_codecs(),
            queue_capacity: 1024,
            hub_capacity: 16,
            source_hz: 10.0,
            insecure: false,
            cert: None,
            key: None,
            cors_origin: "*".to_string(),
            transport: ReceiverTransport::default(),
        }
    }
}

/// Read and parse a YAML document; `None` (and no `LIDARCAST_CONFIG`) yields defaults.
fn read_document<T>(path: Option<&Path>) -> Result<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let Some(path) = path.map(Path::to_path_buf).or(from_env) else {
        debug!("No configuration file, using defaults");
        return Ok(T::default());
    };

    let text = std::fs::read_to_string(&path)
        .map_err(|source| DispatchError::ConfigFile { path: path.clone(), source })?;
    debug!(path = %path.display(), "Loaded configuration file");
    parse_document(&text, &path.display().to_string())
}

fn parse_document<T>(text: &str, context: &str) -> Result<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    if text.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml_ng::from_str(text)
        .map_err(|e| DispatchError::Parse { context: context.to_string(), details: e.to_string() })
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| DispatchError::Parse { context: name.to_string(), details: e.to_string() })
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(DispatchError::Parse { context: name.to_string(), details: format!("not a boolean: {other}") }),
    }
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

fn keep_alive(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| millis(ms))
}

fn validate_codecs(codecs: &[CodecSpec]) -> Result<()> {
    for (stage, spec) in codecs.iter().enumerate() {
        spec.build().map_err(|e| DispatchError::config(format!("codec stage {stage} ({}): {e}", spec.name())))?;
    }
    Ok(())
}

fn require_positive(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(DispatchError::config(format!("{name} must be greater than 0")));
    }
    Ok(())
}

/// Replace the voxel stage's size, or prepend a voxel stage if there is none.
fn set_voxel_size(codecs: &mut Vec<CodecSpec>, size: f32) {
    let mut found = false;
    for spec in codecs.iter_mut() {
        if let CodecSpec::Voxel { voxel_size } = spec {
            *voxel_size = size;
            found = true;
        }
    }
    if !found {
        codecs.insert(0, CodecSpec::Voxel { voxel_size: size });
    }
}

impl SenderConfig {
    /// Load from a file (or `LIDARCAST_CONFIG`), apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config: Self = read_document(path)?;
        config.apply_env_from(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document without environment overrides or validation
    pub fn from_yaml(text: &str) -> Result<Self> {
        parse_document(text, "sender configuration")
    }

    /// Apply `LIDARCAST_*` overrides from a variable lookup
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("LIDARCAST_LISTEN") {
            self.listen = parse_var("LIDARCAST_LISTEN", &v)?;
        }
        if let Some(v) = lookup("LIDARCAST_SERVER") {
            self.server = v.trim().to_string();
        }
        if let Some(v) = lookup("LIDARCAST_FILTER_RADIUS") {
            self.filter_radius = parse_var("LIDARCAST_FILTER_RADIUS", &v)?;
        }
        if let Some(v) = lookup("LIDARCAST_VOXEL_SIZE") {
            set_voxel_size(&mut self.codecs, parse_var("LIDARCAST_VOXEL_SIZE", &v)?);
        }
        if let Some(v) = lookup("LIDARCAST_INSECURE") {
            self.insecure = parse_bool("LIDARCAST_INSECURE", &v)?;
        }
        if let Some(v) = lookup("LIDARCAST_CA_CERT") {
            self.ca_cert = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Check every value before the pipeline is built
    pub fn validate(&self) -> Result<()> {
        if !self.filter_radius.is_finite() || self.filter_radius < 0.0 {
            return Err(DispatchError::config(format!(
                "filter_radius must be finite and >= 0, got {}",
                self.filter_radius
            )));
        }
        validate_codecs(&self.codecs)?;
        require_positive("queue_capacity", self.queue_capacity)?;
        require_positive("transport.write_chunk", self.transport.write_chunk)?;
        require_positive("transport.staging_capacity", self.transport.staging_capacity)?;
        if self.server.trim().is_empty() {
            return Err(DispatchError::config("server address is empty"));
        }
        self.trust()?;
        Ok(())
    }

    /// How to authenticate the receiver; a CA file unless insecure mode is set.
    pub fn trust(&self) -> Result<ClientTrust> {
        match (&self.ca_cert, self.insecure) {
            (_, true) => Ok(ClientTrust::Insecure),
            (Some(path), false) => Ok(ClientTrust::CaFile(path.clone())),
            (None, false) => Err(DispatchError::config("ca_cert is required unless insecure is set")),
        }
    }

    /// Transport options for [`TransportSender::connect`](crate::transport::TransportSender::connect)
    pub fn sender_options(&self) -> Result<SenderOptions> {
        let t = &self.transport;
        Ok(SenderOptions {
            server_name: self.server_name.clone(),
            connect_timeout: millis(t.connect_timeout_ms),
            open_timeout: millis(t.open_timeout_ms),
            keep_alive: keep_alive(t.keep_alive_ms),
            idle_timeout: millis(t.idle_timeout_ms),
            write_chunk: t.write_chunk,
            staging_capacity: t.staging_capacity,
            ..SenderOptions::new(self.trust()?)
        })
    }
}

impl ReceiverConfig {
    /// Load from a file (or `LIDARCAST_CONFIG`), apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config: Self = read_document(path)?;
        config.apply_env_from(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document without environment overrides or validation
    pub fn from_yaml(text: &str) -> Result<Self> {
        parse_document(text, "receiver configuration")
    }

    /// Apply `LIDARCAST_*` overrides from a variable lookup
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("LIDARCAST_LISTEN") {
            self.listen = parse_var("LIDARCAST_LISTEN", &v)?;
        }
        if let Some(v) = lookup("LIDARCAST_VOXEL_SIZE") {
            set_voxel_size(&mut self.codecs, parse_var("LIDARCAST_VOXEL_SIZE", &v)?);
        }
        if let Some(v) = lookup("LIDARCAST_INSECURE") {
            self.insecure = parse_bool("LIDARCAST_INSECURE", &v)?;
        }
        if let Some(v) = lookup("LIDARCAST_CERT") {
            self.cert = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("LIDARCAST_KEY") {
            self.key = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Check every value before the pipeline is built
    pub fn validate(&self) -> Result<()> {
        validate_codecs(&self.codecs)?;
        require_positive("queue_capacity", self.queue_capacity)?;
        require_positive("hub_capacity", self.hub_capacity)?;
        require_positive("transport.read_chunk", self.transport.read_chunk)?;
        require_positive("transport.accumulation_capacity", self.transport.accumulation_capacity)?;
        require_positive("transport.max_message_size", self.transport.max_message_size)?;
        if !self.source_hz.is_finite() || self.source_hz <= 0.0 {
            return Err(DispatchError::config(format!("source_hz must be > 0, got {}", self.source_hz)));
        }
        if !self.insecure && (self.cert.is_none() || self.key.is_none()) {
            return Err(DispatchError::config("cert and key are required unless insecure is set"));
        }
        Ok(())
    }

    /// Certificate identity to serve
    pub fn identity(&self) -> Result<ServerIdentity> {
        match (&self.cert, &self.key, self.insecure) {
            (Some(cert), Some(key), false) => Ok(ServerIdentity::PemFiles { cert: cert.clone(), key: key.clone() }),
            (_, _, true) => {
                warn!("Insecure transport: serving an ephemeral self-signed certificate");
                ServerIdentity::self_signed(vec!["localhost".to_string()])
            }
            _ => Err(DispatchError::config("cert and key are required unless insecure is set")),
        }
    }

    /// Transport options for [`TransportReceiver::bind`](crate::transport::TransportReceiver::bind)
    pub fn receiver_options(&self) -> Result<ReceiverOptions> {
        let t = &self.transport;
        Ok(ReceiverOptions {
            accept_timeout: millis(t.accept_timeout_ms),
            keep_alive: keep_alive(t.keep_alive_ms),
            idle_timeout: millis(t.idle_timeout_ms),
            read_chunk: t.read_chunk,
            accumulation_capacity: t.accumulation_capacity,
            max_message_size: t.max_message_size,
            ..ReceiverOptions::new(self.identity()?)
        })
    }
}
