//! Encrypted, multiplexed transport between sender and receiver.
//!
//! The sender holds one QUIC connection and opens a unidirectional stream per
//! compressed frame. Each stream carries length-prefixed messages (see [`wire`]).
//! The receiver services every connection and every stream in its own task and
//! offers each reconstructed payload to a bounded queue.

mod receiver;
mod sender;
pub mod tls;
pub mod wire;

pub use receiver::{ReceiverOptions, TransportReceiver};
pub use sender::{SendSummary, SenderOptions, TransportSender};
pub use tls::{ClientTrust, ServerIdentity};
