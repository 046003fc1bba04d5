//! Transport layer for VoUDP.
//!
//! Everything between the UDP socket and the packet codec:
//!
//! - [`crypto`]: the ChaCha20-Poly1305 envelope, per-session nonce
//!   sequences and inbound replay windows.
//! - [`reliable`]: sequence headers, ACKs and retransmission bookkeeping.
//! - [`DatagramSocket`] / [`UdpTransport`]: the socket itself.
//!
//! ```text
//! socket → open (auth) → replay check → Frame::parse → codec
//! codec → wrap (reliable kinds) → seal → socket
//! ```

#![allow(async_fn_in_trait)]

pub mod crypto;
mod error;
pub mod reliable;
mod udp;
mod window;

pub use crypto::{Cipher, NonceSequence, Opened, ReplayWindow, SecretKey};
pub use error::{AuthError, FrameError, ReliabilityTimeout, SealError, TransportError};
pub use reliable::{Delivery, Frame, ReliableConfig, ReliableReceiver, ReliableSender, Retransmit};
pub use udp::UdpTransport;
pub use window::{Seen, SlidingWindow};

use std::net::SocketAddr;

/// Largest datagram the engine sends or accepts.
pub const MAX_DATAGRAM: usize = 2048;

/// An unconnected datagram socket.
pub trait DatagramSocket: Send + Sync + 'static {
    /// Sends one datagram to `addr`.
    async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<(), TransportError>;

    /// Waits for the next datagram and returns its length and sender.
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), TransportError>;

    fn local_addr(&self) -> Result<SocketAddr, TransportError>;
}
