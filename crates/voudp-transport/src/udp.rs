//! UDP socket implementation using tokio.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::{DatagramSocket, TransportError};

/// A bound UDP socket shared by the receive loop and every session task.
///
/// `UdpSocket` methods take `&self`, so one socket behind an `Arc` serves
/// concurrent senders without a lock.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        tracing::info!(addr, "UDP transport listening");
        Ok(Self { socket })
    }
}

impl DatagramSocket for UdpTransport {
    async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<(), TransportError> {
        self.socket
            .send_to(data, addr)
            .await
            .map_err(TransportError::SendFailed)?;
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), TransportError> {
        self.socket
            .recv_from(buf)
            .await
            .map_err(TransportError::ReceiveFailed)
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::LocalAddr)
    }
}
