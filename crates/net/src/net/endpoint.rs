use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;

use super::connection::Connection;
use super::datagram::DatagramHeader;
use super::events::{DeliveryFailure, TransportError, TransportEvent};
use crate::protocol::{DeliveryMethod, MAX_PACKET_SIZE};

/// Rejects payloads that would not fit one datagram once framed.
pub(crate) fn ensure_fits(
    payload_len: usize,
    delivery: DeliveryMethod,
) -> Result<(), TransportError> {
    let message_id = if delivery.is_reliable() { 4 } else { 0 };
    let size = DatagramHeader::SIZE + message_id + payload_len;
    if size > MAX_PACKET_SIZE {
        return Err(TransportError::TooLarge {
            size,
            max: MAX_PACKET_SIZE,
        });
    }
    Ok(())
}

/// Nonblocking UDP socket that moves raw datagrams.
pub struct NetworkEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    running: AtomicBool,
}

impl NetworkEndpoint {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            running: AtomicBool::new(true),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn send_to(&self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        if data.len() > MAX_PACKET_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Packet exceeds MTU",
            ));
        }

        self.socket.send_to(data, addr)
    }

    /// Sends a framed datagram to `connection`, turning socket failures into
    /// delivery events.
    pub(crate) fn transmit(
        &self,
        connection: &mut Connection,
        datagram: &[u8],
        events: &mut VecDeque<TransportEvent>,
    ) {
        if !connection.record_sent(datagram.len()) {
            log::trace!("Simulated loss of {} bytes to {}", datagram.len(), connection.addr);
            return;
        }

        if let Err(e) = self.send_to(datagram, connection.addr) {
            log::debug!("Send to {} failed: {}", connection.addr, e);
            let failure = if e.kind() == io::ErrorKind::WouldBlock {
                DeliveryFailure::SendBufferFull
            } else {
                DeliveryFailure::Io(e.kind())
            };
            events.push_back(TransportEvent::DeliveryFailed {
                connection: connection.id,
                failure,
            });
        }
    }

    /// Drains everything currently queued on the socket.
    pub fn receive(&self) -> io::Result<Vec<(Bytes, SocketAddr)>> {
        let mut recv_buffer = [0u8; MAX_PACKET_SIZE];
        let mut datagrams = Vec::new();

        loop {
            match self.socket.recv_from(&mut recv_buffer) {
                Ok((size, addr)) => {
                    if size < DatagramHeader::SIZE {
                        continue;
                    }
                    datagrams.push((Bytes::copy_from_slice(&recv_buffer[..size]), addr));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                // ICMP port unreachable from an earlier send surfaces here on some platforms
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(datagrams)
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
