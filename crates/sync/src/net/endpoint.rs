use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::jitter::Sink;
use super::protocol::MAX_PACKET_SIZE;
use super::stats::NetworkStats;

/// Raw datagram as it crossed the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub addr: SocketAddr,
    pub bytes: Vec<u8>,
}

impl Datagram {
    pub fn new(addr: SocketAddr, bytes: Vec<u8>) -> Self {
        Self { addr, bytes }
    }
}

/// Non-blocking UDP socket that feeds received datagrams into a jitter buffer.
///
/// Frames are opaque here; checksums and decoding happen on the simulation
/// side when the buffer is drained.
pub struct UdpEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    stats: NetworkStats,
    recv_buffer: [u8; MAX_PACKET_SIZE],
    running: Arc<AtomicBool>,
}

impl UdpEndpoint {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            stats: NetworkStats::default(),
            recv_buffer: [0u8; MAX_PACKET_SIZE],
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn send(&mut self, datagram: &Datagram) -> io::Result<usize> {
        if datagram.bytes.len() > MAX_PACKET_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Packet exceeds MTU",
            ));
        }

        let bytes = self.socket.send_to(&datagram.bytes, datagram.addr)?;

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += bytes as u64;

        Ok(bytes)
    }

    /// Reads until the socket would block. Returns how many datagrams were
    /// queued.
    pub fn receive_into<S: Sink<Datagram>>(&mut self, inbox: &S) -> io::Result<usize> {
        let mut count = 0;

        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => {
                    self.stats.packets_received += 1;
                    self.stats.bytes_received += size as u64;

                    if inbox.push(Datagram::new(addr, self.recv_buffer[..size].to_vec())) {
                        self.stats.packets_discarded += 1;
                    }
                    count += 1;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                // ICMP port unreachable from a vanished peer surfaces here on some platforms
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(count)
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::jitter::packet_buffer;

    #[test]
    fn loopback_datagram_reaches_inbox() {
        let mut a = UdpEndpoint::bind("127.0.0.1:0").unwrap();
        let mut b = UdpEndpoint::bind("127.0.0.1:0").unwrap();
        let (tx, rx) = packet_buffer(8);

        a.send(&Datagram::new(b.local_addr(), vec![1, 2, 3])).unwrap();

        let start = std::time::Instant::now();
        while rx.is_empty() && start.elapsed() < std::time::Duration::from_secs(1) {
            b.receive_into(&tx).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let datagram = rx.get().unwrap();
        assert_eq!(datagram.bytes, vec![1, 2, 3]);
        assert_eq!(datagram.addr, a.local_addr());
        assert_eq!(b.stats().packets_received, 1);
    }

    #[test]
    fn oversized_datagram_is_refused() {
        let mut a = UdpEndpoint::bind("127.0.0.1:0").unwrap();
        let target = a.local_addr();
        let err = a
            .send(&Datagram::new(target, vec![0; MAX_PACKET_SIZE + 1]))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
