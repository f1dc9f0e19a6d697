//! UDP transport for S20 devices.
//!
//! The transport knows about sockets and bytes, nothing about frames. Each
//! task opens a fresh [`Endpoint`], sends one frame and then waits for
//! replies, one bounded wait at a time, until a wait times out.
//!
//! # Design
//!
//! - **One socket per task** - opened, used and dropped by the task engine
//! - **Fixed port** - bound to the protocol port on the wildcard address,
//!   since devices reply to that port rather than to the sender's port
//! - **Non-blocking** - waits poll the socket and never block past the
//!   configured timeout
//!
//! [`Transport`] and [`Endpoint`] are traits so the task engine can be
//! driven by a scripted transport in tests.
//!
//! # Constants
//!
//! - [`DEFAULT_PORT`] - protocol UDP port (10000)
//! - [`DEFAULT_TIMEOUT`] - per-wait timeout (500 ms)
//! - [`MAX_PACKET_SIZE`] - receive buffer size (1024 bytes)
//!
//! # Example
//!
//! ```no_run
//! use orvibo_s20::{Endpoint, Transport, UdpTransport};
//! use std::net::{Ipv4Addr, SocketAddrV4};
//!
//! let mut transport = UdpTransport::new(10000, std::time::Duration::from_millis(500));
//! let mut endpoint = transport.open(true).unwrap();
//!
//! endpoint
//!     .send_to(b"hd\x00\x06qa", SocketAddrV4::new(Ipv4Addr::BROADCAST, 10000))
//!     .unwrap();
//!
//! let mut buf = [0u8; orvibo_s20::MAX_PACKET_SIZE];
//! while let Some((len, from)) = endpoint.recv_from(&mut buf).unwrap() {
//!     println!("{} bytes from {}", len, from);
//! }
//! ```

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::error::Result;

/// Protocol UDP port.
pub const DEFAULT_PORT: u16 = 10000;

/// Default per-wait receive timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Receive buffer size.
pub const MAX_PACKET_SIZE: usize = 1024;

/// Sleep between polls of an idle socket.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Opens endpoints for tasks.
pub trait Transport {
    /// Endpoint type produced by [`open`](Transport::open).
    type Endpoint: Endpoint;

    /// Opens an endpoint, with broadcast enabled if requested.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the socket cannot be created, configured or bound.
    fn open(&mut self, broadcast: bool) -> Result<Self::Endpoint>;
}

/// An open socket for one task.
pub trait Endpoint {
    /// Sends one frame.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the send fails.
    fn send_to(&mut self, frame: &[u8], target: SocketAddrV4) -> Result<usize>;

    /// Waits for one datagram.
    ///
    /// Returns `Ok(None)` when the wait times out.
    ///
    /// # Errors
    ///
    /// Returns an I/O error for any receive failure other than a timeout.
    fn recv_from(&mut self, buf: &mut [u8]) -> Result<Option<(usize, Ipv4Addr)>>;

    /// Discards datagrams already queued on the socket.
    ///
    /// Returns the number of datagrams discarded.
    fn drain_pending(&mut self) -> Result<usize>;
}

/// Permission to send broadcasts, requested when a broadcast endpoint opens.
///
/// Platforms that gate broadcast behind a privilege implement this to
/// acquire it; the default grants it unconditionally.
pub trait BroadcastCapability: Send {
    /// Acquires the capability.
    ///
    /// # Errors
    ///
    /// Returns an error if the capability cannot be acquired.
    fn acquire(&mut self) -> Result<()>;
}

/// Broadcast needs no privilege.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unrestricted;

impl BroadcastCapability for Unrestricted {
    fn acquire(&mut self) -> Result<()> {
        Ok(())
    }
}

/// UDP transport over the system socket API.
pub struct UdpTransport {
    port: u16,
    timeout: Duration,
    capability: Box<dyn BroadcastCapability>,
}

impl UdpTransport {
    /// Creates a transport binding `port` with the given per-wait timeout.
    ///
    /// No socket is opened until [`Transport::open`].
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self {
            port,
            timeout,
            capability: Box::new(Unrestricted),
        }
    }

    /// Replaces the broadcast capability provider.
    pub fn with_capability(mut self, capability: impl BroadcastCapability + 'static) -> Self {
        self.capability = Box::new(capability);
        self
    }

    /// Returns the bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the per-wait timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_PORT, DEFAULT_TIMEOUT)
    }
}

impl fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpTransport")
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Transport for UdpTransport {
    type Endpoint = UdpEndpoint;

    fn open(&mut self, broadcast: bool) -> Result<UdpEndpoint> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;

        if broadcast {
            self.capability.acquire()?;
            socket.set_broadcast(true)?;
            socket.set_multicast_loop_v4(false)?;
        }

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.port);
        socket.bind(&SockAddr::from(bind_addr))?;
        debug!("opened socket on {} (broadcast: {})", bind_addr, broadcast);

        Ok(UdpEndpoint {
            socket: UdpSocket::from(socket),
            timeout: self.timeout,
        })
    }
}

/// Socket opened by [`UdpTransport`].
#[derive(Debug)]
pub struct UdpEndpoint {
    socket: UdpSocket,
    timeout: Duration,
}

impl UdpEndpoint {
    /// Returns the local socket address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if is_would_block(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Endpoint for UdpEndpoint {
    fn send_to(&mut self, frame: &[u8], target: SocketAddrV4) -> Result<usize> {
        Ok(self.socket.send_to(frame, target)?)
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> Result<Option<(usize, Ipv4Addr)>> {
        let start = Instant::now();
        loop {
            match self.try_recv(buf)? {
                Some((len, SocketAddr::V4(from))) => return Ok(Some((len, *from.ip()))),
                Some((_, from)) => trace!("ignoring datagram from {}", from),
                None => {
                    if start.elapsed() >= self.timeout {
                        return Ok(None);
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }

    fn drain_pending(&mut self) -> Result<usize> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let mut drained = 0;
        while self.try_recv(&mut buf)?.is_some() {
            drained += 1;
        }
        if drained > 0 {
            trace!("drained {} stale datagram(s)", drained);
        }
        Ok(drained)
    }
}

fn is_would_block(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
