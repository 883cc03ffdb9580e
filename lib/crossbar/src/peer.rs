use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::ToSocketAddrs;

use mio::net::TcpStream;
#[cfg(unix)]
use mio::net::UnixStream;
use mio::{Interest, Token};

use plinth::logging::{self, debug, trace};

use crate::config::MiddlewareConfig;
use crate::error::{Error, Result};
use crate::protocol::version::{ProtocolVersion, UNKNOWN_VERSION};
use crate::protocol::PeerInfo;
use crate::service::ServiceDescriptor;
use crate::uri::{Uri, UriKind};
use crate::wire::envelope::SerializedMessage;

/// Index of a peer in the connection's peer table. Stable while the peer is
/// alive; slots are recycled after shutdown.
pub type PeerId = usize;

/// Frames larger than this are treated as corruption and close the peer.
pub const MAX_FRAME_SIZE: usize = 256 * 1024;

const MIN_FRAME_SIZE: usize = 5;
const READ_CHUNK: usize = 8192;

/// Accumulates raw socket bytes and splits off complete length-prefixed
/// frames.
pub struct FrameAssembler {
    rx: Vec<u8>,
}

impl FrameAssembler {
    #[inline]
    pub fn new() -> FrameAssembler {
        FrameAssembler { rx: Vec::new() }
    }

    #[inline]
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.rx.extend_from_slice(bytes);
    }

    /// Splits off the next complete frame, or returns `None` until enough
    /// bytes have arrived. A zero, undersized or oversized length prefix is
    /// a fatal framing error.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.rx.len() < 4 {
            return Ok(None);
        }

        let size = u32::from_le_bytes([self.rx[0], self.rx[1], self.rx[2], self.rx[3]]) as usize;

        if size < MIN_FRAME_SIZE || size > MAX_FRAME_SIZE {
            return Err(Error::Protocol(format!("invalid frame size {}", size)));
        }

        if self.rx.len() < size {
            return Ok(None);
        }

        let frame = self.rx.drain(..size).collect();
        Ok(Some(frame))
    }
}

enum Transport {
    Tcp(TcpStream),
    #[cfg(unix)]
    Local(UnixStream),
}

impl Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Transport::Local(stream) => stream.read(buf),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Transport::Local(stream) => stream.write(buf),
        }
    }

    fn register(&mut self, registry: &mio::Registry, token: Token) -> io::Result<()> {
        let interest = Interest::READABLE | Interest::WRITABLE;
        match self {
            Transport::Tcp(stream) => registry.register(stream, token, interest),
            #[cfg(unix)]
            Transport::Local(stream) => registry.register(stream, token, interest),
        }
    }

    fn deregister(&mut self, registry: &mio::Registry) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => registry.deregister(stream),
            #[cfg(unix)]
            Transport::Local(stream) => registry.deregister(stream),
        }
    }

    fn local_uri(&self) -> Option<Uri> {
        match self {
            Transport::Tcp(stream) => stream.local_addr().ok().map(Uri::from_socket_addr),
            #[cfg(unix)]
            Transport::Local(stream) => stream
                .local_addr()
                .ok()
                .and_then(|addr| addr.as_pathname().map(|path| Uri::local(&path.to_string_lossy()))),
        }
    }

    fn remote_uri(&self) -> Option<Uri> {
        match self {
            Transport::Tcp(stream) => stream.peer_addr().ok().map(Uri::from_socket_addr),
            #[cfg(unix)]
            Transport::Local(stream) => stream
                .peer_addr()
                .ok()
                .and_then(|addr| addr.as_pathname().map(|path| Uri::local(&path.to_string_lossy()))),
        }
    }
}

/// A duplex transport to one remote participant: the socket, a FIFO write
/// queue, the read reassembly buffer, the negotiated protocol version and
/// the peer's identity record.
pub struct Peer {
    id: PeerId,
    transport: Transport,
    protocol_version: ProtocolVersion,
    info: PeerInfo,
    descriptor: ServiceDescriptor,

    assembler: FrameAssembler,

    write_queue: VecDeque<Vec<u8>>,
    write_offset: usize,
    queued_bytes: usize,
    send_queue_cap: Option<usize>,

    log: logging::Logger,
}

impl Peer {
    /// Wraps an accepted TCP stream. The peer's identity is unknown until
    /// its announcement arrives.
    pub fn from_tcp(id: PeerId, stream: TcpStream, config: &MiddlewareConfig, log: &logging::Logger) -> Peer {
        Peer::new(id, Transport::Tcp(stream), config.send_queue_cap, log)
    }

    /// Wraps an accepted local-socket stream.
    #[cfg(unix)]
    pub fn from_local(id: PeerId, stream: UnixStream, config: &MiddlewareConfig, log: &logging::Logger) -> Peer {
        Peer::new(id, Transport::Local(stream), config.send_queue_cap, log)
    }

    /// Connects to a remote participant, trying each advertised acceptor URI
    /// in order. Local IPC URIs come first in the advertisement, so the
    /// cheaper transport wins when both sides share a machine.
    pub fn connect(id: PeerId, info: &PeerInfo, config: &MiddlewareConfig, log: &logging::Logger) -> Result<Peer> {
        for uri_str in &info.acceptor_uris {
            let uri = match Uri::parse(uri_str) {
                Ok(uri) => uri,
                Err(_) => continue,
            };

            match uri.kind() {
                #[cfg(unix)]
                UriKind::Local => {
                    if let Ok(stream) = std::os::unix::net::UnixStream::connect(uri.path()) {
                        stream.set_nonblocking(true)?;
                        let mut peer =
                            Peer::new(id, Transport::Local(UnixStream::from_std(stream)), config.send_queue_cap, log);
                        peer.info = info.clone();
                        return Ok(peer);
                    }
                }
                #[cfg(not(unix))]
                UriKind::Local => continue,
                UriKind::Tcp => {
                    let addrs = match format!("{}:{}", uri.host(), uri.port()).to_socket_addrs() {
                        Ok(addrs) => addrs,
                        Err(_) => continue,
                    };

                    for addr in addrs {
                        if let Ok(stream) = std::net::TcpStream::connect(addr) {
                            stream.set_nodelay(config.tcp_no_delay)?;
                            stream.set_nonblocking(true)?;
                            let mut peer =
                                Peer::new(id, Transport::Tcp(TcpStream::from_std(stream)), config.send_queue_cap, log);
                            peer.info = info.clone();
                            return Ok(peer);
                        }
                    }
                }
            }
        }

        Err(Error::ConnectionRefused(info.participant_name.clone()))
    }

    fn new(id: PeerId, transport: Transport, send_queue_cap: Option<usize>, log: &logging::Logger) -> Peer {
        Peer {
            id,
            transport,
            protocol_version: UNKNOWN_VERSION,
            info: PeerInfo::default(),
            descriptor: ServiceDescriptor::new(""),
            assembler: FrameAssembler::new(),
            write_queue: VecDeque::new(),
            write_offset: 0,
            queued_bytes: 0,
            send_queue_cap,
            log: log.new(logging::o!("peer" => id)),
        }
    }

    #[inline]
    pub fn id(&self) -> PeerId {
        self.id
    }

    #[inline]
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// Pins the wire version for this peer. Assigned during the handshake;
    /// re-assignment with a different value indicates a handshake logic bug.
    pub fn set_protocol_version(&mut self, version: ProtocolVersion) {
        debug_assert!(
            self.protocol_version == UNKNOWN_VERSION || self.protocol_version == version,
            "protocol version renegotiated: {} -> {}",
            self.protocol_version,
            version
        );

        debug!(self.log, "protocol version set"; "version" => %version);
        self.protocol_version = version;
    }

    #[inline]
    pub fn info(&self) -> &PeerInfo {
        &self.info
    }

    pub fn set_info(&mut self, info: PeerInfo) {
        self.info = info;
    }

    #[inline]
    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    #[inline]
    pub fn descriptor_mut(&mut self) -> &mut ServiceDescriptor {
        &mut self.descriptor
    }

    /// Local socket address as a URI string, when connected.
    pub fn local_address(&self) -> Option<String> {
        self.transport.local_uri().map(|uri| uri.as_str().to_string())
    }

    /// Remote socket address as a URI string, when connected.
    pub fn remote_address(&self) -> Option<String> {
        self.transport.remote_uri().map(|uri| uri.as_str().to_string())
    }

    pub fn register(&mut self, registry: &mio::Registry, token: Token) -> Result<()> {
        self.transport.register(registry, token).map_err(Into::into)
    }

    pub fn deregister(&mut self, registry: &mio::Registry) {
        // Deregistration of an already-dead socket is uninteresting.
        let _ = self.transport.deregister(registry);
    }

    /// Enqueues a finalized frame and flushes as much of the queue as the
    /// socket accepts right now. The remainder drains on writable events.
    pub fn enqueue(&mut self, frame: SerializedMessage) -> Result<()> {
        let bytes = frame.release()?;

        if let Some(cap) = self.send_queue_cap {
            if self.queued_bytes + bytes.len() > cap {
                return Err(Error::Backpressure);
            }
        }

        trace!(self.log, "frame queued"; "size" => bytes.len());

        self.queued_bytes += bytes.len();
        self.write_queue.push_back(bytes);
        self.flush()
    }

    /// Writes queued frames until the queue drains or the socket signals
    /// would-block.
    pub fn flush(&mut self) -> Result<()> {
        while let Some(front) = self.write_queue.front() {
            match self.transport.write(&front[self.write_offset..]) {
                Ok(0) => return Err(Error::ConnectionLost),
                Ok(written) => {
                    self.write_offset += written;
                    self.queued_bytes -= written;

                    if self.write_offset == front.len() {
                        self.write_queue.pop_front();
                        self.write_offset = 0;
                    }
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!(self.log, "write failed"; "error" => %err);
                    return Err(Error::ConnectionLost);
                }
            }
        }

        Ok(())
    }

    /// Reads everything the socket has, reassembles frames and returns the
    /// completed ones in arrival order.
    pub fn receive(&mut self) -> Result<Vec<SerializedMessage>> {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            match self.transport.read(&mut chunk) {
                Ok(0) => return Err(Error::ConnectionLost),
                Ok(read) => self.assembler.push_bytes(&chunk[..read]),
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!(self.log, "read failed"; "error" => %err);
                    return Err(Error::ConnectionLost);
                }
            }
        }

        let mut frames = Vec::new();
        while let Some(frame) = self.assembler.next_frame()? {
            frames.push(SerializedMessage::from_frame(frame)?);
        }

        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(payload: &[u8]) -> Vec<u8> {
        let size = (4 + 1 + payload.len()) as u32;
        let mut bytes = size.to_le_bytes().to_vec();
        bytes.push(1); // kind tag
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_assembler_single_frame() {
        let mut assembler = FrameAssembler::new();
        let frame = frame_bytes(&[7, 8, 9]);

        assembler.push_bytes(&frame);

        assert_eq!(assembler.next_frame().unwrap().unwrap(), frame);
        assert!(assembler.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_assembler_partial_then_complete() {
        let mut assembler = FrameAssembler::new();
        let frame = frame_bytes(&[1, 2, 3, 4]);

        assembler.push_bytes(&frame[..3]);
        assert!(assembler.next_frame().unwrap().is_none());

        assembler.push_bytes(&frame[3..6]);
        assert!(assembler.next_frame().unwrap().is_none());

        assembler.push_bytes(&frame[6..]);
        assert_eq!(assembler.next_frame().unwrap().unwrap(), frame);
    }

    #[test]
    fn test_assembler_coalesced_frames() {
        let mut assembler = FrameAssembler::new();
        let first = frame_bytes(&[1]);
        let second = frame_bytes(&[2, 2]);

        let mut wire = first.clone();
        wire.extend_from_slice(&second);
        assembler.push_bytes(&wire);

        assert_eq!(assembler.next_frame().unwrap().unwrap(), first);
        assert_eq!(assembler.next_frame().unwrap().unwrap(), second);
        assert!(assembler.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_assembler_rejects_zero_size() {
        let mut assembler = FrameAssembler::new();
        assembler.push_bytes(&[0, 0, 0, 0, 1]);

        assert!(matches!(assembler.next_frame(), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_assembler_rejects_oversized_frame() {
        let mut assembler = FrameAssembler::new();
        let size = (MAX_FRAME_SIZE as u32 + 1).to_le_bytes();
        assembler.push_bytes(&size);

        assert!(matches!(assembler.next_frame(), Err(Error::Protocol(_))));
    }
}
