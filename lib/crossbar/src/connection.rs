use std::collections::VecDeque;
use std::io;
use std::mem;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, SystemTime};

use hashbrown::{HashMap, HashSet};
use indexmap::IndexSet;
use mio::net::TcpListener;
#[cfg(unix)]
use mio::net::UnixListener;
use mio::{Events, Interest, Poll, Token, Waker};

use plinth::completion::Completion;
use plinth::hash::hash_str;
use plinth::logging::{self, debug, error, info, trace, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::link::Link;
use crate::messages::sync::{ParticipantState, ParticipantStatus};
use crate::messages::{MsgType, SimMsg, DEFAULT_NETWORK};
use crate::peer::{Peer, PeerId};
use crate::protocol::{
    version_supported, version_to_release, AnnouncementReply, KnownParticipants, MsgSubscriber,
    ParticipantAnnouncement, PeerInfo, ProtocolVersion, RegistryMsgHeader, Status, SubscriptionAck,
    CURRENT_VERSION, UNKNOWN_VERSION,
};
use crate::service::{EndpointId, ParticipantId, Service, ServiceDescriptor, REGISTRY_PARTICIPANT_ID};
use crate::uri::{Uri, UriKind};
use crate::wire::envelope::{MsgKind, RegistryMsgKind, SerializedMessage};

const WAKER_TOKEN: Token = Token(0);
const TCP4_TOKEN: Token = Token(1);
const TCP6_TOKEN: Token = Token(2);
const LOCAL_TOKEN: Token = Token(3);
const PEER_TOKEN_BASE: usize = 4;

const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// The registry's well-known participant name.
pub const REGISTRY_NAME: &str = "Registry";

pub(crate) type Task = Box<dyn FnOnce(&mut Core) + Send>;
pub(crate) type AnnouncementHook = Box<dyn FnMut(&mut Core, PeerId, &ParticipantAnnouncement) + Send>;
pub(crate) type ShutdownHook = Box<dyn FnMut(&mut Core, PeerId, &PeerInfo) + Send>;

type HandshakeGate = Completion<std::result::Result<(), Error>>;

/// State shared between the public handle and the reactor thread.
pub(crate) struct Shared {
    tasks: Mutex<VecDeque<Task>>,
    waker: Waker,
    stop: AtomicBool,
    reactor_thread: Mutex<Option<ThreadId>>,
}

impl Shared {
    fn lock_tasks(&self) -> MutexGuard<VecDeque<Task>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn on_reactor_thread(&self) -> bool {
        let guard = match self.reactor_thread.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard == Some(thread::current().id())
    }
}

/// A local receiver slot: the announced subscriber record plus the message
/// type that decodes its payloads. The slot index is the wire-visible
/// receiver index; the table grows only, so indices stay stable for the
/// life of the process.
#[derive(Clone)]
struct RegisteredReceiver {
    msg_type: MsgType,
    subscriber: MsgSubscriber,
}

/// Reactor-side state: the poll, all peers, the link tables and the
/// handshake bookkeeping. Lives on the I/O worker thread; other threads
/// reach it only through dispatched tasks.
pub(crate) struct Core {
    config: Config,
    participant_name: String,
    participant_id: ParticipantId,
    version: ProtocolVersion,
    log: logging::Logger,

    poll: Poll,
    tcp4_acceptor: Option<TcpListener>,
    tcp6_acceptor: Option<TcpListener>,
    #[cfg(unix)]
    local_acceptor: Option<UnixListener>,
    #[cfg(unix)]
    local_path: Option<PathBuf>,
    advertised_uris: Vec<String>,

    peers: Vec<Option<Peer>>,
    free: Vec<PeerId>,
    live: IndexSet<PeerId>,
    pub(crate) registry_peer: Option<PeerId>,

    links: HashMap<(MsgType, String), Link>,
    receivers: Vec<RegisteredReceiver>,
    receiver_keys: HashSet<(String, &'static str)>,

    pending_replies: Vec<PeerId>,
    handshake_gate: Arc<HandshakeGate>,
    pending_acks: Vec<(PeerId, MsgSubscriber)>,
    ack_gate: Option<Arc<Completion<()>>>,

    hash_to_name: HashMap<u64, String>,

    announcement_hooks: Vec<AnnouncementHook>,
    shutdown_hooks: Vec<ShutdownHook>,

    shutting_down: bool,
}

/// Derives the filesystem path of a participant's local IPC socket. The
/// name is bounded and the variable part is a hash of name, id, domain and
/// working directory, keeping the path under the AF_UNIX limit while still
/// separating concurrent simulations.
pub(crate) fn local_endpoint_path(participant_name: &str, participant_id: ParticipantId, domain_id: u32) -> PathBuf {
    let safe_name: String = participant_name
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .take(10)
        .collect();

    let cwd = std::env::current_dir()
        .map(|path| path.display().to_string())
        .unwrap_or_default();
    let unique = hash_str(&format!("{}{}{}{}", participant_name, participant_id, domain_id, cwd));

    std::env::temp_dir().join(format!("{}{:x}.xbar", safe_name, unique))
}

fn advertised_host(addr: SocketAddr) -> Uri {
    // A catch-all bind address is not connectable; advertise the loopback
    // address of the same family instead.
    match addr {
        SocketAddr::V4(v4) if v4.ip().is_unspecified() => Uri::tcp("127.0.0.1", v4.port()),
        SocketAddr::V6(v6) if v6.ip().is_unspecified() => Uri::tcp("[::1]", v6.port()),
        other => Uri::from_socket_addr(other),
    }
}

impl Core {
    fn new(
        config: Config,
        participant_name: &str,
        participant_id: ParticipantId,
        version: ProtocolVersion,
        log: &logging::Logger,
    ) -> Result<(Core, Arc<Shared>)> {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;

        let shared = Arc::new(Shared {
            tasks: Mutex::new(VecDeque::new()),
            waker,
            stop: AtomicBool::new(false),
            reactor_thread: Mutex::new(None),
        });

        let mut hash_to_name = HashMap::new();
        hash_to_name.insert(hash_str(participant_name), participant_name.to_string());

        let core = Core {
            config,
            participant_name: participant_name.to_string(),
            participant_id,
            version,
            log: log.new(logging::o!("participant" => participant_name.to_string())),
            poll,
            tcp4_acceptor: None,
            tcp6_acceptor: None,
            #[cfg(unix)]
            local_acceptor: None,
            #[cfg(unix)]
            local_path: None,
            advertised_uris: Vec::new(),
            peers: Vec::new(),
            free: Vec::new(),
            live: IndexSet::new(),
            registry_peer: None,
            links: HashMap::new(),
            receivers: Vec::new(),
            receiver_keys: HashSet::new(),
            pending_replies: Vec::new(),
            handshake_gate: Arc::new(Completion::new()),
            pending_acks: Vec::new(),
            ack_gate: None,
            hash_to_name,
            announcement_hooks: Vec::new(),
            shutdown_hooks: Vec::new(),
            shutting_down: false,
        };

        Ok((core, shared))
    }

    // ------------------------------------------------------------------
    // Acceptors

    /// Opens the participant-side listening sockets: local IPC when enabled,
    /// TCPv4 on an OS-chosen port, TCPv6 best effort.
    fn open_participant_acceptors(&mut self, domain_id: u32) -> Result<()> {
        #[cfg(unix)]
        {
            if self.config.middleware.enable_domain_sockets {
                if let Err(err) = self.open_local_acceptor(domain_id) {
                    warn!(self.log, "cannot accept local IPC connections"; "error" => %err);
                }
            }
        }

        self.open_tcp4_acceptor("0.0.0.0:0".parse().expect("static address"))?;

        if let Err(err) = self.open_tcp6_acceptor("[::]:0".parse().expect("static address")) {
            debug!(self.log, "TCPv6 acceptor unavailable"; "error" => %err);
        }

        Ok(())
    }

    /// Opens the registry-side listening sockets: on the domain's well-known
    /// port, or on an explicit listen URI when one is given.
    pub(crate) fn open_registry_acceptors(&mut self, domain_id: u32, listen_uri: Option<&Uri>) -> Result<()> {
        if let Some(uri) = listen_uri {
            return self.open_listen_override(uri);
        }

        #[cfg(unix)]
        {
            if self.config.middleware.enable_domain_sockets {
                if let Err(err) = self.open_local_acceptor(domain_id) {
                    warn!(self.log, "cannot accept local IPC connections"; "error" => %err);
                }
            }
        }

        let port = registry_port(&self.config, domain_id);
        let addr: SocketAddr = format!("0.0.0.0:{}", port)
            .parse()
            .map_err(|_| Error::Configuration(format!("invalid registry port {}", port)))?;

        self.open_tcp4_acceptor(addr).map_err(|err| {
            error!(self.log, "registry failed to open listening socket";
                   "port" => port, "error" => %err);
            err
        })?;

        Ok(())
    }

    /// Binds exactly the endpoint named by an explicit listen URI.
    fn open_listen_override(&mut self, uri: &Uri) -> Result<()> {
        match uri.kind() {
            UriKind::Tcp => {
                let addr = format!("{}:{}", uri.host(), uri.port())
                    .to_socket_addrs()
                    .map_err(|err| Error::Configuration(format!("cannot resolve listen URI '{}': {}", uri, err)))?
                    .next()
                    .ok_or_else(|| Error::Configuration(format!("cannot resolve listen URI '{}'", uri)))?;

                if addr.is_ipv4() {
                    self.open_tcp4_acceptor(addr)
                } else {
                    self.open_tcp6_acceptor(addr)
                }
            }
            #[cfg(unix)]
            UriKind::Local => self.open_local_acceptor_at(Path::new(uri.path())),
            #[cfg(not(unix))]
            UriKind::Local => Err(Error::Configuration(
                "local listen URIs are not supported on this platform".to_string(),
            )),
        }
    }

    fn open_tcp4_acceptor(&mut self, addr: SocketAddr) -> Result<()> {
        let mut listener = TcpListener::bind(addr)?;
        self.poll.registry().register(&mut listener, TCP4_TOKEN, Interest::READABLE)?;

        let local = listener.local_addr()?;
        self.advertised_uris.push(advertised_host(local).as_str().to_string());
        debug!(self.log, "listening"; "addr" => %local);

        self.tcp4_acceptor = Some(listener);
        Ok(())
    }

    fn open_tcp6_acceptor(&mut self, addr: SocketAddr) -> Result<()> {
        let mut listener = TcpListener::bind(addr)?;
        self.poll.registry().register(&mut listener, TCP6_TOKEN, Interest::READABLE)?;

        let local = listener.local_addr()?;
        self.advertised_uris.push(advertised_host(local).as_str().to_string());
        debug!(self.log, "listening"; "addr" => %local);

        self.tcp6_acceptor = Some(listener);
        Ok(())
    }

    #[cfg(unix)]
    fn open_local_acceptor(&mut self, domain_id: u32) -> Result<()> {
        let path = local_endpoint_path(&self.participant_name, self.participant_id, domain_id);
        self.open_local_acceptor_at(&path)
    }

    #[cfg(unix)]
    fn open_local_acceptor_at(&mut self, path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let path = path.to_path_buf();

        // The file must not exist before we bind on it.
        let _ = std::fs::remove_file(&path);

        let mut listener = UnixListener::bind(&path)?;
        let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o770));

        self.poll.registry().register(&mut listener, LOCAL_TOKEN, Interest::READABLE)?;

        debug!(self.log, "listening"; "path" => %path.display());

        // The local URI leads the advertisement so peers try IPC first.
        self.advertised_uris
            .insert(0, Uri::local(&path.to_string_lossy()).as_str().to_string());
        self.local_acceptor = Some(listener);
        self.local_path = Some(path);
        Ok(())
    }

    fn accept_tcp(&mut self, token: Token) {
        loop {
            let accepted = {
                let acceptor = if token == TCP4_TOKEN {
                    self.tcp4_acceptor.as_ref()
                } else {
                    self.tcp6_acceptor.as_ref()
                };

                match acceptor {
                    Some(acceptor) => acceptor.accept(),
                    None => return,
                }
            };

            match accepted {
                Ok((stream, addr)) => {
                    let _ = stream.set_nodelay(self.config.middleware.tcp_no_delay);
                    debug!(self.log, "incoming connection"; "from" => %addr);

                    let id = self.alloc_slot();
                    let peer = Peer::from_tcp(id, stream, &self.config.middleware, &self.log);
                    if let Err(err) = self.install_peer(id, peer) {
                        warn!(self.log, "cannot register accepted connection"; "error" => %err);
                        self.release_slot(id);
                    }
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) => {
                    warn!(self.log, "accept failed"; "error" => %err);
                    return;
                }
            }
        }
    }

    #[cfg(unix)]
    fn accept_local(&mut self) {
        loop {
            let accepted = match self.local_acceptor.as_ref() {
                Some(acceptor) => acceptor.accept(),
                None => return,
            };

            match accepted {
                Ok((stream, _addr)) => {
                    debug!(self.log, "incoming local connection");

                    let id = self.alloc_slot();
                    let peer = Peer::from_local(id, stream, &self.config.middleware, &self.log);
                    if let Err(err) = self.install_peer(id, peer) {
                        warn!(self.log, "cannot register accepted connection"; "error" => %err);
                        self.release_slot(id);
                    }
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) => {
                    warn!(self.log, "accept failed"; "error" => %err);
                    return;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Peer table

    pub(crate) fn alloc_slot(&mut self) -> PeerId {
        match self.free.pop() {
            Some(id) => id,
            None => {
                self.peers.push(None);
                self.peers.len() - 1
            }
        }
    }

    pub(crate) fn release_slot(&mut self, id: PeerId) {
        if self.peers[id].is_none() {
            self.free.push(id);
        }
    }

    pub(crate) fn install_peer(&mut self, id: PeerId, mut peer: Peer) -> Result<()> {
        peer.register(self.poll.registry(), Token(PEER_TOKEN_BASE + id))?;
        self.peers[id] = Some(peer);
        self.live.insert(id);
        Ok(())
    }

    fn peer_mut(&mut self, id: PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(id).and_then(Option::as_mut)
    }

    fn peer_version(&self, id: PeerId) -> ProtocolVersion {
        self.peers
            .get(id)
            .and_then(Option::as_ref)
            .map(Peer::protocol_version)
            .unwrap_or(UNKNOWN_VERSION)
    }

    pub(crate) fn peer_name(&self, id: PeerId) -> String {
        self.peers
            .get(id)
            .and_then(Option::as_ref)
            .map(|peer| peer.info().participant_name.clone())
            .unwrap_or_default()
    }

    /// Enqueues a frame on a peer, shutting the peer down on a transport
    /// failure. Backpressure drops the frame but keeps the peer.
    pub(crate) fn peer_send(&mut self, id: PeerId, frame: SerializedMessage) {
        let result = match self.peer_mut(id) {
            Some(peer) => peer.enqueue(frame),
            None => return,
        };

        match result {
            Ok(()) => {}
            Err(Error::Backpressure) => {
                error!(self.log, "send queue soft cap exceeded, dropping frame"; "peer" => id);
            }
            Err(err) => {
                debug!(self.log, "send failed"; "peer" => id, "error" => %err);
                self.shutdown_peer(id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Links

    fn get_or_create_link(&mut self, msg_type: MsgType, network_name: &str) -> &mut Link {
        let Core { links, log, .. } = self;
        links
            .entry((msg_type, network_name.to_string()))
            .or_insert_with(|| Link::new(msg_type, network_name, log))
    }

    // ------------------------------------------------------------------
    // Handshake: sending

    fn own_peer_info(&self) -> PeerInfo {
        PeerInfo {
            participant_name: self.participant_name.clone(),
            participant_id: self.participant_id,
            acceptor_uris: self.advertised_uris.clone(),
            capabilities: String::new(),
        }
    }

    pub(crate) fn send_announcement(&mut self, to: PeerId) {
        let announcement = ParticipantAnnouncement::new(self.version, self.own_peer_info());

        debug!(self.log, "sending participant announcement"; "to" => self.peer_name(to));

        // The layout follows the current wire format; only the header
        // carries the advertised revision.
        let frame = SerializedMessage::registry(CURRENT_VERSION, RegistryMsgKind::ParticipantAnnouncement, &announcement);
        self.peer_send(to, frame);
    }

    fn send_announcement_reply(&mut self, to: PeerId) {
        let peer_version = self.peer_version(to);
        let reply = AnnouncementReply {
            remote_header: RegistryMsgHeader::new(peer_version),
            status: Status::Success,
            subscribers: self.receivers.iter().map(|receiver| receiver.subscriber.clone()).collect(),
        };

        debug!(self.log, "sending participant announcement reply";
               "to" => self.peer_name(to), "version" => %peer_version);

        let frame = SerializedMessage::registry(peer_version, RegistryMsgKind::AnnouncementReply, &reply);
        self.peer_send(to, frame);
    }

    fn send_failed_reply(&mut self, to: PeerId) {
        let reply = AnnouncementReply {
            // Tell the remote peer which revision we intended to speak.
            remote_header: RegistryMsgHeader::new(self.version),
            status: Status::Failed,
            subscribers: Vec::new(),
        };

        let frame = SerializedMessage::registry(CURRENT_VERSION, RegistryMsgKind::AnnouncementReply, &reply);
        self.peer_send(to, frame);
    }

    pub(crate) fn send_known_participants(&mut self, to: PeerId, peer_infos: Vec<PeerInfo>) {
        let peer_version = self.peer_version(to);
        let known = KnownParticipants::new(self.version, peer_infos);

        info!(self.log, "sending known participants"; "to" => self.peer_name(to));

        let frame = SerializedMessage::registry(peer_version, RegistryMsgKind::KnownParticipants, &known);
        self.peer_send(to, frame);
    }

    fn notify_incompatibility(&self, other: RegistryMsgHeader, other_name: &str) {
        error!(self.log, "network incompatibility";
               "ours" => version_to_release(self.version),
               "theirs" => version_to_release(other.version()),
               "participant" => other_name);
    }

    // ------------------------------------------------------------------
    // Handshake: receiving

    fn handle_frame(&mut self, from: PeerId, mut msg: SerializedMessage) -> Result<()> {
        match msg.kind() {
            MsgKind::Invalid => {
                warn!(self.log, "received message of invalid kind");
                Ok(())
            }
            MsgKind::SubscriptionAnnouncement => self.receive_subscription_announcement(from, &mut msg),
            MsgKind::SubscriptionAcknowledge => self.receive_subscription_acknowledge(from, &mut msg),
            MsgKind::MiddlewareMessage | MsgKind::SimulationMessage => self.receive_sim_message(from, &mut msg),
            MsgKind::RegistryMessage => match msg.registry_kind() {
                RegistryMsgKind::Invalid => {
                    warn!(self.log, "received registry message of invalid kind");
                    Ok(())
                }
                RegistryMsgKind::ParticipantAnnouncement => self.receive_participant_announcement(from, msg),
                RegistryMsgKind::AnnouncementReply => self.receive_announcement_reply(from, msg),
                RegistryMsgKind::KnownParticipants => self.receive_known_participants(from, msg),
            },
        }
    }

    /// Server view: an accepted peer introduces itself.
    fn receive_participant_announcement(&mut self, from: PeerId, mut msg: SerializedMessage) -> Result<()> {
        let header = msg.peek_registry_header()?;

        if !header.preamble_valid() {
            return Err(Error::Protocol("announcement preamble mismatch".to_string()));
        }

        if !version_supported(header.version()) {
            // Decoding the rest of the frame would not be safe. Reject and
            // leave the socket open long enough for the reply to flush.
            self.notify_incompatibility(header, "unknown");
            self.send_failed_reply(from);
            return Ok(());
        }

        let announcement = {
            let peer = match self.peer_mut(from) {
                Some(peer) => peer,
                None => return Ok(()),
            };
            peer.set_protocol_version(header.version());
            msg.set_protocol_version(header.version());
            msg.decode::<ParticipantAnnouncement>()?
        };

        let name = announcement.peer_info.participant_name.clone();
        debug!(self.log, "received participant announcement";
               "from" => &name, "version" => %header.version());

        // Duplicate names would make targeted routing and the participant
        // lookup ambiguous; the later joiner is rejected.
        let name_hash = hash_str(&name);
        if self.hash_to_name.contains_key(&name_hash) {
            error!(self.log, "duplicate participant name announced"; "name" => &name);
            self.send_failed_reply(from);
            self.shutdown_peer(from);
            return Ok(());
        }
        self.hash_to_name.insert(name_hash, name.clone());

        if let Some(peer) = self.peer_mut(from) {
            peer.set_info(announcement.peer_info.clone());
            peer.descriptor_mut().set_participant_name(&name);
        }

        let mut hooks = mem::take(&mut self.announcement_hooks);
        for hook in &mut hooks {
            hook(self, from, &announcement);
        }
        let added_during = mem::replace(&mut self.announcement_hooks, hooks);
        self.announcement_hooks.extend(added_during);

        self.send_announcement_reply(from);
        Ok(())
    }

    fn receive_announcement_reply(&mut self, from: PeerId, mut msg: SerializedMessage) -> Result<()> {
        msg.set_protocol_version(self.peer_version(from));
        let reply = msg.decode::<AnnouncementReply>()?;
        let remote_version = reply.remote_header.version();

        if reply.status == Status::Failed {
            warn!(self.log, "received failed announcement reply";
                  "from" => self.peer_name(from),
                  "their_release" => version_to_release(remote_version));

            if self.registry_peer == Some(from) {
                // The registry rejected us: the join cannot proceed.
                let err = Error::Protocol(format!(
                    "registry rejected the handshake, remote speaks {}",
                    version_to_release(remote_version)
                ));
                self.handshake_gate.set(Err(err.clone()));
                return Err(err);
            }
            return Ok(());
        }

        if let Some(peer) = self.peer_mut(from) {
            peer.set_protocol_version(remote_version);
        }

        for subscriber in &reply.subscribers {
            self.try_add_remote_subscriber(from, subscriber);
        }

        debug!(self.log, "received announcement reply";
               "from" => self.peer_name(from), "version" => %remote_version);

        if let Some(pos) = self.pending_replies.iter().position(|pending| *pending == from) {
            self.pending_replies.remove(pos);
            if self.pending_replies.is_empty() {
                self.handshake_gate.set(Ok(()));
            }
        }
        Ok(())
    }

    /// Client view: the registry's census arrived; connect to everyone.
    fn receive_known_participants(&mut self, from: PeerId, mut msg: SerializedMessage) -> Result<()> {
        let known = msg.decode::<KnownParticipants>()?;

        if !known.header.preamble_valid() {
            return Err(Error::Protocol("known-participants preamble mismatch".to_string()));
        }

        if !version_supported(known.header.version()) {
            self.notify_incompatibility(known.header, REGISTRY_NAME);
            self.send_failed_reply(from);
            let err = Error::Protocol(format!(
                "registry speaks unsupported version {}",
                version_to_release(known.header.version())
            ));
            self.handshake_gate.set(Err(err));
            return Ok(());
        }

        if let Some(peer) = self.peer_mut(from) {
            peer.set_protocol_version(known.header.version());
        }

        debug!(self.log, "received known participants";
               "count" => known.peer_infos.len(),
               "version" => %known.header.version());

        for info in known.peer_infos {
            self.connect_to_peer(info);
        }

        if self.pending_replies.is_empty() {
            self.handshake_gate.set(Ok(()));
        } else {
            trace!(self.log, "waiting for announcement replies"; "count" => self.pending_replies.len());
        }
        Ok(())
    }

    fn connect_to_peer(&mut self, info: PeerInfo) {
        debug!(self.log, "connecting to participant";
               "name" => &info.participant_name, "uris" => format!("{:?}", info.acceptor_uris));

        let id = self.alloc_slot();
        let mut peer = match Peer::connect(id, &info, &self.config.middleware, &self.log) {
            Ok(peer) => peer,
            Err(err) => {
                warn!(self.log, "cannot connect to participant";
                      "name" => &info.participant_name, "error" => %err);
                self.release_slot(id);
                return;
            }
        };

        peer.descriptor_mut().set_participant_name(&info.participant_name);

        if let Err(err) = self.install_peer(id, peer) {
            warn!(self.log, "cannot register outbound connection"; "error" => %err);
            self.release_slot(id);
            return;
        }

        if self
            .hash_to_name
            .insert(hash_str(&info.participant_name), info.participant_name.clone())
            .is_some()
        {
            warn!(self.log, "registry census contains a duplicate name"; "name" => &info.participant_name);
        }

        // We connected; tell the other side who we are and wait for its
        // subscriber list.
        self.pending_replies.push(id);
        self.send_announcement(id);
    }

    // ------------------------------------------------------------------
    // Subscriptions

    fn try_add_remote_subscriber(&mut self, from: PeerId, subscriber: &MsgSubscriber) -> bool {
        let msg_type = match MsgType::by_serdes_name(&subscriber.msg_type_name) {
            Some(msg_type) => msg_type,
            None => {
                warn!(self.log, "cannot register subscription for unknown message type";
                      "type" => &subscriber.msg_type_name, "network" => &subscriber.network_name);
                return false;
            }
        };

        let participant_name = self.peer_name(from);
        let link = self.get_or_create_link(msg_type, &subscriber.network_name);

        let replay = link.add_remote_receiver(from, subscriber.receiver_idx, &participant_name);

        debug!(self.log, "registered remote subscription";
               "network" => &subscriber.network_name,
               "type" => &subscriber.msg_type_name,
               "from" => &participant_name);

        if let Some(frame) = replay {
            self.peer_send(from, frame);
        }
        true
    }

    fn receive_subscription_announcement(&mut self, from: PeerId, msg: &mut SerializedMessage) -> Result<()> {
        let mut subscriber = msg.decode::<MsgSubscriber>()?;
        let was_added = self.try_add_remote_subscriber(from, &subscriber);

        // Echo the largest codec version not newer than what the remote
        // announced, so both sides agree on the payload layout.
        match MsgType::best_match(&subscriber.msg_type_name, subscriber.version) {
            Some(msg_type) => subscriber.version = msg_type.version(),
            None => {
                warn!(self.log, "subscription announced with unknown codec version";
                      "type" => &subscriber.msg_type_name,
                      "version" => subscriber.version,
                      "from" => self.peer_name(from));
            }
        }

        let ack = SubscriptionAck {
            status: if was_added { Status::Success } else { Status::Failed },
            subscriber,
        };

        let frame = SerializedMessage::subscription(MsgKind::SubscriptionAcknowledge, self.peer_version(from), &ack);
        self.peer_send(from, frame);
        Ok(())
    }

    fn receive_subscription_acknowledge(&mut self, from: PeerId, msg: &mut SerializedMessage) -> Result<()> {
        let ack = msg.decode::<SubscriptionAck>()?;

        if ack.status != Status::Success {
            error!(self.log, "subscription rejected";
                   "network" => &ack.subscriber.network_name,
                   "type" => &ack.subscriber.msg_type_name,
                   "by" => self.peer_name(from));
        }

        // The pending entry is removed in any case; no further acknowledge
        // will follow for this subscription.
        if let Some(pos) = self
            .pending_acks
            .iter()
            .position(|(peer, pending)| *peer == from && *pending == ack.subscriber)
        {
            self.pending_acks.remove(pos);
            if self.pending_acks.is_empty() {
                if let Some(gate) = self.ack_gate.take() {
                    gate.set(());
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Simulation traffic

    fn receive_sim_message(&mut self, from: PeerId, msg: &mut SerializedMessage) -> Result<()> {
        let idx = msg.remote_index()? as usize;

        let receiver = match self.receivers.get(idx) {
            Some(receiver) => receiver.clone(),
            None => {
                warn!(self.log, "ignoring message for unknown receiver index"; "idx" => idx);
                return Ok(());
            }
        };

        let sender = msg.sender()?;

        let mut from_desc = match self.peers.get(from).and_then(Option::as_ref) {
            Some(peer) => peer.descriptor().clone(),
            None => return Ok(()),
        };
        from_desc.set_network_name(&receiver.subscriber.network_name);
        from_desc.set_service_id(sender.endpoint);

        // A decode failure means the frame is corrupt; the caller closes
        // the peer.
        let sim_msg = receiver.msg_type.decode_payload(msg.payload_buffer())?;

        match self.links.get(&(receiver.msg_type, receiver.subscriber.network_name.clone())) {
            Some(link) => link.deliver_remote(&from_desc, &sim_msg),
            None => {
                warn!(self.log, "no link for delivered message";
                      "network" => &receiver.subscriber.network_name,
                      "type" => receiver.msg_type.type_name());
            }
        }
        Ok(())
    }

    pub(crate) fn send_msg_impl(&mut self, from: &ServiceDescriptor, msg: SimMsg) {
        let msg_type = MsgType::of(&msg);
        let key = (msg_type, from.network_name().to_string());

        let mut failed: Vec<PeerId> = Vec::new();
        {
            let Core { links, peers, log, .. } = self;
            let link = match links.get_mut(&key) {
                Some(link) => link,
                None => {
                    warn!(log, "send on unregistered link";
                          "network" => from.network_name(), "type" => msg_type.type_name());
                    return;
                }
            };

            link.distribute_local(from, &msg, &mut |peer_id, frame| {
                enqueue_or_mark(peers, log, peer_id, frame, &mut failed);
            });
        }

        for id in failed {
            self.shutdown_peer(id);
        }
    }

    pub(crate) fn send_msg_to_target_impl(
        &mut self,
        from: &ServiceDescriptor,
        target: &str,
        msg: SimMsg,
    ) -> Result<()> {
        let msg_type = MsgType::of(&msg);
        let key = (msg_type, from.network_name().to_string());

        let mut failed: Vec<PeerId> = Vec::new();
        let result = {
            let Core { links, peers, log, .. } = self;
            let link = links.get_mut(&key).ok_or_else(|| Error::UnknownTarget(target.to_string()))?;

            link.dispatch_to_target(from, target, &msg, &mut |peer_id, frame| {
                enqueue_or_mark(peers, log, peer_id, frame, &mut failed);
            })
        };

        for id in failed {
            self.shutdown_peer(id);
        }
        result
    }

    // ------------------------------------------------------------------
    // Service registration

    pub(crate) fn register_service_impl(&mut self, service: Arc<dyn Service>, gate: Option<Arc<Completion<()>>>) {
        debug_assert!(gate.is_none() || self.pending_acks.is_empty());

        let network = service.descriptor().network_name().to_string();

        for &msg_type in service.receive_types() {
            self.get_or_create_link(msg_type, &network).add_local_receiver(service.clone());

            if !self.receiver_keys.insert((network.clone(), msg_type.serdes_name())) {
                continue;
            }

            // First local receiver for this (network, type) pair: allocate
            // a wire index and tell every connected participant.
            let idx = self.receivers.len();
            if idx > u16::max_value() as usize {
                error!(self.log, "receiver index space exhausted"; "network" => &network);
                continue;
            }

            let subscriber = MsgSubscriber {
                receiver_idx: idx as u16,
                network_name: network.clone(),
                msg_type_name: msg_type.serdes_name().to_string(),
                version: msg_type.version(),
            };

            self.receivers.push(RegisteredReceiver {
                msg_type,
                subscriber: subscriber.clone(),
            });

            let peer_ids: Vec<PeerId> = self
                .live
                .iter()
                .copied()
                .filter(|id| Some(*id) != self.registry_peer)
                .collect();

            for peer_id in peer_ids {
                if gate.is_some() {
                    self.pending_acks.push((peer_id, subscriber.clone()));
                }

                debug!(self.log, "announcing subscription";
                       "network" => &subscriber.network_name,
                       "type" => &subscriber.msg_type_name,
                       "to" => self.peer_name(peer_id));

                let frame = SerializedMessage::subscription(
                    MsgKind::SubscriptionAnnouncement,
                    self.peer_version(peer_id),
                    &subscriber,
                );
                self.peer_send(peer_id, frame);
            }
        }

        for &msg_type in service.send_types() {
            self.get_or_create_link(msg_type, &network);
        }

        if let Some(gate) = gate {
            if self.pending_acks.is_empty() {
                gate.set(());
            } else {
                self.ack_gate = Some(gate);
            }
        }
    }

    pub(crate) fn set_history_length_impl(&mut self, network_name: &str, length: usize, msg_types: &[MsgType]) {
        for &msg_type in msg_types {
            self.get_or_create_link(msg_type, network_name).set_history_length(length);
        }
    }

    // ------------------------------------------------------------------
    // Shutdown

    pub(crate) fn shutdown_peer(&mut self, id: PeerId) {
        let mut peer = match self.peers.get_mut(id).and_then(Option::take) {
            Some(peer) => peer,
            None => return,
        };

        peer.deregister(self.poll.registry());
        self.live.shift_remove(&id);
        self.free.push(id);

        let info = peer.info().clone();

        // Let the name rejoin later.
        if !info.participant_name.is_empty() {
            self.hash_to_name.remove(&hash_str(&info.participant_name));
        }

        // A peer that vanishes mid-handshake fails the join.
        if let Some(pos) = self.pending_replies.iter().position(|pending| *pending == id) {
            self.pending_replies.remove(pos);
            self.handshake_gate.set(Err(Error::Protocol(format!(
                "participant '{}' disconnected during the handshake",
                info.participant_name
            ))));
        }

        if self.registry_peer == Some(id) {
            self.registry_peer = None;
            self.handshake_gate
                .set(Err(Error::Protocol("lost connection to the registry during the handshake".to_string())));
        }

        // Acknowledges from this peer will never arrive.
        self.pending_acks.retain(|(peer_id, _)| *peer_id != id);
        if self.pending_acks.is_empty() {
            if let Some(gate) = self.ack_gate.take() {
                gate.set(());
            }
        }

        // Reused slots must not inherit stale routes.
        for link in self.links.values_mut() {
            link.remove_peer(id);
        }

        let mut hooks = mem::take(&mut self.shutdown_hooks);
        for hook in &mut hooks {
            hook(self, id, &info);
        }
        let added_during = mem::replace(&mut self.shutdown_hooks, hooks);
        self.shutdown_hooks.extend(added_during);

        self.notify_connection_loss(&peer, &info);

        if !info.participant_name.is_empty() {
            error!(self.log, "lost connection to participant"; "name" => &info.participant_name);
        }
    }

    /// Synthesizes a lifecycle error status for the departed peer so that
    /// downstream services observe the loss as an ordinary message.
    fn notify_connection_loss(&mut self, peer: &Peer, info: &PeerInfo) {
        if self.shutting_down {
            debug!(self.log, "suppressing connection-loss status during shutdown");
            return;
        }

        if info.participant_name.is_empty() {
            // The peer never finished its handshake; nobody knows it.
            return;
        }

        let now = SystemTime::now();
        let status = ParticipantStatus {
            participant_name: info.participant_name.clone(),
            state: ParticipantState::Error,
            enter_reason: "Connection Lost".to_string(),
            enter_time: now,
            refresh_time: now,
        };

        let mut from_desc = peer.descriptor().clone();
        from_desc.set_network_name(DEFAULT_NETWORK);

        let link = self.get_or_create_link(MsgType::ParticipantStatus, DEFAULT_NETWORK);
        link.deliver_remote(&from_desc, &SimMsg::ParticipantStatus(status));
    }

    fn peer_event(&mut self, id: PeerId, readable: bool, writable: bool) {
        if readable {
            let frames = match self.peer_mut(id) {
                Some(peer) => peer.receive(),
                None => return,
            };

            match frames {
                Ok(frames) => {
                    for frame in frames {
                        if let Err(err) = self.handle_frame(id, frame) {
                            warn!(self.log, "closing peer after receive error";
                                  "peer" => id, "error" => %err);
                            self.shutdown_peer(id);
                            return;
                        }
                    }
                }
                Err(_) => {
                    self.shutdown_peer(id);
                    return;
                }
            }
        }

        if writable {
            let result = match self.peer_mut(id) {
                Some(peer) => peer.flush(),
                None => return,
            };

            if result.is_err() {
                self.shutdown_peer(id);
            }
        }
    }

    pub(crate) fn mark_shutting_down(&mut self) {
        self.shutting_down = true;
    }

    fn cleanup(&mut self) {
        self.shutting_down = true;

        #[cfg(unix)]
        {
            if let Some(path) = self.local_path.take() {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

fn enqueue_or_mark(
    peers: &mut Vec<Option<Peer>>,
    log: &logging::Logger,
    peer_id: PeerId,
    frame: SerializedMessage,
    failed: &mut Vec<PeerId>,
) {
    let peer = match peers.get_mut(peer_id).and_then(Option::as_mut) {
        Some(peer) => peer,
        None => return,
    };

    match peer.enqueue(frame) {
        Ok(()) => {}
        Err(Error::Backpressure) => {
            error!(log, "send queue soft cap exceeded, dropping frame"; "peer" => peer_id);
        }
        Err(_) => failed.push(peer_id),
    }
}

fn registry_port(config: &Config, domain_id: u32) -> u16 {
    (u32::from(config.middleware.registry.port) + domain_id) as u16
}

/// The reactor: drains dispatched tasks, then waits for socket events. All
/// peer callbacks and message dispatch run here, on one thread.
fn run_reactor(mut core: Core, shared: Arc<Shared>) {
    {
        let mut guard = match shared.reactor_thread.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(thread::current().id());
    }

    let mut events = Events::with_capacity(1024);

    loop {
        // Tasks posted from other threads, and tasks posted by callbacks on
        // this thread, all run before the reactor blocks again. This keeps
        // sends issued during message delivery ordered ahead of new I/O.
        loop {
            let task = shared.lock_tasks().pop_front();
            match task {
                Some(task) => task(&mut core),
                None => break,
            }
        }

        if shared.stop.load(Ordering::Acquire) {
            break;
        }

        if let Err(err) = core.poll.poll(&mut events, None) {
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            error!(core.log, "reactor poll failed"; "error" => %err);
            break;
        }

        for event in events.iter() {
            match event.token() {
                WAKER_TOKEN => {}
                TCP4_TOKEN | TCP6_TOKEN => core.accept_tcp(event.token()),
                #[cfg(unix)]
                LOCAL_TOKEN => core.accept_local(),
                token => {
                    if token.0 >= PEER_TOKEN_BASE {
                        core.peer_event(token.0 - PEER_TOKEN_BASE, event.is_readable(), event.is_writable());
                    }
                }
            }
        }
    }

    core.cleanup();
}

/// The process-level owner of the fabric: holds the I/O worker, hands typed
/// sends and service registrations over to it, and drives the join
/// handshake.
///
/// All methods are callable from any thread. Work is posted to the reactor
/// through a waker-backed task queue; tasks posted from within a delivery
/// callback run before the reactor blocks again, so re-entrant sends cannot
/// deadlock.
pub struct Connection {
    shared: Arc<Shared>,
    core: Option<Core>,
    worker: Option<JoinHandle<()>>,
    handshake_gate: Arc<HandshakeGate>,
    participant_name: String,
    participant_id: ParticipantId,
    config: Config,
    log: logging::Logger,
    next_endpoint_id: AtomicU64,
}

impl Connection {
    /// Creates a connection for the named participant, speaking the current
    /// protocol version.
    pub fn new(config: Config, participant_name: &str, log: &logging::Logger) -> Result<Connection> {
        Connection::with_identity(config, participant_name, hash_str(participant_name), CURRENT_VERSION, log)
    }

    /// Creates a connection that advertises an arbitrary protocol version.
    /// Used to exercise version negotiation against live peers.
    pub fn with_version(
        config: Config,
        participant_name: &str,
        version: ProtocolVersion,
        log: &logging::Logger,
    ) -> Result<Connection> {
        Connection::with_identity(config, participant_name, hash_str(participant_name), version, log)
    }

    pub(crate) fn with_identity(
        config: Config,
        participant_name: &str,
        participant_id: ParticipantId,
        version: ProtocolVersion,
        log: &logging::Logger,
    ) -> Result<Connection> {
        let (core, shared) = Core::new(config.clone(), participant_name, participant_id, version, log)?;
        let handshake_gate = core.handshake_gate.clone();

        Ok(Connection {
            shared,
            core: Some(core),
            worker: None,
            handshake_gate,
            participant_name: participant_name.to_string(),
            participant_id,
            config,
            log: log.clone(),
            next_endpoint_id: AtomicU64::new(1),
        })
    }

    #[inline]
    pub fn participant_name(&self) -> &str {
        &self.participant_name
    }

    #[inline]
    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }

    /// Allocates the next endpoint id for a controller created on this
    /// participant.
    pub fn next_endpoint_id(&self) -> EndpointId {
        self.next_endpoint_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Joins the simulation domain: opens the acceptors, connects to the
    /// registry, announces, and blocks until every currently known
    /// participant has replied or the 5 s budget expires.
    pub fn join_domain(&mut self, domain_id: u32) -> Result<()> {
        let mut core = self
            .core
            .take()
            .ok_or(Error::InvalidOperation("join_domain called on a started connection"))?;

        core.open_participant_acceptors(domain_id)?;

        // Registry contact list: local IPC first when enabled, then TCP on
        // the domain's well-known port.
        let mut registry_info = PeerInfo {
            participant_name: REGISTRY_NAME.to_string(),
            participant_id: REGISTRY_PARTICIPANT_ID,
            acceptor_uris: Vec::new(),
            capabilities: String::new(),
        };

        #[cfg(unix)]
        {
            if self.config.middleware.enable_domain_sockets {
                let path = local_endpoint_path(REGISTRY_NAME, REGISTRY_PARTICIPANT_ID, domain_id);
                registry_info
                    .acceptor_uris
                    .push(Uri::local(&path.to_string_lossy()).as_str().to_string());
            }
        }

        let registry_cfg = &self.config.middleware.registry;
        registry_info.acceptor_uris.push(
            Uri::tcp(&registry_cfg.hostname, registry_port(&self.config, domain_id))
                .as_str()
                .to_string(),
        );

        debug!(self.log, "connecting to the registry"; "uris" => format!("{:?}", registry_info.acceptor_uris));

        // The registry may still be starting up; retry with a small delay.
        let mut registry = None;
        for _ in 0..registry_cfg.connect_attempts.max(1) {
            let id = core.alloc_slot();
            match Peer::connect(id, &registry_info, &self.config.middleware, &self.log) {
                Ok(peer) => {
                    registry = Some((id, peer));
                    break;
                }
                Err(_) => {
                    core.release_slot(id);
                    thread::sleep(CONNECT_RETRY_DELAY);
                }
            }
        }

        let (id, mut peer) = registry.ok_or_else(|| {
            error!(self.log, "failed to connect to the registry";
                   "attempts" => registry_cfg.connect_attempts);
            info!(self.log, "make sure the registry is running and listening on one of: {:?}",
                  registry_info.acceptor_uris);
            Error::ConnectionRefused(REGISTRY_NAME.to_string())
        })?;

        peer.descriptor_mut().set_participant_name(REGISTRY_NAME);
        core.install_peer(id, peer)?;
        core.registry_peer = Some(id);
        core.send_announcement(id);

        self.start_worker(core)?;

        debug!(self.log, "waiting for the known participants list");

        let handshake_timeout = Duration::from_millis(self.config.middleware.handshake_timeout_ms);
        match self.handshake_gate.wait_timeout(handshake_timeout) {
            None => Err(Error::Protocol("timeout during the handshake with the registry".to_string())),
            Some(Err(err)) => Err(err),
            Some(Ok(())) => {
                trace!(self.log, "received announcement replies from all participants");
                Ok(())
            }
        }
    }

    pub(crate) fn start_worker(&mut self, core: Core) -> Result<()> {
        let shared = self.shared.clone();

        let worker = thread::Builder::new()
            .name("xbar-io".to_string())
            .spawn(move || run_reactor(core, shared))
            .map_err(|err| Error::Io(err.kind()))?;

        self.worker = Some(worker);
        Ok(())
    }

    /// Registry-side startup: opens the listening sockets on the domain's
    /// well-known port (or the explicit listen URI) and launches the
    /// reactor.
    pub(crate) fn start_registry(&mut self, domain_id: u32, listen_uri: Option<&Uri>) -> Result<()> {
        let mut core = self
            .core
            .take()
            .ok_or(Error::InvalidOperation("provide_domain called on a started connection"))?;

        core.open_registry_acceptors(domain_id, listen_uri)?;
        self.start_worker(core)
    }

    #[inline]
    pub fn logger(&self) -> &logging::Logger {
        &self.log
    }

    fn dispatch(&self, task: Task) {
        self.shared.lock_tasks().push_back(task);
        let _ = self.shared.waker.wake();
    }

    /// Registers a service: wires its receive types into the links, and
    /// announces new subscriptions to every connected participant.
    ///
    /// Blocks until all subscription acknowledges arrive, unless the
    /// service asks for asynchronous registration (which makes it safe to
    /// call from a delivery callback on the I/O thread).
    pub fn register_service(&self, service: Arc<dyn Service>) -> Result<()> {
        if self.worker.is_none() {
            return Err(Error::InvalidOperation("register_service called before joining a domain"));
        }

        let gate = if service.async_registration() || self.shared.on_reactor_thread() {
            None
        } else {
            Some(Arc::new(Completion::new()))
        };

        let task_gate = gate.clone();
        self.dispatch(Box::new(move |core| core.register_service_impl(service, task_gate)));

        if let Some(gate) = gate {
            gate.wait();
        }
        Ok(())
    }

    /// Broadcasts a typed message on the sender's network. Local receivers
    /// run on the reactor thread; remote receivers get one frame each.
    /// Errors after dispatch are logged and handled as peer shutdowns.
    pub fn send_msg<M: Into<SimMsg>>(&self, from: &ServiceDescriptor, msg: M) {
        let from = from.clone();
        let msg = msg.into();
        self.dispatch(Box::new(move |core| core.send_msg_impl(&from, msg)));
    }

    /// Sends a typed message to exactly one participant on the sender's
    /// network. Blocks for the routing result unless called from the
    /// reactor thread, where failures are logged instead.
    pub fn send_msg_to<M: Into<SimMsg>>(&self, from: &ServiceDescriptor, target: &str, msg: M) -> Result<()> {
        let from = from.clone();
        let target = target.to_string();
        let msg = msg.into();

        if self.shared.on_reactor_thread() {
            self.dispatch(Box::new(move |core| {
                if let Err(err) = core.send_msg_to_target_impl(&from, &target, msg) {
                    error!(core.log, "targeted send failed"; "target" => &target, "error" => %err);
                }
            }));
            return Ok(());
        }

        let gate: Arc<Completion<std::result::Result<(), Error>>> = Arc::new(Completion::new());
        let task_gate = gate.clone();
        self.dispatch(Box::new(move |core| {
            task_gate.set(core.send_msg_to_target_impl(&from, &target, msg));
        }));
        gate.wait()
    }

    /// Enables last-value history on the given network for the given
    /// message types. Only types with history capacity are affected.
    pub fn set_history_length(&self, network_name: &str, length: usize, msg_types: &[MsgType]) {
        let network_name = network_name.to_string();
        let msg_types = msg_types.to_vec();
        self.dispatch(Box::new(move |core| {
            core.set_history_length_impl(&network_name, length, &msg_types)
        }));
    }

    /// Posts an arbitrary closure onto the reactor thread.
    pub fn execute_deferred<F: FnOnce() + Send + 'static>(&self, function: F) {
        self.dispatch(Box::new(move |_core| function()));
    }

    /// Marks the connection as shutting down so the teardown of peer
    /// sockets is not reported as connection loss.
    pub fn notify_shutdown(&self) {
        self.dispatch(Box::new(|core| core.mark_shutting_down()));
    }

    pub(crate) fn add_announcement_hook(&mut self, hook: AnnouncementHook) {
        match self.core.as_mut() {
            Some(core) => core.announcement_hooks.push(hook),
            None => self.dispatch(Box::new(move |core| core.announcement_hooks.push(hook))),
        }
    }

    pub(crate) fn add_shutdown_hook(&mut self, hook: ShutdownHook) {
        match self.core.as_mut() {
            Some(core) => core.shutdown_hooks.push(hook),
            None => self.dispatch(Box::new(move |core| core.shutdown_hooks.push(hook))),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        let _ = self.shared.waker.wake();

        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_endpoint_path_is_bounded_and_stable() {
        let long_name = "AVeryLongParticipantNameThatWouldOverflowTheSocketPathLimit";

        let first = local_endpoint_path(long_name, 1, 42);
        let second = local_endpoint_path(long_name, 1, 42);
        assert_eq!(first, second);

        let file_name = first.file_name().unwrap().to_string_lossy().to_string();
        // 10 name chars + 16 hash digits + extension, well under the
        // AF_UNIX path limit even inside a deep temp dir.
        assert!(file_name.len() <= 10 + 16 + 5, "{}", file_name);
        assert!(file_name.starts_with("AVeryLongP"));

        // Different domains produce different sockets.
        assert_ne!(local_endpoint_path(long_name, 1, 42), local_endpoint_path(long_name, 1, 43));
    }

    #[test]
    fn test_advertised_host_substitutes_catchall() {
        let any: SocketAddr = "0.0.0.0:9001".parse().unwrap();
        assert_eq!(advertised_host(any).as_str(), "tcp://127.0.0.1:9001");

        let concrete: SocketAddr = "192.168.1.9:9001".parse().unwrap();
        assert_eq!(advertised_host(concrete).as_str(), "tcp://192.168.1.9:9001");
    }

    #[test]
    fn test_registry_port_offsets_by_domain() {
        let config = Config::default();
        assert_eq!(registry_port(&config, 0), config.middleware.registry.port);
        assert_eq!(registry_port(&config, 3), config.middleware.registry.port + 3);
    }
}
