use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use plinth::completion::Completion;
use plinth::logging::{self, debug, info};

use crate::config::Config;
use crate::connection::{Connection, REGISTRY_NAME};
use crate::error::Result;
use crate::peer::PeerId;
use crate::protocol::{PeerInfo, ProtocolVersion, CURRENT_VERSION};
use crate::service::REGISTRY_PARTICIPANT_ID;
use crate::uri::Uri;

type ParticipantList = Arc<Mutex<Vec<(PeerId, PeerInfo)>>>;

fn lock(list: &ParticipantList) -> MutexGuard<Vec<(PeerId, PeerInfo)>> {
    match list.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The bootstrap broker: a specialized connection whose sole job is to
/// answer every participant announcement with the census of currently
/// connected peers, and to drop departed peers from that census.
///
/// Participants connect here first, learn who else is in the domain, and
/// then talk to each other directly; the registry carries no simulation
/// traffic.
pub struct Registry {
    connection: Connection,
    participants: ParticipantList,
    all_disconnected: Arc<Completion<()>>,
    log: logging::Logger,
}

impl Registry {
    pub fn new(config: Config, log: &logging::Logger) -> Result<Registry> {
        Registry::with_version(config, CURRENT_VERSION, log)
    }

    /// A registry advertising an arbitrary protocol version, for
    /// compatibility testing against live participants.
    pub fn with_version(config: Config, version: ProtocolVersion, log: &logging::Logger) -> Result<Registry> {
        let mut connection =
            Connection::with_identity(config, REGISTRY_NAME, REGISTRY_PARTICIPANT_ID, version, log)?;

        let participants: ParticipantList = Arc::new(Mutex::new(Vec::new()));
        let all_disconnected = Arc::new(Completion::new());

        let announce_list = participants.clone();
        let announce_log = connection.logger().clone();
        connection.add_announcement_hook(Box::new(move |core, peer_id, announcement| {
            // The census is sent before the newcomer is inserted, so a
            // participant never sees itself in the list.
            let mut list = lock(&announce_list);
            let infos: Vec<PeerInfo> = list.iter().map(|(_, info)| info.clone()).collect();
            core.send_known_participants(peer_id, infos);

            info!(announce_log, "participant joined";
                  "name" => &announcement.peer_info.participant_name,
                  "total" => list.len() + 1);

            list.retain(|(id, _)| *id != peer_id);
            list.push((peer_id, announcement.peer_info.clone()));
        }));

        let shutdown_list = participants.clone();
        let shutdown_gate = all_disconnected.clone();
        let shutdown_log = connection.logger().clone();
        connection.add_shutdown_hook(Box::new(move |_core, peer_id, info| {
            let mut list = lock(&shutdown_list);
            let before = list.len();
            list.retain(|(id, _)| *id != peer_id);

            if list.len() != before {
                info!(shutdown_log, "participant left";
                      "name" => &info.participant_name,
                      "total" => list.len());

                if list.is_empty() {
                    shutdown_gate.set(());
                }
            }
        }));

        let log = log.new(logging::o!("registry" => true));

        Ok(Registry {
            connection,
            participants,
            all_disconnected,
            log,
        })
    }

    /// Starts brokering the given domain: listens on the domain's
    /// well-known TCP port (and the local IPC socket when enabled) and
    /// serves announcements until dropped.
    pub fn provide_domain(&mut self, domain_id: u32) -> Result<()> {
        debug!(self.log, "providing domain"; "domain" => domain_id);
        self.connection.start_registry(domain_id, None)
    }

    /// Starts brokering on an explicit listen URI (`tcp://host:port` or
    /// `local://path`) instead of the domain's well-known endpoints.
    pub fn provide_domain_uri(&mut self, listen_uri: &str) -> Result<()> {
        let uri = Uri::parse(listen_uri)?;
        debug!(self.log, "providing domain"; "listen" => listen_uri);
        self.connection.start_registry(0, Some(&uri))
    }

    /// Number of currently connected participants.
    pub fn participant_count(&self) -> usize {
        lock(&self.participants).len()
    }

    /// Blocks until every participant has disconnected after at least one
    /// was connected. Returns false on timeout.
    pub fn wait_all_disconnected(&self, timeout: Duration) -> bool {
        self.all_disconnected.wait_timeout(timeout).is_some()
    }

    #[inline]
    pub fn logger(&self) -> &logging::Logger {
        &self.log
    }
}
