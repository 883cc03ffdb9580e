use std::fs;
use std::path::Path;

use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_REGISTRY_PORT: u16 = 8500;

/// How to reach the registry process. The effective TCP port is
/// `port + domain_id`, so concurrent simulations on one host stay apart.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub hostname: String,
    pub port: u16,
    /// The registry may still be starting up; connection attempts are
    /// retried this many times, 100 ms apart.
    pub connect_attempts: u32,
}

impl Default for RegistryConfig {
    fn default() -> RegistryConfig {
        RegistryConfig {
            hostname: "localhost".to_string(),
            port: DEFAULT_REGISTRY_PORT,
            connect_attempts: 10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MiddlewareConfig {
    pub registry: RegistryConfig,
    /// Accept and prefer local domain sockets for same-host peers.
    pub enable_domain_sockets: bool,
    pub tcp_no_delay: bool,
    /// Soft cap on a peer's outbound queue, in bytes. Unset means the queue
    /// is unbounded and a slow peer can accumulate arbitrary backlog.
    pub send_queue_cap: Option<usize>,
    /// Time budget for the whole join handshake, in milliseconds.
    pub handshake_timeout_ms: u64,
}

impl Default for MiddlewareConfig {
    fn default() -> MiddlewareConfig {
        MiddlewareConfig {
            registry: RegistryConfig::default(),
            enable_domain_sockets: true,
            tcp_no_delay: true,
            send_queue_cap: None,
            handshake_timeout_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> LoggingConfig {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

/// The participant configuration document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Overrides the participant name passed at construction time.
    pub participant_name: Option<String>,
    pub middleware: MiddlewareConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads a configuration document, choosing the format by extension:
    /// `.json` or `.toml`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "json" => {
                let file = fs::File::open(path)
                    .map_err(|err| Error::Configuration(format!("cannot open {}: {}", path.display(), err)))?;
                serde_json::from_reader(file)
                    .map_err(|err| Error::Configuration(format!("cannot parse {}: {}", path.display(), err)))
            }
            "toml" => serdeconv::from_toml_file(path)
                .map_err(|err| Error::Configuration(format!("cannot parse {}: {}", path.display(), err))),
            other => Err(Error::Configuration(format!(
                "unsupported configuration format '{}' for {}",
                other,
                path.display()
            ))),
        }
    }
}
