//! Client configuration and its defaults

use crate::{auth::CredentialStore, error::*};
use directories::BaseDirs;
use std::{path::*, time::Duration};

/// containerd namespace images are pulled into
pub const DEFAULT_NAMESPACE: &str = "regclient";

/// containerd gRPC socket
pub const DEFAULT_CONTAINERD_SOCKET: &str = "/run/containerd/containerd.sock";

/// Directory overriding `~/.docker`, as honored by the docker CLI
pub const DOCKER_CONFIG_ENV: &str = "DOCKER_CONFIG";

/// Path of docker's `config.json`
pub fn docker_config_path() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(DOCKER_CONFIG_ENV) {
        return Ok(PathBuf::from(dir).join("config.json"));
    }
    let dirs = BaseDirs::new().ok_or(Error::NoValidHomeDirectory)?;
    Ok(dirs.home_dir().join(".docker/config.json"))
}

/// Settings of the HTTP transport shared by all registry requests
///
/// Connections are kept alive in ureq's pool, which holds at most
/// `max_idle_connections` idle connections and evicts the oldest first.
/// ureq has no idle lifetime of its own, nor a timeout dedicated to the TLS
/// handshake; the handshake is bounded by `io_timeout`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Timeout of each socket read and write, which also bounds the TLS handshake
    pub io_timeout: Duration,
    /// Idle keep-alive connections kept in the pool, over all hosts
    pub max_idle_connections: usize,
    /// Idle keep-alive connections kept in the pool for a single host
    pub max_idle_connections_per_host: usize,
    /// Skip TLS certificate verification, for registries with self-signed certificates
    pub accept_invalid_certs: bool,
    /// Honor `HTTPS_PROXY` and friends
    pub proxy_from_env: bool,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(10),
            max_idle_connections: 100,
            max_idle_connections_per_host: 10,
            accept_invalid_certs: false,
            proxy_from_env: true,
            user_agent: format!("regclient/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Everything a backend is constructed from
///
/// Built by [`crate::ClientBuilder`], immutable once handed to a backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub transport: TransportConfig,
    /// Explicit credentials while building, merged with the credential file afterwards
    pub credentials: CredentialStore,
    /// docker `config.json` to read credentials from, `None` disables it
    pub config_file: Option<PathBuf>,
    pub containerd_socket: PathBuf,
    pub namespace: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let config_file = match docker_config_path() {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        };
        ClientConfig {
            transport: TransportConfig::default(),
            credentials: CredentialStore::default(),
            config_file,
            containerd_socket: PathBuf::from(DEFAULT_CONTAINERD_SOCKET),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}
