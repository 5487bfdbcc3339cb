use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClusterConfig {
    /// Human-readable member name; defaults to the listen address when empty
    #[serde(default)]
    pub node_name: String,

    /// Bind address for the peer broadcast endpoint
    #[serde(default = "default_listen_peer_addr")]
    pub listen_peer_addr: SocketAddr,

    /// Address advertised to peers; falls back to the listen address
    #[serde(default)]
    pub advertise_addr: String,

    /// Seed addresses of live members to join through (host:port)
    #[serde(default)]
    pub peer_seeds: Vec<String>,

    #[serde(default = "default_connect_timeout_in_ms")]
    pub connect_timeout_in_ms: u64,

    #[serde(default = "default_request_timeout_in_ms")]
    pub request_timeout_in_ms: u64,

    #[serde(default = "default_db_dir")]
    pub db_root_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_name: String::new(),
            listen_peer_addr: default_listen_peer_addr(),
            advertise_addr: String::new(),
            peer_seeds: vec![],
            connect_timeout_in_ms: default_connect_timeout_in_ms(),
            request_timeout_in_ms: default_request_timeout_in_ms(),
            db_root_dir: default_db_dir(),
            log_dir: default_log_dir(),
        }
    }
}

impl ClusterConfig {
    /// Validates cluster configuration consistency
    /// # Errors
    /// Returns `Error::InvalidConfig` if any configuration rules are violated
    pub fn validate(&self) -> Result<()> {
        if self.listen_peer_addr.port() == 0 {
            return Err(Error::InvalidConfig(
                "listen_peer_addr must specify a non-zero port".into(),
            ));
        }

        if !self.advertise_addr.is_empty() && self.advertise_addr.parse::<SocketAddr>().is_err() {
            return Err(Error::InvalidConfig(format!(
                "advertise_addr {} is not a host:port address",
                self.advertise_addr
            )));
        }

        for seed in &self.peer_seeds {
            if seed.parse::<SocketAddr>().is_err() {
                return Err(Error::InvalidConfig(format!(
                    "peer seed {} is not a host:port address",
                    seed
                )));
            }
        }

        if self.db_root_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("db_root_dir path cannot be empty".into()));
        }

        Ok(())
    }

    /// The address peers should dial: advertise_addr when set, listen
    /// address otherwise.
    pub fn peer_address(&self) -> String {
        if self.advertise_addr.is_empty() {
            self.listen_peer_addr.to_string()
        } else {
            self.advertise_addr.clone()
        }
    }

    /// Member name, defaulting to the dialable address.
    pub fn member_name(&self) -> String {
        if self.node_name.is_empty() {
            self.peer_address()
        } else {
            self.node_name.clone()
        }
    }
}

fn default_listen_peer_addr() -> SocketAddr {
    "127.0.0.1:5931".parse().unwrap()
}
fn default_connect_timeout_in_ms() -> u64 {
    200
}
fn default_request_timeout_in_ms() -> u64 {
    500
}
fn default_db_dir() -> PathBuf {
    PathBuf::from("/tmp/labkv/db")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("/tmp/labkv/logs")
}
