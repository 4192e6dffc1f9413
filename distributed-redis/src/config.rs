//! Node and shard configuration.
//!
//! Nodes are usually described as a JSON array:
//!
//! ```json
//! [
//!   {"host": "cache-a", "weight": 1},
//!   {"host": "cache-b", "port": 6380, "db": 2, "password": "secret", "weight": "2"}
//! ]
//! ```

use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use serde::{Deserialize, Serialize};
use shard_hashring::DEFAULT_REPLICAS;
use std::env;
use std::fmt;
use std::time::Duration;

use crate::{Error, Result};

pub const DEFAULT_PORT: u16 = 6379;

const SHARDS_VAR: &str = "REDIS_SHARDS";
const REPLICAS_VAR: &str = "REDIS_SHARD_REPLICAS";
const SOCKET_TIMEOUT_VAR: &str = "REDIS_SOCKET_TIMEOUT_MS";

/// Configured weight of a node, as written in the configuration.
///
/// Accepts anything that reads as a positive integer: `3`, `3.0` or `"3"`.
/// Validation happens in [`Weight::parse`] so a bad value is reported with
/// the node it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Weight {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Default for Weight {
    fn default() -> Self {
        Self::Integer(1)
    }
}

impl From<u32> for Weight {
    fn from(weight: u32) -> Self {
        Self::Integer(i64::from(weight))
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{}", n),
            Self::Float(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl Weight {
    pub fn parse(&self) -> std::result::Result<u32, String> {
        let value = match self {
            Self::Integer(n) => Some(*n),
            Self::Float(n) if n.fract() == 0.0 && *n >= 1.0 && *n <= f64::from(u32::MAX) => {
                Some(*n as i64)
            }
            Self::Float(_) => None,
            Self::Text(s) => s.trim().parse::<i64>().ok(),
        };

        value
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("'weight' must be a positive integer, got {}", self))
    }
}

/// One backend instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub db: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub weight: Weight,
    /// Overrides the `host:port/db` label hashed onto the ring. Set it when
    /// an address may change but the node's keys should stay put.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl NodeSpec {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            db: 0,
            password: None,
            weight: Weight::default(),
            name: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_weight(mut self, weight: impl Into<Weight>) -> Self {
        self.weight = weight.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parse `host[:port][/db]`.
    ///
    /// IPv6 hosts take a port only inside brackets (`[::1]:6380/2`); a bare
    /// IPv6 address such as `::1` is read as the host alone.
    pub fn parse_address(address: &str) -> Result<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(Error::config("empty node address"));
        }
        let invalid = |what: &str| {
            Error::config(format!("invalid {} in node address '{}'", what, address))
        };

        let (rest, db) = match address.rsplit_once('/') {
            Some((rest, db)) => (rest, Some(db.parse::<i64>().map_err(|_| invalid("db"))?)),
            None => (address, None),
        };

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, tail) = bracketed.split_once(']').ok_or_else(|| invalid("host"))?;
            match tail {
                "" => (host, None),
                _ => {
                    let port = tail.strip_prefix(':').ok_or_else(|| invalid("port"))?;
                    (host, Some(port))
                }
            }
        } else if rest.matches(':').count() > 1 {
            (rest, None)
        } else {
            match rest.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (rest, None),
            }
        };

        if host.is_empty() {
            return Err(Error::config(format!(
                "missing host in node address '{}'",
                address
            )));
        }

        let mut spec = Self::new(host);
        if let Some(port) = port {
            spec = spec.with_port(port.parse::<u16>().map_err(|_| invalid("port"))?);
        }
        if let Some(db) = db {
            spec = spec.with_db(db);
        }
        Ok(spec)
    }

    /// Label hashed onto the ring.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}:{}/{}", self.host, self.port, self.db),
        }
    }

    /// Validated weight.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming this node if the weight is not a
    /// positive integer.
    pub fn weight(&self) -> Result<u32> {
        self.weight
            .parse()
            .map_err(|msg| Error::config(format!("node {}: {}", self.label(), msg)))
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.db,
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }
}

/// Options applied to every node of a shard map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardOptions {
    /// Virtual ring positions per unit of weight.
    pub replicas: u32,
    /// Used as both connect and response timeout. `None` waits forever.
    pub socket_timeout: Option<Duration>,
}

impl Default for ShardOptions {
    fn default() -> Self {
        Self {
            replicas: DEFAULT_REPLICAS,
            socket_timeout: None,
        }
    }
}

/// Full shard configuration, loadable from JSON or the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardConfig {
    pub nodes: Vec<NodeSpec>,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_timeout_ms: Option<u64>,
}

fn default_replicas() -> u32 {
    DEFAULT_REPLICAS
}

impl ShardConfig {
    pub fn new(nodes: Vec<NodeSpec>) -> Self {
        Self {
            nodes,
            replicas: DEFAULT_REPLICAS,
            socket_timeout_ms: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(format!("invalid shard config: {}", e)))
    }

    /// Load from `REDIS_SHARDS`, `REDIS_SHARD_REPLICAS` and
    /// `REDIS_SOCKET_TIMEOUT_MS`.
    ///
    /// `REDIS_SHARDS` is either a JSON array of node specs or a
    /// comma-separated `host[:port]` list.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let shards = lookup(SHARDS_VAR)
            .ok_or_else(|| Error::config(format!("{} is not set", SHARDS_VAR)))?;
        let nodes = parse_node_list(&shards)?;

        let replicas = match lookup(REPLICAS_VAR) {
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                Error::config(format!("{} must be a positive integer, got '{}'", REPLICAS_VAR, raw))
            })?,
            None => DEFAULT_REPLICAS,
        };

        let socket_timeout_ms = match lookup(SOCKET_TIMEOUT_VAR) {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                Error::config(format!("{} must be milliseconds, got '{}'", SOCKET_TIMEOUT_VAR, raw))
            })?),
            None => None,
        };

        Ok(Self {
            nodes,
            replicas,
            socket_timeout_ms,
        })
    }

    pub fn options(&self) -> ShardOptions {
        ShardOptions {
            replicas: self.replicas,
            socket_timeout: self.socket_timeout_ms.map(Duration::from_millis),
        }
    }
}

fn parse_node_list(raw: &str) -> Result<Vec<NodeSpec>> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        return serde_json::from_str(raw)
            .map_err(|e| Error::config(format!("{}: {}", SHARDS_VAR, e)));
    }
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(NodeSpec::parse_address)
        .collect()
}
