use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Value;
use shard_hashring::RingNode;
use std::fmt;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::config::NodeSpec;
use crate::Result;

/// A session bound to exactly one backend node.
///
/// The router treats replies as opaque and hands them back unmodified.
/// Serializing concurrent use is the client's own business.
#[async_trait]
pub trait Client: RingNode + Send + Sync {
    async fn execute(&self, command: &str, args: &[Vec<u8>]) -> Result<Value>;
}

/// [`Client`] backed by a single Redis instance.
///
/// Construction does no I/O. The multiplexed connection is opened on the
/// first command and shared by every later one.
pub struct RedisClient {
    client: redis::Client,
    label: String,
    socket_timeout: Option<Duration>,
    conn: OnceCell<MultiplexedConnection>,
}

impl RedisClient {
    pub fn open(spec: &NodeSpec, socket_timeout: Option<Duration>) -> Result<Self> {
        let client = redis::Client::open(spec.connection_info())?;
        Ok(Self {
            client,
            label: spec.label(),
            socket_timeout,
            conn: OnceCell::new(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let conn = match self.socket_timeout {
                    Some(timeout) => {
                        self.client
                            .get_multiplexed_async_connection_with_timeouts(timeout, timeout)
                            .await?
                    }
                    None => self.client.get_multiplexed_async_connection().await?,
                };
                tracing::debug!(node = %self.label, "Connected to shard");
                Ok::<_, crate::Error>(conn)
            })
            .await?;
        Ok(conn.clone())
    }
}

impl RingNode for RedisClient {
    fn ring_label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisClient")
            .field("label", &self.label)
            .field("connected", &self.conn.initialized())
            .finish()
    }
}

#[async_trait]
impl Client for RedisClient {
    async fn execute(&self, command: &str, args: &[Vec<u8>]) -> Result<Value> {
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd(command);
        for arg in args {
            cmd.arg(arg.as_slice());
        }
        let value = cmd.query_async::<Value>(&mut conn).await?;
        Ok(value)
    }
}
