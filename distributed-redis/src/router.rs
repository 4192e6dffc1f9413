use arc_swap::ArcSwap;
use futures::future::{join_all, try_join_all};
use redis::Value;
use shard_hashring::RingNode;
use std::sync::Arc;

use crate::client::{Client, RedisClient};
use crate::config::{NodeSpec, ShardConfig, ShardOptions};
use crate::policy::{CommandPolicy, Dispatch};
use crate::shard_map::ShardMap;
use crate::{Error, Result};

/// Result of [`DistributedRedis::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Reply of the one node that owns the key.
    Single(Value),
    /// One reply per node, in shard map order.
    PerNode(Vec<Value>),
}

impl Response {
    pub fn into_single(self) -> Option<Value> {
        match self {
            Self::Single(value) => Some(value),
            Self::PerNode(_) => None,
        }
    }

    pub fn into_per_node(self) -> Option<Vec<Value>> {
        match self {
            Self::Single(_) => None,
            Self::PerNode(values) => Some(values),
        }
    }
}

/// Addresses many independent instances as one logical store.
///
/// Each command is classified by the [`CommandPolicy`]: unsafe commands are
/// rejected without touching the network, fan-out commands run on every
/// node, everything else goes to the node owning its key.
///
/// The shard map is held behind an [`ArcSwap`]. Every call works on the
/// snapshot it loaded, so [`replace_shard_map`](Self::replace_shard_map)
/// never disturbs in-flight commands.
pub struct DistributedRedis<C = RedisClient> {
    shards: ArcSwap<ShardMap<C>>,
    policy: CommandPolicy,
}

impl DistributedRedis<RedisClient> {
    pub fn builder() -> DistributedRedisBuilder {
        DistributedRedisBuilder::default()
    }

    pub fn connect(config: &ShardConfig) -> Result<Self> {
        Self::builder()
            .nodes(config.nodes.clone())
            .options(config.options())
            .build()
    }
}

impl<C: Client> DistributedRedis<C> {
    pub fn from_shard_map(shards: ShardMap<C>, policy: CommandPolicy) -> Self {
        Self {
            shards: ArcSwap::from_pointee(shards),
            policy,
        }
    }

    pub fn policy(&self) -> &CommandPolicy {
        &self.policy
    }

    /// Current topology snapshot.
    pub fn shard_map(&self) -> Arc<ShardMap<C>> {
        self.shards.load_full()
    }

    /// Publish a new topology and return the previous one.
    pub fn replace_shard_map(&self, shards: ShardMap<C>) -> Arc<ShardMap<C>> {
        let nodes = shards.node_count();
        let previous = self.shards.swap(Arc::new(shards));
        tracing::info!(
            previous_nodes = previous.node_count(),
            nodes,
            "Shard map replaced"
        );
        previous
    }

    /// Run `command` with `args`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsafeMultiNodeCommand`] for unsafe commands; no node is
    ///   contacted.
    /// - [`Error::MissingKey`] for a routed command without its key argument.
    /// - Any node error, unchanged. During fan-out the first failure aborts
    ///   the whole call.
    pub async fn execute(&self, command: &str, args: &[Vec<u8>]) -> Result<Response> {
        let shards = self.shards.load_full();

        match self.policy.classify(command, args)? {
            Dispatch::Unsafe => {
                tracing::debug!(command, "Rejected unsafe multi-node command");
                Err(Error::UnsafeMultiNodeCommand(command.to_string()))
            }
            Dispatch::FanOut => {
                tracing::debug!(command, nodes = shards.node_count(), "Fanning out command");
                let calls = shards
                    .all_clients()
                    .iter()
                    .map(|client| execute_logged(client.as_ref(), command, args));
                let replies = try_join_all(calls).await?;
                Ok(Response::PerNode(replies))
            }
            Dispatch::Routed { key } => {
                let client = shards.client_for(key);
                tracing::debug!(command, node = client.ring_label(), "Routing command");
                let reply = client.execute(command, args).await?;
                Ok(Response::Single(reply))
            }
        }
    }

    /// Run `command` on every node and keep every outcome.
    ///
    /// Unlike the fan-out path of [`execute`](Self::execute), one failing
    /// node does not hide the others' replies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsafeMultiNodeCommand`] for unsafe commands and
    /// [`Error::NotFanOut`] for anything the policy routes to a single
    /// owner. Neither contacts a node.
    pub async fn execute_on_all_settled(
        &self,
        command: &str,
        args: &[Vec<u8>],
    ) -> Result<Vec<Result<Value>>> {
        if self.policy.is_unsafe(command) {
            return Err(Error::UnsafeMultiNodeCommand(command.to_string()));
        }
        if !self.policy.is_fan_out(command) {
            return Err(Error::NotFanOut(command.to_string()));
        }

        let shards = self.shards.load_full();
        let calls = shards
            .all_clients()
            .iter()
            .map(|client| execute_logged(client.as_ref(), command, args));
        Ok(join_all(calls).await)
    }

    /// Fetch `keys` from whichever nodes own them, one `MGET` per node.
    ///
    /// Not atomic across nodes. Replies come back in the order of `keys`.
    pub async fn mget<K>(&self, keys: &[K]) -> Result<Vec<Value>>
    where
        K: AsRef<[u8]> + Sync,
    {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let shards = self.shards.load_full();
        let groups = shards.group_indices_by_client(keys);

        let calls = groups.into_iter().map(|group| async move {
            let args: Vec<Vec<u8>> = group
                .keys
                .iter()
                .map(|&i| keys[i].as_ref().to_vec())
                .collect();
            match execute_logged(group.client.as_ref(), "MGET", &args).await? {
                Value::Array(values) if values.len() == group.keys.len() => {
                    Ok((group.keys, values))
                }
                other => Err(Error::unexpected_reply(format!(
                    "MGET on {} returned {:?}",
                    group.client.ring_label(),
                    other
                ))),
            }
        });

        let mut replies = vec![Value::Nil; keys.len()];
        for (positions, values) in try_join_all(calls).await? {
            for (position, value) in positions.into_iter().zip(values) {
                replies[position] = value;
            }
        }
        Ok(replies)
    }

    /// Store `pairs`, one `MSET` per owning node.
    ///
    /// Not atomic across nodes: if one node fails, others may already have
    /// applied their part.
    pub async fn mset<K, V>(&self, pairs: &[(K, V)]) -> Result<()>
    where
        K: AsRef<[u8]> + Sync,
        V: AsRef<[u8]> + Sync,
    {
        if pairs.is_empty() {
            return Ok(());
        }

        let shards = self.shards.load_full();
        let groups = shards.group_indices_by_client(pairs.iter().map(|(key, _)| key));

        let calls = groups.into_iter().map(|group| async move {
            let mut args = Vec::with_capacity(group.keys.len() * 2);
            for &i in &group.keys {
                let (key, value) = &pairs[i];
                args.push(key.as_ref().to_vec());
                args.push(value.as_ref().to_vec());
            }
            match execute_logged(group.client.as_ref(), "MSET", &args).await? {
                Value::Okay => Ok(()),
                Value::SimpleString(ref s) if s == "OK" => Ok(()),
                other => Err(Error::unexpected_reply(format!(
                    "MSET on {} returned {:?}",
                    group.client.ring_label(),
                    other
                ))),
            }
        });

        try_join_all(calls).await?;
        Ok(())
    }
}

async fn execute_logged<C: Client + ?Sized>(
    client: &C,
    command: &str,
    args: &[Vec<u8>],
) -> Result<Value> {
    client.execute(command, args).await.map_err(|e| {
        tracing::warn!(command, node = client.ring_label(), "Node call failed: {}", e);
        e
    })
}

/// Builds a [`DistributedRedis`] over Redis nodes.
///
/// Either `nodes` or a prebuilt `shard_map` must be given; the shard map
/// wins when both are.
#[derive(Default)]
pub struct DistributedRedisBuilder {
    nodes: Vec<NodeSpec>,
    shard_map: Option<ShardMap<RedisClient>>,
    options: ShardOptions,
    policy: CommandPolicy,
}

impl DistributedRedisBuilder {
    pub fn nodes(mut self, nodes: Vec<NodeSpec>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn shard_map(mut self, shard_map: ShardMap<RedisClient>) -> Self {
        self.shard_map = Some(shard_map);
        self
    }

    pub fn options(mut self, options: ShardOptions) -> Self {
        self.options = options;
        self
    }

    pub fn policy(mut self, policy: CommandPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] if neither nodes nor a shard map were given,
    /// or if the nodes are invalid.
    pub fn build(self) -> Result<DistributedRedis<RedisClient>> {
        let shards = match self.shard_map {
            Some(shard_map) => shard_map,
            None if self.nodes.is_empty() => {
                return Err(Error::config(
                    "DistributedRedis requires either nodes or a prebuilt shard map",
                ));
            }
            None => ShardMap::connect(&self.nodes, &self.options)?,
        };
        Ok(DistributedRedis::from_shard_map(shards, self.policy))
    }
}
