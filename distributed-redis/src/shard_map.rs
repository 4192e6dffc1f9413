//! Binds ring nodes to live clients.
//!
//! A `ShardMap` owns one client per configured node and the hash ring built
//! over them, so a ring lookup resolves straight to the client. It is
//! immutable: a topology change means building a new map and publishing it
//! (see [`crate::DistributedRedis::replace_shard_map`]).

use shard_hashring::{hash_key, HashRing};
use std::sync::Arc;

use crate::client::{Client, RedisClient};
use crate::config::{NodeSpec, ShardOptions};
use crate::{Error, Result};

/// Keys owned by one client, in the order they were given.
#[derive(Debug, Clone)]
pub struct KeyGroup<C, K> {
    pub client: Arc<C>,
    pub keys: Vec<K>,
}

pub struct ShardMap<C> {
    ring: HashRing<Arc<C>>,
}

impl ShardMap<RedisClient> {
    /// Open one Redis client per node spec and build the ring over them.
    ///
    /// No connection is made here; each client connects on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `specs` is empty, a weight is not a
    /// positive integer, or `options.replicas` is zero.
    pub fn connect(specs: &[NodeSpec], options: &ShardOptions) -> Result<Self> {
        if specs.is_empty() {
            return Err(Error::config("at least one node is required"));
        }

        let mut clients = Vec::with_capacity(specs.len());
        for spec in specs {
            let weight = spec.weight()?;
            clients.push((RedisClient::open(spec, options.socket_timeout)?, weight));
        }

        Self::from_clients(clients, options.replicas)
    }
}

impl<C: Client> ShardMap<C> {
    pub fn from_clients(clients: Vec<(C, u32)>, replicas: u32) -> Result<Self> {
        let ring = HashRing::build_with_replicas(
            clients
                .into_iter()
                .map(|(client, weight)| (Arc::new(client), weight)),
            replicas,
        )?;

        tracing::info!(
            nodes = ring.node_count(),
            total_weight = ring.total_weight(),
            vnodes = ring.vnode_count(),
            "Shard map built"
        );

        Ok(Self { ring })
    }

    /// The client that owns `key`, honoring `{tag}` hash tags.
    pub fn client_for(&self, key: &[u8]) -> &Arc<C> {
        self.ring.locate(hash_key(key))
    }

    /// Construction index of the client that owns `key`.
    pub fn index_for(&self, key: &[u8]) -> usize {
        self.ring.locate_index(hash_key(key))
    }

    /// Every client in construction order.
    pub fn all_clients(&self) -> &[Arc<C>] {
        self.ring.nodes()
    }

    pub fn node_count(&self) -> usize {
        self.ring.node_count()
    }

    pub fn ring(&self) -> &HashRing<Arc<C>> {
        &self.ring
    }

    /// Partition `keys` by owning client.
    ///
    /// Groups come back in client enumeration order and only for clients
    /// that own at least one key; each group keeps its keys' relative order.
    pub fn group_keys_by_client<K, I>(&self, keys: I) -> Vec<KeyGroup<C, K>>
    where
        K: AsRef<[u8]>,
        I: IntoIterator<Item = K>,
    {
        let mut buckets: Vec<Vec<K>> = (0..self.node_count()).map(|_| Vec::new()).collect();
        for key in keys {
            let index = self.index_for(key.as_ref());
            buckets[index].push(key);
        }
        self.collect_groups(buckets)
    }

    /// Like [`group_keys_by_client`](Self::group_keys_by_client), but each
    /// group holds positions into `keys` rather than the keys themselves.
    pub fn group_indices_by_client<K, I>(&self, keys: I) -> Vec<KeyGroup<C, usize>>
    where
        K: AsRef<[u8]>,
        I: IntoIterator<Item = K>,
    {
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); self.node_count()];
        for (position, key) in keys.into_iter().enumerate() {
            buckets[self.index_for(key.as_ref())].push(position);
        }
        self.collect_groups(buckets)
    }

    fn collect_groups<K>(&self, buckets: Vec<Vec<K>>) -> Vec<KeyGroup<C, K>> {
        self.ring
            .nodes()
            .iter()
            .zip(buckets)
            .filter(|(_, keys)| !keys.is_empty())
            .map(|(client, keys)| KeyGroup {
                client: client.clone(),
                keys,
            })
            .collect()
    }
}
