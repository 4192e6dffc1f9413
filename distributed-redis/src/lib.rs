//! Consistent-hashing router over independent Redis instances.
//!
//! This crate provides:
//! - [`ShardMap`]: one client per configured node plus the weighted hash ring
//!   built over them
//! - [`DistributedRedis`]: a router that rejects unsafe commands, fans
//!   administrative commands out to every node, and sends everything else
//!   to the node owning its key
//! - [`Client`]: the per-node capability, with a Redis implementation
//!   ([`RedisClient`]) on multiplexed tokio connections
//!
//! Keys containing `{tag}` are placed by `tag` alone, so related keys can be
//! forced onto one node.
//!
//! # Example
//!
//! ```rust,ignore
//! use distributed_redis::{DistributedRedis, NodeSpec, Response};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let redis = DistributedRedis::builder()
//!         .node(NodeSpec::new("cache-a"))
//!         .node(NodeSpec::new("cache-b").with_weight(2u32))
//!         .build()?;
//!
//!     // Routed to the node owning "user:1"
//!     redis.execute("SET", &[b"user:1".to_vec(), b"alice".to_vec()]).await?;
//!
//!     // Runs on every node, one reply each
//!     if let Response::PerNode(sizes) = redis.execute("DBSIZE", &[]).await? {
//!         println!("{sizes:?}");
//!     }
//!
//!     // Rejected before any node is contacted
//!     assert!(redis.execute("RENAME", &[b"a".to_vec(), b"b".to_vec()]).await.is_err());
//!     Ok(())
//! }
//! ```
//!
//! # Topology changes
//!
//! Rings are never mutated. Build a new [`ShardMap`] and publish it with
//! [`DistributedRedis::replace_shard_map`]; in-flight commands finish on the
//! snapshot they started with.

mod client;
pub mod config;
mod error;
mod policy;
mod router;
mod shard_map;

pub use client::{Client, RedisClient};
pub use config::{NodeSpec, ShardConfig, ShardOptions, Weight};
pub use error::{Error, Result};
pub use policy::{CommandPolicy, Dispatch, FAN_OUT_COMMANDS, UNSAFE_COMMANDS};
pub use router::{DistributedRedis, DistributedRedisBuilder, Response};
pub use shard_map::{KeyGroup, ShardMap};

pub use redis::Value;
pub use shard_hashring::{hash_key, HashRing, RingNode, DEFAULT_REPLICAS, MAX_VNODES};
