//! Weighted consistent hashing for sharding keys across independent nodes.
//!
//! This crate provides:
//! - A hash ring with virtual nodes proportional to each node's weight
//! - Deterministic, allocation-free key lookups (binary search over sorted positions)
//! - Hash-tag classification so callers can force unrelated keys onto one node
//!
//! The ring is immutable once built. Membership changes are handled by
//! building a new ring and swapping it in; only the keys owned by the
//! affected virtual positions move (about `weight / total_weight` of the
//! keyspace per removed node).
//!
//! # Example
//!
//! ```rust
//! use shard_hashring::{hash_key, HashRing};
//!
//! let ring = HashRing::build(vec![
//!     ("cache-a:6379/0".to_string(), 1),
//!     ("cache-b:6379/0".to_string(), 1),
//!     ("cache-c:6379/0".to_string(), 2),
//! ])
//! .unwrap();
//!
//! // Keys sharing a `{tag}` always land on the same node.
//! let a = ring.locate(hash_key(b"{user:1}profile"));
//! let b = ring.locate(hash_key(b"{user:1}sessions"));
//! assert_eq!(a, b);
//! ```

mod error;
mod ring;
mod tag;

pub use error::Error;
pub use ring::{HashRing, RingNode, DEFAULT_REPLICAS, MAX_VNODES};
pub use tag::{has_hash_tag, hash_key};
