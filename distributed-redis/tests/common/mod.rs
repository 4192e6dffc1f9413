//! In-process stand-in for a backend node.

#![allow(dead_code)]

use async_trait::async_trait;
use distributed_redis::{Client, Error, Result, RingNode, ShardMap, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub node: String,
    pub command: String,
    pub args: Vec<Vec<u8>>,
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// A tiny key-value node that records every command it receives.
///
/// Unknown commands reply with the node's name so tests can see who answered.
pub struct MockClient {
    name: String,
    log: CallLog,
    delay: Duration,
    fail_on: Option<String>,
    data: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MockClient {
    pub fn new(name: &str, log: CallLog) -> Self {
        Self {
            name: name.to_string(),
            log,
            delay: Duration::ZERO,
            fail_on: None,
            data: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_on(mut self, command: &str) -> Self {
        self.fail_on = Some(command.to_string());
        self
    }

    pub fn stored_keys(&self) -> Vec<Vec<u8>> {
        let mut keys: Vec<_> = self.data.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl RingNode for MockClient {
    fn ring_label(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Client for MockClient {
    async fn execute(&self, command: &str, args: &[Vec<u8>]) -> Result<Value> {
        self.log.lock().unwrap().push(Call {
            node: self.name.clone(),
            command: command.to_string(),
            args: args.to_vec(),
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.fail_on.as_deref() == Some(command) {
            return Err(Error::Redis(redis::RedisError::from((
                redis::ErrorKind::ResponseError,
                "mock node failure",
            ))));
        }

        let mut data = self.data.lock().unwrap();
        let reply = match command.to_ascii_uppercase().as_str() {
            "PING" => Value::SimpleString("PONG".to_string()),
            "SET" => {
                data.insert(args[0].clone(), args[1].clone());
                Value::Okay
            }
            "GET" => data
                .get(&args[0])
                .map(|v| Value::BulkString(v.clone()))
                .unwrap_or(Value::Nil),
            "MSET" => {
                for pair in args.chunks(2) {
                    data.insert(pair[0].clone(), pair[1].clone());
                }
                Value::Okay
            }
            "MGET" => Value::Array(
                args.iter()
                    .map(|k| {
                        data.get(k)
                            .map(|v| Value::BulkString(v.clone()))
                            .unwrap_or(Value::Nil)
                    })
                    .collect(),
            ),
            "DBSIZE" => Value::Int(data.len() as i64),
            "FLUSHDB" => {
                data.clear();
                Value::Okay
            }
            _ => Value::SimpleString(self.name.clone()),
        };
        Ok(reply)
    }
}

pub fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<Call> {
    log.lock().unwrap().clone()
}

/// Shard map over mock nodes given as `(name, weight)`.
pub fn cluster(nodes: &[(&str, u32)]) -> (ShardMap<MockClient>, CallLog) {
    let log = new_log();
    let clients = nodes
        .iter()
        .map(|(name, weight)| (MockClient::new(name, log.clone()), *weight))
        .collect();
    let map = ShardMap::from_clients(clients, distributed_redis::DEFAULT_REPLICAS).unwrap();
    (map, log)
}

pub fn args(items: &[&str]) -> Vec<Vec<u8>> {
    items.iter().map(|s| s.as_bytes().to_vec()).collect()
}
