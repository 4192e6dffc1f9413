//! Line-driven shell over a sharded set of Redis nodes.
//!
//! Reads the topology from `REDIS_SHARDS` (see `ShardConfig::from_env`) and
//! then one command per line from stdin:
//!
//! - `route <key>...` prints the node owning each key, without contacting it
//! - `nodes` lists every node with its weight
//! - `quit` exits
//! - anything else is sent through the router, e.g. `SET user:1 alice`
//!
//! Run: REDIS_SHARDS=127.0.0.1:6379,127.0.0.1:6380 cargo run -p distributed-redis --bin shardctl

use distributed_redis::{DistributedRedis, Response, RingNode, ShardConfig, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ShardConfig::from_env()?;
    let router = DistributedRedis::connect(&config)?;
    tracing::info!(nodes = config.nodes.len(), "shardctl ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((command, args)) = parts.split_first() else {
            continue;
        };

        match command.to_ascii_lowercase().as_str() {
            "quit" | "exit" => break,
            "nodes" => {
                let shards = router.shard_map();
                let ring = shards.ring();
                for (index, client) in shards.all_clients().iter().enumerate() {
                    println!(
                        "{} weight={}",
                        client.ring_label(),
                        ring.weight(index).unwrap_or_default()
                    );
                }
            }
            "route" => {
                let shards = router.shard_map();
                for key in args {
                    println!("{} -> {}", key, shards.client_for(key.as_bytes()).ring_label());
                }
            }
            _ => {
                // Snapshot first so per-node replies line up with the labels.
                let shards = router.shard_map();
                let args: Vec<Vec<u8>> = args.iter().map(|a| a.as_bytes().to_vec()).collect();
                match router.execute(command, &args).await {
                    Ok(Response::Single(value)) => println!("{}", render(&value)),
                    Ok(Response::PerNode(values)) => {
                        for (client, value) in shards.all_clients().iter().zip(values) {
                            println!("{}: {}", client.ring_label(), render(&value));
                        }
                    }
                    Err(e) => println!("(error) {}", e),
                }
            }
        }
    }

    Ok(())
}

fn render(value: &Value) -> String {
    match value {
        Value::Nil => "(nil)".to_string(),
        Value::Okay => "OK".to_string(),
        Value::Int(n) => format!("(integer) {}", n),
        Value::SimpleString(s) => s.clone(),
        Value::BulkString(bytes) => format!("{:?}", String::from_utf8_lossy(bytes)),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", items.join(", "))
        }
        other => format!("{:?}", other),
    }
}
