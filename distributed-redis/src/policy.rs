//! Command classification.
//!
//! Every command takes exactly one of three paths, checked in this order:
//! rejected as unsafe, fanned out to every node, or routed by its key.

use std::collections::{HashMap, HashSet};

use crate::{Error, Result};

/// Administrative commands that run on every node.
pub const FAN_OUT_COMMANDS: &[&str] = &[
    "BGREWRITEAOF",
    "BGSAVE",
    "DBSIZE",
    "DEL",
    "FLUSHDB",
    "FLUSHALL",
    "INFO",
    "KEYS",
    "LASTSAVE",
    "PING",
    "SAVE",
];

/// Commands that need a single keyspace and cannot be honored once keys are
/// sharded.
pub const UNSAFE_COMMANDS: &[&str] = &[
    "BLPOP",
    "BRPOP",
    "LISTEN",
    "MGET",
    "MOVE",
    "MSET",
    "MSETNX",
    "RANDOMKEY",
    "RENAME",
    "RENAMENX",
    "RPOPLPUSH",
    "SDIFF",
    "SDIFFSTORE",
    "SINTER",
    "SINTERSTORE",
    "SMOVE",
    "SORT",
    "SUNION",
    "SUNIONSTORE",
];

/// How a single command will be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch<'a> {
    Unsafe,
    FanOut,
    Routed { key: &'a [u8] },
}

/// Immutable routing policy handed to a router at construction.
///
/// Command names are matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPolicy {
    unsafe_commands: HashSet<String>,
    fan_out_commands: HashSet<String>,
    key_positions: HashMap<String, usize>,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self::empty()
            .with_fan_out(FAN_OUT_COMMANDS.iter().copied())
            .with_unsafe(UNSAFE_COMMANDS.iter().copied())
    }
}

impl CommandPolicy {
    /// A policy that routes every command by its first argument.
    pub fn empty() -> Self {
        Self {
            unsafe_commands: HashSet::new(),
            fan_out_commands: HashSet::new(),
            key_positions: HashMap::new(),
        }
    }

    pub fn with_unsafe<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.unsafe_commands
            .extend(commands.into_iter().map(|c| normalize(c.as_ref())));
        self
    }

    pub fn with_fan_out<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fan_out_commands
            .extend(commands.into_iter().map(|c| normalize(c.as_ref())));
        self
    }

    /// Route `command` by `args[position]` instead of `args[0]`.
    pub fn with_key_position(mut self, command: &str, position: usize) -> Self {
        self.key_positions.insert(normalize(command), position);
        self
    }

    /// Drop `command` from both the unsafe and fan-out sets.
    pub fn without(mut self, command: &str) -> Self {
        let command = normalize(command);
        self.unsafe_commands.remove(&command);
        self.fan_out_commands.remove(&command);
        self
    }

    pub fn is_unsafe(&self, command: &str) -> bool {
        self.unsafe_commands.contains(&normalize(command))
    }

    pub fn is_fan_out(&self, command: &str) -> bool {
        self.fan_out_commands.contains(&normalize(command))
    }

    pub fn key_position(&self, command: &str) -> usize {
        self.key_positions
            .get(&normalize(command))
            .copied()
            .unwrap_or(0)
    }

    /// Decide how to dispatch `command`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingKey`] for a routed command whose key argument
    /// is absent.
    pub fn classify<'a>(&self, command: &str, args: &'a [Vec<u8>]) -> Result<Dispatch<'a>> {
        let name = normalize(command);
        if self.unsafe_commands.contains(&name) {
            return Ok(Dispatch::Unsafe);
        }
        if self.fan_out_commands.contains(&name) {
            return Ok(Dispatch::FanOut);
        }

        let position = self.key_positions.get(&name).copied().unwrap_or(0);
        match args.get(position) {
            Some(key) => Ok(Dispatch::Routed {
                key: key.as_slice(),
            }),
            None => Err(Error::MissingKey {
                command: name,
                position,
            }),
        }
    }
}

fn normalize(command: &str) -> String {
    command.trim().to_ascii_uppercase()
}
