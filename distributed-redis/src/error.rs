use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Raised before any node is contacted.
    #[error("Command {0} is unsafe when keys are spread across multiple nodes")]
    UnsafeMultiNodeCommand(String),

    #[error("Command {0} is not a fan-out command")]
    NotFanOut(String),

    #[error("Command {command} has no key argument at position {position}")]
    MissingKey { command: String, position: usize },

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn unexpected_reply(msg: impl Into<String>) -> Self {
        Self::UnexpectedReply(msg.into())
    }
}

impl From<shard_hashring::Error> for Error {
    fn from(err: shard_hashring::Error) -> Self {
        match err {
            shard_hashring::Error::Config(msg) => Self::Config(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
