use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum RaftError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Node task failed: {0}")]
    TaskFailed(String),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
