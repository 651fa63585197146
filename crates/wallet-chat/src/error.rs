use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Key resolution failed: {0}")]
    KeyResolution(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Network connect failed: {0}")]
    NetworkConnect(String),

    #[error("Peer {0} is not reachable on the network")]
    PeerUnreachable(String),

    #[error("History load failed: {0}")]
    HistoryLoad(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
