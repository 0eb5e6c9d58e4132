use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynError {
    #[error("raw sockets not permitted (need root/CAP_NET_RAW)")]
    NotPermitted,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed segment: {0}")]
    Malformed(String),
}
