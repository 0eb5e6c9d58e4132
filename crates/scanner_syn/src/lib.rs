//! TCP SYN Scanner
//!
//! This crate provides the stealth TCP strategy:
//! - hand-built TCP segments with pseudo-header checksums (`packet`)
//! - per-target raw sockets with deadline-bounded reads (`raw`)
//! - reply classification: SYN+ACK open, RST closed, anything else filtered
//!
//! Raw sockets need root or CAP_NET_RAW; callers check
//! `raw_sockets_available()` before selecting this scanner.

pub mod error;
pub mod packet;
pub mod raw;
pub mod syn;

pub use error::SynError;
pub use packet::{internet_checksum, tcp_checksum, tcp_flags, TcpHeader, TcpOption};
pub use raw::raw_sockets_available;
pub use syn::{await_reply, SentSyn, SynScanner};
