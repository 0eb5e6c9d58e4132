//! ICMP echo scanner
//!
//! - `echo`: request building and IPv4 packet splitting
//! - `correlator`: reply validation and slot lookup
//! - `listener`: the shared raw socket and its read loop
//! - `scanner`: batch orchestration behind `BatchScanner`

pub mod correlator;
pub mod echo;
pub mod listener;
pub mod scanner;

pub use correlator::{Rejection, ReplyCorrelator};
pub use listener::icmp_available;
pub use scanner::{dispatch_requests, IcmpScanner};
