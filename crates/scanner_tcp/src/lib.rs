//! TCP connect scanner
//!
//! Unprivileged TCP strategy: a bounded full handshake per target.

mod scanner;

pub use scanner::TcpScanner;
