//! UDP scanner
//!
//! Connectionless probing with timeout-based tri-state classification.

mod scanner;

pub use scanner::UdpScanner;
