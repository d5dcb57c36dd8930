//! Utilities
//!
//! Bounded reading of untrusted, possibly decompressing, streams.

pub mod bounded;
