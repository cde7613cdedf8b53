//! Cryptographic utilities for the wallet
//!
//! This module provides SHA-256 hashing for operation identifiers.

pub mod hash;

pub use hash::{sha256_array, sha256_parts};
