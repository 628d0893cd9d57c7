//! Cryptographic utilities for the VM
//!
//! This module provides the digests used by the crypto opcodes.

pub mod hash;

pub use hash::{hash160, hash256, sha1, sha256};
