//! Shared utilities.
//!
//! Content hashing for certificates and staging trees, plus test helpers.

pub mod hash;

#[cfg(test)]
pub mod testutil;
