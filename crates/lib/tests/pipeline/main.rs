//! Pipeline integration tests.
//!
//! Component builds, the installer and the certificate utility are shell
//! scripts, so these only run on Unix.

#![cfg(unix)]

mod build_tests;
mod common;
