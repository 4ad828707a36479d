//! End-to-end tests driving the `pvbundle` binary against stand-in builds.
//!
//! Component builds, the certificate utility and the installer build are
//! shell scripts, so these tests only run on Unix.
#![cfg(unix)]

mod build_tests;
mod common;
mod env_tests;
mod fetch_tests;
