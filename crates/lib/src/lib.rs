//! pvbundle-lib: orchestration of a multi-repository driver release.
//!
//! The crate fetches every registered component repository, builds each one
//! inside the toolchain environment it needs, stages the outputs into the tree
//! the installer expects, issues a test-signing certificate and hands
//! everything to the installer's own build to produce the release bundle:
//! - `registry`: static component records and the installer layout
//! - `config`: externally supplied toolchain roots and the configuration errors
//! - `environment`: per-component process environment
//! - `fetch`, `build`, `stage`, `sign`, `package`: the pipeline stages
//! - `pipeline`: the sequencing used by the CLI

pub mod build;
pub mod config;
pub mod consts;
pub mod environment;
pub mod exec;
pub mod fetch;
pub mod package;
pub mod pipeline;
pub mod registry;
pub mod run_lock;
pub mod sign;
pub mod stage;
pub mod util;
pub mod workspace;
