//! Component build dispatch.
//!
//! Every component builds itself: the dispatcher only launches the
//! component's entry point inside its resolved [`BuildEnvironment`], records
//! how it ended and which declared artifacts it left behind.
//!
//! # Ordering
//!
//! Non-installer components have no ordering among themselves and run
//! concurrently in [`build_all`]. The installer is never dispatched from
//! there; it runs through [`build`] once `build_all` has joined every task,
//! so its start is never earlier than the last component's finish.
//!
//! # Submodules
//!
//! - [`artifacts`] - Matching declared artifact patterns against a checkout
//! - [`dispatch`] - Launching entry points and aggregating results
//!
//! [`BuildEnvironment`]: crate::environment::BuildEnvironment

pub mod artifacts;
pub mod dispatch;
mod types;

pub use dispatch::{BuildJob, build, build_all, entry_point};
pub use types::*;
