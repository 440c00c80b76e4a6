//! Test infrastructure for the slicing controller
//!
//! Provides:
//! - A recording [`FlowInstaller`](slicing_common::FlowInstaller) with failure injection
//! - Fixtures for operator commands and slice membership
//! - Verification helpers over recorded installer calls

pub mod fixtures;
mod recorder;
mod verification;

pub use fixtures::*;
pub use recorder::{InstallerCall, RecordingInstaller};
pub use verification::*;
