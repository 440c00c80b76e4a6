//! Common infrastructure for the campus slicing controller.
//!
//! This crate provides the pieces shared by the daemon and its installer
//! backends:
//!
//! - [`error`]: Error types for slicing operations
//! - [`shell`]: Safe shell command execution with proper quoting
//! - [`installer`]: The [`FlowInstaller`] boundary and the flow rule model
//!
//! # Architecture
//!
//! The controller core never talks to a switch directly. Every side effect
//! on the dataplane goes through a [`FlowInstaller`]:
//!
//! 1. Delete all flow rules on a switch
//! 2. Clear the QoS configuration of a switch port
//! 3. Configure a QoS queue on a switch port
//! 4. Install a flow rule
//!
//! All four are best-effort and expected to be idempotent. Production
//! backends shell out to Open vSwitch; tests use a recording mock.
//!
//! # Example
//!
//! ```ignore
//! use slicing_common::{FlowInstaller, FlowRule, SliceResult};
//! use slicing_types::Dpid;
//!
//! async fn reset(installer: &dyn FlowInstaller, dpid: Dpid) -> SliceResult<()> {
//!     installer.delete_all_rules(dpid).await?;
//!     installer.install_rule(&FlowRule::table_miss(dpid)).await
//! }
//! ```

pub mod error;
pub mod installer;
pub mod shell;

// Re-export commonly used items at crate root
pub use error::{SliceError, SliceResult};
pub use installer::{
    priorities, FlowAction, FlowInstaller, FlowMatch, FlowRule, QueueShare, ETH_TYPE_IPV4,
    IP_PROTO_TCP,
};
