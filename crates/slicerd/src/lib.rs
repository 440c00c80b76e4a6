//! # slicerd - Campus Traffic Slicing Controller
//!
//! Control-plane logic that splits a four-switch campus network between two
//! user classes, students and researchers, with two independent operating
//! modes:
//!
//! - **Exam**: student traffic is dropped, researcher traffic is untouched
//! - **Simulation**: researcher traffic to the simulation port takes an
//!   alternate path; everything else shares the default path through
//!   per-class QoS queues
//!
//! ## Components
//! - [`SliceTable`]: static per-switch port mappings
//! - [`SliceRouter`]: per-packet forwarding decisions
//! - [`ModeController`]: serialized mode transitions and switch reconfiguration
//! - [`CommandServer`]: operator command channel (JSON over TCP)
//! - [`SlicingController`] / [`EventBridge`]: switch events from the
//!   switch-control layer
//! - [`OvsInstaller`]: Open vSwitch backend of the flow installer
//!
//! ## Data Flow
//! - command → `ModeController::transition` → clear + apply on every switch
//! - switch connected → current mode re-applied to that switch
//! - PacketIn → `SliceRouter::decide` → flow rule installed, packet forwarded

pub mod command_server;
pub mod config;
mod dry_run;
pub mod event_bridge;
pub mod events;
pub mod mode_ctl;
pub mod ovs;
mod slice_router;
mod tables;
mod types;

pub use command_server::{CommandServer, ModeCommand};
pub use config::SlicerConfig;
pub use dry_run::LogInstaller;
pub use event_bridge::EventBridge;
pub use events::{
    EventReply, PacketIn, PacketVerdict, ParsedHeaders, SlicingController, SwitchEvent,
    SwitchEventHandler,
};
pub use mode_ctl::{
    ApplyPlan, ApplyReport, ModeController, ModeSnapshot, Provisioning, TransitionOutcome,
};
pub use ovs::OvsInstaller;
pub use slice_router::SliceRouter;
pub use tables::SliceTable;
pub use types::*;
