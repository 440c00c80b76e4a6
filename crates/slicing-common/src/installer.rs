//! Flow installer boundary and the flow rule model.
//!
//! The controller core depends only on [`FlowInstaller`]. A backend may speak
//! the switch-control protocol directly or shell out to the switch tools; the
//! core does not care as long as the four primitives below are idempotent and
//! best-effort.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use slicing_types::{Dpid, PortNo, QueueId};

use crate::error::SliceResult;

/// EtherType of IPv4 frames.
pub const ETH_TYPE_IPV4: u16 = 0x0800;

/// IP protocol number of TCP.
pub const IP_PROTO_TCP: u8 = 6;

/// Flow rule priorities used by the controller.
pub mod priorities {
    /// Lowest priority rule: send unmatched packets to the controller.
    pub const TABLE_MISS: u16 = 0;

    /// Shared-path forwarding (default and exam modes).
    pub const SHARED: u16 = 1;

    /// Simulation-mode rules; shadow any stale shared-path rule.
    pub const SLICED: u16 = 2;
}

/// Match criteria of a flow rule. `None` fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_port: Option<PortNo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_type: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_src: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_dst: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_proto: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_dst: Option<u16>,
}

impl FlowMatch {
    /// Matches every packet.
    pub fn any() -> Self {
        Self::default()
    }

    /// Matches on the input port only.
    pub fn in_port(port: PortNo) -> Self {
        Self {
            in_port: Some(port),
            ..Self::default()
        }
    }

    /// Returns true if no field is constrained.
    pub fn is_wildcard(&self) -> bool {
        *self == Self::default()
    }
}

/// Action applied to packets matching a flow rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FlowAction {
    /// Send out of one port.
    Output(PortNo),
    /// Send out of every port except the input port.
    Flood,
    /// Send to the controller as a PacketIn.
    Controller,
    /// Enqueue on a QoS queue of the output port.
    SetQueue(QueueId),
}

impl fmt::Display for FlowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowAction::Output(port) => write!(f, "output:{}", port),
            FlowAction::Flood => write!(f, "flood"),
            FlowAction::Controller => write!(f, "controller"),
            FlowAction::SetQueue(queue) => write!(f, "set_queue:{}", queue),
        }
    }
}

/// A flow rule to be installed on one switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRule {
    pub dpid: Dpid,
    pub priority: u16,
    pub match_fields: FlowMatch,
    pub actions: Vec<FlowAction>,
}

impl FlowRule {
    /// The table-miss rule: everything unmatched goes to the controller.
    pub fn table_miss(dpid: Dpid) -> Self {
        Self {
            dpid,
            priority: priorities::TABLE_MISS,
            match_fields: FlowMatch::any(),
            actions: vec![FlowAction::Controller],
        }
    }

    /// Returns true if this is a table-miss rule.
    pub fn is_table_miss(&self) -> bool {
        self.priority == priorities::TABLE_MISS
            && self.match_fields.is_wildcard()
            && self.actions == [FlowAction::Controller]
    }
}

/// Bandwidth share of one QoS queue, in bits per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueShare {
    /// Guaranteed rate.
    pub min_rate_bps: u64,
    /// Ceiling rate.
    pub max_rate_bps: u64,
}

/// Dataplane side effects requested by the controller core.
///
/// All calls are expected to be idempotent and best-effort. Callers log
/// failures and carry on; nothing here is retried by the core.
#[async_trait]
pub trait FlowInstaller: Send + Sync {
    /// Returns the backend name (for logging).
    fn name(&self) -> &str;

    /// Installs (or overwrites) one flow rule.
    async fn install_rule(&self, rule: &FlowRule) -> SliceResult<()>;

    /// Deletes every flow rule on a switch.
    async fn delete_all_rules(&self, dpid: Dpid) -> SliceResult<()>;

    /// Removes the QoS configuration (and its queues) from a switch port.
    async fn clear_queue_config(&self, dpid: Dpid, port: PortNo) -> SliceResult<()>;

    /// Configures one QoS queue on a switch port.
    async fn set_queue(
        &self,
        dpid: Dpid,
        port: PortNo,
        queue: QueueId,
        share: QueueShare,
    ) -> SliceResult<()>;
}
