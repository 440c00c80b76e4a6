//! Switch event boundary
//!
//! The switch-control layer delivers three kinds of events into the core:
//! a switch connected, a switch went away, and a PacketIn with its headers
//! already parsed. [`SlicingController`] is the core's handler for them.

use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use slicing_common::{FlowAction, FlowInstaller, SliceError};
use slicing_types::{Dpid, Mode, PortNo, QueueId};

use crate::mode_ctl::ModeController;
use crate::slice_router::SliceRouter;
use crate::types::{PacketContext, Verdict};

/// Header fields the switch-control layer extracts from a PacketIn
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedHeaders {
    #[serde(default)]
    pub eth_type: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_src: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_dst: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_proto: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_dst: Option<u16>,
}

/// A packet the switch could not match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketIn {
    pub dpid: Dpid,
    pub in_port: PortNo,
    #[serde(default)]
    pub headers: ParsedHeaders,
}

impl PacketIn {
    pub fn context(&self) -> PacketContext {
        PacketContext {
            dpid: self.dpid,
            in_port: self.in_port,
            eth_type: self.headers.eth_type,
            ipv4_src: self.headers.ipv4_src,
            ipv4_dst: self.headers.ipv4_dst,
            ip_proto: self.headers.ip_proto,
            tcp_dst: self.headers.tcp_dst,
        }
    }
}

/// Event delivered by the switch-control layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SwitchEvent {
    SwitchConnected { dpid: Dpid },
    SwitchDisconnected { dpid: Dpid },
    PacketIn(PacketIn),
}

impl SwitchEvent {
    /// Switch the event belongs to
    pub fn dpid(&self) -> Dpid {
        match self {
            SwitchEvent::SwitchConnected { dpid } | SwitchEvent::SwitchDisconnected { dpid } => {
                *dpid
            }
            SwitchEvent::PacketIn(packet) => packet.dpid,
        }
    }
}

/// How the switch-control layer must handle the packet that triggered a PacketIn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketVerdict {
    /// Mode the decision was taken in
    pub mode: Mode,
    #[serde(flatten)]
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueId>,
    /// Actions for the packet itself; empty means drop
    pub actions: Vec<FlowAction>,
    /// Whether a flow rule was persisted for the rest of the flow
    pub rule_installed: bool,
}

/// Reply to one [`SwitchEvent`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum EventReply {
    /// Switch event processed
    Ack { dpid: Dpid, failures: usize },
    /// PacketIn decided
    Packet(PacketVerdict),
    /// Event line could not be decoded
    Error { message: String },
}

/// Handler for switch events, invoked by the event transport
#[async_trait]
pub trait SwitchEventHandler: Send + Sync {
    async fn on_switch_connected(&self, dpid: Dpid) -> usize;

    async fn on_switch_disconnected(&self, dpid: Dpid);

    async fn on_packet_in(&self, packet: &PacketIn) -> PacketVerdict;

    /// Dispatches one event to the matching handler method
    async fn handle_event(&self, event: SwitchEvent) -> EventReply {
        match event {
            SwitchEvent::SwitchConnected { dpid } => {
                let failures = self.on_switch_connected(dpid).await;
                EventReply::Ack { dpid, failures }
            }
            SwitchEvent::SwitchDisconnected { dpid } => {
                self.on_switch_disconnected(dpid).await;
                EventReply::Ack { dpid, failures: 0 }
            }
            SwitchEvent::PacketIn(packet) => EventReply::Packet(self.on_packet_in(&packet).await),
        }
    }
}

/// The slicing core: mode controller, decision engine and installer
pub struct SlicingController {
    modes: Arc<ModeController>,
    router: SliceRouter,
    installer: Arc<dyn FlowInstaller>,
}

impl SlicingController {
    pub fn new(
        modes: Arc<ModeController>,
        router: SliceRouter,
        installer: Arc<dyn FlowInstaller>,
    ) -> Self {
        Self {
            modes,
            router,
            installer,
        }
    }

    pub fn modes(&self) -> &Arc<ModeController> {
        &self.modes
    }
}

#[async_trait]
impl SwitchEventHandler for SlicingController {
    async fn on_switch_connected(&self, dpid: Dpid) -> usize {
        self.modes.on_switch_connected(dpid).await.failures
    }

    async fn on_switch_disconnected(&self, dpid: Dpid) {
        self.modes.on_switch_disconnected(dpid).await
    }

    #[instrument(level = "debug", skip(self, packet), fields(dpid = %packet.dpid, in_port = %packet.in_port))]
    async fn on_packet_in(&self, packet: &PacketIn) -> PacketVerdict {
        // The rule must land before any transition away from `mode`
        let snapshot = self.modes.snapshot().await;
        let mode = snapshot.mode();
        let decision = self.router.decide(mode, &packet.context());

        let rule_installed = match decision.flow_rule(packet.dpid) {
            Some(rule) => {
                let timeout = self.modes.call_timeout();
                let install = self.installer.install_rule(&rule);
                let result = match tokio::time::timeout(timeout, install).await {
                    Ok(result) => result,
                    Err(_) => Err(SliceError::timeout(
                        format!("install_rule on switch {}", packet.dpid),
                        u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    )),
                };
                match result {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(dpid = %packet.dpid, error = %e, "Failed to install flow rule");
                        false
                    }
                }
            }
            None => false,
        };
        drop(snapshot);

        debug!(
            mode = %mode,
            verdict = ?decision.verdict,
            queue = ?decision.queue,
            rule_installed,
            "PacketIn decided"
        );

        PacketVerdict {
            mode,
            verdict: decision.verdict,
            queue: decision.queue,
            actions: decision.packet_actions(),
            rule_installed,
        }
    }
}
