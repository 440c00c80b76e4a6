//! Type definitions for slicerd

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use slicing_common::{FlowAction, FlowMatch, FlowRule, ETH_TYPE_IPV4};
use slicing_types::{Dpid, PortNo, QueueId, TrafficClass};

/// Header fields of one PacketIn, as far as slicing cares.
///
/// Built once per PacketIn and dropped after the decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketContext {
    pub dpid: Dpid,
    pub in_port: PortNo,
    pub eth_type: u16,
    pub ipv4_src: Option<Ipv4Addr>,
    pub ipv4_dst: Option<Ipv4Addr>,
    pub ip_proto: Option<u8>,
    pub tcp_dst: Option<u16>,
}

impl PacketContext {
    /// Non-IP packet entering `dpid` on `in_port`.
    pub fn new(dpid: Dpid, in_port: PortNo) -> Self {
        Self {
            dpid,
            in_port,
            eth_type: 0,
            ipv4_src: None,
            ipv4_dst: None,
            ip_proto: None,
            tcp_dst: None,
        }
    }

    /// Adds IPv4 source and destination.
    pub fn with_ipv4(mut self, src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        self.eth_type = ETH_TYPE_IPV4;
        self.ipv4_src = Some(src);
        self.ipv4_dst = Some(dst);
        self
    }

    /// Sets the IP protocol of a packet without a TCP port (ICMP, UDP).
    pub fn with_ip_proto(mut self, proto: u8) -> Self {
        self.ip_proto = Some(proto);
        self
    }

    /// Adds a TCP destination port.
    pub fn with_tcp_dst(mut self, port: u16) -> Self {
        self.ip_proto = Some(slicing_common::IP_PROTO_TCP);
        self.tcp_dst = Some(port);
        self
    }

    /// Returns true if the packet carries IPv4.
    pub fn is_ipv4(&self) -> bool {
        self.eth_type == ETH_TYPE_IPV4 && self.ipv4_src.is_some()
    }
}

/// Student and researcher address sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliceMembership {
    students: BTreeSet<Ipv4Addr>,
    researchers: BTreeSet<Ipv4Addr>,
}

impl SliceMembership {
    pub fn new(
        students: impl IntoIterator<Item = Ipv4Addr>,
        researchers: impl IntoIterator<Item = Ipv4Addr>,
    ) -> Self {
        Self {
            students: students.into_iter().collect(),
            researchers: researchers.into_iter().collect(),
        }
    }

    /// Classifies a source address. Missing addresses are [`TrafficClass::Other`].
    pub fn classify(&self, src: Option<Ipv4Addr>) -> TrafficClass {
        match src {
            Some(addr) if self.students.contains(&addr) => TrafficClass::Student,
            Some(addr) if self.researchers.contains(&addr) => TrafficClass::Researcher,
            _ => TrafficClass::Other,
        }
    }
}

/// What happens to the packet itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "port", rename_all = "snake_case")]
pub enum Verdict {
    Forward(PortNo),
    Flood,
    Drop,
}

/// Forwarding decision for one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowDecision {
    pub verdict: Verdict,
    pub queue: Option<QueueId>,
    pub priority: u16,
    pub match_fields: FlowMatch,
}

impl FlowDecision {
    /// Forward out of `port`, optionally through a QoS queue.
    pub fn forward(
        port: PortNo,
        queue: Option<QueueId>,
        priority: u16,
        match_fields: FlowMatch,
    ) -> Self {
        Self {
            verdict: Verdict::Forward(port),
            queue,
            priority,
            match_fields,
        }
    }

    /// Flood; no rule is installed so the next packet comes back.
    pub fn flood() -> Self {
        Self {
            verdict: Verdict::Flood,
            queue: None,
            priority: 0,
            match_fields: FlowMatch::any(),
        }
    }

    /// Drop silently; no rule, no forwarding.
    pub fn drop_packet() -> Self {
        Self {
            verdict: Verdict::Drop,
            queue: None,
            priority: 0,
            match_fields: FlowMatch::any(),
        }
    }

    pub fn is_drop(&self) -> bool {
        matches!(self.verdict, Verdict::Drop)
    }

    /// Output port, if the decision forwards to a single port.
    pub fn out_port(&self) -> Option<PortNo> {
        match self.verdict {
            Verdict::Forward(port) => Some(port),
            _ => None,
        }
    }

    /// Actions applied to the current packet. Empty for a drop.
    pub fn packet_actions(&self) -> Vec<FlowAction> {
        match self.verdict {
            Verdict::Forward(port) => {
                let mut actions = Vec::with_capacity(2);
                if let Some(queue) = self.queue {
                    actions.push(FlowAction::SetQueue(queue));
                }
                actions.push(FlowAction::Output(port));
                actions
            }
            Verdict::Flood => vec![FlowAction::Flood],
            Verdict::Drop => Vec::new(),
        }
    }

    /// Rule to persist on `dpid` so later packets of the flow bypass the
    /// controller. Only forwarding decisions produce one.
    pub fn flow_rule(&self, dpid: Dpid) -> Option<FlowRule> {
        match self.verdict {
            Verdict::Forward(_) => Some(FlowRule {
                dpid,
                priority: self.priority,
                match_fields: self.match_fields.clone(),
                actions: self.packet_actions(),
            }),
            Verdict::Flood | Verdict::Drop => None,
        }
    }
}
