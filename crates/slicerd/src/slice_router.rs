//! SliceRouter - per-packet slicing decisions
//!
//! Decision order, first match wins:
//! 1. Exam: student source → drop
//! 2. Simulation: researcher source to the simulation port → alternate path
//! 3. Simulation: everything else → shared path, queue by traffic class
//! 4. Shared path lookup; unknown `(dpid, in_port)` → flood

use tracing::{debug, instrument};

use slicing_common::{priorities, FlowMatch};
use slicing_types::{Mode, QueueId, TrafficClass};

use crate::config::SlicingConfig;
use crate::tables::SliceTable;
use crate::types::{FlowDecision, PacketContext, SliceMembership};

/// Stateless decision engine over the static slicing configuration
#[derive(Debug, Clone)]
pub struct SliceRouter {
    default_table: SliceTable,
    alternate_table: SliceTable,
    membership: SliceMembership,
    simulation_port: u16,
    researcher_queue: QueueId,
    student_queue: QueueId,
}

impl SliceRouter {
    pub fn new(
        default_table: SliceTable,
        alternate_table: SliceTable,
        membership: SliceMembership,
        simulation_port: u16,
        researcher_queue: QueueId,
        student_queue: QueueId,
    ) -> Self {
        Self {
            default_table,
            alternate_table,
            membership,
            simulation_port,
            researcher_queue,
            student_queue,
        }
    }

    /// Builds a router from the `[slicing]` configuration section
    pub fn from_config(config: &SlicingConfig) -> Self {
        Self::new(
            config.default_table.clone(),
            config.alternate_table.clone(),
            config.membership(),
            config.simulation_port,
            config.researcher_queue,
            config.student_queue,
        )
    }

    pub fn membership(&self) -> &SliceMembership {
        &self.membership
    }

    /// Decides how one packet is handled in `mode`. Never fails.
    #[instrument(level = "debug", skip(self, ctx), fields(dpid = %ctx.dpid, in_port = %ctx.in_port))]
    pub fn decide(&self, mode: Mode, ctx: &PacketContext) -> FlowDecision {
        let class = self.membership.classify(ctx.ipv4_src);

        if mode.exam() && class == TrafficClass::Student {
            debug!(src = ?ctx.ipv4_src, "Exam mode: dropping student traffic");
            return FlowDecision::drop_packet();
        }

        if mode.simulation() {
            return self.decide_simulation(ctx, class);
        }

        let match_fields = if mode.exam() {
            flow_match(ctx)
        } else {
            FlowMatch::in_port(ctx.in_port)
        };
        self.shared_path(ctx, None, priorities::SHARED, match_fields)
    }

    fn decide_simulation(&self, ctx: &PacketContext, class: TrafficClass) -> FlowDecision {
        if class == TrafficClass::Researcher && ctx.tcp_dst == Some(self.simulation_port) {
            return match self.alternate_table.lookup(ctx.dpid, ctx.in_port) {
                Some(port) => {
                    debug!(out_port = %port, "Simulation traffic on the alternate path");
                    FlowDecision::forward(port, None, priorities::SLICED, flow_match(ctx))
                }
                None => FlowDecision::flood(),
            };
        }

        let queue = match class {
            TrafficClass::Researcher => Some(self.researcher_queue),
            TrafficClass::Student => Some(self.student_queue),
            TrafficClass::Other => None,
        };
        self.shared_path(ctx, queue, priorities::SLICED, flow_match(ctx))
    }

    fn shared_path(
        &self,
        ctx: &PacketContext,
        queue: Option<QueueId>,
        priority: u16,
        match_fields: FlowMatch,
    ) -> FlowDecision {
        match self.default_table.lookup(ctx.dpid, ctx.in_port) {
            Some(port) => FlowDecision::forward(port, queue, priority, match_fields),
            None => {
                debug!("No slice table entry, flooding");
                FlowDecision::flood()
            }
        }
    }
}

/// Match used outside Default mode. Carries the addressing and protocol so a
/// rule installed for one flow never captures another class's packets, nor
/// a researcher's simulation traffic.
fn flow_match(ctx: &PacketContext) -> FlowMatch {
    let mut fields = FlowMatch::in_port(ctx.in_port);
    fields.eth_type = Some(ctx.eth_type);
    if ctx.is_ipv4() {
        fields.ipv4_src = ctx.ipv4_src;
        fields.ipv4_dst = ctx.ipv4_dst;
        fields.ip_proto = ctx.ip_proto;
        fields.tcp_dst = ctx.tcp_dst;
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use slicing_common::{FlowAction, ETH_TYPE_IPV4};
    use slicing_types::{Dpid, PortNo};
    use std::net::Ipv4Addr;

    use crate::types::Verdict;

    const STUDENT: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const RESEARCHER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 3);
    const OTHER_RESEARCHER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 4);

    fn router() -> SliceRouter {
        SliceRouter::from_config(&SlicingConfig::default())
    }

    fn ip_packet(dpid: u64, in_port: u32, src: Ipv4Addr) -> PacketContext {
        PacketContext::new(Dpid(dpid), PortNo(in_port)).with_ipv4(src, OTHER_RESEARCHER)
    }

    #[test]
    fn test_default_mode_lookups() {
        let r = router();
        let d = r.decide(Mode::Default, &PacketContext::new(Dpid(1), PortNo(1)));
        assert_eq!(d.verdict, Verdict::Forward(PortNo(3)));
        assert_eq!(d.queue, None);
        assert_eq!(d.priority, 1);
        assert_eq!(d.match_fields, FlowMatch::in_port(PortNo(1)));

        let d = r.decide(Mode::Default, &PacketContext::new(Dpid(2), PortNo(1)));
        assert_eq!(d.out_port(), Some(PortNo(2)));
    }

    #[test]
    fn test_unknown_switch_or_port_floods() {
        let r = router();
        for ctx in [
            PacketContext::new(Dpid(9), PortNo(1)),
            PacketContext::new(Dpid(2), PortNo(7)),
        ] {
            for mode in Mode::ALL {
                assert_eq!(r.decide(mode, &ctx).verdict, Verdict::Flood);
            }
        }
    }

    #[test]
    fn test_exam_drops_students_everywhere() {
        let r = router();
        for dpid in 1..=4 {
            for port in 1..=4 {
                for mode in [Mode::Exam, Mode::ExamSimulation] {
                    let ctx = ip_packet(dpid, port, STUDENT).with_tcp_dst(5000);
                    let d = r.decide(mode, &ctx);
                    assert!(d.is_drop());
                    assert!(d.flow_rule(ctx.dpid).is_none());
                }
            }
        }
    }

    #[test]
    fn test_exam_forwards_researchers_on_shared_path() {
        let r = router();
        let d = r.decide(Mode::Exam, &ip_packet(1, 2, RESEARCHER));
        assert_eq!(d.out_port(), Some(PortNo(4)));
        assert_eq!(d.queue, None);
        assert_eq!(d.priority, priorities::SHARED);
        assert_eq!(d.match_fields.ipv4_src, Some(RESEARCHER));
        assert_eq!(d.match_fields.eth_type, Some(ETH_TYPE_IPV4));
    }

    #[test]
    fn test_simulation_researcher_on_reserved_port_takes_alternate_path() {
        let r = router();
        let ctx = ip_packet(3, 1, RESEARCHER).with_tcp_dst(5000);
        let d = r.decide(Mode::Simulation, &ctx);
        assert_eq!(d.out_port(), Some(PortNo(2)));
        assert_eq!(d.queue, None);
        assert_eq!(d.priority, priorities::SLICED);
        assert_eq!(d.match_fields.tcp_dst, Some(5000));
        assert_eq!(d.match_fields.ip_proto, Some(6));

        // Switch 2 is not on the alternate path
        let ctx = ip_packet(2, 1, RESEARCHER).with_tcp_dst(5000);
        assert_eq!(r.decide(Mode::Simulation, &ctx).verdict, Verdict::Flood);
    }

    #[test]
    fn test_simulation_queues_by_class() {
        let r = router();

        let d = r.decide(Mode::Simulation, &ip_packet(1, 1, RESEARCHER).with_tcp_dst(80));
        assert_eq!(d.out_port(), Some(PortNo(3)));
        assert_eq!(d.queue, Some(QueueId(1)));

        let d = r.decide(Mode::Simulation, &ip_packet(1, 1, STUDENT).with_tcp_dst(5000));
        assert_eq!(d.out_port(), Some(PortNo(3)));
        assert_eq!(d.queue, Some(QueueId(2)));
        assert_eq!(
            d.packet_actions(),
            vec![FlowAction::SetQueue(QueueId(2)), FlowAction::Output(PortNo(3))]
        );

        let d = r.decide(
            Mode::Simulation,
            &ip_packet(1, 1, Ipv4Addr::new(10, 0, 0, 99)),
        );
        assert_eq!(d.out_port(), Some(PortNo(3)));
        assert_eq!(d.queue, None);
    }

    #[test]
    fn test_exam_simulation_combines_both_rules() {
        let r = router();
        let ctx = ip_packet(1, 2, RESEARCHER).with_tcp_dst(5000);
        let d = r.decide(Mode::ExamSimulation, &ctx);
        assert_eq!(d.out_port(), Some(PortNo(4)));
        assert_eq!(d.queue, None);
        assert_eq!(d.priority, priorities::SLICED);

        let d = r.decide(Mode::ExamSimulation, &ip_packet(1, 1, RESEARCHER));
        assert_eq!(d.queue, Some(QueueId(1)));
    }

    /// True if every packet matched by `narrow` is also matched by `wide`
    fn covers(wide: &FlowMatch, narrow: &FlowMatch) -> bool {
        fn field<T: PartialEq>(wide: &Option<T>, narrow: &Option<T>) -> bool {
            wide.is_none() || wide == narrow
        }
        field(&wide.in_port, &narrow.in_port)
            && field(&wide.eth_type, &narrow.eth_type)
            && field(&wide.ipv4_src, &narrow.ipv4_src)
            && field(&wide.ipv4_dst, &narrow.ipv4_dst)
            && field(&wide.ip_proto, &narrow.ip_proto)
            && field(&wide.tcp_dst, &narrow.tcp_dst)
    }

    #[test]
    fn test_researcher_icmp_rule_leaves_simulation_flow_alone() {
        let r = router();
        let icmp = ip_packet(1, 2, RESEARCHER).with_ip_proto(1);
        let queued = r.decide(Mode::Simulation, &icmp);
        assert_eq!(queued.queue, Some(QueueId(1)));
        assert_eq!(queued.match_fields.ip_proto, Some(1));
        assert_eq!(queued.match_fields.tcp_dst, None);

        let simulation = ip_packet(1, 2, RESEARCHER).with_tcp_dst(5000);
        let alternate = r.decide(Mode::Simulation, &simulation);
        assert_eq!(alternate.out_port(), Some(PortNo(4)));
        assert!(!covers(&queued.match_fields, &alternate.match_fields));

        // Same holds for a UDP packet between the same hosts
        let udp = r.decide(Mode::Simulation, &ip_packet(1, 2, RESEARCHER).with_ip_proto(17));
        assert!(!covers(&udp.match_fields, &alternate.match_fields));
    }

    #[test]
    fn test_non_ip_packet_match_keeps_eth_type() {
        let r = router();
        let mut ctx = PacketContext::new(Dpid(1), PortNo(1));
        ctx.eth_type = 0x0806;
        let d = r.decide(Mode::Exam, &ctx);
        assert_eq!(d.out_port(), Some(PortNo(3)));
        assert_eq!(d.match_fields.eth_type, Some(0x0806));
        assert_eq!(d.match_fields.ipv4_src, None);
    }
}
