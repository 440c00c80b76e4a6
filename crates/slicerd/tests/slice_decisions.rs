//! Integration tests for slicing decisions
//!
//! Exercises the router with the reference configuration across every
//! switch, port and traffic class of the campus topology.

use std::net::Ipv4Addr;

use pretty_assertions::assert_eq;
use slicerd::{PacketContext, SliceRouter, SliceTable, SlicerConfig, Verdict};
use slicing_common::{priorities, FlowAction};
use slicing_test::{
    campus_switches, OUTSIDER, RESEARCHER_1, RESEARCHER_2, SIMULATION_PORT, STUDENT_1, STUDENT_2,
};
use slicing_types::{Dpid, Mode, PortNo, QueueId};

fn router() -> SliceRouter {
    SliceRouter::from_config(&SlicerConfig::default().slicing)
}

fn tcp(dpid: Dpid, in_port: u32, src: Ipv4Addr, dst: Ipv4Addr, port: u16) -> PacketContext {
    PacketContext::new(dpid, PortNo(in_port))
        .with_ipv4(src, dst)
        .with_tcp_dst(port)
}

#[test]
fn test_default_mode_follows_default_table() {
    let router = router();
    let table = SliceTable::reference_default();

    for dpid in campus_switches() {
        for in_port in 1..=4 {
            let ctx = PacketContext::new(dpid, PortNo(in_port));
            let decision = router.decide(Mode::Default, &ctx);
            match table.lookup(dpid, PortNo(in_port)) {
                Some(out) => {
                    assert_eq!(decision.verdict, Verdict::Forward(out));
                    assert_eq!(decision.queue, None);
                    assert_eq!(decision.priority, priorities::SHARED);
                }
                None => assert_eq!(decision.verdict, Verdict::Flood),
            }
        }
    }
}

#[test]
fn test_exam_mode_drops_every_student_packet() {
    let router = router();
    for student in [STUDENT_1, STUDENT_2] {
        for dpid in campus_switches() {
            for in_port in 1..=4 {
                for port in [80, SIMULATION_PORT] {
                    let ctx = tcp(dpid, in_port, student, RESEARCHER_1, port);
                    assert_eq!(router.decide(Mode::Exam, &ctx).verdict, Verdict::Drop);
                    assert_eq!(
                        router.decide(Mode::ExamSimulation, &ctx).verdict,
                        Verdict::Drop
                    );
                }
            }
        }
    }
}

#[test]
fn test_exam_mode_keeps_researchers_and_outsiders() {
    let router = router();
    for src in [RESEARCHER_1, OUTSIDER] {
        let ctx = tcp(Dpid(1), 1, src, RESEARCHER_2, 22);
        let decision = router.decide(Mode::Exam, &ctx);
        assert_eq!(decision.verdict, Verdict::Forward(PortNo(3)));
        assert!(decision.flow_rule(ctx.dpid).is_some());
    }
}

#[test]
fn test_simulation_mode_classes() {
    let router = router();
    let s1 = Dpid(1);

    // Researcher on the simulation port: alternate path, no queue
    let decision = router.decide(
        Mode::Simulation,
        &tcp(s1, 2, RESEARCHER_1, RESEARCHER_2, SIMULATION_PORT),
    );
    assert_eq!(decision.verdict, Verdict::Forward(PortNo(4)));
    assert_eq!(decision.queue, None);

    // Researcher elsewhere: default path, researcher queue
    let decision = router.decide(Mode::Simulation, &tcp(s1, 1, RESEARCHER_1, RESEARCHER_2, 443));
    assert_eq!(decision.verdict, Verdict::Forward(PortNo(3)));
    assert_eq!(decision.queue, Some(QueueId(1)));

    // Student, even on the simulation port: default path, student queue
    let decision = router.decide(
        Mode::Simulation,
        &tcp(s1, 1, STUDENT_2, RESEARCHER_2, SIMULATION_PORT),
    );
    assert_eq!(decision.verdict, Verdict::Forward(PortNo(3)));
    assert_eq!(decision.queue, Some(QueueId(2)));
}

#[test]
fn test_sliced_rule_matches_the_flow_only() {
    let router = router();
    let ctx = tcp(Dpid(4), 3, STUDENT_1, RESEARCHER_2, 8080);
    let rule = router
        .decide(Mode::Simulation, &ctx)
        .flow_rule(ctx.dpid)
        .unwrap();

    assert_eq!(rule.priority, priorities::SLICED);
    assert_eq!(rule.match_fields.in_port, Some(PortNo(3)));
    assert_eq!(rule.match_fields.ipv4_src, Some(STUDENT_1));
    assert_eq!(rule.match_fields.ipv4_dst, Some(RESEARCHER_2));
    assert_eq!(rule.match_fields.tcp_dst, Some(8080));
    assert_eq!(
        rule.actions,
        vec![FlowAction::SetQueue(QueueId(2)), FlowAction::Output(PortNo(1))]
    );
}

#[test]
fn test_custom_tables_from_config() {
    let config = SlicerConfig::from_toml_str(
        r#"
[slicing]
student_addresses = ["192.168.1.10"]
researcher_addresses = ["192.168.1.20"]
simulation_port = 6000

[slicing.default_table.7]
1 = 2
2 = 1

[slicing.alternate_table.7]
1 = 3
3 = 1
"#,
    )
    .unwrap();
    config.validate().unwrap();
    let router = SliceRouter::from_config(&config.slicing);
    let s7 = Dpid(7);

    let researcher = Ipv4Addr::new(192, 168, 1, 20);
    let decision = router.decide(Mode::Simulation, &tcp(s7, 1, researcher, OUTSIDER, 6000));
    assert_eq!(decision.verdict, Verdict::Forward(PortNo(3)));

    let decision = router.decide(Mode::Default, &PacketContext::new(s7, PortNo(1)));
    assert_eq!(decision.verdict, Verdict::Forward(PortNo(2)));

    // Reference switches are gone
    let decision = router.decide(Mode::Default, &PacketContext::new(Dpid(1), PortNo(1)));
    assert_eq!(decision.verdict, Verdict::Flood);
}
