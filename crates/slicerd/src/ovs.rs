//! Open vSwitch flow installer
//!
//! Drives the emulated switches through `ovs-ofctl` and `ovs-vsctl`.
//! Switch `N` is bridge `<prefix>N`, its port `P` is interface
//! `<prefix>N-ethP`.
//!
//! QoS uses one linux-htb record per port. OVS cannot add a single queue to
//! an existing record, so every `set_queue` rebuilds the port's record from
//! the queues configured since its last clear.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, instrument};

use slicing_common::shell::{self, shellquote, OVS_OFCTL_CMD, OVS_VSCTL_CMD};
use slicing_common::{
    FlowAction, FlowInstaller, FlowMatch, FlowRule, QueueShare, SliceError, SliceResult,
};
use slicing_types::{Dpid, PortNo, QueueId};

use crate::config::InstallerConfig;

/// OpenFlow version passed to `ovs-ofctl`
const OPENFLOW_VERSION: &str = "OpenFlow13";

/// `FlowInstaller` backed by the Open vSwitch command line tools
pub struct OvsInstaller {
    bridge_prefix: String,
    use_sudo: bool,
    timeout: Duration,
    link_rate_bps: u64,
    queues: Mutex<HashMap<(Dpid, PortNo), BTreeMap<QueueId, QueueShare>>>,
}

impl OvsInstaller {
    pub fn new(config: &InstallerConfig) -> Self {
        Self {
            bridge_prefix: config.bridge_prefix.clone(),
            use_sudo: config.use_sudo,
            timeout: Duration::from_millis(config.timeout_ms),
            link_rate_bps: config.link_rate_bps,
            queues: Mutex::new(HashMap::new()),
        }
    }

    pub fn bridge_name(&self, dpid: Dpid) -> String {
        format!("{}{}", self.bridge_prefix, dpid.as_u64())
    }

    pub fn interface_name(&self, dpid: Dpid, port: PortNo) -> String {
        format!("{}-eth{}", self.bridge_name(dpid), port)
    }

    async fn run(&self, dpid: Dpid, operation: &str, cmd: String) -> SliceResult<()> {
        let cmd = shell::with_sudo(cmd, self.use_sudo);
        shell::exec_with_timeout(&cmd, self.timeout)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                SliceError::Timeout { .. } => e,
                other => SliceError::installer(dpid, operation, other.to_string()),
            })
    }
}

/// `ovs-ofctl` flow specification of a rule
pub fn flow_spec(rule: &FlowRule) -> String {
    let mut parts = vec![format!("priority={}", rule.priority)];
    parts.extend(match_parts(&rule.match_fields));

    let actions = if rule.actions.is_empty() {
        "drop".to_string()
    } else {
        rule.actions
            .iter()
            .map(action_spec)
            .collect::<Vec<_>>()
            .join(",")
    };
    parts.push(format!("actions={}", actions));
    parts.join(",")
}

fn match_parts(fields: &FlowMatch) -> Vec<String> {
    let mut parts = Vec::new();
    if let Some(port) = fields.in_port {
        parts.push(format!("in_port={}", port));
    }
    if let Some(eth_type) = fields.eth_type {
        parts.push(format!("dl_type=0x{:04x}", eth_type));
    }
    if let Some(src) = fields.ipv4_src {
        parts.push(format!("nw_src={}", src));
    }
    if let Some(dst) = fields.ipv4_dst {
        parts.push(format!("nw_dst={}", dst));
    }
    if let Some(proto) = fields.ip_proto {
        parts.push(format!("nw_proto={}", proto));
    }
    if let Some(port) = fields.tcp_dst {
        parts.push(format!("tp_dst={}", port));
    }
    parts
}

fn action_spec(action: &FlowAction) -> String {
    match action {
        FlowAction::Output(port) => format!("output:{}", port),
        FlowAction::Flood => "FLOOD".to_string(),
        FlowAction::Controller => "CONTROLLER:65535".to_string(),
        FlowAction::SetQueue(queue) => format!("set_queue:{}", queue),
    }
}

/// `ovs-vsctl` arguments replacing the QoS record of `interface`
pub fn qos_command(
    interface: &str,
    link_rate_bps: u64,
    queues: &BTreeMap<QueueId, QueueShare>,
) -> String {
    let mut cmd = format!(
        "{} -- set port {} qos=@newqos -- --id=@newqos create qos type=linux-htb other-config:max-rate={}",
        OVS_VSCTL_CMD,
        shellquote(interface),
        link_rate_bps
    );
    for queue in queues.keys() {
        cmd.push_str(&format!(" queues:{}=@q{}", queue, queue));
    }
    for (queue, share) in queues {
        cmd.push_str(&format!(
            " -- --id=@q{} create queue other-config:min-rate={} other-config:max-rate={}",
            queue, share.min_rate_bps, share.max_rate_bps
        ));
    }
    cmd
}

#[async_trait]
impl FlowInstaller for OvsInstaller {
    fn name(&self) -> &str {
        "ovs"
    }

    #[instrument(skip(self, rule), fields(dpid = %rule.dpid))]
    async fn install_rule(&self, rule: &FlowRule) -> SliceResult<()> {
        let spec = flow_spec(rule);
        debug!(flow = %spec, "Adding flow");
        let cmd = format!(
            "{} -O {} add-flow {} {}",
            OVS_OFCTL_CMD,
            OPENFLOW_VERSION,
            shellquote(&self.bridge_name(rule.dpid)),
            shellquote(&spec)
        );
        self.run(rule.dpid, "install_rule", cmd).await
    }

    async fn delete_all_rules(&self, dpid: Dpid) -> SliceResult<()> {
        let cmd = format!(
            "{} -O {} del-flows {}",
            OVS_OFCTL_CMD,
            OPENFLOW_VERSION,
            shellquote(&self.bridge_name(dpid))
        );
        self.run(dpid, "delete_all_rules", cmd).await
    }

    async fn clear_queue_config(&self, dpid: Dpid, port: PortNo) -> SliceResult<()> {
        self.queues.lock().remove(&(dpid, port));
        let cmd = format!(
            "{} clear port {} qos",
            OVS_VSCTL_CMD,
            shellquote(&self.interface_name(dpid, port))
        );
        self.run(dpid, "clear_queue_config", cmd).await
    }

    async fn set_queue(
        &self,
        dpid: Dpid,
        port: PortNo,
        queue: QueueId,
        share: QueueShare,
    ) -> SliceResult<()> {
        let queues = {
            let mut all = self.queues.lock();
            let entry = all.entry((dpid, port)).or_default();
            entry.insert(queue, share);
            entry.clone()
        };
        let cmd = qos_command(
            &self.interface_name(dpid, port),
            self.link_rate_bps,
            &queues,
        );
        self.run(dpid, "set_queue", cmd).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use slicing_common::priorities;
    use std::net::Ipv4Addr;

    #[test]
    fn test_table_miss_spec() {
        assert_eq!(
            flow_spec(&FlowRule::table_miss(Dpid(1))),
            "priority=0,actions=CONTROLLER:65535"
        );
    }

    #[test]
    fn test_sliced_rule_spec() {
        let rule = FlowRule {
            dpid: Dpid(1),
            priority: priorities::SLICED,
            match_fields: FlowMatch {
                in_port: Some(PortNo(1)),
                eth_type: Some(0x0800),
                ipv4_src: Some(Ipv4Addr::new(10, 0, 0, 1)),
                ipv4_dst: Some(Ipv4Addr::new(10, 0, 0, 4)),
                ip_proto: Some(6),
                tcp_dst: Some(5000),
            },
            actions: vec![FlowAction::SetQueue(QueueId(2)), FlowAction::Output(PortNo(3))],
        };
        assert_eq!(
            flow_spec(&rule),
            "priority=2,in_port=1,dl_type=0x0800,nw_src=10.0.0.1,nw_dst=10.0.0.4,\
             nw_proto=6,tp_dst=5000,actions=set_queue:2,output:3"
        );
    }

    #[test]
    fn test_empty_actions_drop() {
        let rule = FlowRule {
            dpid: Dpid(2),
            priority: 1,
            match_fields: FlowMatch::in_port(PortNo(2)),
            actions: Vec::new(),
        };
        assert_eq!(flow_spec(&rule), "priority=1,in_port=2,actions=drop");
    }

    #[test]
    fn test_qos_command() {
        let queues = BTreeMap::from([
            (
                QueueId(1),
                QueueShare {
                    min_rate_bps: 5_000_000,
                    max_rate_bps: 10_000_000,
                },
            ),
            (
                QueueId(2),
                QueueShare {
                    min_rate_bps: 1_000_000,
                    max_rate_bps: 5_000_000,
                },
            ),
        ]);
        let cmd = qos_command("s1-eth1", 10_000_000, &queues);
        assert!(cmd.starts_with("/usr/bin/ovs-vsctl -- set port \"s1-eth1\" qos=@newqos"));
        assert!(cmd.contains("type=linux-htb other-config:max-rate=10000000 queues:1=@q1 queues:2=@q2"));
        assert!(cmd.contains("--id=@q2 create queue other-config:min-rate=1000000 other-config:max-rate=5000000"));
    }

    #[test]
    fn test_naming() {
        let installer = OvsInstaller::new(&InstallerConfig::default());
        assert_eq!(installer.bridge_name(Dpid(4)), "s4");
        assert_eq!(installer.interface_name(Dpid(4), PortNo(2)), "s4-eth2");
        assert_eq!(installer.name(), "ovs");
    }
}
