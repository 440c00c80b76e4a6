//! Installer that only logs, for running the controller without switches

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use slicing_common::{FlowInstaller, FlowRule, QueueShare, SliceResult};
use slicing_types::{Dpid, PortNo, QueueId};

use crate::ovs::flow_spec;

#[derive(Debug, Default)]
pub struct LogInstaller {
    calls: AtomicU64,
}

impl LogInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls logged so far
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl FlowInstaller for LogInstaller {
    fn name(&self) -> &str {
        "log"
    }

    async fn install_rule(&self, rule: &FlowRule) -> SliceResult<()> {
        self.count();
        info!(dpid = %rule.dpid, flow = %flow_spec(rule), "dry-run: install rule");
        Ok(())
    }

    async fn delete_all_rules(&self, dpid: Dpid) -> SliceResult<()> {
        self.count();
        info!(dpid = %dpid, "dry-run: delete all rules");
        Ok(())
    }

    async fn clear_queue_config(&self, dpid: Dpid, port: PortNo) -> SliceResult<()> {
        self.count();
        info!(dpid = %dpid, port = %port, "dry-run: clear queue config");
        Ok(())
    }

    async fn set_queue(
        &self,
        dpid: Dpid,
        port: PortNo,
        queue: QueueId,
        share: QueueShare,
    ) -> SliceResult<()> {
        self.count();
        info!(
            dpid = %dpid,
            port = %port,
            queue = %queue,
            min_rate_bps = share.min_rate_bps,
            max_rate_bps = share.max_rate_bps,
            "dry-run: set queue"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_call_succeeds() {
        let installer = LogInstaller::new();
        installer
            .install_rule(&FlowRule::table_miss(Dpid(1)))
            .await
            .unwrap();
        installer.delete_all_rules(Dpid(1)).await.unwrap();
        installer.clear_queue_config(Dpid(1), PortNo(1)).await.unwrap();
        installer
            .set_queue(
                Dpid(1),
                PortNo(1),
                QueueId(1),
                QueueShare {
                    min_rate_bps: 1,
                    max_rate_bps: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(installer.call_count(), 4);
    }
}
