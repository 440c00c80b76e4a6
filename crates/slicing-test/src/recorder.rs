//! Recording flow installer
//!
//! Captures every installer call in order instead of touching a switch.
//! Calls can be made to fail per switch, and an artificial delay widens the
//! window for interleaving in concurrency tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::Duration;

use slicing_common::{FlowInstaller, FlowRule, QueueShare, SliceError, SliceResult};
use slicing_types::{Dpid, PortNo, QueueId};

/// One recorded installer call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallerCall {
    InstallRule(FlowRule),
    DeleteAllRules(Dpid),
    ClearQueueConfig(Dpid, PortNo),
    SetQueue(Dpid, PortNo, QueueId, QueueShare),
}

impl InstallerCall {
    /// Switch the call was aimed at
    pub fn dpid(&self) -> Dpid {
        match self {
            InstallerCall::InstallRule(rule) => rule.dpid,
            InstallerCall::DeleteAllRules(dpid)
            | InstallerCall::ClearQueueConfig(dpid, _)
            | InstallerCall::SetQueue(dpid, _, _, _) => *dpid,
        }
    }

    /// Returns true for `DeleteAllRules`
    pub fn is_delete_all(&self) -> bool {
        matches!(self, InstallerCall::DeleteAllRules(_))
    }
}

/// Flow installer that records calls instead of executing them
#[derive(Debug, Default)]
pub struct RecordingInstaller {
    calls: Mutex<Vec<InstallerCall>>,
    failing: Mutex<HashSet<Dpid>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingInstaller {
    /// Create an installer that accepts every call
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call aimed at `dpid` fail (after being recorded)
    pub fn fail_on(&self, dpid: Dpid) {
        self.failing.lock().insert(dpid);
    }

    /// Stop failing calls for `dpid`
    pub fn recover(&self, dpid: Dpid) {
        self.failing.lock().remove(&dpid);
    }

    /// Sleep this long inside every call
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = Some(delay);
        self
    }

    /// Snapshot of all recorded calls, in order
    pub fn calls(&self) -> Vec<InstallerCall> {
        self.calls.lock().clone()
    }

    /// Number of recorded calls
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Recorded calls aimed at one switch
    pub fn calls_for(&self, dpid: Dpid) -> Vec<InstallerCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.dpid() == dpid)
            .cloned()
            .collect()
    }

    /// Installed rules, in order
    pub fn installed_rules(&self) -> Vec<FlowRule> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                InstallerCall::InstallRule(rule) => Some(rule.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of `delete_all_rules` calls
    pub fn delete_count(&self) -> usize {
        self.calls.lock().iter().filter(|c| c.is_delete_all()).count()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    async fn record(&self, call: InstallerCall, operation: &str) -> SliceResult<()> {
        let dpid = call.dpid();
        self.calls.lock().push(call);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().contains(&dpid) {
            tracing::debug!(%dpid, operation, "Recording installer: injected failure");
            return Err(SliceError::installer(dpid, operation, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl FlowInstaller for RecordingInstaller {
    fn name(&self) -> &str {
        "recording"
    }

    async fn install_rule(&self, rule: &FlowRule) -> SliceResult<()> {
        self.record(InstallerCall::InstallRule(rule.clone()), "install_rule")
            .await
    }

    async fn delete_all_rules(&self, dpid: Dpid) -> SliceResult<()> {
        self.record(InstallerCall::DeleteAllRules(dpid), "delete_all_rules")
            .await
    }

    async fn clear_queue_config(&self, dpid: Dpid, port: PortNo) -> SliceResult<()> {
        self.record(
            InstallerCall::ClearQueueConfig(dpid, port),
            "clear_queue_config",
        )
        .await
    }

    async fn set_queue(
        &self,
        dpid: Dpid,
        port: PortNo,
        queue: QueueId,
        share: QueueShare,
    ) -> SliceResult<()> {
        self.record(InstallerCall::SetQueue(dpid, port, queue, share), "set_queue")
            .await
    }
}
