//! ModeController - owner of the operational mode
//!
//! The mode and the set of connected switches live behind one async mutex.
//! A transition holds it for the whole clear + apply sequence, so two
//! transitions never interleave their installer calls. The current mode is
//! mirrored on a watch channel for readers that must not wait on a running
//! reconfiguration.
//!
//! PacketIn handling decides and installs under a [`ModeSnapshot`]. The
//! snapshot holds the read side of a fence that a transition takes for
//! writing while it swaps the mode, so a rule decided in the old mode is
//! always installed before the transition clears the switches.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, info, instrument, warn};

use slicing_common::shell::{self, shellquote, BASH_CMD};
use slicing_common::{FlowInstaller, FlowRule, QueueShare, SliceError, SliceResult};
use slicing_types::{Dpid, Mode, PortNo, QueueId};

use crate::config::{ProvisioningKind, SlicerConfig};

/// How the ruleset of a mode reaches the switches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioning {
    /// Table-miss rule per switch, plus the QoS queues in simulation modes
    Builtin,
    /// One scenario script per mode, run once per reconfiguration
    Scripts { dir: PathBuf },
}

impl Provisioning {
    /// Script run for `mode`
    pub fn script_name(mode: Mode) -> String {
        if mode.is_default() {
            "miss_flow.sh".to_string()
        } else {
            format!("{}.sh", mode.name())
        }
    }
}

/// Everything a reconfiguration needs besides the target mode
#[derive(Debug, Clone)]
pub struct ApplyPlan {
    pub provisioning: Provisioning,
    /// Edge switches and their host-facing ports
    pub edge_ports: BTreeMap<Dpid, Vec<PortNo>>,
    /// Queues configured on every edge port in simulation modes
    pub queues: Vec<(QueueId, QueueShare)>,
    /// Bound on every installer call
    pub call_timeout: Duration,
    pub use_sudo: bool,
}

impl ApplyPlan {
    pub fn from_config(config: &SlicerConfig) -> Self {
        let slicing = &config.slicing;
        let provisioning = match config.installer.provisioning {
            ProvisioningKind::Builtin => Provisioning::Builtin,
            ProvisioningKind::Scripts => Provisioning::Scripts {
                dir: config.installer.scripts_dir.clone(),
            },
        };

        Self {
            provisioning,
            edge_ports: slicing.edge_switches.clone(),
            queues: vec![
                (slicing.researcher_queue, slicing.researcher_share),
                (slicing.student_queue, slicing.student_share),
            ],
            call_timeout: config.installer_timeout(),
            use_sudo: config.installer.use_sudo,
        }
    }

    fn ports_of(&self, dpid: Dpid) -> impl Iterator<Item = PortNo> + '_ {
        self.edge_ports.get(&dpid).into_iter().flatten().copied()
    }
}

/// Summary of one reconfiguration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    pub from: Mode,
    pub to: Mode,
    /// Switches reconfigured
    pub switches: usize,
    /// Installer calls that failed or timed out
    pub failures: usize,
}

impl ApplyReport {
    pub fn is_complete(&self) -> bool {
        self.failures == 0
    }
}

/// Result of [`ModeController::transition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Requested mode was already active; nothing was touched
    Unchanged(Mode),
    /// Mode changed and every connected switch was reconfigured
    Applied(ApplyReport),
}

impl TransitionOutcome {
    /// Mode in effect after the call
    pub fn mode(&self) -> Mode {
        match self {
            TransitionOutcome::Unchanged(mode) => *mode,
            TransitionOutcome::Applied(report) => report.to,
        }
    }
}

#[derive(Debug)]
struct ControllerState {
    mode: Mode,
    connected: BTreeSet<Dpid>,
}

/// The current mode, fixed until dropped
pub struct ModeSnapshot<'a> {
    mode: Mode,
    _fence: RwLockReadGuard<'a, ()>,
}

impl ModeSnapshot<'_> {
    pub fn mode(&self) -> Mode {
        self.mode
    }
}

/// Serializes mode transitions and switch (re)configuration
pub struct ModeController {
    state: Mutex<ControllerState>,
    mode_tx: watch::Sender<Mode>,
    fence: RwLock<()>,
    installer: Arc<dyn FlowInstaller>,
    plan: ApplyPlan,
}

impl ModeController {
    /// Creates a controller in [`Mode::Default`] with no known switches
    pub fn new(installer: Arc<dyn FlowInstaller>, plan: ApplyPlan) -> Self {
        let (mode_tx, _) = watch::channel(Mode::Default);
        Self {
            state: Mutex::new(ControllerState {
                mode: Mode::Default,
                connected: BTreeSet::new(),
            }),
            mode_tx,
            fence: RwLock::new(()),
            installer,
            plan,
        }
    }

    /// Current mode. Never blocks on a running transition.
    pub fn mode(&self) -> Mode {
        *self.mode_tx.borrow()
    }

    /// Holds the current mode until the snapshot is dropped.
    ///
    /// A transition waits for every outstanding snapshot before switching,
    /// so keep one only across a decision and its rule install.
    pub async fn snapshot(&self) -> ModeSnapshot<'_> {
        let fence = self.fence.read().await;
        ModeSnapshot {
            mode: *self.mode_tx.borrow(),
            _fence: fence,
        }
    }

    /// Bound applied to every installer call
    pub fn call_timeout(&self) -> Duration {
        self.plan.call_timeout
    }

    /// Receiver notified on every mode change
    pub fn subscribe(&self) -> watch::Receiver<Mode> {
        self.mode_tx.subscribe()
    }

    pub async fn connected_switches(&self) -> Vec<Dpid> {
        self.state.lock().await.connected.iter().copied().collect()
    }

    /// Switches to the mode given by the flag pair.
    ///
    /// The new mode is recorded before any switch is touched and stays in
    /// effect even if some installer calls fail.
    #[instrument(skip(self))]
    pub async fn transition(&self, exam: bool, simulation: bool) -> TransitionOutcome {
        let target = Mode::from_flags(exam, simulation);
        let mut state = self.state.lock().await;

        if state.mode == target {
            debug!(mode = %target, "Mode unchanged, skipping reconfiguration");
            return TransitionOutcome::Unchanged(target);
        }

        let from = state.mode;
        {
            let _fence = self.fence.write().await;
            state.mode = target;
            self.mode_tx.send_replace(target);
        }
        info!(from = %from, to = %target, "Mode change");

        let switches: Vec<Dpid> = state.connected.iter().copied().collect();
        let failures = self.reconfigure(&switches, target).await;

        let report = ApplyReport {
            from,
            to: target,
            switches: switches.len(),
            failures,
        };
        if report.is_complete() {
            info!(mode = %target, switches = report.switches, "Mode applied");
        } else {
            warn!(
                mode = %target,
                switches = report.switches,
                failures = report.failures,
                "Mode applied partially"
            );
        }
        TransitionOutcome::Applied(report)
    }

    /// Registers a switch and brings it to the current mode.
    ///
    /// A switch connecting in Default mode only gets its table-miss rule;
    /// otherwise it is cleared and the current mode is re-applied to it.
    #[instrument(skip(self))]
    pub async fn on_switch_connected(&self, dpid: Dpid) -> ApplyReport {
        let mut state = self.state.lock().await;
        let mode = state.mode;
        if !state.connected.insert(dpid) {
            debug!(dpid = %dpid, "Switch reconnected");
        }
        info!(dpid = %dpid, mode = %mode, "Switch connected");

        let failures = if mode.is_default() {
            self.install_table_miss(dpid).await
        } else {
            self.reconfigure(&[dpid], mode).await
        };

        ApplyReport {
            from: mode,
            to: mode,
            switches: 1,
            failures,
        }
    }

    /// Forgets a switch; later transitions skip it until it reconnects
    pub async fn on_switch_disconnected(&self, dpid: Dpid) {
        let mut state = self.state.lock().await;
        if state.connected.remove(&dpid) {
            info!(dpid = %dpid, "Switch disconnected");
        } else {
            debug!(dpid = %dpid, "Disconnect for unknown switch ignored");
        }
    }

    /// Clears flows and queues on `switches` without registering them.
    /// Returns the number of failed installer calls.
    pub async fn reset_switches(&self, switches: impl IntoIterator<Item = Dpid>) -> usize {
        let _state = self.state.lock().await;
        let mut failures = 0;
        for dpid in switches {
            failures += self.reset_switch(dpid).await;
        }
        info!(failures, "Startup reset finished");
        failures
    }

    async fn reconfigure(&self, switches: &[Dpid], mode: Mode) -> usize {
        let mut failures = 0;
        match &self.plan.provisioning {
            Provisioning::Builtin => {
                for &dpid in switches {
                    failures += self.reset_switch(dpid).await;
                    failures += self.apply_builtin(dpid, mode).await;
                }
            }
            Provisioning::Scripts { dir } => {
                for &dpid in switches {
                    failures += self.reset_switch(dpid).await;
                    failures += self.install_table_miss(dpid).await;
                }
                if !switches.is_empty() {
                    failures += self.run_script(dir, mode).await;
                }
            }
        }
        failures
    }

    async fn reset_switch(&self, dpid: Dpid) -> usize {
        let mut failures = self
            .guarded(dpid, "delete_all_rules", self.installer.delete_all_rules(dpid))
            .await;
        for port in self.plan.ports_of(dpid) {
            failures += self
                .guarded(
                    dpid,
                    "clear_queue_config",
                    self.installer.clear_queue_config(dpid, port),
                )
                .await;
        }
        failures
    }

    async fn apply_builtin(&self, dpid: Dpid, mode: Mode) -> usize {
        let mut failures = self.install_table_miss(dpid).await;
        if mode.simulation() {
            for port in self.plan.ports_of(dpid) {
                for &(queue, share) in &self.plan.queues {
                    failures += self
                        .guarded(
                            dpid,
                            "set_queue",
                            self.installer.set_queue(dpid, port, queue, share),
                        )
                        .await;
                }
            }
        }
        failures
    }

    async fn install_table_miss(&self, dpid: Dpid) -> usize {
        let rule = FlowRule::table_miss(dpid);
        self.guarded(dpid, "install_rule", self.installer.install_rule(&rule))
            .await
    }

    async fn run_script(&self, dir: &std::path::Path, mode: Mode) -> usize {
        let script = dir.join(Provisioning::script_name(mode));
        let cmd = shell::with_sudo(
            format!("{} {}", BASH_CMD, shellquote(&script.to_string_lossy())),
            self.plan.use_sudo,
        );
        match shell::exec_with_timeout(&cmd, self.plan.call_timeout).await {
            Ok(_) => {
                info!(script = %script.display(), "Scenario script applied");
                0
            }
            Err(e) => {
                warn!(script = %script.display(), error = %e, "Scenario script failed");
                1
            }
        }
    }

    /// Runs one installer call under the call timeout. Returns 1 on failure.
    async fn guarded<F>(&self, dpid: Dpid, operation: &'static str, call: F) -> usize
    where
        F: Future<Output = SliceResult<()>>,
    {
        let timeout = self.plan.call_timeout;
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(SliceError::timeout(
                format!("{} on switch {}", operation, dpid),
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        };

        match result {
            Ok(()) => 0,
            Err(e) => {
                warn!(
                    dpid = %dpid,
                    installer = self.installer.name(),
                    operation,
                    error = %e,
                    "Installer call failed"
                );
                1
            }
        }
    }
}
