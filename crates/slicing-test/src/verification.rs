//! Verification helpers over recorded installer calls
//!
//! Reconstructs per-switch dataplane state from a call log so tests can
//! assert on what a switch would hold, not just on which calls were made.

use std::collections::BTreeSet;
use thiserror::Error;

use slicing_common::FlowRule;
use slicing_types::{Dpid, PortNo, QueueId};

use crate::recorder::InstallerCall;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Switch {dpid} was never cleared")]
    NeverCleared { dpid: Dpid },

    #[error("Switch {dpid}: expected {expected} table-miss rule(s) after the last clear, found {actual}")]
    TableMissCount {
        dpid: Dpid,
        expected: usize,
        actual: usize,
    },

    #[error("Switch {dpid}: expected {expected} clear cycle(s), found {actual}")]
    CycleCountMismatch {
        dpid: Dpid,
        expected: usize,
        actual: usize,
    },

    #[error("Switch {dpid}: calls of two cycles interleave at position {position}")]
    Interleaved { dpid: Dpid, position: usize },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Dataplane state of one switch rebuilt from the call log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchState {
    /// Rules installed since the last clear
    pub rules: Vec<FlowRule>,
    /// Queues configured since the last clear, per port
    pub queues: BTreeSet<(PortNo, QueueId)>,
    /// Ports whose QoS configuration was cleared in the last cycle
    pub cleared_ports: BTreeSet<PortNo>,
}

/// Number of `delete_all_rules` calls aimed at `dpid`
pub fn clear_cycles(calls: &[InstallerCall], dpid: Dpid) -> usize {
    calls
        .iter()
        .filter(|call| matches!(call, InstallerCall::DeleteAllRules(d) if *d == dpid))
        .count()
}

/// State of `dpid` after replaying every call since its last clear
pub fn state_after_last_clear(calls: &[InstallerCall], dpid: Dpid) -> VerifyResult<SwitchState> {
    let start = calls
        .iter()
        .rposition(|call| matches!(call, InstallerCall::DeleteAllRules(d) if *d == dpid))
        .ok_or(VerificationError::NeverCleared { dpid })?;

    let mut state = SwitchState::default();
    for call in &calls[start + 1..] {
        match call {
            _ if call.dpid() != dpid => continue,
            InstallerCall::InstallRule(rule) => state.rules.push(rule.clone()),
            InstallerCall::ClearQueueConfig(_, port) => {
                state.cleared_ports.insert(*port);
                state.queues.retain(|(p, _)| p != port);
            }
            InstallerCall::SetQueue(_, port, queue, _) => {
                state.queues.insert((*port, *queue));
            }
            // `start` is the last clear of `dpid`
            InstallerCall::DeleteAllRules(_) => continue,
        }
    }
    Ok(state)
}

/// Asserts that `dpid` was cleared exactly `expected` times
pub fn assert_clear_cycles(calls: &[InstallerCall], dpid: Dpid, expected: usize) -> VerifyResult<()> {
    let actual = clear_cycles(calls, dpid);
    if actual != expected {
        return Err(VerificationError::CycleCountMismatch {
            dpid,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Asserts that the last cycle on `dpid` started from a clean switch and
/// re-installed exactly one table-miss rule
pub fn assert_clean_apply(calls: &[InstallerCall], dpid: Dpid) -> VerifyResult<SwitchState> {
    let state = state_after_last_clear(calls, dpid)?;
    let table_miss = state.rules.iter().filter(|r| r.is_table_miss()).count();
    if table_miss != 1 {
        return Err(VerificationError::TableMissCount {
            dpid,
            expected: 1,
            actual: table_miss,
        });
    }
    Ok(state)
}

/// Asserts that reconfiguration cycles on `dpid` never interleave: once a
/// cycle starts, no second clear happens before that cycle's table-miss rule
/// has been installed
pub fn assert_cycles_not_interleaved(calls: &[InstallerCall], dpid: Dpid) -> VerifyResult<()> {
    let mut open = false;
    for (position, call) in calls.iter().enumerate() {
        match call {
            _ if call.dpid() != dpid => continue,
            InstallerCall::DeleteAllRules(_) if open => {
                return Err(VerificationError::Interleaved { dpid, position });
            }
            InstallerCall::DeleteAllRules(_) => open = true,
            InstallerCall::InstallRule(rule) if rule.is_table_miss() => open = false,
            _ => {}
        }
    }
    Ok(())
}
