use dashmap::DashSet;

use crate::types::{Amount, MachineRecord, StakeholderId};

/// Resolves the penalty applied when a machine times out.
///
/// Called while the machine is locked, with the owner's reserve at that
/// instant. Implementations must be deterministic for a given input.
pub trait SlashPolicy: Send + Sync {
    fn penalty_for(&self, machine: &MachineRecord, reserve: Amount) -> Amount;
}

/// The same penalty for every timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedPenalty(pub Amount);

impl SlashPolicy for FixedPenalty {
    fn penalty_for(&self, _machine: &MachineRecord, _reserve: Amount) -> Amount {
        self.0
    }
}

/// Who may report timeouts: the ledger owner plus delegated monitors.
#[derive(Debug)]
pub struct ReporterRoster {
    owner: StakeholderId,
    monitors: DashSet<StakeholderId>,
}

impl ReporterRoster {
    pub fn new(owner: StakeholderId) -> Self {
        Self {
            owner,
            monitors: DashSet::new(),
        }
    }

    pub fn owner(&self) -> &StakeholderId {
        &self.owner
    }

    pub fn is_owner(&self, caller: &StakeholderId) -> bool {
        &self.owner == caller
    }

    pub fn may_report(&self, caller: &StakeholderId) -> bool {
        self.is_owner(caller) || self.monitors.contains(caller)
    }

    /// Returns `false` when the monitor was already present.
    pub fn grant(&self, monitor: StakeholderId) -> bool {
        self.monitors.insert(monitor)
    }

    /// Returns `false` when the monitor was not present.
    pub fn revoke(&self, monitor: &StakeholderId) -> bool {
        self.monitors.remove(monitor).is_some()
    }

    pub fn monitors(&self) -> Vec<StakeholderId> {
        let mut monitors: Vec<_> = self.monitors.iter().map(|m| m.key().clone()).collect();
        monitors.sort();
        monitors
    }
}
