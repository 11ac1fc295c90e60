//! Ledger tables and their locking discipline.
//!
//! Two key-value tables back the ledger: stakeholder -> reserved balance and
//! machine -> record. Each key owns its own async mutex so operations on
//! distinct machines proceed in parallel. Mutations take machine locks
//! before stakeholder locks and hold at most one of each.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};

use crate::error::StakeError;
use crate::types::{Amount, MachineId, MachineRecord, StakeholderId};

/// `None` until the first successful stake for the key.
pub(crate) type MachineSlot = Arc<Mutex<Option<MachineRecord>>>;
pub(crate) type ReserveSlot = Arc<Mutex<Amount>>;

/// Injectable storage for the reservation ledger.
#[derive(Debug, Default)]
pub struct LedgerState {
    machines: DashMap<MachineId, MachineSlot>,
    reserves: DashMap<StakeholderId, ReserveSlot>,
    /// Shared by mutations, exclusive for snapshots.
    gate: RwLock<()>,
}

/// Point-in-time copy of both tables.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(with = "amount_map")]
    pub reserves: BTreeMap<StakeholderId, Amount>,
    pub machines: BTreeMap<MachineId, MachineRecord>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild tables from a snapshot, rejecting inconsistent records.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self, StakeError> {
        let state = Self::new();
        for (stakeholder, balance) in snapshot.reserves {
            state
                .reserves
                .insert(stakeholder, Arc::new(Mutex::new(balance)));
        }
        for (machine_id, record) in snapshot.machines {
            if record.machine_id != machine_id {
                return Err(StakeError::InvalidSnapshot(format!(
                    "record keyed {} carries machine id {}",
                    machine_id, record.machine_id
                )));
            }
            if !record.is_consistent() {
                return Err(StakeError::InvalidSnapshot(format!(
                    "machine {} is staked while owing {}",
                    machine_id, record.outstanding_slash
                )));
            }
            state
                .machines
                .insert(machine_id, Arc::new(Mutex::new(Some(record))));
        }
        Ok(state)
    }

    /// Lock slot for a machine, creating an empty one for unseen keys.
    pub(crate) fn machine_slot(&self, machine_id: &MachineId) -> MachineSlot {
        self.machines
            .entry(machine_id.clone())
            .or_default()
            .value()
            .clone()
    }

    pub(crate) fn existing_machine_slot(&self, machine_id: &MachineId) -> Option<MachineSlot> {
        self.machines.get(machine_id).map(|slot| slot.value().clone())
    }

    pub(crate) fn reserve_slot(&self, stakeholder: &StakeholderId) -> ReserveSlot {
        self.reserves
            .entry(stakeholder.clone())
            .or_default()
            .value()
            .clone()
    }

    /// Drop a machine slot that never received a record.
    ///
    /// Runs under the shard write lock, so a strong count of one means no
    /// other task holds or can obtain a handle to the slot.
    pub(crate) fn release_machine_slot(&self, machine_id: &MachineId) {
        self.machines.remove_if(machine_id, |_, slot| {
            Arc::strong_count(slot) == 1
                && slot
                    .try_lock()
                    .map(|record| record.is_none())
                    .unwrap_or(false)
        });
    }

    /// Drop an unreferenced zero-balance reserve slot.
    pub(crate) fn release_reserve_slot(&self, stakeholder: &StakeholderId) {
        self.reserves.remove_if(stakeholder, |_, slot| {
            Arc::strong_count(slot) == 1
                && slot
                    .try_lock()
                    .map(|balance| *balance == 0)
                    .unwrap_or(false)
        });
    }

    #[cfg(test)]
    pub(crate) fn slot_counts(&self) -> (usize, usize) {
        (self.machines.len(), self.reserves.len())
    }

    pub(crate) async fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().await
    }

    /// Reserved balance, zero for unknown stakeholders.
    pub async fn reserved_balance(&self, stakeholder: &StakeholderId) -> Amount {
        let Some(slot) = self.reserves.get(stakeholder).map(|s| s.value().clone()) else {
            return 0;
        };
        let balance = *slot.lock().await;
        balance
    }

    pub async fn machine(&self, machine_id: &MachineId) -> Option<MachineRecord> {
        let slot = self.existing_machine_slot(machine_id)?;
        let record = slot.lock().await;
        record.clone()
    }

    /// Consistent copy of both tables. Waits for in-flight mutations.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        let _exclusive = self.gate.write().await;

        let reserve_slots: Vec<(StakeholderId, ReserveSlot)> = self
            .reserves
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let machine_slots: Vec<(MachineId, MachineSlot)> = self
            .machines
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut snapshot = LedgerSnapshot::default();
        for (stakeholder, slot) in reserve_slots {
            let balance = *slot.lock().await;
            if balance > 0 {
                snapshot.reserves.insert(stakeholder, balance);
            }
        }
        for (machine_id, slot) in machine_slots {
            if let Some(record) = slot.lock().await.clone() {
                snapshot.machines.insert(machine_id, record);
            }
        }
        snapshot
    }
}

mod amount_map {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::types::{Amount, StakeholderId};

    #[derive(Serialize, Deserialize)]
    struct Wrapped(#[serde(with = "crate::amount")] Amount);

    pub fn serialize<S>(map: &BTreeMap<StakeholderId, Amount>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let wrapped: BTreeMap<&StakeholderId, Wrapped> =
            map.iter().map(|(k, v)| (k, Wrapped(*v))).collect();
        wrapped.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<StakeholderId, Amount>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wrapped = BTreeMap::<StakeholderId, Wrapped>::deserialize(deserializer)?;
        Ok(wrapped.into_iter().map(|(k, v)| (k, v.0)).collect())
    }
}
