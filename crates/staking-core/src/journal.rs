//! Append-only, hash-chained record of committed ledger mutations.
//!
//! Entries are appended only after the corresponding table update has been
//! applied, while the affected keys are still locked, so per-machine journal
//! order matches commit order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Amount, MachineId, StakePath, StakeholderId};

/// A committed ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    Staked {
        machine_id: MachineId,
        stakeholder: StakeholderId,
        path: StakePath,
        #[serde(with = "crate::amount")]
        transferred: Amount,
        #[serde(with = "crate::amount")]
        debt_settled: Amount,
        #[serde(with = "crate::amount")]
        credited: Amount,
    },
    Slashed {
        machine_id: MachineId,
        owner: StakeholderId,
        reporter: StakeholderId,
        #[serde(with = "crate::amount")]
        penalty: Amount,
        #[serde(with = "crate::amount")]
        seized: Amount,
        #[serde(with = "crate::amount")]
        outstanding_slash: Amount,
    },
    ReporterGranted {
        monitor: StakeholderId,
    },
    ReporterRevoked {
        monitor: StakeholderId,
    },
}

impl LedgerEvent {
    pub fn machine_id(&self) -> Option<&MachineId> {
        match self {
            LedgerEvent::Staked { machine_id, .. } | LedgerEvent::Slashed { machine_id, .. } => {
                Some(machine_id)
            }
            LedgerEvent::ReporterGranted { .. } | LedgerEvent::ReporterRevoked { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub index: u64,
    pub entry_id: String,
    pub recorded_at: DateTime<Utc>,
    pub event: LedgerEvent,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

#[derive(Debug, Default, Clone)]
pub struct LedgerJournal {
    entries: Vec<JournalEntry>,
}

impl LedgerJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn for_machine<'a>(
        &'a self,
        machine_id: &'a MachineId,
    ) -> impl Iterator<Item = &'a JournalEntry> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.event.machine_id() == Some(machine_id))
    }

    pub fn append(&mut self, event: LedgerEvent) -> &JournalEntry {
        let index = self.entries.len() as u64;
        let recorded_at = Utc::now();
        let previous_hash = self.entries.last().map(|entry| entry.entry_hash.clone());
        let entry_hash = compute_entry_hash(index, recorded_at, &event, previous_hash.as_deref());

        self.entries.push(JournalEntry {
            index,
            entry_id: Uuid::new_v4().to_string(),
            recorded_at,
            event,
            previous_hash,
            entry_hash,
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn verify_chain(&self) -> bool {
        let mut previous_hash: Option<String> = None;
        for (position, entry) in self.entries.iter().enumerate() {
            if entry.index != position as u64 || entry.previous_hash != previous_hash {
                return false;
            }
            let expected = compute_entry_hash(
                entry.index,
                entry.recorded_at,
                &entry.event,
                entry.previous_hash.as_deref(),
            );
            if entry.entry_hash != expected {
                return false;
            }
            previous_hash = Some(entry.entry_hash.clone());
        }
        true
    }
}

fn compute_entry_hash(
    index: u64,
    recorded_at: DateTime<Utc>,
    event: &LedgerEvent,
    previous_hash: Option<&str>,
) -> String {
    let material = serde_json::json!({
        "index": index,
        "recorded_at": recorded_at,
        "event": event,
        "previous_hash": previous_hash,
    });

    let bytes = serde_json::to_vec(&material).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}
