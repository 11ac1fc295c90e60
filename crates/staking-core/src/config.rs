use serde::{Deserialize, Serialize};

use crate::error::StakeError;
use crate::types::{Amount, StakeholderId};

/// One token unit at 18 decimals.
pub const TOKEN_UNIT: Amount = 1_000_000_000_000_000_000;

/// Administrative parameters bound at ledger initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Ledger owner; always allowed to report timeouts and manage monitors.
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Floor value published for policy collaborators. Not enforced by `stake`.
    #[serde(default = "default_min_stake", with = "crate::amount")]
    pub min_stake: Amount,

    /// Penalty applied by the default fixed slash policy.
    #[serde(default = "default_slash_penalty", with = "crate::amount")]
    pub slash_penalty: Amount,

    /// Monitors granted reporting rights at startup.
    #[serde(default)]
    pub reporters: Vec<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            min_stake: default_min_stake(),
            slash_penalty: default_slash_penalty(),
            reporters: Vec::new(),
        }
    }
}

impl LedgerConfig {
    pub fn owner_id(&self) -> Result<StakeholderId, StakeError> {
        StakeholderId::new(self.owner.clone())
    }

    pub fn reporter_ids(&self) -> Result<Vec<StakeholderId>, StakeError> {
        self.reporters
            .iter()
            .map(|r| StakeholderId::new(r.clone()))
            .collect()
    }
}

fn default_owner() -> String {
    "ledger-owner".to_string()
}

fn default_min_stake() -> Amount {
    10 * TOKEN_UNIT
}

fn default_slash_penalty() -> Amount {
    10_000 * TOKEN_UNIT
}
