//! Stake-and-slash reservation ledger.
//!
//! Stakeholders register machines by reserving value with the ledger.
//! Authorized monitors report machines that time out; the ledger seizes the
//! penalty from the owner's reserve and records any shortfall as a debt the
//! next registrant of that machine must settle before the machine is staked
//! again.
//!
//! External effects go through three ports ([`TokenCustody`],
//! [`IdentityVerifier`], [`ProjectRegistry`]) so the ledger can be bound to
//! any token backend, signature scheme or project directory.
//!
//! Every operation is all-or-nothing: a failed `stake` or `report_timeout`
//! leaves both tables and custody untouched.

#![deny(unsafe_code)]

pub mod amount;
pub mod config;
pub mod error;
pub mod journal;
pub mod ledger;
pub mod policy;
pub mod ports;
pub mod state;
pub mod types;

pub use config::{LedgerConfig, TOKEN_UNIT};
pub use error::{CustodyError, StakeError};
pub use journal::{JournalEntry, LedgerEvent, LedgerJournal};
pub use ledger::{plan_stake, LedgerBuilder, ReservationLedger, StakePlan};
pub use policy::{FixedPenalty, ReporterRoster, SlashPolicy};
pub use ports::{IdentityVerifier, ProjectRegistry, TokenCustody};
pub use state::{LedgerSnapshot, LedgerState};
pub use types::{
    Amount, MachineId, MachineRecord, MachineState, SlashReceipt, StakePath, StakeProof,
    StakeReceipt, StakeRequest, StakeholderId,
};
