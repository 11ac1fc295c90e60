//! Boundary traits for the collaborators the ledger depends on.
//!
//! The ledger never talks to a token contract, a signature scheme or a
//! project registry directly; it is handed implementations of these traits
//! at initialization. `staking-adapters` ships in-memory and Ed25519
//! implementations.

use async_trait::async_trait;

use crate::error::CustodyError;
use crate::types::{Amount, MachineId, StakeProof, StakeholderId};

/// Moves custody of value into and out of the ledger's pool.
///
/// Each call either moves the full amount or nothing.
#[async_trait]
pub trait TokenCustody: Send + Sync {
    /// Pull `amount` from `from` into the pool.
    async fn transfer_in(&self, from: &StakeholderId, amount: Amount) -> Result<(), CustodyError>;

    /// Pay `amount` from the pool to `to`.
    async fn transfer_out(&self, to: &StakeholderId, amount: Amount) -> Result<(), CustodyError>;
}

/// Authenticates that a proof authorizes `claimed` to stake `machine_id`
/// with exactly `reserve_amount`.
///
/// Implementations that accept replayable proofs must reject a proof once it
/// has been used.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(
        &self,
        proof: &StakeProof,
        claimed: &StakeholderId,
        machine_id: &MachineId,
        reserve_amount: Amount,
    ) -> bool;
}

/// Answers whether a machine may participate.
#[async_trait]
pub trait ProjectRegistry: Send + Sync {
    async fn is_eligible(&self, machine_id: &MachineId) -> bool;
}
