//! Port adapters for the reservation ledger.

#![deny(unsafe_code)]

pub mod custody;
pub mod identity;
pub mod registry;

pub use custody::{CustodyAccount, InMemoryTokenCustody, RejectingCustody};
pub use identity::{
    grant_reporter_message, revoke_reporter_message, sign_proof, sign_stake_request,
    stake_message, stakeholder_for_public_key, timeout_message, AcceptAllVerifier,
    Ed25519IdentityVerifier, Nonce, ProofError,
};
pub use registry::InMemoryProjectRegistry;
