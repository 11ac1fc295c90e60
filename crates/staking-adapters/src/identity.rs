use async_trait::async_trait;
use dashmap::DashSet;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use staking_core::{Amount, IdentityVerifier, MachineId, StakeProof, StakeRequest, StakeholderId};
use thiserror::Error;
use tracing::debug;

/// Single-use number chosen by the signer of each message.
pub type Nonce = u64;

fn with_nonce(body: String, nonce: Nonce) -> String {
    format!("{body}:{nonce}")
}

fn stake_body(machine_id: &MachineId, reserve_amount: Amount) -> String {
    format!("stake-machine:{machine_id}:{reserve_amount}")
}

fn timeout_body(machine_id: &MachineId, penalty: Option<Amount>) -> String {
    match penalty {
        Some(penalty) => format!("report-timeout:{machine_id}:{penalty}"),
        None => format!("report-timeout:{machine_id}:policy"),
    }
}

fn grant_body(monitor: &StakeholderId) -> String {
    format!("grant-reporter:{monitor}")
}

fn revoke_body(monitor: &StakeholderId) -> String {
    format!("revoke-reporter:{monitor}")
}

/// Canonical message a stakeholder signs to stake `machine_id` with exactly
/// `reserve_amount` base units.
pub fn stake_message(machine_id: &MachineId, reserve_amount: Amount, nonce: Nonce) -> String {
    with_nonce(stake_body(machine_id, reserve_amount), nonce)
}

/// Canonical message a reporter signs to slash `machine_id`. `None` defers the
/// penalty to the ledger's slash policy.
pub fn timeout_message(machine_id: &MachineId, penalty: Option<Amount>, nonce: Nonce) -> String {
    with_nonce(timeout_body(machine_id, penalty), nonce)
}

pub fn grant_reporter_message(monitor: &StakeholderId, nonce: Nonce) -> String {
    with_nonce(grant_body(monitor), nonce)
}

pub fn revoke_reporter_message(monitor: &StakeholderId, nonce: Nonce) -> String {
    with_nonce(revoke_body(monitor), nonce)
}

/// Stakeholder id bound to a hex-encoded Ed25519 public key.
pub fn stakeholder_for_public_key(public_key_hex: &str) -> Option<StakeholderId> {
    let bytes = hex::decode(public_key_hex).ok()?;
    (bytes.len() == 32).then(|| StakeholderId::from_public_key(&bytes))
}

/// Sign `message` and return the signer's stakeholder id with the proof.
pub fn sign_proof(signing_key: &SigningKey, message: String) -> (StakeholderId, StakeProof) {
    let signature = signing_key.sign(message.as_bytes());
    let public_key = signing_key.verifying_key();
    let proof = StakeProof {
        message,
        signature: hex::encode(signature.to_bytes()),
        public_key: hex::encode(public_key.as_bytes()),
    };
    (StakeholderId::from_public_key(public_key.as_bytes()), proof)
}

/// Build a signed stake request for `machine_id`.
///
/// Returns the stakeholder id bound to the signing key together with the
/// request, ready to submit. Each request needs a nonce the signer has not
/// used before.
pub fn sign_stake_request(
    signing_key: &SigningKey,
    machine_id: MachineId,
    reserve_amount: Amount,
    nonce: Nonce,
) -> (StakeholderId, StakeRequest) {
    let (stakeholder, proof) =
        sign_proof(signing_key, stake_message(&machine_id, reserve_amount, nonce));
    let request = StakeRequest {
        proof,
        machine_id,
        reserve_amount,
    };
    (stakeholder, request)
}

/// Why a signed proof was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProofError {
    #[error("public key is not 32 hex-encoded bytes")]
    MalformedKey,

    #[error("signature is not 64 hex-encoded bytes")]
    MalformedSignature,

    #[error("message does not describe the requested action")]
    WrongMessage,

    #[error("public key does not belong to caller")]
    WrongSigner,

    #[error("signature does not verify")]
    BadSignature,

    #[error("nonce already used")]
    Replayed,
}

/// Verifies hex-encoded Ed25519 proofs over canonical action messages.
///
/// A proof is accepted once per signer and nonce. The consumed set lives for
/// the lifetime of the verifier.
#[derive(Debug, Default)]
pub struct Ed25519IdentityVerifier {
    consumed: DashSet<(StakeholderId, Nonce)>,
}

impl Ed25519IdentityVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a proof for the timeout report on `machine_id` and return the
    /// reporter it authenticates.
    pub fn authenticate_timeout(
        &self,
        proof: &StakeProof,
        machine_id: &MachineId,
        penalty: Option<Amount>,
    ) -> Result<StakeholderId, ProofError> {
        self.authenticate(proof, &timeout_body(machine_id, penalty))
    }

    pub fn authenticate_grant(
        &self,
        proof: &StakeProof,
        monitor: &StakeholderId,
    ) -> Result<StakeholderId, ProofError> {
        self.authenticate(proof, &grant_body(monitor))
    }

    pub fn authenticate_revoke(
        &self,
        proof: &StakeProof,
        monitor: &StakeholderId,
    ) -> Result<StakeholderId, ProofError> {
        self.authenticate(proof, &revoke_body(monitor))
    }

    fn authenticate(&self, proof: &StakeProof, body: &str) -> Result<StakeholderId, ProofError> {
        let (signer, nonce) = Self::check(proof, body)?;
        self.consume(&signer, nonce)?;
        Ok(signer)
    }

    fn consume(&self, signer: &StakeholderId, nonce: Nonce) -> Result<(), ProofError> {
        if self.consumed.insert((signer.clone(), nonce)) {
            Ok(())
        } else {
            Err(ProofError::Replayed)
        }
    }

    /// Signature and message checks, without touching the consumed set.
    fn check(proof: &StakeProof, body: &str) -> Result<(StakeholderId, Nonce), ProofError> {
        let pk_bytes: [u8; 32] = hex::decode(&proof.public_key)
            .ok()
            .and_then(|bytes| bytes.as_slice().try_into().ok())
            .ok_or(ProofError::MalformedKey)?;
        let sig_bytes: [u8; 64] = hex::decode(&proof.signature)
            .ok()
            .and_then(|bytes| bytes.as_slice().try_into().ok())
            .ok_or(ProofError::MalformedSignature)?;

        let (signed_body, nonce) = proof
            .message
            .rsplit_once(':')
            .ok_or(ProofError::WrongMessage)?;
        let nonce: Nonce = nonce.parse().map_err(|_| ProofError::WrongMessage)?;
        if signed_body != body {
            return Err(ProofError::WrongMessage);
        }

        let verifying_key =
            VerifyingKey::from_bytes(&pk_bytes).map_err(|_| ProofError::MalformedKey)?;
        let signature = Signature::from_bytes(&sig_bytes);
        verifying_key
            .verify_strict(proof.message.as_bytes(), &signature)
            .map_err(|_| ProofError::BadSignature)?;

        Ok((StakeholderId::from_public_key(&pk_bytes), nonce))
    }
}

#[async_trait]
impl IdentityVerifier for Ed25519IdentityVerifier {
    async fn verify(
        &self,
        proof: &StakeProof,
        claimed: &StakeholderId,
        machine_id: &MachineId,
        reserve_amount: Amount,
    ) -> bool {
        let outcome = Self::check(proof, &stake_body(machine_id, reserve_amount)).and_then(
            |(signer, nonce)| {
                if &signer != claimed {
                    return Err(ProofError::WrongSigner);
                }
                self.consume(&signer, nonce)
            },
        );
        match outcome {
            Ok(()) => true,
            Err(reason) => {
                debug!(caller = %claimed, machine_id = %machine_id, %reason, "Stake proof rejected");
                false
            }
        }
    }
}

/// Accepts every proof. Development and test deployments only.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllVerifier;

#[async_trait]
impl IdentityVerifier for AcceptAllVerifier {
    async fn verify(&self, _: &StakeProof, _: &StakeholderId, _: &MachineId, _: Amount) -> bool {
        true
    }
}
