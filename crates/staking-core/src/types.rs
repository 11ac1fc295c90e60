use serde::{Deserialize, Serialize};

use crate::error::StakeError;

/// Units of custodied value.
///
/// Token amounts routinely carry 18 decimals, so `u64` is too narrow.
pub type Amount = u128;

/// Stable account identifier of a stakeholder.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StakeholderId(String);

impl StakeholderId {
    /// Create a stakeholder id, rejecting blank identifiers.
    pub fn new(id: impl Into<String>) -> Result<Self, StakeError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(StakeError::InvalidIdentifier(
                "stakeholder id must not be empty".into(),
            ));
        }
        Ok(Self(id))
    }

    /// Derive the account id bound to an Ed25519 public key.
    ///
    /// The id is `0x` followed by the first 20 bytes of the BLAKE3 digest of
    /// the raw key bytes, hex encoded.
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let digest = blake3::hash(public_key);
        let hex: String = digest.as_bytes()[..20]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        Self(format!("0x{}", hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StakeholderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for StakeholderId {
    type Error = StakeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StakeholderId> for String {
    fn from(value: StakeholderId) -> Self {
        value.0
    }
}

/// Opaque machine key, unique across the ledger.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MachineId(String);

impl MachineId {
    /// Create a machine id, rejecting empty keys.
    pub fn new(id: impl Into<String>) -> Result<Self, StakeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(StakeError::InvalidIdentifier(
                "machine id must not be empty".into(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MachineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for MachineId {
    type Error = StakeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MachineId> for String {
    fn from(value: MachineId) -> Self {
        value.0
    }
}

/// Persistent record for a machine that has been staked at least once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRecord {
    pub machine_id: MachineId,
    /// Stakeholder currently responsible for the machine.
    pub owner: StakeholderId,
    /// Active, undisputed registration.
    pub staked: bool,
    /// Penalty debt that could not be seized at slash time.
    #[serde(with = "crate::amount")]
    pub outstanding_slash: Amount,
}

impl MachineRecord {
    pub fn state(&self) -> MachineState {
        if self.staked {
            MachineState::Staked
        } else {
            MachineState::Slashed {
                outstanding: self.outstanding_slash,
            }
        }
    }

    /// Debt implies the machine is not actively staked.
    pub fn is_consistent(&self) -> bool {
        self.outstanding_slash == 0 || !self.staked
    }
}

/// Lifecycle state of a machine key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MachineState {
    /// Never successfully staked.
    Unregistered,
    Staked,
    /// Slashed and awaiting re-stake. `outstanding` may be zero when the
    /// reserve covered the full penalty.
    Slashed {
        #[serde(with = "crate::amount")]
        outstanding: Amount,
    },
}

/// Credentials presented with a stake request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeProof {
    pub message: String,
    pub signature: String,
    pub public_key: String,
}

/// Parameters of a single `stake` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRequest {
    #[serde(flatten)]
    pub proof: StakeProof,
    pub machine_id: MachineId,
    #[serde(with = "crate::amount")]
    pub reserve_amount: Amount,
}

impl StakeRequest {
    pub fn new(
        message: impl Into<String>,
        signature: impl Into<String>,
        public_key: impl Into<String>,
        machine_id: MachineId,
        reserve_amount: Amount,
    ) -> Self {
        Self {
            proof: StakeProof {
                message: message.into(),
                signature: signature.into(),
                public_key: public_key.into(),
            },
            machine_id,
            reserve_amount,
        }
    }
}

/// Which registration path a successful stake took.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakePath {
    /// Zero-reserve registration; nothing transferred.
    FreeRegistration,
    /// Reserve transferred in and credited in full.
    Funded,
    /// Re-registration after a slash: debt extinguished, surplus credited.
    DebtSettled,
}

/// Outcome of a successful `stake`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeReceipt {
    pub machine_id: MachineId,
    pub stakeholder: StakeholderId,
    pub path: StakePath,
    #[serde(with = "crate::amount")]
    pub transferred: Amount,
    #[serde(with = "crate::amount")]
    pub debt_settled: Amount,
    #[serde(with = "crate::amount")]
    pub credited: Amount,
    #[serde(with = "crate::amount")]
    pub reserved_balance: Amount,
}

/// Outcome of a successful `report_timeout`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashReceipt {
    pub machine_id: MachineId,
    pub owner: StakeholderId,
    pub reporter: StakeholderId,
    #[serde(with = "crate::amount")]
    pub penalty: Amount,
    #[serde(with = "crate::amount")]
    pub seized: Amount,
    #[serde(with = "crate::amount")]
    pub outstanding_slash: Amount,
    #[serde(with = "crate::amount")]
    pub reserved_balance: Amount,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(staked: bool, outstanding_slash: Amount) -> MachineRecord {
        MachineRecord {
            machine_id: MachineId::new("m1").unwrap(),
            owner: StakeholderId::new("alice").unwrap(),
            staked,
            outstanding_slash,
        }
    }

    #[test]
    fn empty_identifiers_rejected() {
        assert!(MachineId::new("").is_err());
        assert!(StakeholderId::new("   ").is_err());
        assert_eq!(MachineId::new("m1").unwrap().to_string(), "m1");
    }

    #[test]
    fn stakeholder_from_public_key_is_stable() {
        let a = StakeholderId::from_public_key(&[7u8; 32]);
        let b = StakeholderId::from_public_key(&[7u8; 32]);
        let c = StakeholderId::from_public_key(&[8u8; 32]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("0x"));
        assert_eq!(a.as_str().len(), 42);
    }

    #[test]
    fn record_state_mapping() {
        assert_eq!(record(true, 0).state(), MachineState::Staked);
        assert_eq!(
            record(false, 9).state(),
            MachineState::Slashed { outstanding: 9 }
        );
        assert!(record(false, 9).is_consistent());
        assert!(!record(true, 9).is_consistent());
    }

    #[test]
    fn stake_request_wire_shape() {
        let request = StakeRequest::new(
            "msg",
            "sig",
            "pk",
            MachineId::new("m1").unwrap(),
            10_000_000_000_000_000_000_000,
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["message"], "msg");
        assert_eq!(json["machine_id"], "m1");
        assert_eq!(json["reserve_amount"], "10000000000000000000000");

        let restored: StakeRequest = serde_json::from_value(json).unwrap();
        assert_eq!(restored, request);
    }
}
