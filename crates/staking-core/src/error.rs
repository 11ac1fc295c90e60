use thiserror::Error;

use crate::types::{Amount, MachineId};

/// Errors surfaced by the reservation ledger.
///
/// Every variant is a definite outcome: the failed operation left the
/// ledger and custody untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakeError {
    #[error("identity verification failed for machine {0}")]
    Unauthenticated(MachineId),

    #[error("machine {0} is not eligible for staking")]
    Ineligible(MachineId),

    #[error("machine already staked: {0}")]
    AlreadyStaked(MachineId),

    #[error("custody transfer failed: {reason}")]
    TransferFailed { reason: String },

    #[error("insufficient stake for {machine_id}: outstanding slash {required}, offered {offered}")]
    InsufficientStake {
        machine_id: MachineId,
        required: Amount,
        offered: Amount,
    },

    #[error("machine {0} has no active stake")]
    NotStaked(MachineId),

    #[error("caller {caller} is not authorized to {action}")]
    Unauthorized { caller: String, action: String },

    // --- structural errors ---
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("amount overflow while crediting reserve")]
    Overflow,

    #[error("ledger initialization failed: {0}")]
    Initialization(String),

    #[error("invalid ledger snapshot: {0}")]
    InvalidSnapshot(String),
}

impl StakeError {
    /// Stable machine-readable code for the error taxonomy.
    pub fn code(&self) -> &'static str {
        match self {
            StakeError::Unauthenticated(_) => "UNAUTHENTICATED",
            StakeError::Ineligible(_) => "INELIGIBLE",
            StakeError::AlreadyStaked(_) => "ALREADY_STAKED",
            StakeError::TransferFailed { .. } => "TRANSFER_FAILED",
            StakeError::InsufficientStake { .. } => "INSUFFICIENT_STAKE",
            StakeError::NotStaked(_) => "NOT_STAKED",
            StakeError::Unauthorized { .. } => "UNAUTHORIZED",
            StakeError::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            StakeError::Overflow => "OVERFLOW",
            StakeError::Initialization(_) => "INITIALIZATION",
            StakeError::InvalidSnapshot(_) => "INVALID_SNAPSHOT",
        }
    }

    pub(crate) fn unauthorized(caller: impl std::fmt::Display, action: &str) -> Self {
        StakeError::Unauthorized {
            caller: caller.to_string(),
            action: action.to_string(),
        }
    }
}

/// Failure reported by a token custody backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodyError {
    #[error("allowance {allowance} below requested {requested}")]
    InsufficientAllowance { allowance: Amount, requested: Amount },

    #[error("balance {balance} below requested {requested}")]
    InsufficientBalance { balance: Amount, requested: Amount },

    #[error("custody pool holds {available}, cannot pay out {requested}")]
    InsufficientPool { available: Amount, requested: Amount },

    #[error("custody backend unavailable: {0}")]
    Unavailable(String),

    #[error("custody arithmetic overflow")]
    Overflow,
}

impl From<CustodyError> for StakeError {
    fn from(value: CustodyError) -> Self {
        StakeError::TransferFailed {
            reason: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_taxonomy() {
        let m = MachineId::new("m1").unwrap();
        assert_eq!(StakeError::AlreadyStaked(m.clone()).code(), "ALREADY_STAKED");
        assert_eq!(StakeError::NotStaked(m.clone()).code(), "NOT_STAKED");
        assert_eq!(
            StakeError::InsufficientStake {
                machine_id: m,
                required: 9000,
                offered: 8999,
            }
            .code(),
            "INSUFFICIENT_STAKE"
        );
    }

    #[test]
    fn custody_error_maps_to_transfer_failed() {
        let err: StakeError = CustodyError::InsufficientAllowance {
            allowance: 0,
            requested: 1,
        }
        .into();
        assert_eq!(err.code(), "TRANSFER_FAILED");
        assert!(err.to_string().contains("allowance 0"));
    }

    #[test]
    fn insufficient_stake_display() {
        let err = StakeError::InsufficientStake {
            machine_id: MachineId::new("m2").unwrap(),
            required: 9000,
            offered: 100,
        };
        let s = err.to_string();
        assert!(s.contains("m2"));
        assert!(s.contains("9000"));
        assert!(s.contains("100"));
    }
}
