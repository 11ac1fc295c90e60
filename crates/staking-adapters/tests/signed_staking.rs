//! End-to-end staking flow over the in-memory custody and Ed25519 identity.

use std::sync::Arc;

use ed25519_dalek::SigningKey;
use staking_adapters::{
    sign_stake_request, Ed25519IdentityVerifier, InMemoryProjectRegistry, InMemoryTokenCustody,
    RejectingCustody,
};
use staking_core::{
    FixedPenalty, LedgerConfig, LedgerBuilder, MachineId, MachineState, ReservationLedger,
    StakePath, TOKEN_UNIT,
};

fn mid(s: &str) -> MachineId {
    MachineId::new(s).unwrap()
}

#[tokio::test]
async fn slash_shortfall_is_settled_by_next_stake() {
    let custody = Arc::new(InMemoryTokenCustody::new());
    let key = SigningKey::from_bytes(&[11u8; 32]);
    let (holder, _) = sign_stake_request(&key, mid("m2"), 0, 0);

    let ledger = ReservationLedger::builder(holder.clone())
        .custody(custody.clone())
        .verifier(Arc::new(Ed25519IdentityVerifier::new()))
        .registry(Arc::new(InMemoryProjectRegistry::open()))
        .slash_policy(Arc::new(FixedPenalty(10_000 * TOKEN_UNIT)))
        .min_stake(10 * TOKEN_UNIT)
        .build()
        .unwrap();

    custody.mint(&holder, 100_000 * TOKEN_UNIT).await.unwrap();
    custody.approve(&holder, 1_000 * TOKEN_UNIT).await;

    let (caller, request) = sign_stake_request(&key, mid("m2"), 1_000 * TOKEN_UNIT, 1);
    let receipt = ledger.stake(&caller, request).await.unwrap();
    assert_eq!(receipt.path, StakePath::Funded);
    assert_eq!(custody.pool_balance().await, 1_000 * TOKEN_UNIT);

    let slash = ledger.report_timeout(&holder, &mid("m2")).await.unwrap();
    assert_eq!(slash.seized, 1_000 * TOKEN_UNIT);
    assert_eq!(slash.outstanding_slash, 9_000 * TOKEN_UNIT);
    assert_eq!(
        ledger.machine_state(&mid("m2")).await,
        MachineState::Slashed {
            outstanding: 9_000 * TOKEN_UNIT
        }
    );

    custody.approve(&holder, 10_000 * TOKEN_UNIT).await;
    let (_, short) = sign_stake_request(&key, mid("m2"), 8_999 * TOKEN_UNIT, 2);
    let err = ledger.stake(&caller, short).await.unwrap_err();
    assert_eq!(err.code(), "INSUFFICIENT_STAKE");
    assert_eq!(custody.allowance(&holder).await, 10_000 * TOKEN_UNIT);

    let (_, settle) = sign_stake_request(&key, mid("m2"), 10_000 * TOKEN_UNIT, 3);
    let receipt = ledger.stake(&caller, settle).await.unwrap();
    assert_eq!(receipt.path, StakePath::DebtSettled);
    assert_eq!(ledger.reserved_balance(&holder).await, 1_000 * TOKEN_UNIT);
    assert_eq!(ledger.outstanding_slash(&mid("m2")).await, 0);
    assert_eq!(custody.pool_balance().await, 11_000 * TOKEN_UNIT);
    assert_eq!(custody.balance_of(&holder).await, 89_000 * TOKEN_UNIT);
}

#[tokio::test]
async fn forged_proof_is_unauthenticated() {
    let custody = Arc::new(InMemoryTokenCustody::new());
    let ledger = ReservationLedger::builder(staking_core::StakeholderId::new("owner").unwrap())
        .custody(custody)
        .verifier(Arc::new(Ed25519IdentityVerifier::new()))
        .registry(Arc::new(InMemoryProjectRegistry::open()))
        .build()
        .unwrap();

    let (_, request) = sign_stake_request(&SigningKey::from_bytes(&[1u8; 32]), mid("m1"), 0, 1);
    let (impostor, _) = sign_stake_request(&SigningKey::from_bytes(&[2u8; 32]), mid("m1"), 0, 1);
    let err = ledger.stake(&impostor, request).await.unwrap_err();
    assert_eq!(err.code(), "UNAUTHENTICATED");
    assert!(ledger.machine(&mid("m1")).await.is_none());
}

#[tokio::test]
async fn ineligible_machines_are_refused() {
    let ledger = ReservationLedger::builder(staking_core::StakeholderId::new("owner").unwrap())
        .custody(Arc::new(InMemoryTokenCustody::new()))
        .verifier(Arc::new(Ed25519IdentityVerifier::new()))
        .registry(Arc::new(InMemoryProjectRegistry::allow_list([mid("listed")])))
        .build()
        .unwrap();
    let key = SigningKey::from_bytes(&[3u8; 32]);

    let (caller, request) = sign_stake_request(&key, mid("unlisted"), 0, 1);
    assert_eq!(
        ledger.stake(&caller, request).await.unwrap_err().code(),
        "INELIGIBLE"
    );
    let (caller, request) = sign_stake_request(&key, mid("listed"), 0, 2);
    assert!(ledger.stake(&caller, request).await.is_ok());
}

#[tokio::test]
async fn rejecting_custody_blocks_funded_stakes_only() {
    let config = LedgerConfig::default();
    let ledger = LedgerBuilder::from_config(&config)
        .unwrap()
        .custody(Arc::new(RejectingCustody::new("offline")))
        .verifier(Arc::new(Ed25519IdentityVerifier::new()))
        .registry(Arc::new(InMemoryProjectRegistry::open()))
        .build()
        .unwrap();
    assert_eq!(ledger.min_stake(), 10 * TOKEN_UNIT);
    let key = SigningKey::from_bytes(&[4u8; 32]);

    let (caller, funded) = sign_stake_request(&key, mid("m1"), TOKEN_UNIT, 1);
    assert_eq!(
        ledger.stake(&caller, funded).await.unwrap_err().code(),
        "TRANSFER_FAILED"
    );
    let (caller, free) = sign_stake_request(&key, mid("m1"), 0, 2);
    assert_eq!(
        ledger.stake(&caller, free).await.unwrap().path,
        StakePath::FreeRegistration
    );
}

#[tokio::test]
async fn signed_amount_cannot_be_changed_or_replayed() {
    let custody = Arc::new(InMemoryTokenCustody::new());
    let ledger = ReservationLedger::builder(staking_core::StakeholderId::new("owner").unwrap())
        .custody(custody.clone())
        .verifier(Arc::new(Ed25519IdentityVerifier::new()))
        .registry(Arc::new(InMemoryProjectRegistry::open()))
        .build()
        .unwrap();
    let key = SigningKey::from_bytes(&[5u8; 32]);

    let (caller, request) = sign_stake_request(&key, mid("m1"), TOKEN_UNIT, 1);
    custody.mint(&caller, 1_000 * TOKEN_UNIT).await.unwrap();
    custody.approve(&caller, 1_000 * TOKEN_UNIT).await;

    let mut inflated = request.clone();
    inflated.reserve_amount = 900 * TOKEN_UNIT;
    let err = ledger.stake(&caller, inflated).await.unwrap_err();
    assert_eq!(err.code(), "UNAUTHENTICATED");
    assert!(ledger.machine(&mid("m1")).await.is_none());
    assert_eq!(custody.pool_balance().await, 0);

    let mut moved = request.clone();
    moved.machine_id = mid("m2");
    assert_eq!(
        ledger.stake(&caller, moved).await.unwrap_err().code(),
        "UNAUTHENTICATED"
    );

    ledger.stake(&caller, request.clone()).await.unwrap();
    assert_eq!(
        ledger.stake(&caller, request).await.unwrap_err().code(),
        "UNAUTHENTICATED"
    );
    assert_eq!(ledger.reserved_balance(&caller).await, TOKEN_UNIT);
    assert_eq!(custody.pool_balance().await, TOKEN_UNIT);
}
