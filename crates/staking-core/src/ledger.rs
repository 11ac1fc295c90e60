use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::error::StakeError;
use crate::journal::{JournalEntry, LedgerEvent, LedgerJournal};
use crate::policy::{FixedPenalty, ReporterRoster, SlashPolicy};
use crate::ports::{IdentityVerifier, ProjectRegistry, TokenCustody};
use crate::state::{LedgerSnapshot, LedgerState};
use crate::types::{
    Amount, MachineId, MachineRecord, MachineState, SlashReceipt, StakePath, StakeReceipt,
    StakeRequest, StakeholderId,
};

/// How a stake request will be settled, decided before any transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StakePlan {
    pub path: StakePath,
    /// Amount pulled through custody.
    pub transfer: Amount,
    /// Outstanding slash extinguished by the transfer.
    pub debt_settled: Amount,
    /// Amount added to the caller's reserve.
    pub credit: Amount,
}

/// Decide the registration path for `amount` against the current record.
///
/// Exhaustive over `(staked, outstanding_slash)`:
/// staked machines are rejected, indebted machines must cover their debt,
/// everything else registers, for free when `amount` is zero.
pub fn plan_stake(
    record: Option<&MachineRecord>,
    machine_id: &MachineId,
    amount: Amount,
) -> Result<StakePlan, StakeError> {
    match record {
        Some(record) if record.staked => Err(StakeError::AlreadyStaked(machine_id.clone())),
        Some(record) if record.outstanding_slash > 0 => {
            let debt = record.outstanding_slash;
            if amount < debt {
                return Err(StakeError::InsufficientStake {
                    machine_id: machine_id.clone(),
                    required: debt,
                    offered: amount,
                });
            }
            Ok(StakePlan {
                path: StakePath::DebtSettled,
                transfer: amount,
                debt_settled: debt,
                credit: amount - debt,
            })
        }
        _ if amount == 0 => Ok(StakePlan {
            path: StakePath::FreeRegistration,
            transfer: 0,
            debt_settled: 0,
            credit: 0,
        }),
        _ => Ok(StakePlan {
            path: StakePath::Funded,
            transfer: amount,
            debt_settled: 0,
            credit: amount,
        }),
    }
}

/// The stake-and-slash reservation ledger.
///
/// Owns the stakeholder-reserve and machine-record tables and the journal.
/// All collaborators are injected through [`LedgerBuilder`].
pub struct ReservationLedger {
    state: Arc<LedgerState>,
    custody: Arc<dyn TokenCustody>,
    verifier: Arc<dyn IdentityVerifier>,
    registry: Arc<dyn ProjectRegistry>,
    slash_policy: Arc<dyn SlashPolicy>,
    roster: ReporterRoster,
    min_stake: Amount,
    journal: Mutex<LedgerJournal>,
}

impl ReservationLedger {
    /// Start initializing a ledger owned by `owner`.
    pub fn builder(owner: StakeholderId) -> LedgerBuilder {
        LedgerBuilder::new(owner)
    }

    /// Register or re-register a machine against the caller's reserve.
    pub async fn stake(
        &self,
        caller: &StakeholderId,
        request: StakeRequest,
    ) -> Result<StakeReceipt, StakeError> {
        let StakeRequest {
            proof,
            machine_id,
            reserve_amount,
        } = request;

        if !self
            .verifier
            .verify(&proof, caller, &machine_id, reserve_amount)
            .await
        {
            warn!(machine_id = %machine_id, caller = %caller, "Stake rejected: identity check failed");
            return Err(StakeError::Unauthenticated(machine_id));
        }
        if !self.registry.is_eligible(&machine_id).await {
            warn!(machine_id = %machine_id, caller = %caller, "Stake rejected: machine not eligible");
            return Err(StakeError::Ineligible(machine_id));
        }

        let _shared = self.state.shared().await;
        let outcome = self.commit_stake(caller, machine_id.clone(), reserve_amount).await;
        if outcome.is_err() {
            // Slots created for a rejected first-time stake must not linger.
            self.state.release_machine_slot(&machine_id);
            self.state.release_reserve_slot(caller);
        }
        outcome
    }

    /// Dispatch and commit under the machine and caller locks.
    ///
    /// Both lock handles are dropped on return, so the caller can release
    /// empty slots afterwards.
    async fn commit_stake(
        &self,
        caller: &StakeholderId,
        machine_id: MachineId,
        reserve_amount: Amount,
    ) -> Result<StakeReceipt, StakeError> {
        let machine_slot = self.state.machine_slot(&machine_id);
        let mut record = machine_slot.lock().await;

        let plan = plan_stake(record.as_ref(), &machine_id, reserve_amount).inspect_err(|err| {
            warn!(machine_id = %machine_id, caller = %caller, code = err.code(), "Stake rejected");
        })?;
        debug!(machine_id = %machine_id, path = ?plan.path, transfer = %plan.transfer, "Stake planned");

        let reserve_slot = self.state.reserve_slot(caller);
        let mut reserve = reserve_slot.lock().await;
        let new_balance = reserve.checked_add(plan.credit).ok_or(StakeError::Overflow)?;

        if plan.transfer > 0 {
            self.custody
                .transfer_in(caller, plan.transfer)
                .await
                .map_err(|err| {
                    warn!(
                        machine_id = %machine_id,
                        caller = %caller,
                        amount = %plan.transfer,
                        error = %err,
                        "Stake rejected: custody transfer failed"
                    );
                    StakeError::from(err)
                })?;
        }

        *reserve = new_balance;
        *record = Some(MachineRecord {
            machine_id: machine_id.clone(),
            owner: caller.clone(),
            staked: true,
            outstanding_slash: 0,
        });

        self.journal.lock().await.append(LedgerEvent::Staked {
            machine_id: machine_id.clone(),
            stakeholder: caller.clone(),
            path: plan.path,
            transferred: plan.transfer,
            debt_settled: plan.debt_settled,
            credited: plan.credit,
        });

        info!(
            machine_id = %machine_id,
            stakeholder = %caller,
            path = ?plan.path,
            debt_settled = %plan.debt_settled,
            credited = %plan.credit,
            reserved_balance = %new_balance,
            "Stake committed"
        );

        Ok(StakeReceipt {
            machine_id,
            stakeholder: caller.clone(),
            path: plan.path,
            transferred: plan.transfer,
            debt_settled: plan.debt_settled,
            credited: plan.credit,
            reserved_balance: new_balance,
        })
    }

    /// Slash a staked machine using the configured slash policy.
    pub async fn report_timeout(
        &self,
        reporter: &StakeholderId,
        machine_id: &MachineId,
    ) -> Result<SlashReceipt, StakeError> {
        let policy = Arc::clone(&self.slash_policy);
        self.apply_slash(reporter, machine_id, move |record, reserve| {
            policy.penalty_for(record, reserve)
        })
        .await
    }

    /// Slash a staked machine with an explicit penalty.
    pub async fn report_timeout_with_penalty(
        &self,
        reporter: &StakeholderId,
        machine_id: &MachineId,
        penalty: Amount,
    ) -> Result<SlashReceipt, StakeError> {
        self.apply_slash(reporter, machine_id, move |_, _| penalty)
            .await
    }

    async fn apply_slash<F>(
        &self,
        reporter: &StakeholderId,
        machine_id: &MachineId,
        resolve_penalty: F,
    ) -> Result<SlashReceipt, StakeError>
    where
        F: FnOnce(&MachineRecord, Amount) -> Amount + Send,
    {
        if !self.roster.may_report(reporter) {
            warn!(machine_id = %machine_id, reporter = %reporter, "Timeout report rejected: unauthorized");
            return Err(StakeError::unauthorized(reporter, "report timeouts"));
        }

        let _shared = self.state.shared().await;
        let slot = self
            .state
            .existing_machine_slot(machine_id)
            .ok_or_else(|| StakeError::NotStaked(machine_id.clone()))?;
        let mut guard = slot.lock().await;
        let record = match guard.as_mut() {
            Some(record) if record.staked => record,
            _ => {
                warn!(machine_id = %machine_id, reporter = %reporter, "Timeout report rejected: not staked");
                return Err(StakeError::NotStaked(machine_id.clone()));
            }
        };

        let owner = record.owner.clone();
        let reserve_slot = self.state.reserve_slot(&owner);
        let mut reserve = reserve_slot.lock().await;

        let penalty = resolve_penalty(&*record, *reserve);
        let seized = penalty.min(*reserve);
        let outstanding_slash = penalty - seized;

        *reserve -= seized;
        record.outstanding_slash = outstanding_slash;
        record.staked = false;
        let reserved_balance = *reserve;

        self.journal.lock().await.append(LedgerEvent::Slashed {
            machine_id: machine_id.clone(),
            owner: owner.clone(),
            reporter: reporter.clone(),
            penalty,
            seized,
            outstanding_slash,
        });

        info!(
            machine_id = %machine_id,
            owner = %owner,
            reporter = %reporter,
            penalty = %penalty,
            seized = %seized,
            outstanding_slash = %outstanding_slash,
            "Machine slashed"
        );

        Ok(SlashReceipt {
            machine_id: machine_id.clone(),
            owner,
            reporter: reporter.clone(),
            penalty,
            seized,
            outstanding_slash,
            reserved_balance,
        })
    }

    // --- administration ---

    /// Allow `monitor` to report timeouts. Owner only.
    pub async fn grant_reporter(
        &self,
        admin: &StakeholderId,
        monitor: StakeholderId,
    ) -> Result<bool, StakeError> {
        if !self.roster.is_owner(admin) {
            return Err(StakeError::unauthorized(admin, "grant reporters"));
        }
        let added = self.roster.grant(monitor.clone());
        if added {
            info!(monitor = %monitor, "Reporter granted");
            self.journal
                .lock()
                .await
                .append(LedgerEvent::ReporterGranted { monitor });
        }
        Ok(added)
    }

    /// Withdraw reporting rights from `monitor`. Owner only.
    pub async fn revoke_reporter(
        &self,
        admin: &StakeholderId,
        monitor: &StakeholderId,
    ) -> Result<bool, StakeError> {
        if !self.roster.is_owner(admin) {
            return Err(StakeError::unauthorized(admin, "revoke reporters"));
        }
        let removed = self.roster.revoke(monitor);
        if removed {
            info!(monitor = %monitor, "Reporter revoked");
            self.journal.lock().await.append(LedgerEvent::ReporterRevoked {
                monitor: monitor.clone(),
            });
        }
        Ok(removed)
    }

    // --- read accessors ---

    pub async fn reserved_balance(&self, stakeholder: &StakeholderId) -> Amount {
        self.state.reserved_balance(stakeholder).await
    }

    pub async fn outstanding_slash(&self, machine_id: &MachineId) -> Amount {
        self.state
            .machine(machine_id)
            .await
            .map(|record| record.outstanding_slash)
            .unwrap_or(0)
    }

    pub async fn is_staked(&self, machine_id: &MachineId) -> bool {
        self.state
            .machine(machine_id)
            .await
            .map(|record| record.staked)
            .unwrap_or(false)
    }

    pub async fn machine_owner(&self, machine_id: &MachineId) -> Option<StakeholderId> {
        self.state
            .machine(machine_id)
            .await
            .map(|record| record.owner)
    }

    pub async fn machine(&self, machine_id: &MachineId) -> Option<MachineRecord> {
        self.state.machine(machine_id).await
    }

    pub async fn machine_state(&self, machine_id: &MachineId) -> MachineState {
        self.state
            .machine(machine_id)
            .await
            .map(|record| record.state())
            .unwrap_or(MachineState::Unregistered)
    }

    pub fn owner(&self) -> &StakeholderId {
        self.roster.owner()
    }

    /// Configured minimum stake. Published for policy collaborators only.
    pub fn min_stake(&self) -> Amount {
        self.min_stake
    }

    pub fn is_reporter(&self, stakeholder: &StakeholderId) -> bool {
        self.roster.may_report(stakeholder)
    }

    pub fn monitors(&self) -> Vec<StakeholderId> {
        self.roster.monitors()
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.state.snapshot().await
    }

    pub async fn journal(&self) -> Vec<JournalEntry> {
        self.journal.lock().await.entries().to_vec()
    }

    pub async fn verify_journal(&self) -> bool {
        self.journal.lock().await.verify_chain()
    }
}

/// One-shot initializer binding the ledger's owner, ports and parameters.
pub struct LedgerBuilder {
    owner: StakeholderId,
    custody: Option<Arc<dyn TokenCustody>>,
    verifier: Option<Arc<dyn IdentityVerifier>>,
    registry: Option<Arc<dyn ProjectRegistry>>,
    slash_policy: Option<Arc<dyn SlashPolicy>>,
    min_stake: Amount,
    reporters: Vec<StakeholderId>,
    state: Option<Arc<LedgerState>>,
}

impl LedgerBuilder {
    pub fn new(owner: StakeholderId) -> Self {
        Self {
            owner,
            custody: None,
            verifier: None,
            registry: None,
            slash_policy: None,
            min_stake: 0,
            reporters: Vec::new(),
            state: None,
        }
    }

    /// Seed owner, min-stake, fixed penalty and monitors from configuration.
    pub fn from_config(config: &LedgerConfig) -> Result<Self, StakeError> {
        let mut builder = Self::new(config.owner_id()?)
            .min_stake(config.min_stake)
            .slash_policy(Arc::new(FixedPenalty(config.slash_penalty)));
        builder.reporters = config.reporter_ids()?;
        Ok(builder)
    }

    pub fn custody(mut self, custody: Arc<dyn TokenCustody>) -> Self {
        self.custody = Some(custody);
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn IdentityVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn ProjectRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn slash_policy(mut self, policy: Arc<dyn SlashPolicy>) -> Self {
        self.slash_policy = Some(policy);
        self
    }

    pub fn min_stake(mut self, min_stake: Amount) -> Self {
        self.min_stake = min_stake;
        self
    }

    pub fn reporter(mut self, monitor: StakeholderId) -> Self {
        self.reporters.push(monitor);
        self
    }

    /// Use pre-populated tables instead of an empty state.
    pub fn state(mut self, state: Arc<LedgerState>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn build(self) -> Result<ReservationLedger, StakeError> {
        let custody = self
            .custody
            .ok_or_else(|| StakeError::Initialization("token custody port not bound".into()))?;
        let verifier = self
            .verifier
            .ok_or_else(|| StakeError::Initialization("identity verifier not bound".into()))?;
        let registry = self
            .registry
            .ok_or_else(|| StakeError::Initialization("project registry not bound".into()))?;
        let slash_policy = self
            .slash_policy
            .unwrap_or_else(|| Arc::new(FixedPenalty(0)));

        let roster = ReporterRoster::new(self.owner);
        for monitor in self.reporters {
            roster.grant(monitor);
        }

        info!(
            owner = %roster.owner(),
            min_stake = %self.min_stake,
            monitors = roster.monitors().len(),
            "Reservation ledger initialized"
        );

        Ok(ReservationLedger {
            state: self.state.unwrap_or_default(),
            custody,
            verifier,
            registry,
            slash_policy,
            roster,
            min_stake: self.min_stake,
            journal: Mutex::new(LedgerJournal::new()),
        })
    }
}
