use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use staking_core::{Amount, CustodyError, StakeholderId, TokenCustody};
use tokio::sync::Mutex;
use tracing::debug;

/// Wallet balance and pool allowance of one account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyAccount {
    pub account: StakeholderId,
    #[serde(with = "staking_core::amount")]
    pub balance: Amount,
    #[serde(with = "staking_core::amount")]
    pub allowance: Amount,
}

#[derive(Debug, Default)]
struct Book {
    balances: HashMap<StakeholderId, Amount>,
    allowances: HashMap<StakeholderId, Amount>,
    pool: Amount,
}

/// Token custody backed by process memory.
///
/// Mirrors an ERC-20 style flow: accounts hold a wallet balance and approve
/// the ledger's pool to pull up to an allowance.
#[derive(Debug, Default)]
pub struct InMemoryTokenCustody {
    book: Mutex<Book>,
}

impl InMemoryTokenCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to a wallet. Returns the new balance.
    pub async fn mint(&self, account: &StakeholderId, amount: Amount) -> Result<Amount, CustodyError> {
        let mut book = self.book.lock().await;
        let balance = book.balances.entry(account.clone()).or_default();
        *balance = balance.checked_add(amount).ok_or(CustodyError::Overflow)?;
        Ok(*balance)
    }

    /// Set the amount the pool may pull from `account`.
    pub async fn approve(&self, account: &StakeholderId, amount: Amount) {
        self.book
            .lock()
            .await
            .allowances
            .insert(account.clone(), amount);
    }

    pub async fn balance_of(&self, account: &StakeholderId) -> Amount {
        let book = self.book.lock().await;
        book.balances.get(account).copied().unwrap_or(0)
    }

    pub async fn allowance(&self, account: &StakeholderId) -> Amount {
        let book = self.book.lock().await;
        book.allowances.get(account).copied().unwrap_or(0)
    }

    pub async fn pool_balance(&self) -> Amount {
        self.book.lock().await.pool
    }

    pub async fn account(&self, account: &StakeholderId) -> CustodyAccount {
        let book = self.book.lock().await;
        CustodyAccount {
            account: account.clone(),
            balance: book.balances.get(account).copied().unwrap_or(0),
            allowance: book.allowances.get(account).copied().unwrap_or(0),
        }
    }
}

#[async_trait]
impl TokenCustody for InMemoryTokenCustody {
    async fn transfer_in(&self, from: &StakeholderId, amount: Amount) -> Result<(), CustodyError> {
        let mut book = self.book.lock().await;

        let allowance = book.allowances.get(from).copied().unwrap_or(0);
        if allowance < amount {
            return Err(CustodyError::InsufficientAllowance {
                allowance,
                requested: amount,
            });
        }
        let balance = book.balances.get(from).copied().unwrap_or(0);
        if balance < amount {
            return Err(CustodyError::InsufficientBalance {
                balance,
                requested: amount,
            });
        }
        let pool = book.pool.checked_add(amount).ok_or(CustodyError::Overflow)?;

        book.allowances.insert(from.clone(), allowance - amount);
        book.balances.insert(from.clone(), balance - amount);
        book.pool = pool;
        debug!(account = %from, amount = %amount, pool = %pool, "Custody pulled into pool");
        Ok(())
    }

    async fn transfer_out(&self, to: &StakeholderId, amount: Amount) -> Result<(), CustodyError> {
        let mut book = self.book.lock().await;
        if book.pool < amount {
            return Err(CustodyError::InsufficientPool {
                available: book.pool,
                requested: amount,
            });
        }
        let balance = book.balances.get(to).copied().unwrap_or(0);
        let balance = balance.checked_add(amount).ok_or(CustodyError::Overflow)?;

        book.pool -= amount;
        book.balances.insert(to.clone(), balance);
        debug!(account = %to, amount = %amount, "Custody paid out of pool");
        Ok(())
    }
}

/// Custody that refuses every transfer.
#[derive(Debug, Clone)]
pub struct RejectingCustody {
    reason: String,
}

impl RejectingCustody {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TokenCustody for RejectingCustody {
    async fn transfer_in(&self, _from: &StakeholderId, _amount: Amount) -> Result<(), CustodyError> {
        Err(CustodyError::Unavailable(self.reason.clone()))
    }

    async fn transfer_out(&self, _to: &StakeholderId, _amount: Amount) -> Result<(), CustodyError> {
        Err(CustodyError::Unavailable(self.reason.clone()))
    }
}
