//! Credit ledger: the authoritative store of spendable balances.
//!
//! Accounts are mutated through exactly one operation, [`Ledger::reserve`].
//! The critical section is the map entry's exclusive guard and contains
//! only the read-check-decrement sequence; queueing, collector execution,
//! and notification all happen outside it.

use dashmap::DashMap;

use argus_model::AccountId;

/// One credit account. Balance is a `u64`: it cannot go negative by
/// construction, and `reserve` refuses to underflow it.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    pub credits: u64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("account not found")]
    UnknownAccount,

    #[error("account is inactive")]
    AccountInactive,

    #[error("insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: u64, available: u64 },
}

#[derive(Debug, Default)]
pub struct Ledger {
    accounts: DashMap<AccountId, Account>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an account with an initial balance. Startup seeding only;
    /// there is no top-up path in this layer.
    pub fn open_account(&self, id: AccountId, credits: u64, active: bool) {
        self.accounts.insert(id, Account { id, credits, active });
    }

    /// Read-only snapshot, used by the credits endpoint.
    pub fn account(&self, id: &AccountId) -> Option<Account> {
        self.accounts.get(id).map(|a| a.clone())
    }

    /// Atomically spend `cost` credits from the account.
    ///
    /// Holds the account's exclusive guard for the read-check-decrement
    /// only and touches no other state. An inactive account is refused
    /// regardless of balance; an insufficient balance is reported with
    /// both amounts for caller display.
    pub fn reserve(
        &self,
        id: &AccountId,
        cost: u64,
    ) -> Result<u64, LedgerError> {
        let mut account =
            self.accounts.get_mut(id).ok_or(LedgerError::UnknownAccount)?;

        if !account.active {
            return Err(LedgerError::AccountInactive);
        }

        if account.credits < cost {
            return Err(LedgerError::InsufficientCredits {
                required: cost,
                available: account.credits,
            });
        }

        account.credits -= cost;
        Ok(account.credits)
    }
}
