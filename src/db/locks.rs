//! Per-account exclusive guards.
//!
//! SQLite has no `SELECT ... FOR UPDATE`, so row locking is realized as an
//! in-process registry of per-account async mutexes. Every balance-affecting
//! unit of work acquires the account's guard before opening its transaction;
//! the guard is RAII and releases on drop. This totally orders all
//! balance-affecting operations for one account; operations on different
//! accounts never contend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as RegistryMutex;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::EngineError;

/// How long a worker waits for an account's guard before abandoning the
/// unit of work for this cycle.
const LOCK_WAIT: Duration = Duration::from_secs(5);

/// Held for the duration of one atomic unit; releases the account on drop.
pub struct AccountGuard {
    account_id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl AccountGuard {
    pub fn account_id(&self) -> Uuid {
        self.account_id
    }
}

/// Registry of per-account guards.
pub struct AccountLocks {
    inner: RegistryMutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self {
            inner: RegistryMutex::new(HashMap::new()),
        }
    }

    fn handle(&self, account_id: Uuid) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock();
        map.entry(account_id).or_default().clone()
    }

    /// Acquire the account's exclusive guard, waiting at most [`LOCK_WAIT`].
    /// A timeout surfaces as the transient [`EngineError::LockBusy`]; the
    /// caller abandons the cycle rather than retrying in a loop.
    pub async fn acquire(&self, account_id: Uuid) -> Result<AccountGuard, EngineError> {
        let handle = self.handle(account_id);
        match tokio::time::timeout(LOCK_WAIT, handle.lock_owned()).await {
            Ok(guard) => Ok(AccountGuard {
                account_id,
                _guard: guard,
            }),
            Err(_) => Err(EngineError::LockBusy(account_id)),
        }
    }
}

impl Default for AccountLocks {
    fn default() -> Self {
        Self::new()
    }
}
