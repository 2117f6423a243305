//! Hexagonal ports for the storage collaborator.
//!
//! The Mongo adapter implements these; tests use an in-memory store.

use async_trait::async_trait;

use crate::{
    model::{
        AccessKey, Account, BlockState, DecoratedKey, SecurityLogEntry, StatsSnapshot,
        SubscriptionStatus,
    },
    Result,
};

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>>;

    /// Write every block-state field plus `force_close` in one atomic update.
    ///
    /// Returns whether an account matched `username`.
    async fn set_block_state(
        &self,
        username: &str,
        state: &BlockState,
        force_close: bool,
    ) -> Result<bool>;

    /// Reset the block state to cleared and `force_close` to false in one atomic update.
    async fn clear_block_state(&self, username: &str) -> Result<bool>;

    async fn list_by_subscription(&self, status: SubscriptionStatus) -> Result<Vec<Account>>;

    /// Every account, newest `created_at` first.
    async fn list_all(&self) -> Result<Vec<Account>>;
}

#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Insert a new key. A duplicate `key` fails with `Error::Conflict`.
    async fn insert(&self, key: &AccessKey) -> Result<()>;

    async fn find(&self, key: &str) -> Result<Option<AccessKey>>;

    /// Atomically flip `used` from false to true. `None` when no unused key matched.
    async fn mark_used(&self, key: &str) -> Result<Option<AccessKey>>;

    async fn delete(&self, key: &str) -> Result<bool>;

    /// Newest keys joined with the account referencing each one, in a single query.
    async fn list_recent_with_usage(&self, limit: usize) -> Result<Vec<DecoratedKey>>;

    /// Every key, newest first.
    async fn list_all(&self) -> Result<Vec<AccessKey>>;
}

#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn load(&self) -> Result<Option<StatsSnapshot>>;

    /// Create-or-replace the single snapshot document.
    async fn upsert(&self, snapshot: &StatsSnapshot) -> Result<()>;
}

#[async_trait]
pub trait SecurityLogStore: Send + Sync {
    async fn append(&self, entry: &SecurityLogEntry) -> Result<()>;

    /// Newest entries first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<SecurityLogEntry>>;
}

/// Everything the console needs from the document store.
#[async_trait]
pub trait Storage:
    AccountStore + KeyStore + StatsStore + SecurityLogStore + Send + Sync + 'static
{
    async fn ping(&self) -> Result<()>;
}
