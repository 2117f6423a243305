use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    block::{evaluate, BlockVerdict},
    duration::{resolve, BlockType},
    model::{Account, BlockState, SubscriptionStatus},
    ports::AccountStore,
    Result,
};

/// Outcome of a block request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockApplied {
    pub block_type: BlockType,
    pub blocked_until: Option<DateTime<Utc>>,
    pub reason: String,
}

/// Account operations on top of the storage collaborator.
///
/// No retries happen here; storage failures propagate as `Error::Repository`.
#[derive(Clone)]
pub struct AccountRepository {
    store: Arc<dyn AccountStore>,
}

impl AccountRepository {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        self.store.find_by_username(username).await
    }

    /// Block `username` for `duration_code` starting at `now`.
    ///
    /// `Ok(None)` when no account matched. An invalid code fails before touching storage.
    pub async fn block(
        &self,
        username: &str,
        duration_code: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BlockApplied>> {
        let resolved = resolve(duration_code, now)?;
        let state = BlockState {
            is_blocked: true,
            reason: Some(reason.to_string()),
            blocked_at: Some(now),
            blocked_until: resolved.blocked_until,
            block_type: Some(resolved.block_type),
        };

        if !self.store.set_block_state(username, &state, true).await? {
            return Ok(None);
        }

        tracing::info!(
            username,
            block_type = resolved.block_type.code(),
            "account blocked"
        );
        Ok(Some(BlockApplied {
            block_type: resolved.block_type,
            blocked_until: resolved.blocked_until,
            reason: reason.to_string(),
        }))
    }

    /// Clear any block on `username`. Unblocking an unblocked account succeeds.
    ///
    /// Returns false only when no account matched.
    pub async fn unblock(&self, username: &str) -> Result<bool> {
        let applied = self.store.clear_block_state(username).await?;
        if applied {
            tracing::info!(username, "account unblocked");
        }
        Ok(applied)
    }

    /// Evaluate the account's block state and persist the clear when it has lapsed.
    pub async fn check_block(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BlockVerdict>> {
        let Some(account) = self.store.find_by_username(username).await? else {
            return Ok(None);
        };
        let verdict = evaluate(&account.block_state, now);
        self.persist_clear_if_needed(&account.username, &verdict)
            .await?;
        Ok(Some(verdict))
    }

    /// The explicit write half of block evaluation.
    ///
    /// Returns whether a clear was written.
    pub async fn persist_clear_if_needed(
        &self,
        username: &str,
        verdict: &BlockVerdict,
    ) -> Result<bool> {
        if !verdict.needs_clear() {
            return Ok(false);
        }
        tracing::info!(username, "clearing lapsed block");
        self.store.clear_block_state(username).await
    }

    /// Accounts with an active subscription and no enforceable block.
    ///
    /// Lapsed blocks found along the way are cleared.
    pub async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Account>> {
        let subscribed = self
            .store
            .list_by_subscription(SubscriptionStatus::Active)
            .await?;

        let mut active = Vec::with_capacity(subscribed.len());
        for mut account in subscribed {
            let verdict = evaluate(&account.block_state, now);
            if verdict.is_blocked() {
                continue;
            }
            if self
                .persist_clear_if_needed(&account.username, &verdict)
                .await?
            {
                account.block_state = BlockState::cleared();
                account.force_close = false;
            }
            active.push(account);
        }
        Ok(active)
    }

    /// Every account, newest first.
    pub async fn list_all(&self) -> Result<Vec<Account>> {
        self.store.list_all().await
    }
}
