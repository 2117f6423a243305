//! In-memory fakes for the storage and messaging ports.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{port::MessagingPort, types::MessagingCapabilities},
    model::{
        AccessKey, Account, BlockState, DecoratedKey, KeyUsage, SecurityLogEntry, StatsSnapshot,
        SubscriptionStatus,
    },
    ports::{AccountStore, KeyStore, SecurityLogStore, StatsStore, Storage},
    Result,
};

#[derive(Default)]
pub struct MemoryStore {
    accounts: Mutex<Vec<Account>>,
    keys: Mutex<Vec<AccessKey>>,
    stats: Mutex<Option<StatsSnapshot>>,
    security: Mutex<Vec<SecurityLogEntry>>,
    account_calls: AtomicUsize,
    account_writes: AtomicUsize,
    stats_upserts: AtomicUsize,
    duplicate_next_key: AtomicBool,
    failing: AtomicBool,
    panicking: AtomicBool,
}

impl MemoryStore {
    pub fn insert_account(&self, account: Account) {
        self.accounts.lock().unwrap().push(account);
    }

    pub fn account(&self, username: &str) -> Option<Account> {
        self.accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.username == username)
            .cloned()
    }

    pub fn key(&self, key: &str) -> Option<AccessKey> {
        self.keys.lock().unwrap().iter().find(|k| k.key == key).cloned()
    }

    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.stats.lock().unwrap().clone()
    }

    pub fn security_entries(&self) -> Vec<SecurityLogEntry> {
        self.security.lock().unwrap().clone()
    }

    /// Every AccountStore call, reads included.
    pub fn account_calls(&self) -> usize {
        self.account_calls.load(Ordering::SeqCst)
    }

    pub fn account_writes(&self) -> usize {
        self.account_writes.load(Ordering::SeqCst)
    }

    pub fn stats_upserts(&self) -> usize {
        self.stats_upserts.load(Ordering::SeqCst)
    }

    pub fn fail_next_key_insert_as_duplicate(&self) {
        self.duplicate_next_key.store(true, Ordering::SeqCst);
    }

    /// Make every account and key operation fail with `Error::Repository`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every account and key operation panic.
    pub fn set_panicking(&self, panicking: bool) {
        self.panicking.store(panicking, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.panicking.load(Ordering::SeqCst) {
            panic!("corrupt document in users");
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Repository("connection refused".to_string()));
        }
        Ok(())
    }

    fn touch_accounts(&self) -> Result<()> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        self.check()
    }

    fn update_account(&self, username: &str, f: impl FnOnce(&mut Account)) -> bool {
        let mut accounts = self.accounts.lock().unwrap();
        match accounts.iter_mut().find(|a| a.username == username) {
            Some(a) => {
                f(a);
                self.account_writes.fetch_add(1, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        self.touch_accounts()?;
        Ok(self.account(username))
    }

    async fn set_block_state(
        &self,
        username: &str,
        state: &BlockState,
        force_close: bool,
    ) -> Result<bool> {
        self.touch_accounts()?;
        Ok(self.update_account(username, |a| {
            a.block_state = state.clone();
            a.force_close = force_close;
        }))
    }

    async fn clear_block_state(&self, username: &str) -> Result<bool> {
        self.touch_accounts()?;
        Ok(self.update_account(username, |a| {
            a.block_state = BlockState::cleared();
            a.force_close = false;
        }))
    }

    async fn list_by_subscription(&self, status: SubscriptionStatus) -> Result<Vec<Account>> {
        self.touch_accounts()?;
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.subscription.status == status)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Account>> {
        self.touch_accounts()?;
        let mut all = self.accounts.lock().unwrap().clone();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn insert(&self, key: &AccessKey) -> Result<()> {
        self.check()?;
        let mut keys = self.keys.lock().unwrap();
        if self.duplicate_next_key.swap(false, Ordering::SeqCst)
            || keys.iter().any(|k| k.key == key.key)
        {
            return Err(Error::Conflict("key already exists".to_string()));
        }
        keys.push(key.clone());
        Ok(())
    }

    async fn find(&self, key: &str) -> Result<Option<AccessKey>> {
        self.check()?;
        Ok(self.key(key))
    }

    async fn mark_used(&self, key: &str) -> Result<Option<AccessKey>> {
        self.check()?;
        let mut keys = self.keys.lock().unwrap();
        Ok(keys
            .iter_mut()
            .find(|k| k.key == key && !k.used)
            .map(|k| {
                k.used = true;
                k.clone()
            }))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check()?;
        let mut keys = self.keys.lock().unwrap();
        let before = keys.len();
        keys.retain(|k| k.key != key);
        Ok(keys.len() != before)
    }

    async fn list_recent_with_usage(&self, limit: usize) -> Result<Vec<DecoratedKey>> {
        let all = KeyStore::list_all(self).await?;
        let accounts = self.accounts.lock().unwrap();
        Ok(all
            .into_iter()
            .take(limit)
            .map(|key| {
                let usage = accounts
                    .iter()
                    .find(|a| a.access_key.as_deref() == Some(key.key.as_str()))
                    .map(|a| KeyUsage::UsedBy(a.username.clone()))
                    .unwrap_or(KeyUsage::Available);
                DecoratedKey { key, usage }
            })
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<AccessKey>> {
        self.check()?;
        let mut all = self.keys.lock().unwrap().clone();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}

#[async_trait]
impl StatsStore for MemoryStore {
    async fn load(&self) -> Result<Option<StatsSnapshot>> {
        Ok(self.stats())
    }

    async fn upsert(&self, snapshot: &StatsSnapshot) -> Result<()> {
        self.stats_upserts.fetch_add(1, Ordering::SeqCst);
        *self.stats.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    }
}

#[async_trait]
impl SecurityLogStore for MemoryStore {
    async fn append(&self, entry: &SecurityLogEntry) -> Result<()> {
        self.security.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<SecurityLogEntry>> {
        let mut all = self.security_entries();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        all.truncate(limit);
        Ok(all)
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.check()
    }
}

#[derive(Default)]
pub struct FakeMessenger {
    sent: Mutex<Vec<(ChatId, String)>>,
    failing: AtomicBool,
    max_len: Option<usize>,
}

impl FakeMessenger {
    /// A transport that accepts at most `max_len` bytes per message.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, t)| t).collect()
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| *c == chat_id)
            .map(|(_, t)| t)
            .collect()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: self.max_len.unwrap_or(4096),
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Transport("chat not found".to_string()));
        }
        if self.max_len.is_some_and(|max| html.len() > max) {
            return Err(Error::Transport("message is too long".to_string()));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((chat_id, html.to_string()));
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(sent.len() as i32),
        })
    }
}
