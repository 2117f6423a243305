use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, Document},
    error::{ErrorKind, WriteFailure},
    options::{ClientOptions, IndexOptions, ReturnDocument},
    Client, Collection, Database, IndexModel,
};

use cac_core::{
    errors::Error,
    model::{
        AccessKey, Account, BlockState, DecoratedKey, KeyUsage, SecurityLogEntry, StatsSnapshot,
        SubscriptionStatus,
    },
    ports::{AccountStore, KeyStore, SecurityLogStore, StatsStore, Storage},
    Result,
};

use crate::documents::{
    block_state_update, decode_recent_key, recent_keys_pipeline, DbAccount, DbKey, DbSecurityLog,
    DbStats,
};

pub const MONGODB_COLLECTION_USERS: &str = "users";
pub const MONGODB_COLLECTION_KEYS: &str = "keys";
pub const MONGODB_COLLECTION_STATS: &str = "stats";
pub const MONGODB_COLLECTION_SECURITY_LOGS: &str = "securitylogs";

const DEFAULT_DATABASE: &str = "checker";
const MAX_BACKOFF: Duration = Duration::from_millis(8_000);
const DUPLICATE_KEY_CODE: i32 = 11_000;

#[derive(Clone, Debug)]
pub struct MongoSettings {
    pub uri: String,
    /// Overrides the database named in the URI.
    pub database: Option<String>,
    pub connect_attempts: u32,
    pub initial_backoff: Duration,
    pub server_selection_timeout: Duration,
}

/// Delays slept between consecutive connect attempts.
pub fn backoff_schedule(initial: Duration, attempts: u32) -> Vec<Duration> {
    let mut delays = Vec::new();
    let mut d = initial.min(MAX_BACKOFF);
    for _ in 1..attempts {
        delays.push(d);
        d = (d * 2).min(MAX_BACKOFF);
    }
    delays
}

fn map_err(e: mongodb::error::Error) -> Error {
    if let ErrorKind::Write(WriteFailure::WriteError(ref w)) = *e.kind {
        if w.code == DUPLICATE_KEY_CODE {
            return Error::Conflict("a key with that value already exists".to_string());
        }
    }
    Error::Repository(e.to_string())
}

fn map_de(e: bson::de::Error) -> Error {
    Error::Repository(format!("malformed document: {e}"))
}

fn map_ser(e: bson::ser::Error) -> Error {
    Error::Repository(format!("cannot encode document: {e}"))
}

/// Storage collaborator over the checker's MongoDB database.
#[derive(Clone, Debug)]
pub struct MongoStorage {
    db: Database,
}

impl MongoStorage {
    /// Connect and ping, retrying with exponential backoff, then ensure indexes.
    pub async fn connect(settings: &MongoSettings) -> Result<Self> {
        let attempts = settings.connect_attempts.max(1);
        let mut delays = backoff_schedule(settings.initial_backoff, attempts).into_iter();
        let mut attempt = 0;

        let storage = loop {
            attempt += 1;
            match Self::try_connect(settings).await {
                Ok(s) => break s,
                Err(e) => match delays.next() {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            attempts,
                            retry_in_ms = delay.as_millis() as u64,
                            error = %e,
                            "mongodb connect failed"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(attempts, error = %e, "giving up on mongodb");
                        return Err(e);
                    }
                },
            }
        };

        storage.ensure_indexes().await?;
        tracing::info!(database = storage.db.name(), "connected to mongodb");
        Ok(storage)
    }

    async fn try_connect(settings: &MongoSettings) -> Result<Self> {
        let mut options = ClientOptions::parse(&settings.uri).await.map_err(map_err)?;
        options.server_selection_timeout = Some(settings.server_selection_timeout);
        options.app_name = Some("cac".to_string());

        let client = Client::with_options(options).map_err(map_err)?;
        let db = match &settings.database {
            Some(name) => client.database(name),
            None => client
                .default_database()
                .unwrap_or_else(|| client.database(DEFAULT_DATABASE)),
        };

        let storage = Self { db };
        storage.ping().await?;
        Ok(storage)
    }

    async fn ensure_indexes(&self) -> Result<()> {
        let unique_key = IndexModel::builder()
            .keys(doc! { "key": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.keys().create_index(unique_key).await.map_err(map_err)?;

        let username = IndexModel::builder().keys(doc! { "username": 1 }).build();
        self.users().create_index(username).await.map_err(map_err)?;
        Ok(())
    }

    fn users(&self) -> Collection<DbAccount> {
        self.db.collection(MONGODB_COLLECTION_USERS)
    }

    fn keys(&self) -> Collection<DbKey> {
        self.db.collection(MONGODB_COLLECTION_KEYS)
    }

    fn stats(&self) -> Collection<DbStats> {
        self.db.collection(MONGODB_COLLECTION_STATS)
    }

    fn security_logs(&self) -> Collection<DbSecurityLog> {
        self.db.collection(MONGODB_COLLECTION_SECURITY_LOGS)
    }

    async fn find_accounts(&self, filter: Document) -> Result<Vec<Account>> {
        let docs: Vec<DbAccount> = self
            .users()
            .find(filter)
            .sort(doc! { "createdAt": -1 })
            .await
            .map_err(map_err)?
            .try_collect()
            .await
            .map_err(map_err)?;
        Ok(docs.into_iter().map(Account::from).collect())
    }
}

#[async_trait]
impl AccountStore for MongoStorage {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        let found = self
            .users()
            .find_one(doc! { "username": username })
            .await
            .map_err(map_err)?;
        Ok(found.map(Account::from))
    }

    async fn set_block_state(
        &self,
        username: &str,
        state: &BlockState,
        force_close: bool,
    ) -> Result<bool> {
        let res = self
            .users()
            .update_one(
                doc! { "username": username },
                block_state_update(state, force_close),
            )
            .await
            .map_err(map_err)?;
        Ok(res.matched_count > 0)
    }

    async fn clear_block_state(&self, username: &str) -> Result<bool> {
        self.set_block_state(username, &BlockState::cleared(), false)
            .await
    }

    async fn list_by_subscription(&self, status: SubscriptionStatus) -> Result<Vec<Account>> {
        self.find_accounts(doc! { "subscription.status": status.as_str() })
            .await
    }

    async fn list_all(&self) -> Result<Vec<Account>> {
        self.find_accounts(doc! {}).await
    }
}

#[async_trait]
impl KeyStore for MongoStorage {
    async fn insert(&self, key: &AccessKey) -> Result<()> {
        self.keys()
            .insert_one(DbKey::from(key))
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn find(&self, key: &str) -> Result<Option<AccessKey>> {
        let found = self
            .keys()
            .find_one(doc! { "key": key })
            .await
            .map_err(map_err)?;
        Ok(found.map(AccessKey::from))
    }

    async fn mark_used(&self, key: &str) -> Result<Option<AccessKey>> {
        let updated = self
            .keys()
            .find_one_and_update(
                doc! { "key": key, "used": { "$ne": true } },
                doc! { "$set": { "used": true } },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(map_err)?;
        Ok(updated.map(AccessKey::from))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let res = self
            .keys()
            .delete_one(doc! { "key": key })
            .await
            .map_err(map_err)?;
        Ok(res.deleted_count > 0)
    }

    async fn list_recent_with_usage(&self, limit: usize) -> Result<Vec<DecoratedKey>> {
        let docs: Vec<Document> = self
            .db
            .collection::<Document>(MONGODB_COLLECTION_KEYS)
            .aggregate(recent_keys_pipeline(MONGODB_COLLECTION_USERS, limit))
            .await
            .map_err(map_err)?
            .try_collect()
            .await
            .map_err(map_err)?;

        docs.into_iter()
            .map(|d| {
                let (key, used_by) = decode_recent_key(d).map_err(map_de)?;
                Ok(DecoratedKey {
                    key: key.into(),
                    usage: used_by.map_or(KeyUsage::Available, KeyUsage::UsedBy),
                })
            })
            .collect()
    }

    async fn list_all(&self) -> Result<Vec<AccessKey>> {
        let docs: Vec<DbKey> = self
            .keys()
            .find(doc! {})
            .sort(doc! { "createdAt": -1 })
            .await
            .map_err(map_err)?
            .try_collect()
            .await
            .map_err(map_err)?;
        Ok(docs.into_iter().map(AccessKey::from).collect())
    }
}

#[async_trait]
impl StatsStore for MongoStorage {
    async fn load(&self) -> Result<Option<StatsSnapshot>> {
        let found = self.stats().find_one(doc! {}).await.map_err(map_err)?;
        Ok(found.map(StatsSnapshot::from))
    }

    async fn upsert(&self, snapshot: &StatsSnapshot) -> Result<()> {
        let fields = bson::to_document(&DbStats::from(snapshot)).map_err(map_ser)?;
        self.stats()
            .update_one(doc! {}, doc! { "$set": fields })
            .upsert(true)
            .await
            .map_err(map_err)?;
        Ok(())
    }
}

#[async_trait]
impl SecurityLogStore for MongoStorage {
    async fn append(&self, entry: &SecurityLogEntry) -> Result<()> {
        self.security_logs()
            .insert_one(DbSecurityLog::from(entry))
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<SecurityLogEntry>> {
        let docs: Vec<DbSecurityLog> = self
            .security_logs()
            .find(doc! {})
            .sort(doc! { "timestamp": -1 })
            .limit(limit as i64)
            .await
            .map_err(map_err)?
            .try_collect()
            .await
            .map_err(map_err)?;
        Ok(docs.into_iter().map(SecurityLogEntry::from).collect())
    }
}

#[async_trait]
impl Storage for MongoStorage {
    async fn ping(&self) -> Result<()> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(map_err)?;
        Ok(())
    }
}
