//! Document shapes of the shared checker database and conversions to core entities.
//!
//! Field names follow the checker application's schema. Every field is optional on read
//! because documents written by older checker builds may lack any of them. Numbers are
//! JS numbers on the other side, so counters and ids are read as `f64`.

use chrono::{DateTime, Utc};
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use serde::{Deserialize, Serialize};

use cac_core::{
    duration::BlockType,
    model::{
        AccessKey, Account, BlockState, KeyIssuer, SecurityLogEntry, ServerStatus, StatsCounters,
        StatsSnapshot, Subscription, SubscriptionStatus,
    },
};

pub fn to_bson_date(t: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(t.timestamp_millis())
}

pub fn from_bson_date(t: bson::DateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap_or_default()
}

fn opt_date(t: Option<DateTime<Utc>>) -> Bson {
    t.map(|t| Bson::DateTime(to_bson_date(t))).unwrap_or(Bson::Null)
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbSubscription {
    #[serde(default)]
    pub start_date: Option<bson::DateTime>,
    #[serde(default)]
    pub end_date: Option<bson::DateTime>,
    #[serde(default)]
    pub days_validity: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbBlockStatus {
    #[serde(default)]
    pub is_blocked: Option<bool>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub blocked_at: Option<bson::DateTime>,
    #[serde(default)]
    pub blocked_until: Option<bson::DateTime>,
    #[serde(default)]
    pub block_type: Option<String>,
}

impl From<DbBlockStatus> for BlockState {
    fn from(v: DbBlockStatus) -> Self {
        // Older checker builds cleared only `isBlocked`; treat that as fully cleared.
        if !v.is_blocked.unwrap_or(false) {
            return BlockState::cleared();
        }
        BlockState {
            is_blocked: true,
            reason: v.reason,
            blocked_at: v.blocked_at.map(from_bson_date),
            blocked_until: v.blocked_until.map(from_bson_date),
            block_type: v.block_type.and_then(|t| t.parse::<BlockType>().ok()),
        }
    }
}

/// `users` collection.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbAccount {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default)]
    pub username: Option<String>,
    /// The access key that activated this account.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub created_at: Option<bson::DateTime>,
    #[serde(default)]
    pub last_login: Option<bson::DateTime>,
    #[serde(default)]
    pub is_admin: Option<bool>,
    #[serde(default)]
    pub subscription: Option<DbSubscription>,
    #[serde(default)]
    pub block_status: Option<DbBlockStatus>,
    #[serde(default)]
    pub force_close: Option<bool>,
}

impl From<DbAccount> for Account {
    fn from(v: DbAccount) -> Self {
        let sub = v.subscription.unwrap_or_default();
        Account {
            username: v.username.unwrap_or_default(),
            access_key: v.key,
            created_at: v.created_at.map(from_bson_date),
            last_login_at: v.last_login.map(from_bson_date),
            is_admin: v.is_admin.unwrap_or(false),
            subscription: Subscription {
                start_date: sub.start_date.map(from_bson_date),
                end_date: sub.end_date.map(from_bson_date),
                days_validity: sub.days_validity,
                status: SubscriptionStatus::parse(sub.status.as_deref().unwrap_or("")),
            },
            block_state: v.block_status.map(BlockState::from).unwrap_or_default(),
            force_close: v.force_close.unwrap_or(false),
        }
    }
}

/// `$set` body writing every block-state field and `forceClose` at once.
pub fn block_state_update(state: &BlockState, force_close: bool) -> Document {
    doc! {
        "$set": {
            "blockStatus": {
                "isBlocked": state.is_blocked,
                "reason": state.reason.clone().map(Bson::String).unwrap_or(Bson::Null),
                "blockedAt": opt_date(state.blocked_at),
                "blockedUntil": opt_date(state.blocked_until),
                "blockType": state.block_type.map(|t| Bson::String(t.code().to_string())).unwrap_or(Bson::Null),
            },
            "forceClose": force_close,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbIssuer {
    #[serde(default)]
    pub admin_id: Option<String>,
    #[serde(default)]
    pub admin_username: Option<String>,
    #[serde(default)]
    pub admin_name: Option<String>,
}

/// `keys` collection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbKey {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub key: String,
    #[serde(default)]
    pub days_validity: Option<f64>,
    #[serde(default)]
    pub used: Option<bool>,
    #[serde(default)]
    pub created_at: Option<bson::DateTime>,
    #[serde(default)]
    pub expires_at: Option<bson::DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<DbIssuer>,
}

impl From<&AccessKey> for DbKey {
    fn from(k: &AccessKey) -> Self {
        Self {
            id: None,
            key: k.key.clone(),
            days_validity: Some(k.days_validity),
            used: Some(k.used),
            created_at: Some(to_bson_date(k.created_at)),
            expires_at: Some(to_bson_date(k.expires_at)),
            created_by: k.created_by.as_ref().map(|i| DbIssuer {
                admin_id: Some(i.admin_id.clone()),
                admin_username: i.admin_username.clone(),
                admin_name: i.admin_name.clone(),
            }),
        }
    }
}

impl From<DbKey> for AccessKey {
    fn from(v: DbKey) -> Self {
        let created_at = v.created_at.map(from_bson_date).unwrap_or_default();
        let days_validity = v.days_validity.unwrap_or(30.0);
        let expires_at = v
            .expires_at
            .map(from_bson_date)
            .unwrap_or_else(|| expiry_from_days(created_at, days_validity));
        AccessKey {
            key: v.key,
            days_validity,
            used: v.used.unwrap_or(false),
            created_at,
            expires_at,
            created_by: v.created_by.map(|i| KeyIssuer {
                admin_id: i.admin_id.unwrap_or_default(),
                admin_username: i.admin_username,
                admin_name: i.admin_name,
            }),
        }
    }
}

/// Out-of-range validity (garbage or hand-edited documents) falls back to `created_at`.
fn expiry_from_days(created_at: DateTime<Utc>, days: f64) -> DateTime<Utc> {
    chrono::Duration::try_seconds((days * 86_400.0) as i64)
        .and_then(|d| created_at.checked_add_signed(d))
        .unwrap_or(created_at)
}

/// Field the recent-keys pipeline adds with the referencing account's username.
pub const USED_BY_FIELD: &str = "usedBy";

/// Newest `limit` keys, each joined with the first account whose `key` matches.
pub fn recent_keys_pipeline(users_collection: &str, limit: usize) -> Vec<Document> {
    vec![
        doc! { "$sort": { "createdAt": -1 } },
        doc! { "$limit": limit as i64 },
        doc! {
            "$lookup": {
                "from": users_collection,
                "localField": "key",
                "foreignField": "key",
                "as": "userInfo",
            }
        },
        doc! {
            "$addFields": {
                "usedBy": { "$arrayElemAt": ["$userInfo.username", 0] },
            }
        },
        doc! { "$project": { "userInfo": 0 } },
    ]
}

/// Split one pipeline output document into the key and its redeemer, if any.
pub fn decode_recent_key(mut d: Document) -> bson::de::Result<(DbKey, Option<String>)> {
    let used_by = match d.remove(USED_BY_FIELD) {
        Some(Bson::String(s)) => Some(s),
        _ => None,
    };
    Ok((bson::from_document(d)?, used_by))
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DbServerStatus {
    #[serde(default)]
    pub memory: f64,
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub uptime: f64,
}

/// The single `stats` document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStats {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default)]
    pub active_users: Vec<String>,
    #[serde(default)]
    pub total_checks: f64,
    #[serde(default)]
    pub lives: f64,
    #[serde(default)]
    pub last_update: Option<bson::DateTime>,
    #[serde(default)]
    pub server_status: Option<DbServerStatus>,
}

impl From<&StatsSnapshot> for DbStats {
    fn from(s: &StatsSnapshot) -> Self {
        Self {
            id: None,
            active_users: s.active_usernames.clone(),
            total_checks: s.counters.total_checks as f64,
            lives: s.counters.lives_found as f64,
            last_update: Some(to_bson_date(s.last_updated_at)),
            server_status: Some(DbServerStatus {
                memory: s.server_status.memory_bytes as f64,
                cpu: s.server_status.cpu_load,
                uptime: s.server_status.uptime_seconds as f64,
            }),
        }
    }
}

impl From<DbStats> for StatsSnapshot {
    fn from(v: DbStats) -> Self {
        let server = v.server_status.unwrap_or_default();
        StatsSnapshot {
            active_usernames: v.active_users,
            counters: StatsCounters {
                total_checks: v.total_checks as u64,
                lives_found: v.lives as u64,
            },
            last_updated_at: v.last_update.map(from_bson_date).unwrap_or_default(),
            server_status: ServerStatus {
                memory_bytes: server.memory as u64,
                cpu_load: server.cpu,
                uptime_seconds: server.uptime as u64,
            },
        }
    }
}

/// `securitylogs` collection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbSecurityLog {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub user_id: f64,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub timestamp: Option<bson::DateTime>,
}

impl From<&SecurityLogEntry> for DbSecurityLog {
    fn from(e: &SecurityLogEntry) -> Self {
        Self {
            id: None,
            username: e.username.clone(),
            user_id: e.user_id as f64,
            command: e.command_text.clone(),
            timestamp: Some(to_bson_date(e.timestamp)),
        }
    }
}

impl From<DbSecurityLog> for SecurityLogEntry {
    fn from(v: DbSecurityLog) -> Self {
        SecurityLogEntry {
            username: v.username,
            user_id: v.user_id as i64,
            command_text: v.command,
            timestamp: v.timestamp.map(from_bson_date).unwrap_or_default(),
        }
    }
}
