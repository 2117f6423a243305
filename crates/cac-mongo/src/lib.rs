//! MongoDB implementation of the console's storage ports.

pub mod documents;
mod storage;

pub use storage::{
    backoff_schedule, MongoSettings, MongoStorage, MONGODB_COLLECTION_KEYS,
    MONGODB_COLLECTION_SECURITY_LOGS, MONGODB_COLLECTION_STATS, MONGODB_COLLECTION_USERS,
};
