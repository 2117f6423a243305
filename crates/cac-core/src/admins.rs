use std::collections::BTreeSet;

use tokio::sync::RwLock;

use crate::{domain::UserId, errors::Error, Result};

/// Authorization tier a command requires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Admin,
    SuperAdmin,
}

/// Admin allow-list plus the fixed super-admin.
///
/// Lives for the process only. Mutations are serialized by the lock; only the super-admin
/// may mutate, and the super-admin itself can never be removed.
#[derive(Debug)]
pub struct AdminRoster {
    super_admin: UserId,
    admins: RwLock<BTreeSet<UserId>>,
}

impl AdminRoster {
    pub fn new(super_admin: UserId, initial: impl IntoIterator<Item = UserId>) -> Self {
        let mut admins: BTreeSet<UserId> = initial.into_iter().collect();
        admins.insert(super_admin);
        Self {
            super_admin,
            admins: RwLock::new(admins),
        }
    }

    pub fn super_admin(&self) -> UserId {
        self.super_admin
    }

    pub fn is_super_admin(&self, user_id: UserId) -> bool {
        user_id == self.super_admin
    }

    pub async fn is_admin(&self, user_id: UserId) -> bool {
        self.admins.read().await.contains(&user_id)
    }

    pub async fn is_authorized(&self, user_id: UserId, tier: Tier) -> bool {
        match tier {
            Tier::SuperAdmin => self.is_super_admin(user_id),
            Tier::Admin => self.is_admin(user_id).await,
        }
    }

    /// Returns false when `user_id` was already an admin.
    pub async fn add(&self, actor: UserId, user_id: UserId) -> Result<bool> {
        self.require_super(actor)?;
        Ok(self.admins.write().await.insert(user_id))
    }

    /// Returns false when `user_id` was not an admin.
    pub async fn remove(&self, actor: UserId, user_id: UserId) -> Result<bool> {
        self.require_super(actor)?;
        if self.is_super_admin(user_id) {
            return Err(Error::invalid("The super admin cannot be removed"));
        }
        Ok(self.admins.write().await.remove(&user_id))
    }

    pub async fn list(&self) -> Vec<UserId> {
        self.admins.read().await.iter().copied().collect()
    }

    fn require_super(&self, actor: UserId) -> Result<()> {
        if self.is_super_admin(actor) {
            return Ok(());
        }
        Err(Error::Unauthorized(format!(
            "user {} may not manage admins",
            actor.0
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: UserId = UserId(6_000);

    #[tokio::test]
    async fn super_admin_is_always_an_admin() {
        let r = AdminRoster::new(ROOT, []);
        assert!(r.is_admin(ROOT).await);
        assert!(r.is_authorized(ROOT, Tier::SuperAdmin).await);
        assert!(!r.is_authorized(UserId(1), Tier::Admin).await);
    }

    #[tokio::test]
    async fn only_super_admin_mutates() {
        let r = AdminRoster::new(ROOT, [UserId(7)]);
        assert!(matches!(
            r.add(UserId(7), UserId(8)).await,
            Err(Error::Unauthorized(_))
        ));
        assert!(r.add(ROOT, UserId(8)).await.unwrap());
        assert!(!r.add(ROOT, UserId(8)).await.unwrap());
        assert!(r.is_admin(UserId(8)).await);
        assert!(!r.is_authorized(UserId(8), Tier::SuperAdmin).await);

        assert!(r.remove(ROOT, UserId(8)).await.unwrap());
        assert!(!r.remove(ROOT, UserId(8)).await.unwrap());
    }

    #[tokio::test]
    async fn super_admin_cannot_be_removed() {
        let r = AdminRoster::new(ROOT, [UserId(7)]);
        let before = r.list().await;
        assert!(matches!(
            r.remove(ROOT, ROOT).await,
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(r.list().await, before);
    }
}
