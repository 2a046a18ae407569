//! Account registration, login and token authentication.

use super::auth::{hash_password, verify_password, TokenValue};
use super::store::{Owner, OwnerStore};
use anyhow::{bail, Result};
use std::sync::Arc;

pub struct OwnerManager {
    store: Arc<dyn OwnerStore>,
}

impl OwnerManager {
    pub fn new(store: Arc<dyn OwnerStore>) -> Self {
        Self { store }
    }

    pub fn register(&self, username: &str, password: &str) -> Result<i64> {
        let username = username.trim();
        if username.is_empty() {
            bail!("The username cannot be empty");
        }
        if password.is_empty() {
            bail!("The password cannot be empty");
        }
        let hash = hash_password(password)?;
        match self.store.create_owner(username, &hash) {
            Ok(id) => Ok(id),
            Err(err) if err.is_conflict() => bail!("Username {} is already taken", username),
            Err(err) => Err(err.into()),
        }
    }

    /// Verify credentials and mint a session token. `None` for a bad
    /// username or password; the two cases are indistinguishable to the
    /// caller.
    pub fn login(&self, username: &str, password: &str) -> Result<Option<TokenValue>> {
        let Some(owner) = self.store.get_owner_by_username(username.trim())? else {
            return Ok(None);
        };
        let Some(hash) = self.store.get_password_hash(owner.id)? else {
            return Ok(None);
        };
        if !verify_password(password, &hash)? {
            return Ok(None);
        }
        let token = TokenValue::generate();
        self.store.add_token(owner.id, &token)?;
        Ok(Some(token))
    }

    pub fn authenticate(&self, token: &TokenValue) -> Result<Option<Owner>> {
        Ok(self.store.get_owner_by_token(token)?)
    }

    pub fn logout(&self, token: &TokenValue) -> Result<bool> {
        Ok(self.store.remove_token(token)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::owner::SqliteOwnerStore;
    use tempfile::TempDir;

    fn manager() -> (TempDir, OwnerManager) {
        let dir = TempDir::new().unwrap();
        let store = SqliteOwnerStore::new(dir.path().join("owner.db")).unwrap();
        (dir, OwnerManager::new(Arc::new(store)))
    }

    #[test]
    fn register_login_authenticate_logout() {
        let (_dir, manager) = manager();
        let id = manager.register("dj", "secret").unwrap();

        let token = manager.login("dj", "secret").unwrap().unwrap();
        let owner = manager.authenticate(&token).unwrap().unwrap();
        assert_eq!(owner.id, id);

        assert!(manager.logout(&token).unwrap());
        assert!(manager.authenticate(&token).unwrap().is_none());
    }

    #[test]
    fn wrong_password_and_unknown_user_look_the_same() {
        let (_dir, manager) = manager();
        manager.register("dj", "secret").unwrap();
        assert!(manager.login("dj", "wrong").unwrap().is_none());
        assert!(manager.login("nobody", "secret").unwrap().is_none());
    }

    #[test]
    fn empty_username_or_password_is_rejected() {
        let (_dir, manager) = manager();
        assert!(manager.register("  ", "pw").is_err());
        assert!(manager.register("dj", "").is_err());
    }
}
