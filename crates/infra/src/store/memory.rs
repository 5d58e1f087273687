use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use warden_core::{NewUser, PageSpec, User, UserId, UserPatch};

use super::{StoreError, UserFilter, UserStore};

/// In-memory user store for tests/dev. Mirrors the Postgres semantics.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    inner: RwLock<BTreeMap<UserId, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<UserId, User>>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Database("lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<UserId, User>>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Database("lock poisoned".into()))
    }
}

fn matches(user: &User, filter: &UserFilter) -> bool {
    filter.iter().all(|(column, value)| match column {
        "id" => user.id.to_string() == value,
        "username" => user.username == value,
        "email" => user.email == value,
        _ => false,
    })
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_all(&self, page: &PageSpec) -> Result<Vec<User>, StoreError> {
        let (before, after) = page
            .cursors()
            .map_err(|e| StoreError::InvalidPage(e.to_string()))?;
        let map = self.read()?;
        Ok(map
            .values()
            .filter(|u| u.is_active())
            .filter(|u| before.is_none_or(|b| u.id < b))
            .filter(|u| after.is_none_or(|a| u.id > a))
            .take(page.size as usize)
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, id: UserId) -> Result<User, StoreError> {
        self.read()?
            .get(&id)
            .filter(|u| u.is_active())
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.read()?
            .values()
            .find(|u| u.is_active() && u.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create(&self, user: NewUser) -> Result<(), StoreError> {
        let mut map = self.write()?;
        if map.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!("id {} exists", user.id)));
        }
        if map.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("email already registered".into()));
        }
        map.insert(user.id, user.into_user(Utc::now()));
        Ok(())
    }

    async fn update(&self, id: UserId, patch: &UserPatch) -> Result<(), StoreError> {
        let mut map = self.write()?;
        if let Some(email) = &patch.email {
            if map.values().any(|u| u.id != id && &u.email == email) {
                return Err(StoreError::Conflict("email already registered".into()));
            }
        }
        let user = map
            .get_mut(&id)
            .filter(|u| u.is_active())
            .ok_or(StoreError::NotFound)?;
        patch.apply(user, Utc::now());
        Ok(())
    }

    async fn delete(&self, id: UserId) -> Result<(), StoreError> {
        let mut map = self.write()?;
        let user = map
            .get_mut(&id)
            .filter(|u| u.is_active())
            .ok_or(StoreError::NotFound)?;
        user.deleted_at = Some(Utc::now());
        Ok(())
    }

    async fn restore(&self, id: UserId) -> Result<bool, StoreError> {
        let mut map = self.write()?;
        match map.get_mut(&id) {
            Some(user) if !user.is_active() => {
                user.deleted_at = None;
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_by_id(&self, id: UserId) -> Result<u64, StoreError> {
        Ok(self.read()?.get(&id).filter(|u| u.is_active()).map_or(0, |_| 1))
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.read()?.values().filter(|u| u.is_active()).count() as u64)
    }

    async fn exists_by_key_value(&self, filter: &UserFilter) -> Result<bool, StoreError> {
        filter.validate()?;
        if filter.is_empty() {
            return Ok(false);
        }
        Ok(self
            .read()?
            .values()
            .any(|u| u.is_active() && matches(u, filter)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            id: UserId::new(),
            username: name.into(),
            email: format!("{name}@example.com"),
            password: "$argon2id$stub".into(),
        }
    }

    async fn seeded(n: usize) -> (InMemoryUserStore, Vec<UserId>) {
        let store = InMemoryUserStore::new();
        let mut ids = Vec::new();
        for i in 0..n {
            let user = new_user(&format!("user{i}"));
            ids.push(user.id);
            store.create(user).await.unwrap();
        }
        (store, ids)
    }

    #[tokio::test]
    async fn pages_by_cursor() {
        let (store, ids) = seeded(5).await;

        let first = store.get_all(&PageSpec::new(2)).await.unwrap();
        assert_eq!(first.iter().map(|u| u.id).collect::<Vec<_>>(), ids[..2]);

        let next = store
            .get_all(&PageSpec::new(2).after(ids[1].to_string()))
            .await
            .unwrap();
        assert_eq!(next.iter().map(|u| u.id).collect::<Vec<_>>(), ids[2..4]);

        let prev = store
            .get_all(&PageSpec::new(10).before(ids[2].to_string()))
            .await
            .unwrap();
        assert_eq!(prev.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = InMemoryUserStore::new();
        store.create(new_user("alice")).await.unwrap();
        let err = store.create(new_user("alice")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn soft_delete_hides_then_restore_returns() {
        let (store, ids) = seeded(2).await;
        store.delete(ids[0]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.count_by_id(ids[0]).await.unwrap(), 0);
        assert_eq!(store.get_by_id(ids[0]).await, Err(StoreError::NotFound));

        assert!(store.restore(ids[0]).await.unwrap());
        assert!(!store.restore(ids[0]).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn patch_updates_selected_fields() {
        let (store, ids) = seeded(1).await;
        let before = store.get_by_id(ids[0]).await.unwrap();
        store
            .update(
                ids[0],
                &UserPatch {
                    username: Some("renamed".into()),
                    ..UserPatch::default()
                },
            )
            .await
            .unwrap();
        let after = store.get_by_id(ids[0]).await.unwrap();
        assert_eq!(after.username, "renamed");
        assert_eq!(after.email, before.email);
    }

    #[tokio::test]
    async fn exists_by_whitelisted_columns() {
        let (store, _) = seeded(1).await;
        assert!(store.exists_by_key_value(&UserFilter::email("user0@example.com")).await.unwrap());
        assert!(!store.exists_by_key_value(&UserFilter::email("nobody@example.com")).await.unwrap());
        assert!(matches!(
            store.exists_by_key_value(&UserFilter::new().with("password", "x")).await,
            Err(StoreError::InvalidFilter(_))
        ));
    }

    #[tokio::test]
    async fn bad_cursor_is_invalid_page() {
        let store = InMemoryUserStore::new();
        assert!(matches!(
            store.get_all(&PageSpec::new(1).after("zzz")).await,
            Err(StoreError::InvalidPage(_))
        ));
    }
}
