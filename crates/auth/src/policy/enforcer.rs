use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, instrument};

use super::model::{PolicyModel, PolicyRule};
use super::store::{PolicyError, PolicyStore};
use crate::roles::Role;

/// Read side of the policy engine, as seen by authorization strategies.
pub trait PolicyView: Send + Sync {
    fn enforce(&self, subject: &str, object: &str, action: &str) -> Result<bool, PolicyError>;

    /// Direct and inherited roles, sorted. Role requirements are decided
    /// against this set, the same one rule matching resolves through.
    fn implicit_roles_for_user(&self, subject: &str) -> Result<Vec<Role>, PolicyError>;
}

/// RBAC enforcer: a [`PolicyModel`] cached in memory over a [`PolicyStore`].
///
/// Every mutation hits the store first and touches memory only after the
/// store accepted it. Mutations for one subject are serialized, and the
/// in-memory swap happens under a single write lock, so readers never see a
/// partially replaced role set.
///
/// The store write and the in-memory apply run together on their own task.
/// A caller that stops waiting (a deadline, a dropped request) does not stop
/// the apply once the write was issued; memory always follows the store.
pub struct Enforcer {
    store: Arc<dyn PolicyStore>,
    model: Arc<RwLock<PolicyModel>>,
    subject_locks: SubjectLocks,
}

impl std::fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enforcer").finish_non_exhaustive()
    }
}

impl Enforcer {
    pub async fn new(store: Arc<dyn PolicyStore>) -> Result<Self, PolicyError> {
        let snapshot = store.load_policy().await?;
        debug!(
            rules = snapshot.rules.len(),
            groupings = snapshot.groupings.len(),
            "policy loaded"
        );
        Ok(Self {
            store,
            model: Arc::new(RwLock::new(PolicyModel::from_snapshot(snapshot))),
            subject_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Re-read the whole policy from the store.
    pub async fn reload(&self) -> Result<(), PolicyError> {
        let model = PolicyModel::from_snapshot(self.store.load_policy().await?);
        *self.model.write().map_err(|_| PolicyError::Poisoned)? = model;
        Ok(())
    }

    /// Direct roles only.
    pub fn get_roles_for_user(&self, subject: &str) -> Result<Vec<Role>, PolicyError> {
        let model = self.model.read().map_err(|_| PolicyError::Poisoned)?;
        Ok(model.roles_for(subject))
    }

    pub fn get_implicit_roles_for_user(&self, subject: &str) -> Result<Vec<Role>, PolicyError> {
        let model = self.model.read().map_err(|_| PolicyError::Poisoned)?;
        Ok(model.implicit_roles(subject).into_iter().collect())
    }

    #[instrument(skip(self), err)]
    pub async fn add_role_for_user(&self, subject: &str, role: Role) -> Result<bool, PolicyError> {
        let lease = self.lease(subject)?;
        let guard = lease.lock_owned().await;

        let store = Arc::clone(&self.store);
        let (write_subject, apply_subject) = (subject.to_owned(), subject.to_owned());
        let write_role = role.clone();
        self.commit(
            guard,
            async move { store.add_grouping(&write_subject, &write_role).await },
            move |m| m.add_grouping(&apply_subject, role),
        )
        .await
    }

    #[instrument(skip(self), err)]
    pub async fn delete_role_for_user(&self, subject: &str, role: &Role) -> Result<bool, PolicyError> {
        let lease = self.lease(subject)?;
        let guard = lease.lock_owned().await;

        let store = Arc::clone(&self.store);
        let (write_subject, apply_subject) = (subject.to_owned(), subject.to_owned());
        let (write_role, apply_role) = (role.clone(), role.clone());
        self.commit(
            guard,
            async move { store.remove_grouping(&write_subject, &write_role).await },
            move |m| m.remove_grouping(&apply_subject, &apply_role),
        )
        .await
    }

    /// Make `role` the subject's only role.
    ///
    /// One transactional store call; a store failure leaves both the store
    /// and the cached model unchanged.
    #[instrument(skip(self), err)]
    pub async fn upsert_role(&self, subject: &str, role: Role) -> Result<(), PolicyError> {
        let lease = self.lease(subject)?;
        let guard = lease.lock_owned().await;

        let store = Arc::clone(&self.store);
        let (write_subject, apply_subject) = (subject.to_owned(), subject.to_owned());
        let roles = [role];
        let write_roles = roles.clone();
        self.commit(
            guard,
            async move { store.replace_roles(&write_subject, &write_roles).await },
            move |m| m.replace_roles(&apply_subject, roles),
        )
        .await
    }

    pub async fn add_policy(&self, rule: PolicyRule) -> Result<bool, PolicyError> {
        let store = Arc::clone(&self.store);
        let write_rule = rule.clone();
        self.commit(
            None,
            async move { store.add_policy(&write_rule).await },
            move |m| m.add_rule(rule),
        )
        .await
    }

    pub async fn remove_policy(&self, rule: &PolicyRule) -> Result<bool, PolicyError> {
        let store = Arc::clone(&self.store);
        let (write_rule, apply_rule) = (rule.clone(), rule.clone());
        self.commit(
            None,
            async move { store.remove_policy(&write_rule).await },
            move |m| m.remove_rule(&apply_rule),
        )
        .await
    }

    /// Run `write`, then `apply` on the model if it succeeded, as one task.
    ///
    /// `guard` (the subject lease) is held by the task, so the next mutation
    /// for the subject waits for this apply even if our caller is gone.
    async fn commit<T, W>(
        &self,
        guard: Option<OwnedMutexGuard<()>>,
        write: W,
        apply: impl FnOnce(&mut PolicyModel) -> T + Send + 'static,
    ) -> Result<T, PolicyError>
    where
        W: Future<Output = Result<(), PolicyError>> + Send + 'static,
        T: Send + 'static,
    {
        let model = Arc::clone(&self.model);
        let task = tokio::spawn(async move {
            let _guard = guard;
            write.await?;
            let mut model = model.write().map_err(|_| PolicyError::Poisoned)?;
            Ok::<T, PolicyError>(apply(&mut *model))
        });
        task.await
            .map_err(|e| PolicyError::Store(format!("policy commit task failed: {e}")))?
    }

    fn lease(&self, subject: &str) -> Result<SubjectLease<'_>, PolicyError> {
        let mut locks = self.subject_locks.lock().map_err(|_| PolicyError::Poisoned)?;
        let lock = locks.entry(subject.to_owned()).or_default().clone();
        Ok(SubjectLease {
            locks: &self.subject_locks,
            subject: subject.to_owned(),
            lock: Some(lock),
        })
    }
}

type SubjectLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Claim on one subject's mutation lock.
///
/// New claims clone the inner `Arc` only while the map is locked; the owned
/// guard a commit task holds is cloned from a live lease. A strong count of
/// two at drop therefore means nobody else can reach the lock.
struct SubjectLease<'a> {
    locks: &'a SubjectLocks,
    subject: String,
    lock: Option<Arc<tokio::sync::Mutex<()>>>,
}

impl SubjectLease<'_> {
    async fn lock_owned(&self) -> Option<OwnedMutexGuard<()>> {
        match &self.lock {
            Some(lock) => Some(Arc::clone(lock).lock_owned().await),
            None => None,
        }
    }
}

impl Drop for SubjectLease<'_> {
    fn drop(&mut self) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        if let Some(lock) = self.lock.take() {
            // map + ours; a commit task still running keeps the entry alive
            if Arc::strong_count(&lock) == 2 {
                locks.remove(&self.subject);
            }
        }
    }
}

impl PolicyView for Enforcer {
    fn enforce(&self, subject: &str, object: &str, action: &str) -> Result<bool, PolicyError> {
        let model = self.model.read().map_err(|_| PolicyError::Poisoned)?;
        Ok(model.enforce(subject, object, action))
    }

    fn implicit_roles_for_user(&self, subject: &str) -> Result<Vec<Role>, PolicyError> {
        self.get_implicit_roles_for_user(subject)
    }
}
