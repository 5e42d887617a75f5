//! In-process store for tests and local development.
//!
//! Write transactions take the store lock for their whole lifetime and work
//! on a staged copy of the state. Commit swaps the staged copy in; dropping
//! the transaction discards it.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::constraints::*;
use super::{Reader, WriteTx, Writer};
use crate::models::{AuthMethod, Group, Host, HostCatalog, ResourceType, Scope, ScopeType, User};
use crate::services::error::StoreError;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_row_id: i64,
    scopes: BTreeMap<String, Scope>,
    users: BTreeMap<String, User>,
    groups: BTreeMap<String, Group>,
    auth_methods: BTreeMap<String, AuthMethod>,
    host_catalogs: BTreeMap<String, HostCatalog>,
    hosts: BTreeMap<String, Host>,
}

fn unique(constraint: &str) -> StoreError {
    StoreError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

fn foreign_key(constraint: &str) -> StoreError {
    StoreError::ForeignKeyViolation {
        constraint: constraint.to_string(),
    }
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_row_id += 1;
        self.next_row_id
    }

    fn scope_by_row_id(&self, id: i64) -> Option<&Scope> {
        self.scopes.values().find(|s| s.id == id)
    }

    fn insert_scope(&mut self, scope: &Scope) -> Result<Scope, StoreError> {
        if self.scopes.contains_key(&scope.public_id) {
            return Err(unique(SCOPE_PUBLIC_ID));
        }
        if scope.scope_type == ScopeType::Global
            && self.scopes.values().any(|s| s.scope_type == ScopeType::Global)
        {
            return Err(unique(SCOPE_GLOBAL));
        }
        if let Some(parent) = &scope.parent_id {
            if !self.scopes.contains_key(parent) {
                return Err(foreign_key(SCOPE_PARENT_FK));
            }
        }
        if scope.name.is_some()
            && self
                .scopes
                .values()
                .any(|s| s.parent_id == scope.parent_id && s.name == scope.name)
        {
            return Err(unique(SCOPE_NAME));
        }

        let now = Utc::now();
        let mut stored = scope.clone();
        stored.id = self.next_id();
        stored.create_time = Some(now);
        stored.update_time = Some(now);
        self.scopes.insert(stored.public_id.clone(), stored.clone());
        Ok(stored)
    }

    fn insert_user(&mut self, user: &User) -> Result<User, StoreError> {
        if self.users.contains_key(&user.public_id) {
            return Err(unique(USER_PUBLIC_ID));
        }
        if !self.scopes.contains_key(&user.scope_id) {
            return Err(foreign_key(USER_SCOPE_FK));
        }
        if user.name.is_some()
            && self
                .users
                .values()
                .any(|u| u.scope_id == user.scope_id && u.name == user.name)
        {
            return Err(unique(USER_NAME));
        }

        let now = Utc::now();
        let mut stored = user.clone();
        stored.create_time = Some(now);
        stored.update_time = Some(now);
        self.users.insert(stored.public_id.clone(), stored.clone());
        Ok(stored)
    }

    fn insert_group(&mut self, group: &Group) -> Result<Group, StoreError> {
        if self.groups.contains_key(&group.public_id) {
            return Err(unique(GROUP_PUBLIC_ID));
        }
        if !self.scopes.contains_key(&group.scope_id) {
            return Err(foreign_key(GROUP_SCOPE_FK));
        }
        if group.name.is_some()
            && self
                .groups
                .values()
                .any(|g| g.scope_id == group.scope_id && g.name == group.name)
        {
            return Err(unique(GROUP_NAME));
        }

        let now = Utc::now();
        let mut stored = group.clone();
        stored.create_time = Some(now);
        stored.update_time = Some(now);
        self.groups.insert(stored.public_id.clone(), stored.clone());
        Ok(stored)
    }

    fn insert_auth_method(&mut self, method: &AuthMethod) -> Result<AuthMethod, StoreError> {
        if self.auth_methods.contains_key(&method.public_id) {
            return Err(unique(AUTH_METHOD_PUBLIC_ID));
        }
        if self.scope_by_row_id(method.primary_scope_id).is_none() {
            return Err(foreign_key(AUTH_METHOD_SCOPE_FK));
        }
        if method.friendly_name.is_some()
            && self.auth_methods.values().any(|m| {
                m.primary_scope_id == method.primary_scope_id
                    && m.friendly_name == method.friendly_name
            })
        {
            return Err(unique(AUTH_METHOD_FRIENDLY_NAME));
        }

        let now = Utc::now();
        let mut stored = method.clone();
        stored.id = self.next_id();
        stored.primary_scope = None;
        stored.create_time = Some(now);
        stored.update_time = Some(now);
        self.auth_methods
            .insert(stored.public_id.clone(), stored.clone());
        Ok(stored)
    }

    fn insert_host_catalog(&mut self, catalog: &HostCatalog) -> Result<HostCatalog, StoreError> {
        if self.host_catalogs.contains_key(&catalog.public_id) {
            return Err(unique(HOST_CATALOG_PUBLIC_ID));
        }
        if !self.scopes.contains_key(&catalog.scope_id) {
            return Err(foreign_key(HOST_CATALOG_SCOPE_FK));
        }
        if catalog.name.is_some()
            && self
                .host_catalogs
                .values()
                .any(|c| c.scope_id == catalog.scope_id && c.name == catalog.name)
        {
            return Err(unique(HOST_CATALOG_NAME));
        }

        let now = Utc::now();
        let mut stored = catalog.clone();
        stored.create_time = Some(now);
        stored.update_time = Some(now);
        self.host_catalogs
            .insert(stored.public_id.clone(), stored.clone());
        Ok(stored)
    }

    fn insert_host(&mut self, host: &Host) -> Result<Host, StoreError> {
        if self.hosts.contains_key(&host.public_id) {
            return Err(unique(HOST_PUBLIC_ID));
        }
        if !self.host_catalogs.contains_key(&host.catalog_id) {
            return Err(foreign_key(HOST_CATALOG_FK));
        }
        if host.name.is_some()
            && self
                .hosts
                .values()
                .any(|h| h.catalog_id == host.catalog_id && h.name == host.name)
        {
            return Err(unique(HOST_NAME));
        }

        let now = Utc::now();
        let mut stored = host.clone();
        stored.create_time = Some(now);
        stored.update_time = Some(now);
        self.hosts.insert(stored.public_id.clone(), stored.clone());
        Ok(stored)
    }

    fn update_scope(&mut self, scope: &Scope) -> Result<Option<Scope>, StoreError> {
        let Some(parent_id) = self.scopes.get(&scope.public_id).map(|s| s.parent_id.clone())
        else {
            return Ok(None);
        };
        if scope.name.is_some()
            && self.scopes.values().any(|s| {
                s.public_id != scope.public_id && s.parent_id == parent_id && s.name == scope.name
            })
        {
            return Err(unique(SCOPE_NAME));
        }
        let Some(stored) = self.scopes.get_mut(&scope.public_id) else {
            return Ok(None);
        };
        stored.name = scope.name.clone();
        stored.description = scope.description.clone();
        stored.update_time = Some(Utc::now());
        Ok(Some(stored.clone()))
    }

    fn update_user(&mut self, user: &User) -> Result<Option<User>, StoreError> {
        let Some(scope_id) = self.users.get(&user.public_id).map(|u| u.scope_id.clone()) else {
            return Ok(None);
        };
        if user.name.is_some()
            && self.users.values().any(|u| {
                u.public_id != user.public_id && u.scope_id == scope_id && u.name == user.name
            })
        {
            return Err(unique(USER_NAME));
        }
        let Some(stored) = self.users.get_mut(&user.public_id) else {
            return Ok(None);
        };
        stored.name = user.name.clone();
        stored.description = user.description.clone();
        stored.update_time = Some(Utc::now());
        Ok(Some(stored.clone()))
    }

    fn update_group(&mut self, group: &Group) -> Result<Option<Group>, StoreError> {
        let Some(scope_id) = self.groups.get(&group.public_id).map(|g| g.scope_id.clone()) else {
            return Ok(None);
        };
        if group.name.is_some()
            && self.groups.values().any(|g| {
                g.public_id != group.public_id && g.scope_id == scope_id && g.name == group.name
            })
        {
            return Err(unique(GROUP_NAME));
        }
        let Some(stored) = self.groups.get_mut(&group.public_id) else {
            return Ok(None);
        };
        stored.name = group.name.clone();
        stored.description = group.description.clone();
        stored.update_time = Some(Utc::now());
        Ok(Some(stored.clone()))
    }

    fn update_auth_method(&mut self, method: &AuthMethod) -> Result<Option<AuthMethod>, StoreError> {
        let Some(scope_row) = self
            .auth_methods
            .get(&method.public_id)
            .map(|m| m.primary_scope_id)
        else {
            return Ok(None);
        };
        if method.friendly_name.is_some()
            && self.auth_methods.values().any(|m| {
                m.public_id != method.public_id
                    && m.primary_scope_id == scope_row
                    && m.friendly_name == method.friendly_name
            })
        {
            return Err(unique(AUTH_METHOD_FRIENDLY_NAME));
        }
        let Some(stored) = self.auth_methods.get_mut(&method.public_id) else {
            return Ok(None);
        };
        stored.friendly_name = method.friendly_name.clone();
        stored.disabled = method.disabled;
        stored.update_time = Some(Utc::now());
        Ok(Some(stored.clone()))
    }

    fn delete(&mut self, resource_type: ResourceType, public_id: &str) -> Result<u64, StoreError> {
        let removed = match resource_type {
            ResourceType::Scope => {
                let Some(scope) = self.scopes.get(public_id) else {
                    return Ok(0);
                };
                let row_id = scope.id;
                let owner = Some(public_id.to_string());
                if self.scopes.values().any(|s| s.parent_id == owner) {
                    return Err(foreign_key(SCOPE_PARENT_FK));
                }
                if self.users.values().any(|u| u.scope_id == public_id) {
                    return Err(foreign_key(USER_SCOPE_FK));
                }
                if self.groups.values().any(|g| g.scope_id == public_id) {
                    return Err(foreign_key(GROUP_SCOPE_FK));
                }
                if self.auth_methods.values().any(|m| m.primary_scope_id == row_id) {
                    return Err(foreign_key(AUTH_METHOD_SCOPE_FK));
                }
                if self.host_catalogs.values().any(|c| c.scope_id == public_id) {
                    return Err(foreign_key(HOST_CATALOG_SCOPE_FK));
                }
                self.scopes.remove(public_id).is_some()
            }
            ResourceType::User => self.users.remove(public_id).is_some(),
            ResourceType::Group => self.groups.remove(public_id).is_some(),
            ResourceType::AuthMethod => self.auth_methods.remove(public_id).is_some(),
            ResourceType::HostCatalog => {
                if self.hosts.values().any(|h| h.catalog_id == public_id) {
                    return Err(foreign_key(HOST_CATALOG_FK));
                }
                self.host_catalogs.remove(public_id).is_some()
            }
            ResourceType::Host => self.hosts.remove(public_id).is_some(),
        };
        Ok(u64::from(removed))
    }
}

/// Shared, cloneable in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Read operations shared by the store and its transactions.
macro_rules! impl_reader {
    ($ty:ty, |$this:ident| $state:expr) => {
        #[async_trait]
        impl Reader for $ty {
            async fn find_scope(&self, public_id: &str) -> Result<Option<Scope>, StoreError> {
                let $this = self;
                Ok($state.scopes.get(public_id).cloned())
            }

            async fn find_scope_by_row_id(&self, id: i64) -> Result<Option<Scope>, StoreError> {
                let $this = self;
                Ok($state.scope_by_row_id(id).cloned())
            }

            async fn find_user(&self, public_id: &str) -> Result<Option<User>, StoreError> {
                let $this = self;
                Ok($state.users.get(public_id).cloned())
            }

            async fn find_group(&self, public_id: &str) -> Result<Option<Group>, StoreError> {
                let $this = self;
                Ok($state.groups.get(public_id).cloned())
            }

            async fn find_auth_method(
                &self,
                public_id: &str,
            ) -> Result<Option<AuthMethod>, StoreError> {
                let $this = self;
                Ok($state.auth_methods.get(public_id).cloned())
            }

            async fn find_host_catalog(
                &self,
                public_id: &str,
            ) -> Result<Option<HostCatalog>, StoreError> {
                let $this = self;
                Ok($state.host_catalogs.get(public_id).cloned())
            }

            async fn find_host(&self, public_id: &str) -> Result<Option<Host>, StoreError> {
                let $this = self;
                Ok($state.hosts.get(public_id).cloned())
            }

            async fn list_scopes(&self, parent_id: &str) -> Result<Vec<Scope>, StoreError> {
                let $this = self;
                Ok($state
                    .scopes
                    .values()
                    .filter(|s| s.parent_id.as_deref() == Some(parent_id))
                    .cloned()
                    .collect())
            }

            async fn list_users(&self, scope_id: &str) -> Result<Vec<User>, StoreError> {
                let $this = self;
                Ok($state
                    .users
                    .values()
                    .filter(|u| u.scope_id == scope_id)
                    .cloned()
                    .collect())
            }

            async fn list_groups(&self, scope_id: &str) -> Result<Vec<Group>, StoreError> {
                let $this = self;
                Ok($state
                    .groups
                    .values()
                    .filter(|g| g.scope_id == scope_id)
                    .cloned()
                    .collect())
            }

            async fn list_auth_methods(
                &self,
                scope_row_id: i64,
            ) -> Result<Vec<AuthMethod>, StoreError> {
                let $this = self;
                Ok($state
                    .auth_methods
                    .values()
                    .filter(|m| m.primary_scope_id == scope_row_id)
                    .cloned()
                    .collect())
            }

            async fn list_host_catalogs(
                &self,
                scope_id: &str,
            ) -> Result<Vec<HostCatalog>, StoreError> {
                let $this = self;
                Ok($state
                    .host_catalogs
                    .values()
                    .filter(|c| c.scope_id == scope_id)
                    .cloned()
                    .collect())
            }

            async fn list_hosts(&self, catalog_id: &str) -> Result<Vec<Host>, StoreError> {
                let $this = self;
                Ok($state
                    .hosts
                    .values()
                    .filter(|h| h.catalog_id == catalog_id)
                    .cloned()
                    .collect())
            }
        }
    };
}

impl_reader!(MemoryStore, |store| store.state.lock().await);
impl_reader!(MemoryTx, |tx| tx.staged);

#[async_trait]
impl Writer for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn WriteTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }
}

/// Write transaction over a [`MemoryStore`].
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl WriteTx for MemoryTx {
    async fn insert_scope(&mut self, scope: &Scope) -> Result<Scope, StoreError> {
        self.staged.insert_scope(scope)
    }

    async fn insert_user(&mut self, user: &User) -> Result<User, StoreError> {
        self.staged.insert_user(user)
    }

    async fn insert_group(&mut self, group: &Group) -> Result<Group, StoreError> {
        self.staged.insert_group(group)
    }

    async fn insert_auth_method(
        &mut self,
        method: &AuthMethod,
    ) -> Result<AuthMethod, StoreError> {
        self.staged.insert_auth_method(method)
    }

    async fn insert_host_catalog(
        &mut self,
        catalog: &HostCatalog,
    ) -> Result<HostCatalog, StoreError> {
        self.staged.insert_host_catalog(catalog)
    }

    async fn insert_host(&mut self, host: &Host) -> Result<Host, StoreError> {
        self.staged.insert_host(host)
    }

    async fn update_scope(&mut self, scope: &Scope) -> Result<Option<Scope>, StoreError> {
        self.staged.update_scope(scope)
    }

    async fn update_user(&mut self, user: &User) -> Result<Option<User>, StoreError> {
        self.staged.update_user(user)
    }

    async fn update_group(&mut self, group: &Group) -> Result<Option<Group>, StoreError> {
        self.staged.update_group(group)
    }

    async fn update_auth_method(
        &mut self,
        method: &AuthMethod,
    ) -> Result<Option<AuthMethod>, StoreError> {
        self.staged.update_auth_method(method)
    }

    async fn delete(
        &mut self,
        resource_type: ResourceType,
        public_id: &str,
    ) -> Result<u64, StoreError> {
        self.staged.delete(resource_type, public_id)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org(public_id: &str) -> Scope {
        Scope::new_organization().with_public_id(public_id)
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_scope(&Scope::global()).await.unwrap();
            assert!(tx.find_scope("global").await.unwrap().is_some());
        }
        assert!(store.find_scope("global").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_assigns_row_ids_and_timestamps() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let global = tx.insert_scope(&Scope::global()).await.unwrap();
        let org = tx.insert_scope(&org("o_1")).await.unwrap();
        tx.commit().await.unwrap();

        assert!(global.id > 0);
        assert!(org.id > global.id);
        assert!(org.create_time.is_some());
        assert_eq!(store.find_scope_by_row_id(org.id).await.unwrap(), Some(org));
    }

    #[tokio::test]
    async fn test_unique_and_foreign_key_constraints() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let err = tx.insert_scope(&org("o_1")).await.unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { .. }));

        tx.insert_scope(&Scope::global()).await.unwrap();
        let err = tx.insert_scope(&Scope::global().with_public_id("other")).await.unwrap_err();
        assert!(
            matches!(err, StoreError::UniqueViolation { ref constraint } if constraint == SCOPE_GLOBAL)
        );

        tx.insert_scope(&org("o_1").with_name("acme")).await.unwrap();
        let err = tx.insert_scope(&org("o_1")).await.unwrap_err();
        assert!(
            matches!(err, StoreError::UniqueViolation { ref constraint } if constraint == SCOPE_PUBLIC_ID)
        );
        let err = tx
            .insert_scope(&org("o_2").with_name("acme"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, StoreError::UniqueViolation { ref constraint } if constraint == SCOPE_NAME)
        );
    }

    #[tokio::test]
    async fn test_delete_is_restricted_by_references() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_scope(&Scope::global()).await.unwrap();
        tx.insert_scope(&org("o_1")).await.unwrap();
        tx.insert_user(&User::new("o_1").unwrap().with_public_id("u_1"))
            .await
            .unwrap();

        let err = tx.delete(ResourceType::Scope, "o_1").await.unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { .. }));

        assert_eq!(tx.delete(ResourceType::User, "u_1").await.unwrap(), 1);
        assert_eq!(tx.delete(ResourceType::User, "u_1").await.unwrap(), 0);
        assert_eq!(tx.delete(ResourceType::Scope, "o_1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_of_missing_row_returns_none() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let updated = tx
            .update_user(&User::new("o_1").unwrap().with_public_id("u_missing"))
            .await
            .unwrap();
        assert!(updated.is_none());
    }
}
