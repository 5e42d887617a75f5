//! Repository - unit of work over the IAM store.
//!
//! Every public operation runs inside at most one store transaction.
//! Arguments are validated before the transaction opens, referential checks
//! are repeated inside it, and nothing is visible until commit.

use std::sync::Arc;

use tracing::{debug, info};
use validator::Validate;

use crate::models::{
    auth_method::AUTH_METHOD_PREFIX,
    group::GROUP_PREFIX,
    host::{HOST_CATALOG_PREFIX, HOST_PREFIX},
    user::USER_PREFIX,
    AuthMethod, Entity, Group, Host, HostCatalog, PasswordAccountAttributes, ResourceType, Scope,
    ScopeType, User, GLOBAL_SCOPE_ID,
};
use crate::services::error::IamError;
use crate::services::hierarchy::ScopeResolver;
use crate::services::id::{prefix_of, IdAllocator, RandomIdAllocator};
use crate::services::store::{Reader, Writer};
use crate::services::wrapper::{SecretWrapper, WrappedSecret};

/// Paths `update_scope`, `update_user` and `update_group` accept.
pub const NAME_DESCRIPTION_PATHS: &[&str] = &["name", "description"];
/// Paths `update_auth_method` accepts.
pub const AUTH_METHOD_PATHS: &[&str] = &["friendly_name", "disabled"];

const IMMUTABLE_PATHS: &[&str] = &[
    "id",
    "public_id",
    "type",
    "parent_id",
    "scope_id",
    "primary_scope_id",
    "catalog_id",
    "create_time",
    "update_time",
];

#[derive(Clone)]
pub struct Repository {
    reader: Arc<dyn Reader>,
    writer: Arc<dyn Writer>,
    wrapper: Arc<dyn SecretWrapper>,
    ids: Arc<dyn IdAllocator>,
}

impl Repository {
    pub fn new(
        reader: Arc<dyn Reader>,
        writer: Arc<dyn Writer>,
        wrapper: Arc<dyn SecretWrapper>,
    ) -> Self {
        Self {
            reader,
            writer,
            wrapper,
            ids: Arc::new(RandomIdAllocator),
        }
    }

    /// Replace the public id allocator.
    pub fn with_id_allocator(mut self, ids: Arc<dyn IdAllocator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn reader(&self) -> &dyn Reader {
        self.reader.as_ref()
    }

    /// Hierarchy resolver over this repository's reader.
    pub fn resolver(&self) -> ScopeResolver<'_> {
        ScopeResolver::new(self.reader.as_ref())
    }

    fn assign_public_id(&self, public_id: &str, prefix: &str) -> Result<String, IamError> {
        if public_id.is_empty() {
            return self.ids.new_id(prefix);
        }
        if prefix_of(public_id) != Some(prefix) {
            return Err(IamError::invalid(format!(
                "error public id {} does not carry prefix {}",
                public_id, prefix
            )));
        }
        Ok(public_id.to_string())
    }

    // ==================== Scopes ====================

    /// Persist a new scope.
    ///
    /// The global scope has no parent and exists at most once. An
    /// organization's parent must be the global scope and a project's parent
    /// must be an existing organization.
    pub async fn create_scope(&self, scope: &Scope) -> Result<Scope, IamError> {
        scope.validate()?;
        if scope.is_persisted() {
            return Err(IamError::invalid("error scope is already persisted"));
        }

        let mut scope = scope.clone();
        let parent_type = match scope.scope_type.parent_type() {
            None => {
                if scope.parent_id.is_some() {
                    return Err(IamError::invalid("error global scope cannot have a parent"));
                }
                if !scope.public_id.is_empty() && scope.public_id != GLOBAL_SCOPE_ID {
                    return Err(IamError::invalid(format!(
                        "error global scope public id must be {}",
                        GLOBAL_SCOPE_ID
                    )));
                }
                scope.public_id = GLOBAL_SCOPE_ID.to_string();
                None
            }
            Some(parent_type) => {
                if scope.parent_id.as_deref().map_or(true, str::is_empty) {
                    return Err(IamError::invalid(format!(
                        "error parent scope id is unset for new {} scope",
                        scope.scope_type
                    )));
                }
                if let Some(prefix) = scope.scope_type.prefix() {
                    scope.public_id = self.assign_public_id(&scope.public_id, prefix)?;
                }
                Some(parent_type)
            }
        };

        let mut tx = self.writer.begin().await?;
        match (parent_type, scope.parent_id.as_deref()) {
            (Some(parent_type), Some(parent_id)) => {
                let parent = tx.find_scope(parent_id).await?.ok_or_else(|| {
                    IamError::invalid(format!("error parent scope {} not found", parent_id))
                })?;
                if parent.scope_type != parent_type {
                    return Err(IamError::invalid(format!(
                        "error {} scope cannot be a child of {} scope {}",
                        scope.scope_type, parent.scope_type, parent_id
                    )));
                }
            }
            _ => {
                if tx.find_scope(GLOBAL_SCOPE_ID).await?.is_some() {
                    return Err(IamError::AlreadyExists {
                        field: "type",
                        message: "error global scope already exists".to_string(),
                    });
                }
            }
        }

        let stored = tx.insert_scope(&scope).await?;
        tx.commit().await?;

        info!(
            scope_id = %stored.public_id,
            scope_type = %stored.scope_type,
            parent_id = ?stored.parent_id,
            "Scope created"
        );
        Ok(stored)
    }

    /// Return the global scope, creating it on first use.
    pub async fn ensure_global_scope(&self) -> Result<Scope, IamError> {
        if let Some(global) = self.reader.find_scope(GLOBAL_SCOPE_ID).await? {
            return Ok(global);
        }
        match self.create_scope(&Scope::global()).await {
            Ok(global) => Ok(global),
            // Lost a race with a concurrent bootstrap.
            Err(IamError::AlreadyExists { .. }) => self.lookup_scope(GLOBAL_SCOPE_ID).await,
            Err(e) => Err(e),
        }
    }

    pub async fn lookup_scope(&self, public_id: &str) -> Result<Scope, IamError> {
        require_public_id(public_id)?;
        self.reader
            .find_scope(public_id)
            .await?
            .ok_or_else(|| IamError::not_found(format!("scope {} not found", public_id)))
    }

    /// Direct children of `parent_id`.
    pub async fn list_scopes(&self, parent_id: &str) -> Result<Vec<Scope>, IamError> {
        require_public_id(parent_id)?;
        Ok(self.reader.list_scopes(parent_id).await?)
    }

    /// Update `name` and/or `description` of a scope, selected by
    /// `field_mask`. Returns the stored scope and the number of rows updated.
    pub async fn update_scope(
        &self,
        scope: &Scope,
        field_mask: &[&str],
    ) -> Result<(Scope, u64), IamError> {
        check_field_mask(field_mask, NAME_DESCRIPTION_PATHS)?;
        require_public_id(&scope.public_id)?;
        scope.validate()?;

        let mut tx = self.writer.begin().await?;
        let mut merged = tx
            .find_scope(&scope.public_id)
            .await?
            .ok_or_else(|| IamError::not_found(format!("scope {} not found", scope.public_id)))?;
        for path in field_mask {
            match *path {
                "name" => merged.name = scope.name.clone(),
                "description" => merged.description = scope.description.clone(),
                _ => {}
            }
        }
        let updated = tx
            .update_scope(&merged)
            .await?
            .ok_or_else(|| IamError::not_found(format!("scope {} not found", scope.public_id)))?;
        tx.commit().await?;

        info!(scope_id = %updated.public_id, fields = ?field_mask, "Scope updated");
        Ok((updated, 1))
    }

    /// Delete a scope that owns nothing. Returns the number of rows deleted.
    pub async fn delete_scope(&self, public_id: &str) -> Result<u64, IamError> {
        require_public_id(public_id)?;
        if public_id == GLOBAL_SCOPE_ID {
            return Err(IamError::invalid("error global scope cannot be deleted"));
        }

        let mut tx = self.writer.begin().await?;
        let Some(scope) = tx.find_scope(public_id).await? else {
            return Ok(0);
        };
        let owns_resources = !tx.list_scopes(public_id).await?.is_empty()
            || !tx.list_users(public_id).await?.is_empty()
            || !tx.list_groups(public_id).await?.is_empty()
            || !tx.list_auth_methods(scope.id).await?.is_empty()
            || !tx.list_host_catalogs(public_id).await?.is_empty();
        if owns_resources {
            return Err(IamError::invalid(format!(
                "error scope {} still owns resources",
                public_id
            )));
        }
        let deleted = tx.delete(ResourceType::Scope, public_id).await?;
        tx.commit().await?;

        info!(scope_id = %public_id, deleted, "Scope deleted");
        Ok(deleted)
    }

    // ==================== Users & Groups ====================

    /// Persist a new user in an existing organization.
    pub async fn create_user(&self, user: &User) -> Result<User, IamError> {
        user.validate()?;
        require_public_id(&user.scope_id)?;
        let mut user = user.clone();
        user.public_id = self.assign_public_id(&user.public_id, USER_PREFIX)?;

        let mut tx = self.writer.begin().await?;
        require_scope(&*tx, &user.scope_id, ScopeType::Organization, "user").await?;
        let stored = tx.insert_user(&user).await?;
        tx.commit().await?;

        info!(user_id = %stored.public_id, scope_id = %stored.scope_id, "User created");
        Ok(stored)
    }

    pub async fn lookup_user(&self, public_id: &str) -> Result<User, IamError> {
        require_public_id(public_id)?;
        self.reader
            .find_user(public_id)
            .await?
            .ok_or_else(|| IamError::not_found(format!("user {} not found", public_id)))
    }

    pub async fn list_users(&self, scope_id: &str) -> Result<Vec<User>, IamError> {
        require_public_id(scope_id)?;
        Ok(self.reader.list_users(scope_id).await?)
    }

    pub async fn update_user(
        &self,
        user: &User,
        field_mask: &[&str],
    ) -> Result<(User, u64), IamError> {
        check_field_mask(field_mask, NAME_DESCRIPTION_PATHS)?;
        require_public_id(&user.public_id)?;
        user.validate()?;

        let mut tx = self.writer.begin().await?;
        let mut merged = tx
            .find_user(&user.public_id)
            .await?
            .ok_or_else(|| IamError::not_found(format!("user {} not found", user.public_id)))?;
        for path in field_mask {
            match *path {
                "name" => merged.name = user.name.clone(),
                "description" => merged.description = user.description.clone(),
                _ => {}
            }
        }
        let updated = tx
            .update_user(&merged)
            .await?
            .ok_or_else(|| IamError::not_found(format!("user {} not found", user.public_id)))?;
        tx.commit().await?;

        info!(user_id = %updated.public_id, fields = ?field_mask, "User updated");
        Ok((updated, 1))
    }

    pub async fn delete_user(&self, public_id: &str) -> Result<u64, IamError> {
        self.delete_one(ResourceType::User, public_id).await
    }

    /// Persist a new group in an existing organization.
    pub async fn create_group(&self, group: &Group) -> Result<Group, IamError> {
        group.validate()?;
        require_public_id(&group.scope_id)?;
        let mut group = group.clone();
        group.public_id = self.assign_public_id(&group.public_id, GROUP_PREFIX)?;

        let mut tx = self.writer.begin().await?;
        require_scope(&*tx, &group.scope_id, ScopeType::Organization, "group").await?;
        let stored = tx.insert_group(&group).await?;
        tx.commit().await?;

        info!(group_id = %stored.public_id, scope_id = %stored.scope_id, "Group created");
        Ok(stored)
    }

    pub async fn lookup_group(&self, public_id: &str) -> Result<Group, IamError> {
        require_public_id(public_id)?;
        self.reader
            .find_group(public_id)
            .await?
            .ok_or_else(|| IamError::not_found(format!("group {} not found", public_id)))
    }

    pub async fn list_groups(&self, scope_id: &str) -> Result<Vec<Group>, IamError> {
        require_public_id(scope_id)?;
        Ok(self.reader.list_groups(scope_id).await?)
    }

    pub async fn update_group(
        &self,
        group: &Group,
        field_mask: &[&str],
    ) -> Result<(Group, u64), IamError> {
        check_field_mask(field_mask, NAME_DESCRIPTION_PATHS)?;
        require_public_id(&group.public_id)?;
        group.validate()?;

        let mut tx = self.writer.begin().await?;
        let mut merged = tx
            .find_group(&group.public_id)
            .await?
            .ok_or_else(|| IamError::not_found(format!("group {} not found", group.public_id)))?;
        for path in field_mask {
            match *path {
                "name" => merged.name = group.name.clone(),
                "description" => merged.description = group.description.clone(),
                _ => {}
            }
        }
        let updated = tx
            .update_group(&merged)
            .await?
            .ok_or_else(|| IamError::not_found(format!("group {} not found", group.public_id)))?;
        tx.commit().await?;

        info!(group_id = %updated.public_id, fields = ?field_mask, "Group updated");
        Ok((updated, 1))
    }

    pub async fn delete_group(&self, public_id: &str) -> Result<u64, IamError> {
        self.delete_one(ResourceType::Group, public_id).await
    }

    // ==================== Auth Methods ====================

    /// Persist an auth method built with [`AuthMethod::new`]. The primary
    /// scope is checked again inside the transaction: it must still exist
    /// and be an organization.
    pub async fn create_auth_method(&self, method: &AuthMethod) -> Result<AuthMethod, IamError> {
        method.validate()?;
        if method.id != 0 {
            return Err(IamError::invalid("error auth method is already persisted"));
        }
        if method.primary_scope_id == 0 {
            return Err(IamError::invalid(
                "error primary scope id is unset for new auth method",
            ));
        }
        let mut method = method.clone();
        method.public_id = self.assign_public_id(&method.public_id, AUTH_METHOD_PREFIX)?;

        let mut tx = self.writer.begin().await?;
        let scope = tx
            .find_scope_by_row_id(method.primary_scope_id)
            .await?
            .ok_or_else(|| {
                IamError::not_found(format!(
                    "primary scope {} not found for new auth method",
                    method.primary_scope_id
                ))
            })?;
        if scope.scope_type != ScopeType::Organization {
            return Err(IamError::invalid(format!(
                "error auth method primary scope must be an organization, got {}",
                scope.scope_type
            )));
        }
        let mut stored = tx.insert_auth_method(&method).await?;
        tx.commit().await?;

        info!(
            auth_method_id = %stored.public_id,
            scope_id = %scope.public_id,
            method_type = %stored.method_type,
            "Auth method created"
        );
        stored.primary_scope = Some(scope);
        Ok(stored)
    }

    /// Look up an auth method with its primary scope embedded.
    pub async fn lookup_auth_method(&self, public_id: &str) -> Result<AuthMethod, IamError> {
        require_public_id(public_id)?;
        let mut method = self
            .reader
            .find_auth_method(public_id)
            .await?
            .ok_or_else(|| IamError::not_found(format!("auth method {} not found", public_id)))?;
        method.primary_scope = self
            .reader
            .find_scope_by_row_id(method.primary_scope_id)
            .await?;
        Ok(method)
    }

    /// Auth methods attached to the organization `scope_id`.
    pub async fn list_auth_methods(&self, scope_id: &str) -> Result<Vec<AuthMethod>, IamError> {
        let scope = self.lookup_scope(scope_id).await?;
        Ok(self.reader.list_auth_methods(scope.id).await?)
    }

    /// Update `friendly_name` and/or `disabled`. The type and primary scope
    /// of an auth method never change.
    pub async fn update_auth_method(
        &self,
        method: &AuthMethod,
        field_mask: &[&str],
    ) -> Result<(AuthMethod, u64), IamError> {
        check_field_mask(field_mask, AUTH_METHOD_PATHS)?;
        require_public_id(&method.public_id)?;
        method.validate()?;

        let mut tx = self.writer.begin().await?;
        let mut merged = tx
            .find_auth_method(&method.public_id)
            .await?
            .ok_or_else(|| {
                IamError::not_found(format!("auth method {} not found", method.public_id))
            })?;
        for path in field_mask {
            match *path {
                "friendly_name" => merged.friendly_name = method.friendly_name.clone(),
                "disabled" => merged.disabled = method.disabled,
                _ => {}
            }
        }
        let mut updated = tx.update_auth_method(&merged).await?.ok_or_else(|| {
            IamError::not_found(format!("auth method {} not found", method.public_id))
        })?;
        updated.primary_scope = tx.find_scope_by_row_id(updated.primary_scope_id).await?;
        tx.commit().await?;

        info!(auth_method_id = %updated.public_id, fields = ?field_mask, "Auth method updated");
        Ok((updated, 1))
    }

    pub async fn delete_auth_method(&self, public_id: &str) -> Result<u64, IamError> {
        self.delete_one(ResourceType::AuthMethod, public_id).await
    }

    // ==================== Host Catalogs & Hosts ====================

    /// Persist a new host catalog in an existing project.
    pub async fn create_host_catalog(
        &self,
        catalog: &HostCatalog,
    ) -> Result<HostCatalog, IamError> {
        catalog.validate()?;
        require_public_id(&catalog.scope_id)?;
        let mut catalog = catalog.clone();
        catalog.public_id = self.assign_public_id(&catalog.public_id, HOST_CATALOG_PREFIX)?;

        let mut tx = self.writer.begin().await?;
        require_scope(&*tx, &catalog.scope_id, ScopeType::Project, "host catalog").await?;
        let stored = tx.insert_host_catalog(&catalog).await?;
        tx.commit().await?;

        info!(catalog_id = %stored.public_id, scope_id = %stored.scope_id, "Host catalog created");
        Ok(stored)
    }

    pub async fn lookup_host_catalog(&self, public_id: &str) -> Result<HostCatalog, IamError> {
        require_public_id(public_id)?;
        self.reader
            .find_host_catalog(public_id)
            .await?
            .ok_or_else(|| IamError::not_found(format!("host catalog {} not found", public_id)))
    }

    pub async fn list_host_catalogs(&self, scope_id: &str) -> Result<Vec<HostCatalog>, IamError> {
        require_public_id(scope_id)?;
        Ok(self.reader.list_host_catalogs(scope_id).await?)
    }

    /// Delete an empty host catalog.
    pub async fn delete_host_catalog(&self, public_id: &str) -> Result<u64, IamError> {
        require_public_id(public_id)?;
        let mut tx = self.writer.begin().await?;
        if !tx.list_hosts(public_id).await?.is_empty() {
            return Err(IamError::invalid(format!(
                "error host catalog {} still contains hosts",
                public_id
            )));
        }
        let deleted = tx.delete(ResourceType::HostCatalog, public_id).await?;
        tx.commit().await?;

        info!(catalog_id = %public_id, deleted, "Host catalog deleted");
        Ok(deleted)
    }

    /// Persist a new host in an existing catalog.
    pub async fn create_host(&self, host: &Host) -> Result<Host, IamError> {
        host.validate()?;
        require_public_id(&host.catalog_id)?;
        let mut host = host.clone();
        host.public_id = self.assign_public_id(&host.public_id, HOST_PREFIX)?;

        let mut tx = self.writer.begin().await?;
        if tx.find_host_catalog(&host.catalog_id).await?.is_none() {
            return Err(IamError::invalid(format!(
                "error host catalog {} not found for new host",
                host.catalog_id
            )));
        }
        let stored = tx.insert_host(&host).await?;
        tx.commit().await?;

        info!(host_id = %stored.public_id, catalog_id = %stored.catalog_id, "Host created");
        Ok(stored)
    }

    pub async fn lookup_host(&self, public_id: &str) -> Result<Host, IamError> {
        require_public_id(public_id)?;
        self.reader
            .find_host(public_id)
            .await?
            .ok_or_else(|| IamError::not_found(format!("host {} not found", public_id)))
    }

    pub async fn list_hosts(&self, catalog_id: &str) -> Result<Vec<Host>, IamError> {
        require_public_id(catalog_id)?;
        Ok(self.reader.list_hosts(catalog_id).await?)
    }

    pub async fn delete_host(&self, public_id: &str) -> Result<u64, IamError> {
        self.delete_one(ResourceType::Host, public_id).await
    }

    // ==================== Generic ====================

    /// Look up any resource by public id, dispatching on its prefix.
    pub async fn lookup(&self, public_id: &str) -> Result<Entity, IamError> {
        require_public_id(public_id)?;
        let resource_type = ResourceType::from_public_id(public_id).ok_or_else(|| {
            IamError::invalid(format!("error unknown resource prefix in {}", public_id))
        })?;
        debug!(public_id, resource_type = %resource_type, "Looking up resource");
        let entity: Entity = match resource_type {
            ResourceType::Scope => self.lookup_scope(public_id).await?.into(),
            ResourceType::User => self.lookup_user(public_id).await?.into(),
            ResourceType::Group => self.lookup_group(public_id).await?.into(),
            ResourceType::AuthMethod => self.lookup_auth_method(public_id).await?.into(),
            ResourceType::HostCatalog => self.lookup_host_catalog(public_id).await?.into(),
            ResourceType::Host => self.lookup_host(public_id).await?.into(),
        };
        Ok(entity)
    }

    async fn delete_one(
        &self,
        resource_type: ResourceType,
        public_id: &str,
    ) -> Result<u64, IamError> {
        require_public_id(public_id)?;
        let mut tx = self.writer.begin().await?;
        let deleted = tx.delete(resource_type, public_id).await?;
        tx.commit().await?;

        info!(public_id, resource_type = %resource_type, deleted, "Resource deleted");
        Ok(deleted)
    }

    // ==================== Account attributes ====================

    /// Seal password account attributes for storage.
    pub async fn seal_attributes(
        &self,
        attrs: &PasswordAccountAttributes,
    ) -> Result<WrappedSecret, IamError> {
        let plaintext = serde_json::to_vec(attrs).map_err(|e| IamError::Wrapping(e.into()))?;
        self.wrapper.encrypt(&plaintext).await
    }

    pub async fn open_attributes(
        &self,
        sealed: &WrappedSecret,
    ) -> Result<PasswordAccountAttributes, IamError> {
        let plaintext = self.wrapper.decrypt(sealed).await?;
        serde_json::from_slice(&plaintext).map_err(|e| IamError::Wrapping(e.into()))
    }
}

fn require_public_id(public_id: &str) -> Result<(), IamError> {
    if public_id.is_empty() {
        return Err(IamError::invalid("error public id is unset"));
    }
    Ok(())
}

fn check_field_mask(field_mask: &[&str], allowed: &[&str]) -> Result<(), IamError> {
    if field_mask.is_empty() {
        return Err(IamError::invalid("error empty field mask"));
    }
    for path in field_mask {
        if IMMUTABLE_PATHS.contains(path) {
            return Err(IamError::invalid(format!("error field {} is immutable", path)));
        }
        if !allowed.contains(path) {
            return Err(IamError::invalid(format!("error invalid field mask path {}", path)));
        }
    }
    Ok(())
}

/// Load `public_id` through `reader` and check it is a scope of `expected`
/// type able to own a new `what`.
async fn require_scope<R: Reader + ?Sized>(
    reader: &R,
    public_id: &str,
    expected: ScopeType,
    what: &str,
) -> Result<Scope, IamError> {
    let scope = reader.find_scope(public_id).await?.ok_or_else(|| {
        IamError::invalid(format!("error scope {} not found for new {}", public_id, what))
    })?;
    if scope.scope_type != expected {
        return Err(IamError::invalid(format!(
            "error {} must belong to an {} scope, got {}",
            what, expected, scope.scope_type
        )));
    }
    Ok(scope)
}
