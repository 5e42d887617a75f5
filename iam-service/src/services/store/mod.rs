//! Reader/writer capabilities over the transactional store.
//!
//! The repository never talks to a database directly: it reads through a
//! [`Reader`] and performs every mutation inside a [`WriteTx`] obtained from
//! a [`Writer`]. A transaction that is dropped without [`WriteTx::commit`]
//! leaves no trace.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;

use crate::models::{AuthMethod, Group, Host, HostCatalog, ResourceType, Scope, User};
use crate::services::error::StoreError;

/// Unique constraint names shared by the migrations and [`MemoryStore`].
pub mod constraints {
    pub const SCOPE_PUBLIC_ID: &str = "scope_public_id_uq";
    pub const SCOPE_GLOBAL: &str = "scope_global_uq";
    pub const SCOPE_NAME: &str = "scope_name_uq";
    pub const USER_PUBLIC_ID: &str = "iam_user_public_id_uq";
    pub const USER_NAME: &str = "iam_user_name_uq";
    pub const GROUP_PUBLIC_ID: &str = "iam_group_public_id_uq";
    pub const GROUP_NAME: &str = "iam_group_name_uq";
    pub const AUTH_METHOD_PUBLIC_ID: &str = "auth_method_public_id_uq";
    pub const AUTH_METHOD_FRIENDLY_NAME: &str = "auth_method_friendly_name_uq";
    pub const HOST_CATALOG_PUBLIC_ID: &str = "host_catalog_public_id_uq";
    pub const HOST_CATALOG_NAME: &str = "host_catalog_name_uq";
    pub const HOST_PUBLIC_ID: &str = "host_public_id_uq";
    pub const HOST_NAME: &str = "host_name_uq";

    pub const SCOPE_PARENT_FK: &str = "scope_parent_fk";
    pub const USER_SCOPE_FK: &str = "iam_user_scope_fk";
    pub const GROUP_SCOPE_FK: &str = "iam_group_scope_fk";
    pub const AUTH_METHOD_SCOPE_FK: &str = "auth_method_scope_fk";
    pub const HOST_CATALOG_SCOPE_FK: &str = "host_catalog_scope_fk";
    pub const HOST_CATALOG_FK: &str = "host_catalog_fk";
}

/// Read access to persisted entities.
#[async_trait]
pub trait Reader: Send + Sync {
    async fn find_scope(&self, public_id: &str) -> Result<Option<Scope>, StoreError>;

    async fn find_scope_by_row_id(&self, id: i64) -> Result<Option<Scope>, StoreError>;

    async fn find_user(&self, public_id: &str) -> Result<Option<User>, StoreError>;

    async fn find_group(&self, public_id: &str) -> Result<Option<Group>, StoreError>;

    async fn find_auth_method(&self, public_id: &str) -> Result<Option<AuthMethod>, StoreError>;

    async fn find_host_catalog(&self, public_id: &str)
        -> Result<Option<HostCatalog>, StoreError>;

    async fn find_host(&self, public_id: &str) -> Result<Option<Host>, StoreError>;

    /// Direct children of a scope.
    async fn list_scopes(&self, parent_id: &str) -> Result<Vec<Scope>, StoreError>;

    async fn list_users(&self, scope_id: &str) -> Result<Vec<User>, StoreError>;

    async fn list_groups(&self, scope_id: &str) -> Result<Vec<Group>, StoreError>;

    /// Auth methods attached to the scope with the given row id.
    async fn list_auth_methods(&self, scope_row_id: i64) -> Result<Vec<AuthMethod>, StoreError>;

    async fn list_host_catalogs(&self, scope_id: &str) -> Result<Vec<HostCatalog>, StoreError>;

    async fn list_hosts(&self, catalog_id: &str) -> Result<Vec<Host>, StoreError>;
}

/// Opens write transactions.
#[async_trait]
pub trait Writer: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn WriteTx>, StoreError>;
}

/// An open write transaction. Reads through it observe its own writes.
///
/// Inserts return the stored row with store-assigned fields (row id,
/// timestamps) filled in. Updates write the mutable columns of the given
/// entity and return the stored row, or `None` when it does not exist.
#[async_trait]
pub trait WriteTx: Reader {
    async fn insert_scope(&mut self, scope: &Scope) -> Result<Scope, StoreError>;

    async fn insert_user(&mut self, user: &User) -> Result<User, StoreError>;

    async fn insert_group(&mut self, group: &Group) -> Result<Group, StoreError>;

    async fn insert_auth_method(&mut self, method: &AuthMethod)
        -> Result<AuthMethod, StoreError>;

    async fn insert_host_catalog(&mut self, catalog: &HostCatalog)
        -> Result<HostCatalog, StoreError>;

    async fn insert_host(&mut self, host: &Host) -> Result<Host, StoreError>;

    /// Writes `name` and `description`.
    async fn update_scope(&mut self, scope: &Scope) -> Result<Option<Scope>, StoreError>;

    /// Writes `name` and `description`.
    async fn update_user(&mut self, user: &User) -> Result<Option<User>, StoreError>;

    /// Writes `name` and `description`.
    async fn update_group(&mut self, group: &Group) -> Result<Option<Group>, StoreError>;

    /// Writes `friendly_name` and `disabled`.
    async fn update_auth_method(
        &mut self,
        method: &AuthMethod,
    ) -> Result<Option<AuthMethod>, StoreError>;

    /// Delete one row, returning the number of rows removed.
    async fn delete(
        &mut self,
        resource_type: ResourceType,
        public_id: &str,
    ) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
