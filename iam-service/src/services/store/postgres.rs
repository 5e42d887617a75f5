//! PostgreSQL store.
//!
//! Queries are written once as functions generic over the executor so the
//! pool and an open transaction share them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgExecutor, PgPool};
use sqlx::{FromRow, Postgres, Transaction};
use tokio::sync::Mutex;

use super::{Reader, WriteTx, Writer};
use crate::models::{
    AuthMethod, AuthMethodType, Group, Host, HostCatalog, ResourceType, Scope, ScopeType, User,
};
use crate::services::error::StoreError;

// ==================== Rows ====================

#[derive(Debug, FromRow)]
struct ScopeRow {
    id: i64,
    public_id: String,
    #[sqlx(rename = "type")]
    scope_type: String,
    parent_id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

impl TryFrom<ScopeRow> for Scope {
    type Error = StoreError;

    fn try_from(row: ScopeRow) -> Result<Self, Self::Error> {
        let scope_type: ScopeType = row
            .scope_type
            .parse()
            .map_err(|e: String| StoreError::Backend(anyhow::anyhow!(e)))?;
        Ok(Scope {
            id: row.id,
            public_id: row.public_id,
            scope_type,
            parent_id: row.parent_id,
            name: row.name,
            description: row.description,
            create_time: Some(row.create_time),
            update_time: Some(row.update_time),
        })
    }
}

/// Shared shape of `iam_user` and `iam_group`.
#[derive(Debug, FromRow)]
struct PrincipalRow {
    public_id: String,
    scope_id: String,
    name: Option<String>,
    description: Option<String>,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

impl From<PrincipalRow> for User {
    fn from(row: PrincipalRow) -> Self {
        User {
            public_id: row.public_id,
            scope_id: row.scope_id,
            name: row.name,
            description: row.description,
            create_time: Some(row.create_time),
            update_time: Some(row.update_time),
        }
    }
}

impl From<PrincipalRow> for Group {
    fn from(row: PrincipalRow) -> Self {
        Group {
            public_id: row.public_id,
            scope_id: row.scope_id,
            name: row.name,
            description: row.description,
            create_time: Some(row.create_time),
            update_time: Some(row.update_time),
        }
    }
}

#[derive(Debug, FromRow)]
struct AuthMethodRow {
    id: i64,
    public_id: String,
    primary_scope_id: i64,
    friendly_name: Option<String>,
    disabled: bool,
    #[sqlx(rename = "type")]
    method_type: String,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

impl TryFrom<AuthMethodRow> for AuthMethod {
    type Error = StoreError;

    fn try_from(row: AuthMethodRow) -> Result<Self, Self::Error> {
        let method_type: AuthMethodType = row
            .method_type
            .parse()
            .map_err(|e: String| StoreError::Backend(anyhow::anyhow!(e)))?;
        Ok(AuthMethod {
            id: row.id,
            create_time: Some(row.create_time),
            update_time: Some(row.update_time),
            public_id: row.public_id,
            friendly_name: row.friendly_name,
            primary_scope_id: row.primary_scope_id,
            primary_scope: None,
            disabled: row.disabled,
            method_type,
        })
    }
}

#[derive(Debug, FromRow)]
struct HostCatalogRow {
    public_id: String,
    scope_id: String,
    name: Option<String>,
    description: Option<String>,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

impl From<HostCatalogRow> for HostCatalog {
    fn from(row: HostCatalogRow) -> Self {
        HostCatalog {
            public_id: row.public_id,
            scope_id: row.scope_id,
            name: row.name,
            description: row.description,
            create_time: Some(row.create_time),
            update_time: Some(row.update_time),
        }
    }
}

#[derive(Debug, FromRow)]
struct HostRow {
    public_id: String,
    catalog_id: String,
    address: String,
    name: Option<String>,
    description: Option<String>,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

impl From<HostRow> for Host {
    fn from(row: HostRow) -> Self {
        Host {
            public_id: row.public_id,
            catalog_id: row.catalog_id,
            address: row.address,
            name: row.name,
            description: row.description,
            create_time: Some(row.create_time),
            update_time: Some(row.update_time),
        }
    }
}

// ==================== Queries ====================

mod queries {
    use super::*;

    pub async fn find_scope<'e>(
        db: impl PgExecutor<'e>,
        public_id: &str,
    ) -> Result<Option<Scope>, StoreError> {
        sqlx::query_as::<_, ScopeRow>("SELECT * FROM iam_scope WHERE public_id = $1")
            .bind(public_id)
            .fetch_optional(db)
            .await?
            .map(Scope::try_from)
            .transpose()
    }

    pub async fn find_scope_by_row_id<'e>(
        db: impl PgExecutor<'e>,
        id: i64,
    ) -> Result<Option<Scope>, StoreError> {
        sqlx::query_as::<_, ScopeRow>("SELECT * FROM iam_scope WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await?
            .map(Scope::try_from)
            .transpose()
    }

    pub async fn find_principal<'e>(
        db: impl PgExecutor<'e>,
        table: &str,
        public_id: &str,
    ) -> Result<Option<PrincipalRow>, StoreError> {
        let sql = format!("SELECT * FROM {} WHERE public_id = $1", table);
        Ok(sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(public_id)
            .fetch_optional(db)
            .await?)
    }

    pub async fn find_auth_method<'e>(
        db: impl PgExecutor<'e>,
        public_id: &str,
    ) -> Result<Option<AuthMethod>, StoreError> {
        sqlx::query_as::<_, AuthMethodRow>("SELECT * FROM auth_method WHERE public_id = $1")
            .bind(public_id)
            .fetch_optional(db)
            .await?
            .map(AuthMethod::try_from)
            .transpose()
    }

    pub async fn find_host_catalog<'e>(
        db: impl PgExecutor<'e>,
        public_id: &str,
    ) -> Result<Option<HostCatalog>, StoreError> {
        let row = sqlx::query_as::<_, HostCatalogRow>(
            "SELECT * FROM static_host_catalog WHERE public_id = $1",
        )
        .bind(public_id)
        .fetch_optional(db)
        .await?;
        Ok(row.map(HostCatalog::from))
    }

    pub async fn find_host<'e>(
        db: impl PgExecutor<'e>,
        public_id: &str,
    ) -> Result<Option<Host>, StoreError> {
        let row = sqlx::query_as::<_, HostRow>("SELECT * FROM static_host WHERE public_id = $1")
            .bind(public_id)
            .fetch_optional(db)
            .await?;
        Ok(row.map(Host::from))
    }

    pub async fn list_scopes<'e>(
        db: impl PgExecutor<'e>,
        parent_id: &str,
    ) -> Result<Vec<Scope>, StoreError> {
        sqlx::query_as::<_, ScopeRow>(
            "SELECT * FROM iam_scope WHERE parent_id = $1 ORDER BY public_id",
        )
        .bind(parent_id)
        .fetch_all(db)
        .await?
        .into_iter()
        .map(Scope::try_from)
        .collect()
    }

    pub async fn list_principals<'e>(
        db: impl PgExecutor<'e>,
        table: &str,
        scope_id: &str,
    ) -> Result<Vec<PrincipalRow>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE scope_id = $1 ORDER BY public_id",
            table
        );
        Ok(sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(scope_id)
            .fetch_all(db)
            .await?)
    }

    pub async fn list_auth_methods<'e>(
        db: impl PgExecutor<'e>,
        scope_row_id: i64,
    ) -> Result<Vec<AuthMethod>, StoreError> {
        sqlx::query_as::<_, AuthMethodRow>(
            "SELECT * FROM auth_method WHERE primary_scope_id = $1 ORDER BY public_id",
        )
        .bind(scope_row_id)
        .fetch_all(db)
        .await?
        .into_iter()
        .map(AuthMethod::try_from)
        .collect()
    }

    pub async fn list_host_catalogs<'e>(
        db: impl PgExecutor<'e>,
        scope_id: &str,
    ) -> Result<Vec<HostCatalog>, StoreError> {
        let rows = sqlx::query_as::<_, HostCatalogRow>(
            "SELECT * FROM static_host_catalog WHERE scope_id = $1 ORDER BY public_id",
        )
        .bind(scope_id)
        .fetch_all(db)
        .await?;
        Ok(rows.into_iter().map(HostCatalog::from).collect())
    }

    pub async fn list_hosts<'e>(
        db: impl PgExecutor<'e>,
        catalog_id: &str,
    ) -> Result<Vec<Host>, StoreError> {
        let rows = sqlx::query_as::<_, HostRow>(
            "SELECT * FROM static_host WHERE catalog_id = $1 ORDER BY public_id",
        )
        .bind(catalog_id)
        .fetch_all(db)
        .await?;
        Ok(rows.into_iter().map(Host::from).collect())
    }

    pub async fn insert_scope<'e>(
        db: impl PgExecutor<'e>,
        scope: &Scope,
    ) -> Result<Scope, StoreError> {
        sqlx::query_as::<_, ScopeRow>(
            r#"
            INSERT INTO iam_scope (public_id, type, parent_id, name, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&scope.public_id)
        .bind(scope.scope_type.as_str())
        .bind(&scope.parent_id)
        .bind(&scope.name)
        .bind(&scope.description)
        .fetch_one(db)
        .await?
        .try_into()
    }

    pub async fn insert_principal<'e>(
        db: impl PgExecutor<'e>,
        table: &str,
        public_id: &str,
        scope_id: &str,
        name: &Option<String>,
        description: &Option<String>,
    ) -> Result<PrincipalRow, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO {} (public_id, scope_id, name, description)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
            table
        );
        Ok(sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(public_id)
            .bind(scope_id)
            .bind(name)
            .bind(description)
            .fetch_one(db)
            .await?)
    }

    pub async fn insert_auth_method<'e>(
        db: impl PgExecutor<'e>,
        method: &AuthMethod,
    ) -> Result<AuthMethod, StoreError> {
        sqlx::query_as::<_, AuthMethodRow>(
            r#"
            INSERT INTO auth_method (public_id, primary_scope_id, friendly_name, disabled, type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&method.public_id)
        .bind(method.primary_scope_id)
        .bind(&method.friendly_name)
        .bind(method.disabled)
        .bind(method.method_type.as_str())
        .fetch_one(db)
        .await?
        .try_into()
    }

    pub async fn insert_host_catalog<'e>(
        db: impl PgExecutor<'e>,
        catalog: &HostCatalog,
    ) -> Result<HostCatalog, StoreError> {
        let row = sqlx::query_as::<_, HostCatalogRow>(
            r#"
            INSERT INTO static_host_catalog (public_id, scope_id, name, description)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&catalog.public_id)
        .bind(&catalog.scope_id)
        .bind(&catalog.name)
        .bind(&catalog.description)
        .fetch_one(db)
        .await?;
        Ok(row.into())
    }

    pub async fn insert_host<'e>(db: impl PgExecutor<'e>, host: &Host) -> Result<Host, StoreError> {
        let row = sqlx::query_as::<_, HostRow>(
            r#"
            INSERT INTO static_host (public_id, catalog_id, address, name, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&host.public_id)
        .bind(&host.catalog_id)
        .bind(&host.address)
        .bind(&host.name)
        .bind(&host.description)
        .fetch_one(db)
        .await?;
        Ok(row.into())
    }

    pub async fn update_scope<'e>(
        db: impl PgExecutor<'e>,
        scope: &Scope,
    ) -> Result<Option<Scope>, StoreError> {
        sqlx::query_as::<_, ScopeRow>(
            r#"
            UPDATE iam_scope SET name = $2, description = $3, update_time = now()
            WHERE public_id = $1
            RETURNING *
            "#,
        )
        .bind(&scope.public_id)
        .bind(&scope.name)
        .bind(&scope.description)
        .fetch_optional(db)
        .await?
        .map(Scope::try_from)
        .transpose()
    }

    pub async fn update_principal<'e>(
        db: impl PgExecutor<'e>,
        table: &str,
        public_id: &str,
        name: &Option<String>,
        description: &Option<String>,
    ) -> Result<Option<PrincipalRow>, StoreError> {
        let sql = format!(
            r#"
            UPDATE {} SET name = $2, description = $3, update_time = now()
            WHERE public_id = $1
            RETURNING *
            "#,
            table
        );
        Ok(sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(public_id)
            .bind(name)
            .bind(description)
            .fetch_optional(db)
            .await?)
    }

    pub async fn update_auth_method<'e>(
        db: impl PgExecutor<'e>,
        method: &AuthMethod,
    ) -> Result<Option<AuthMethod>, StoreError> {
        sqlx::query_as::<_, AuthMethodRow>(
            r#"
            UPDATE auth_method SET friendly_name = $2, disabled = $3, update_time = now()
            WHERE public_id = $1
            RETURNING *
            "#,
        )
        .bind(&method.public_id)
        .bind(&method.friendly_name)
        .bind(method.disabled)
        .fetch_optional(db)
        .await?
        .map(AuthMethod::try_from)
        .transpose()
    }

    pub async fn delete<'e>(
        db: impl PgExecutor<'e>,
        resource_type: ResourceType,
        public_id: &str,
    ) -> Result<u64, StoreError> {
        let sql = format!("DELETE FROM {} WHERE public_id = $1", table_of(resource_type));
        let result = sqlx::query(&sql).bind(public_id).execute(db).await?;
        Ok(result.rows_affected())
    }
}

const USER_TABLE: &str = "iam_user";
const GROUP_TABLE: &str = "iam_group";

fn table_of(resource_type: ResourceType) -> &'static str {
    match resource_type {
        ResourceType::Scope => "iam_scope",
        ResourceType::User => USER_TABLE,
        ResourceType::Group => GROUP_TABLE,
        ResourceType::AuthMethod => "auth_method",
        ResourceType::HostCatalog => "static_host_catalog",
        ResourceType::Host => "static_host",
    }
}

// ==================== Store ====================

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Reader for PgStore {
    async fn find_scope(&self, public_id: &str) -> Result<Option<Scope>, StoreError> {
        queries::find_scope(&self.pool, public_id).await
    }

    async fn find_scope_by_row_id(&self, id: i64) -> Result<Option<Scope>, StoreError> {
        queries::find_scope_by_row_id(&self.pool, id).await
    }

    async fn find_user(&self, public_id: &str) -> Result<Option<User>, StoreError> {
        let row = queries::find_principal(&self.pool, USER_TABLE, public_id).await?;
        Ok(row.map(User::from))
    }

    async fn find_group(&self, public_id: &str) -> Result<Option<Group>, StoreError> {
        let row = queries::find_principal(&self.pool, GROUP_TABLE, public_id).await?;
        Ok(row.map(Group::from))
    }

    async fn find_auth_method(&self, public_id: &str) -> Result<Option<AuthMethod>, StoreError> {
        queries::find_auth_method(&self.pool, public_id).await
    }

    async fn find_host_catalog(
        &self,
        public_id: &str,
    ) -> Result<Option<HostCatalog>, StoreError> {
        queries::find_host_catalog(&self.pool, public_id).await
    }

    async fn find_host(&self, public_id: &str) -> Result<Option<Host>, StoreError> {
        queries::find_host(&self.pool, public_id).await
    }

    async fn list_scopes(&self, parent_id: &str) -> Result<Vec<Scope>, StoreError> {
        queries::list_scopes(&self.pool, parent_id).await
    }

    async fn list_users(&self, scope_id: &str) -> Result<Vec<User>, StoreError> {
        let rows = queries::list_principals(&self.pool, USER_TABLE, scope_id).await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn list_groups(&self, scope_id: &str) -> Result<Vec<Group>, StoreError> {
        let rows = queries::list_principals(&self.pool, GROUP_TABLE, scope_id).await?;
        Ok(rows.into_iter().map(Group::from).collect())
    }

    async fn list_auth_methods(&self, scope_row_id: i64) -> Result<Vec<AuthMethod>, StoreError> {
        queries::list_auth_methods(&self.pool, scope_row_id).await
    }

    async fn list_host_catalogs(&self, scope_id: &str) -> Result<Vec<HostCatalog>, StoreError> {
        queries::list_host_catalogs(&self.pool, scope_id).await
    }

    async fn list_hosts(&self, catalog_id: &str) -> Result<Vec<Host>, StoreError> {
        queries::list_hosts(&self.pool, catalog_id).await
    }
}

#[async_trait]
impl Writer for PgStore {
    async fn begin(&self) -> Result<Box<dyn WriteTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx: Mutex::new(tx) }))
    }
}

/// Open PostgreSQL transaction. Rolled back when dropped uncommitted.
pub struct PgTx {
    tx: Mutex<Transaction<'static, Postgres>>,
}

#[async_trait]
impl Reader for PgTx {
    async fn find_scope(&self, public_id: &str) -> Result<Option<Scope>, StoreError> {
        let mut tx = self.tx.lock().await;
        queries::find_scope(&mut **tx, public_id).await
    }

    async fn find_scope_by_row_id(&self, id: i64) -> Result<Option<Scope>, StoreError> {
        let mut tx = self.tx.lock().await;
        queries::find_scope_by_row_id(&mut **tx, id).await
    }

    async fn find_user(&self, public_id: &str) -> Result<Option<User>, StoreError> {
        let mut tx = self.tx.lock().await;
        let row = queries::find_principal(&mut **tx, USER_TABLE, public_id).await?;
        Ok(row.map(User::from))
    }

    async fn find_group(&self, public_id: &str) -> Result<Option<Group>, StoreError> {
        let mut tx = self.tx.lock().await;
        let row = queries::find_principal(&mut **tx, GROUP_TABLE, public_id).await?;
        Ok(row.map(Group::from))
    }

    async fn find_auth_method(&self, public_id: &str) -> Result<Option<AuthMethod>, StoreError> {
        let mut tx = self.tx.lock().await;
        queries::find_auth_method(&mut **tx, public_id).await
    }

    async fn find_host_catalog(
        &self,
        public_id: &str,
    ) -> Result<Option<HostCatalog>, StoreError> {
        let mut tx = self.tx.lock().await;
        queries::find_host_catalog(&mut **tx, public_id).await
    }

    async fn find_host(&self, public_id: &str) -> Result<Option<Host>, StoreError> {
        let mut tx = self.tx.lock().await;
        queries::find_host(&mut **tx, public_id).await
    }

    async fn list_scopes(&self, parent_id: &str) -> Result<Vec<Scope>, StoreError> {
        let mut tx = self.tx.lock().await;
        queries::list_scopes(&mut **tx, parent_id).await
    }

    async fn list_users(&self, scope_id: &str) -> Result<Vec<User>, StoreError> {
        let mut tx = self.tx.lock().await;
        let rows = queries::list_principals(&mut **tx, USER_TABLE, scope_id).await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn list_groups(&self, scope_id: &str) -> Result<Vec<Group>, StoreError> {
        let mut tx = self.tx.lock().await;
        let rows = queries::list_principals(&mut **tx, GROUP_TABLE, scope_id).await?;
        Ok(rows.into_iter().map(Group::from).collect())
    }

    async fn list_auth_methods(&self, scope_row_id: i64) -> Result<Vec<AuthMethod>, StoreError> {
        let mut tx = self.tx.lock().await;
        queries::list_auth_methods(&mut **tx, scope_row_id).await
    }

    async fn list_host_catalogs(&self, scope_id: &str) -> Result<Vec<HostCatalog>, StoreError> {
        let mut tx = self.tx.lock().await;
        queries::list_host_catalogs(&mut **tx, scope_id).await
    }

    async fn list_hosts(&self, catalog_id: &str) -> Result<Vec<Host>, StoreError> {
        let mut tx = self.tx.lock().await;
        queries::list_hosts(&mut **tx, catalog_id).await
    }
}

#[async_trait]
impl WriteTx for PgTx {
    async fn insert_scope(&mut self, scope: &Scope) -> Result<Scope, StoreError> {
        queries::insert_scope(&mut **self.tx.get_mut(), scope).await
    }

    async fn insert_user(&mut self, user: &User) -> Result<User, StoreError> {
        let row = queries::insert_principal(
            &mut **self.tx.get_mut(),
            USER_TABLE,
            &user.public_id,
            &user.scope_id,
            &user.name,
            &user.description,
        )
        .await?;
        Ok(row.into())
    }

    async fn insert_group(&mut self, group: &Group) -> Result<Group, StoreError> {
        let row = queries::insert_principal(
            &mut **self.tx.get_mut(),
            GROUP_TABLE,
            &group.public_id,
            &group.scope_id,
            &group.name,
            &group.description,
        )
        .await?;
        Ok(row.into())
    }

    async fn insert_auth_method(
        &mut self,
        method: &AuthMethod,
    ) -> Result<AuthMethod, StoreError> {
        queries::insert_auth_method(&mut **self.tx.get_mut(), method).await
    }

    async fn insert_host_catalog(
        &mut self,
        catalog: &HostCatalog,
    ) -> Result<HostCatalog, StoreError> {
        queries::insert_host_catalog(&mut **self.tx.get_mut(), catalog).await
    }

    async fn insert_host(&mut self, host: &Host) -> Result<Host, StoreError> {
        queries::insert_host(&mut **self.tx.get_mut(), host).await
    }

    async fn update_scope(&mut self, scope: &Scope) -> Result<Option<Scope>, StoreError> {
        queries::update_scope(&mut **self.tx.get_mut(), scope).await
    }

    async fn update_user(&mut self, user: &User) -> Result<Option<User>, StoreError> {
        let row = queries::update_principal(
            &mut **self.tx.get_mut(),
            USER_TABLE,
            &user.public_id,
            &user.name,
            &user.description,
        )
        .await?;
        Ok(row.map(User::from))
    }

    async fn update_group(&mut self, group: &Group) -> Result<Option<Group>, StoreError> {
        let row = queries::update_principal(
            &mut **self.tx.get_mut(),
            GROUP_TABLE,
            &group.public_id,
            &group.name,
            &group.description,
        )
        .await?;
        Ok(row.map(Group::from))
    }

    async fn update_auth_method(
        &mut self,
        method: &AuthMethod,
    ) -> Result<Option<AuthMethod>, StoreError> {
        queries::update_auth_method(&mut **self.tx.get_mut(), method).await
    }

    async fn delete(
        &mut self,
        resource_type: ResourceType,
        public_id: &str,
    ) -> Result<u64, StoreError> {
        queries::delete(&mut **self.tx.get_mut(), resource_type, public_id).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgTx { tx } = *self;
        tx.into_inner().commit().await?;
        Ok(())
    }
}
