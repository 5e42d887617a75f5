//! Scope hierarchy resolution.
//!
//! Resources only hold identifier references to their parents; this walks
//! them on demand through a [`Reader`], one hop per lookup. Nothing is cached.

use crate::models::{ParentRef, Resource, ResourceType, Scope, ScopeType};
use crate::services::error::{IamError, StoreError};
use crate::services::store::Reader;

/// Global, organization, project.
const MAX_DEPTH: usize = 3;

pub struct ScopeResolver<'a> {
    reader: &'a dyn Reader,
}

impl<'a> ScopeResolver<'a> {
    pub fn new(reader: &'a dyn Reader) -> Self {
        Self { reader }
    }

    async fn scope(&self, public_id: &str) -> Result<Scope, IamError> {
        self.reader
            .find_scope(public_id)
            .await?
            .ok_or_else(|| IamError::not_found(format!("scope {} not found", public_id)))
    }

    /// Parent of `scope`, `None` for the global scope.
    pub async fn parent_of(&self, scope: &Scope) -> Result<Option<Scope>, IamError> {
        match &scope.parent_id {
            Some(parent_id) => self.scope(parent_id).await.map(Some),
            None => Ok(None),
        }
    }

    /// The scope `resource` lives in. Hosts resolve through their catalog.
    pub async fn scope_of<R: Resource>(&self, resource: &R) -> Result<Option<Scope>, IamError> {
        match resource.parent_ref() {
            ParentRef::Root => Ok(None),
            ParentRef::Scope(public_id) => self.scope(public_id).await.map(Some),
            ParentRef::ScopeRow(id) => {
                let scope = self.reader.find_scope_by_row_id(id).await?.ok_or_else(|| {
                    IamError::not_found(format!(
                        "scope with row id {} not found for {}",
                        id,
                        resource.public_id()
                    ))
                })?;
                Ok(Some(scope))
            }
            ParentRef::Catalog(catalog_id) => {
                let catalog = self
                    .reader
                    .find_host_catalog(catalog_id)
                    .await?
                    .ok_or_else(|| {
                        IamError::not_found(format!("host catalog {} not found", catalog_id))
                    })?;
                self.scope(&catalog.scope_id).await.map(Some)
            }
        }
    }

    /// Ancestors of `scope`, nearest first, ending at the global scope.
    pub async fn ancestors(&self, scope: &Scope) -> Result<Vec<Scope>, IamError> {
        let mut chain = Vec::new();
        let mut current = self.parent_of(scope).await?;
        while let Some(parent) = current {
            if chain.len() >= MAX_DEPTH {
                tracing::error!(scope_id = %scope.public_id, "Scope hierarchy is deeper than allowed");
                return Err(IamError::Storage(StoreError::Backend(anyhow::anyhow!(
                    "scope hierarchy above {} exceeds depth {}",
                    scope.public_id,
                    MAX_DEPTH
                ))));
            }
            current = self.parent_of(&parent).await?;
            chain.push(parent);
        }
        Ok(chain)
    }

    /// Organization `resource` belongs to. An organization scope is its own
    /// organization; the global scope has none.
    pub async fn organization_of<R: Resource>(&self, resource: &R) -> Result<Scope, IamError> {
        let start = if resource.resource_type() == ResourceType::Scope {
            self.scope(resource.public_id()).await?
        } else {
            self.scope_of(resource).await?.ok_or_else(|| {
                IamError::invalid(format!("error {} has no scope", resource.public_id()))
            })?
        };
        if start.scope_type == ScopeType::Organization {
            return Ok(start);
        }
        self.ancestors(&start)
            .await?
            .into_iter()
            .find(|s| s.scope_type == ScopeType::Organization)
            .ok_or_else(|| {
                IamError::invalid(format!(
                    "error {} does not belong to an organization",
                    resource.public_id()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthMethod, AuthMethodType, Host, HostCatalog, User};
    use crate::services::store::{MemoryStore, Writer};

    struct Tree {
        store: MemoryStore,
        global: Scope,
        org: Scope,
        prj: Scope,
    }

    async fn tree() -> Tree {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let global = tx.insert_scope(&Scope::global()).await.unwrap();
        let org = tx
            .insert_scope(&Scope::new_organization().with_public_id("o_1"))
            .await
            .unwrap();
        let prj = tx
            .insert_scope(&Scope::new_project("o_1").unwrap().with_public_id("p_1"))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        Tree {
            store,
            global,
            org,
            prj,
        }
    }

    #[tokio::test]
    async fn test_project_ancestors_are_org_then_global() {
        let t = tree().await;
        let resolver = ScopeResolver::new(&t.store);
        let chain = resolver.ancestors(&t.prj).await.unwrap();
        assert_eq!(chain, vec![t.org.clone(), t.global.clone()]);
        assert!(resolver.ancestors(&t.global).await.unwrap().is_empty());
        assert_eq!(resolver.parent_of(&t.global).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scope_of_follows_each_parent_ref_kind() {
        let t = tree().await;
        let mut tx = t.store.begin().await.unwrap();
        let catalog = tx
            .insert_host_catalog(&HostCatalog::new("p_1").unwrap().with_public_id("hc_1"))
            .await
            .unwrap();
        let host = tx
            .insert_host(&Host::new(&catalog.public_id, "10.0.0.1").unwrap().with_public_id("h_1"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let resolver = ScopeResolver::new(&t.store);
        let user = User::new("o_1").unwrap().with_public_id("u_1");
        let meth = AuthMethod::new(Some(&t.org), AuthMethodType::UserPass).unwrap();

        assert_eq!(resolver.scope_of(&user).await.unwrap(), Some(t.org.clone()));
        assert_eq!(resolver.scope_of(&meth).await.unwrap(), Some(t.org.clone()));
        assert_eq!(resolver.scope_of(&host).await.unwrap(), Some(t.prj.clone()));
        assert_eq!(resolver.scope_of(&t.global).await.unwrap(), None);
        assert_eq!(resolver.organization_of(&host).await.unwrap(), t.org);
    }

    #[tokio::test]
    async fn test_organization_of_scopes() {
        let t = tree().await;
        let resolver = ScopeResolver::new(&t.store);
        assert_eq!(resolver.organization_of(&t.org).await.unwrap(), t.org);
        assert_eq!(resolver.organization_of(&t.prj).await.unwrap(), t.org);
        assert!(matches!(
            resolver.organization_of(&t.global).await,
            Err(IamError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_dangling_parent_is_not_found() {
        let t = tree().await;
        let resolver = ScopeResolver::new(&t.store);
        let orphan = User::new("o_missing").unwrap();
        assert!(matches!(
            resolver.scope_of(&orphan).await,
            Err(IamError::NotFound(_))
        ));
    }
}
