//! Fixture builders for iam-service integration tests.
//!
//! Every builder takes the repository it writes through, so tests can point
//! them at any store. `test_repo` wires one over a fresh in-memory store.

#![allow(dead_code)]

use std::sync::Arc;

use iam_service::models::{
    AuthMethod, AuthMethodType, Group, Host, HostCatalog, Scope, User,
};
use iam_service::services::{
    id::new_public_id, AeadWrapper, IdAllocator, MemoryStore, Repository,
};

/// Repository over `store` with a throwaway wrapper key.
pub fn repo_for(store: &MemoryStore) -> Repository {
    Repository::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(AeadWrapper::generate("test-key")),
    )
}

/// Repository over `store` drawing public ids from `ids`.
pub fn repo_with_ids(store: &MemoryStore, ids: Arc<dyn IdAllocator>) -> Repository {
    repo_for(store).with_id_allocator(ids)
}

/// Fresh store and a repository over it.
pub fn test_repo() -> (MemoryStore, Repository) {
    let store = MemoryStore::new();
    let repo = repo_for(&store);
    (store, repo)
}

pub fn test_public_id(prefix: &str) -> String {
    new_public_id(prefix).expect("Failed to allocate public id")
}

pub async fn test_global(repo: &Repository) -> Scope {
    repo.ensure_global_scope()
        .await
        .expect("Failed to create global scope")
}

pub async fn test_org(repo: &Repository, name: &str, description: &str) -> Scope {
    test_global(repo).await;
    repo.create_scope(
        &Scope::new_organization()
            .with_name(name)
            .with_description(description),
    )
    .await
    .expect("Failed to create organization")
}

/// A new organization and a project inside it.
pub async fn test_scopes(repo: &Repository) -> (Scope, Scope) {
    test_global(repo).await;
    let org = repo
        .create_scope(&Scope::new_organization())
        .await
        .expect("Failed to create organization");
    let prj = repo
        .create_scope(&Scope::new_project(&org.public_id).expect("Failed to build project"))
        .await
        .expect("Failed to create project");
    (org, prj)
}

pub async fn test_user(repo: &Repository, org_id: &str) -> User {
    repo.create_user(&User::new(org_id).expect("Failed to build user"))
        .await
        .expect("Failed to create user")
}

pub async fn test_group(repo: &Repository, org_id: &str) -> Group {
    repo.create_group(&Group::new(org_id).expect("Failed to build group"))
        .await
        .expect("Failed to create group")
}

pub async fn test_auth_method(repo: &Repository, org: &Scope) -> AuthMethod {
    let meth =
        AuthMethod::new(Some(org), AuthMethodType::UserPass).expect("Failed to build auth method");
    repo.create_auth_method(&meth)
        .await
        .expect("Failed to create auth method")
}

pub async fn test_catalogs(repo: &Repository, project_id: &str, count: usize) -> Vec<HostCatalog> {
    let mut catalogs = Vec::with_capacity(count);
    for _ in 0..count {
        let catalog = repo
            .create_host_catalog(&HostCatalog::new(project_id).expect("Failed to build catalog"))
            .await
            .expect("Failed to create host catalog");
        catalogs.push(catalog);
    }
    catalogs
}

pub async fn test_hosts(repo: &Repository, catalog_id: &str, count: usize) -> Vec<Host> {
    let mut hosts = Vec::with_capacity(count);
    for i in 0..count {
        let address = format!("10.0.0.{}", i + 1);
        let host = repo
            .create_host(&Host::new(catalog_id, address).expect("Failed to build host"))
            .await
            .expect("Failed to create host");
        hosts.push(host);
    }
    hosts
}
