//! Scope hierarchy integration tests.

mod common;

use common::{test_global, test_org, test_repo, test_scopes, test_user};
use iam_service::models::{Entity, Resource, ResourceType, Scope, ScopeType, GLOBAL_SCOPE_ID};
use iam_service::services::IamError;

#[tokio::test]
async fn ensure_global_scope_is_idempotent() {
    let (_store, repo) = test_repo();

    let first = repo.ensure_global_scope().await.unwrap();
    let second = repo.ensure_global_scope().await.unwrap();

    assert_eq!(first.public_id, GLOBAL_SCOPE_ID);
    assert_eq!(first, second);
    assert!(first.parent_id.is_none());
    assert!(first.create_time.is_some());
}

#[tokio::test]
async fn second_global_scope_is_rejected() {
    let (_store, repo) = test_repo();
    test_global(&repo).await;

    let err = repo.create_scope(&Scope::global()).await.unwrap_err();

    assert!(matches!(err, IamError::AlreadyExists { field: "type", .. }));
    assert!(!err.is_public_id_collision());
}

#[tokio::test]
async fn create_organization_and_project() {
    // Arrange
    let (_store, repo) = test_repo();
    test_global(&repo).await;

    // Act
    let org = repo
        .create_scope(&Scope::new_organization().with_name("Acme"))
        .await
        .unwrap();
    let prj = repo
        .create_scope(&Scope::new_project(&org.public_id).unwrap().with_name("web"))
        .await
        .unwrap();

    // Assert
    assert_eq!(org.scope_type, ScopeType::Organization);
    assert!(org.public_id.starts_with("o_"));
    assert_eq!(org.parent_id.as_deref(), Some(GLOBAL_SCOPE_ID));
    assert!(org.is_persisted());

    assert_eq!(prj.scope_type, ScopeType::Project);
    assert!(prj.public_id.starts_with("p_"));
    assert_eq!(prj.parent_id.as_deref(), Some(org.public_id.as_str()));
    assert_eq!(repo.lookup_scope(&prj.public_id).await.unwrap(), prj);
}

#[tokio::test]
async fn invalid_parent_combinations_are_rejected() {
    let (_store, repo) = test_repo();
    let (org, prj) = test_scopes(&repo).await;

    // Project directly under global.
    let err = repo
        .create_scope(&Scope::new_project(GLOBAL_SCOPE_ID).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, IamError::InvalidArgument(_)));

    // Project under a project.
    let err = repo
        .create_scope(&Scope::new_project(&prj.public_id).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, IamError::InvalidArgument(_)));

    // Organization under an organization.
    let mut nested = Scope::new_organization();
    nested.parent_id = Some(org.public_id.clone());
    let err = repo.create_scope(&nested).await.unwrap_err();
    assert!(matches!(err, IamError::InvalidArgument(_)));

    // Global with a parent.
    let mut global = Scope::global();
    global.parent_id = Some(org.public_id.clone());
    let err = repo.create_scope(&global).await.unwrap_err();
    assert!(matches!(err, IamError::InvalidArgument(_)));

    // Organization without a parent.
    let mut orphan = Scope::new_organization();
    orphan.parent_id = None;
    let err = repo.create_scope(&orphan).await.unwrap_err();
    assert!(matches!(err, IamError::InvalidArgument(_)));
}

#[tokio::test]
async fn project_with_missing_parent_is_rejected() {
    let (_store, repo) = test_repo();
    test_global(&repo).await;

    let err = repo
        .create_scope(&Scope::new_project("o_doesnotexist").unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, IamError::InvalidArgument(_)));
    assert!(repo.list_scopes("o_doesnotexist").await.unwrap().is_empty());
}

#[tokio::test]
async fn organization_requires_global_scope() {
    let (_store, repo) = test_repo();

    let err = repo
        .create_scope(&Scope::new_organization())
        .await
        .unwrap_err();

    assert!(matches!(err, IamError::InvalidArgument(_)));
}

#[tokio::test]
async fn sibling_names_are_unique() {
    let (_store, repo) = test_repo();
    let org = test_org(&repo, "Acme", "first").await;

    let err = repo
        .create_scope(&Scope::new_organization().with_name("Acme"))
        .await
        .unwrap_err();
    assert!(matches!(err, IamError::AlreadyExists { field: "name", .. }));
    assert!(!err.is_public_id_collision());

    // Same name under a different parent is fine.
    let prj = repo
        .create_scope(&Scope::new_project(&org.public_id).unwrap().with_name("Acme"))
        .await
        .unwrap();
    assert_eq!(prj.name.as_deref(), Some("Acme"));
}

#[tokio::test]
async fn explicit_public_id_must_match_type_prefix() {
    let (_store, repo) = test_repo();
    test_global(&repo).await;

    let err = repo
        .create_scope(&Scope::new_organization().with_public_id("p_1234"))
        .await
        .unwrap_err();
    assert!(matches!(err, IamError::InvalidArgument(_)));

    let org = repo
        .create_scope(&Scope::new_organization().with_public_id("o_1234"))
        .await
        .unwrap();
    assert_eq!(org.public_id, "o_1234");
}

#[tokio::test]
async fn update_scope_applies_field_mask_only() {
    // Arrange
    let (_store, repo) = test_repo();
    let org = test_org(&repo, "Acme", "original").await;

    // Act
    let mut changed = org.clone().with_name("Acme Corp").with_description("changed");
    changed.parent_id = Some("o_elsewhere".to_string());
    let (updated, count) = repo.update_scope(&changed, &["name"]).await.unwrap();

    // Assert
    assert_eq!(count, 1);
    assert_eq!(updated.name.as_deref(), Some("Acme Corp"));
    assert_eq!(updated.description.as_deref(), Some("original"));
    assert_eq!(updated.parent_id.as_deref(), Some(GLOBAL_SCOPE_ID));
    assert_eq!(updated.id, org.id);
    assert_eq!(repo.lookup_scope(&org.public_id).await.unwrap(), updated);
}

#[tokio::test]
async fn update_scope_rejects_bad_masks_and_missing_rows() {
    let (_store, repo) = test_repo();
    let org = test_org(&repo, "Acme", "").await;

    let err = repo.update_scope(&org, &[]).await.unwrap_err();
    assert!(matches!(err, IamError::InvalidArgument(_)));

    let err = repo.update_scope(&org, &["parent_id"]).await.unwrap_err();
    assert!(matches!(err, IamError::InvalidArgument(_)));

    let missing = Scope::new_organization().with_public_id("o_missing");
    let err = repo.update_scope(&missing, &["name"]).await.unwrap_err();
    assert!(matches!(err, IamError::NotFound(_)));
}

#[tokio::test]
async fn delete_scope_rules() {
    let (_store, repo) = test_repo();
    let (org, prj) = test_scopes(&repo).await;

    let err = repo.delete_scope(GLOBAL_SCOPE_ID).await.unwrap_err();
    assert!(matches!(err, IamError::InvalidArgument(_)));

    // Organization still owns the project.
    let err = repo.delete_scope(&org.public_id).await.unwrap_err();
    assert!(matches!(err, IamError::InvalidArgument(_)));

    assert_eq!(repo.delete_scope(&prj.public_id).await.unwrap(), 1);
    assert_eq!(repo.delete_scope(&prj.public_id).await.unwrap(), 0);

    // Organization still owns a user.
    let user = test_user(&repo, &org.public_id).await;
    assert!(repo.delete_scope(&org.public_id).await.is_err());
    assert_eq!(repo.delete_user(&user.public_id).await.unwrap(), 1);
    assert_eq!(repo.delete_scope(&org.public_id).await.unwrap(), 1);

    let err = repo.lookup_scope(&org.public_id).await.unwrap_err();
    assert!(matches!(err, IamError::NotFound(_)));
}

#[tokio::test]
async fn list_scopes_returns_direct_children() {
    let (_store, repo) = test_repo();
    let (org, prj) = test_scopes(&repo).await;
    let other = test_org(&repo, "Other", "").await;

    let orgs = repo.list_scopes(GLOBAL_SCOPE_ID).await.unwrap();
    let projects = repo.list_scopes(&org.public_id).await.unwrap();

    assert_eq!(orgs.len(), 2);
    assert!(orgs.iter().any(|s| s.public_id == other.public_id));
    assert_eq!(projects, vec![prj]);
}

#[tokio::test]
async fn lookup_dispatches_on_prefix() {
    let (_store, repo) = test_repo();
    let (org, prj) = test_scopes(&repo).await;

    let entity = repo.lookup(&prj.public_id).await.unwrap();
    assert_eq!(entity.resource_type(), ResourceType::Scope);
    assert_eq!(entity, Entity::Scope(prj));

    let global = repo.lookup(GLOBAL_SCOPE_ID).await.unwrap();
    assert_eq!(global.public_id(), GLOBAL_SCOPE_ID);

    let err = repo.lookup("zz_123").await.unwrap_err();
    assert!(matches!(err, IamError::InvalidArgument(_)));

    let missing = format!("{}x", org.public_id);
    let err = repo.lookup(&missing).await.unwrap_err();
    assert!(matches!(err, IamError::NotFound(_)));
}

#[tokio::test]
async fn project_ancestors_are_organization_then_global() {
    let (_store, repo) = test_repo();
    let (org, prj) = test_scopes(&repo).await;

    let resolver = repo.resolver();
    let ancestors = resolver.ancestors(&prj).await.unwrap();

    let ids: Vec<&str> = ancestors.iter().map(|s| s.public_id.as_str()).collect();
    assert_eq!(ids, vec![org.public_id.as_str(), GLOBAL_SCOPE_ID]);
    assert_eq!(resolver.organization_of(&prj).await.unwrap(), org);
}
