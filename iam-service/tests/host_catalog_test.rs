mod common;

use common::{test_catalogs, test_hosts, test_org, test_repo, test_scopes};
use iam_service::models::{Host, HostCatalog, Resource, ResourceType, Scope};
use iam_service::services::IamError;

#[tokio::test]
async fn catalogs_live_in_projects() {
    // Arrange
    let (_store, repo) = test_repo();
    let (org, prj) = test_scopes(&repo).await;

    // Act
    let catalogs = test_catalogs(&repo, &prj.public_id, 3).await;

    // Assert
    assert_eq!(catalogs.len(), 3);
    for catalog in &catalogs {
        assert!(catalog.public_id.starts_with("hc_"));
        assert_eq!(catalog.scope_id, prj.public_id);
    }
    assert_eq!(repo.list_host_catalogs(&prj.public_id).await.unwrap().len(), 3);

    let err = repo
        .create_host_catalog(&HostCatalog::new(&org.public_id).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, IamError::InvalidArgument(_)));
}

#[tokio::test]
async fn catalog_names_are_unique_per_project() {
    let (_store, repo) = test_repo();
    let (_org, prj) = test_scopes(&repo).await;
    let named = HostCatalog::new(&prj.public_id).unwrap().with_name("static");

    repo.create_host_catalog(&named).await.unwrap();
    let err = repo.create_host_catalog(&named).await.unwrap_err();

    assert!(matches!(err, IamError::AlreadyExists { field: "name", .. }));
}

#[tokio::test]
async fn hosts_belong_to_existing_catalogs() {
    let (_store, repo) = test_repo();
    let (org, prj) = test_scopes(&repo).await;
    let catalog = test_catalogs(&repo, &prj.public_id, 1).await.remove(0);

    let hosts = test_hosts(&repo, &catalog.public_id, 2).await;
    assert!(hosts.iter().all(|h| h.public_id.starts_with("h_")));
    let mut listed = repo.list_hosts(&catalog.public_id).await.unwrap();
    listed.sort_by(|a, b| a.address.cmp(&b.address));
    assert_eq!(listed, hosts);

    let err = repo
        .create_host(&Host::new("hc_missing", "10.1.1.1").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, IamError::InvalidArgument(_)));

    // A host resolves to its catalog's project, then up to the organization.
    let resolver = repo.resolver();
    assert_eq!(resolver.scope_of(&hosts[0]).await.unwrap(), Some(prj));
    assert_eq!(resolver.organization_of(&hosts[0]).await.unwrap(), org);
}

#[tokio::test]
async fn catalog_with_hosts_cannot_be_deleted() {
    let (_store, repo) = test_repo();
    let (_org, prj) = test_scopes(&repo).await;
    let catalog = test_catalogs(&repo, &prj.public_id, 1).await.remove(0);
    let hosts = test_hosts(&repo, &catalog.public_id, 1).await;

    let err = repo.delete_host_catalog(&catalog.public_id).await.unwrap_err();
    assert!(matches!(err, IamError::InvalidArgument(_)));

    // Project still owns the catalog.
    assert!(repo.delete_scope(&prj.public_id).await.is_err());

    assert_eq!(repo.delete_host(&hosts[0].public_id).await.unwrap(), 1);
    assert_eq!(repo.delete_host_catalog(&catalog.public_id).await.unwrap(), 1);
    assert_eq!(repo.delete_scope(&prj.public_id).await.unwrap(), 1);
}

#[tokio::test]
async fn lookup_hosts_and_catalogs() {
    let (_store, repo) = test_repo();
    let (_org, prj) = test_scopes(&repo).await;
    let catalog = test_catalogs(&repo, &prj.public_id, 1).await.remove(0);
    let host = test_hosts(&repo, &catalog.public_id, 1).await.remove(0);

    let entity = repo.lookup(&catalog.public_id).await.unwrap();
    assert_eq!(entity.resource_type(), ResourceType::HostCatalog);

    let entity = repo.lookup(&host.public_id).await.unwrap();
    assert_eq!(entity.resource_type(), ResourceType::Host);
    assert_eq!(repo.lookup_host(&host.public_id).await.unwrap(), host);

    let err = repo.lookup_host_catalog("hc_missing").await.unwrap_err();
    assert!(matches!(err, IamError::NotFound(_)));
}

#[tokio::test]
async fn invalid_host_address_is_rejected() {
    let (_store, repo) = test_repo();
    let org = test_org(&repo, "Acme", "").await;
    let prj = repo
        .create_scope(&Scope::new_project(&org.public_id).unwrap())
        .await
        .unwrap();
    let catalog = test_catalogs(&repo, &prj.public_id, 1).await.remove(0);

    let err = repo
        .create_host(&Host::new(&catalog.public_id, "").unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, IamError::InvalidArgument(_)));
}
