//! Repository against a live PostgreSQL store.
//!
//! Set TEST_DATABASE_URL to run these.

use std::sync::Arc;

use iam_service::config::DatabaseConfig;
use iam_service::db;
use iam_service::models::{AuthMethod, AuthMethodType, Scope, User, GLOBAL_SCOPE_ID};
use iam_service::services::{AeadWrapper, IamError, PgStore, Repository};

async fn setup() -> Repository {
    dotenvy::dotenv().ok();
    let url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost:5432/iam_test".to_string());
    let pool = db::create_pool(&DatabaseConfig {
        url,
        max_connections: 5,
        min_connections: 1,
    })
    .await
    .expect("Failed to connect to test database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let store = Arc::new(PgStore::new(pool));
    Repository::new(
        store.clone(),
        store,
        Arc::new(AeadWrapper::generate("test-key")),
    )
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_scope_tree_round_trip() {
    // Arrange
    let repo = setup().await;
    let global = repo.ensure_global_scope().await.unwrap();

    // Act
    let org = repo
        .create_scope(&Scope::new_organization())
        .await
        .unwrap();
    let prj = repo
        .create_scope(&Scope::new_project(&org.public_id).unwrap())
        .await
        .unwrap();

    // Assert
    assert_eq!(global.public_id, GLOBAL_SCOPE_ID);
    assert_eq!(repo.lookup_scope(&prj.public_id).await.unwrap(), prj);
    let ancestors = repo.resolver().ancestors(&prj).await.unwrap();
    assert_eq!(ancestors.len(), 2);

    assert_eq!(repo.delete_scope(&prj.public_id).await.unwrap(), 1);
    assert_eq!(repo.delete_scope(&org.public_id).await.unwrap(), 1);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_project_under_global_is_rejected() {
    let repo = setup().await;
    repo.ensure_global_scope().await.unwrap();

    let err = repo
        .create_scope(&Scope::new_project(GLOBAL_SCOPE_ID).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, IamError::InvalidArgument(_)));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_auth_method_primary_scope() {
    let repo = setup().await;
    repo.ensure_global_scope().await.unwrap();
    let org = repo
        .create_scope(&Scope::new_organization())
        .await
        .unwrap();

    let meth = AuthMethod::new(Some(&org), AuthMethodType::UserPass).unwrap();
    let created = repo.create_auth_method(&meth).await.unwrap();
    let primary = created.primary_scope(repo.reader()).await.unwrap();

    assert_eq!(created.method_type, AuthMethodType::UserPass);
    assert_eq!(primary.public_id, org.public_id);

    repo.delete_auth_method(&created.public_id).await.unwrap();
    repo.delete_scope(&org.public_id).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_duplicate_public_id_maps_to_collision() {
    let repo = setup().await;
    repo.ensure_global_scope().await.unwrap();
    let org = repo
        .create_scope(&Scope::new_organization())
        .await
        .unwrap();
    let user = repo
        .create_user(&User::new(&org.public_id).unwrap())
        .await
        .unwrap();

    let err = repo
        .create_user(&User::new(&org.public_id).unwrap().with_public_id(&user.public_id))
        .await
        .unwrap_err();

    assert!(err.is_public_id_collision());

    repo.delete_user(&user.public_id).await.unwrap();
    repo.delete_scope(&org.public_id).await.unwrap();
}
