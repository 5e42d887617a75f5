use iam_service::{
    config::IamConfig,
    db,
    services::{AeadWrapper, IamError, PgStore, Repository, SecretWrapper},
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = IamConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.common.log_level,
        config.common.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting IAM service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let wrapper: Arc<dyn SecretWrapper> = match &config.wrapper.key {
        Some(key) => Arc::new(AeadWrapper::from_encoded_key(
            &config.wrapper.key_id,
            key.expose_secret(),
        )?),
        None => {
            tracing::warn!(
                key_id = %config.wrapper.key_id,
                "WRAPPER_KEY not set, sealing with an ephemeral key"
            );
            Arc::new(AeadWrapper::generate(&config.wrapper.key_id))
        }
    };

    let store = Arc::new(PgStore::new(pool));
    let repo = Repository::new(store.clone(), store, wrapper);

    let global = repo.ensure_global_scope().await.map_err(|e: IamError| {
        tracing::error!(error = %e, "Failed to bootstrap global scope");
        AppError::from(e)
    })?;

    tracing::info!(
        scope_id = %global.public_id,
        collision_retries = config.ids.collision_retries,
        "IAM store ready"
    );

    Ok(())
}
