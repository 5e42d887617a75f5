//! Bounded retry for public id collisions.
//!
//! A collision on a freshly generated public id is the only failure worth
//! retrying: the next attempt draws a new id. Every other error is returned
//! as is.

use std::future::Future;

use tracing::{info, warn};

use crate::services::error::IamError;

/// Configuration for retry behavior.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

impl RetryConfig {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn no_retry() -> Self {
        Self { max_retries: 0 }
    }
}

/// Run `f` until it succeeds, fails with anything other than a public id
/// collision, or runs out of retries. `f` receives the zero-based attempt
/// number and must allocate a fresh public id on every call.
///
/// ```ignore
/// let created = retry_on_collision(&RetryConfig::default(), "create_user", |_| {
///     repo.create_user(&user)
/// })
/// .await?;
/// ```
pub async fn retry_on_collision<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T, IamError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, IamError>>,
{
    let mut attempt = 0;

    loop {
        match f(attempt).await {
            Ok(result) => {
                if attempt > 0 {
                    info!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "Create succeeded after public id collision"
                    );
                }
                return Ok(result);
            }
            Err(err) if err.is_public_id_collision() => {
                if attempt >= config.max_retries {
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        error = %err,
                        "Public id collision persisted after max retries"
                    );
                    return Err(err);
                }
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    error = %err,
                    "Public id collision, retrying with a new id"
                );
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
