use service_core::error::AppError;
use thiserror::Error;

/// Failures raised by a store implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unique constraint {constraint} violated")]
    UniqueViolation { constraint: String },

    #[error("foreign key constraint {constraint} violated")]
    ForeignKeyViolation { constraint: String },

    #[error("store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            match db_err.code().as_deref() {
                Some("23505") => return StoreError::UniqueViolation { constraint },
                Some("23503") => return StoreError::ForeignKeyViolation { constraint },
                _ => {}
            }
        }
        StoreError::Backend(anyhow::Error::new(err))
    }
}

#[derive(Error, Debug)]
pub enum IamError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    AlreadyExists { field: &'static str, message: String },

    #[error("public id allocation failed: {0}")]
    Allocation(anyhow::Error),

    #[error("secret wrapping failed: {0}")]
    Wrapping(anyhow::Error),

    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl IamError {
    pub fn invalid(message: impl Into<String>) -> Self {
        IamError::InvalidArgument(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        IamError::NotFound(message.into())
    }

    /// True when regenerating the public id and retrying could succeed.
    pub fn is_public_id_collision(&self) -> bool {
        matches!(self, IamError::AlreadyExists { field: "public_id", .. })
    }
}

/// Column a unique constraint protects, derived from the constraint naming
/// convention shared by the migrations and the in-memory store.
fn conflict_field(constraint: &str) -> &'static str {
    if constraint == "scope_global_uq" {
        "type"
    } else if constraint.ends_with("public_id_uq") {
        "public_id"
    } else if constraint.ends_with("friendly_name_uq") {
        "friendly_name"
    } else if constraint.ends_with("name_uq") {
        "name"
    } else {
        "unknown"
    }
}

impl From<StoreError> for IamError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { constraint } => {
                let field = conflict_field(&constraint);
                IamError::AlreadyExists {
                    field,
                    message: format!("error {} already exists ({})", field, constraint),
                }
            }
            StoreError::ForeignKeyViolation { constraint } => IamError::InvalidArgument(format!(
                "error referenced resource missing or still referenced ({})",
                constraint
            )),
            other => {
                tracing::error!(error = %other, "Store operation failed");
                IamError::Storage(other)
            }
        }
    }
}

impl From<validator::ValidationErrors> for IamError {
    fn from(err: validator::ValidationErrors) -> Self {
        IamError::InvalidArgument(format!("error invalid fields: {}", err))
    }
}

impl From<IamError> for AppError {
    fn from(err: IamError) -> Self {
        match err {
            IamError::InvalidArgument(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            IamError::NotFound(e) => AppError::NotFound(anyhow::anyhow!(e)),
            IamError::AlreadyExists { message, .. } => AppError::Conflict(anyhow::anyhow!(message)),
            IamError::Allocation(e) => AppError::InternalError(e),
            IamError::Wrapping(e) => AppError::InternalError(e),
            IamError::Storage(e) => AppError::DatabaseError(anyhow::Error::new(e)),
        }
    }
}
