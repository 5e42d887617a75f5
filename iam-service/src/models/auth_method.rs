//! Auth method model - authentication mechanisms attached to an organization.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::resource::{action_set, Action, ParentRef, Resource, ResourceType};
use super::scope::{Scope, ScopeType};
use crate::services::error::IamError;
use crate::services::store::Reader;

pub const AUTH_METHOD_PREFIX: &str = "am";

/// Kind of authentication mechanism. Immutable once persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthMethodType {
    UserPass,
}

impl AuthMethodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethodType::UserPass => "UserPass",
        }
    }
}

impl fmt::Display for AuthMethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMethodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UserPass" => Ok(AuthMethodType::UserPass),
            _ => Err(format!("Invalid auth method type: {}", s)),
        }
    }
}

/// Auth method entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AuthMethod {
    #[serde(default)]
    pub id: i64,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
    pub public_id: String,
    #[validate(length(min = 1, max = 128))]
    pub friendly_name: Option<String>,
    /// Row id of the organization scope this method authenticates for.
    pub primary_scope_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_scope: Option<Scope>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(rename = "type")]
    pub method_type: AuthMethodType,
}

impl AuthMethod {
    /// Create a new, unpersisted auth method for a persisted organization.
    pub fn new(scope: Option<&Scope>, method_type: AuthMethodType) -> Result<Self, IamError> {
        let scope =
            scope.ok_or_else(|| IamError::invalid("error scope is nil for new auth method"))?;
        if !scope.is_persisted() {
            return Err(IamError::invalid(
                "error scope is not persisted for new auth method",
            ));
        }
        if scope.scope_type != ScopeType::Organization {
            return Err(IamError::invalid(format!(
                "error auth method primary scope must be an organization, got {}",
                scope.scope_type
            )));
        }
        Ok(Self {
            id: 0,
            create_time: None,
            update_time: None,
            public_id: String::new(),
            friendly_name: None,
            primary_scope_id: scope.id,
            primary_scope: None,
            disabled: false,
            method_type,
        })
    }

    pub fn with_public_id(mut self, public_id: impl Into<String>) -> Self {
        self.public_id = public_id.into();
        self
    }

    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.friendly_name = Some(name.into());
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Resolve the organization this method is attached to through `reader`.
    pub async fn primary_scope(&self, reader: &dyn Reader) -> Result<Scope, IamError> {
        if self.primary_scope_id == 0 {
            return Err(IamError::invalid("error primary scope id is unset"));
        }
        reader
            .find_scope_by_row_id(self.primary_scope_id)
            .await?
            .ok_or_else(|| {
                IamError::not_found(format!(
                    "primary scope {} not found for auth method {}",
                    self.primary_scope_id, self.public_id
                ))
            })
    }
}

impl Resource for AuthMethod {
    fn resource_type(&self) -> ResourceType {
        ResourceType::AuthMethod
    }

    fn actions(&self) -> HashMap<String, Action> {
        action_set(&[
            Action::List,
            Action::Create,
            Action::Update,
            Action::Edit,
            Action::Delete,
        ])
    }

    fn public_id(&self) -> &str {
        &self.public_id
    }

    fn parent_ref(&self) -> ParentRef<'_> {
        ParentRef::ScopeRow(self.primary_scope_id)
    }
}
