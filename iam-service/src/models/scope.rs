//! Scope model - administrative boundaries (global → organization → project).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::resource::{ParentRef, Resource, ResourceType};
use crate::services::error::IamError;

/// Public id of the single global scope.
pub const GLOBAL_SCOPE_ID: &str = "global";
pub const ORGANIZATION_PREFIX: &str = "o";
pub const PROJECT_PREFIX: &str = "p";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
    Global,
    Organization,
    Project,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::Global => "global",
            ScopeType::Organization => "organization",
            ScopeType::Project => "project",
        }
    }

    /// Public id prefix for scopes of this type. The global scope has a
    /// fixed id instead.
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            ScopeType::Global => None,
            ScopeType::Organization => Some(ORGANIZATION_PREFIX),
            ScopeType::Project => Some(PROJECT_PREFIX),
        }
    }

    /// Type a parent of this scope type must have.
    pub fn parent_type(&self) -> Option<ScopeType> {
        match self {
            ScopeType::Global => None,
            ScopeType::Organization => Some(ScopeType::Global),
            ScopeType::Project => Some(ScopeType::Organization),
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(ScopeType::Global),
            "organization" => Ok(ScopeType::Organization),
            "project" => Ok(ScopeType::Project),
            _ => Err(format!("Invalid scope type: {}", s)),
        }
    }
}

/// Scope entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Scope {
    /// Store row id, zero until persisted.
    #[serde(default)]
    pub id: i64,
    pub public_id: String,
    #[serde(rename = "type")]
    pub scope_type: ScopeType,
    pub parent_id: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub name: Option<String>,
    #[validate(length(max = 1024))]
    pub description: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
}

impl Scope {
    fn with_type(scope_type: ScopeType, parent_id: Option<String>) -> Self {
        Self {
            id: 0,
            public_id: String::new(),
            scope_type,
            parent_id,
            name: None,
            description: None,
            create_time: None,
            update_time: None,
        }
    }

    /// The global scope. Its public id is fixed.
    pub fn global() -> Self {
        let mut scope = Self::with_type(ScopeType::Global, None);
        scope.public_id = GLOBAL_SCOPE_ID.to_string();
        scope
    }

    /// A new organization under the global scope.
    pub fn new_organization() -> Self {
        Self::with_type(
            ScopeType::Organization,
            Some(GLOBAL_SCOPE_ID.to_string()),
        )
    }

    /// A new project under the given organization.
    pub fn new_project(organization_id: &str) -> Result<Self, IamError> {
        if organization_id.is_empty() {
            return Err(IamError::invalid(
                "error organization id is unset for new project",
            ));
        }
        Ok(Self::with_type(
            ScopeType::Project,
            Some(organization_id.to_string()),
        ))
    }

    pub fn with_public_id(mut self, public_id: impl Into<String>) -> Self {
        self.public_id = public_id.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_global(&self) -> bool {
        self.scope_type == ScopeType::Global
    }

    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }
}

impl Resource for Scope {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Scope
    }

    fn public_id(&self) -> &str {
        &self.public_id
    }

    fn parent_ref(&self) -> ParentRef<'_> {
        match &self.parent_id {
            Some(parent) => ParentRef::Scope(parent),
            None => ParentRef::Root,
        }
    }
}
