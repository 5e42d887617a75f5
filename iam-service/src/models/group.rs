//! Group model - organization-scoped collections of principals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::resource::{ParentRef, Resource, ResourceType};
use crate::services::error::IamError;

pub const GROUP_PREFIX: &str = "g";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Group {
    pub public_id: String,
    pub scope_id: String,
    #[validate(length(min = 1, max = 128))]
    pub name: Option<String>,
    #[validate(length(max = 1024))]
    pub description: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
}

impl Group {
    pub fn new(organization_id: &str) -> Result<Self, IamError> {
        if organization_id.is_empty() {
            return Err(IamError::invalid(
                "error organization id is unset for new group",
            ));
        }
        Ok(Self {
            public_id: String::new(),
            scope_id: organization_id.to_string(),
            name: None,
            description: None,
            create_time: None,
            update_time: None,
        })
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
}

impl Resource for Group {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Group
    }

    fn public_id(&self) -> &str {
        &self.public_id
    }

    fn parent_ref(&self) -> ParentRef<'_> {
        ParentRef::Scope(&self.scope_id)
    }
}
