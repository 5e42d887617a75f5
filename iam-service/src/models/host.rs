//! Static host catalogs and the hosts they contain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::resource::{ParentRef, Resource, ResourceType};
use crate::services::error::IamError;

pub const HOST_CATALOG_PREFIX: &str = "hc";
pub const HOST_PREFIX: &str = "h";

/// A catalog of statically configured hosts, owned by a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct HostCatalog {
    pub public_id: String,
    pub scope_id: String,
    #[validate(length(min = 1, max = 128))]
    pub name: Option<String>,
    #[validate(length(max = 1024))]
    pub description: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
}

impl HostCatalog {
    pub fn new(project_id: &str) -> Result<Self, IamError> {
        if project_id.is_empty() {
            return Err(IamError::invalid(
                "error project id is unset for new host catalog",
            ));
        }
        Ok(Self {
            public_id: String::new(),
            scope_id: project_id.to_string(),
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

impl Resource for HostCatalog {
    fn resource_type(&self) -> ResourceType {
        ResourceType::HostCatalog
    }

    fn public_id(&self) -> &str {
        &self.public_id
    }

    fn parent_ref(&self) -> ParentRef<'_> {
        ParentRef::Scope(&self.scope_id)
    }
}

/// A host reachable at a fixed address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Host {
    pub public_id: String,
    pub catalog_id: String,
    #[validate(length(min = 1, max = 255))]
    pub address: String,
    #[validate(length(min = 1, max = 128))]
    pub name: Option<String>,
    #[validate(length(max = 1024))]
    pub description: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
}

impl Host {
    pub fn new(catalog_id: &str, address: impl Into<String>) -> Result<Self, IamError> {
        if catalog_id.is_empty() {
            return Err(IamError::invalid("error catalog id is unset for new host"));
        }
        Ok(Self {
            public_id: String::new(),
            catalog_id: catalog_id.to_string(),
            address: address.into(),
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
}

impl Resource for Host {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Host
    }

    fn public_id(&self) -> &str {
        &self.public_id
    }

    fn parent_ref(&self) -> ParentRef<'_> {
        ParentRef::Catalog(&self.catalog_id)
    }
}
