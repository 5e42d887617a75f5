//! Capability set shared by every governed resource.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{AuthMethod, Group, Host, HostCatalog, Scope, User};
use crate::services::id::prefix_of;

/// Kind of governed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    Scope,
    User,
    Group,
    AuthMethod,
    HostCatalog,
    Host,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Scope => "scope",
            ResourceType::User => "user",
            ResourceType::Group => "group",
            ResourceType::AuthMethod => "auth-method",
            ResourceType::HostCatalog => "host-catalog",
            ResourceType::Host => "host",
        }
    }

    /// Infer the resource type from a public id's prefix.
    pub fn from_public_id(public_id: &str) -> Option<Self> {
        if public_id == super::scope::GLOBAL_SCOPE_ID {
            return Some(ResourceType::Scope);
        }
        match prefix_of(public_id)? {
            super::scope::ORGANIZATION_PREFIX | super::scope::PROJECT_PREFIX => {
                Some(ResourceType::Scope)
            }
            super::user::USER_PREFIX => Some(ResourceType::User),
            super::group::GROUP_PREFIX => Some(ResourceType::Group),
            super::auth_method::AUTH_METHOD_PREFIX => Some(ResourceType::AuthMethod),
            super::host::HOST_CATALOG_PREFIX => Some(ResourceType::HostCatalog),
            super::host::HOST_PREFIX => Some(ResourceType::Host),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Governance action applicable to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Edit,
    Delete,
    List,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::List => "list",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build an action map keyed by each action's own name.
pub fn action_set(actions: &[Action]) -> HashMap<String, Action> {
    actions
        .iter()
        .map(|action| (action.as_str().to_string(), *action))
        .collect()
}

/// Create, read, update, delete and list.
pub fn crud_actions() -> HashMap<String, Action> {
    action_set(&[
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::List,
    ])
}

/// What a resource points at to find its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRef<'a> {
    /// The global scope: nothing above it.
    Root,
    /// A scope by public id.
    Scope(&'a str),
    /// A scope by store row id.
    ScopeRow(i64),
    /// A host catalog by public id, which in turn lives in a scope.
    Catalog(&'a str),
}

/// Behaviour every governed resource exposes.
pub trait Resource: Clone + Send + Sync {
    fn resource_type(&self) -> ResourceType;

    fn actions(&self) -> HashMap<String, Action> {
        crud_actions()
    }

    fn public_id(&self) -> &str;

    fn parent_ref(&self) -> ParentRef<'_>;
}

/// Any governed resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Entity {
    Scope(Scope),
    User(User),
    Group(Group),
    AuthMethod(AuthMethod),
    HostCatalog(HostCatalog),
    Host(Host),
}

macro_rules! delegate {
    ($self:ident, $inner:ident => $call:expr) => {
        match $self {
            Entity::Scope($inner) => $call,
            Entity::User($inner) => $call,
            Entity::Group($inner) => $call,
            Entity::AuthMethod($inner) => $call,
            Entity::HostCatalog($inner) => $call,
            Entity::Host($inner) => $call,
        }
    };
}

impl Resource for Entity {
    fn resource_type(&self) -> ResourceType {
        delegate!(self, inner => inner.resource_type())
    }

    fn actions(&self) -> HashMap<String, Action> {
        delegate!(self, inner => inner.actions())
    }

    fn public_id(&self) -> &str {
        delegate!(self, inner => inner.public_id())
    }

    fn parent_ref(&self) -> ParentRef<'_> {
        delegate!(self, inner => inner.parent_ref())
    }
}

impl From<Scope> for Entity {
    fn from(v: Scope) -> Self {
        Entity::Scope(v)
    }
}

impl From<User> for Entity {
    fn from(v: User) -> Self {
        Entity::User(v)
    }
}

impl From<Group> for Entity {
    fn from(v: Group) -> Self {
        Entity::Group(v)
    }
}

impl From<AuthMethod> for Entity {
    fn from(v: AuthMethod) -> Self {
        Entity::AuthMethod(v)
    }
}

impl From<HostCatalog> for Entity {
    fn from(v: HostCatalog) -> Self {
        Entity::HostCatalog(v)
    }
}

impl From<Host> for Entity {
    fn from(v: Host) -> Self {
        Entity::Host(v)
    }
}
