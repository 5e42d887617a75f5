pub mod account;
pub mod auth_method;
pub mod group;
pub mod host;
pub mod resource;
pub mod scope;
pub mod user;

pub use account::{PasswordAccountAttributes, ResponseEnvelope};
pub use auth_method::{AuthMethod, AuthMethodType};
pub use group::Group;
pub use host::{Host, HostCatalog};
pub use resource::{Action, Entity, ParentRef, Resource, ResourceType};
pub use scope::{Scope, ScopeType, GLOBAL_SCOPE_ID};
pub use user::User;
