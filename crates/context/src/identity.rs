//! Caller, application, session and component identities carried by an
//! invocation context.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use common::ComponentId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Describes the application that originated a call tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationInfo {
    name: String,
    version: String,
}

impl ApplicationInfo {
    /// Creates application info.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Returns the application name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the application version.
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Default for ApplicationInfo {
    fn default() -> Self {
        Self::new("unknown", "0.0.0")
    }
}

impl std::fmt::Display for ApplicationInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// Authenticated identity of a caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Creates a principal from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the principal name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolves the caller identity when a root invocation context is created.
pub trait PrincipalProvider: Send + Sync {
    /// Returns the principal of the current caller, if authenticated.
    fn current_principal(&self) -> Option<Principal>;
}

/// Provider for unauthenticated deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousPrincipalProvider;

impl PrincipalProvider for AnonymousPrincipalProvider {
    fn current_principal(&self) -> Option<Principal> {
        None
    }
}

/// Provider that always reports the same principal, e.g. a technical
/// scheduler user.
#[derive(Debug, Clone)]
pub struct StaticPrincipalProvider {
    principal: Principal,
}

impl StaticPrincipalProvider {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }
}

impl PrincipalProvider for StaticPrincipalProvider {
    fn current_principal(&self) -> Option<Principal> {
        Some(self.principal.clone())
    }
}

/// Session data shared by every call of one client session.
///
/// Cloning yields another handle to the same attributes.
#[derive(Debug, Clone)]
pub struct SessionContext {
    id: Uuid,
    attributes: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl SessionContext {
    /// Creates an empty session.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            attributes: Arc::default(),
        }
    }

    /// Returns the session ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns a copy of the attribute stored under `key`.
    pub fn attribute(&self, key: &str) -> Option<serde_json::Value> {
        self.attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Stores an attribute, replacing any previous value.
    pub fn set_attribute(&self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    /// Removes an attribute and returns its previous value.
    pub fn remove_attribute(&self, key: &str) -> Option<serde_json::Value> {
        self.attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of the component that owns a called service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRef {
    id: ComponentId,
    name: Arc<str>,
    resource_unit: Option<Arc<str>>,
}

impl ComponentRef {
    pub fn new(id: ComponentId, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            name: name.into(),
            resource_unit: None,
        }
    }

    /// Sets the name of the transactional resource unit the component uses.
    pub fn with_resource_unit(mut self, unit: impl Into<Arc<str>>) -> Self {
        self.resource_unit = Some(unit.into());
        self
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_unit(&self) -> Option<&str> {
        self.resource_unit.as_deref()
    }
}

impl std::fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_attributes_are_shared_between_clones() {
        let session = SessionContext::new();
        let other = session.clone();

        session.set_attribute("locale", serde_json::json!("de-DE"));

        assert_eq!(other.attribute("locale"), Some(serde_json::json!("de-DE")));
        assert_eq!(other.id(), session.id());
        assert_eq!(other.remove_attribute("locale"), Some(serde_json::json!("de-DE")));
        assert!(session.attribute("locale").is_none());
    }

    #[test]
    fn test_static_provider_returns_principal() {
        let provider = StaticPrincipalProvider::new(Principal::new("scheduler"));
        assert_eq!(provider.current_principal(), Some(Principal::new("scheduler")));
        assert!(AnonymousPrincipalProvider.current_principal().is_none());
    }

    #[test]
    fn test_component_ref_resource_unit() {
        let component = ComponentRef::new(ComponentId::new(), "Accounting");
        assert!(component.resource_unit().is_none());

        let component = component.with_resource_unit("accounting-db");
        assert_eq!(component.resource_unit(), Some("accounting-db"));
        assert_eq!(component.to_string(), "Accounting");
    }
}
