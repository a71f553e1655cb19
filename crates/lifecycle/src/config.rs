//! Runtime settings and the assembly of a runtime configuration.

use std::sync::Arc;
use std::time::Duration;

use channel::{ServiceChannelInterceptor, TransactionListener};
use context::{AnonymousPrincipalProvider, ApplicationInfo, PrincipalProvider};

use crate::factory::{ActivityFactory, ComponentFactory, ServiceProviderFactory};
use crate::trigger::Trigger;

/// Settings of a runtime with sensible defaults.
///
/// Reads from environment variables:
/// - `RUNTIME_APPLICATION_NAME` (default: `"runtime"`)
/// - `RUNTIME_APPLICATION_VERSION` (default: the crate version)
/// - `RUNTIME_SCHEDULING_ENABLED` (default: `false`)
/// - `RUNTIME_TRIGGER_INTERVAL_SECS` (default: `60`, at least `1`)
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub application_name: String,
    pub application_version: String,
    pub scheduling_enabled: bool,
    pub trigger_interval: Duration,
}

impl RuntimeSettings {
    /// Loads settings from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            application_name: std::env::var("RUNTIME_APPLICATION_NAME")
                .unwrap_or(defaults.application_name),
            application_version: std::env::var("RUNTIME_APPLICATION_VERSION")
                .unwrap_or(defaults.application_version),
            scheduling_enabled: std::env::var("RUNTIME_SCHEDULING_ENABLED")
                .ok()
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.scheduling_enabled),
            trigger_interval: std::env::var("RUNTIME_TRIGGER_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or(defaults.trigger_interval),
        }
    }

    /// Identity of the application hosted by the runtime.
    pub fn application(&self) -> ApplicationInfo {
        ApplicationInfo::new(&self.application_name, &self.application_version)
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            application_name: "runtime".to_string(),
            application_version: env!("CARGO_PKG_VERSION").to_string(),
            scheduling_enabled: false,
            trigger_interval: Duration::from_secs(60),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Everything a lifecycle manager needs to bootstrap a runtime.
///
/// Factories run in registration order.
#[derive(Clone)]
pub struct RuntimeConfig {
    pub(crate) settings: RuntimeSettings,
    pub(crate) service_providers: Vec<Arc<dyn ServiceProviderFactory>>,
    pub(crate) components: Vec<Arc<dyn ComponentFactory>>,
    pub(crate) activities: Vec<Arc<dyn ActivityFactory>>,
    pub(crate) interceptors: Vec<Arc<dyn ServiceChannelInterceptor>>,
    pub(crate) listeners: Vec<Arc<dyn TransactionListener>>,
    pub(crate) triggers: Vec<Arc<dyn Trigger>>,
    pub(crate) principals: Arc<dyn PrincipalProvider>,
}

impl RuntimeConfig {
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }
}

impl std::fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("settings", &self.settings)
            .field("service_providers", &self.service_providers.len())
            .field("components", &self.components.len())
            .field("activities", &self.activities.len())
            .field("interceptors", &self.interceptors.len())
            .field("listeners", &self.listeners.len())
            .field("triggers", &self.triggers.len())
            .finish()
    }
}

pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl Default for RuntimeConfigBuilder {
    fn default() -> Self {
        Self {
            config: RuntimeConfig {
                settings: RuntimeSettings::default(),
                service_providers: Vec::new(),
                components: Vec::new(),
                activities: Vec::new(),
                interceptors: Vec::new(),
                listeners: Vec::new(),
                triggers: Vec::new(),
                principals: Arc::new(AnonymousPrincipalProvider),
            },
        }
    }
}

impl RuntimeConfigBuilder {
    pub fn settings(mut self, settings: RuntimeSettings) -> Self {
        self.config.settings = settings;
        self
    }

    pub fn service_provider(mut self, factory: Arc<dyn ServiceProviderFactory>) -> Self {
        self.config.service_providers.push(factory);
        self
    }

    pub fn component(mut self, factory: Arc<dyn ComponentFactory>) -> Self {
        self.config.components.push(factory);
        self
    }

    pub fn activity(mut self, factory: Arc<dyn ActivityFactory>) -> Self {
        self.config.activities.push(factory);
        self
    }

    /// Adds a global interceptor. It runs for every component, before the
    /// component's own interceptors.
    pub fn interceptor(mut self, interceptor: Arc<dyn ServiceChannelInterceptor>) -> Self {
        self.config.interceptors.push(interceptor);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn TransactionListener>) -> Self {
        self.config.listeners.push(listener);
        self
    }

    pub fn trigger(mut self, trigger: Arc<dyn Trigger>) -> Self {
        self.config.triggers.push(trigger);
        self
    }

    pub fn principals(mut self, principals: Arc<dyn PrincipalProvider>) -> Self {
        self.config.principals = principals;
        self
    }

    pub fn build(self) -> RuntimeConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let settings = RuntimeSettings::default();
        assert_eq!(settings.application_name, "runtime");
        assert!(!settings.scheduling_enabled);
        assert_eq!(settings.trigger_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" on "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_application_info() {
        let settings = RuntimeSettings {
            application_name: "billing".to_string(),
            application_version: "2.1.0".to_string(),
            ..RuntimeSettings::default()
        };
        let app = settings.application();
        assert_eq!(app.name(), "billing");
        assert_eq!(app.version(), "2.1.0");
    }

    #[test]
    fn test_builder_collects_in_order() {
        let config = RuntimeConfig::builder()
            .settings(RuntimeSettings {
                scheduling_enabled: true,
                ..RuntimeSettings::default()
            })
            .build();
        assert!(config.settings().scheduling_enabled);
        assert!(config.components.is_empty());
        assert!(config.triggers.is_empty());
    }
}
