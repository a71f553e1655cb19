//! Host configuration: where to listen, what to log and how to run the
//! hosted runtime.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use lifecycle::RuntimeSettings;

/// Configuration of the runtime host.
///
/// Reads `HOST` (default `0.0.0.0`), `PORT` (default `3000`) and `RUST_LOG`
/// (default `info`). Unparseable values fall back to the default. The
/// runtime itself is configured by [`RuntimeSettings::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub log_filter: String,
    pub runtime: RuntimeSettings,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok()).with_runtime(RuntimeSettings::from_env())
    }

    /// Builds the listen address and log filter from `lookup`, keeping the
    /// default runtime settings.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let ip = lookup("HOST")
            .and_then(|host| host.parse::<IpAddr>().ok())
            .unwrap_or(defaults.listen.ip());
        let port = lookup("PORT")
            .and_then(|port| port.parse::<u16>().ok())
            .unwrap_or(defaults.listen.port());
        Self {
            listen: SocketAddr::new(ip, port),
            log_filter: lookup("RUST_LOG").unwrap_or(defaults.log_filter),
            runtime: defaults.runtime,
        }
    }

    pub fn with_runtime(mut self, runtime: RuntimeSettings) -> Self {
        self.runtime = runtime;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 3000),
            log_filter: "info".to_string(),
            runtime: RuntimeSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_listen_on_all_interfaces() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config.listen.to_string(), "0.0.0.0:3000");
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.runtime.application_name, "runtime");
    }

    #[test]
    fn test_reads_listen_address_and_filter() {
        let config = Config::from_lookup(lookup(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("RUST_LOG", "lifecycle=debug"),
        ]));
        assert_eq!(config.listen.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_filter, "lifecycle=debug");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_lookup(lookup(&[("HOST", "not-an-ip"), ("PORT", "99999")]));
        assert_eq!(config.listen, Config::default().listen);
    }

    #[test]
    fn test_runtime_settings_are_carried() {
        let runtime = RuntimeSettings {
            application_name: "ops".to_string(),
            ..RuntimeSettings::default()
        };
        let config = Config::default().with_runtime(runtime);
        assert_eq!(config.runtime.application().name(), "ops");
    }
}
