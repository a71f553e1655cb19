//! Health check levels and results.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How deep a health check should look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckLevel {
    /// Only the service itself.
    #[default]
    Internal,
    /// The service and the external systems it depends on.
    External,
}

impl CheckLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckLevel::Internal => "internal",
            CheckLevel::External => "external",
        }
    }
}

impl std::fmt::Display for CheckLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CheckLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "internal" => Ok(CheckLevel::Internal),
            "external" => Ok(CheckLevel::External),
            other => Err(format!("unknown check level '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Warning,
    Error,
    Unknown,
}

/// Outcome of a service or service provider health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl HealthCheckResult {
    pub fn ok() -> Self {
        Self {
            status: HealthStatus::Ok,
            messages: Vec::new(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Warning,
            messages: vec![message.into()],
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Error,
            messages: vec![message.into()],
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check_level() {
        assert_eq!("internal".parse::<CheckLevel>().unwrap(), CheckLevel::Internal);
        assert_eq!("EXTERNAL".parse::<CheckLevel>().unwrap(), CheckLevel::External);
        assert!("deep".parse::<CheckLevel>().is_err());
    }

    #[test]
    fn test_result_serialization() {
        let json = serde_json::to_value(HealthCheckResult::error("db down")).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["messages"][0], "db down");

        let json = serde_json::to_value(HealthCheckResult::ok()).unwrap();
        assert!(json.get("messages").is_none());
    }
}
