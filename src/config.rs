// src/config.rs - Demo server configuration

use crate::error::{AcError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const MIN_SEVERITY: u16 = 1;
pub const MAX_SEVERITY: u16 = 1000;

// ============================================================================
// MAIN CONFIGURATION
// ============================================================================

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub access_control: AccessControlConfig,

    /// On/off alarms created at startup
    #[serde(default = "default_conditions")]
    pub conditions: Vec<ConditionConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            access_control: AccessControlConfig::default(),
            conditions: default_conditions(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.application_name.trim().is_empty() {
            return Err(AcError::Config("server.application_name is empty".into()));
        }

        let ac = &self.access_control;
        if !ac.allow_anonymous && ac.users.is_empty() {
            return Err(AcError::Config(
                "anonymous logins are disabled and no users are configured".into(),
            ));
        }
        for user in &ac.users {
            if user.user_name.is_empty() {
                return Err(AcError::Config("user with empty user_name".into()));
            }
        }

        let mut names = HashSet::new();
        for condition in &self.conditions {
            if condition.name.trim().is_empty() {
                return Err(AcError::Config("condition with empty name".into()));
            }
            if condition.source.trim().is_empty() {
                return Err(AcError::Config(format!(
                    "condition '{}' has no source",
                    condition.name
                )));
            }
            if !(MIN_SEVERITY..=MAX_SEVERITY).contains(&condition.severity) {
                return Err(AcError::Config(format!(
                    "condition '{}' severity {} outside {}..={}",
                    condition.name, condition.severity, MIN_SEVERITY, MAX_SEVERITY
                )));
            }
            if !names.insert(condition.name.as_str()) {
                return Err(AcError::Config(format!(
                    "duplicate condition name '{}'",
                    condition.name
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTIONS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_application_name")]
    pub application_name: String,

    #[serde(default = "default_application_uri")]
    pub application_uri: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            application_uri: default_application_uri(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessControlConfig {
    #[serde(default = "default_true")]
    pub allow_anonymous: bool,

    /// Accept X509 and issued-token identities
    #[serde(default = "default_true")]
    pub allow_token_identities: bool,

    #[serde(default)]
    pub users: Vec<UserLogin>,
}

impl Default for AccessControlConfig {
    fn default() -> Self {
        Self {
            allow_anonymous: true,
            allow_token_identities: true,
            users: vec![
                UserLogin {
                    user_name: "admin".into(),
                    password: "admin".into(),
                },
                UserLogin {
                    user_name: "guest".into(),
                    password: "guest".into(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLogin {
    pub user_name: String,
    pub password: String,
}

/// One on/off alarm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub name: String,

    /// Browse name of the source object
    pub source: String,

    #[serde(default = "default_severity")]
    pub severity: u16,

    /// Expose under the source with HasComponent; hidden otherwise
    #[serde(default = "default_true")]
    pub exposed: bool,
}

fn default_application_name() -> String { "PETRA A&C Demo".to_string() }
fn default_application_uri() -> String { "urn:petra:ac:demo".to_string() }
fn default_true() -> bool { true }
fn default_severity() -> u16 { crate::onoff::DEFAULT_SEVERITY }

fn default_conditions() -> Vec<ConditionConfig> {
    vec![ConditionConfig {
        name: crate::onoff::DEFAULT_NAME.to_string(),
        source: "ConditionSource".to_string(),
        severity: default_severity(),
        exposed: true,
    }]
}
