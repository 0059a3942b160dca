//! Configuration for the SNMP agent: bind address and allowed protocol
//! versions, USM security setup, and logging.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub general: GeneralConfig,
    pub security: SecurityConfigFile,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub bind_address: String,
    pub port: u16,
    pub versions: Vec<SnmpVersion>,
    pub description: String,
    pub contact: String,
    pub location: String,
}

/// The on-disk/env shape of USM security configuration; translated into
/// [`crate::security::SecurityConfig`] at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfigFile {
    pub no_security: bool,
    /// Private enterprise number used when generating a random engine id.
    pub engine_id_pen: u32,
    /// Fixed engine id bytes (hex-encoded); when absent a random one is
    /// generated and used for the lifetime of the process.
    pub fixed_engine_id: Option<String>,
    pub engine_boots: u32,
    pub users: Vec<UsmUserConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsmUserConfig {
    pub username: String,
    pub auth_protocol: AuthProtocolConfig,
    pub auth_passphrase: Option<String>,
    pub priv_protocol: PrivProtocolConfig,
    pub priv_passphrase: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthProtocolConfig {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "md5")]
    Md5,
    #[serde(rename = "sha")]
    Sha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivProtocolConfig {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "des")]
    Des,
    #[serde(rename = "aes")]
    Aes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnmpVersion {
    #[serde(rename = "v1")]
    V1,
    #[serde(rename = "v2c")]
    V2c,
    #[serde(rename = "v3")]
    V3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub max_size: u64,
    pub max_files: u32,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "compact")]
    Compact,
    #[serde(rename = "full")]
    Full,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_size: 100,
            max_files: 7,
            format: LogFormat::Compact,
        }
    }
}

impl AgentConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AgentConfig =
            toml::from_str(&contents).map_err(|e| Error::parse(format!("invalid TOML: {e}")))?;
        Ok(config)
    }

    pub fn load_from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("SNMP_AGENT").separator("_"))
            .build()?;
        let agent_config = settings.try_deserialize()?;
        Ok(agent_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.port == 0 {
            return Err(Error::parse("bind port must be nonzero"));
        }
        if self.general.versions.is_empty() {
            return Err(Error::parse("at least one SNMP version must be allowed"));
        }
        if !self.security.no_security {
            for user in &self.security.users {
                if user.username.trim().is_empty() {
                    return Err(Error::parse("USM user must have a non-empty username"));
                }
            }
        }
        Ok(())
    }

    pub fn default_config() -> Self {
        Self {
            general: GeneralConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 1161,
                versions: vec![SnmpVersion::V2c],
                description: "snmp-agent".to_string(),
                contact: "admin@localhost".to_string(),
                location: "unknown".to_string(),
            },
            security: SecurityConfigFile {
                no_security: false,
                engine_id_pen: 99999,
                fixed_engine_id: None,
                engine_boots: 1,
                users: vec![],
            },
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(AgentConfig::default_config().validate().is_ok());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut config = AgentConfig::default_config();
        config.general.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn no_allowed_versions_is_rejected() {
        let mut config = AgentConfig::default_config();
        config.general.versions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_username_is_rejected_when_security_is_enabled() {
        let mut config = AgentConfig::default_config();
        config.security.users.push(UsmUserConfig {
            username: "  ".to_string(),
            auth_protocol: AuthProtocolConfig::Md5,
            auth_passphrase: Some("authpass".to_string()),
            priv_protocol: PrivProtocolConfig::None,
            priv_passphrase: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn roundtrips_through_toml() {
        let config = AgentConfig::default_config();
        let text = toml::to_string(&config).unwrap();
        let parsed: AgentConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.general.port, config.general.port);
    }
}
