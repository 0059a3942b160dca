//! Error handling for the SNMP agent

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported SNMP protocol version")]
    UnsupportedProtoVersion,

    #[error("Unsupported packet data: {0}")]
    UnsupportedPacketData(String),

    #[error("No SNMP sub-agent instance for this community/context")]
    NoSnmpInstance,

    #[error("No permission: {0}")]
    NoPermission(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Callback error: {0}")]
    Callback(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Duplicate OID in sub-agent table: {0}")]
    DuplicateOid(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unsupported_packet_data<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedPacketData(msg.into())
    }

    pub fn no_permission<S: Into<String>>(msg: S) -> Self {
        Self::NoPermission(msg.into())
    }

    pub fn unsupported_operation<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedOperation(msg.into())
    }

    pub fn callback<S: Into<String>>(msg: S) -> Self {
        Self::Callback(msg.into())
    }

    pub fn codec<S: Into<String>>(msg: S) -> Self {
        Self::Codec(msg.into())
    }

    pub fn duplicate_oid<S: Into<String>>(msg: S) -> Self {
        Self::DuplicateOid(msg.into())
    }

    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse(msg.into())
    }

    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}
