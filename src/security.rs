//! SNMPv3 security configuration: engine id, USM user table, and the
//! per-message security parameters carried alongside a decoded packet.
//!
//! The actual key localization (RFC 3414 §2.6) and encryption/decryption
//! are delegated to the `codec` module, which wraps the `snmp-usm` crate;
//! this module only holds configuration and the wire-shaped parameters.

use std::time::Instant;

use rand::RngCore;

use crate::error::{Error, Result};

/// USM authentication protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProtocol {
    None,
    Md5,
    Sha,
}

/// USM privacy (encryption) protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivProtocol {
    None,
    Des,
    Aes,
}

/// One configured SNMPv3 user.
#[derive(Debug, Clone)]
pub struct UsmUser {
    pub user_name: String,
    pub auth_protocol: AuthProtocol,
    pub auth_passphrase: String,
    pub priv_protocol: PrivProtocol,
    pub priv_passphrase: String,
}

impl UsmUser {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            auth_protocol: AuthProtocol::None,
            auth_passphrase: String::new(),
            priv_protocol: PrivProtocol::None,
            priv_passphrase: String::new(),
        }
    }

    pub fn with_auth(mut self, protocol: AuthProtocol, passphrase: impl Into<String>) -> Self {
        self.auth_protocol = protocol;
        self.auth_passphrase = passphrase.into();
        self
    }

    pub fn with_priv(mut self, protocol: PrivProtocol, passphrase: impl Into<String>) -> Self {
        self.priv_protocol = protocol;
        self.priv_passphrase = passphrase.into();
        self
    }
}

/// RFC 3411 SNMP engine id: a 4-byte PEN (high bit set) + format octet +
/// opaque data, 5..32 octets total once marshaled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineId {
    pub pen: u32,
    pub data: Vec<u8>,
}

const ENGINE_ID_FORMAT_ADMINISTRATIVE: u8 = 0x05;
const ENGINE_ID_MAX_LEN: usize = 32;
const ENGINE_ID_PREFIX_LEN: usize = 5;

impl EngineId {
    pub fn new(pen: u32, data: Vec<u8>) -> Self {
        Self { pen, data }
    }

    /// A default engine id using the net-snmp/pysnmp-style "unregistered
    /// enterprise" PEN with 16 random octets of data. Per RFC 3411 an
    /// engine should keep a *stable* id across restarts; callers that
    /// care about that should persist and reuse an `EngineId` rather than
    /// regenerating one with this constructor every boot.
    pub fn random(pen: u32) -> Self {
        let mut data = vec![0u8; 16];
        rand::thread_rng().fill_bytes(&mut data);
        Self { pen, data }
    }

    /// Marshals to the RFC 3411 octet-string form: byte 0..3 big-endian
    /// PEN with the conformance bit set, byte 4 the format octet, then
    /// opaque data truncated so the total never exceeds 32 octets.
    pub fn marshal(&self) -> Vec<u8> {
        let mut pen = self.pen;
        pen |= 1 << 31;
        let mut out = Vec::with_capacity(ENGINE_ID_MAX_LEN);
        out.extend_from_slice(&pen.to_be_bytes());
        out.push(ENGINE_ID_FORMAT_ADMINISTRATIVE);
        let max_data = ENGINE_ID_MAX_LEN - ENGINE_ID_PREFIX_LEN;
        if self.data.len() > max_data {
            out.extend_from_slice(&self.data[..max_data]);
        } else {
            out.extend_from_slice(&self.data);
        }
        out
    }
}

/// Per-message security parameters: absent for v1/v2c (the community
/// string already lives on `SnmpMessage`), USM for v3.
#[derive(Debug, Clone, Default)]
pub enum MessageSecurityParameters {
    #[default]
    None,
    Usm(UsmSecurityParameters),
}

/// The wire-shaped USM header (RFC 3414 §2.4), plus the resolved
/// passphrases needed to (re-)derive keys locally.
#[derive(Debug, Clone, Default)]
pub struct UsmSecurityParameters {
    pub authoritative_engine_id: Vec<u8>,
    pub authoritative_engine_boots: u32,
    pub authoritative_engine_time: u32,
    pub user_name: String,
    pub authentication_parameters: Vec<u8>,
    pub privacy_parameters: Vec<u8>,
    pub auth_protocol: AuthProtocol,
    pub auth_passphrase: String,
    pub priv_protocol: PrivProtocol,
    pub priv_passphrase: String,
}

impl UsmSecurityParameters {
    /// Generates a fresh 8-octet privacy salt for an outbound encrypted
    /// message. RFC 3414 §8.1.1.1 requires every message a given engine
    /// encrypts under a key to carry a distinct salt, so a response must
    /// never simply echo back the salt its request arrived with.
    pub fn refresh_privacy_salt(&mut self) {
        let mut salt = vec![0u8; 8];
        rand::thread_rng().fill_bytes(&mut salt);
        self.privacy_parameters = salt;
    }
}

pub type EngineTimeFn = dyn Fn() -> u32 + Send + Sync;

/// Security configuration owned by the master agent.
pub struct SecurityConfig {
    pub no_security: bool,
    pub engine_id: Option<EngineId>,
    pub engine_boots: u32,
    pub engine_time_fn: Option<Box<EngineTimeFn>>,
    pub users: Vec<UsmUser>,
    create_time: Option<Instant>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            no_security: false,
            engine_id: None,
            engine_boots: 1,
            engine_time_fn: None,
            users: Vec::new(),
            create_time: None,
        }
    }
}

impl SecurityConfig {
    /// Fills in defaults the way `syncAndCheck` does in the original
    /// source: a random engine id if unset, and an engine-time function
    /// derived from `create_time` (process start) if unset.
    pub fn ready_for_work(&mut self) {
        let create_time = *self.create_time.get_or_insert_with(Instant::now);
        if self.engine_id.is_none() {
            self.engine_id = Some(EngineId::random(20408));
        }
        if self.engine_time_fn.is_none() {
            self.engine_time_fn = Some(Box::new(move || create_time.elapsed().as_secs() as u32));
        }
    }

    pub fn engine_id(&self) -> &EngineId {
        self.engine_id
            .as_ref()
            .expect("ready_for_work must run before engine_id is read")
    }

    pub fn engine_time(&self) -> u32 {
        (self
            .engine_time_fn
            .as_ref()
            .expect("ready_for_work must run before engine_time is read"))()
    }

    pub fn find_user(&self, name: &str) -> Option<&UsmUser> {
        self.users.iter().find(|u| u.user_name == name)
    }

    /// Builds the default (unauthenticated, username-less) USM parameters
    /// used for the initial decode pass and for v3 discovery responses.
    pub fn default_usm_parameters(&self) -> UsmSecurityParameters {
        UsmSecurityParameters {
            authoritative_engine_id: self.engine_id().marshal(),
            authoritative_engine_boots: self.engine_boots,
            authoritative_engine_time: self.engine_time(),
            ..Default::default()
        }
    }

    /// Resolves a named user's security parameters, filling in the
    /// authoritative engine id/boots/time, but not yet any auth/priv
    /// digest or salt (those are computed once keys are derived).
    pub fn usm_parameters_for_user(&self, user_name: &str) -> Result<UsmSecurityParameters> {
        if user_name.is_empty() {
            return Ok(self.default_usm_parameters());
        }
        let user = self
            .find_user(user_name)
            .ok_or_else(|| Error::no_permission(format!("unknown USM user {user_name:?}")))?;
        Ok(UsmSecurityParameters {
            authoritative_engine_id: self.engine_id().marshal(),
            authoritative_engine_boots: self.engine_boots,
            authoritative_engine_time: self.engine_time(),
            user_name: user.user_name.clone(),
            auth_protocol: user.auth_protocol,
            auth_passphrase: user.auth_passphrase.clone(),
            priv_protocol: user.priv_protocol,
            priv_passphrase: user.priv_passphrase.clone(),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_id_marshal_shape() {
        let id = EngineId::new(20408, vec![1; 16]);
        let marshaled = id.marshal();
        assert!(marshaled.len() >= 5 && marshaled.len() <= 32);
        assert_eq!(marshaled[0] & 0x80, 0x80);
        assert_eq!(marshaled[4], 0x05);
    }

    #[test]
    fn engine_id_marshal_truncates_overlong_data() {
        let id = EngineId::new(1, vec![7; 64]);
        let marshaled = id.marshal();
        assert_eq!(marshaled.len(), 32);
    }

    #[test]
    fn ready_for_work_fills_defaults() {
        let mut config = SecurityConfig::default();
        assert!(config.engine_id.is_none());
        config.ready_for_work();
        assert!(config.engine_id.is_some());
        let _ = config.engine_time();
    }

    #[test]
    fn find_user_by_name() {
        let mut config = SecurityConfig::default();
        config.users.push(UsmUser::new("alice"));
        assert!(config.find_user("alice").is_some());
        assert!(config.find_user("bob").is_none());
    }
}
