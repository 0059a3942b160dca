//! Wire-level SNMP types shared by the sub-agent and master agent: PDU
//! types, error statuses, typed values, variable bindings, and the
//! per-OID control item that a sub-agent dispatches against.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::oid::Oid;

/// SNMP protocol version carried in the message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnmpVersion {
    V1,
    V2c,
    V3,
}

/// Bitmask of SNMP versions a master agent will accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnabledVersions(u8);

impl EnabledVersions {
    pub const V1: EnabledVersions = EnabledVersions(1 << 0);
    pub const V2C: EnabledVersions = EnabledVersions(1 << 1);
    pub const V3: EnabledVersions = EnabledVersions(1 << 2);

    pub const fn all() -> Self {
        EnabledVersions(Self::V1.0 | Self::V2C.0 | Self::V3.0)
    }

    pub const fn none() -> Self {
        EnabledVersions(0)
    }

    pub const fn union(self, other: Self) -> Self {
        EnabledVersions(self.0 | other.0)
    }

    pub fn contains(&self, version: SnmpVersion) -> bool {
        let bit = match version {
            SnmpVersion::V1 => Self::V1,
            SnmpVersion::V2c => Self::V2C,
            SnmpVersion::V3 => Self::V3,
        };
        self.0 & bit.0 != 0
    }
}

impl Default for EnabledVersions {
    fn default() -> Self {
        Self::all()
    }
}

/// SNMP PDU type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PduType {
    GetRequest,
    GetNextRequest,
    GetBulkRequest,
    SetRequest,
    GetResponse,
    Trap,
    SnmpV2Trap,
    InformRequest,
    Report,
}

/// SNMP envelope error-status, values matching RFC 1905 `§3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorStatus {
    NoError = 0,
    TooBig = 1,
    NoSuchName = 2,
    BadValue = 3,
    ReadOnly = 4,
    GenErr = 5,
    NoAccess = 6,
    WrongType = 7,
    WrongLength = 8,
    WrongEncoding = 9,
    WrongValue = 10,
    NoCreation = 11,
    InconsistentValue = 12,
    ResourceUnavailable = 13,
    CommitFailed = 14,
    UndoFailed = 15,
    AuthorizationError = 16,
    NotWritable = 17,
    InconsistentName = 18,
}

impl ErrorStatus {
    pub fn is_no_error(&self) -> bool {
        matches!(self, ErrorStatus::NoError)
    }
}

/// A typed SNMP value, as carried in a variable binding.
#[derive(Debug, Clone, PartialEq)]
pub enum SnmpValue {
    Integer(i32),
    OctetString(Vec<u8>),
    Null,
    ObjectId(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Opaque(Vec<u8>),
    Counter64(u64),
    NoSuchInstance,
    NoSuchObject,
    EndOfMibView,
}

impl SnmpValue {
    pub fn octet_string<S: Into<Vec<u8>>>(s: S) -> Self {
        SnmpValue::OctetString(s.into())
    }

    pub fn error_octet_string(detail: impl fmt::Display) -> Self {
        SnmpValue::OctetString(format!("ERROR: {detail}").into_bytes())
    }
}

/// ASN.1 type tag a control item is declared to return. Kept distinct
/// from `SnmpValue` because a callback can fail (and still be described
/// by a static type for documentation/MIB-browsing purposes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asn1Type {
    Integer,
    OctetString,
    Null,
    ObjectId,
    IpAddress,
    Counter32,
    Gauge32,
    TimeTicks,
    Opaque,
    Counter64,
}

/// One variable binding: an OID paired with a value.
#[derive(Debug, Clone, PartialEq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: SnmpValue,
}

impl VarBind {
    pub fn new(oid: Oid, value: SnmpValue) -> Self {
        Self { oid, value }
    }
}

/// A decoded/encodable SNMP message, independent of BER framing details.
#[derive(Debug, Clone)]
pub struct SnmpMessage {
    pub version: SnmpVersion,
    /// v1/v2c community string, or v3 context name.
    pub community: String,
    pub pdu_type: PduType,
    pub request_id: i32,
    pub non_repeaters: u32,
    pub max_repetitions: u32,
    pub error_status: ErrorStatus,
    pub error_index: u32,
    pub variables: Vec<VarBind>,
    pub security_parameters: crate::security::MessageSecurityParameters,
}

impl SnmpMessage {
    /// Shallow copy used as the basis for a response: same version,
    /// community, request id and security parameters, but type switched
    /// to `GetResponse` and variables cleared -- mirrors `copySnmpPacket`
    /// in the original source.
    pub fn response_shell(&self) -> Self {
        Self {
            version: self.version,
            community: self.community.clone(),
            pdu_type: PduType::GetResponse,
            request_id: self.request_id,
            non_repeaters: 0,
            max_repetitions: 0,
            error_status: ErrorStatus::NoError,
            error_index: 0,
            variables: Vec::new(),
            security_parameters: self.security_parameters.clone(),
        }
    }

    /// Sets the envelope error/index, but only if no error has been
    /// recorded yet -- the envelope always reflects the first failure.
    pub fn set_first_error(&mut self, status: ErrorStatus, index: u32) {
        if self.error_status.is_no_error() {
            self.error_status = status;
            self.error_index = index;
        }
    }
}

/// Outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionAllowance {
    Allowed,
    Denied,
}

pub type OnGet = dyn Fn() -> Result<SnmpValue> + Send + Sync;
pub type OnSet = dyn Fn(&SnmpValue) -> Result<()> + Send + Sync;
pub type OnTrap = dyn Fn(bool, &VarBind) -> Result<SnmpValue> + Send + Sync;
pub type OnCheckPermission =
    dyn Fn(SnmpVersion, PduType, &str) -> PermissionAllowance + Send + Sync;

/// One entry in a sub-agent's OID table.
#[derive(Clone)]
pub struct PduControlItem {
    pub oid: Oid,
    pub r#type: Asn1Type,
    pub on_get: Option<Arc<OnGet>>,
    pub on_set: Option<Arc<OnSet>>,
    pub on_trap: Option<Arc<OnTrap>>,
    pub on_check_permission: Option<Arc<OnCheckPermission>>,
    pub non_walkable: bool,
    pub document: String,
}

impl fmt::Debug for PduControlItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PduControlItem")
            .field("oid", &self.oid)
            .field("type", &self.r#type)
            .field("non_walkable", &self.non_walkable)
            .field("document", &self.document)
            .field("on_get", &self.on_get.is_some())
            .field("on_set", &self.on_set.is_some())
            .field("on_trap", &self.on_trap.is_some())
            .field("on_check_permission", &self.on_check_permission.is_some())
            .finish()
    }
}

impl PduControlItem {
    /// A read-only item backed by a get callback.
    pub fn read_only<F>(oid: Oid, r#type: Asn1Type, document: impl Into<String>, on_get: F) -> Self
    where
        F: Fn() -> Result<SnmpValue> + Send + Sync + 'static,
    {
        Self {
            oid,
            r#type,
            on_get: Some(Arc::new(on_get)),
            on_set: None,
            on_trap: None,
            on_check_permission: None,
            non_walkable: false,
            document: document.into(),
        }
    }

    /// A read-write item backed by get and set callbacks.
    pub fn read_write<G, S>(
        oid: Oid,
        r#type: Asn1Type,
        document: impl Into<String>,
        on_get: G,
        on_set: S,
    ) -> Self
    where
        G: Fn() -> Result<SnmpValue> + Send + Sync + 'static,
        S: Fn(&SnmpValue) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            oid,
            r#type,
            on_get: Some(Arc::new(on_get)),
            on_set: Some(Arc::new(on_set)),
            on_trap: None,
            on_check_permission: None,
            non_walkable: false,
            document: document.into(),
        }
    }

    pub fn with_non_walkable(mut self, non_walkable: bool) -> Self {
        self.non_walkable = non_walkable;
        self
    }

    pub fn with_check_permission<P>(mut self, check: P) -> Self
    where
        P: Fn(SnmpVersion, PduType, &str) -> PermissionAllowance + Send + Sync + 'static,
    {
        self.on_check_permission = Some(Arc::new(check));
        self
    }

    pub fn with_trap<T>(mut self, on_trap: T) -> Self
    where
        T: Fn(bool, &VarBind) -> Result<SnmpValue> + Send + Sync + 'static,
    {
        self.on_trap = Some(Arc::new(on_trap));
        self
    }
}

/// `usmStatsUnknownEngineIDs` -- carried in the v3 discovery Report PDU.
pub fn usm_stats_unknown_engine_ids_oid() -> Oid {
    Oid::new(vec![1, 3, 6, 1, 6, 3, 15, 1, 1, 4, 0])
}
