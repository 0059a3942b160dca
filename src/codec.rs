//! BER wire codec seam.
//!
//! Everything in this module that touches `rasn`/`rasn-snmp`/`rasn-smi`
//! (message framing) or `snmp-usm` (RFC 3414 key localization, auth
//! digests, privacy encryption) lives here so the rest of the crate only
//! ever sees [`crate::pdu::SnmpMessage`] and [`crate::security`] types.

use rasn::types::{FixedOctetString, Integer, ObjectIdentifier, OctetString};
use rasn_smi::{v1 as smi_v1, v2 as smi_v2};
use rasn_snmp::v1::{self, Pdus as PdusV1};
use rasn_snmp::v2::{self, Pdus as PdusV2, VarBindValue};
use rasn_snmp::v2c;
use rasn_snmp::v3;

use crate::error::{Error, Result};
use crate::oid::Oid;
use crate::pdu::{ErrorStatus, PduType, SnmpMessage, SnmpValue, VarBind};
use crate::security::{AuthProtocol, MessageSecurityParameters, PrivProtocol, UsmSecurityParameters};

/// Decodes a raw UDP datagram, authenticating and decrypting a v3 message
/// (if applicable) against the supplied USM parameters. For v3, callers
/// should resolve the claimed user's parameters via [`probe_v3`] first --
/// this function only knows how to apply a user's keys, not find them.
pub fn decode_message(bytes: &[u8], default_usm: &UsmSecurityParameters) -> Result<SnmpMessage> {
    if bytes.is_empty() {
        return Err(Error::codec("empty datagram"));
    }
    // The SNMP version lives in the first element of the outer sequence;
    // try v3 first (its header is structurally distinct), then v2c, then v1.
    if let Ok(message) = rasn::ber::decode::<v3::Message>(bytes) {
        return decode_v3(bytes, message, default_usm);
    }
    if let Ok(message) = rasn::ber::decode::<v2c::Message<PdusV2>>(bytes) {
        return decode_v2c(message);
    }
    if let Ok(message) = rasn::ber::decode::<v1::Message<PdusV1>>(bytes) {
        return decode_v1(message);
    }
    Err(Error::unsupported_packet_data(
        "datagram did not decode as SNMP v1, v2c, or v3",
    ))
}

/// Encodes a decoded message back to wire bytes for the matching version.
/// For v3, `security` carries the (possibly re-derived) USM parameters to
/// embed; for v1/v2c it is ignored.
pub fn encode_message(message: &SnmpMessage, security: &MessageSecurityParameters) -> Result<Vec<u8>> {
    match message.version {
        crate::pdu::SnmpVersion::V1 => encode_v1(message),
        crate::pdu::SnmpVersion::V2c => encode_v2c(message),
        crate::pdu::SnmpVersion::V3 => encode_v3(message, security),
    }
}

fn oid_to_object_identifier(oid: &Oid) -> ObjectIdentifier {
    ObjectIdentifier::new(oid.components().iter().map(|c| *c as u32).collect()).unwrap_or_default()
}

fn object_identifier_to_oid(oid: &ObjectIdentifier) -> Oid {
    Oid::new(oid.iter().copied().collect())
}

/// `rasn`'s `Integer` is arbitrary-precision, so every SNMP header/PDU
/// field typed as ASN.1 INTEGER round-trips through it rather than a
/// fixed-width primitive. These narrow back down to what the rest of the
/// crate uses, saturating instead of failing on an out-of-range wire value.
fn integer_to_i64(value: &Integer) -> i64 {
    i64::try_from(value).unwrap_or(0)
}

fn integer_to_i32(value: &Integer) -> i32 {
    integer_to_i64(value) as i32
}

fn integer_to_u32(value: &Integer) -> u32 {
    integer_to_i64(value).max(0) as u32
}

fn v1_value_to_object_syntax(value: &SnmpValue) -> smi_v1::ObjectSyntax {
    use smi_v1::{ApplicationSyntax, SimpleSyntax};
    match value {
        SnmpValue::Integer(i) => smi_v1::ObjectSyntax::Simple(SimpleSyntax::Number(Integer::from(*i))),
        SnmpValue::OctetString(bytes) => {
            smi_v1::ObjectSyntax::Simple(SimpleSyntax::String(OctetString::from(bytes.clone())))
        }
        SnmpValue::Null | SnmpValue::NoSuchInstance | SnmpValue::NoSuchObject | SnmpValue::EndOfMibView => {
            // SNMPv1 has no exception values (those are a v2 addition); the
            // empty simple-syntax value is the closest v1-native stand-in.
            smi_v1::ObjectSyntax::Simple(SimpleSyntax::Empty)
        }
        SnmpValue::ObjectId(oid) => {
            smi_v1::ObjectSyntax::Simple(SimpleSyntax::Object(oid_to_object_identifier(oid)))
        }
        SnmpValue::IpAddress(octets) => smi_v1::ObjectSyntax::ApplicationWide(ApplicationSyntax::Address(
            smi_v1::NetworkAddress::Internet(smi_v1::IpAddress(FixedOctetString::new(*octets))),
        )),
        SnmpValue::Counter32(v) => {
            smi_v1::ObjectSyntax::ApplicationWide(ApplicationSyntax::Counter(smi_v1::Counter(*v)))
        }
        SnmpValue::Gauge32(v) => {
            smi_v1::ObjectSyntax::ApplicationWide(ApplicationSyntax::Gauge(smi_v1::Gauge(*v)))
        }
        SnmpValue::TimeTicks(v) => {
            smi_v1::ObjectSyntax::ApplicationWide(ApplicationSyntax::Ticks(smi_v1::TimeTicks(*v)))
        }
        SnmpValue::Opaque(bytes) => smi_v1::ObjectSyntax::ApplicationWide(ApplicationSyntax::Arbitrary(
            OctetString::from(bytes.clone()),
        )),
        // SNMPv1 has no 64-bit counter; fall back to the low 32 bits so a
        // v1-speaking client still gets a usable (if truncated) value.
        SnmpValue::Counter64(v) => {
            smi_v1::ObjectSyntax::ApplicationWide(ApplicationSyntax::Counter(smi_v1::Counter(*v as u32)))
        }
    }
}

fn v1_object_syntax_to_value(syntax: &smi_v1::ObjectSyntax) -> SnmpValue {
    use smi_v1::{ApplicationSyntax, SimpleSyntax};
    match syntax {
        smi_v1::ObjectSyntax::Simple(SimpleSyntax::Number(i)) => SnmpValue::Integer(integer_to_i32(i)),
        smi_v1::ObjectSyntax::Simple(SimpleSyntax::String(s)) => SnmpValue::OctetString(s.to_vec()),
        smi_v1::ObjectSyntax::Simple(SimpleSyntax::Empty) => SnmpValue::Null,
        smi_v1::ObjectSyntax::Simple(SimpleSyntax::Object(oid)) => {
            SnmpValue::ObjectId(object_identifier_to_oid(oid))
        }
        smi_v1::ObjectSyntax::ApplicationWide(ApplicationSyntax::Address(
            smi_v1::NetworkAddress::Internet(ip),
        )) => {
            let mut buf = [0u8; 4];
            let len = ip.0.len().min(4);
            buf[..len].copy_from_slice(&ip.0[..len]);
            SnmpValue::IpAddress(buf)
        }
        smi_v1::ObjectSyntax::ApplicationWide(ApplicationSyntax::Counter(c)) => SnmpValue::Counter32(c.0),
        smi_v1::ObjectSyntax::ApplicationWide(ApplicationSyntax::Gauge(g)) => SnmpValue::Gauge32(g.0),
        smi_v1::ObjectSyntax::ApplicationWide(ApplicationSyntax::Ticks(t)) => SnmpValue::TimeTicks(t.0),
        smi_v1::ObjectSyntax::ApplicationWide(ApplicationSyntax::Arbitrary(o)) => {
            SnmpValue::Opaque(o.to_vec())
        }
    }
}

/// Wraps an [`SnmpValue`] for a v2/v3 var-bind. Request PDUs typically
/// carry `Unspecified` rather than a real value; responses carry either a
/// real `Value` or one of the v2 exception sentinels.
fn value_to_varbind_value(value: &SnmpValue) -> VarBindValue {
    use smi_v2::{ApplicationSyntax, SimpleSyntax};
    match value {
        SnmpValue::Null => VarBindValue::Unspecified,
        SnmpValue::NoSuchInstance => VarBindValue::NoSuchInstance,
        SnmpValue::NoSuchObject => VarBindValue::NoSuchObject,
        SnmpValue::EndOfMibView => VarBindValue::EndOfMibView,
        SnmpValue::Integer(i) => {
            VarBindValue::Value(smi_v2::ObjectSyntax::Simple(SimpleSyntax::Integer(Integer::from(*i))))
        }
        SnmpValue::OctetString(bytes) => VarBindValue::Value(smi_v2::ObjectSyntax::Simple(
            SimpleSyntax::String(OctetString::from(bytes.clone())),
        )),
        SnmpValue::ObjectId(oid) => VarBindValue::Value(smi_v2::ObjectSyntax::Simple(
            SimpleSyntax::ObjectId(oid_to_object_identifier(oid)),
        )),
        SnmpValue::IpAddress(octets) => VarBindValue::Value(smi_v2::ObjectSyntax::ApplicationWide(
            ApplicationSyntax::Address(smi_v1::IpAddress(FixedOctetString::new(*octets))),
        )),
        SnmpValue::Counter32(v) => VarBindValue::Value(smi_v2::ObjectSyntax::ApplicationWide(
            ApplicationSyntax::Counter(smi_v2::Counter(*v)),
        )),
        SnmpValue::Gauge32(v) => VarBindValue::Value(smi_v2::ObjectSyntax::ApplicationWide(
            ApplicationSyntax::Unsigned(smi_v2::Unsigned(*v)),
        )),
        SnmpValue::TimeTicks(v) => VarBindValue::Value(smi_v2::ObjectSyntax::ApplicationWide(
            ApplicationSyntax::Ticks(smi_v1::TimeTicks(*v)),
        )),
        SnmpValue::Opaque(bytes) => VarBindValue::Value(smi_v2::ObjectSyntax::ApplicationWide(
            ApplicationSyntax::Arbitrary(OctetString::from(bytes.clone())),
        )),
        SnmpValue::Counter64(v) => VarBindValue::Value(smi_v2::ObjectSyntax::ApplicationWide(
            ApplicationSyntax::BigCounter(smi_v2::Counter64(*v)),
        )),
    }
}

fn varbind_value_to_value(value: &VarBindValue) -> SnmpValue {
    use smi_v2::{ApplicationSyntax, SimpleSyntax};
    match value {
        VarBindValue::Unspecified => SnmpValue::Null,
        VarBindValue::NoSuchObject => SnmpValue::NoSuchObject,
        VarBindValue::NoSuchInstance => SnmpValue::NoSuchInstance,
        VarBindValue::EndOfMibView => SnmpValue::EndOfMibView,
        VarBindValue::Value(smi_v2::ObjectSyntax::Simple(SimpleSyntax::Integer(i))) => {
            SnmpValue::Integer(integer_to_i32(i))
        }
        VarBindValue::Value(smi_v2::ObjectSyntax::Simple(SimpleSyntax::String(s))) => {
            SnmpValue::OctetString(s.to_vec())
        }
        VarBindValue::Value(smi_v2::ObjectSyntax::Simple(SimpleSyntax::ObjectId(oid))) => {
            SnmpValue::ObjectId(object_identifier_to_oid(oid))
        }
        VarBindValue::Value(smi_v2::ObjectSyntax::ApplicationWide(ApplicationSyntax::Address(ip))) => {
            let mut buf = [0u8; 4];
            let len = ip.0.len().min(4);
            buf[..len].copy_from_slice(&ip.0[..len]);
            SnmpValue::IpAddress(buf)
        }
        VarBindValue::Value(smi_v2::ObjectSyntax::ApplicationWide(ApplicationSyntax::Counter(c))) => {
            SnmpValue::Counter32(c.0)
        }
        VarBindValue::Value(smi_v2::ObjectSyntax::ApplicationWide(ApplicationSyntax::Unsigned(u))) => {
            SnmpValue::Gauge32(u.0)
        }
        VarBindValue::Value(smi_v2::ObjectSyntax::ApplicationWide(ApplicationSyntax::Ticks(t))) => {
            SnmpValue::TimeTicks(t.0)
        }
        VarBindValue::Value(smi_v2::ObjectSyntax::ApplicationWide(ApplicationSyntax::Arbitrary(o))) => {
            SnmpValue::Opaque(o.to_vec())
        }
        VarBindValue::Value(smi_v2::ObjectSyntax::ApplicationWide(ApplicationSyntax::BigCounter(c))) => {
            SnmpValue::Counter64(c.0)
        }
    }
}

fn error_status_to_code(status: ErrorStatus) -> i32 {
    status as i32
}

fn error_status_from_code(code: i32) -> ErrorStatus {
    match code {
        0 => ErrorStatus::NoError,
        1 => ErrorStatus::TooBig,
        2 => ErrorStatus::NoSuchName,
        3 => ErrorStatus::BadValue,
        4 => ErrorStatus::ReadOnly,
        6 => ErrorStatus::NoAccess,
        7 => ErrorStatus::WrongType,
        8 => ErrorStatus::WrongLength,
        9 => ErrorStatus::WrongEncoding,
        10 => ErrorStatus::WrongValue,
        11 => ErrorStatus::NoCreation,
        12 => ErrorStatus::InconsistentValue,
        13 => ErrorStatus::ResourceUnavailable,
        14 => ErrorStatus::CommitFailed,
        15 => ErrorStatus::UndoFailed,
        16 => ErrorStatus::AuthorizationError,
        17 => ErrorStatus::NotWritable,
        18 => ErrorStatus::InconsistentName,
        _ => ErrorStatus::GenErr,
    }
}

fn decode_v1(message: v1::Message<PdusV1>) -> Result<SnmpMessage> {
    let community = String::from_utf8_lossy(&message.community).to_string();
    let (pdu_type, request_id, error_status, error_index, variables, non_repeaters, max_repetitions) =
        match message.data {
            PdusV1::GetRequest(v1::GetRequest(p)) => pdu_v1_fields(PduType::GetRequest, p),
            PdusV1::GetNextRequest(v1::GetNextRequest(p)) => pdu_v1_fields(PduType::GetNextRequest, p),
            PdusV1::GetResponse(v1::GetResponse(p)) => pdu_v1_fields(PduType::GetResponse, p),
            PdusV1::SetRequest(v1::SetRequest(p)) => pdu_v1_fields(PduType::SetRequest, p),
            PdusV1::Trap(_) => {
                return Err(Error::unsupported_packet_data("v1 Trap-PDU decode not supported"))
            }
        };
    Ok(SnmpMessage {
        version: crate::pdu::SnmpVersion::V1,
        community,
        pdu_type,
        request_id,
        non_repeaters,
        max_repetitions,
        error_status,
        error_index,
        variables,
        security_parameters: MessageSecurityParameters::None,
    })
}

fn pdu_v1_fields(
    pdu_type: PduType,
    pdu: v1::Pdu,
) -> (PduType, i32, ErrorStatus, u32, Vec<VarBind>, u32, u32) {
    let variables = pdu
        .variable_bindings
        .into_iter()
        .map(|vb| VarBind::new(object_identifier_to_oid(&vb.name), v1_object_syntax_to_value(&vb.value)))
        .collect();
    (
        pdu_type,
        integer_to_i32(&pdu.request_id),
        error_status_from_code(integer_to_i32(&pdu.error_status)),
        integer_to_u32(&pdu.error_index),
        variables,
        0,
        0,
    )
}

fn decode_v2c(message: v2c::Message<PdusV2>) -> Result<SnmpMessage> {
    let community = String::from_utf8_lossy(&message.community).to_string();
    let (pdu_type, request_id, error_status, error_index, variables, non_repeaters, max_repetitions) =
        pdu_v2_fields(message.data)?;
    Ok(SnmpMessage {
        version: crate::pdu::SnmpVersion::V2c,
        community,
        pdu_type,
        request_id,
        non_repeaters,
        max_repetitions,
        error_status,
        error_index,
        variables,
        security_parameters: MessageSecurityParameters::None,
    })
}

fn pdu_v2_fields(
    pdus: PdusV2,
) -> Result<(PduType, i32, ErrorStatus, u32, Vec<VarBind>, u32, u32)> {
    let (pdu_type, pdu, non_repeaters, max_repetitions) = match pdus {
        PdusV2::GetRequest(v2::GetRequest(p)) => (PduType::GetRequest, p, 0, 0),
        PdusV2::GetNextRequest(v2::GetNextRequest(p)) => (PduType::GetNextRequest, p, 0, 0),
        PdusV2::Response(v2::Response(p)) => (PduType::GetResponse, p, 0, 0),
        PdusV2::SetRequest(v2::SetRequest(p)) => (PduType::SetRequest, p, 0, 0),
        PdusV2::InformRequest(v2::InformRequest(p)) => (PduType::InformRequest, p, 0, 0),
        PdusV2::Trap(v2::Trap(p)) => (PduType::SnmpV2Trap, p, 0, 0),
        PdusV2::Report(v2::Report(p)) => (PduType::Report, p, 0, 0),
        PdusV2::GetBulkRequest(v2::GetBulkRequest(bulk)) => {
            // GetBulkRequest-PDU (RFC 3416 §4.2.3) reuses the Pdu shape but
            // reinterprets error-status/error-index as non-repeaters/max-repetitions.
            let non_repeaters = integer_to_u32(&bulk.error_status);
            let max_repetitions = integer_to_u32(&bulk.error_index);
            (PduType::GetBulkRequest, bulk, non_repeaters, max_repetitions)
        }
    };
    let variables = pdu
        .variable_bindings
        .into_iter()
        .map(|vb| VarBind::new(object_identifier_to_oid(&vb.name), varbind_value_to_value(&vb.value)))
        .collect();
    let error_status = if matches!(pdu_type, PduType::GetBulkRequest) {
        ErrorStatus::NoError
    } else {
        error_status_from_code(integer_to_i32(&pdu.error_status))
    };
    Ok((
        pdu_type,
        integer_to_i32(&pdu.request_id),
        error_status,
        integer_to_u32(&pdu.error_index),
        variables,
        non_repeaters,
        max_repetitions,
    ))
}

/// What the master agent needs to resolve a claimed USM user before it can
/// trust the message enough to fully decode (or decrypt) it: the BER
/// envelope and the USM header always decode regardless of whether the
/// scoped PDU turns out to be garbage (wrong key) or ciphertext this
/// engine cannot yet open.
pub struct V3Probe {
    pub message_id: i32,
    pub username: String,
}

/// Decodes just enough of a v3 datagram to learn the message id and the
/// claimed USM user name, without decrypting or parsing the scoped PDU.
/// Used ahead of the real decode so the master agent can resolve that
/// user's keys first -- necessary because an encrypted request cannot be
/// fully decoded until then.
pub fn probe_v3(bytes: &[u8]) -> Result<V3Probe> {
    let message = rasn::ber::decode::<v3::Message>(bytes)
        .map_err(|e| Error::codec(format!("not a v3 message: {e}")))?;
    Ok(V3Probe {
        message_id: integer_to_i32(&message.global_data.message_id),
        username: String::from_utf8_lossy(&message.security_parameters.user_name).to_string(),
    })
}

/// Recomputes the USM authentication digest over the raw datagram with
/// its authentication parameters zeroed (RFC 3414 §6.3.1) and compares it
/// against the digest actually carried on the wire.
///
/// Works by splicing zeroed bytes into the exact spot the received digest
/// occupies, rather than re-encoding the decoded structures, so it never
/// depends on `rasn`'s BER encoder reproducing the sender's encoding
/// byte-for-byte.
fn verify_authentication(
    raw_message: &[u8],
    security_parameters: &v3::USMSecurityParameters,
    usm: &UsmSecurityParameters,
) -> Result<()> {
    let received_digest = security_parameters.authentication_parameters.to_vec();
    if received_digest.is_empty() {
        return Err(Error::no_permission(
            "message requires authentication but carries no digest",
        ));
    }

    let zeroed = vec![0u8; received_digest.len()];
    let whole_message = splice_once(raw_message, &received_digest, &zeroed)
        .ok_or_else(|| Error::codec("could not locate authentication parameters for auth check"))?;

    let expected_digest = crate::usm::authenticate(usm, &whole_message)?;
    if expected_digest != received_digest {
        return Err(Error::no_permission("USM authentication digest mismatch"));
    }
    Ok(())
}

/// Replaces the first occurrence of `needle` in `haystack` with
/// `replacement` (same length as `needle`), or `None` if not found.
fn splice_once(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Option<Vec<u8>> {
    let pos = haystack.windows(needle.len()).position(|window| window == needle)?;
    let mut out = Vec::with_capacity(haystack.len());
    out.extend_from_slice(&haystack[..pos]);
    out.extend_from_slice(replacement);
    out.extend_from_slice(&haystack[pos + needle.len()..]);
    Some(out)
}

fn decode_v3(raw_message: &[u8], message: v3::Message, default_usm: &UsmSecurityParameters) -> Result<SnmpMessage> {
    if default_usm.auth_protocol != AuthProtocol::None {
        verify_authentication(raw_message, &message.security_parameters, default_usm)?;
    }

    let security_parameters = &message.security_parameters;
    let scoped = match message.scoped_data {
        v3::ScopedPduData::CleartextPdu(scoped) => scoped,
        v3::ScopedPduData::EncryptedPdu(ciphertext) => {
            crate::usm::decrypt_scoped_pdu(&ciphertext, security_parameters, default_usm)?
        }
    };

    let (pdu_type, request_id, error_status, error_index, variables, non_repeaters, max_repetitions) =
        pdu_v2_fields(scoped.data)?;

    Ok(SnmpMessage {
        version: crate::pdu::SnmpVersion::V3,
        community: String::from_utf8_lossy(&scoped.name).to_string(),
        pdu_type,
        request_id,
        non_repeaters,
        max_repetitions,
        error_status,
        error_index,
        variables,
        security_parameters: MessageSecurityParameters::Usm(UsmSecurityParameters {
            authoritative_engine_id: security_parameters.authoritative_engine_id.to_vec(),
            authoritative_engine_boots: integer_to_u32(&security_parameters.authoritative_engine_boots),
            authoritative_engine_time: integer_to_u32(&security_parameters.authoritative_engine_time),
            user_name: String::from_utf8_lossy(&security_parameters.user_name).to_string(),
            authentication_parameters: security_parameters.authentication_parameters.to_vec(),
            privacy_parameters: security_parameters.privacy_parameters.to_vec(),
            auth_protocol: AuthProtocol::None,
            auth_passphrase: String::new(),
            priv_protocol: PrivProtocol::None,
            priv_passphrase: String::new(),
        }),
    })
}

fn encode_v1(message: &SnmpMessage) -> Result<Vec<u8>> {
    let pdu = v1::Pdu {
        request_id: Integer::from(message.request_id),
        error_status: Integer::from(error_status_to_code(message.error_status)),
        error_index: Integer::from(message.error_index),
        variable_bindings: message
            .variables
            .iter()
            .map(|vb| v1::VarBind {
                name: oid_to_object_identifier(&vb.oid),
                value: v1_value_to_object_syntax(&vb.value),
            })
            .collect(),
    };
    let data = match message.pdu_type {
        PduType::GetRequest => PdusV1::GetRequest(pdu),
        PduType::GetNextRequest => PdusV1::GetNextRequest(pdu),
        PduType::SetRequest => PdusV1::SetRequest(pdu),
        _ => PdusV1::GetResponse(pdu),
    };
    let wire = v1::Message {
        version: Integer::from(0),
        community: OctetString::from(message.community.clone().into_bytes()),
        data,
    };
    rasn::ber::encode(&wire).map_err(|e| Error::codec(format!("v1 encode failed: {e}")))
}

fn v2_pdu(message: &SnmpMessage) -> v2::Pdu {
    v2::Pdu {
        request_id: Integer::from(message.request_id),
        error_status: Integer::from(error_status_to_code(message.error_status)),
        error_index: Integer::from(message.error_index),
        variable_bindings: message
            .variables
            .iter()
            .map(|vb| v2::VarBind {
                name: oid_to_object_identifier(&vb.oid),
                value: value_to_varbind_value(&vb.value),
            })
            .collect(),
    }
}

fn v2_pdus(message: &SnmpMessage) -> PdusV2 {
    let pdu = v2_pdu(message);
    match message.pdu_type {
        PduType::GetRequest => PdusV2::GetRequest(v2::GetRequest(pdu)),
        PduType::GetNextRequest => PdusV2::GetNextRequest(v2::GetNextRequest(pdu)),
        PduType::SetRequest => PdusV2::SetRequest(v2::SetRequest(pdu)),
        PduType::InformRequest => PdusV2::InformRequest(v2::InformRequest(pdu)),
        PduType::SnmpV2Trap => PdusV2::Trap(v2::Trap(pdu)),
        PduType::Report => PdusV2::Report(v2::Report(pdu)),
        PduType::GetBulkRequest => PdusV2::GetBulkRequest(v2::GetBulkRequest(v2::Pdu {
            error_status: Integer::from(message.non_repeaters),
            error_index: Integer::from(message.max_repetitions),
            ..pdu
        })),
        _ => PdusV2::Response(v2::Response(pdu)),
    }
}

fn encode_v2c(message: &SnmpMessage) -> Result<Vec<u8>> {
    let wire = v2c::Message {
        version: Integer::from(1),
        community: OctetString::from(message.community.clone().into_bytes()),
        data: v2_pdus(message),
    };
    rasn::ber::encode(&wire).map_err(|e| Error::codec(format!("v2c encode failed: {e}")))
}

fn encode_v3(message: &SnmpMessage, security: &MessageSecurityParameters) -> Result<Vec<u8>> {
    let usm = match security {
        MessageSecurityParameters::Usm(usm) => usm.clone(),
        MessageSecurityParameters::None => {
            return Err(Error::codec("v3 message requires USM security parameters"))
        }
    };
    let scoped = v3::ScopedPdu {
        engine_id: OctetString::from(usm.authoritative_engine_id.clone()),
        name: OctetString::from(message.community.clone().into_bytes()),
        data: v2_pdus(message),
    };

    let scoped_data = if usm.priv_protocol == PrivProtocol::None {
        v3::ScopedPduData::CleartextPdu(scoped)
    } else {
        let ciphertext = crate::usm::encrypt_scoped_pdu(&scoped, &usm)?;
        v3::ScopedPduData::EncryptedPdu(OctetString::from(ciphertext))
    };

    // The authentication digest (RFC 3414 §6.3.1) covers the whole
    // message, so it can only be computed after everything else is
    // encoded: first with a zeroed digest placeholder of the final
    // length, then substituted in and the message re-encoded. The
    // placeholder is the same length as the real digest, so this second
    // encode cannot change anything's length or offset.
    let auth_len = if usm.auth_protocol == AuthProtocol::None { 0 } else { 12 };
    let security_parameters = v3::USMSecurityParameters {
        authoritative_engine_id: OctetString::from(usm.authoritative_engine_id.clone()),
        authoritative_engine_boots: Integer::from(usm.authoritative_engine_boots),
        authoritative_engine_time: Integer::from(usm.authoritative_engine_time),
        user_name: OctetString::from(usm.user_name.clone().into_bytes()),
        authentication_parameters: OctetString::from(vec![0u8; auth_len]),
        privacy_parameters: OctetString::from(usm.privacy_parameters.clone()),
    };

    let mut wire = v3::Message {
        version: Integer::from(3),
        global_data: v3::HeaderData {
            message_id: Integer::from(message.request_id),
            max_size: Integer::from(65507),
            flags: OctetString::from(vec![usm_flags(&usm)]),
            security_model: Integer::from(3),
        },
        security_parameters,
        scoped_data,
    };

    if usm.auth_protocol == AuthProtocol::None {
        return rasn::ber::encode(&wire).map_err(|e| Error::codec(format!("v3 encode failed: {e}")));
    }

    let unauthenticated_bytes =
        rasn::ber::encode(&wire).map_err(|e| Error::codec(format!("v3 encode failed: {e}")))?;
    let digest = crate::usm::authenticate(&usm, &unauthenticated_bytes)?;
    wire.security_parameters.authentication_parameters = OctetString::from(digest);
    rasn::ber::encode(&wire).map_err(|e| Error::codec(format!("v3 encode failed: {e}")))
}

fn usm_flags(usm: &UsmSecurityParameters) -> u8 {
    let mut flags = 0u8;
    if usm.auth_protocol != AuthProtocol::None {
        flags |= 0x01;
    }
    if usm.priv_protocol != PrivProtocol::None {
        flags |= 0x02;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid::Oid;

    fn request(version: crate::pdu::SnmpVersion, pdu_type: PduType, variables: Vec<VarBind>) -> SnmpMessage {
        SnmpMessage {
            version,
            community: "public".to_string(),
            pdu_type,
            request_id: 42,
            non_repeaters: 0,
            max_repetitions: 0,
            error_status: ErrorStatus::NoError,
            error_index: 0,
            variables,
            security_parameters: MessageSecurityParameters::None,
        }
    }

    fn no_security() -> UsmSecurityParameters {
        UsmSecurityParameters::default()
    }

    #[test]
    fn v1_get_request_round_trips() {
        let variables = vec![VarBind::new(
            Oid::parse("1.3.6.1.2.1.1.1.0").unwrap(),
            SnmpValue::octet_string("hello"),
        )];
        let message = request(crate::pdu::SnmpVersion::V1, PduType::GetRequest, variables);
        let bytes = encode_message(&message, &MessageSecurityParameters::None).unwrap();

        let decoded = decode_message(&bytes, &no_security()).unwrap();
        assert_eq!(decoded.version, crate::pdu::SnmpVersion::V1);
        assert_eq!(decoded.community, "public");
        assert_eq!(decoded.pdu_type, PduType::GetRequest);
        assert_eq!(decoded.request_id, 42);
        assert_eq!(decoded.variables.len(), 1);
        assert_eq!(decoded.variables[0].oid.to_string(), "1.3.6.1.2.1.1.1.0");
    }

    #[test]
    fn v2c_get_bulk_round_trips_non_repeaters_and_max_repetitions() {
        let variables = vec![VarBind::new(Oid::parse("1.3.6.1.2.1.2.2.1.2").unwrap(), SnmpValue::Null)];
        let mut message = request(crate::pdu::SnmpVersion::V2c, PduType::GetBulkRequest, variables);
        message.non_repeaters = 1;
        message.max_repetitions = 10;
        let bytes = encode_message(&message, &MessageSecurityParameters::None).unwrap();

        let decoded = decode_message(&bytes, &no_security()).unwrap();
        assert_eq!(decoded.pdu_type, PduType::GetBulkRequest);
        assert_eq!(decoded.non_repeaters, 1);
        assert_eq!(decoded.max_repetitions, 10);
    }

    #[test]
    fn v2c_end_of_mib_view_round_trips_as_a_sentinel_not_a_value() {
        let variables = vec![VarBind::new(
            Oid::parse("1.3.6.1.2.1.1.99.0").unwrap(),
            SnmpValue::EndOfMibView,
        )];
        let message = request(crate::pdu::SnmpVersion::V2c, PduType::GetResponse, variables);
        let bytes = encode_message(&message, &MessageSecurityParameters::None).unwrap();

        let decoded = decode_message(&bytes, &no_security()).unwrap();
        assert_eq!(decoded.variables[0].value, SnmpValue::EndOfMibView);
    }

    fn authenticated_usm(passphrase: &str) -> UsmSecurityParameters {
        UsmSecurityParameters {
            authoritative_engine_id: b"engine-id-0123456".to_vec(),
            authoritative_engine_boots: 1,
            authoritative_engine_time: 100,
            user_name: "alice".to_string(),
            auth_protocol: AuthProtocol::Md5,
            auth_passphrase: passphrase.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn v3_authenticated_request_round_trips_with_correct_passphrase() {
        let usm = authenticated_usm("correct horse battery staple");
        let message = request(crate::pdu::SnmpVersion::V3, PduType::GetRequest, vec![]);
        let bytes = encode_message(&message, &MessageSecurityParameters::Usm(usm.clone())).unwrap();

        let decoded = decode_message(&bytes, &usm).unwrap();
        assert_eq!(decoded.pdu_type, PduType::GetRequest);
    }

    #[test]
    fn v3_authenticated_request_is_rejected_with_wrong_passphrase() {
        let usm = authenticated_usm("correct horse battery staple");
        let message = request(crate::pdu::SnmpVersion::V3, PduType::GetRequest, vec![]);
        let bytes = encode_message(&message, &MessageSecurityParameters::Usm(usm)).unwrap();

        let wrong_usm = authenticated_usm("not the right passphrase");
        assert!(decode_message(&bytes, &wrong_usm).is_err());
    }

    #[test]
    fn probe_v3_recovers_username_even_though_scoped_pdu_is_unreadable() {
        let usm = authenticated_usm("correct horse battery staple");
        let message = request(crate::pdu::SnmpVersion::V3, PduType::GetRequest, vec![]);
        let bytes = encode_message(&message, &MessageSecurityParameters::Usm(usm)).unwrap();

        let probe = probe_v3(&bytes).unwrap();
        assert_eq!(probe.username, "alice");
        assert_eq!(probe.message_id, 42);
    }
}
