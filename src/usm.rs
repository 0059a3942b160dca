//! RFC 3414 key localization and scoped-PDU privacy, delegated to the
//! `snmp-usm` crate. This is the other half of the codec seam: [`crate::codec`]
//! handles BER framing, this module handles everything USM-specific that
//! framing depends on (encrypted scoped PDUs, auth digests).

use rasn::types::OctetString;
use rasn_snmp::v3;
use snmp_usm::{Aes, AuthKey, Des, LocalizedKey, Md5, Sha1};

use crate::error::{Error, Result};
use crate::security::{AuthProtocol, PrivProtocol, UsmSecurityParameters};

/// Localizes a passphrase into an authentication key against an engine id,
/// per RFC 3414 §2.6 (password-to-key, then key localization).
fn localize_auth_key(protocol: AuthProtocol, passphrase: &str, engine_id: &[u8]) -> Result<AuthKey> {
    match protocol {
        AuthProtocol::Md5 => Ok(AuthKey::new::<Md5>(passphrase, engine_id)),
        AuthProtocol::Sha => Ok(AuthKey::new::<Sha1>(passphrase, engine_id)),
        AuthProtocol::None => Err(Error::codec("no authentication protocol configured for user")),
    }
}

fn localized_priv_key(usm: &UsmSecurityParameters) -> Result<LocalizedKey> {
    let auth_key = localize_auth_key(
        usm.auth_protocol,
        &usm.auth_passphrase,
        &usm.authoritative_engine_id,
    )?;
    Ok(auth_key.localize(&usm.authoritative_engine_id))
}

/// Decrypts a v3 encrypted scoped PDU and decodes the inner cleartext PDU.
pub fn decrypt_scoped_pdu(
    ciphertext: &OctetString,
    wire_params: &v3::USMSecurityParameters,
    resolved: &UsmSecurityParameters,
) -> Result<v3::ScopedPdu> {
    if resolved.priv_protocol == PrivProtocol::None {
        return Err(Error::codec("message is encrypted but no privacy protocol is configured"));
    }
    let priv_key = localized_priv_key(resolved)?;
    let salt: &[u8] = wire_params.privacy_parameters.as_ref();
    let ciphertext_bytes: &[u8] = ciphertext.as_ref();
    let plaintext = match resolved.priv_protocol {
        PrivProtocol::Des => snmp_usm::privacy::decrypt::<Des>(&priv_key, salt, ciphertext_bytes)
            .map_err(|e| Error::codec(format!("DES decryption failed: {e}")))?,
        PrivProtocol::Aes => snmp_usm::privacy::decrypt::<Aes>(&priv_key, salt, ciphertext_bytes)
            .map_err(|e| Error::codec(format!("AES decryption failed: {e}")))?,
        PrivProtocol::None => unreachable!(),
    };
    rasn::ber::decode(&plaintext).map_err(|e| Error::codec(format!("decrypted scoped PDU did not decode: {e}")))
}

/// Encrypts a scoped PDU for outbound v3 traffic using the resolved
/// user's privacy key, returning the ciphertext and the salt (privacy
/// parameters) used.
pub fn encrypt_scoped_pdu(scoped: &v3::ScopedPdu, usm: &UsmSecurityParameters) -> Result<Vec<u8>> {
    let plaintext =
        rasn::ber::encode(scoped).map_err(|e| Error::codec(format!("scoped PDU encode failed: {e}")))?;
    let priv_key = localized_priv_key(usm)?;
    let salt = &usm.privacy_parameters;
    match usm.priv_protocol {
        PrivProtocol::Des => snmp_usm::privacy::encrypt::<Des>(&priv_key, salt, &plaintext)
            .map_err(|e| Error::codec(format!("DES encryption failed: {e}"))),
        PrivProtocol::Aes => snmp_usm::privacy::encrypt::<Aes>(&priv_key, salt, &plaintext)
            .map_err(|e| Error::codec(format!("AES encryption failed: {e}"))),
        PrivProtocol::None => Err(Error::codec("no privacy protocol configured for user")),
    }
}

/// Computes the authentication digest for an already-assembled message
/// buffer, per RFC 3414 §6 (HMAC truncated to 12 octets).
pub fn authenticate(usm: &UsmSecurityParameters, whole_message: &[u8]) -> Result<Vec<u8>> {
    let auth_key = localize_auth_key(usm.auth_protocol, &usm.auth_passphrase, &usm.authoritative_engine_id)?;
    let digest = match usm.auth_protocol {
        AuthProtocol::Md5 => snmp_usm::auth::authenticate::<Md5>(&auth_key, whole_message),
        AuthProtocol::Sha => snmp_usm::auth::authenticate::<Sha1>(&auth_key, whole_message),
        AuthProtocol::None => return Err(Error::codec("no authentication protocol configured for user")),
    };
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localize_auth_key_rejects_missing_protocol() {
        let result = localize_auth_key(AuthProtocol::None, "irrelevant", b"engine");
        assert!(result.is_err());
    }
}
