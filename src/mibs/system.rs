//! The standard MIB-II system group, `1.3.6.1.2.1.1.*` (RFC 1213 `§6.1`).
//!
//! `sysDescr`, `sysObjectID`, and `sysUpTime` are read-only and derived
//! from the process itself; `sysContact`, `sysName`, and `sysLocation`
//! are read-write, backed by an in-memory `RwLock<String>` so a manager
//! can `Set` them and see the change echoed back on the next `Get`.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::oid::Oid;
use crate::pdu::{Asn1Type, PduControlItem, SnmpValue};

const SYSTEM_BASE: &str = "1.3.6.1.2.1.1";

/// Static, editable identity fields for the bundled system group.
#[derive(Debug, Clone)]
pub struct SystemIdentity {
    pub description: String,
    pub object_id: Oid,
    pub contact: String,
    pub name: String,
    pub location: String,
}

impl Default for SystemIdentity {
    fn default() -> Self {
        Self {
            description: format!("{} {}", crate::NAME, crate::VERSION),
            object_id: Oid::parse("1.3.6.1.4.1.20408.1").expect("static OID"),
            contact: String::new(),
            name: String::new(),
            location: String::new(),
        }
    }
}

/// Builds the system group's control items. `start` is used to compute
/// `sysUpTime` (hundredths of a second since the agent process started).
pub fn oids(identity: SystemIdentity, start: Instant) -> Vec<PduControlItem> {
    let contact = Arc::new(RwLock::new(identity.contact));
    let name = Arc::new(RwLock::new(identity.name));
    let location = Arc::new(RwLock::new(identity.location));

    vec![
        PduControlItem::read_only(
            oid("1.0"),
            Asn1Type::OctetString,
            "sysDescr: a textual description of this entity",
            move || Ok(SnmpValue::octet_string(identity.description.clone())),
        ),
        {
            let object_id = identity.object_id.clone();
            PduControlItem::read_only(
                oid("2.0"),
                Asn1Type::ObjectId,
                "sysObjectID: the vendor's authoritative identification",
                move || Ok(SnmpValue::ObjectId(object_id.clone())),
            )
        },
        PduControlItem::read_only(
            oid("3.0"),
            Asn1Type::TimeTicks,
            "sysUpTime: time since the agent last re-initialized",
            move || Ok(SnmpValue::TimeTicks((start.elapsed().as_millis() / 10) as u32)),
        ),
        readable_string_item(oid("4.0"), "sysContact", contact),
        readable_string_item(oid("5.0"), "sysName", name),
        readable_string_item(oid("6.0"), "sysLocation", location),
    ]
}

fn readable_string_item(id: Oid, label: &str, store: Arc<RwLock<String>>) -> PduControlItem {
    let for_get = store.clone();
    let for_set = store;
    PduControlItem::read_write(
        id,
        Asn1Type::OctetString,
        format!("{label}: administratively assigned, read-write"),
        move || Ok(SnmpValue::octet_string(for_get.read().unwrap().clone())),
        move |value| {
            if let SnmpValue::OctetString(bytes) = value {
                *for_set.write().unwrap() = String::from_utf8_lossy(bytes).into_owned();
                Ok(())
            } else {
                Err(crate::Error::validation(format!("{label} expects an OctetString")))
            }
        },
    )
}

fn oid(suffix: &str) -> Oid {
    Oid::parse(&format!("{SYSTEM_BASE}.{suffix}")).expect("static system OID")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_six_system_entries() {
        let items = oids(SystemIdentity::default(), Instant::now());
        assert_eq!(items.len(), 6);
        assert_eq!(items[0].oid.to_string(), "1.3.6.1.2.1.1.1.0");
    }
}
