//! A UCD-SNMP-style load/disk group, `1.3.6.1.4.1.2021.*`, sourced from
//! `sysinfo` rather than shelling out to `uptime`/`df` the way the
//! original net-snmp `ucd-snmp` MIB module does.
//!
//! Only a slice of the real UCD tree is reproduced: `laLoad` (1/5/15
//! minute load averages, `.10.1.3.<index>`) and a flattened disk table
//! (`dskPath`/`dskTotal`/`dskAvail`/`dskPercent`, `.9.1.*`). Each call
//! re-reads the underlying system state, so these OIDs always reflect
//! the current load/disk usage rather than a value captured at startup.

use std::sync::Mutex;

use sysinfo::{Disks, System};

use crate::oid::Oid;
use crate::pdu::{Asn1Type, PduControlItem, SnmpValue};

const LOAD_BASE: &str = "1.3.6.1.4.1.2021.10.1.3";
const DISK_BASE: &str = "1.3.6.1.4.1.2021.9.1";

/// The three UCD load-average indices, in their conventional order.
const LOAD_INDICES: [(u32, fn(&sysinfo::LoadAvg) -> f64); 3] = [
    (1, |l| l.one),
    (2, |l| l.five),
    (3, |l| l.fifteen),
];

pub fn load_oids() -> Vec<PduControlItem> {
    LOAD_INDICES
        .iter()
        .map(|&(index, pick)| {
            PduControlItem::read_only(
                oid(LOAD_BASE, index),
                Asn1Type::OctetString,
                format!("laLoad.{index}: system load average"),
                move || Ok(SnmpValue::octet_string(format!("{:.2}", pick(&System::load_average())))),
            )
        })
        .collect()
}

/// `dskPath`/`dskTotal`/`dskAvail`/`dskPercent` for every mounted disk
/// `sysinfo` can see at the moment `oids()` is called -- the table shape
/// (one `PduControlItem` per column per disk) is fixed at startup, but
/// each callback re-reads live `Disks` state when invoked.
pub fn disk_oids() -> Vec<PduControlItem> {
    let disks = Disks::new_with_refreshed_list();
    let mut items = Vec::new();
    for (index, disk) in disks.iter().enumerate() {
        let index = index as u32 + 1;
        let mount_point = disk.mount_point().display().to_string();

        items.push(PduControlItem::read_only(
            oid(&format!("{DISK_BASE}.2"), index),
            Asn1Type::OctetString,
            format!("dskPath.{index}: mount point"),
            {
                let mount_point = mount_point.clone();
                move || Ok(SnmpValue::octet_string(mount_point.clone()))
            },
        ));

        let mount_point_for_total = mount_point.clone();
        items.push(PduControlItem::read_only(
            oid(&format!("{DISK_BASE}.6"), index),
            Asn1Type::Gauge32,
            format!("dskTotal.{index}: total space in kB"),
            move || Ok(SnmpValue::Gauge32(kb(total_space_for(&mount_point_for_total)))),
        ));

        let mount_point_for_avail = mount_point.clone();
        items.push(PduControlItem::read_only(
            oid(&format!("{DISK_BASE}.7"), index),
            Asn1Type::Gauge32,
            format!("dskAvail.{index}: available space in kB"),
            move || Ok(SnmpValue::Gauge32(kb(available_space_for(&mount_point_for_avail)))),
        ));

        let mount_point_for_percent = mount_point;
        items.push(PduControlItem::read_only(
            oid(&format!("{DISK_BASE}.9"), index),
            Asn1Type::Integer,
            format!("dskPercent.{index}: percent used"),
            move || {
                let total = total_space_for(&mount_point_for_percent);
                let available = available_space_for(&mount_point_for_percent);
                let percent = if total == 0 {
                    0
                } else {
                    (((total - available) as u64 * 100) / total) as i32
                };
                Ok(SnmpValue::Integer(percent))
            },
        ));
    }
    items
}

/// sysinfo's `Disks` handle does not implement `Clone`, so callbacks that
/// need a fresh reading re-scan rather than closing over one snapshot;
/// the lock only serializes concurrent rescans, it does not cache.
static RESCAN_LOCK: Mutex<()> = Mutex::new(());

fn total_space_for(mount_point: &str) -> u64 {
    let _guard = RESCAN_LOCK.lock().unwrap();
    Disks::new_with_refreshed_list()
        .iter()
        .find(|d| d.mount_point().display().to_string() == mount_point)
        .map(|d| d.total_space())
        .unwrap_or(0)
}

fn available_space_for(mount_point: &str) -> u64 {
    let _guard = RESCAN_LOCK.lock().unwrap();
    Disks::new_with_refreshed_list()
        .iter()
        .find(|d| d.mount_point().display().to_string() == mount_point)
        .map(|d| d.available_space())
        .unwrap_or(0)
}

fn kb(bytes: u64) -> u32 {
    (bytes / 1024).min(u32::MAX as u64) as u32
}

fn oid(base: &str, index: u32) -> Oid {
    Oid::parse(&format!("{base}.{index}")).expect("static UCD OID")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_oids_cover_one_five_fifteen_minute_indices() {
        let items = load_oids();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].oid.to_string(), "1.3.6.1.4.1.2021.10.1.3.1");
        assert_eq!(items[2].oid.to_string(), "1.3.6.1.4.1.2021.10.1.3.3");
    }

    #[test]
    fn disk_oids_produce_four_columns_per_disk() {
        let items = disk_oids();
        assert_eq!(items.len() % 4, 0);
    }
}
