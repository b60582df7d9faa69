//! Apex and sub-apex handling: SOA synthesis, the nameserver set, and the
//! addresses of the gateway's own nameserver names.
//!
//! The serial cell is the engine's only mutable state. A serial is stamped
//! from the wall clock the first time it is read after the snapshot changed
//! and is cached until the next dirty signal, so zone-transfer clients see a
//! stable serial while nothing moved.

use hickory_proto::op::ResponseCode;
use hickory_proto::rr::rdata::{NS, SOA};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::gateway::{DnsAnswer, Gateway};
use crate::lookup::{canonicalize, strip_zone};
use crate::metrics;
use crate::records;

/// `lastSerial` and the dirty flag, guarded by one mutex.
#[derive(Debug)]
pub(crate) struct SerialCell {
    state: Mutex<SerialState>,
}

#[derive(Debug)]
struct SerialState {
    last_serial: u32,
    dirty: bool,
}

impl SerialCell {
    /// Starts dirty so the first read stamps a wall-clock serial.
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SerialState {
                last_serial: 0,
                dirty: true,
            }),
        }
    }

    /// Current serial, computing a new one only when the record set changed:
    /// `max(now_unix, last + 1)`, so the serial never decreases.
    pub(crate) fn current(&self) -> u32 {
        let mut state = self.state.lock();
        if state.dirty {
            let now = unix_now();
            state.last_serial = if now > state.last_serial {
                now
            } else {
                state.last_serial + 1
            };
            state.dirty = false;
            metrics::record_serial(state.last_serial);
        }
        state.last_serial
    }

    pub(crate) fn mark_dirty(&self) {
        self.state.lock().dirty = true;
    }
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

impl Gateway {
    /// Synthesize the zone's SOA record. `zone` keeps the caller's letter
    /// case and is used as the owner name.
    pub(crate) fn soa_record(&self, zone: &str) -> Record {
        let owner = name_or_root(zone);
        let mname = name_or_root(&format!("{}.{}", self.apex, zone));
        let rname = name_or_root(&format!("{}.{}.{}", self.hostmaster, self.apex, zone));

        let soa = SOA::new(
            mname,
            rname,
            self.serial.current(),
            self.soa.refresh as i32,
            self.soa.retry as i32,
            self.soa.expire as i32,
            self.ttl_soa,
        );

        let mut record = Record::from_rdata(owner, self.ttl_soa, RData::SOA(soa));
        record.set_dns_class(DNSClass::IN);
        record
    }

    /// The apex NS set: primary always, secondary iff configured.
    pub(crate) fn nameservers(&self, zone: &str) -> Vec<Record> {
        let owner = name_or_root(zone);
        let mut result = vec![ns_record(
            owner.clone(),
            self.ttl_soa,
            &format!("{}.{}", self.apex, zone),
        )];
        if let Some(secondary) = &self.secondary {
            result.push(ns_record(
                owner,
                self.ttl_soa,
                &format!("{secondary}.{zone}"),
            ));
        }
        result
    }

    /// A/AAAA records for the nameserver names, from the injected callback
    /// or from the gateway's own tables.
    pub(crate) fn external_addresses(&self, zone: &str, qtype: RecordType) -> Vec<Record> {
        match &self.external_addrs {
            Some(f) => f(zone, qtype),
            None => self.self_address(zone, qtype),
        }
    }

    /// Default external-address callback: probe every table with the apex
    /// label (and secondary, for NS queries) and build address records.
    fn self_address(&self, zone: &str, qtype: RecordType) -> Vec<Record> {
        let mut primary = Vec::new();
        let mut secondary = Vec::new();
        for table in &self.tables {
            primary.extend(table.index.lookup(&[self.apex.clone()]).addresses);
            if let Some(label) = &self.secondary {
                secondary.extend(table.index.lookup(&[label.clone()]).addresses);
            }
        }

        let apex_owner = name_or_root(&format!("{}.{}", self.apex, zone));
        let mut result = records::a_records(&apex_owner, self.ttl_low, &primary);
        result.extend(records::aaaa_records(&apex_owner, self.ttl_low, &primary));

        if qtype == RecordType::NS {
            if let Some(label) = &self.secondary {
                let owner = name_or_root(&format!("{label}.{zone}"));
                result.extend(records::a_records(&owner, self.ttl_low, &secondary));
                result.extend(records::aaaa_records(&owner, self.ttl_low, &secondary));
            }
        }

        result
    }

    /// Serve a name under the apex subtree. Known nameserver labels answer
    /// address queries from the external-address callback; anything deeper
    /// does not exist.
    pub(crate) fn serve_sub_apex(&self, qname: &Name, qtype: RecordType, zone: &str) -> DnsAnswer {
        let canonical = canonicalize(&qname.to_string());
        let base = strip_zone(&canonical, &canonicalize(zone)).to_string();

        let known =
            base == self.apex || self.secondary.as_deref() == Some(base.as_str());
        let mut answer = DnsAnswer::success();
        if !known {
            answer.set_negative(self.soa_record(zone));
            answer.rcode = ResponseCode::NXDomain;
            return answer;
        }

        for mut rr in self.external_addresses(zone, qtype) {
            if rr.record_type() != qtype {
                continue;
            }
            rr.set_ttl(self.ttl_soa);
            rr.set_name(qname.clone());
            answer.answer.push(rr);
        }

        if answer.answer.is_empty() {
            answer.set_negative(self.soa_record(zone));
        }
        answer
    }
}

fn ns_record(owner: Name, ttl: u32, target: &str) -> Record {
    let mut record = Record::from_rdata(owner, ttl, RData::NS(NS(name_or_root(target))));
    record.set_dns_class(DNSClass::IN);
    record
}

fn name_or_root(name: &str) -> Name {
    Name::from_ascii(name).unwrap_or_else(|_| Name::root())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn serial_is_stamped_on_first_read() {
        let cell = SerialCell::new();
        let serial = cell.current();
        assert!(serial > 0);
    }

    #[test]
    fn serial_is_cached_until_dirty() {
        let cell = SerialCell::new();
        let first = cell.current();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(cell.current(), first);

        cell.mark_dirty();
        let second = cell.current();
        assert!(second > first);
        assert_eq!(cell.current(), second);
    }

    #[test]
    fn serial_never_decreases_under_rapid_dirtying() {
        let cell = SerialCell::new();
        let mut last = cell.current();
        for _ in 0..5 {
            cell.mark_dirty();
            let next = cell.current();
            assert!(next > last);
            last = next;
        }
    }
}
