//! Resource record construction.
//!
//! All builders suppress duplicates by string form, first seen wins. Address
//! builders silently skip the wrong family so call sites can pass a mixed
//! list.

use hickory_proto::rr::rdata::{CNAME, TXT};
use hickory_proto::rr::{DNSClass, Name, RData, Record};
use std::collections::HashSet;
use std::net::IpAddr;
use tracing::debug;

/// Build A records from the IPv4 members of `addrs`.
pub(crate) fn a_records(name: &Name, ttl: u32, addrs: &[IpAddr]) -> Vec<Record> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for addr in addrs {
        if let IpAddr::V4(v4) = addr {
            if seen.insert(addr.to_string()) {
                records.push(in_record(name.clone(), ttl, RData::A((*v4).into())));
            }
        }
    }
    records
}

/// Build AAAA records from the IPv6 members of `addrs`.
pub(crate) fn aaaa_records(name: &Name, ttl: u32, addrs: &[IpAddr]) -> Vec<Record> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for addr in addrs {
        if let IpAddr::V6(v6) = addr {
            if seen.insert(addr.to_string()) {
                records.push(in_record(name.clone(), ttl, RData::AAAA((*v6).into())));
            }
        }
    }
    records
}

/// Build TXT records, splitting long values into 255-byte character strings.
pub(crate) fn txt_records(name: &Name, ttl: u32, texts: &[String]) -> Vec<Record> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for text in texts {
        if seen.insert(text.as_str()) {
            let rdata = RData::TXT(TXT::from_bytes(split255(text)));
            records.push(in_record(name.clone(), ttl, rdata));
        }
    }
    records
}

/// Build a CNAME record pointing at `target` (made fully qualified).
/// Returns `None` when the target is not a parseable DNS name.
pub(crate) fn cname_record(name: &Name, ttl: u32, target: &str) -> Option<Record> {
    let target_name = match Name::from_ascii(fqdn(target)) {
        Ok(n) => n,
        Err(err) => {
            debug!(cname = target, %err, "skipping unparseable CNAME target");
            return None;
        }
    };
    Some(in_record(name.clone(), ttl, RData::CNAME(CNAME(target_name))))
}

/// Append the trailing dot when missing, preserving letter case.
pub(crate) fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

fn in_record(name: Name, ttl: u32, rdata: RData) -> Record {
    let mut record = Record::from_rdata(name, ttl, rdata);
    record.set_dns_class(DNSClass::IN);
    record
}

/// Split a TXT payload into 255-byte character strings. Concatenating the
/// segments reproduces the original bytes.
pub(crate) fn split255(s: &str) -> Vec<&[u8]> {
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        return vec![bytes];
    }
    bytes.chunks(255).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::RecordType;

    fn name(s: &str) -> Name {
        Name::from_ascii(s).unwrap()
    }

    #[test]
    fn a_records_keep_ipv4_and_dedup() {
        let addrs: Vec<IpAddr> = vec![
            "192.0.2.1".parse().unwrap(),
            "2001:db8::1".parse().unwrap(),
            "192.0.2.1".parse().unwrap(),
            "192.0.2.2".parse().unwrap(),
        ];
        let records = a_records(&name("a.example.com."), 60, &addrs);
        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.record_type(), RecordType::A);
            assert_eq!(record.ttl(), 60);
        }
    }

    #[test]
    fn aaaa_records_keep_ipv6() {
        let addrs: Vec<IpAddr> = vec![
            "192.0.2.1".parse().unwrap(),
            "fd12:3456:789a:1::".parse().unwrap(),
        ];
        let records = aaaa_records(&name("a.example.com."), 60, &addrs);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type(), RecordType::AAAA);
    }

    #[test]
    fn split255_short_string_is_single_segment() {
        assert_eq!(split255("hello"), vec![b"hello" as &[u8]]);
    }

    #[test]
    fn split255_exact_boundary() {
        let s = "x".repeat(255);
        let segments = split255(&s);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len(), 255);
    }

    #[test]
    fn split255_long_string_concatenates_back() {
        let s = "y".repeat(600);
        let segments = split255(&s);
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|seg| seg.len() <= 255));
        let joined: Vec<u8> = segments.concat();
        assert_eq!(joined, s.as_bytes());
    }

    #[test]
    fn txt_records_dedup_by_value() {
        let texts = vec!["v=spf1".to_string(), "v=spf1".to_string()];
        let records = txt_records(&name("t.example.com."), 60, &texts);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn cname_record_qualifies_target() {
        let record = cname_record(&name("www.example.com."), 60, "app.example.com").unwrap();
        match record.data() {
            RData::CNAME(target) => assert_eq!(target.0.to_string(), "app.example.com."),
            other => panic!("expected CNAME rdata, got {other:?}"),
        }
    }
}
