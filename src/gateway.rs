//! The query dispatcher.
//!
//! [`Gateway`] owns the resource tables, the apex configuration, and the SOA
//! serial cell. [`Gateway::resolve`] is the DNS entry point: it matches the
//! zone, gates on indexer readiness, routes apex-subtree names to the apex
//! handling in [`crate::apex`], and assembles type-specific responses from
//! the index lookup pipeline. The resolution is a pure function of the
//! snapshot and the query; transport concerns live in [`crate::server`].

use hickory_proto::op::ResponseCode;
use hickory_proto::rr::{Name, Record, RecordType};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::apex::SerialCell;
use crate::config::{GatewayConfig, SoaConfig};
use crate::error::GatewayError;
use crate::lookup::{
    self, first_match, query_index_key_sets, ResourceIndex, ResourceKind, ResourceTable,
};
use crate::metrics;
use crate::records;
use crate::snapshot::ResourceFilters;

/// TTL applied to SOA and nameserver records.
pub(crate) const TTL_SOA: u32 = 60;

/// Callback producing apex A/AAAA glue records for a zone. The record type
/// is the original query type; secondary-nameserver glue is included for NS
/// queries.
pub type ExternalAddrFn = Arc<dyn Fn(&str, RecordType) -> Vec<Record> + Send + Sync>;

/// Readiness probe satisfied by the indexer layer once its initial
/// synchronization completed.
pub type SyncProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Outcome of dispatching one query.
#[derive(Debug)]
pub enum Resolution {
    /// The query is not ours to answer: no zone matched, or fall-through is
    /// enabled and the lookup produced no data.
    Delegate,
    /// An authoritative answer.
    Answer(DnsAnswer),
}

/// The sections and response code of an authoritative answer.
#[derive(Debug)]
pub struct DnsAnswer {
    /// DNS response code.
    pub rcode: ResponseCode,
    /// Answer section.
    pub answer: Vec<Record>,
    /// Authority section.
    pub authority: Vec<Record>,
    /// Additional section.
    pub extra: Vec<Record>,
}

impl DnsAnswer {
    pub(crate) fn success() -> Self {
        Self {
            rcode: ResponseCode::NoError,
            answer: Vec::new(),
            authority: Vec::new(),
            extra: Vec::new(),
        }
    }

    /// Turn this into a negative answer: SOA in authority, nothing else.
    pub(crate) fn set_negative(&mut self, soa: Record) {
        self.authority = vec![soa];
    }
}

/// Authoritative DNS engine over the indexer snapshot.
pub struct Gateway {
    zones: Vec<String>,
    pub(crate) tables: Vec<ResourceTable>,
    pub(crate) filters: ResourceFilters,
    pub(crate) ttl_low: u32,
    pub(crate) ttl_soa: u32,
    pub(crate) apex: String,
    pub(crate) secondary: Option<String>,
    pub(crate) hostmaster: String,
    pub(crate) soa: SoaConfig,
    pub(crate) cname_max_depth: usize,
    fallthrough_zones: Vec<String>,
    pub(crate) external_addrs: Option<ExternalAddrFn>,
    has_synced: SyncProbe,
    pub(crate) serial: SerialCell,
}

impl Gateway {
    /// Build a gateway from validated configuration. Resource tables start
    /// unbound; the indexer layer (or a test) attaches indexes with
    /// [`Gateway::set_index`].
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;

        let zones: Vec<String> = config.zones.iter().map(|z| lookup::canonicalize(z)).collect();
        let fallthrough_zones = config
            .fallthrough_zones
            .iter()
            .map(|z| lookup::canonicalize(z))
            .collect();

        let mut tables: Vec<ResourceTable> = Vec::new();
        for kind in &config.resources {
            if tables.iter().any(|t| t.kind == *kind) {
                warn!(resource = %kind, "duplicate resource kind in configuration, ignoring");
                continue;
            }
            tables.push(ResourceTable::unbound(*kind));
        }

        Ok(Self {
            zones,
            tables,
            filters: ResourceFilters {
                ingress_classes: config.ingress_classes.clone(),
                gateway_classes: config.gateway_classes.clone(),
            },
            ttl_low: config.ttl,
            ttl_soa: TTL_SOA,
            apex: config.apex.to_ascii_lowercase(),
            secondary: config.secondary.as_ref().map(|s| s.to_ascii_lowercase()),
            hostmaster: config.hostmaster.clone(),
            soa: config.soa.clone(),
            cname_max_depth: config.cname_max_depth,
            fallthrough_zones,
            external_addrs: None,
            has_synced: Arc::new(|| true),
            serial: SerialCell::new(),
        })
    }

    /// Zones this instance is authoritative for, canonical form.
    pub fn zones(&self) -> &[String] {
        &self.zones
    }

    /// Attach a snapshot index to the table for `kind`.
    pub fn set_index(&mut self, kind: ResourceKind, index: Arc<dyn ResourceIndex>) {
        match self.tables.iter_mut().find(|t| t.kind == kind) {
            Some(table) => table.index = index,
            None => warn!(resource = %kind, "resource kind is not configured, index ignored"),
        }
    }

    /// Inject the external-address callback used for apex and sub-apex
    /// address synthesis. Without one the gateway derives apex glue by
    /// probing its own tables with the apex label.
    pub fn set_external_address_fn(&mut self, f: ExternalAddrFn) {
        self.external_addrs = Some(f);
    }

    /// Install the indexer readiness probe.
    pub fn set_readiness_probe(&mut self, probe: SyncProbe) {
        self.has_synced = probe;
    }

    /// Signal that the snapshot changed since the last SOA synthesis.
    pub fn mark_dirty(&self) {
        self.serial.mark_dirty();
    }

    pub(crate) fn is_synced(&self) -> bool {
        (self.has_synced)()
    }

    /// Answer one query. The query name keeps the caller's letter case; all
    /// matching is case-insensitive.
    ///
    /// The only error is the readiness failure; everything else is expressed
    /// through the [`Resolution`].
    pub fn resolve(&self, qname: &Name, qtype: RecordType) -> Result<Resolution, GatewayError> {
        let qname_str = qname.to_string();

        let Some(zone) = self.match_zone(&qname_str) else {
            debug!(name = %qname_str, "query has not matched any zone");
            return Ok(Resolution::Delegate);
        };

        if !(self.has_synced)() {
            return Err(GatewayError::NotReady);
        }

        let canonical_qname = lookup::canonicalize(&qname_str);
        let canonical_zone = zone.to_ascii_lowercase();
        let is_apex = canonical_qname == canonical_zone;

        if !is_apex && self.in_apex_subtree(&canonical_qname, &canonical_zone) {
            return Ok(Resolution::Answer(self.serve_sub_apex(qname, qtype, &zone)));
        }

        let key_sets = query_index_key_sets(&qname_str, &canonical_zone);
        debug!(name = %qname_str, ?key_sets, "computed index key sets");

        let result = first_match(&self.tables, &key_sets);
        let no_data = result.is_empty();

        if no_data && self.fall_through(&canonical_qname) {
            return Ok(Resolution::Delegate);
        }

        let (v4, v6) = split_families(&result.addresses);
        let answer = self.assemble(
            qname,
            qtype,
            &zone,
            &v4,
            &v6,
            &result.texts,
            &result.cnames,
            is_apex,
            no_data,
        );
        Ok(Resolution::Answer(answer))
    }

    /// Longest configured zone suffix of `qname`, returned with the caller's
    /// letter case.
    fn match_zone(&self, qname: &str) -> Option<String> {
        let qname_lc = qname.to_ascii_lowercase();
        let best = self
            .zones
            .iter()
            .filter(|z| zone_matches(&qname_lc, z))
            .max_by_key(|z| z.len())?;
        Some(qname[qname.len() - best.len()..].to_string())
    }

    fn fall_through(&self, qname_lc: &str) -> bool {
        self.fallthrough_zones
            .iter()
            .any(|z| zone_matches(qname_lc, z))
    }

    fn in_apex_subtree(&self, qname_lc: &str, zone_lc: &str) -> bool {
        let apex_fqdn = format!("{}.{}", self.apex, zone_lc);
        if is_subdomain(&apex_fqdn, qname_lc) {
            return true;
        }
        match &self.secondary {
            Some(secondary) => is_subdomain(&format!("{secondary}.{zone_lc}"), qname_lc),
            None => false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        qname: &Name,
        qtype: RecordType,
        zone: &str,
        v4: &[IpAddr],
        v6: &[IpAddr],
        texts: &[String],
        cnames: &[String],
        is_apex: bool,
        no_data: bool,
    ) -> DnsAnswer {
        let mut answer = DnsAnswer::success();
        match qtype {
            RecordType::A => {
                self.address_answer(&mut answer, qname, zone, v4, cnames, is_apex, true);
            }
            RecordType::AAAA => {
                self.address_answer(&mut answer, qname, zone, v6, cnames, is_apex, false);
                // RFC 4074 #3: an IPv4-only name is "no data", never
                // "does not exist".
                if v6.is_empty() && cnames.is_empty() && !v4.is_empty() {
                    answer.rcode = ResponseCode::NoError;
                }
            }
            RecordType::TXT => {
                if texts.is_empty() {
                    answer.set_negative(self.soa_record(zone));
                    if !is_apex && no_data {
                        answer.rcode = ResponseCode::NXDomain;
                    }
                } else {
                    answer.answer = records::txt_records(qname, self.ttl_low, texts);
                }
            }
            RecordType::CNAME => {
                // A name that exists without CNAME data is NODATA, not
                // NXDOMAIN.
                match cnames.first() {
                    Some(target) => {
                        answer.answer
                            .extend(records::cname_record(qname, self.ttl_low, target));
                    }
                    None => answer.set_negative(self.soa_record(zone)),
                }
            }
            RecordType::SOA => {
                answer.answer = vec![self.soa_record(zone)];
            }
            RecordType::NS => {
                if is_apex {
                    answer.answer = self.nameservers(zone);
                    for mut rr in self.external_addresses(zone, RecordType::NS) {
                        rr.set_ttl(self.ttl_soa);
                        answer.extra.push(rr);
                    }
                } else {
                    answer.set_negative(self.soa_record(zone));
                }
            }
            _ => answer.set_negative(self.soa_record(zone)),
        }
        answer
    }

    fn address_answer(
        &self,
        answer: &mut DnsAnswer,
        qname: &Name,
        zone: &str,
        addrs: &[IpAddr],
        cnames: &[String],
        is_apex: bool,
        want_v4: bool,
    ) {
        if addrs.is_empty() && cnames.is_empty() {
            answer.set_negative(self.soa_record(zone));
            if !is_apex {
                answer.rcode = ResponseCode::NXDomain;
            }
            return;
        }

        if let Some(target) = cnames.first() {
            self.cname_answer(answer, qname, zone, target, want_v4);
            return;
        }

        answer.answer = if want_v4 {
            records::a_records(qname, self.ttl_low, addrs)
        } else {
            records::aaaa_records(qname, self.ttl_low, addrs)
        };
    }

    fn cname_answer(
        &self,
        answer: &mut DnsAnswer,
        qname: &Name,
        zone: &str,
        target: &str,
        want_v4: bool,
    ) {
        answer
            .answer
            .extend(records::cname_record(qname, self.ttl_low, target));

        let resolved = match self.resolve_cname_chain(target, zone) {
            Ok(addrs) => addrs,
            Err(err) => {
                warn!(name = %qname, cname = target, %err, "CNAME chain resolution failed");
                metrics::record_cname_failure(err.kind());
                return;
            }
        };
        if resolved.is_empty() {
            debug!(cname = target, "CNAME chain left the zone, no addresses resolved");
            return;
        }

        let owner = match Name::from_ascii(records::fqdn(target)) {
            Ok(name) => name,
            Err(err) => {
                debug!(cname = target, %err, "skipping unparseable CNAME owner");
                return;
            }
        };
        let resolved_records = if want_v4 {
            records::a_records(&owner, self.ttl_low, &resolved)
        } else {
            records::aaaa_records(&owner, self.ttl_low, &resolved)
        };
        answer.answer.extend(resolved_records);
    }
}

fn split_families(addrs: &[IpAddr]) -> (Vec<IpAddr>, Vec<IpAddr>) {
    addrs.iter().copied().partition(IpAddr::is_ipv4)
}

/// Suffix match on label boundaries; `zone` is canonical.
fn zone_matches(qname_lc: &str, zone: &str) -> bool {
    if zone == "." {
        return true;
    }
    if qname_lc == zone {
        return true;
    }
    qname_lc.len() > zone.len()
        && qname_lc.ends_with(zone)
        && qname_lc.as_bytes()[qname_lc.len() - zone.len() - 1] == b'.'
}

/// True when `child` equals `parent` or lies below it; both canonical.
fn is_subdomain(parent: &str, child: &str) -> bool {
    child == parent
        || (child.len() > parent.len()
            && child.ends_with(parent)
            && child.as_bytes()[child.len() - parent.len() - 1] == b'.')
}
