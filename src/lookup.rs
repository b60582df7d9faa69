//! Resource tables and the index lookup pipeline.
//!
//! Every watched Kubernetes resource kind is projected into a table fronted
//! by a [`ResourceIndex`]: an opaque lookup over the indexer's snapshot.
//! Table order is resource priority (routes outrank ingresses outrank
//! services), and specific keys are probed across every table before the
//! wildcard fallback so a wildcard in a lower-priority table can never mask
//! an exact match in a higher-priority one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use crate::snapshot::StoredObject;

/// The resource kinds the gateway can serve records for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Gateway API HTTPRoute
    HTTPRoute,
    /// Gateway API TLSRoute
    TLSRoute,
    /// Gateway API GRPCRoute
    GRPCRoute,
    /// networking.k8s.io Ingress
    Ingress,
    /// LoadBalancer Service
    Service,
    /// external-dns DNSEndpoint custom resource
    DNSEndpoint,
}

impl ResourceKind {
    /// All supported kinds in default priority order.
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::HTTPRoute,
        ResourceKind::TLSRoute,
        ResourceKind::GRPCRoute,
        ResourceKind::Ingress,
        ResourceKind::Service,
        ResourceKind::DNSEndpoint,
    ];
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::HTTPRoute => "HTTPRoute",
            ResourceKind::TLSRoute => "TLSRoute",
            ResourceKind::GRPCRoute => "GRPCRoute",
            ResourceKind::Ingress => "Ingress",
            ResourceKind::Service => "Service",
            ResourceKind::DNSEndpoint => "DNSEndpoint",
        };
        f.write_str(name)
    }
}

/// The triple a table lookup yields for a key set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupResult {
    /// A/AAAA addresses, mixed families.
    pub addresses: Vec<IpAddr>,
    /// TXT record payloads.
    pub texts: Vec<String>,
    /// CNAME targets, most preferred first.
    pub cnames: Vec<String>,
}

impl LookupResult {
    /// True when the lookup produced no data of any kind.
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty() && self.texts.is_empty() && self.cnames.is_empty()
    }
}

/// Read-only projection of one resource kind's snapshot.
///
/// Implementations are populated by the indexer layer (or by tests), must be
/// pure with respect to their backing snapshot, and safe for concurrent use.
pub trait ResourceIndex: Send + Sync {
    /// Probe the index with an ordered list of lowercase keys.
    fn lookup(&self, keys: &[String]) -> LookupResult;

    /// Enumerate the backing store for zone transfers.
    fn list(&self) -> Vec<StoredObject> {
        Vec::new()
    }
}

/// Index that knows nothing; the placeholder until the indexer attaches.
pub(crate) struct NoopIndex;

impl ResourceIndex for NoopIndex {
    fn lookup(&self, _keys: &[String]) -> LookupResult {
        LookupResult::default()
    }
}

/// A named resource table with its lookup index.
#[derive(Clone)]
pub struct ResourceTable {
    /// Which resource kind this table serves.
    pub kind: ResourceKind,
    /// The snapshot-backed index.
    pub index: Arc<dyn ResourceIndex>,
}

impl ResourceTable {
    pub(crate) fn unbound(kind: ResourceKind) -> Self {
        Self {
            kind,
            index: Arc::new(NoopIndex),
        }
    }
}

impl fmt::Debug for ResourceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTable")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Return the first non-empty triple any table yields, probing key sets in
/// specificity order and tables in priority order.
pub(crate) fn first_match(tables: &[ResourceTable], key_sets: &[Vec<String>]) -> LookupResult {
    for keys in key_sets {
        for table in tables {
            let result = table.index.lookup(keys);
            if !result.is_empty() {
                return result;
            }
        }
    }
    LookupResult::default()
}

/// Lowercase a DNS name and ensure it carries the trailing dot.
pub(crate) fn canonicalize(name: &str) -> String {
    let mut name = name.to_ascii_lowercase();
    if !name.ends_with('.') {
        name.push('.');
    }
    name
}

/// Strip the closing dot unless the name is the root.
pub(crate) fn strip_closing_dot(name: &str) -> &str {
    if name.len() > 1 {
        name.strip_suffix('.').unwrap_or(name)
    } else {
        name
    }
}

/// Strip the zone suffix from a name, yielding the bare hostname part.
/// Falls back to the dot-stripped name when the zone is not a suffix.
pub(crate) fn strip_zone<'a>(name: &'a str, zone: &str) -> &'a str {
    match name.strip_suffix(zone) {
        Some(host) => strip_closing_dot(host),
        None => strip_closing_dot(name),
    }
}

/// Index keys for one query name: the dot-stripped FQDN and, when distinct,
/// the zone-less hostname. Keys are lowercase.
pub(crate) fn query_index_keys(qname: &str, zone: &str) -> Vec<String> {
    let qname = qname.to_ascii_lowercase();
    let zone = canonicalize(zone);
    let zoneless = strip_zone(&qname, &zone);
    let stripped = strip_closing_dot(&qname);

    if !zoneless.is_empty() && zoneless != stripped {
        vec![stripped.to_string(), zoneless.to_string()]
    } else {
        vec![stripped.to_string()]
    }
}

/// All key sets to probe for a query, most specific first. The second set is
/// the wildcard fallback, present only when it differs from the first.
pub(crate) fn query_index_key_sets(qname: &str, zone: &str) -> Vec<Vec<String>> {
    let specific = query_index_keys(qname, zone);

    let wildcard_qname = to_wildcard_qname(qname, zone);
    let wildcard = query_index_keys(&wildcard_qname, zone);
    if wildcard == specific {
        return vec![specific];
    }

    vec![specific, wildcard]
}

/// Replace the first label of the zone-less query with `*`.
fn to_wildcard_qname(qname: &str, zone: &str) -> String {
    let qname = qname.to_ascii_lowercase();
    let zone = canonicalize(zone);
    let zoneless = strip_zone(&qname, &zone);

    let mut parts: Vec<&str> = zoneless.split('.').collect();
    parts[0] = "*";
    format!("{}.{}", parts.join("."), zone)
}
