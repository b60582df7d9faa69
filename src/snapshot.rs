//! Contracts the indexer layer satisfies for zone transfers.
//!
//! Lookups go through [`crate::lookup::ResourceIndex::lookup`]; a full zone
//! transfer instead walks each table's backing store via `list()`. The
//! indexer hands back [`StoredObject`]s carrying just what the transfer
//! traversal needs: labels (for ignore detection), class names (for
//! allow-list filtering), the host strings the object contributes, and the
//! addresses to associate with those hosts. DNSEndpoint objects additionally
//! carry typed endpoint records.

use std::collections::HashMap;
use std::net::IpAddr;

/// Objects carrying this label with value `true` are omitted from all
/// lookups and transfers.
pub const IGNORE_LABEL: &str = "k8s-gateway.dns/ignore";

/// One object enumerated from a resource table's backing store.
#[derive(Debug, Clone, Default)]
pub struct StoredObject {
    /// Kubernetes labels on the object.
    pub labels: HashMap<String, String>,
    /// Ingress class name, when the object is an Ingress.
    pub ingress_class: Option<String>,
    /// Gateway class name, when the object is a Gateway-API route.
    pub gateway_class: Option<String>,
    /// Host strings the object yields (any case, dot or no dot).
    pub hosts: Vec<String>,
    /// External addresses associated with every host.
    pub addresses: Vec<IpAddr>,
    /// Typed endpoint records, populated for DNSEndpoint objects.
    pub endpoints: Vec<EndpointRecord>,
}

/// A single endpoint entry of a DNSEndpoint object.
#[derive(Debug, Clone)]
pub struct EndpointRecord {
    /// Owner name of the record.
    pub dns_name: String,
    /// Record type of the targets.
    pub record_type: EndpointRecordType,
    /// Target strings: addresses for A/AAAA, payloads for TXT.
    pub targets: Vec<String>,
}

/// Record types a DNSEndpoint target can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRecordType {
    /// IPv4 address targets.
    A,
    /// IPv6 address targets.
    Aaaa,
    /// Text payload targets.
    Txt,
}

/// True when the object opted out of DNS via the ignore label.
pub(crate) fn ignored(labels: &HashMap<String, String>) -> bool {
    labels.get(IGNORE_LABEL).map(String::as_str) == Some("true")
}

/// Allow-lists restricting which ingress/gateway classes are served.
/// An empty list admits everything.
#[derive(Debug, Clone, Default)]
pub struct ResourceFilters {
    /// Admitted ingress class names.
    pub ingress_classes: Vec<String>,
    /// Admitted gateway class names.
    pub gateway_classes: Vec<String>,
}

impl ResourceFilters {
    pub(crate) fn admits_ingress_class(&self, class: Option<&str>) -> bool {
        admitted(&self.ingress_classes, class)
    }

    pub(crate) fn admits_gateway_class(&self, class: Option<&str>) -> bool {
        admitted(&self.gateway_classes, class)
    }
}

fn admitted(allow: &[String], class: Option<&str>) -> bool {
    if allow.is_empty() {
        return true;
    }
    match class {
        Some(class) => allow.iter().any(|c| c == class),
        None => false,
    }
}
